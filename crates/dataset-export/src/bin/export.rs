//! One-shot dataset export
//!
//! Run with: cargo run -p dataset-export --features cli --bin dataset-export -- \
//!     --project-id <id> --form-id <id>

use anyhow::Context;
use clap::Parser;
use dataset_export::{config::ExportConfig, server::state::AppState};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dataset-export")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Export a form's records and media files into a zip archive", long_about = None)]
struct Cli {
    /// Configuration file (TOML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Project the form belongs to
    #[arg(long)]
    project_id: String,

    /// Form to export
    #[arg(long)]
    form_id: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dataset_export=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ExportConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ExportConfig::default(),
    };

    let state = AppState::new(config).await?;
    let report = state
        .exporter()
        .export(&cli.project_id, &cli.form_id)
        .await
        .with_context(|| format!("exporting {}/{}", cli.project_id, cli.form_id))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
