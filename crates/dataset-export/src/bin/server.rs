//! Dataset export server binary
//!
//! Run with: cargo run -p dataset-export --bin dataset-export-server
//!
//! The configuration file is read from `DATASET_EXPORT_CONFIG` when set.

use dataset_export::{config::ExportConfig, server::ExportServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONFIG_ENV: &str = "DATASET_EXPORT_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dataset_export=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match std::env::var(CONFIG_ENV) {
        Ok(path) => {
            tracing::info!("Loading configuration from {}", path);
            ExportConfig::from_file(&path)?
        }
        Err(_) => ExportConfig::default(),
    };

    tracing::info!("Configuration loaded");
    tracing::info!("  - Backend: {:?}", config.backend);
    tracing::info!("  - Compression level: {}", config.archive.compression_level);
    tracing::info!("  - Output prefix: {}", config.export.output_prefix);
    tracing::info!("  - Missing references: {:?}", config.export.missing_references);

    let server = ExportServer::new(config).await?;

    println!("\nServer starting...");
    println!("  Health: http://{}/health", server.address());
    println!("  Export: http://{}/generate-dataset?project_id=<id>&form_id=<id>", server.address());
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
