//! Configuration for the dataset export service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main export service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[derive(Default)]
pub struct ExportConfig {
    /// Backend provider (local or gcp)
    #[serde(default)]
    pub backend: BackendProvider,
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Archive encoder configuration
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Object layout and failure policy
    #[serde(default)]
    pub export: ExportSettings,
    /// Local filesystem backend configuration
    #[serde(default)]
    pub local: LocalConfig,
    /// GCP configuration (required when backend = gcp)
    #[serde(default)]
    pub gcp: Option<GcpConfig>,
}

impl ExportConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if !(0..=9).contains(&self.archive.compression_level) {
            return Err(Error::Config(format!(
                "archive.compression_level must be within 0..=9, got {}",
                self.archive.compression_level
            )));
        }
        if self.archive.chunk_size == 0 || self.archive.buffered_chunks == 0 {
            return Err(Error::Config(
                "archive.chunk_size and archive.buffered_chunks must be positive".to_string(),
            ));
        }
        if self.backend == BackendProvider::Gcp && self.gcp.is_none() {
            return Err(Error::Config(
                "GCP backend selected but gcp config is missing".to_string(),
            ));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Per-request timeout in seconds; an export still running is abandoned
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            request_timeout_secs: 540, // 9 minutes
        }
    }
}

/// Archive encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Deflate level for every member (0-9, default: 9 = maximum)
    pub compression_level: i64,
    /// Size of each compressed block handed to the upload stream
    pub chunk_size: usize,
    /// Number of blocks that may wait for the upload before the encoder suspends
    pub buffered_chunks: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression_level: 9,
            chunk_size: 256 * 1024, // 256KB
            buffered_chunks: 8,
        }
    }
}

/// What to do when a classified file reference is missing from storage
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MissingReferencePolicy {
    /// Fail the export; nothing is published
    #[default]
    Abort,
    /// Leave the entry out, log a warning and report it to the caller
    Skip,
}

/// Object layout and failure policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Prefix under which referenced files live (`{prefix}/{category}/{value}`)
    #[serde(default = "default_source_prefix")]
    pub source_prefix: String,
    /// Prefix for published archives (`{prefix}/{project}_{form}.zip`)
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
    /// Prefix for archives still being written
    #[serde(default = "default_staging_prefix")]
    pub staging_prefix: String,
    /// Missing referenced file handling
    #[serde(default)]
    pub missing_references: MissingReferencePolicy,
}

fn default_source_prefix() -> String {
    "private".to_string()
}

fn default_output_prefix() -> String {
    "public/downloads".to_string()
}

fn default_staging_prefix() -> String {
    "private/staging".to_string()
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            source_prefix: default_source_prefix(),
            output_prefix: default_output_prefix(),
            staging_prefix: default_staging_prefix(),
            missing_references: MissingReferencePolicy::Abort,
        }
    }
}

/// Local filesystem backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Root of the record tree (`projects/{p}/forms/{f}/data/{id}.json`)
    pub records_dir: PathBuf,
    /// Root of the object tree
    pub objects_dir: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        let root = std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("data");

        Self {
            records_dir: root.join("records"),
            objects_dir: root.join("objects"),
        }
    }
}

/// Backend provider selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BackendProvider {
    /// Local backend (JSON record files + filesystem objects)
    #[default]
    Local,
    /// Google Cloud Platform (Firestore + GCS)
    Gcp,
}

/// Google Cloud Platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpConfig {
    /// Path to service account JSON key file
    pub service_account_key_path: PathBuf,
    /// GCP project ID
    pub project_id: String,
    /// GCS bucket (default: "{project_id}.appspot.com")
    #[serde(default)]
    pub bucket: Option<String>,
    /// Firestore database ID (default: "(default)")
    #[serde(default = "default_database")]
    pub database: String,
    /// Page size used when listing record IDs
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl GcpConfig {
    /// Bucket holding both referenced files and archives
    pub fn bucket_name(&self) -> String {
        self.bucket
            .clone()
            .unwrap_or_else(|| format!("{}.appspot.com", self.project_id))
    }
}

fn default_database() -> String {
    "(default)".to_string()
}

fn default_page_size() -> u32 {
    300
}
