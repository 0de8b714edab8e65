//! Application state for the export server

use std::sync::Arc;

use crate::config::{BackendProvider, ExportConfig};
use crate::error::{Error, Result};
use crate::export::DatasetExporter;
use crate::providers::{
    local::{LocalObjectStore, LocalRecordStore},
    ObjectStoreProvider, RecordStoreProvider,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: ExportConfig,
    /// Record store (local JSON files or Firestore)
    records: Arc<dyn RecordStoreProvider>,
    /// Object store (local filesystem or GCS)
    objects: Arc<dyn ObjectStoreProvider>,
    /// Export pipeline over the two stores
    exporter: DatasetExporter,
}

impl AppState {
    /// Create application state, connecting the configured backend
    pub async fn new(config: ExportConfig) -> Result<Self> {
        tracing::info!("Initializing export state (backend: {:?})...", config.backend);

        let (records, objects) = build_providers(&config).await?;
        tracing::info!(
            "Providers initialized (records: {}, objects: {})",
            records.name(),
            objects.name()
        );

        Ok(Self::with_providers(config, records, objects))
    }

    /// Create application state over already constructed providers
    pub fn with_providers(
        config: ExportConfig,
        records: Arc<dyn RecordStoreProvider>,
        objects: Arc<dyn ObjectStoreProvider>,
    ) -> Self {
        let exporter = DatasetExporter::from_config(&config, Arc::clone(&records), Arc::clone(&objects));
        Self {
            inner: Arc::new(AppStateInner {
                config,
                records,
                objects,
                exporter,
            }),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &ExportConfig {
        &self.inner.config
    }

    pub fn exporter(&self) -> &DatasetExporter {
        &self.inner.exporter
    }

    /// Ready when both providers answer their health check
    pub async fn is_ready(&self) -> bool {
        let records = self.inner.records.health_check().await;
        let objects = self.inner.objects.health_check().await;

        match (records, objects) {
            (Ok(true), Ok(true)) => true,
            (records, objects) => {
                tracing::warn!(
                    "Not ready: {} -> {:?}, {} -> {:?}",
                    self.inner.records.name(),
                    records,
                    self.inner.objects.name(),
                    objects
                );
                false
            }
        }
    }
}

async fn build_providers(
    config: &ExportConfig,
) -> Result<(Arc<dyn RecordStoreProvider>, Arc<dyn ObjectStoreProvider>)> {
    match config.backend {
        BackendProvider::Local => {
            tracing::info!(
                "Using local backend (records: {}, objects: {})",
                config.local.records_dir.display(),
                config.local.objects_dir.display()
            );
            let records: Arc<dyn RecordStoreProvider> =
                Arc::new(LocalRecordStore::new(config.local.records_dir.clone())?);
            let objects: Arc<dyn ObjectStoreProvider> =
                Arc::new(LocalObjectStore::new(config.local.objects_dir.clone())?);
            Ok((records, objects))
        }
        BackendProvider::Gcp => {
            #[cfg(feature = "gcp")]
            {
                use crate::providers::gcp::{FirestoreRecordStore, GcpAuth, GcsObjectStore};

                let gcp_config = config.gcp.as_ref().ok_or_else(|| {
                    Error::Config("GCP backend selected but gcp config is missing".to_string())
                })?;

                let auth = Arc::new(GcpAuth::from_service_account(
                    &gcp_config.service_account_key_path,
                    gcp_config.project_id.clone(),
                )?);

                let records: Arc<dyn RecordStoreProvider> = Arc::new(FirestoreRecordStore::new(
                    auth,
                    gcp_config.database.clone(),
                    gcp_config.page_size,
                ));
                let objects: Arc<dyn ObjectStoreProvider> =
                    Arc::new(GcsObjectStore::new(gcp_config.bucket_name()).await?);

                tracing::info!(
                    "Using GCP backend (database: {}, bucket: {})",
                    gcp_config.database,
                    gcp_config.bucket_name()
                );

                Ok((records, objects))
            }
            #[cfg(not(feature = "gcp"))]
            {
                Err(Error::Config(
                    "GCP backend selected but gcp feature is not enabled. \
                     Rebuild with --features gcp"
                        .to_string(),
                ))
            }
        }
    }
}
