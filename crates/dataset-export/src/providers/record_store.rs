//! Record store provider trait for listing and reading form responses

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{FormScope, Record, RecordId};

/// Trait for the document database holding submitted records
///
/// Implementations:
/// - `LocalRecordStore`: JSON files on the local filesystem
/// - `MemoryRecordStore`: In-process map (tests)
/// - `FirestoreRecordStore`: Cloud Firestore REST API
#[async_trait]
pub trait RecordStoreProvider: Send + Sync {
    /// List the IDs of every record under a form.
    ///
    /// The order is whatever the backend yields; exports follow it as-is.
    /// Returns `Error::FormNotFound` when the backend can tell the form does
    /// not exist.
    async fn list_record_ids(&self, scope: &FormScope) -> Result<Vec<RecordId>>;

    /// Fetch one record's fields
    async fn get_record(&self, scope: &FormScope, id: &RecordId) -> Result<Record>;

    /// Check if the provider is healthy
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
