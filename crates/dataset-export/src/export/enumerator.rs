//! Record enumeration for one form scope

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::providers::RecordStoreProvider;
use crate::types::{FormScope, Record, RecordId};

/// Lists a form's record IDs and fetches records one at a time
pub struct RecordEnumerator {
    store: Arc<dyn RecordStoreProvider>,
    scope: FormScope,
}

impl RecordEnumerator {
    pub fn new(store: Arc<dyn RecordStoreProvider>, scope: FormScope) -> Self {
        Self { store, scope }
    }

    pub fn scope(&self) -> &FormScope {
        &self.scope
    }

    /// IDs of every record under the form, in backend order
    pub async fn list_records(&self) -> Result<Vec<RecordId>> {
        self.store.list_record_ids(&self.scope).await.map_err(|e| match e {
            Error::FormNotFound { .. } | Error::RecordFetch { .. } | Error::InvalidRequest(_) => e,
            other => Error::record_fetch(self.scope.collection_path(), other.to_string()),
        })
    }

    /// One record's full field map
    pub async fn fetch_record(&self, id: &RecordId) -> Result<Record> {
        self.store.get_record(&self.scope, id).await.map_err(|e| match e {
            Error::RecordFetch { .. } | Error::RecordNotFound(_) | Error::InvalidRequest(_) => e,
            other => Error::record_fetch(id.as_str(), other.to_string()),
        })
    }
}
