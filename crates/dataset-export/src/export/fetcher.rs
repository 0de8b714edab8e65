//! Referenced file retrieval

use bytes::Bytes;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::providers::ObjectStoreProvider;
use crate::types::{Category, FileReference};

/// Downloads the object behind a classified file reference
pub struct ReferenceFetcher {
    store: Arc<dyn ObjectStoreProvider>,
    source_prefix: String,
}

impl ReferenceFetcher {
    pub fn new(store: Arc<dyn ObjectStoreProvider>, source_prefix: impl Into<String>) -> Self {
        Self {
            store,
            source_prefix: source_prefix.into(),
        }
    }

    /// Storage path of a reference
    pub fn object_path(&self, reference: &FileReference) -> String {
        reference.object_path(&self.source_prefix)
    }

    /// Full bytes of `{source_prefix}/{category-dir}/{value}`
    pub async fn fetch_reference(&self, category: Category, value: &str) -> Result<Bytes> {
        self.fetch(&FileReference {
            category,
            value: value.to_string(),
        })
        .await
    }

    pub async fn fetch(&self, reference: &FileReference) -> Result<Bytes> {
        let path = self.object_path(reference);
        self.store.download(&path).await.map_err(|e| match e {
            Error::ObjectNotFound(_) => Error::ReferenceNotFound(path.clone()),
            other => Error::reference_fetch(path.clone(), other.to_string()),
        })
    }
}
