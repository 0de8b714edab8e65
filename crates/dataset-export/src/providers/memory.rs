//! In-memory providers
//!
//! `MemoryRecordStore` and `MemoryObjectStore` satisfy the provider contracts
//! without any external service. Both support failure injection so export
//! error paths can be exercised.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{Error, Result};
use crate::types::{FormScope, Record, RecordId};

use super::object_store::{ByteStream, ObjectStoreProvider, StoredObjectInfo};
use super::record_store::RecordStoreProvider;

/// In-memory record store; records list in insertion order
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    forms: Mutex<HashMap<FormScope, Vec<Record>>>,
    failing: Mutex<HashSet<RecordId>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a form with no records
    pub fn add_form(&self, scope: &FormScope) {
        self.forms.lock().entry(scope.clone()).or_default();
    }

    /// Append a record, creating the form if needed
    pub fn insert(&self, scope: &FormScope, record: Record) {
        self.forms.lock().entry(scope.clone()).or_default().push(record);
    }

    /// Make every later fetch of `id` fail
    pub fn fail_record(&self, id: impl Into<RecordId>) {
        self.failing.lock().insert(id.into());
    }
}

#[async_trait]
impl RecordStoreProvider for MemoryRecordStore {
    async fn list_record_ids(&self, scope: &FormScope) -> Result<Vec<RecordId>> {
        let forms = self.forms.lock();
        let records = forms.get(scope).ok_or_else(|| Error::FormNotFound {
            project_id: scope.project_id.clone(),
            form_id: scope.form_id.clone(),
        })?;
        Ok(records.iter().map(|r| r.id.clone()).collect())
    }

    async fn get_record(&self, scope: &FormScope, id: &RecordId) -> Result<Record> {
        if self.failing.lock().contains(id) {
            return Err(Error::record_fetch(id.as_str(), "injected failure"));
        }
        self.forms
            .lock()
            .get(scope)
            .and_then(|records| records.iter().find(|r| &r.id == id))
            .cloned()
            .ok_or_else(|| Error::RecordNotFound(id.to_string()))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "memory-records"
    }
}

/// In-memory object store backed by a `BTreeMap<path, bytes>`
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Bytes>>,
    content_types: Mutex<HashMap<String, String>>,
    failing_uploads: Mutex<HashSet<String>>,
    downloads: Mutex<Vec<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object directly
    pub fn put(&self, path: impl Into<String>, data: impl Into<Bytes>) {
        self.objects.lock().insert(path.into(), data.into());
    }

    /// Current contents of an object
    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.objects.lock().get(path).cloned()
    }

    /// Every stored path, sorted
    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    /// Content type recorded by the last upload to `path`
    pub fn content_type(&self, path: &str) -> Option<String> {
        self.content_types.lock().get(path).cloned()
    }

    /// Paths downloaded so far, in order
    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().clone()
    }

    /// Make uploads whose path starts with `prefix` fail after consuming their body
    pub fn fail_uploads_under(&self, prefix: impl Into<String>) {
        self.failing_uploads.lock().insert(prefix.into());
    }
}

#[async_trait]
impl ObjectStoreProvider for MemoryObjectStore {
    async fn download(&self, path: &str) -> Result<Bytes> {
        self.downloads.lock().push(path.to_string());
        self.get(path)
            .ok_or_else(|| Error::ObjectNotFound(path.to_string()))
    }

    async fn upload_stream(
        &self,
        path: &str,
        content_type: &str,
        mut body: ByteStream,
    ) -> Result<StoredObjectInfo> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::storage(format!("Upload aborted: {}", e)))?;
            buffer.extend_from_slice(&chunk);
        }

        let rejected = self
            .failing_uploads
            .lock()
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()));
        if rejected {
            return Err(Error::storage(format!("injected upload failure for {}", path)));
        }

        let size = buffer.len() as u64;
        self.objects.lock().insert(path.to_string(), buffer.freeze());
        self.content_types
            .lock()
            .insert(path.to_string(), content_type.to_string());

        Ok(StoredObjectInfo {
            path: path.to_string(),
            uri: format!("memory://{}", path),
            size,
        })
    }

    async fn move_object(&self, from: &str, to: &str) -> Result<StoredObjectInfo> {
        let mut objects = self.objects.lock();
        let data = objects
            .remove(from)
            .ok_or_else(|| Error::ObjectNotFound(from.to_string()))?;
        let size = data.len() as u64;
        objects.insert(to.to_string(), data);
        drop(objects);

        let mut content_types = self.content_types.lock();
        if let Some(content_type) = content_types.remove(from) {
            content_types.insert(to.to_string(), content_type);
        }

        Ok(StoredObjectInfo {
            path: to.to_string(),
            uri: format!("memory://{}", to),
            size,
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.objects.lock().remove(path);
        self.content_types.lock().remove(path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.objects.lock().contains_key(path))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
