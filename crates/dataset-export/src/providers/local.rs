//! Local provider implementations using the filesystem
//!
//! Records are stored as JSON field maps under
//! `{records_dir}/projects/{project}/forms/{form}/data/{id}.json`; objects are
//! plain files under `{objects_dir}/{path}`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{FieldValue, FormScope, Record, RecordId};

use super::object_store::{ByteStream, ObjectStoreProvider, StoredObjectInfo};
use super::record_store::RecordStoreProvider;

/// Reject anything that could escape its directory when used as a path segment
fn check_segment(segment: &str) -> Result<()> {
    if segment.is_empty() || segment == "." || segment == ".." || segment.contains(['/', '\\']) {
        return Err(Error::InvalidRequest(format!(
            "Invalid path segment: '{}'",
            segment
        )));
    }
    Ok(())
}

/// Local record store reading JSON files
pub struct LocalRecordStore {
    /// Root of the record tree
    records_dir: PathBuf,
}

impl LocalRecordStore {
    /// Create a new local record store
    pub fn new(records_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&records_dir)?;
        Ok(Self { records_dir })
    }

    /// Directory holding one form's records
    fn form_dir(&self, scope: &FormScope) -> Result<PathBuf> {
        check_segment(&scope.project_id)?;
        check_segment(&scope.form_id)?;
        Ok(self.records_dir.join(scope.collection_path()))
    }

    /// Write a record in the layout this store reads
    pub async fn put_record(&self, scope: &FormScope, record: &Record) -> Result<()> {
        check_segment(record.id.as_str())?;
        let dir = self.form_dir(scope)?;
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}.json", record.id));
        tokio::fs::write(&path, serde_json::to_vec_pretty(&record.fields)?).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStoreProvider for LocalRecordStore {
    async fn list_record_ids(&self, scope: &FormScope) -> Result<Vec<RecordId>> {
        let dir = self.form_dir(scope)?;

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::FormNotFound {
                    project_id: scope.project_id.clone(),
                    form_id: scope.form_id.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |e| e == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(RecordId::from(stem));
                }
            }
        }

        // Directory order is unspecified; sort so repeated exports agree
        ids.sort();
        Ok(ids)
    }

    async fn get_record(&self, scope: &FormScope, id: &RecordId) -> Result<Record> {
        check_segment(id.as_str())?;
        let path = self.form_dir(scope)?.join(format!("{}.json", id));

        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::RecordNotFound(id.to_string()))
            }
            Err(e) => return Err(Error::record_fetch(id.as_str(), e.to_string())),
        };

        let fields: BTreeMap<String, FieldValue> = serde_json::from_slice(&content)
            .map_err(|e| Error::record_fetch(id.as_str(), format!("Invalid record JSON: {}", e)))?;

        Ok(Record {
            id: id.clone(),
            fields,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.records_dir.exists())
    }

    fn name(&self) -> &str {
        "local-records"
    }
}

/// Local object store using the filesystem
pub struct LocalObjectStore {
    /// Directory to store objects
    objects_dir: PathBuf,
}

impl LocalObjectStore {
    /// Create a new local object store
    pub fn new(objects_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&objects_dir)?;
        Ok(Self { objects_dir })
    }

    /// Resolve an object path inside the store root
    fn object_path(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(Error::storage(format!("Invalid object path: '{}'", path)));
        }
        Ok(self.objects_dir.join(relative))
    }

    fn info(&self, path: &str, file: &Path, size: u64) -> StoredObjectInfo {
        StoredObjectInfo {
            path: path.to_string(),
            uri: file.to_string_lossy().to_string(),
            size,
        }
    }

    /// Store a whole object at once
    pub async fn put(&self, path: &str, data: &[u8]) -> Result<StoredObjectInfo> {
        let file = self.object_path(path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file, data).await?;
        Ok(self.info(path, &file, data.len() as u64))
    }

    async fn write_stream(temp: &Path, mut body: ByteStream) -> Result<u64> {
        let mut file = tokio::fs::File::create(temp).await?;
        let mut size = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::storage(format!("Upload aborted: {}", e)))?;
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(size)
    }
}

#[async_trait]
impl ObjectStoreProvider for LocalObjectStore {
    async fn download(&self, path: &str) -> Result<Bytes> {
        let file = self.object_path(path)?;
        match tokio::fs::read(&file).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::ObjectNotFound(path.to_string())),
            Err(e) => Err(Error::storage(format!("Failed to read object {}: {}", path, e))),
        }
    }

    async fn upload_stream(
        &self,
        path: &str,
        _content_type: &str,
        body: ByteStream,
    ) -> Result<StoredObjectInfo> {
        let file = self.object_path(path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Written beside the target and renamed, so readers never see a prefix
        let temp = file.with_file_name(format!(
            ".{}.{}.tmp",
            file.file_name().and_then(|n| n.to_str()).unwrap_or("object"),
            Uuid::new_v4()
        ));

        match Self::write_stream(&temp, body).await {
            Ok(size) => {
                tokio::fs::rename(&temp, &file).await?;
                Ok(self.info(path, &file, size))
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&temp).await {
                    tracing::warn!("Failed to remove partial upload {}: {}", temp.display(), cleanup);
                }
                Err(e)
            }
        }
    }

    async fn move_object(&self, from: &str, to: &str) -> Result<StoredObjectInfo> {
        let source = self.object_path(from)?;
        let target = self.object_path(to)?;

        let size = match tokio::fs::metadata(&source).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::ObjectNotFound(from.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&source, &target).await?;

        Ok(self.info(to, &target, size))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let file = self.object_path(path)?;
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let file = self.object_path(path)?;
        Ok(tokio::fs::try_exists(&file).await?)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.objects_dir.exists())
    }

    fn name(&self) -> &str {
        "local-filesystem"
    }
}
