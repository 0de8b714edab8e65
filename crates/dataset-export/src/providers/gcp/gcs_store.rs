//! Google Cloud Storage object store
//!
//! Reads referenced files and receives streamed archive uploads.

use async_trait::async_trait;
use bytes::Bytes;

use google_cloud_storage::client::{Client as GcsClient, ClientConfig};
use google_cloud_storage::http::objects::copy::CopyObjectRequest;
use google_cloud_storage::http::objects::delete::DeleteObjectRequest;
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::list::ListObjectsRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use google_cloud_storage::http::Error as GcsError;

use crate::error::{Error, Result};
use crate::providers::object_store::{ByteStream, ObjectStoreProvider, StoredObjectInfo};

fn is_not_found(err: &GcsError) -> bool {
    matches!(err, GcsError::Response(response) if response.code == 404)
}

/// Google Cloud Storage object store
pub struct GcsObjectStore {
    client: GcsClient,
    bucket: String,
}

impl GcsObjectStore {
    /// Create a new GCS object store using application default credentials
    pub async fn new(bucket: String) -> Result<Self> {
        let config = ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| Error::Config(format!("Failed to create GCS client: {}", e)))?;

        Ok(Self {
            client: GcsClient::new(config),
            bucket,
        })
    }

    /// Get GCS URI for an object
    fn gcs_uri(&self, path: &str) -> String {
        format!("gs://{}/{}", self.bucket, path)
    }

    fn info(&self, path: &str, size: i64) -> StoredObjectInfo {
        StoredObjectInfo {
            path: path.to_string(),
            uri: self.gcs_uri(path),
            size: size.max(0) as u64,
        }
    }
}

#[async_trait]
impl ObjectStoreProvider for GcsObjectStore {
    async fn download(&self, path: &str) -> Result<Bytes> {
        self.client
            .download_object(
                &GetObjectRequest {
                    bucket: self.bucket.clone(),
                    object: path.to_string(),
                    ..Default::default()
                },
                &Range::default(),
            )
            .await
            .map(Bytes::from)
            .map_err(|e| {
                if is_not_found(&e) {
                    Error::ObjectNotFound(path.to_string())
                } else {
                    Error::storage(format!("Failed to download {} from GCS: {}", path, e))
                }
            })
    }

    async fn upload_stream(
        &self,
        path: &str,
        content_type: &str,
        body: ByteStream,
    ) -> Result<StoredObjectInfo> {
        let mut media = Media::new(path.to_string());
        media.content_type = content_type.to_string().into();
        let upload_type = UploadType::Simple(media);

        // A failed body aborts the request, so no object is created
        let object = self
            .client
            .upload_streamed_object(
                &UploadObjectRequest {
                    bucket: self.bucket.clone(),
                    ..Default::default()
                },
                body,
                &upload_type,
            )
            .await
            .map_err(|e| Error::storage(format!("Failed to upload {} to GCS: {}", path, e)))?;

        Ok(self.info(path, object.size))
    }

    async fn move_object(&self, from: &str, to: &str) -> Result<StoredObjectInfo> {
        let object = self
            .client
            .copy_object(&CopyObjectRequest {
                source_bucket: self.bucket.clone(),
                source_object: from.to_string(),
                destination_bucket: self.bucket.clone(),
                destination_object: to.to_string(),
                ..Default::default()
            })
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    Error::ObjectNotFound(from.to_string())
                } else {
                    Error::storage(format!("Failed to publish {} as {}: {}", from, to, e))
                }
            })?;

        self.delete(from).await?;
        Ok(self.info(to, object.size))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match self
            .client
            .delete_object(&DeleteObjectRequest {
                bucket: self.bucket.clone(),
                object: path.to_string(),
                ..Default::default()
            })
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(Error::storage(format!("Failed to delete {}: {}", path, e))),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        match self
            .client
            .get_object(&GetObjectRequest {
                bucket: self.bucket.clone(),
                object: path.to_string(),
                ..Default::default()
            })
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(Error::storage(format!("Failed to stat {}: {}", path, e))),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        // Try to list objects (with limit 1) to check bucket access
        let list_request = ListObjectsRequest {
            bucket: self.bucket.clone(),
            max_results: Some(1),
            ..Default::default()
        };

        self.client
            .list_objects(&list_request)
            .await
            .map(|_| true)
            .map_err(|e| Error::storage(format!("GCS health check failed: {}", e)))
    }

    fn name(&self) -> &str {
        "gcs"
    }
}
