//! One export run: enumerate, stream to a staging object, publish

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{ArchiveConfig, ExportConfig, ExportSettings};
use crate::error::{Error, Result};
use crate::providers::{ObjectStoreProvider, RecordStoreProvider};
use crate::types::FormScope;

use super::assembler::ArchiveWriter;
use super::entries::{EntrySource, SkippedReference};
use super::enumerator::RecordEnumerator;
use super::fetcher::ReferenceFetcher;

/// Result of a published export
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    /// Path of the published archive
    pub object_path: String,
    /// `{id}.json` entries written
    pub records: usize,
    /// Referenced file entries written
    pub files: usize,
    /// References left out under the `skip` policy
    pub skipped_references: Vec<SkippedReference>,
    /// Size of the archive
    pub compressed_bytes: u64,
}

/// Exports a form's records and referenced files into one zip archive.
///
/// Providers are built once at startup and shared by every export. Exports
/// for different forms are independent; two concurrent exports of the same
/// form both publish to the same path and the last one to finish wins.
pub struct DatasetExporter {
    records: Arc<dyn RecordStoreProvider>,
    objects: Arc<dyn ObjectStoreProvider>,
    archive: ArchiveConfig,
    settings: ExportSettings,
}

impl DatasetExporter {
    pub fn new(
        records: Arc<dyn RecordStoreProvider>,
        objects: Arc<dyn ObjectStoreProvider>,
        archive: ArchiveConfig,
        settings: ExportSettings,
    ) -> Self {
        Self {
            records,
            objects,
            archive,
            settings,
        }
    }

    /// Exporter using the `archive` and `export` sections of a config
    pub fn from_config(
        config: &ExportConfig,
        records: Arc<dyn RecordStoreProvider>,
        objects: Arc<dyn ObjectStoreProvider>,
    ) -> Self {
        Self::new(records, objects, config.archive.clone(), config.export.clone())
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Published location: `{output_prefix}/{project}_{form}.zip`
    pub fn output_path(&self, scope: &FormScope) -> String {
        format!(
            "{}/{}.zip",
            self.settings.output_prefix.trim_end_matches('/'),
            scope.archive_stem()
        )
    }

    fn staging_path(&self, scope: &FormScope) -> String {
        format!(
            "{}/{}.{}.zip",
            self.settings.staging_prefix.trim_end_matches('/'),
            scope.archive_stem(),
            Uuid::new_v4()
        )
    }

    /// Run one export and publish the archive.
    ///
    /// Nothing is written to the published path unless every entry was
    /// encoded and the store confirmed the whole upload.
    pub async fn export(&self, project_id: &str, form_id: &str) -> Result<ExportReport> {
        let scope = request_scope(project_id, form_id)?;
        tracing::info!("Generating dataset for {}", scope);

        let enumerator = RecordEnumerator::new(Arc::clone(&self.records), scope.clone());
        let ids = enumerator.list_records().await?;
        tracing::info!("Found {} records in {}", ids.len(), scope.collection_path());

        let fetcher = ReferenceFetcher::new(Arc::clone(&self.objects), self.settings.source_prefix.clone());
        let staging = StagingObject::new(Arc::clone(&self.objects), self.staging_path(&scope));
        let mut writer = ArchiveWriter::open(Arc::clone(&self.objects), staging.path(), &self.archive);
        let mut source = EntrySource::new(&enumerator, &fetcher, ids, self.settings.missing_references);

        if let Err(e) = write_entries(&mut writer, &mut source).await {
            writer.abort().await;
            staging.discard().await;
            return Err(e);
        }

        let records = source.records();
        let files = source.files();
        let skipped_references = source.into_skipped();

        let summary = match writer.finish().await {
            Ok(summary) => summary,
            Err(e) => {
                staging.discard().await;
                return Err(e);
            }
        };

        let output = self.output_path(&scope);
        let moved = self.objects.move_object(staging.path(), &output).await;
        let published = match moved {
            Ok(published) => {
                staging.release();
                published
            }
            Err(e) => {
                staging.discard().await;
                return Err(e);
            }
        };

        tracing::info!(
            "Published {} ({} records, {} files, {} skipped, {} bytes)",
            published.uri,
            records,
            files,
            skipped_references.len(),
            summary.compressed_bytes
        );

        Ok(ExportReport {
            object_path: published.path,
            records,
            files,
            skipped_references,
            compressed_bytes: summary.compressed_bytes,
        })
    }
}

/// A staging archive that is removed unless it was published.
///
/// Error paths call [`StagingObject::discard`]. If the export future is
/// dropped instead (request timeout), the delete is spawned from `Drop`.
struct StagingObject {
    objects: Arc<dyn ObjectStoreProvider>,
    path: String,
    armed: bool,
}

impl StagingObject {
    fn new(objects: Arc<dyn ObjectStoreProvider>, path: String) -> Self {
        Self {
            objects,
            path,
            armed: true,
        }
    }

    fn path(&self) -> &str {
        &self.path
    }

    /// The archive now lives at its published path
    fn release(mut self) {
        self.armed = false;
    }

    async fn discard(mut self) {
        self.armed = false;
        remove_staging(self.objects.as_ref(), &self.path).await;
    }
}

impl Drop for StagingObject {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let objects = Arc::clone(&self.objects);
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!("Export abandoned, removing staging archive {}", path);
                handle.spawn(async move { remove_staging(objects.as_ref(), &path).await });
            }
            Err(_) => tracing::warn!("Export abandoned outside a runtime, staging archive {} left behind", path),
        }
    }
}

async fn remove_staging(objects: &dyn ObjectStoreProvider, path: &str) {
    if let Err(e) = objects.delete(path).await {
        tracing::warn!("Failed to remove staging archive {}: {}", path, e);
    }
}

fn request_scope(project_id: &str, form_id: &str) -> Result<FormScope> {
    if project_id.is_empty() {
        return Err(Error::InvalidRequest("project_id is required".to_string()));
    }
    if form_id.is_empty() {
        return Err(Error::InvalidRequest("form_id is required".to_string()));
    }
    Ok(FormScope::new(project_id, form_id))
}

async fn write_entries(writer: &mut ArchiveWriter, source: &mut EntrySource<'_>) -> Result<()> {
    while let Some(entry) = source.next_entry().await? {
        writer.append(entry).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissingReferencePolicy;
    use crate::providers::memory::{MemoryObjectStore, MemoryRecordStore};
    use crate::types::{FieldValue, Record, RecordId};
    use bytes::Bytes;
    use std::io::{Cursor, Read};

    struct Fixture {
        records: Arc<MemoryRecordStore>,
        objects: Arc<MemoryObjectStore>,
        scope: FormScope,
    }

    impl Fixture {
        fn new() -> Self {
            let records = Arc::new(MemoryRecordStore::new());
            let scope = FormScope::new("p1", "f1");
            records.add_form(&scope);
            Self {
                records,
                objects: Arc::new(MemoryObjectStore::new()),
                scope,
            }
        }

        fn exporter(&self, policy: MissingReferencePolicy) -> DatasetExporter {
            let settings = ExportSettings {
                missing_references: policy,
                ..ExportSettings::default()
            };
            let archive = ArchiveConfig {
                chunk_size: 128,
                buffered_chunks: 2,
                ..ArchiveConfig::default()
            };
            DatasetExporter::new(self.records.clone(), self.objects.clone(), archive, settings)
        }

        fn archive(&self) -> Vec<(String, Vec<u8>)> {
            let data = self.objects.get("public/downloads/p1_f1.zip").unwrap();
            let mut archive = zip::ZipArchive::new(Cursor::new(data.to_vec())).unwrap();
            (0..archive.len())
                .map(|i| {
                    let mut file = archive.by_index(i).unwrap();
                    let mut content = Vec::new();
                    file.read_to_end(&mut content).unwrap();
                    (file.name().to_string(), content)
                })
                .collect()
        }

        fn staging_objects(&self) -> Vec<String> {
            self.objects
                .paths()
                .into_iter()
                .filter(|p| p.starts_with("private/staging/"))
                .collect()
        }
    }

    fn names(entries: &[(String, Vec<u8>)]) -> Vec<&str> {
        entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_two_record_scenario() {
        let fx = Fixture::new();
        fx.records.insert(&fx.scope, Record::new("r1").with_field("photo", "a.jpg"));
        fx.records.insert(&fx.scope, Record::new("r2").with_field("note", "hello"));
        fx.objects.put("private/images/a.jpg", Bytes::from_static(b"\xff\xd8jpeg"));

        let report = fx.exporter(MissingReferencePolicy::Abort).export("p1", "f1").await.unwrap();
        assert_eq!(report.object_path, "public/downloads/p1_f1.zip");
        assert_eq!(report.records, 2);
        assert_eq!(report.files, 1);
        assert!(report.skipped_references.is_empty());

        let entries = fx.archive();
        assert_eq!(names(&entries), vec!["r1.json", "images/a.jpg", "r2.json"]);
        assert_eq!(entries[1].1, b"\xff\xd8jpeg".to_vec());

        let r2: serde_json::Value = serde_json::from_slice(&entries[2].1).unwrap();
        assert_eq!(r2, serde_json::json!({"note": {"stringValue": "hello"}}));
        assert!(fx.staging_objects().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unrecognized_values_stay_in_json_only() {
        let fx = Fixture::new();
        fx.records.insert(
            &fx.scope,
            Record::new("r1")
                .with_field("doc", "notes.docx")
                .with_field("word", "jpg")
                .with_field("count", FieldValue::IntegerValue("7".into())),
        );

        fx.exporter(MissingReferencePolicy::Abort).export("p1", "f1").await.unwrap();

        let entries = fx.archive();
        assert_eq!(names(&entries), vec!["r1.json"]);
        let r1: serde_json::Value = serde_json::from_slice(&entries[0].1).unwrap();
        assert_eq!(r1["doc"]["stringValue"], "notes.docx");
        assert_eq!(r1["word"]["stringValue"], "jpg");
        assert_eq!(r1["count"]["integerValue"], "7");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_empty_form_publishes_empty_archive() {
        let fx = Fixture::new();

        let report = fx.exporter(MissingReferencePolicy::Abort).export("p1", "f1").await.unwrap();
        assert_eq!(report.records, 0);
        assert!(fx.archive().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_one_json_entry_per_record() {
        let fx = Fixture::new();
        for i in 0..25 {
            let id = format!("rec{:02}", i);
            fx.records.insert(&fx.scope, Record::new(id.as_str()).with_field("n", id.as_str()));
        }

        fx.exporter(MissingReferencePolicy::Abort).export("p1", "f1").await.unwrap();

        let entries = fx.archive();
        let expected: Vec<String> = (0..25).map(|i| format!("rec{:02}.json", i)).collect();
        assert_eq!(names(&entries), expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rerun_produces_same_entries() {
        let fx = Fixture::new();
        fx.records.insert(&fx.scope, Record::new("r1").with_field("clip", "v.mp4").with_field("scan", "s.pdf"));
        fx.objects.put("private/videos/v.mp4", Bytes::from(vec![7u8; 4096]));
        fx.objects.put("private/documents/s.pdf", Bytes::from_static(b"%PDF"));

        let exporter = fx.exporter(MissingReferencePolicy::Abort);
        exporter.export("p1", "f1").await.unwrap();
        let first = fx.archive();
        exporter.export("p1", "f1").await.unwrap();
        let second = fx.archive();

        assert_eq!(first, second);
        assert_eq!(names(&first), vec!["r1.json", "videos/v.mp4", "documents/s.pdf"]);
        assert!(fx.staging_objects().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_missing_reference_aborts_without_publishing() {
        let fx = Fixture::new();
        fx.records.insert(&fx.scope, Record::new("r1").with_field("photo", "gone.jpg"));

        let err = fx
            .exporter(MissingReferencePolicy::Abort)
            .export("p1", "f1")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ReferenceNotFound(ref path) if path == "private/images/gone.jpg"));
        assert!(fx.objects.paths().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_missing_reference_skipped_and_reported() {
        let fx = Fixture::new();
        fx.records.insert(&fx.scope, Record::new("r1").with_field("photo", "gone.jpg"));
        fx.records.insert(&fx.scope, Record::new("r2").with_field("voice", "b.mp3"));
        fx.objects.put("private/audios/b.mp3", Bytes::from_static(b"ID3"));

        let report = fx.exporter(MissingReferencePolicy::Skip).export("p1", "f1").await.unwrap();

        assert_eq!(names(&fx.archive()), vec!["r1.json", "r2.json", "audios/b.mp3"]);
        assert_eq!(report.files, 1);
        assert_eq!(
            report.skipped_references,
            vec![SkippedReference {
                record_id: RecordId::from("r1"),
                path: "private/images/gone.jpg".to_string(),
            }]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_record_failure_keeps_previous_archive() {
        let fx = Fixture::new();
        fx.records.insert(&fx.scope, Record::new("r1"));
        fx.objects.put("public/downloads/p1_f1.zip", Bytes::from_static(b"previous"));
        fx.records.fail_record("r1");

        let err = fx
            .exporter(MissingReferencePolicy::Skip)
            .export("p1", "f1")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RecordFetch { .. }));
        assert_eq!(
            fx.objects.get("public/downloads/p1_f1.zip"),
            Some(Bytes::from_static(b"previous"))
        );
        assert!(fx.staging_objects().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_upload_failure_publishes_nothing() {
        let fx = Fixture::new();
        fx.records.insert(&fx.scope, Record::new("r1"));
        fx.objects.fail_uploads_under("private/staging/");

        let err = fx
            .exporter(MissingReferencePolicy::Abort)
            .export("p1", "f1")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Storage(_)));
        assert!(fx.objects.paths().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_local_filesystem_export() {
        use crate::providers::local::{LocalObjectStore, LocalRecordStore};

        let dir = tempfile::tempdir().unwrap();
        let records = Arc::new(LocalRecordStore::new(dir.path().join("records")).unwrap());
        let objects = Arc::new(LocalObjectStore::new(dir.path().join("objects")).unwrap());
        let scope = FormScope::new("p1", "f1");
        records
            .put_record(&scope, &Record::new("r1").with_field("memo", "m.mp3"))
            .await
            .unwrap();
        objects.put("private/audios/m.mp3", b"ID3").await.unwrap();

        let exporter = DatasetExporter::new(
            records,
            objects,
            ArchiveConfig::default(),
            ExportSettings::default(),
        );
        let report = exporter.export("p1", "f1").await.unwrap();
        assert_eq!(report.files, 1);

        let data = std::fs::read(dir.path().join("objects/public/downloads/p1_f1.zip")).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(data)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut memo = Vec::new();
        archive.by_name("audios/m.mp3").unwrap().read_to_end(&mut memo).unwrap();
        assert_eq!(memo, b"ID3");
        assert!(std::fs::read_dir(dir.path().join("objects/private/staging")).unwrap().next().is_none());
    }

    /// Delegates to a memory store but never completes a publish
    struct StalledPublish {
        inner: Arc<MemoryObjectStore>,
    }

    #[async_trait::async_trait]
    impl ObjectStoreProvider for StalledPublish {
        async fn download(&self, path: &str) -> Result<Bytes> {
            self.inner.download(path).await
        }

        async fn upload_stream(
            &self,
            path: &str,
            content_type: &str,
            body: crate::providers::ByteStream,
        ) -> Result<crate::providers::StoredObjectInfo> {
            self.inner.upload_stream(path, content_type, body).await
        }

        async fn move_object(&self, _from: &str, _to: &str) -> Result<crate::providers::StoredObjectInfo> {
            std::future::pending().await
        }

        async fn delete(&self, path: &str) -> Result<()> {
            self.inner.delete(path).await
        }

        async fn exists(&self, path: &str) -> Result<bool> {
            self.inner.exists(path).await
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "stalled-publish"
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timed_out_export_removes_staging() {
        let fx = Fixture::new();
        fx.records.insert(&fx.scope, Record::new("r1").with_field("note", "hello"));
        let exporter = DatasetExporter::new(
            fx.records.clone(),
            Arc::new(StalledPublish {
                inner: fx.objects.clone(),
            }),
            ArchiveConfig::default(),
            ExportSettings::default(),
        );

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(500), exporter.export("p1", "f1")).await;
        assert!(result.is_err());

        // The delete runs on a spawned task
        for _ in 0..100 {
            if fx.objects.paths().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(fx.objects.paths().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_form() {
        let fx = Fixture::new();
        let err = fx
            .exporter(MissingReferencePolicy::Abort)
            .export("p1", "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FormNotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_ids_are_invalid() {
        let fx = Fixture::new();
        let exporter = fx.exporter(MissingReferencePolicy::Abort);

        assert!(matches!(exporter.export("", "f1").await, Err(Error::InvalidRequest(_))));
        assert!(matches!(exporter.export("p1", "").await, Err(Error::InvalidRequest(_))));
    }
}
