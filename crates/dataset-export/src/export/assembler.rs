//! Streaming zip assembly into object storage
//!
//! Two bounded queues connect three activities:
//!
//! ```text
//! append() --entries(1)--> encoder thread --blocks(N)--> upload task --> store
//! ```
//!
//! The encoder runs on a blocking thread and deflates each entry into
//! fixed-size blocks. Sending a block blocks while the upload queue is full,
//! so at most `buffered_chunks` compressed blocks and one pending entry are
//! held in memory regardless of archive size.

use bytes::{Bytes, BytesMut};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::ArchiveConfig;
use crate::error::{Error, Result};
use crate::providers::{ObjectStoreProvider, StoredObjectInfo};
use crate::types::ArchiveEntry;

pub const ZIP_CONTENT_TYPE: &str = "application/zip";

type Block = io::Result<Bytes>;

enum EncoderMessage {
    Entry(ArchiveEntry),
    Finish,
}

/// Outcome of a fully written archive
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    /// Members written
    pub entries: usize,
    /// Compressed bytes handed to the upload
    pub compressed_bytes: u64,
    /// The object as confirmed by the store
    pub object: StoredObjectInfo,
}

struct EncoderStats {
    entries: usize,
    compressed_bytes: u64,
}

/// `Write` adapter that cuts encoder output into blocks for the upload queue
struct BlockSink {
    tx: mpsc::Sender<Block>,
    buffer: BytesMut,
    chunk_size: usize,
    sent: u64,
}

impl BlockSink {
    fn new(tx: mpsc::Sender<Block>, chunk_size: usize) -> Self {
        Self {
            tx,
            buffer: BytesMut::with_capacity(chunk_size),
            chunk_size,
            sent: 0,
        }
    }

    fn send(&mut self, block: Bytes) -> io::Result<()> {
        let len = block.len() as u64;
        // Blocks the encoder thread while the upload is behind
        self.tx
            .blocking_send(Ok(block))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive upload closed"))?;
        self.sent += len;
        Ok(())
    }
}

impl Write for BlockSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        while self.buffer.len() >= self.chunk_size {
            let block = self.buffer.split_to(self.chunk_size).freeze();
            self.send(block)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            let block = self.buffer.split().freeze();
            self.send(block)?;
        }
        Ok(())
    }
}

/// A closed upload queue means the store gave up; anything else is the encoder's fault
fn io_failure(context: &str, err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::BrokenPipe {
        Error::storage(format!("{}: archive upload closed", context))
    } else {
        Error::compression(format!("{}: {}", context, err))
    }
}

fn zip_failure(context: &str, err: ZipError) -> Error {
    match err {
        ZipError::Io(e) => io_failure(context, e),
        other => Error::compression(format!("{}: {}", context, other)),
    }
}

fn write_archive(
    entries: &mut mpsc::Receiver<EncoderMessage>,
    sink: BlockSink,
    compression_level: i64,
) -> Result<EncoderStats> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(compression_level));

    let mut zip = ZipWriter::new_stream(sink);
    let mut count = 0usize;

    loop {
        match entries.blocking_recv() {
            Some(EncoderMessage::Entry(entry)) => {
                let large = entry.content.len() as u64 >= u32::MAX as u64;
                zip.start_file(entry.name.as_str(), options.large_file(large))
                    .map_err(|e| zip_failure(&format!("Failed to start '{}'", entry.name), e))?;
                zip.write_all(&entry.content)
                    .map_err(|e| io_failure(&format!("Failed to write '{}'", entry.name), e))?;
                count += 1;
            }
            Some(EncoderMessage::Finish) => break,
            None => return Err(Error::internal("archive abandoned before finalize")),
        }
    }

    let mut sink = zip
        .finish()
        .map_err(|e| zip_failure("Failed to finalize archive", e))?
        .into_inner();
    sink.flush()
        .map_err(|e| io_failure("Failed to flush archive", e))?;

    Ok(EncoderStats {
        entries: count,
        compressed_bytes: sink.sent,
    })
}

/// Encoder thread body; poisons the upload stream on any failure
fn run_encoder(
    mut entries: mpsc::Receiver<EncoderMessage>,
    blocks: mpsc::Sender<Block>,
    chunk_size: usize,
    compression_level: i64,
) -> Result<EncoderStats> {
    let poison = blocks.clone();
    let result = write_archive(&mut entries, BlockSink::new(blocks, chunk_size), compression_level);

    if let Err(e) = &result {
        // The upload must not complete a truncated object
        let _ = poison.blocking_send(Err(io::Error::new(io::ErrorKind::Other, e.to_string())));
    }
    result
}

/// An archive being streamed to an object path.
///
/// Dropping the writer without calling [`ArchiveWriter::finish`] abandons the
/// upload: the encoder sees the entry queue close without a finish marker
/// and fails the upload stream, so no object is created.
pub struct ArchiveWriter {
    path: String,
    entries: Option<mpsc::Sender<EncoderMessage>>,
    encoder: Option<JoinHandle<Result<EncoderStats>>>,
    upload: Option<JoinHandle<Result<StoredObjectInfo>>>,
}

impl ArchiveWriter {
    /// Start the upload and the encoder
    pub fn open(store: Arc<dyn ObjectStoreProvider>, path: impl Into<String>, config: &ArchiveConfig) -> Self {
        let path = path.into();
        let (block_tx, block_rx) = mpsc::channel::<Block>(config.buffered_chunks.max(1));
        let (entry_tx, entry_rx) = mpsc::channel::<EncoderMessage>(1);

        let upload_path = path.clone();
        let upload = tokio::spawn(async move {
            store
                .upload_stream(&upload_path, ZIP_CONTENT_TYPE, Box::pin(ReceiverStream::new(block_rx)))
                .await
        });

        let chunk_size = config.chunk_size.max(1);
        let level = config.compression_level;
        let encoder = tokio::task::spawn_blocking(move || run_encoder(entry_rx, block_tx, chunk_size, level));

        tracing::debug!("Opened archive stream to {}", path);

        Self {
            path,
            entries: Some(entry_tx),
            encoder: Some(encoder),
            upload: Some(upload),
        }
    }

    /// Destination object path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Append one member; waits while the encoder is still busy with the previous one
    pub async fn append(&mut self, entry: ArchiveEntry) -> Result<()> {
        let Some(entries) = self.entries.as_ref() else {
            return Err(Error::internal("archive writer already closed"));
        };

        let name = entry.name.clone();
        let size = entry.content.len();
        if entries.send(EncoderMessage::Entry(entry)).await.is_err() {
            // The encoder stopped; report why
            return Err(self.collect_failure().await);
        }

        tracing::debug!("Queued '{}' ({} bytes) for {}", name, size, self.path);
        Ok(())
    }

    /// Write the central directory and wait for both the encoder and the
    /// store to confirm; only then is the archive complete
    pub async fn finish(mut self) -> Result<ArchiveSummary> {
        let Some(entries) = self.entries.take() else {
            return Err(Error::internal("archive writer already closed"));
        };
        if entries.send(EncoderMessage::Finish).await.is_err() {
            return Err(self.collect_failure().await);
        }
        drop(entries);

        let stats = match self.join_encoder().await {
            Ok(stats) => stats,
            Err(e) => return Err(self.resolve_failure(e).await),
        };

        let object = self.join_upload().await?;
        tracing::info!(
            "Archive {} complete: {} entries, {} compressed bytes",
            object.uri,
            stats.entries,
            stats.compressed_bytes
        );

        Ok(ArchiveSummary {
            entries: stats.entries,
            compressed_bytes: stats.compressed_bytes,
            object,
        })
    }

    /// Abandon the archive and wait until the upload has given up
    pub async fn abort(mut self) {
        self.entries = None;
        if let Err(e) = self.join_encoder().await {
            tracing::debug!("Archive encoder for {} stopped: {}", self.path, e);
        }
        match self.join_upload().await {
            Ok(object) => tracing::warn!("Aborted archive {} was still uploaded", object.uri),
            Err(e) => tracing::debug!("Archive upload to {} abandoned: {}", self.path, e),
        }
    }

    async fn join_encoder(&mut self) -> Result<EncoderStats> {
        match self.encoder.take() {
            Some(handle) => handle
                .await
                .map_err(|e| Error::internal(format!("Archive encoder panicked: {}", e)))?,
            None => Err(Error::internal("archive encoder already joined")),
        }
    }

    async fn join_upload(&mut self) -> Result<StoredObjectInfo> {
        match self.upload.take() {
            Some(handle) => handle
                .await
                .map_err(|e| Error::internal(format!("Archive upload task failed: {}", e)))?,
            None => Err(Error::internal("archive upload already joined")),
        }
    }

    /// Wait for the upload to wind down. An encoder failure caused by a dead
    /// upload is reported as the upload's own error.
    async fn resolve_failure(&mut self, encoder_error: Error) -> Error {
        let upload = self.join_upload().await;
        match (encoder_error, upload) {
            (Error::Storage(_), Err(upload_error)) => upload_error,
            (encoder_error, _) => encoder_error,
        }
    }

    async fn collect_failure(&mut self) -> Error {
        self.entries = None;
        match self.join_encoder().await {
            Err(e) => self.resolve_failure(e).await,
            Ok(_) => Error::internal("archive encoder stopped unexpectedly"),
        }
    }
}

impl Drop for ArchiveWriter {
    fn drop(&mut self) {
        if self.encoder.is_some() || self.upload.is_some() {
            tracing::warn!("Archive stream to {} abandoned before completion", self.path);
        }
    }
}
