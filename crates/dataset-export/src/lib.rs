//! dataset-export: streams a form's records and their referenced media files
//! into a single zip archive in object storage
//!
//! Records are read from a document database, serialized to `{id}.json`
//! entries, and scanned for string values that name media files
//! (`a.jpg`, `memo.mp3`, ...). Each referenced object is downloaded and
//! written as `{category}/{value}`. The archive is compressed while it is
//! being uploaded, so memory use does not grow with the archive.

pub mod config;
pub mod error;
pub mod export;
pub mod providers;
pub mod server;
pub mod types;

pub use config::ExportConfig;
pub use error::{Error, Result};
pub use export::{DatasetExporter, ExportReport};
pub use types::{ArchiveEntry, Category, FieldValue, FileReference, FormScope, Record, RecordId};
