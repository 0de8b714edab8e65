//! Core types for records, file references and archive entries

pub mod entry;
pub mod record;

pub use entry::{ArchiveEntry, Category, FileReference};
pub use record::{FieldValue, FormScope, Record, RecordId};
