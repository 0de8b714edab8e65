//! The archive-assembly pipeline
//!
//! ```text
//! RecordEnumerator -> EntrySource -> ArchiveWriter -> staging object -> published object
//!                          ^
//!                   ReferenceFetcher
//! ```

pub mod assembler;
pub mod entries;
pub mod enumerator;
pub mod fetcher;
pub mod pipeline;

pub use assembler::{ArchiveSummary, ArchiveWriter, ZIP_CONTENT_TYPE};
pub use entries::{EntrySource, SkippedReference};
pub use enumerator::RecordEnumerator;
pub use fetcher::ReferenceFetcher;
pub use pipeline::{DatasetExporter, ExportReport};
