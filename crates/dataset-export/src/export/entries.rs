//! Lazy production of archive entries
//!
//! Entries come out in archive order: a record's JSON entry, then one entry
//! per file reference in that record (field order), then the next record.
//! At most one referenced file is held in memory at a time.

use std::collections::{HashSet, VecDeque};
use std::vec;

use crate::config::MissingReferencePolicy;
use crate::error::{Error, Result};
use crate::types::{ArchiveEntry, FileReference, RecordId};

use super::enumerator::RecordEnumerator;
use super::fetcher::ReferenceFetcher;

/// A reference left out of the archive under `MissingReferencePolicy::Skip`
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SkippedReference {
    pub record_id: RecordId,
    pub path: String,
}

/// Pull-based entry producer
pub struct EntrySource<'a> {
    enumerator: &'a RecordEnumerator,
    fetcher: &'a ReferenceFetcher,
    policy: MissingReferencePolicy,
    ids: vec::IntoIter<RecordId>,
    current: Option<RecordId>,
    pending: VecDeque<FileReference>,
    emitted_files: HashSet<String>,
    skipped: Vec<SkippedReference>,
    records: usize,
    files: usize,
}

impl<'a> EntrySource<'a> {
    pub fn new(
        enumerator: &'a RecordEnumerator,
        fetcher: &'a ReferenceFetcher,
        ids: Vec<RecordId>,
        policy: MissingReferencePolicy,
    ) -> Self {
        Self {
            enumerator,
            fetcher,
            policy,
            ids: ids.into_iter(),
            current: None,
            pending: VecDeque::new(),
            emitted_files: HashSet::new(),
            skipped: Vec::new(),
            records: 0,
            files: 0,
        }
    }

    /// Next entry, or `None` once every record and reference is consumed
    pub async fn next_entry(&mut self) -> Result<Option<ArchiveEntry>> {
        loop {
            if let Some(reference) = self.pending.pop_front() {
                let name = reference.entry_name();
                // Zip member names must be unique; the same path always holds the same bytes
                if self.emitted_files.contains(&name) {
                    tracing::debug!("'{}' already archived, not fetching again", name);
                    continue;
                }

                match self.fetcher.fetch(&reference).await {
                    Ok(content) => {
                        self.emitted_files.insert(name);
                        self.files += 1;
                        return Ok(Some(ArchiveEntry::for_reference(&reference, content)));
                    }
                    Err(Error::ReferenceNotFound(path))
                        if self.policy == MissingReferencePolicy::Skip =>
                    {
                        let record_id = self.current.clone().unwrap_or_else(|| RecordId::from(""));
                        tracing::warn!(
                            "Skipping missing file '{}' referenced by record {}",
                            path,
                            record_id
                        );
                        self.skipped.push(SkippedReference { record_id, path });
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            let Some(id) = self.ids.next() else {
                return Ok(None);
            };

            let record = self.enumerator.fetch_record(&id).await?;
            let entry = ArchiveEntry::for_record(&record)
                .map_err(|e| Error::record_fetch(id.as_str(), format!("Failed to serialize: {}", e)))?;

            self.pending = FileReference::from_record(&record).into();
            self.current = Some(id);
            self.records += 1;
            return Ok(Some(entry));
        }
    }

    /// Records emitted so far
    pub fn records(&self) -> usize {
        self.records
    }

    /// File entries emitted so far
    pub fn files(&self) -> usize {
        self.files
    }

    pub fn into_skipped(self) -> Vec<SkippedReference> {
        self.skipped
    }
}
