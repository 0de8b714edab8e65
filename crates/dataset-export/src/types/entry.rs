//! File categories, file references and archive entries

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::record::Record;

const IMAGE_TYPES: &[&str] = &["jpg", "png", "svg"];
const AUDIO_TYPES: &[&str] = &["mp3"];
const VIDEO_TYPES: &[&str] = &["mp4"];
const DOCUMENT_TYPES: &[&str] = &["pdf"];

/// Category of a referenced file, decided by its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Image,
    Audio,
    Video,
    Document,
}

impl Category {
    /// Classify a string field value.
    ///
    /// The extension is whatever follows the last `.`. A value without a dot
    /// never matches, even one spelled like an extension. Matching is exact
    /// and case-sensitive.
    pub fn classify(value: &str) -> Option<Self> {
        let (_, extension) = value.rsplit_once('.')?;

        if IMAGE_TYPES.contains(&extension) {
            Some(Category::Image)
        } else if AUDIO_TYPES.contains(&extension) {
            Some(Category::Audio)
        } else if VIDEO_TYPES.contains(&extension) {
            Some(Category::Video)
        } else if DOCUMENT_TYPES.contains(&extension) {
            Some(Category::Document)
        } else {
            None
        }
    }

    /// Directory name used both in storage and inside the archive
    pub fn dir(&self) -> &'static str {
        match self {
            Category::Image => "images",
            Category::Audio => "audios",
            Category::Video => "videos",
            Category::Document => "documents",
        }
    }
}

/// A string field value interpreted as a path to a stored object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileReference {
    pub category: Category,
    /// The raw field value, e.g. `photo123.jpg`
    pub value: String,
}

impl FileReference {
    /// Classify a value; `None` when its extension is not a known category
    pub fn from_value(value: &str) -> Option<Self> {
        Category::classify(value).map(|category| Self {
            category,
            value: value.to_string(),
        })
    }

    /// Every reference in a record, in field order
    pub fn from_record(record: &Record) -> Vec<Self> {
        record
            .string_values()
            .filter_map(|(_, value)| Self::from_value(value))
            .collect()
    }

    /// Storage path: `{source_prefix}/{category-dir}/{value}`
    pub fn object_path(&self, source_prefix: &str) -> String {
        format!("{}/{}/{}", source_prefix.trim_end_matches('/'), self.category.dir(), self.value)
    }

    /// Archive member name: `{category-dir}/{value}`
    pub fn entry_name(&self) -> String {
        format!("{}/{}", self.category.dir(), self.value)
    }
}

/// One named payload inside the archive
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    pub name: String,
    pub content: Bytes,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// `{recordId}.json` holding the record's serialized fields
    pub fn for_record(record: &Record) -> serde_json::Result<Self> {
        Ok(Self::new(format!("{}.json", record.id), record.to_json()?))
    }

    /// `{category-dir}/{value}` holding the referenced object's bytes
    pub fn for_reference(reference: &FileReference, content: Bytes) -> Self {
        Self::new(reference.entry_name(), content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_extensions() {
        assert_eq!(Category::classify("a.jpg"), Some(Category::Image));
        assert_eq!(Category::classify("scan.png"), Some(Category::Image));
        assert_eq!(Category::classify("logo.svg"), Some(Category::Image));
        assert_eq!(Category::classify("clip.mp3"), Some(Category::Audio));
        assert_eq!(Category::classify("movie.mp4"), Some(Category::Video));
        assert_eq!(Category::classify("form.pdf"), Some(Category::Document));
    }

    #[test]
    fn test_classify_uses_last_dot() {
        assert_eq!(Category::classify("archive.pdf.jpg"), Some(Category::Image));
        assert_eq!(Category::classify("photo.jpg.txt"), None);
    }

    #[test]
    fn test_classify_no_match() {
        assert_eq!(Category::classify("hello"), None);
        assert_eq!(Category::classify("jpg"), None);
        assert_eq!(Category::classify(""), None);
        assert_eq!(Category::classify("trailing."), None);
        assert_eq!(Category::classify("upper.JPG"), None);
        assert_eq!(Category::classify("notes.docx"), None);
    }

    #[test]
    fn test_reference_paths() {
        let reference = FileReference::from_value("photo123.jpg").unwrap();
        assert_eq!(reference.object_path("private"), "private/images/photo123.jpg");
        assert_eq!(reference.object_path("private/"), "private/images/photo123.jpg");
        assert_eq!(reference.entry_name(), "images/photo123.jpg");

        let reference = FileReference::from_value("memo.mp3").unwrap();
        assert_eq!(reference.entry_name(), "audios/memo.mp3");
    }

    #[test]
    fn test_references_from_record() {
        let record = Record::new("r1")
            .with_field("video", "v.mp4")
            .with_field("note", "hello")
            .with_field("attachment", "a.pdf");

        let references = FileReference::from_record(&record);
        let names: Vec<_> = references.iter().map(|r| r.entry_name()).collect();
        assert_eq!(names, vec!["documents/a.pdf", "videos/v.mp4"]);
    }

    #[test]
    fn test_record_entry_name() {
        let entry = ArchiveEntry::for_record(&Record::new("r1")).unwrap();
        assert_eq!(entry.name, "r1.json");
        assert_eq!(&entry.content[..], b"{}");
    }
}
