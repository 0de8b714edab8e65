//! Record types: a submitted form response and its field values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The (project, form) pair every record belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormScope {
    pub project_id: String,
    pub form_id: String,
}

impl FormScope {
    pub fn new(project_id: impl Into<String>, form_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            form_id: form_id.into(),
        }
    }

    /// Collection path of the form's records
    pub fn collection_path(&self) -> String {
        format!("projects/{}/forms/{}/data", self.project_id, self.form_id)
    }

    /// Base name shared by the archive object and its staging copy
    pub fn archive_stem(&self) -> String {
        format!("{}_{}", self.project_id, self.form_id)
    }
}

impl std::fmt::Display for FormScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.project_id, self.form_id)
    }
}

/// Opaque record identifier, unique within a form scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId(s)
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Field values use the Firestore value encoding, e.g. `{"stringValue": "a.jpg"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldValue {
    NullValue(NullValue),
    BooleanValue(bool),
    /// int64 travels as a decimal string
    IntegerValue(String),
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    /// base64
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(GeoPoint),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

impl FieldValue {
    /// The string payload, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::StringValue(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::StringValue(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullValue {
    #[serde(rename = "NULL_VALUE")]
    NullValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<FieldValue>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

/// One submitted form response
///
/// Fields iterate in field-name order, which fixes the order of the file
/// entries a record contributes to an archive.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insertion
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Top-level string values, in field order
    pub fn string_values(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .filter_map(|(name, value)| value.as_str().map(|s| (name.as_str(), s)))
    }

    /// The record's field map serialized as a JSON document
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.fields)
    }
}
