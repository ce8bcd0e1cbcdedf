//! Domain model types shared by the API client and the reconciliation engine.
//!
//! These mirror the JSON the dataset service speaks (camelCase keys).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A single cell value as sent by the service. Values are passed through
/// verbatim; no type coercion happens client-side.
pub type CellValue = serde_json::Value;

/// One dataset row: field name to value, in column order.
pub type Record = serde_json::Map<String, CellValue>;

/// Stable textual identity of a record, derived from its id-column value.
///
/// String cells are used as-is; any other JSON value uses its compact JSON
/// rendering, so `7` and `"7"` map to the same id.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the identity of an id-column value.
    pub fn from_value(value: &CellValue) -> Self {
        match value {
            CellValue::String(s) => Self(s.clone()),
            CellValue::Null => Self(String::new()),
            other => Self(other.to_string()),
        }
    }

    /// Identity of `record` under `id_column`, if the column is present.
    pub fn of_record(record: &Record, id_column: &str) -> Option<Self> {
        record.get(id_column).map(Self::from_value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// A dataset stored by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_original: bool,
    pub uploaded_at: DateTime<Utc>,
}

/// File kinds the service accepts for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Csv,
    Xlsx,
}

impl UploadKind {
    /// Classify a file name by extension (case-insensitive).
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = std::path::Path::new(name)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" => Some(Self::Xlsx),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// An authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "_id")]
    pub id: String,
    pub username: String,
}
