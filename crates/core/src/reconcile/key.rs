//! Stable identity of a change unit.
//!
//! Acceptance is tracked per key rather than per position, so a key stays
//! valid no matter how a view of the result is filtered or reordered.

use std::str::FromStr;

use thiserror::Error;

use crate::models::RecordId;

/// The atomic granularity of acceptance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeKey {
    /// One changed field of a record present in both files.
    Field { record: RecordId, field: String },
    /// A record present only in the candidate file.
    Addition(RecordId),
    /// A record present only in the original file.
    Deletion(RecordId),
}

/// Which section of a comparison a change unit lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeKind {
    Field,
    Addition,
    Deletion,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Field => write!(f, "change"),
            Self::Addition => write!(f, "addition"),
            Self::Deletion => write!(f, "deletion"),
        }
    }
}

impl ChangeKey {
    pub fn field(record: impl Into<RecordId>, field: impl Into<String>) -> Self {
        Self::Field {
            record: record.into(),
            field: field.into(),
        }
    }

    pub fn addition(record: impl Into<RecordId>) -> Self {
        Self::Addition(record.into())
    }

    pub fn deletion(record: impl Into<RecordId>) -> Self {
        Self::Deletion(record.into())
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Field { .. } => ChangeKind::Field,
            Self::Addition(_) => ChangeKind::Addition,
            Self::Deletion(_) => ChangeKind::Deletion,
        }
    }

    pub fn record(&self) -> &RecordId {
        match self {
            Self::Field { record, .. } | Self::Addition(record) | Self::Deletion(record) => record,
        }
    }
}

/// Text form: `field:<record>:<field>`, `add:<record>`, `del:<record>`.
/// A `:` or `\` inside the record id or field name is written as `\:` or
/// `\\`.
impl std::fmt::Display for ChangeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Field { record, field } => write!(
                f,
                "field:{}:{}",
                escape(record.as_str()),
                escape(field)
            ),
            Self::Addition(record) => write!(f, "add:{}", escape(record.as_str())),
            Self::Deletion(record) => write!(f, "del:{}", escape(record.as_str())),
        }
    }
}

fn escape(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        if c == ':' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Split on unescaped `:` and unescape each part. `None` on a dangling `\`
/// or an escape of anything other than `:` or `\`.
fn split_escaped(s: &str) -> Option<Vec<String>> {
    let mut parts = vec![String::new()];
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(next @ (':' | '\\')) => parts.last_mut()?.push(next),
                _ => return None,
            },
            ':' => parts.push(String::new()),
            other => parts.last_mut()?.push(other),
        }
    }
    Some(parts)
}

/// A change key string that could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid change key '{input}': expected field:<id>:<field>, add:<id> or del:<id>")]
pub struct ParseChangeKeyError {
    input: String,
}

impl FromStr for ChangeKey {
    type Err = ParseChangeKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseChangeKeyError {
            input: s.to_string(),
        };
        let mut parts = split_escaped(s).ok_or_else(err)?.into_iter();
        let prefix = parts.next().ok_or_else(err)?;
        let rest: Vec<String> = parts.collect();
        match (prefix.as_str(), rest.as_slice()) {
            ("field", [record, field]) if !field.is_empty() => {
                Ok(Self::field(record.as_str(), field.as_str()))
            }
            ("add", [record]) => Ok(Self::addition(record.as_str())),
            ("del", [record]) => Ok(Self::deletion(record.as_str())),
            _ => Err(err()),
        }
    }
}
