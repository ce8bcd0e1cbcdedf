//! Error types for the csvreconcile core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

use crate::reconcile::ChangeKey;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Comparison(#[from] ComparisonError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

// ---------------------------------------------------------------------------
// Comparison errors
// ---------------------------------------------------------------------------

/// A compare request failed or returned structurally invalid data.
///
/// When this is returned no comparison session is started.
#[derive(Debug, Error)]
pub enum ComparisonError {
    /// The compare request itself failed (network, unknown file, missing
    /// id column reported by the service, ...).
    #[error("compare request failed: {0}")]
    Request(#[from] TransportError),

    /// The caller supplied an unusable pair of file ids.
    #[error("invalid compare request: {0}")]
    InvalidRequest(String),

    /// The result names no identifier column.
    #[error("comparison result has an empty id column")]
    EmptyIdColumn,

    /// An added or deleted record does not carry the identifier column.
    #[error("{section} record at position {index} is missing id column '{id_column}'")]
    MissingIdColumn {
        section: &'static str,
        index: usize,
        id_column: String,
    },

    /// A changed record lists no field changes.
    #[error("changed record '{0}' has no field differences")]
    EmptyRecordDiff(String),

    /// A field diff whose original and new values are equal.
    #[error("field '{field}' of record '{record}' is reported as changed but values are equal")]
    UnchangedField { record: String, field: String },

    /// The same record id appears twice in one section.
    #[error("record '{record}' appears more than once in {section}")]
    DuplicateRecord {
        section: &'static str,
        record: String,
    },

    /// The same field appears twice inside one changed record.
    #[error("field '{field}' appears more than once in changed record '{record}'")]
    DuplicateField { record: String, field: String },

    /// The summary sent by the service disagrees with the sequences.
    #[error("summary mismatch for {section}: reported {reported}, actual {actual}")]
    SummaryMismatch {
        section: &'static str,
        reported: usize,
        actual: usize,
    },
}

// ---------------------------------------------------------------------------
// Reconciliation state errors
// ---------------------------------------------------------------------------

/// Misuse of the acceptance state machine.
///
/// These never occur under correct usage: they indicate a state and a
/// result that do not belong together, or a stale reference into a view.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// The acceptance state was initialized for a different comparison.
    #[error("acceptance state belongs to comparison {state}, not {result}")]
    IllegalState {
        state: uuid::Uuid,
        result: uuid::Uuid,
    },

    /// A change unit of the result has no acceptance entry.
    #[error("acceptance state has no entry for change '{0}'")]
    IncompleteState(ChangeKey),

    /// A positional reference points past the end of a section.
    #[error("{section} index {index} out of range (len {len})")]
    IndexOutOfRange {
        section: &'static str,
        index: usize,
        len: usize,
    },

    /// A stable key names no change unit of the result.
    #[error("unknown change '{0}'")]
    UnknownChange(ChangeKey),
}

// ---------------------------------------------------------------------------
// Merge errors
// ---------------------------------------------------------------------------

/// Merge submission failed. The session is left untouched so the user can
/// retry without comparing again.
#[derive(Debug, Error)]
pub enum MergeError {
    /// There is no active comparison to merge.
    #[error("no active comparison session")]
    NoSession,

    /// The merge plan could not be built.
    #[error("failed to build merge plan: {0}")]
    Plan(#[from] ReconcileError),

    /// The merge request failed.
    #[error("merge request failed: {0}")]
    Request(#[from] TransportError),

    /// The service accepted the merge but did not return a file id.
    #[error("merge response did not contain a new file id")]
    MissingFileId,
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Errors from the dataset service HTTP client.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP-level transport error (network, TLS, timeout, body decode).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service returned a non-success status code.
    #[error("service error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The service rejected the credential. It has been cleared locally.
    #[error("credential rejected by the service, please log in again")]
    Unauthorized,

    /// No credential is available for an authenticated request.
    #[error("not logged in")]
    NotAuthenticated,

    /// Only CSV and XLSX files may be uploaded.
    #[error("unsupported file type '{0}': only .csv and .xlsx are accepted")]
    UnsupportedFileType(String),

    /// The response body did not have the expected shape.
    #[error("invalid service response: {0}")]
    InvalidResponse(String),

    /// Local I/O while preparing an upload.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether this error means the user has to authenticate again.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::NotAuthenticated)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Credential store errors
// ---------------------------------------------------------------------------

/// Errors from the on-disk credential store.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No platform configuration directory could be determined.
    #[error("could not determine a configuration directory for the credential file")]
    NoConfigDir,

    /// The stored credential could not be decoded.
    #[error("credential file '{path}' is corrupt: {detail}")]
    Corrupt { path: String, detail: String },

    /// Generic I/O error.
    #[error("credential I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
