//! csvreconcile core library.
//!
//! This crate provides the selective change-reconciliation engine for
//! CSV/XLSX datasets: the comparison model, per-change acceptance, view
//! filtering, merge planning, and the client for the remote dataset
//! service that performs comparisons and applies merges.

pub mod api;
pub mod comparison;
pub mod config;
pub mod credential;
pub mod errors;
pub mod models;
pub mod reconcile;

// Re-exports for convenience.
pub use api::{ApiClient, DatasetService};
pub use comparison::{ComparisonResult, FieldDiff, RecordDiff, Summary};
pub use config::AppConfig;
pub use credential::{Credential, CredentialStore};
pub use reconcile::{
    build_plan, filter, AcceptanceState, ChangeKey, MergePatch, ReconcileSession, Reconciler,
    VisibilityMode,
};
