//! Dataset service contracts and their HTTP implementation.

pub mod client;

use std::future::Future;

use crate::comparison::ComparisonResult;
use crate::errors::{ComparisonError, MergeError, TransportError};
use crate::models::FileInfo;
use crate::reconcile::MergePatch;

pub use client::ApiClient;

/// The remote operations the reconciliation workflow depends on.
///
/// Every call is a single request/response round trip: no streaming, no
/// retry. Methods take `&mut self` because a rejected credential is cleared
/// by the implementation.
pub trait DatasetService {
    /// All stored files visible to the current user.
    fn list_files(&mut self) -> impl Future<Output = Result<Vec<FileInfo>, TransportError>> + Send;

    /// Store a new CSV/XLSX file. Other file types are rejected before any
    /// request is made.
    fn upload_file(
        &mut self,
        name: &str,
        bytes: Vec<u8>,
        is_original: bool,
    ) -> impl Future<Output = Result<FileInfo, TransportError>> + Send;

    /// Raw file contents.
    fn download_file(
        &mut self,
        id: &str,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Compare `candidate_id` against `original_id`.
    fn compare(
        &mut self,
        original_id: &str,
        candidate_id: &str,
    ) -> impl Future<Output = Result<ComparisonResult, ComparisonError>> + Send;

    /// Apply `patch` to `original_id`, returning the new file id.
    fn apply_merge_patch(
        &mut self,
        original_id: &str,
        patch: &MergePatch,
    ) -> impl Future<Output = Result<String, MergeError>> + Send;
}
