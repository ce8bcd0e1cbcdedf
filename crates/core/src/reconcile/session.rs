//! Reconciliation session and the compare → review → merge workflow.
//!
//! A [`ReconcileSession`] owns one comparison together with its acceptance
//! state and view mode so the three can never drift apart. The
//! [`Reconciler`] drives sessions against a [`DatasetService`]: it starts a
//! session on a successful compare, keeps it across failed merges, and
//! drops it once a merge has been applied.

use tracing::{info, instrument, warn};

use crate::api::DatasetService;
use crate::comparison::ComparisonResult;
use crate::errors::{ComparisonError, MergeError, ReconcileError, TransportError};
use crate::models::FileInfo;
use crate::reconcile::{
    build_plan, filter, AcceptanceState, ChangeKey, FilteredView, MergePatch, VisibilityMode,
};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One active comparison under review.
#[derive(Debug, Clone)]
pub struct ReconcileSession {
    original_id: String,
    candidate_id: String,
    result: ComparisonResult,
    state: AcceptanceState,
    mode: VisibilityMode,
}

impl ReconcileSession {
    /// Start reviewing `result` with every change accepted.
    pub fn new(
        original_id: impl Into<String>,
        candidate_id: impl Into<String>,
        result: ComparisonResult,
    ) -> Self {
        let state = AcceptanceState::initialize(&result);
        Self {
            original_id: original_id.into(),
            candidate_id: candidate_id.into(),
            result,
            state,
            mode: VisibilityMode::default(),
        }
    }

    pub fn original_id(&self) -> &str {
        &self.original_id
    }

    pub fn candidate_id(&self) -> &str {
        &self.candidate_id
    }

    pub fn result(&self) -> &ComparisonResult {
        &self.result
    }

    pub fn state(&self) -> &AcceptanceState {
        &self.state
    }

    pub fn mode(&self) -> VisibilityMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: VisibilityMode) {
        self.mode = mode;
    }

    /// Switch between showing all changes and pending changes only.
    pub fn toggle_mode(&mut self) -> VisibilityMode {
        self.mode = self.mode.toggled();
        self.mode
    }

    pub fn toggle_field(&mut self, diff_index: usize, field_index: usize) -> Result<bool, ReconcileError> {
        self.state.toggle_field(&self.result, diff_index, field_index)
    }

    pub fn toggle_addition(&mut self, index: usize) -> Result<bool, ReconcileError> {
        self.state.toggle_addition(&self.result, index)
    }

    pub fn toggle_deletion(&mut self, index: usize) -> Result<bool, ReconcileError> {
        self.state.toggle_deletion(&self.result, index)
    }

    pub fn toggle(&mut self, key: &ChangeKey) -> Result<bool, ReconcileError> {
        self.state.toggle(&self.result, key)
    }

    pub fn set(&mut self, key: &ChangeKey, accepted: bool) -> Result<(), ReconcileError> {
        self.state.set(&self.result, key, accepted)
    }

    pub fn set_all(&mut self, accepted: bool) -> Result<(), ReconcileError> {
        self.state.set_all(&self.result, accepted)
    }

    /// The currently visible changes, recomputed on every call.
    pub fn view(&self) -> Result<FilteredView<'_>, ReconcileError> {
        filter(&self.result, &self.state, self.mode)
    }

    /// The patch of currently accepted changes.
    pub fn plan(&self) -> Result<MergePatch, ReconcileError> {
        build_plan(&self.result, &self.state)
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Result of a successful merge.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Identifier of the merged file version.
    pub new_file_id: String,
    /// The patch that was submitted.
    pub patch: MergePatch,
    /// Whether the file list was refreshed afterwards.
    pub refreshed: bool,
}

/// Drives reconciliation sessions against a dataset service.
///
/// All workflow operations take `&mut self`, so a compare or merge cannot be
/// issued while another one is still outstanding.
pub struct Reconciler<S> {
    service: S,
    files: Vec<FileInfo>,
    session: Option<ReconcileSession>,
}

impl<S: DatasetService> Reconciler<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            files: Vec::new(),
            session: None,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    pub fn into_service(self) -> S {
        self.service
    }

    /// Files as of the last refresh, newest upload first.
    pub fn files(&self) -> &[FileInfo] {
        &self.files
    }

    /// Files that may serve as the base of a comparison.
    pub fn originals(&self) -> impl Iterator<Item = &FileInfo> {
        self.files.iter().filter(|f| f.is_original)
    }

    /// Reload the file list from the service.
    #[instrument(skip(self))]
    pub async fn refresh_files(&mut self) -> Result<&[FileInfo], TransportError> {
        let files = self.service.list_files().await?;
        info!(count = files.len(), "file list refreshed");
        self.files = files;
        Ok(&self.files)
    }

    /// Upload a dataset and add it to the front of the cached file list.
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub async fn upload(
        &mut self,
        name: &str,
        bytes: Vec<u8>,
        is_original: bool,
    ) -> Result<FileInfo, TransportError> {
        let file = self.service.upload_file(name, bytes, is_original).await?;
        info!(id = %file.id, name = %file.name, is_original, "file uploaded");
        self.files.insert(0, file.clone());
        Ok(file)
    }

    /// Fetch the raw bytes of a stored file.
    pub async fn download(&mut self, id: &str) -> Result<Vec<u8>, TransportError> {
        self.service.download_file(id).await
    }

    /// Compare `candidate_id` against `original_id` and start a new session.
    ///
    /// Any previous session is discarded first, so a failed compare leaves
    /// no session behind.
    #[instrument(skip(self))]
    pub async fn compare(
        &mut self,
        original_id: &str,
        candidate_id: &str,
    ) -> Result<&mut ReconcileSession, ComparisonError> {
        if original_id.trim().is_empty() || candidate_id.trim().is_empty() {
            return Err(ComparisonError::InvalidRequest(
                "select both an original file and a file to compare".into(),
            ));
        }

        self.session = None;
        let result = self.service.compare(original_id, candidate_id).await?;
        let summary = result.summary();
        info!(
            differences = summary.differences_count,
            additions = summary.additions_count,
            deletions = summary.deletions_count,
            "comparison session started"
        );
        Ok(self
            .session
            .insert(ReconcileSession::new(original_id, candidate_id, result)))
    }

    pub fn session(&self) -> Option<&ReconcileSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut ReconcileSession> {
        self.session.as_mut()
    }

    /// Abandon the active session without merging.
    pub fn discard_session(&mut self) {
        if self.session.take().is_some() {
            info!("comparison session discarded");
        }
    }

    /// Submit the accepted changes to the original file.
    ///
    /// On success the session is concluded and the file list refreshed; a
    /// failed refresh is reported through [`MergeOutcome::refreshed`]. On
    /// failure the session is kept unchanged for a retry.
    #[instrument(skip(self))]
    pub async fn merge(&mut self) -> Result<MergeOutcome, MergeError> {
        let session = self.session.as_ref().ok_or(MergeError::NoSession)?;
        let patch = session.plan()?;
        let original_id = session.original_id().to_string();

        let new_file_id = match self.service.apply_merge_patch(&original_id, &patch).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "merge failed, session kept for retry");
                return Err(e);
            }
        };
        info!(new_file_id = %new_file_id, units = patch.unit_count(), "merge applied");

        self.session = None;
        let refreshed = match self.refresh_files().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "failed to refresh file list after merge");
                false
            }
        };

        Ok(MergeOutcome {
            new_file_id,
            patch,
            refreshed,
        })
    }
}
