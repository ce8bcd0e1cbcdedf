//! End-to-end tests for the compare → review → merge workflow.
//!
//! These drive the real `Reconciler` against an in-memory dataset service
//! that records every merge patch it receives. No network I/O.

use chrono::{TimeZone, Utc};
use serde_json::json;

use csvreconcile_core::api::DatasetService;
use csvreconcile_core::comparison::{ComparisonPayload, ComparisonResult};
use csvreconcile_core::errors::{ComparisonError, MergeError, ReconcileError, TransportError};
use csvreconcile_core::models::FileInfo;
use csvreconcile_core::reconcile::{ChangeKey, MergePatch, Reconciler, VisibilityMode};

// ===========================================================================
// Fake service
// ===========================================================================

#[derive(Default)]
struct FakeService {
    files: Vec<FileInfo>,
    comparison: Option<serde_json::Value>,
    fail_merge: bool,
    fail_list: bool,
    list_calls: usize,
    merged: Vec<(String, MergePatch)>,
}

impl DatasetService for FakeService {
    async fn list_files(&mut self) -> Result<Vec<FileInfo>, TransportError> {
        self.list_calls += 1;
        if self.fail_list {
            return Err(TransportError::Api {
                status: 503,
                message: "unavailable".into(),
            });
        }
        Ok(self.files.clone())
    }

    async fn upload_file(
        &mut self,
        name: &str,
        _bytes: Vec<u8>,
        is_original: bool,
    ) -> Result<FileInfo, TransportError> {
        let file = file_info(&format!("f{}", self.files.len() + 1), name, is_original);
        self.files.insert(0, file.clone());
        Ok(file)
    }

    async fn download_file(&mut self, id: &str) -> Result<Vec<u8>, TransportError> {
        Ok(format!("id\n{}\n", id).into_bytes())
    }

    async fn compare(
        &mut self,
        _original_id: &str,
        _candidate_id: &str,
    ) -> Result<ComparisonResult, ComparisonError> {
        let value = self.comparison.clone().ok_or_else(|| {
            ComparisonError::Request(TransportError::Api {
                status: 404,
                message: "File not found".into(),
            })
        })?;
        let payload: ComparisonPayload = serde_json::from_value(value)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
        ComparisonResult::try_from(payload)
    }

    async fn apply_merge_patch(
        &mut self,
        original_id: &str,
        patch: &MergePatch,
    ) -> Result<String, MergeError> {
        if self.fail_merge {
            return Err(MergeError::Request(TransportError::Api {
                status: 409,
                message: "original changed".into(),
            }));
        }
        self.merged.push((original_id.to_string(), patch.clone()));
        let new_id = format!("merged-{}", self.merged.len());
        self.files.insert(0, file_info(&new_id, "people_updated.csv", true));
        Ok(new_id)
    }
}

// ===========================================================================
// Helpers
// ===========================================================================

fn file_info(id: &str, name: &str, is_original: bool) -> FileInfo {
    FileInfo {
        id: id.to_string(),
        name: name.to_string(),
        is_original,
        uploaded_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
    }
}

fn people_comparison() -> serde_json::Value {
    json!({
        "idColumn": "id",
        "differences": [
            {"id": 7, "differences": [
                {"field": "email", "originalValue": "a@x.com", "newValue": "b@x.com"},
                {"field": "age", "originalValue": "30", "newValue": "31"}
            ]}
        ],
        "additions": [{"id": 9, "name": "New"}],
        "deletions": [{"id": 3, "name": "Old"}],
        "summary": {"differencesCount": 1, "additionsCount": 1, "deletionsCount": 1}
    })
}

fn service() -> FakeService {
    FakeService {
        files: vec![
            file_info("f2", "people_new.csv", false),
            file_info("f1", "people.csv", true),
        ],
        comparison: Some(people_comparison()),
        ..FakeService::default()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn test_reject_one_field_and_merge() {
    let mut reconciler = Reconciler::new(service());
    reconciler.refresh_files().await.unwrap();
    assert_eq!(reconciler.originals().count(), 1);

    let session = reconciler.compare("f1", "f2").await.unwrap();
    assert_eq!(session.state().accepted_count(), 4);
    // Reject the age change.
    assert!(!session.toggle_field(0, 1).unwrap());

    let expected = json!({
        "idColumn": "id",
        "differences": [
            {"id": 7, "differences": [
                {"field": "email", "originalValue": "a@x.com", "newValue": "b@x.com"}
            ]}
        ],
        "additions": [{"id": 9, "name": "New"}],
        "deletions": [{"id": 3, "name": "Old"}]
    });
    assert_eq!(serde_json::to_value(session.plan().unwrap()).unwrap(), expected);

    let outcome = reconciler.merge().await.unwrap();
    assert_eq!(outcome.new_file_id, "merged-1");
    assert!(outcome.refreshed);
    assert_eq!(serde_json::to_value(&outcome.patch).unwrap(), expected);

    // The session is concluded and the file list reloaded.
    assert!(reconciler.session().is_none());
    assert_eq!(reconciler.files()[0].id, "merged-1");

    let service = reconciler.into_service();
    assert_eq!(service.list_calls, 2);
    assert_eq!(service.merged.len(), 1);
    assert_eq!(service.merged[0].0, "f1");
}

#[tokio::test]
async fn test_failed_merge_keeps_session_for_retry() {
    let mut svc = service();
    svc.fail_merge = true;
    let mut reconciler = Reconciler::new(svc);

    let session = reconciler.compare("f1", "f2").await.unwrap();
    session.toggle(&ChangeKey::deletion("3")).unwrap();
    session.set_mode(VisibilityMode::ShowPendingOnly);
    let before = session.state().clone();

    let err = reconciler.merge().await.unwrap_err();
    assert!(matches!(err, MergeError::Request(TransportError::Api { status: 409, .. })));

    let session = reconciler.session().expect("session kept after failed merge");
    assert_eq!(session.state(), &before);
    assert_eq!(session.mode(), VisibilityMode::ShowPendingOnly);
    assert!(session.view().unwrap().deletions.is_empty());

    // Retry without comparing again.
    reconciler.service_mut().fail_merge = false;
    let outcome = reconciler.merge().await.unwrap();
    assert!(outcome.patch.deletions.is_empty());
    assert_eq!(outcome.patch.additions.len(), 1);
}

#[tokio::test]
async fn test_failed_compare_starts_no_session() {
    let mut reconciler = Reconciler::new(service());
    reconciler.compare("f1", "f2").await.unwrap();
    assert!(reconciler.session().is_some());

    reconciler.service_mut().comparison = None;
    let err = reconciler.compare("f1", "nope").await.unwrap_err();
    assert!(matches!(
        err,
        ComparisonError::Request(TransportError::Api { status: 404, .. })
    ));
    assert!(reconciler.session().is_none());
}

#[tokio::test]
async fn test_invalid_comparison_payload_rejected() {
    let mut svc = service();
    let mut payload = people_comparison();
    payload["idColumn"] = json!("");
    svc.comparison = Some(payload);
    let mut reconciler = Reconciler::new(svc);

    let err = reconciler.compare("f1", "f2").await.unwrap_err();
    assert!(matches!(err, ComparisonError::EmptyIdColumn));
    assert!(reconciler.session().is_none());
}

#[tokio::test]
async fn test_compare_requires_both_ids() {
    let mut reconciler = Reconciler::new(service());
    let err = reconciler.compare("", "f2").await.unwrap_err();
    assert!(matches!(err, ComparisonError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_new_compare_invalidates_old_state() {
    let mut reconciler = Reconciler::new(service());
    let old = reconciler.compare("f1", "f2").await.unwrap().clone();

    let fresh = reconciler.compare("f1", "f2").await.unwrap();
    assert_ne!(fresh.result().session_id(), old.result().session_id());
    assert_eq!(fresh.state().accepted_count(), 4);

    let mut stale = old.state().clone();
    assert!(matches!(
        stale.toggle_field(fresh.result(), 0, 0),
        Err(ReconcileError::IllegalState { .. })
    ));
}

#[tokio::test]
async fn test_merge_without_session() {
    let mut reconciler = Reconciler::new(service());
    assert!(matches!(
        reconciler.merge().await,
        Err(MergeError::NoSession)
    ));
}

#[tokio::test]
async fn test_refresh_failure_after_merge_is_reported() {
    let mut reconciler = Reconciler::new(service());
    reconciler.compare("f1", "f2").await.unwrap();
    reconciler.service_mut().fail_list = true;

    let outcome = reconciler.merge().await.unwrap();
    assert!(!outcome.refreshed);
    assert!(reconciler.session().is_none());
}

#[tokio::test]
async fn test_empty_comparison_merges_empty_patch() {
    let mut svc = service();
    svc.comparison = Some(json!({"idColumn": "id"}));
    let mut reconciler = Reconciler::new(svc);

    let session = reconciler.compare("f1", "f1").await.unwrap();
    assert!(session.result().is_empty());
    assert!(session.view().unwrap().is_empty());

    let outcome = reconciler.merge().await.unwrap();
    assert!(outcome.patch.is_empty());
    assert_eq!(
        serde_json::to_value(&outcome.patch).unwrap(),
        json!({"idColumn": "id", "differences": [], "additions": [], "deletions": []})
    );
}

#[tokio::test]
async fn test_upload_and_download() {
    let mut reconciler = Reconciler::new(service());
    reconciler.refresh_files().await.unwrap();

    let file = reconciler
        .upload("extra.csv", b"id\n1\n".to_vec(), true)
        .await
        .unwrap();
    assert_eq!(reconciler.files()[0], file);
    assert_eq!(reconciler.originals().count(), 2);

    let bytes = reconciler.download("f1").await.unwrap();
    assert_eq!(bytes, b"id\nf1\n");
}

#[tokio::test]
async fn test_discard_session() {
    let mut reconciler = Reconciler::new(service());
    reconciler.compare("f1", "f2").await.unwrap();
    reconciler.discard_session();
    assert!(reconciler.session().is_none());
    assert!(reconciler.service().merged.is_empty());
}
