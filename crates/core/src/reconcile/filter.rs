//! View derivation over a comparison and its acceptance state.

use serde::{Deserialize, Serialize};

use crate::comparison::{ComparisonResult, RecordDiff};
use crate::errors::ReconcileError;
use crate::models::Record;
use crate::reconcile::{AcceptanceState, ChangeKey};

/// Which changes a view shows. Does not affect acceptance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityMode {
    /// Every change, accepted or not.
    #[default]
    ShowAll,
    /// Only changes still pending application, i.e. currently accepted.
    ShowPendingOnly,
}

impl VisibilityMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::ShowAll => Self::ShowPendingOnly,
            Self::ShowPendingOnly => Self::ShowAll,
        }
    }
}

impl std::fmt::Display for VisibilityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShowAll => write!(f, "all changes"),
            Self::ShowPendingOnly => write!(f, "pending changes only"),
        }
    }
}

/// The visible subset of a comparison, borrowing from it. Element order
/// matches the comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredView<'a> {
    pub differences: Vec<&'a RecordDiff>,
    pub additions: Vec<&'a Record>,
    pub deletions: Vec<&'a Record>,
}

impl FilteredView<'_> {
    pub fn is_empty(&self) -> bool {
        self.differences.is_empty() && self.additions.is_empty() && self.deletions.is_empty()
    }
}

/// Derive the visible subset of `result`.
///
/// Under [`VisibilityMode::ShowPendingOnly`] a changed record is shown when
/// at least one of its field diffs is accepted, and then all of its field
/// diffs stay visible. Additions and deletions are shown when accepted.
pub fn filter<'a>(
    result: &'a ComparisonResult,
    state: &AcceptanceState,
    mode: VisibilityMode,
) -> Result<FilteredView<'a>, ReconcileError> {
    state.ensure_belongs_to(result)?;
    let show_all = mode == VisibilityMode::ShowAll;

    let mut differences = Vec::new();
    for diff in result.differences() {
        let record = diff.record_id();
        let mut any_accepted = false;
        for fd in &diff.field_diffs {
            any_accepted |= state.require(&ChangeKey::field(record.clone(), fd.field.clone()))?;
        }
        if show_all || any_accepted {
            differences.push(diff);
        }
    }

    let mut additions = Vec::new();
    for (id, record) in result.keyed_additions() {
        if state.require(&ChangeKey::Addition(id.clone()))? || show_all {
            additions.push(record);
        }
    }

    let mut deletions = Vec::new();
    for (id, record) in result.keyed_deletions() {
        if state.require(&ChangeKey::Deletion(id.clone()))? || show_all {
            deletions.push(record);
        }
    }

    Ok(FilteredView {
        differences,
        additions,
        deletions,
    })
}
