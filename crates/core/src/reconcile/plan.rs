//! Projection of a comparison and its acceptance state into a merge patch.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::comparison::{ComparisonResult, RecordDiff};
use crate::errors::ReconcileError;
use crate::models::{Record, RecordId};
use crate::reconcile::{AcceptanceState, ChangeKey};

/// The accepted changes only, in the shape the merge endpoint expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergePatch {
    /// Lets the merge endpoint correlate records on its own.
    pub id_column: String,
    pub differences: Vec<RecordDiff>,
    pub additions: Vec<Record>,
    pub deletions: Vec<Record>,
}

impl MergePatch {
    pub fn is_empty(&self) -> bool {
        self.differences.is_empty() && self.additions.is_empty() && self.deletions.is_empty()
    }

    /// Number of change units carried by the patch.
    pub fn unit_count(&self) -> usize {
        self.differences
            .iter()
            .map(|d| d.field_diffs.len())
            .sum::<usize>()
            + self.additions.len()
            + self.deletions.len()
    }

    /// The change units carried by the patch, in patch order.
    pub fn change_keys(&self) -> Vec<ChangeKey> {
        let mut keys = Vec::with_capacity(self.unit_count());
        for diff in &self.differences {
            let record = diff.record_id();
            keys.extend(
                diff.field_diffs
                    .iter()
                    .map(|fd| ChangeKey::field(record.clone(), fd.field.clone())),
            );
        }
        let id_of = |r: &Record| RecordId::of_record(r, &self.id_column).unwrap_or_default();
        keys.extend(self.additions.iter().map(|r| ChangeKey::Addition(id_of(r))));
        keys.extend(self.deletions.iter().map(|r| ChangeKey::Deletion(id_of(r))));
        keys
    }
}

/// Build the minimal patch of accepted changes.
///
/// A changed record keeps only its accepted field diffs, in original order,
/// and is dropped when none are accepted. Accepted additions and deletions
/// are copied verbatim.
pub fn build_plan(
    result: &ComparisonResult,
    state: &AcceptanceState,
) -> Result<MergePatch, ReconcileError> {
    state.ensure_belongs_to(result)?;

    let mut differences = Vec::new();
    for diff in result.differences() {
        let record = diff.record_id();
        let mut accepted = Vec::new();
        for fd in &diff.field_diffs {
            if state.require(&ChangeKey::field(record.clone(), fd.field.clone()))? {
                accepted.push(fd.clone());
            }
        }
        if !accepted.is_empty() {
            differences.push(RecordDiff {
                id: diff.id.clone(),
                field_diffs: accepted,
            });
        }
    }

    let mut additions = Vec::new();
    for (id, record) in result.keyed_additions() {
        if state.require(&ChangeKey::Addition(id.clone()))? {
            additions.push(record.clone());
        }
    }

    let mut deletions = Vec::new();
    for (id, record) in result.keyed_deletions() {
        if state.require(&ChangeKey::Deletion(id.clone()))? {
            deletions.push(record.clone());
        }
    }

    let patch = MergePatch {
        id_column: result.id_column().to_string(),
        differences,
        additions,
        deletions,
    };
    debug!(
        records = patch.differences.len(),
        additions = patch.additions.len(),
        deletions = patch.deletions.len(),
        units = patch.unit_count(),
        "built merge plan"
    );
    Ok(patch)
}
