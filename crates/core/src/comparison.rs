//! The comparison result returned by the dataset service.
//!
//! A [`ComparisonResult`] is validated once on construction and is read-only
//! afterwards. Each instance carries a fresh session id so that acceptance
//! state initialized for one comparison is never applied to another.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::errors::{ComparisonError, ReconcileError};
use crate::models::{CellValue, Record, RecordId};
use crate::reconcile::ChangeKey;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One changed field of a record present in both datasets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDiff {
    pub field: String,
    pub original_value: CellValue,
    pub new_value: CellValue,
}

impl FieldDiff {
    pub fn new(
        field: impl Into<String>,
        original_value: impl Into<CellValue>,
        new_value: impl Into<CellValue>,
    ) -> Self {
        Self {
            field: field.into(),
            original_value: original_value.into(),
            new_value: new_value.into(),
        }
    }
}

/// All changed fields of one record, keyed by its id-column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDiff {
    /// The id-column value, kept verbatim for the merge payload.
    pub id: CellValue,
    /// Changed fields in column order. The service calls this `differences`.
    #[serde(rename = "differences")]
    pub field_diffs: Vec<FieldDiff>,
}

impl RecordDiff {
    pub fn new(id: impl Into<CellValue>, field_diffs: Vec<FieldDiff>) -> Self {
        Self {
            id: id.into(),
            field_diffs,
        }
    }

    pub fn record_id(&self) -> RecordId {
        RecordId::from_value(&self.id)
    }

    /// Stable key of the field diff at `field_index`.
    pub fn field_key(&self, field_index: usize) -> Option<ChangeKey> {
        self.field_diffs
            .get(field_index)
            .map(|fd| ChangeKey::field(self.record_id(), fd.field.clone()))
    }
}

/// Counts derived from the three change sequences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub differences_count: usize,
    pub additions_count: usize,
    pub deletions_count: usize,
}

/// The comparison payload exactly as the service sends it, before
/// validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonPayload {
    pub id_column: String,
    #[serde(default)]
    pub differences: Vec<RecordDiff>,
    #[serde(default)]
    pub additions: Vec<Record>,
    #[serde(default)]
    pub deletions: Vec<Record>,
    #[serde(default)]
    pub summary: Option<Summary>,
}

/// A validated, immutable comparison of a candidate file against an
/// original file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    #[serde(skip)]
    session_id: Uuid,
    id_column: String,
    differences: Vec<RecordDiff>,
    additions: Vec<Record>,
    deletions: Vec<Record>,
    summary: Summary,
    #[serde(skip)]
    addition_ids: Vec<RecordId>,
    #[serde(skip)]
    deletion_ids: Vec<RecordId>,
}

// ---------------------------------------------------------------------------
// Construction & validation
// ---------------------------------------------------------------------------

impl ComparisonResult {
    /// Build and validate a comparison result.
    pub fn new(
        id_column: impl Into<String>,
        differences: Vec<RecordDiff>,
        additions: Vec<Record>,
        deletions: Vec<Record>,
    ) -> Result<Self, ComparisonError> {
        let id_column = id_column.into();
        if id_column.trim().is_empty() {
            return Err(ComparisonError::EmptyIdColumn);
        }

        validate_differences(&differences)?;
        let addition_ids = collect_ids("additions", &additions, &id_column)?;
        let deletion_ids = collect_ids("deletions", &deletions, &id_column)?;

        let summary = Summary {
            differences_count: differences.len(),
            additions_count: additions.len(),
            deletions_count: deletions.len(),
        };

        let session_id = Uuid::new_v4();
        debug!(
            %session_id,
            id_column = %id_column,
            differences = summary.differences_count,
            additions = summary.additions_count,
            deletions = summary.deletions_count,
            "comparison result validated"
        );

        Ok(Self {
            session_id,
            id_column,
            differences,
            additions,
            deletions,
            summary,
            addition_ids,
            deletion_ids,
        })
    }

    /// The empty comparison: nothing changed between the two files.
    pub fn empty(id_column: impl Into<String>) -> Result<Self, ComparisonError> {
        Self::new(id_column, Vec::new(), Vec::new(), Vec::new())
    }
}

impl TryFrom<ComparisonPayload> for ComparisonResult {
    type Error = ComparisonError;

    fn try_from(payload: ComparisonPayload) -> Result<Self, Self::Error> {
        let result = Self::new(
            payload.id_column,
            payload.differences,
            payload.additions,
            payload.deletions,
        )?;

        if let Some(reported) = payload.summary {
            let actual = result.summary;
            check_count("differences", reported.differences_count, actual.differences_count)?;
            check_count("additions", reported.additions_count, actual.additions_count)?;
            check_count("deletions", reported.deletions_count, actual.deletions_count)?;
        }

        Ok(result)
    }
}

fn check_count(section: &'static str, reported: usize, actual: usize) -> Result<(), ComparisonError> {
    if reported != actual {
        return Err(ComparisonError::SummaryMismatch {
            section,
            reported,
            actual,
        });
    }
    Ok(())
}

fn validate_differences(differences: &[RecordDiff]) -> Result<(), ComparisonError> {
    let mut seen = HashSet::new();
    for diff in differences {
        let record = diff.record_id();
        if !seen.insert(record.clone()) {
            return Err(ComparisonError::DuplicateRecord {
                section: "differences",
                record: record.to_string(),
            });
        }
        if diff.field_diffs.is_empty() {
            return Err(ComparisonError::EmptyRecordDiff(record.to_string()));
        }

        let mut fields = HashSet::new();
        for fd in &diff.field_diffs {
            if !fields.insert(fd.field.as_str()) {
                return Err(ComparisonError::DuplicateField {
                    record: record.to_string(),
                    field: fd.field.clone(),
                });
            }
            if fd.original_value == fd.new_value {
                return Err(ComparisonError::UnchangedField {
                    record: record.to_string(),
                    field: fd.field.clone(),
                });
            }
        }
    }
    Ok(())
}

fn collect_ids(
    section: &'static str,
    records: &[Record],
    id_column: &str,
) -> Result<Vec<RecordId>, ComparisonError> {
    let mut seen = HashSet::new();
    let mut ids = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let id = RecordId::of_record(record, id_column).ok_or_else(|| {
            ComparisonError::MissingIdColumn {
                section,
                index,
                id_column: id_column.to_string(),
            }
        })?;
        if !seen.insert(id.clone()) {
            return Err(ComparisonError::DuplicateRecord {
                section,
                record: id.to_string(),
            });
        }
        ids.push(id);
    }
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Accessors
// ---------------------------------------------------------------------------

impl ComparisonResult {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn differences(&self) -> &[RecordDiff] {
        &self.differences
    }

    pub fn additions(&self) -> &[Record] {
        &self.additions
    }

    pub fn deletions(&self) -> &[Record] {
        &self.deletions
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    /// Total number of change units (field diffs + additions + deletions).
    pub fn unit_count(&self) -> usize {
        self.differences
            .iter()
            .map(|d| d.field_diffs.len())
            .sum::<usize>()
            + self.additions.len()
            + self.deletions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.differences.is_empty() && self.additions.is_empty() && self.deletions.is_empty()
    }

    /// Every change unit in result order: field diffs record by record,
    /// then additions, then deletions.
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
        keys.extend(self.addition_ids.iter().cloned().map(ChangeKey::Addition));
        keys.extend(self.deletion_ids.iter().cloned().map(ChangeKey::Deletion));
        keys
    }

    /// Whether `key` names a change unit of this result.
    pub fn contains(&self, key: &ChangeKey) -> bool {
        match key {
            ChangeKey::Field { record, field } => self
                .differences
                .iter()
                .find(|d| &d.record_id() == record)
                .is_some_and(|d| d.field_diffs.iter().any(|fd| &fd.field == field)),
            ChangeKey::Addition(record) => self.addition_ids.contains(record),
            ChangeKey::Deletion(record) => self.deletion_ids.contains(record),
        }
    }

    /// Key of field diff `field_index` of changed record `diff_index`.
    pub fn field_key(&self, diff_index: usize, field_index: usize) -> Result<ChangeKey, ReconcileError> {
        let diff = self
            .differences
            .get(diff_index)
            .ok_or(ReconcileError::IndexOutOfRange {
                section: "differences",
                index: diff_index,
                len: self.differences.len(),
            })?;
        diff.field_key(field_index)
            .ok_or(ReconcileError::IndexOutOfRange {
                section: "field differences",
                index: field_index,
                len: diff.field_diffs.len(),
            })
    }

    /// Key of the addition at `index`.
    pub fn addition_key(&self, index: usize) -> Result<ChangeKey, ReconcileError> {
        self.addition_ids
            .get(index)
            .cloned()
            .map(ChangeKey::Addition)
            .ok_or(ReconcileError::IndexOutOfRange {
                section: "additions",
                index,
                len: self.addition_ids.len(),
            })
    }

    /// Key of the deletion at `index`.
    pub fn deletion_key(&self, index: usize) -> Result<ChangeKey, ReconcileError> {
        self.deletion_ids
            .get(index)
            .cloned()
            .map(ChangeKey::Deletion)
            .ok_or(ReconcileError::IndexOutOfRange {
                section: "deletions",
                index,
                len: self.deletion_ids.len(),
            })
    }

    /// Added records paired with their ids, in order.
    pub(crate) fn keyed_additions(&self) -> impl Iterator<Item = (&RecordId, &Record)> {
        self.addition_ids.iter().zip(&self.additions)
    }

    /// Deleted records paired with their ids, in order.
    pub(crate) fn keyed_deletions(&self) -> impl Iterator<Item = (&RecordId, &Record)> {
        self.deletion_ids.iter().zip(&self.deletions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn sample_payload() -> serde_json::Value {
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

    #[test]
    fn test_parse_service_payload() {
        let payload: ComparisonPayload = serde_json::from_value(sample_payload()).unwrap();
        let result = ComparisonResult::try_from(payload).unwrap();

        assert_eq!(result.id_column(), "id");
        assert_eq!(result.differences().len(), 1);
        assert_eq!(result.differences()[0].field_diffs[1].field, "age");
        assert_eq!(result.unit_count(), 4);
        assert_eq!(
            result.summary(),
            Summary {
                differences_count: 1,
                additions_count: 1,
                deletions_count: 1
            }
        );
    }

    #[test]
    fn test_change_keys_in_result_order() {
        let payload: ComparisonPayload = serde_json::from_value(sample_payload()).unwrap();
        let result = ComparisonResult::try_from(payload).unwrap();

        let keys: Vec<String> = result.change_keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["field:7:email", "field:7:age", "add:9", "del:3"]);
        assert!(result.contains(&ChangeKey::field("7", "age")));
        assert!(!result.contains(&ChangeKey::field("7", "name")));
        assert!(!result.contains(&ChangeKey::addition("3")));
    }

    #[test]
    fn test_each_result_gets_its_own_session() {
        let a = ComparisonResult::empty("id").unwrap();
        let b = ComparisonResult::empty("id").unwrap();
        assert_ne!(a.session_id(), b.session_id());
        assert_eq!(a.clone().session_id(), a.session_id());
    }

    #[test]
    fn test_empty_id_column_rejected() {
        let result = ComparisonResult::empty("  ");
        assert!(matches!(result, Err(ComparisonError::EmptyIdColumn)));
    }

    #[test]
    fn test_missing_id_column_rejected() {
        let result = ComparisonResult::new(
            "id",
            vec![],
            vec![record(json!({"name": "no id"}))],
            vec![],
        );
        assert!(matches!(
            result,
            Err(ComparisonError::MissingIdColumn { section: "additions", index: 0, .. })
        ));
    }

    #[test]
    fn test_unchanged_field_rejected() {
        let diff = RecordDiff::new(1, vec![FieldDiff::new("age", "30", "30")]);
        let result = ComparisonResult::new("id", vec![diff], vec![], vec![]);
        assert!(matches!(result, Err(ComparisonError::UnchangedField { .. })));
    }

    #[test]
    fn test_empty_record_diff_rejected() {
        let result = ComparisonResult::new("id", vec![RecordDiff::new(1, vec![])], vec![], vec![]);
        assert!(matches!(result, Err(ComparisonError::EmptyRecordDiff(_))));
    }

    #[test]
    fn test_duplicates_rejected() {
        let diffs = vec![
            RecordDiff::new(1, vec![FieldDiff::new("a", "x", "y")]),
            RecordDiff::new("1", vec![FieldDiff::new("b", "x", "y")]),
        ];
        let result = ComparisonResult::new("id", diffs, vec![], vec![]);
        assert!(matches!(
            result,
            Err(ComparisonError::DuplicateRecord { section: "differences", .. })
        ));

        let diff = RecordDiff::new(
            1,
            vec![FieldDiff::new("a", "x", "y"), FieldDiff::new("a", "y", "z")],
        );
        let result = ComparisonResult::new("id", vec![diff], vec![], vec![]);
        assert!(matches!(result, Err(ComparisonError::DuplicateField { .. })));

        let dels = vec![record(json!({"id": 3})), record(json!({"id": 3}))];
        let result = ComparisonResult::new("id", vec![], vec![], dels);
        assert!(matches!(
            result,
            Err(ComparisonError::DuplicateRecord { section: "deletions", .. })
        ));
    }

    #[test]
    fn test_summary_mismatch_rejected() {
        let mut payload = sample_payload();
        payload["summary"]["additionsCount"] = json!(5);
        let payload: ComparisonPayload = serde_json::from_value(payload).unwrap();
        let result = ComparisonResult::try_from(payload);
        assert!(matches!(
            result,
            Err(ComparisonError::SummaryMismatch { section: "additions", reported: 5, actual: 1 })
        ));
    }

    #[test]
    fn test_summary_is_optional_on_the_wire() {
        let mut payload = sample_payload();
        payload.as_object_mut().unwrap().remove("summary");
        let payload: ComparisonPayload = serde_json::from_value(payload).unwrap();
        let result = ComparisonResult::try_from(payload).unwrap();
        assert_eq!(result.summary().deletions_count, 1);
    }

    #[test]
    fn test_positional_keys() {
        let payload: ComparisonPayload = serde_json::from_value(sample_payload()).unwrap();
        let result = ComparisonResult::try_from(payload).unwrap();

        assert_eq!(result.field_key(0, 1).unwrap(), ChangeKey::field("7", "age"));
        assert_eq!(result.addition_key(0).unwrap(), ChangeKey::addition("9"));
        assert_eq!(result.deletion_key(0).unwrap(), ChangeKey::deletion("3"));
        assert_eq!(
            result.field_key(0, 2),
            Err(ReconcileError::IndexOutOfRange {
                section: "field differences",
                index: 2,
                len: 2
            })
        );
        assert!(result.field_key(1, 0).is_err());
        assert!(result.deletion_key(1).is_err());
    }
}
