//! Per-change acceptance tracking.
//!
//! An [`AcceptanceState`] is initialized from one [`ComparisonResult`] and
//! holds exactly one boolean per change unit of that result. Every operation
//! that takes the result first checks that the state belongs to it.

use std::collections::BTreeMap;

use tracing::{debug, info};
use uuid::Uuid;

use crate::comparison::ComparisonResult;
use crate::errors::ReconcileError;
use crate::reconcile::ChangeKey;

/// Acceptance flag for every change unit of one comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptanceState {
    session_id: Uuid,
    entries: BTreeMap<ChangeKey, bool>,
}

impl AcceptanceState {
    /// Accept every change unit of `result`.
    pub fn initialize(result: &ComparisonResult) -> Self {
        let entries: BTreeMap<ChangeKey, bool> =
            result.change_keys().into_iter().map(|k| (k, true)).collect();
        info!(
            session_id = %result.session_id(),
            units = entries.len(),
            "acceptance state initialized"
        );
        Self {
            session_id: result.session_id(),
            entries,
        }
    }

    /// The comparison this state was initialized for.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Fail with [`ReconcileError::IllegalState`] unless this state was
    /// initialized from `result`.
    pub fn ensure_belongs_to(&self, result: &ComparisonResult) -> Result<(), ReconcileError> {
        if self.session_id != result.session_id() {
            return Err(ReconcileError::IllegalState {
                state: self.session_id,
                result: result.session_id(),
            });
        }
        Ok(())
    }

    /// Acceptance of `key`, or `None` if the state has no entry for it.
    pub fn is_accepted(&self, key: &ChangeKey) -> Option<bool> {
        self.entries.get(key).copied()
    }

    /// Like [`is_accepted`](Self::is_accepted) but a missing entry is an
    /// [`ReconcileError::IncompleteState`].
    pub(crate) fn require(&self, key: &ChangeKey) -> Result<bool, ReconcileError> {
        self.is_accepted(key)
            .ok_or_else(|| ReconcileError::IncompleteState(key.clone()))
    }

    /// Flip field diff `field_index` of changed record `diff_index`.
    pub fn toggle_field(
        &mut self,
        result: &ComparisonResult,
        diff_index: usize,
        field_index: usize,
    ) -> Result<bool, ReconcileError> {
        self.ensure_belongs_to(result)?;
        let key = result.field_key(diff_index, field_index)?;
        self.toggle(result, &key)
    }

    /// Flip the addition at `index`.
    pub fn toggle_addition(
        &mut self,
        result: &ComparisonResult,
        index: usize,
    ) -> Result<bool, ReconcileError> {
        self.ensure_belongs_to(result)?;
        let key = result.addition_key(index)?;
        self.toggle(result, &key)
    }

    /// Flip the deletion at `index`.
    pub fn toggle_deletion(
        &mut self,
        result: &ComparisonResult,
        index: usize,
    ) -> Result<bool, ReconcileError> {
        self.ensure_belongs_to(result)?;
        let key = result.deletion_key(index)?;
        self.toggle(result, &key)
    }

    /// Flip the unit named by `key`. Returns the new acceptance value.
    pub fn toggle(
        &mut self,
        result: &ComparisonResult,
        key: &ChangeKey,
    ) -> Result<bool, ReconcileError> {
        let current = self.entry(result, key)?;
        let flipped = !*current;
        *current = flipped;
        debug!(change = %key, accepted = flipped, "toggled change");
        Ok(flipped)
    }

    /// Set the acceptance of `key` explicitly.
    pub fn set(
        &mut self,
        result: &ComparisonResult,
        key: &ChangeKey,
        accepted: bool,
    ) -> Result<(), ReconcileError> {
        *self.entry(result, key)? = accepted;
        debug!(change = %key, accepted, "set change acceptance");
        Ok(())
    }

    /// Accept or reject every unit at once.
    pub fn set_all(&mut self, result: &ComparisonResult, accepted: bool) -> Result<(), ReconcileError> {
        self.ensure_belongs_to(result)?;
        self.entries.values_mut().for_each(|v| *v = accepted);
        debug!(accepted, units = self.entries.len(), "set all changes");
        Ok(())
    }

    fn entry(
        &mut self,
        result: &ComparisonResult,
        key: &ChangeKey,
    ) -> Result<&mut bool, ReconcileError> {
        self.ensure_belongs_to(result)?;
        if !result.contains(key) {
            return Err(ReconcileError::UnknownChange(key.clone()));
        }
        self.entries
            .get_mut(key)
            .ok_or_else(|| ReconcileError::IncompleteState(key.clone()))
    }

    /// Number of tracked change units.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn accepted_count(&self) -> usize {
        self.entries.values().filter(|v| **v).count()
    }

    pub fn rejected_count(&self) -> usize {
        self.len() - self.accepted_count()
    }

    /// All tracked keys with their acceptance, in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ChangeKey, bool)> {
        self.entries.iter().map(|(k, v)| (k, *v))
    }

    #[cfg(test)]
    pub(crate) fn remove_entry(&mut self, key: &ChangeKey) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::{FieldDiff, RecordDiff};
    use crate::models::Record;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn record(value: serde_json::Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    fn sample_result() -> ComparisonResult {
        ComparisonResult::new(
            "id",
            vec![
                RecordDiff::new(
                    7,
                    vec![
                        FieldDiff::new("email", "a@x.com", "b@x.com"),
                        FieldDiff::new("age", "30", "31"),
                    ],
                ),
                RecordDiff::new(8, vec![FieldDiff::new("name", "Ann", "Anna")]),
            ],
            vec![record(json!({"id": 9, "name": "New"}))],
            vec![record(json!({"id": 3, "name": "Old"})), record(json!({"id": 4}))],
        )
        .unwrap()
    }

    #[test]
    fn test_initialize_covers_exactly_the_result() {
        let result = sample_result();
        let state = AcceptanceState::initialize(&result);

        let expected: BTreeSet<ChangeKey> = result.change_keys().into_iter().collect();
        let actual: BTreeSet<ChangeKey> = state.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(actual, expected);
        assert_eq!(state.len(), 6);
        assert_eq!(state.accepted_count(), 6);
        assert!(state.iter().all(|(_, accepted)| accepted));
    }

    #[test]
    fn test_initialize_empty_result() {
        let result = ComparisonResult::empty("id").unwrap();
        let state = AcceptanceState::initialize(&result);
        assert!(state.is_empty());
    }

    #[test]
    fn test_toggle_field_flips_one_unit() {
        let result = sample_result();
        let mut state = AcceptanceState::initialize(&result);

        assert!(!state.toggle_field(&result, 0, 1).unwrap());
        assert_eq!(state.is_accepted(&ChangeKey::field("7", "age")), Some(false));
        assert_eq!(state.is_accepted(&ChangeKey::field("7", "email")), Some(true));
        assert_eq!(state.rejected_count(), 1);
    }

    #[test]
    fn test_double_flip_restores_value() {
        let result = sample_result();
        let mut state = AcceptanceState::initialize(&result);
        let before = state.clone();

        state.toggle_field(&result, 1, 0).unwrap();
        state.toggle_field(&result, 1, 0).unwrap();
        state.toggle_addition(&result, 0).unwrap();
        state.toggle_addition(&result, 0).unwrap();
        state.toggle_deletion(&result, 1).unwrap();
        state.toggle_deletion(&result, 1).unwrap();

        assert_eq!(state, before);
    }

    #[test]
    fn test_out_of_range_leaves_state_untouched() {
        let result = sample_result();
        let mut state = AcceptanceState::initialize(&result);
        let before = state.clone();

        assert!(matches!(
            state.toggle_field(&result, 2, 0),
            Err(ReconcileError::IndexOutOfRange { section: "differences", index: 2, len: 2 })
        ));
        assert!(matches!(
            state.toggle_field(&result, 0, 5),
            Err(ReconcileError::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            state.toggle_addition(&result, 1),
            Err(ReconcileError::IndexOutOfRange { section: "additions", .. })
        ));
        assert!(matches!(
            state.toggle_deletion(&result, 2),
            Err(ReconcileError::IndexOutOfRange { section: "deletions", .. })
        ));
        assert_eq!(state, before);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = sample_result();
        let mut state = AcceptanceState::initialize(&result);

        let key = ChangeKey::addition("3");
        assert_eq!(
            state.toggle(&result, &key),
            Err(ReconcileError::UnknownChange(key))
        );
    }

    #[test]
    fn test_stale_state_rejected() {
        let result = sample_result();
        let mut state = AcceptanceState::initialize(&result);

        // Same data, different comparison.
        let rerun = sample_result();
        assert!(matches!(
            state.toggle_field(&rerun, 0, 0),
            Err(ReconcileError::IllegalState { .. })
        ));
        assert!(matches!(
            state.set_all(&rerun, false),
            Err(ReconcileError::IllegalState { .. })
        ));
        assert_eq!(state.accepted_count(), 6);
    }

    #[test]
    fn test_set_and_set_all() {
        let result = sample_result();
        let mut state = AcceptanceState::initialize(&result);

        state.set_all(&result, false).unwrap();
        assert_eq!(state.accepted_count(), 0);

        state.set(&result, &ChangeKey::deletion("4"), true).unwrap();
        assert_eq!(state.is_accepted(&ChangeKey::deletion("4")), Some(true));
        assert_eq!(state.accepted_count(), 1);

        // Setting to the current value is a no-op.
        state.set(&result, &ChangeKey::deletion("4"), true).unwrap();
        assert_eq!(state.accepted_count(), 1);
    }

    #[test]
    fn test_keys_stable_across_identical_positions() {
        let result = sample_result();
        let mut state = AcceptanceState::initialize(&result);

        state.toggle(&result, &ChangeKey::field("8", "name")).unwrap();
        assert_eq!(state.is_accepted(&ChangeKey::field("8", "name")), Some(false));
        // The positional alias names the same unit.
        state.toggle_field(&result, 1, 0).unwrap();
        assert_eq!(state.is_accepted(&ChangeKey::field("8", "name")), Some(true));
    }
}
