//! Tabular rendering of stored files and change units.

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde_json::{json, Value};

use csvreconcile_core::comparison::ComparisonResult;
use csvreconcile_core::models::{CellValue, FileInfo, Record, RecordId};
use csvreconcile_core::reconcile::{AcceptanceState, ChangeKey, ChangeKind, FilteredView};

use crate::style;

const SUMMARY_WIDTH: usize = 60;

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

pub fn files_table(files: &[FileInfo]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ID", "Name", "Role", "Uploaded"]);

    for f in files {
        let role = if f.is_original { "original" } else { "comparison" };
        table.add_row(vec![
            Cell::new(&f.id),
            Cell::new(&f.name),
            Cell::new(role),
            Cell::new(f.uploaded_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }
    table
}

// ---------------------------------------------------------------------------
// Change units
// ---------------------------------------------------------------------------

/// One visible change unit, flattened for display.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub key: ChangeKey,
    pub field: String,
    pub before: String,
    pub after: String,
    pub accepted: bool,
}

/// Flatten a filtered view into display rows, in view order.
pub fn visible_units(
    result: &ComparisonResult,
    state: &AcceptanceState,
    view: &FilteredView<'_>,
) -> Vec<Unit> {
    let id_column = result.id_column();
    let accepted = |key: &ChangeKey| state.is_accepted(key).unwrap_or(false);
    let mut units = Vec::new();

    for diff in &view.differences {
        let record = diff.record_id();
        for fd in &diff.field_diffs {
            let key = ChangeKey::field(record.clone(), fd.field.clone());
            units.push(Unit {
                accepted: accepted(&key),
                key,
                field: fd.field.clone(),
                before: display_value(&fd.original_value),
                after: display_value(&fd.new_value),
            });
        }
    }
    for record in &view.additions {
        if let Some(id) = RecordId::of_record(record, id_column) {
            let key = ChangeKey::addition(id);
            units.push(Unit {
                accepted: accepted(&key),
                key,
                field: String::new(),
                before: String::new(),
                after: summarize(record, id_column),
            });
        }
    }
    for record in &view.deletions {
        if let Some(id) = RecordId::of_record(record, id_column) {
            let key = ChangeKey::deletion(id);
            units.push(Unit {
                accepted: accepted(&key),
                key,
                field: String::new(),
                before: summarize(record, id_column),
                after: String::new(),
            });
        }
    }
    units
}

pub fn units_table(units: &[Unit]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Key", "Kind", "Record", "Field", "Original", "New", "Decision"]);

    for u in units {
        table.add_row(vec![
            Cell::new(u.key.to_string()),
            Cell::new(style::kind_label(u.key.kind())),
            Cell::new(u.key.record().as_str()),
            Cell::new(&u.field),
            Cell::new(&u.before),
            Cell::new(&u.after),
            Cell::new(style::decision(u.accepted)),
        ]);
    }
    table
}

/// Single-line label for selection prompts.
pub fn describe(unit: &Unit) -> String {
    match unit.key.kind() {
        ChangeKind::Field => format!(
            "{} {}: {} → {}",
            unit.key.record(),
            unit.field,
            quoted(&unit.before),
            quoted(&unit.after)
        ),
        ChangeKind::Addition => format!("+ {} ({})", unit.key.record(), unit.after),
        ChangeKind::Deletion => format!("- {} ({})", unit.key.record(), unit.before),
    }
}

/// The filtered view in the service's wire shape.
pub fn view_json(result: &ComparisonResult, view: &FilteredView<'_>) -> Value {
    json!({
        "idColumn": result.id_column(),
        "differences": view.differences,
        "additions": view.additions,
        "deletions": view.deletions,
    })
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn display_value(value: &CellValue) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn quoted(s: &str) -> String {
    if s.is_empty() {
        "(empty)".to_string()
    } else {
        format!("'{}'", s)
    }
}

/// `name=Ann, city=Oslo` for every column except the id column.
pub fn summarize(record: &Record, id_column: &str) -> String {
    let joined = record
        .iter()
        .filter(|(k, _)| k.as_str() != id_column)
        .map(|(k, v)| format!("{}={}", k, display_value(v)))
        .collect::<Vec<_>>()
        .join(", ");
    truncate(&joined, SUMMARY_WIDTH)
}

pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
