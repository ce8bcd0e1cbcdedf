//! Interactive review of a comparison session.
//!
//! The user walks the visible change units, flips decisions with a
//! multi-select, switches between showing all changes and pending changes
//! only, and finally merges or quits. A failed merge returns to the menu
//! with every decision intact.

use anyhow::{Context, Result};
use dialoguer::{Confirm, MultiSelect, Select};

use csvreconcile_core::api::ApiClient;
use csvreconcile_core::errors::MergeError;
use csvreconcile_core::reconcile::{ReconcileSession, Reconciler, VisibilityMode};

use crate::render::{self, Unit};
use crate::style;

enum Action {
    Select,
    ToggleMode,
    AcceptAll,
    RejectAll,
    Merge,
    Quit,
}

/// Run the review menu until the session is merged or abandoned.
pub async fn run(reconciler: &mut Reconciler<ApiClient>) -> Result<()> {
    loop {
        let Some(session) = reconciler.session_mut() else {
            return Ok(());
        };
        let units = print_session(session)?;

        match prompt_action(session.mode())? {
            Action::Select => select_units(session, &units)?,
            Action::ToggleMode => {
                let mode = session.toggle_mode();
                println!("{}", style::dim(&format!("Now showing: {}", mode)));
            }
            Action::AcceptAll => session.set_all(true)?,
            Action::RejectAll => session.set_all(false)?,
            Action::Merge => {
                if confirm_merge(session)? && merge(reconciler).await? {
                    return Ok(());
                }
            }
            Action::Quit => {
                reconciler.discard_session();
                println!("{}", style::dim("Review abandoned, nothing merged."));
                return Ok(());
            }
        }
    }
}

fn print_session(session: &ReconcileSession) -> Result<Vec<Unit>> {
    let result = session.result();
    let summary = result.summary();
    let view = session.view()?;
    let units = render::visible_units(result, session.state(), &view);

    println!();
    println!(
        "{}",
        style::header(&format!(
            "{} → {}  ({} changed records, {} additions, {} deletions)",
            session.candidate_id(),
            session.original_id(),
            summary.differences_count,
            summary.additions_count,
            summary.deletions_count
        ))
    );
    println!(
        "{}",
        style::dim(&format!(
            "Showing: {}  |  {} accepted, {} rejected",
            session.mode(),
            session.state().accepted_count(),
            session.state().rejected_count()
        ))
    );
    if units.is_empty() {
        println!("{}", style::dim("(no changes to show)"));
    } else {
        println!("{}", render::units_table(&units));
    }
    Ok(units)
}

fn prompt_action(mode: VisibilityMode) -> Result<Action> {
    let toggle_label = match mode {
        VisibilityMode::ShowAll => "Show pending changes only",
        VisibilityMode::ShowPendingOnly => "Show all changes",
    };
    let items = [
        "Choose accepted changes",
        toggle_label,
        "Accept all",
        "Reject all",
        "Merge accepted changes",
        "Quit without merging",
    ];
    let choice = Select::new()
        .with_prompt("Action")
        .items(&items)
        .default(0)
        .interact()
        .context("failed to read action")?;

    Ok(match choice {
        0 => Action::Select,
        1 => Action::ToggleMode,
        2 => Action::AcceptAll,
        3 => Action::RejectAll,
        4 => Action::Merge,
        _ => Action::Quit,
    })
}

/// Checked items become accepted, unchecked items rejected. Units hidden by
/// the current view keep their decision.
fn select_units(session: &mut ReconcileSession, units: &[Unit]) -> Result<()> {
    if units.is_empty() {
        println!("{}", style::dim("Nothing to select in this view."));
        return Ok(());
    }

    let labels: Vec<String> = units.iter().map(render::describe).collect();
    let defaults: Vec<bool> = units.iter().map(|u| u.accepted).collect();
    let chosen = MultiSelect::new()
        .with_prompt("Space to toggle, enter to confirm")
        .items(&labels)
        .defaults(&defaults)
        .interact()
        .context("failed to read selection")?;

    for (idx, unit) in units.iter().enumerate() {
        session.set(&unit.key, chosen.contains(&idx))?;
    }
    Ok(())
}

fn confirm_merge(session: &ReconcileSession) -> Result<bool> {
    let accepted = session.state().accepted_count();
    if accepted == 0 {
        println!(
            "{}",
            style::warn("No changes accepted; merging will produce an unchanged copy.")
        );
    }
    Confirm::new()
        .with_prompt(format!(
            "Merge {} accepted change(s) into {}?",
            accepted,
            session.original_id()
        ))
        .default(false)
        .interact()
        .context("failed to read confirmation")
}

/// Returns `true` once the merge has been applied. Failures other than a
/// lost login are reported and leave the session in place.
async fn merge(reconciler: &mut Reconciler<ApiClient>) -> Result<bool> {
    let spinner = style::spinner("Applying merge...");
    let outcome = reconciler.merge().await;
    spinner.finish_and_clear();

    match outcome {
        Ok(outcome) => {
            println!(
                "{}",
                style::success(&format!(
                    "Merged {} change(s), new file {}",
                    outcome.patch.unit_count(),
                    outcome.new_file_id
                ))
            );
            if !outcome.refreshed {
                println!("{}", style::warn("Could not refresh the file list."));
            }
            Ok(true)
        }
        Err(MergeError::Request(e)) if e.requires_login() => Err(e.into()),
        Err(e) => {
            println!("{}", style::error(&format!("Merge failed: {}", e)));
            println!("{}", style::dim("Your selections are kept; retry or quit."));
            Ok(false)
        }
    }
}
