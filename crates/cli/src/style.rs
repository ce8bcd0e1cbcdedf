//! Shared styling utilities for terminal output.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use csvreconcile_core::reconcile::ChangeKind;

/// Green check mark followed by `msg`.
pub fn success(msg: &str) -> String {
    format!("{} {}", Style::new().green().apply_to("✓"), msg)
}

/// Red cross followed by `msg`.
pub fn error(msg: &str) -> String {
    format!("{} {}", Style::new().red().apply_to("✗"), msg)
}

/// Yellow warning sign followed by `msg`.
pub fn warn(msg: &str) -> String {
    format!("{} {}", Style::new().yellow().apply_to("⚠"), msg)
}

/// Bold text in the terminal's default colour.
pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

/// Faint text for secondary information.
pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// Acceptance marker for a change unit.
pub fn decision(accepted: bool) -> String {
    if accepted {
        Style::new().green().apply_to("accept").to_string()
    } else {
        Style::new().red().dim().apply_to("reject").to_string()
    }
}

/// Label for a change kind: changes blue, additions green, deletions red.
pub fn kind_label(kind: ChangeKind) -> String {
    let style = match kind {
        ChangeKind::Field => Style::new().blue().bold(),
        ChangeKind::Addition => Style::new().green().bold(),
        ChangeKind::Deletion => Style::new().red().bold(),
    };
    style.apply_to(kind).to_string()
}

/// A steadily ticking spinner for a pending network call.
pub fn spinner(msg: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let template = ProgressStyle::with_template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(template.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"]));
    spinner.set_message(msg.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
