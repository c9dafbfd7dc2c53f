//! Terminal styling for `ldapsync` output.

use console::Style;

fn badge(style: Style, mark: &str, msg: &str) -> String {
    format!("{} {}", style.apply_to(mark), msg)
}

/// Green check mark prefix, for runs and commands that went through.
pub fn success(msg: &str) -> String {
    badge(Style::new().green(), "✓", msg)
}

/// Red cross prefix, for fatal sync errors and per-user failures.
pub fn error(msg: &str) -> String {
    badge(Style::new().red(), "✗", msg)
}

/// Yellow warning prefix, for runs that finished with failed users.
pub fn warn(msg: &str) -> String {
    badge(Style::new().yellow(), "⚠", msg)
}

/// Bold text, used above the dry-run table.
pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

/// Dimmed text for footers.
pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}
