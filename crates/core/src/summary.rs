//! Run summary accumulation and rendering.
//!
//! One [`SyncSummaryEntry`] is collected per changed user. At the end of a
//! run the summary is rendered as a dry-run table, a line-oriented log, or a
//! single JSON document, depending on what the operator asked for.

use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

use crate::models::{SyncStatus, SyncSummaryEntry, NOTE_CREATED, NOTE_UPDATED};

/// Headers of the dry-run table.
pub const TABLE_HEADERS: [&str; 7] = [
    "First Name",
    "Last Name",
    "Username",
    "Email",
    "Employee #",
    "Location Id",
    "Status",
];

/// Which final report the operator requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    /// No final report beyond logging.
    Quiet,
    /// One log line per entry.
    Text,
    /// A single JSON document on stdout.
    Json,
}

impl ReportMode {
    /// JSON wins when both flags are set.
    pub fn from_flags(summary: bool, json_summary: bool) -> Self {
        if json_summary {
            Self::Json
        } else if summary {
            Self::Text
        } else {
            Self::Quiet
        }
    }
}

/// Severity of a rendered summary line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineLevel {
    Info,
    Error,
}

/// A single line of the text report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryLine {
    pub level: LineLevel,
    pub text: String,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    error: bool,
    error_message: &'a str,
    summary: &'a [SyncSummaryEntry],
}

/// Append-only list of per-user outcomes for one run.
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    entries: Vec<SyncSummaryEntry>,
}

impl SyncSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: SyncSummaryEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[SyncSummaryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn created_count(&self) -> usize {
        self.count_note(SyncStatus::Success, NOTE_CREATED)
    }

    pub fn updated_count(&self) -> usize {
        self.count_note(SyncStatus::Success, NOTE_UPDATED)
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == SyncStatus::Error)
            .count()
    }

    fn count_note(&self, status: SyncStatus, note: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == status && e.note == note)
            .count()
    }

    /// Render the dry-run table.
    pub fn render_table(&self) -> String {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(TABLE_HEADERS.to_vec());

        for entry in &self.entries {
            let status_cell = match entry.status {
                SyncStatus::Success => Cell::new(&entry.note).fg(Color::Green),
                SyncStatus::Error => Cell::new(format!("ERROR: {}", entry.note)).fg(Color::Red),
            };
            table.add_row(vec![
                Cell::new(&entry.firstname),
                Cell::new(&entry.lastname),
                Cell::new(&entry.username),
                Cell::new(&entry.email),
                Cell::new(&entry.employee_number),
                Cell::new(
                    entry
                        .location_id
                        .map(|id| id.to_string())
                        .unwrap_or_default(),
                ),
                status_cell,
            ]);
        }

        table.to_string()
    }

    /// Render the line-oriented report: one info line per entry plus an
    /// error line for every failed entry.
    pub fn render_lines(&self) -> Vec<SummaryLine> {
        let mut lines = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            lines.push(SummaryLine {
                level: LineLevel::Info,
                text: format!("USER: {} {}", entry.username, status_word(entry)),
            });
            if entry.status == SyncStatus::Error {
                lines.push(SummaryLine {
                    level: LineLevel::Error,
                    text: format!("ERROR: {}", entry.note),
                });
            }
        }
        lines
    }

    /// Render the JSON success document.
    pub fn render_json(&self) -> String {
        render_json_report(false, "", &self.entries)
    }
}

fn status_word(entry: &SyncSummaryEntry) -> &str {
    match entry.status {
        SyncStatus::Success => &entry.note,
        SyncStatus::Error => "ERROR",
    }
}

/// Render the JSON error document for a fatal run failure.
pub fn render_json_error(message: &str) -> String {
    render_json_report(true, message, &[])
}

fn render_json_report(error: bool, error_message: &str, summary: &[SyncSummaryEntry]) -> String {
    let report = JsonReport {
        error,
        error_message,
        summary,
    };
    // Serializing plain strings, integers and unit enums cannot fail.
    serde_json::to_string(&report).unwrap_or_default()
}
