//! Domain model types used throughout LdapSync.
//!
//! These types bridge the directory client, the sync engine, the database
//! layer, and the summary reporter.

use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Maximum length of any string column on a local user.
pub const MAX_FIELD_LENGTH: usize = 191;

/// `userAccountControl` values that denote an enabled AD account
/// (normal account, optionally with password-never-expires, smartcard,
/// password-not-required or delegation bits set).
pub const ENABLED_ACCOUNT_CODES: &[&str] = &[
    "512", "544", "66048", "66080", "262656", "262688", "328192", "328224", "4260352",
];

/// Whether an account-status attribute value denotes an enabled account.
pub fn is_enabled_account_code(value: &str) -> bool {
    ENABLED_ACCOUNT_CODES.contains(&value.trim())
}

// ---------------------------------------------------------------------------
// Directory entry
// ---------------------------------------------------------------------------

/// A user entry as read from the directory. Never written back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub employee_number: String,
    /// Raw account-status value; `None` when the entry does not carry the
    /// attribute at all.
    pub account_enabled_flag: Option<String>,
}

impl DirectoryEntry {
    /// Shorthand used by tests and fixtures.
    pub fn new(dn: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            username: username.into(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Local user
// ---------------------------------------------------------------------------

/// Where a local user record came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ImportSource {
    Ldap,
}

impl ImportSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ldap => "ldap",
        }
    }

    pub fn from_str_val(s: &str) -> Option<Self> {
        match s {
            "ldap" => Some(Self::Ldap),
            _ => None,
        }
    }
}

/// A user record in the local user store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalUser {
    /// Row id; `None` until the record has been inserted.
    pub id: Option<i64>,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub employee_number: String,
    pub location_id: Option<i64>,
    pub activated: bool,
    pub import_source: Option<ImportSource>,
    pub password_hash: Option<String>,
}

impl LocalUser {
    /// Whether this record has never been persisted.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    /// Check the record against the user-store rules. Returns every failing
    /// rule's message so callers can report them all at once.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.username.trim().is_empty() {
            errors.push("The username field is required.".to_string());
        }

        for (field, value) in [
            ("username", &self.username),
            ("first name", &self.first_name),
            ("last name", &self.last_name),
            ("email", &self.email),
            ("employee number", &self.employee_number),
        ] {
            if value.chars().count() > MAX_FIELD_LENGTH {
                errors.push(format!(
                    "The {field} may not be greater than {MAX_FIELD_LENGTH} characters."
                ));
            }
        }

        if !self.email.is_empty() && !is_valid_email(&self.email) {
            errors.push("The email must be a valid email address.".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s.][^@\s]*\.[^@\s.]+$";

fn is_valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern is a valid regex"))
        .is_match(email)
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// A location a user can be assigned to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    pub id: i64,
    pub name: String,
    /// OU whose members are placed at this location.
    pub ldap_ou: Option<String>,
}

// ---------------------------------------------------------------------------
// Sync summary
// ---------------------------------------------------------------------------

/// Outcome of one user in a sync run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncStatus {
    Success,
    Error,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Note recorded for a successful save.
pub const NOTE_CREATED: &str = "CREATED";
/// Note recorded for a successful update.
pub const NOTE_UPDATED: &str = "UPDATED";

/// One row of the run summary. Field names match the JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncSummaryEntry {
    pub firstname: String,
    pub lastname: String,
    pub username: String,
    pub employee_number: String,
    pub email: String,
    pub location_id: Option<i64>,
    pub note: String,
    pub status: SyncStatus,
}

impl SyncSummaryEntry {
    /// Build an entry from the user as it stands after mapping.
    pub fn for_user(user: &LocalUser, status: SyncStatus, note: impl Into<String>) -> Self {
        Self {
            firstname: user.first_name.clone(),
            lastname: user.last_name.clone(),
            username: user.username.clone(),
            employee_number: user.employee_number.clone(),
            email: user.email.clone(),
            location_id: user.location_id,
            note: note.into(),
            status,
        }
    }
}
