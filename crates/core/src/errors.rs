//! Error types for the LdapSync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite persistence layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed {
        version: u32,
        detail: String,
    },

    /// A record was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    /// Generic I/O error (e.g. file permissions).
    #[error("database I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Directory errors
// ---------------------------------------------------------------------------

/// Errors from talking to the LDAP / AD server.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The TCP/TLS connection could not be established.
    #[error("could not connect to LDAP server at {url}: {detail}")]
    ConnectionFailed {
        url: String,
        detail: String,
    },

    /// The server rejected the bind credentials.
    #[error("LDAP bind failed for '{bind_dn}' (rc {rc}): {detail}")]
    BindFailed {
        bind_dn: String,
        rc: u32,
        detail: String,
    },

    /// A search returned a non-success result code.
    #[error("LDAP search under '{base_dn}' failed: {detail}")]
    SearchFailed {
        base_dn: String,
        detail: String,
    },

    /// Any other protocol-level error reported by `ldap3`.
    #[error("LDAP error: {0}")]
    Ldap(#[from] ldap3::LdapError),
}

// ---------------------------------------------------------------------------
// Sync errors
// ---------------------------------------------------------------------------

/// Fatal errors that abort a sync run.
///
/// Per-user failures never show up here; they are recorded in the run
/// summary instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The `--location` / `--location-id` option matched no location.
    #[error("The supplied location is invalid! ({0})")]
    InvalidLocation(String),

    /// The directory search came back empty.
    #[error("No users found!")]
    NoUsersFound,

    /// The run exceeded `app.max_execution_secs`.
    #[error("sync exceeded its execution budget of {secs}s after {processed} entries")]
    TimeBudgetExceeded {
        secs: u64,
        processed: usize,
    },

    /// Directory connectivity or search failure.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Database failure outside of a single user's save.
    #[error("sync database error: {0}")]
    Database(#[from] DatabaseError),
}
