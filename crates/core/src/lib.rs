//! LdapSync core library.
//!
//! This crate provides the components for syncing LDAP / Active Directory
//! users into the local user store: configuration, database persistence,
//! the directory client, location resolution, the reconciliation engine,
//! and summary reporting.

pub mod config;
pub mod db;
pub mod directory;
pub mod errors;
pub mod location;
pub mod models;
pub mod summary;
pub mod sync_engine;

// Re-exports for convenience.
pub use config::AppConfig;
pub use db::Database;
pub use directory::{DirectoryClient, LdapDirectory};
pub use summary::{ReportMode, SyncSummary};
pub use sync_engine::{SyncEngine, SyncOptions, SyncOutcome};
