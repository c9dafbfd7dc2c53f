//! Directory access for the sync run.
//!
//! The sync engine only needs two things from the directory: a connectivity
//! check and "every user under base DN X". [`DirectoryClient`] captures that
//! seam so the engine can be driven by [`LdapDirectory`] in production and a
//! scripted client in tests.

pub mod ldap;

pub use ldap::LdapDirectory;

use crate::errors::DirectoryError;
use crate::models::DirectoryEntry;

/// Source of user entries for a sync run.
pub trait DirectoryClient {
    /// Connect and bind, failing if the server is unreachable or rejects the
    /// credentials.
    fn test_connection(&mut self) -> Result<(), DirectoryError>;

    /// Fetch every user entry under `base_dn`, or under the configured base
    /// when `None`. The whole result set is returned at once.
    fn fetch_users(&mut self, base_dn: Option<&str>) -> Result<Vec<DirectoryEntry>, DirectoryError>;
}
