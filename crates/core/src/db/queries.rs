//! Typed query helpers for every table in the LdapSync database.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use super::Database;
use crate::errors::DatabaseError;
use crate::models::{ImportSource, LocalUser, Location};

/// A row from the `audit_log` table.
#[derive(Debug, Clone)]
pub struct AuditLogEntry {
    pub id: i64,
    pub action: String,
    pub details: Option<String>,
    pub created_at: String,
}

const USER_COLUMNS: &str = "id, username, first_name, last_name, email, employee_num, \
                            location_id, activated, import_source, password";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<LocalUser> {
    let import_source: Option<String> = row.get(8)?;
    Ok(LocalUser {
        id: Some(row.get(0)?),
        username: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        employee_number: row.get(5)?,
        location_id: row.get(6)?,
        activated: row.get(7)?,
        import_source: import_source.as_deref().and_then(ImportSource::from_str_val),
        password_hash: row.get(9)?,
    })
}

fn location_from_row(row: &Row<'_>) -> rusqlite::Result<Location> {
    Ok(Location {
        id: row.get(0)?,
        name: row.get(1)?,
        ldap_ou: row.get(2)?,
    })
}

impl Database {
    // -- locations ----------------------------------------------------------

    /// Insert a location and return its id.
    pub fn insert_location(&self, name: &str, ldap_ou: Option<&str>) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO locations (name, ldap_ou) VALUES (?1, ?2)",
            params![name, ldap_ou],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, name, "inserted location");
        Ok(id)
    }

    /// Look up a location by exact name.
    pub fn find_location_by_name(&self, name: &str) -> Result<Option<Location>, DatabaseError> {
        let conn = self.conn();
        let location = conn
            .query_row(
                "SELECT id, name, ldap_ou FROM locations WHERE name = ?1",
                params![name],
                location_from_row,
            )
            .optional()?;
        Ok(location)
    }

    /// Look up a location by id.
    pub fn find_location_by_id(&self, id: i64) -> Result<Option<Location>, DatabaseError> {
        let conn = self.conn();
        let location = conn
            .query_row(
                "SELECT id, name, ldap_ou FROM locations WHERE id = ?1",
                params![id],
                location_from_row,
            )
            .optional()?;
        Ok(location)
    }

    /// All locations, ordered by id.
    pub fn list_locations(&self) -> Result<Vec<Location>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, name, ldap_ou FROM locations ORDER BY id")?;
        let locations = stmt
            .query_map([], location_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(locations)
    }

    /// Locations that carry a non-empty OU.
    pub fn list_locations_with_ou(&self) -> Result<Vec<Location>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, ldap_ou FROM locations
             WHERE ldap_ou IS NOT NULL AND TRIM(ldap_ou) != '' ORDER BY id",
        )?;
        let locations = stmt
            .query_map([], location_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(locations)
    }

    // -- users --------------------------------------------------------------

    /// Look up a user by username.
    pub fn find_user_by_username(&self, username: &str) -> Result<Option<LocalUser>, DatabaseError> {
        let conn = self.conn();
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Insert or update `user`. New records get their id filled in.
    pub fn save_user(&self, user: &mut LocalUser) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let import_source = user.import_source.map(|s| s.as_str());
        let conn = self.conn();

        match user.id {
            None => {
                conn.execute(
                    "INSERT INTO users (username, first_name, last_name, email, employee_num,
                                        location_id, activated, import_source, password,
                                        created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                    params![
                        user.username,
                        user.first_name,
                        user.last_name,
                        user.email,
                        user.employee_number,
                        user.location_id,
                        user.activated,
                        import_source,
                        user.password_hash,
                        now,
                    ],
                )?;
                let id = conn.last_insert_rowid();
                user.id = Some(id);
                debug!(id, username = %user.username, "inserted user");
            }
            Some(id) => {
                let changed = conn.execute(
                    "UPDATE users SET username = ?1, first_name = ?2, last_name = ?3, email = ?4,
                                      employee_num = ?5, location_id = ?6, activated = ?7,
                                      import_source = ?8, password = ?9, updated_at = ?10
                     WHERE id = ?11",
                    params![
                        user.username,
                        user.first_name,
                        user.last_name,
                        user.email,
                        user.employee_number,
                        user.location_id,
                        user.activated,
                        import_source,
                        user.password_hash,
                        now,
                        id,
                    ],
                )?;
                if changed == 0 {
                    return Err(DatabaseError::NotFound {
                        entity: "user".into(),
                        id: id.to_string(),
                    });
                }
                debug!(id, username = %user.username, "updated user");
            }
        }
        Ok(())
    }

    /// Most recently touched users first.
    pub fn list_users(&self, limit: u32) -> Result<Vec<LocalUser>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY updated_at DESC, id DESC LIMIT ?1"
        ))?;
        let users = stmt
            .query_map(params![limit], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Count all users.
    pub fn count_users(&self) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    // -- audit_log ----------------------------------------------------------

    /// Insert an audit-log entry.
    pub fn insert_audit_log(&self, action: &str, details: Option<&str>) -> Result<i64, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO audit_log (action, details, created_at) VALUES (?1, ?2, ?3)",
            params![action, details, now],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, action, "inserted audit_log entry");
        Ok(id)
    }

    /// List recent audit-log entries.
    pub fn list_audit_log(&self, limit: u32) -> Result<Vec<AuditLogEntry>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, action, details, created_at FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit], |row| {
                Ok(AuditLogEntry {
                    id: row.get(0)?,
                    action: row.get(1)?,
                    details: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
