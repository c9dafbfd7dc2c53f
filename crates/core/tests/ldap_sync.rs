//! End-to-end tests for the LDAP sync run.
//!
//! These tests exercise the real `SyncEngine` with:
//! - A scripted `DirectoryClient` standing in for the LDAP server
//! - Real SQLite databases (in-memory)
//! - Real location resolution
//!
//! No network I/O.

use ldapsync_core::config::{AppConfig, GeneralConfig, LdapConfig};
use ldapsync_core::db::Database;
use ldapsync_core::directory::DirectoryClient;
use ldapsync_core::errors::{DirectoryError, SyncError};
use ldapsync_core::location::LocationSelector;
use ldapsync_core::models::{DirectoryEntry, LocalUser, SyncStatus};
use ldapsync_core::summary::render_json_error;
use ldapsync_core::sync_engine::{SyncEngine, SyncOptions, SyncOutcome, SyncReport};

// ===========================================================================
// Helpers
// ===========================================================================

/// Directory client that serves a fixed entry list.
#[derive(Default)]
struct ScriptedDirectory {
    entries: Vec<DirectoryEntry>,
    unreachable: bool,
    requested_base: Option<Option<String>>,
}

impl ScriptedDirectory {
    fn with_entries(entries: Vec<DirectoryEntry>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }

    fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }
}

impl DirectoryClient for ScriptedDirectory {
    fn test_connection(&mut self) -> Result<(), DirectoryError> {
        if self.unreachable {
            return Err(DirectoryError::ConnectionFailed {
                url: "ldap://ad.example.com".into(),
                detail: "connection refused".into(),
            });
        }
        Ok(())
    }

    fn fetch_users(&mut self, base_dn: Option<&str>) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        self.requested_base = Some(base_dn.map(String::from));
        Ok(self.entries.clone())
    }
}

fn config() -> AppConfig {
    AppConfig {
        app: GeneralConfig::default(),
        ldap: LdapConfig {
            enabled: true,
            url: "ldap://ad.example.com".into(),
            base_dn: "dc=example,dc=com".into(),
            ..LdapConfig::default()
        },
    }
}

fn setup_db() -> Database {
    let db = Database::in_memory().unwrap();
    db.initialize().unwrap();
    db
}

fn engine_with(db: Database, directory: ScriptedDirectory) -> SyncEngine<ScriptedDirectory> {
    SyncEngine::new(config(), db, directory).with_hash_cost(4)
}

fn person(username: &str, ou: &str, flag: Option<&str>) -> DirectoryEntry {
    DirectoryEntry {
        first_name: format!("{username}-first"),
        last_name: format!("{username}-last"),
        email: format!("{username}@example.com"),
        employee_number: format!("E-{username}"),
        account_enabled_flag: flag.map(String::from),
        ..DirectoryEntry::new(format!("cn={username},{ou},dc=example,dc=com"), username)
    }
}

fn completed(outcome: SyncOutcome) -> SyncReport {
    match outcome {
        SyncOutcome::Completed(report) => report,
        SyncOutcome::Disabled => panic!("expected a completed run"),
    }
}

fn user(db: &Database, username: &str) -> LocalUser {
    db.find_user_by_username(username)
        .unwrap()
        .unwrap_or_else(|| panic!("user {username} not found"))
}

// ===========================================================================
// Tests
// ===========================================================================

#[test]
fn creates_activated_user_from_enabled_ad_account() {
    let dir = ScriptedDirectory::with_entries(vec![DirectoryEntry {
        account_enabled_flag: Some("512".into()),
        ..DirectoryEntry::new("cn=jdoe,dc=example,dc=com", "jdoe")
    }]);
    let mut engine = engine_with(setup_db(), dir);

    let report = completed(engine.run(&SyncOptions::default()).unwrap());

    assert_eq!(report.summary.len(), 1);
    let entry = &report.summary.entries()[0];
    assert_eq!(entry.status, SyncStatus::Success);
    assert_eq!(entry.note, "CREATED");
    assert_eq!(entry.username, "jdoe");

    let jdoe = user(engine.db(), "jdoe");
    assert!(jdoe.activated);
    assert!(jdoe.password_hash.is_some());
    assert_eq!(engine.db().list_audit_log(10).unwrap().len(), 1);
}

#[test]
fn rerun_without_changes_is_a_no_op() {
    let entries = vec![
        person("jdoe", "ou=staff", Some("512")),
        person("asmith", "ou=staff", Some("514")),
    ];
    let db = setup_db();
    db.insert_location("Staff", Some("ou=staff,dc=example,dc=com"))
        .unwrap();
    let mut engine = engine_with(db, ScriptedDirectory::with_entries(entries));

    let first = completed(engine.run(&SyncOptions::default()).unwrap());
    assert_eq!(first.summary.created_count(), 2);
    let before = engine.db().list_users(10).unwrap();
    let audit_rows = engine.db().list_audit_log(10).unwrap().len();

    let second = completed(engine.run(&SyncOptions::default()).unwrap());
    assert!(second.summary.is_empty());
    assert_eq!(second.unchanged, 2);
    assert_eq!(engine.db().list_users(10).unwrap(), before);
    assert_eq!(engine.db().list_audit_log(10).unwrap().len(), audit_rows);
}

#[test]
fn changed_field_produces_update() {
    let mut engine = engine_with(
        setup_db(),
        ScriptedDirectory::with_entries(vec![person("jdoe", "ou=staff", None)]),
    );
    completed(engine.run(&SyncOptions::default()).unwrap());

    engine.directory_mut().entries[0].last_name = "Married-Name".into();
    let report = completed(engine.run(&SyncOptions::default()).unwrap());

    assert_eq!(report.summary.len(), 1);
    assert_eq!(report.summary.entries()[0].note, "UPDATED");
    assert_eq!(user(engine.db(), "jdoe").last_name, "Married-Name");
    assert_eq!(engine.db().count_users().unwrap(), 1);
}

#[test]
fn activation_follows_allow_list() {
    let entries = vec![
        person("enabled", "ou=staff", Some("66048")),
        person("disabled", "ou=staff", Some("514")),
        person("weird", "ou=staff", Some("TRUE")),
        person("missing", "ou=staff", None),
    ];
    let mut engine = engine_with(setup_db(), ScriptedDirectory::with_entries(entries));
    completed(engine.run(&SyncOptions::default()).unwrap());

    assert!(user(engine.db(), "enabled").activated);
    assert!(!user(engine.db(), "disabled").activated);
    assert!(!user(engine.db(), "weird").activated);
    // Flag absent on this entry while the feed carries it: new-user default.
    assert!(!user(engine.db(), "missing").activated);
}

#[test]
fn feed_without_flag_activates_everyone() {
    let entries = vec![
        person("alice", "ou=staff", None),
        person("bob", "ou=staff", None),
    ];
    let mut engine = engine_with(setup_db(), ScriptedDirectory::with_entries(entries));
    completed(engine.run(&SyncOptions::default()).unwrap());

    for u in engine.db().list_users(10).unwrap() {
        assert!(u.activated, "{} should be activated", u.username);
    }
}

#[test]
fn default_location_applies_to_every_user() {
    let db = setup_db();
    let hq = db.insert_location("HQ", None).unwrap();
    db.insert_location("Lab", Some("ou=lab,dc=example,dc=com"))
        .unwrap();
    let entries = vec![
        person("alice", "ou=lab", None),
        person("bob", "ou=staff", None),
    ];
    let mut engine = engine_with(db, ScriptedDirectory::with_entries(entries));

    let options = SyncOptions {
        location: Some(LocationSelector::Name("HQ".into())),
        ..SyncOptions::default()
    };
    let report = completed(engine.run(&options).unwrap());

    assert!(report
        .summary
        .entries()
        .iter()
        .all(|e| e.location_id == Some(hq)));
    assert_eq!(user(engine.db(), "alice").location_id, Some(hq));
    assert_eq!(user(engine.db(), "bob").location_id, Some(hq));
}

#[test]
fn ou_mapping_places_users_by_most_specific_ou() {
    let db = setup_db();
    let staff = db
        .insert_location("Staff", Some("ou=staff,dc=example,dc=com"))
        .unwrap();
    let lab = db
        .insert_location("Lab", Some("OU=Lab,OU=Staff,DC=example,DC=com"))
        .unwrap();
    let entries = vec![
        person("ann", "ou=lab,ou=staff", None),
        person("bob", "ou=staff", None),
        person("eve", "ou=guests", None),
    ];
    let mut engine = engine_with(db, ScriptedDirectory::with_entries(entries));
    completed(engine.run(&SyncOptions::default()).unwrap());

    assert_eq!(user(engine.db(), "ann").location_id, Some(lab));
    assert_eq!(user(engine.db(), "bob").location_id, Some(staff));
    assert_eq!(user(engine.db(), "eve").location_id, None);
}

#[test]
fn base_dn_override_skips_ou_mapping() {
    let db = setup_db();
    db.insert_location("Staff", Some("ou=staff,dc=example,dc=com"))
        .unwrap();
    let mut engine = engine_with(
        db,
        ScriptedDirectory::with_entries(vec![person("bob", "ou=staff", None)]),
    );

    let options = SyncOptions {
        base_dn: Some("ou=staff,dc=example,dc=com".into()),
        ..SyncOptions::default()
    };
    completed(engine.run(&options).unwrap());
    assert_eq!(user(engine.db(), "bob").location_id, None);
}

#[test]
fn invalid_location_aborts_before_any_write() {
    let mut engine = engine_with(
        setup_db(),
        ScriptedDirectory::with_entries(vec![person("bob", "ou=staff", None)]),
    );
    let options = SyncOptions {
        location: Some(LocationSelector::Id("999".into())),
        ..SyncOptions::default()
    };

    let err = engine.run(&options).unwrap_err();
    assert!(matches!(err, SyncError::InvalidLocation(_)));
    assert_eq!(engine.db().count_users().unwrap(), 0);
}

#[test]
fn empty_directory_is_fatal() {
    let mut engine = engine_with(setup_db(), ScriptedDirectory::with_entries(Vec::new()));
    let err = engine.run(&SyncOptions::default()).unwrap_err();
    assert!(matches!(err, SyncError::NoUsersFound));
    assert_eq!(engine.db().count_users().unwrap(), 0);
    assert!(engine.db().list_audit_log(10).unwrap().is_empty());
}

#[test]
fn connectivity_failure_is_fatal_and_writes_nothing() {
    let mut engine = engine_with(setup_db(), ScriptedDirectory::unreachable());
    let err = engine.run(&SyncOptions::default()).unwrap_err();
    assert!(matches!(err, SyncError::Directory(_)));
    assert_eq!(engine.db().count_users().unwrap(), 0);

    let json: serde_json::Value = serde_json::from_str(&render_json_error(&err.to_string())).unwrap();
    assert_eq!(json["error"], true);
    assert!(json["error_message"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
    assert!(json["summary"].as_array().unwrap().is_empty());
}

#[test]
fn disabled_integration_is_a_successful_no_op() {
    let mut cfg = config();
    cfg.ldap.enabled = false;
    let mut engine = SyncEngine::new(cfg, setup_db(), ScriptedDirectory::unreachable());

    assert!(matches!(
        engine.run(&SyncOptions::default()).unwrap(),
        SyncOutcome::Disabled
    ));
}

#[test]
fn dry_run_reports_but_never_writes() {
    let db = setup_db();
    let mut existing = LocalUser {
        username: "bob".into(),
        first_name: "Robert".into(),
        ..LocalUser::default()
    };
    db.save_user(&mut existing).unwrap();

    let entries = vec![
        person("alice", "ou=staff", Some("512")),
        person("bob", "ou=staff", Some("512")),
    ];
    let mut engine = engine_with(db, ScriptedDirectory::with_entries(entries));
    let options = SyncOptions {
        dry_run: true,
        ..SyncOptions::default()
    };

    let report = completed(engine.run(&options).unwrap());
    assert!(report.dry_run);
    assert_eq!(report.summary.created_count(), 1);
    assert_eq!(report.summary.updated_count(), 1);
    assert!(report.summary.render_table().contains("alice"));

    assert_eq!(engine.db().count_users().unwrap(), 1);
    assert_eq!(user(engine.db(), "bob").first_name, "Robert");
    assert!(engine.db().list_audit_log(10).unwrap().is_empty());
}

#[test]
fn invalid_entry_is_reported_and_loop_continues() {
    let mut bad = person("broken", "ou=staff", None);
    bad.email = "not an email".into();
    let nameless = DirectoryEntry::new("cn=nameless,dc=example,dc=com", "");
    let entries = vec![bad, nameless, person("good", "ou=staff", None)];
    let mut engine = engine_with(setup_db(), ScriptedDirectory::with_entries(entries));

    let report = completed(engine.run(&SyncOptions::default()).unwrap());
    assert_eq!(report.summary.error_count(), 2);
    assert_eq!(report.summary.created_count(), 1);

    let errors: Vec<_> = report
        .summary
        .entries()
        .iter()
        .filter(|e| e.status == SyncStatus::Error)
        .collect();
    assert!(errors[0]
        .note
        .starts_with("cn=broken,ou=staff,dc=example,dc=com was not imported. REASON:"));
    assert!(errors[0].note.contains("valid email"));
    assert!(errors[1].note.contains("username field is required"));

    assert_eq!(engine.db().count_users().unwrap(), 1);
    assert!(engine.db().find_user_by_username("broken").unwrap().is_none());
}

#[test]
fn dry_run_reports_validation_errors_too() {
    let mut bad = person("broken", "ou=staff", None);
    bad.email = "nope".into();
    let mut engine = engine_with(setup_db(), ScriptedDirectory::with_entries(vec![bad]));
    let options = SyncOptions {
        dry_run: true,
        ..SyncOptions::default()
    };

    let report = completed(engine.run(&options).unwrap());
    assert_eq!(report.summary.error_count(), 1);
}

#[test]
fn base_dn_override_is_passed_to_directory() {
    let mut engine = engine_with(
        setup_db(),
        ScriptedDirectory::with_entries(vec![person("bob", "ou=staff", None)]),
    );

    completed(engine.run(&SyncOptions::default()).unwrap());
    assert_eq!(engine.directory().requested_base, Some(None));

    let options = SyncOptions {
        base_dn: Some("ou=staff,dc=example,dc=com".into()),
        ..SyncOptions::default()
    };
    completed(engine.run(&options).unwrap());
    assert_eq!(
        engine.directory().requested_base,
        Some(Some("ou=staff,dc=example,dc=com".to_string()))
    );
}

#[test]
fn exhausted_time_budget_aborts() {
    let mut cfg = config();
    cfg.app.max_execution_secs = 0;
    let mut engine = SyncEngine::new(
        cfg,
        setup_db(),
        ScriptedDirectory::with_entries(vec![person("bob", "ou=staff", None)]),
    );

    let err = engine.run(&SyncOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        SyncError::TimeBudgetExceeded { processed: 0, .. }
    ));
    // The budget is checked once the search returns, before any user is touched.
    assert!(engine.directory().requested_base.is_some());
    assert_eq!(engine.db().count_users().unwrap(), 0);
}

#[test]
fn username_match_ignores_case() {
    let mut engine = engine_with(
        setup_db(),
        ScriptedDirectory::with_entries(vec![person("jdoe", "ou=staff", Some("512"))]),
    );
    completed(engine.run(&SyncOptions::default()).unwrap());
    let original_id = user(engine.db(), "jdoe").id;

    engine.directory_mut().entries = vec![DirectoryEntry {
        account_enabled_flag: Some("512".into()),
        ..DirectoryEntry::new("cn=JDoe,ou=staff,dc=example,dc=com", "JDoe")
    }];
    let report = completed(engine.run(&SyncOptions::default()).unwrap());

    let notes: Vec<&str> = report.summary.entries().iter().map(|e| e.note.as_str()).collect();
    assert_eq!(notes, vec!["UPDATED"]);
    assert_eq!(engine.db().count_users().unwrap(), 1);
    assert_eq!(user(engine.db(), "JDOE").id, original_id);
}

#[test]
fn audit_failure_keeps_completed_report() {
    let db = setup_db();
    db.conn().execute_batch("DROP TABLE audit_log;").unwrap();
    let mut engine = engine_with(
        db,
        ScriptedDirectory::with_entries(vec![person("jdoe", "ou=staff", Some("512"))]),
    );

    let report = completed(engine.run(&SyncOptions::default()).unwrap());
    assert_eq!(report.summary.created_count(), 1);
    assert_eq!(engine.db().count_users().unwrap(), 1);
}
