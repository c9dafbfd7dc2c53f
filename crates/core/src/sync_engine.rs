//! Directory → local user reconciliation.
//!
//! The [`SyncEngine`] runs one batch pass per invocation:
//!
//! 1. Bail out early (successfully) if the LDAP integration is disabled.
//! 2. Check connectivity and bind.
//! 3. Resolve the location plan.
//! 4. Fetch every user entry under the base DN.
//! 5. Map each entry onto a local user, decide create vs. update, validate
//!    and persist (unless dry-run), recording one summary entry per changed
//!    user.
//!
//! Fatal problems come back as [`SyncError`]; per-user failures land in the
//! summary with status `ERROR` and the loop moves on.

use std::time::Instant;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::db::Database;
use crate::directory::DirectoryClient;
use crate::errors::SyncError;
use crate::location::{LocationPlan, LocationResolver, LocationSelector};
use crate::models::{
    is_enabled_account_code, DirectoryEntry, ImportSource, LocalUser, SyncStatus,
    SyncSummaryEntry, NOTE_CREATED, NOTE_UPDATED,
};
use crate::summary::SyncSummary;

/// Length of the random placeholder password given to new users.
const PLACEHOLDER_PASSWORD_LEN: usize = 20;

/// Per-invocation options, mirroring the command-line flags.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Default location for every synced user.
    pub location: Option<LocationSelector>,
    /// Search base overriding `ldap.base_dn`.
    pub base_dn: Option<String>,
    /// Compute and report without writing anything.
    pub dry_run: bool,
}

/// Result of a run that did not fail fatally.
#[derive(Debug)]
pub enum SyncOutcome {
    /// LDAP integration is switched off; nothing was done.
    Disabled,
    Completed(SyncReport),
}

/// What a completed run did.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub summary: SyncSummary,
    /// Entries returned by the directory.
    pub fetched: usize,
    /// Entries whose local user needed no change.
    pub unchanged: usize,
    pub dry_run: bool,
}

/// The reconciliation engine.
pub struct SyncEngine<D> {
    config: AppConfig,
    db: Database,
    directory: D,
    hash_cost: u32,
    placeholder_hash: Option<String>,
}

impl<D: DirectoryClient> SyncEngine<D> {
    /// Create a new engine with all required dependencies.
    pub fn new(config: AppConfig, db: Database, directory: D) -> Self {
        info!("initializing sync engine");
        Self {
            config,
            db,
            directory,
            hash_cost: bcrypt::DEFAULT_COST,
            placeholder_hash: None,
        }
    }

    /// Override the bcrypt cost used for placeholder passwords.
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    /// Return a reference to the database.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Return a reference to the configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Return a reference to the directory client.
    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Return a mutable reference to the directory client.
    pub fn directory_mut(&mut self) -> &mut D {
        &mut self.directory
    }

    // -----------------------------------------------------------------------
    // Main entry point
    // -----------------------------------------------------------------------

    /// Check connectivity only.
    pub fn check_connection(&mut self) -> Result<(), SyncError> {
        self.directory.test_connection().map_err(|e| {
            error!(error = %e, "LDAP connectivity check failed");
            SyncError::from(e)
        })
    }

    /// Execute one full sync run.
    pub fn run(&mut self, options: &SyncOptions) -> Result<SyncOutcome, SyncError> {
        if !self.config.ldap.enabled {
            info!("LDAP integration is not enabled. Exiting sync process.");
            return Ok(SyncOutcome::Disabled);
        }

        let started = Instant::now();
        info!(dry_run = options.dry_run, "starting LDAP sync");

        self.check_connection()?;

        let base_dn = options.base_dn.as_deref().filter(|dn| !dn.is_empty());
        if let Some(dn) = base_dn {
            info!(base_dn = dn, "Importing users from specified base DN");
        }

        let plan = LocationResolver::new(&self.db)
            .resolve(options.location.as_ref(), base_dn)
            .map_err(|e| {
                error!(error = %e, "location resolution failed");
                e
            })?;

        let entries = self.directory.fetch_users(base_dn).map_err(|e| {
            error!(error = %e, "LDAP user search failed");
            SyncError::from(e)
        })?;

        if entries.is_empty() {
            error!("ERROR: No users found!");
            return Err(SyncError::NoUsersFound);
        }

        let budget = self.config.app.max_execution();
        if started.elapsed() >= budget {
            error!(fetched = entries.len(), "sync execution budget exhausted by the directory search");
            return Err(SyncError::TimeBudgetExceeded {
                secs: budget.as_secs(),
                processed: 0,
            });
        }

        let feed_has_flag = entries.iter().any(|e| e.account_enabled_flag.is_some());
        debug!(
            fetched = entries.len(),
            feed_has_flag, "processing directory entries"
        );

        let mut report = SyncReport {
            fetched: entries.len(),
            dry_run: options.dry_run,
            ..SyncReport::default()
        };

        for (processed, entry) in entries.iter().enumerate() {
            if started.elapsed() >= budget {
                error!(processed, "sync execution budget exceeded");
                return Err(SyncError::TimeBudgetExceeded {
                    secs: budget.as_secs(),
                    processed,
                });
            }

            match self.process_entry(entry, &plan, feed_has_flag, options.dry_run)? {
                Some(summary_entry) => report.summary.push(summary_entry),
                None => report.unchanged += 1,
            }
        }

        info!(
            fetched = report.fetched,
            created = report.summary.created_count(),
            updated = report.summary.updated_count(),
            errors = report.summary.error_count(),
            unchanged = report.unchanged,
            dry_run = options.dry_run,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "LDAP sync complete"
        );

        if !options.dry_run && !report.summary.is_empty() {
            let details = format!(
                "fetched={} created={} updated={} errors={} unchanged={}",
                report.fetched,
                report.summary.created_count(),
                report.summary.updated_count(),
                report.summary.error_count(),
                report.unchanged
            );
            if let Err(e) = self.db.insert_audit_log("ldap_sync", Some(&details)) {
                warn!(error = %e, "failed to record sync run in audit log");
            }
        }

        Ok(SyncOutcome::Completed(report))
    }

    // -----------------------------------------------------------------------
    // Per-entry reconciliation
    // -----------------------------------------------------------------------

    /// Reconcile one entry. Returns `None` when the local user is already
    /// up to date.
    fn process_entry(
        &mut self,
        entry: &DirectoryEntry,
        plan: &LocationPlan,
        feed_has_flag: bool,
        dry_run: bool,
    ) -> Result<Option<SyncSummaryEntry>, SyncError> {
        let existing = if entry.username.is_empty() {
            None
        } else {
            self.db.find_user_by_username(&entry.username)?
        };

        let mut user = existing.clone().unwrap_or_else(|| LocalUser {
            activated: false,
            ..LocalUser::default()
        });
        apply_entry(&mut user, entry, plan, feed_has_flag);

        if existing.as_ref() == Some(&user) {
            debug!(username = %entry.username, "user unchanged");
            return Ok(None);
        }

        let note = if user.is_new() { NOTE_CREATED } else { NOTE_UPDATED };

        if let Err(errors) = user.validate() {
            return Ok(Some(self.failed(entry, &user, &errors.join(", "))));
        }

        if dry_run {
            debug!(username = %user.username, note, "dry run, not saving");
            return Ok(Some(SyncSummaryEntry::for_user(
                &user,
                SyncStatus::Success,
                note,
            )));
        }

        if user.is_new() {
            match self.placeholder_password_hash() {
                Ok(hash) => user.password_hash = Some(hash),
                Err(reason) => return Ok(Some(self.failed(entry, &user, &reason))),
            }
        }

        if let Err(e) = self.db.save_user(&mut user) {
            return Ok(Some(self.failed(entry, &user, &e.to_string())));
        }

        info!(username = %user.username, note, "saved user");
        Ok(Some(SyncSummaryEntry::for_user(
            &user,
            SyncStatus::Success,
            note,
        )))
    }

    fn failed(&self, entry: &DirectoryEntry, user: &LocalUser, reason: &str) -> SyncSummaryEntry {
        let note = format!("{} was not imported. REASON: {}", entry.dn, reason);
        warn!(dn = %entry.dn, reason, "user not imported");
        SyncSummaryEntry::for_user(user, SyncStatus::Error, note)
    }

    /// Hash of the run's placeholder password, generated on first use.
    fn placeholder_password_hash(&mut self) -> Result<String, String> {
        if let Some(ref hash) = self.placeholder_hash {
            return Ok(hash.clone());
        }
        let password = generate_placeholder_password();
        let hash = bcrypt::hash(password, self.hash_cost).map_err(|e| e.to_string())?;
        self.placeholder_hash = Some(hash.clone());
        Ok(hash)
    }
}

/// Copy the directory's view of a user onto `user`.
///
/// Location: OU override, else the run's default location, else untouched.
/// Activation: an entry carrying the account flag is activated only for an
/// enabled code; entries without it keep their value unless the feed has no
/// flag at all, in which case everyone is activated.
pub fn apply_entry(
    user: &mut LocalUser,
    entry: &DirectoryEntry,
    plan: &LocationPlan,
    feed_has_flag: bool,
) {
    user.first_name = entry.first_name.clone();
    user.last_name = entry.last_name.clone();
    user.username = entry.username.clone();
    user.email = entry.email.clone();
    user.employee_number = entry.employee_number.clone();

    if let Some(location_id) = plan.location_for(&entry.dn) {
        user.location_id = Some(location_id);
    }

    match entry.account_enabled_flag.as_deref() {
        Some(flag) => user.activated = is_enabled_account_code(flag),
        None if !feed_has_flag => user.activated = true,
        None => {}
    }

    user.import_source = Some(ImportSource::Ldap);
}

fn generate_placeholder_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PLACEHOLDER_PASSWORD_LEN)
        .map(char::from)
        .collect()
}
