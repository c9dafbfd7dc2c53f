//! TOML-based configuration system for LdapSync.
//!
//! The LDAP bind password is stored as an `_env` field that references an
//! environment variable name. The actual secret is resolved at runtime via
//! [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Process-level settings (data directory, logging, time budget).
    #[serde(default)]
    pub app: GeneralConfig,

    /// Directory server settings.
    pub ldap: LdapConfig,
}

// ---------------------------------------------------------------------------
// General
// ---------------------------------------------------------------------------

/// Process-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory holding the user-store database.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Wall-clock budget for a whole sync run, in seconds (default 600).
    #[serde(default = "default_max_execution_secs")]
    pub max_execution_secs: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/ldapsync")
}
fn default_log_level() -> String {
    "info".into()
}
fn default_max_execution_secs() -> u64 {
    600
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            max_execution_secs: default_max_execution_secs(),
        }
    }
}

impl GeneralConfig {
    /// The run budget as a [`Duration`].
    pub fn max_execution(&self) -> Duration {
        Duration::from_secs(self.max_execution_secs)
    }

    /// Path of the SQLite user store.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("ldapsync.db")
    }
}

// ---------------------------------------------------------------------------
// LDAP
// ---------------------------------------------------------------------------

/// LDAP / Active Directory connection and search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// Master switch. A disabled integration makes `sync` a no-op.
    #[serde(default)]
    pub enabled: bool,

    /// Server URL (`ldap://host:389` or `ldaps://host:636`).
    #[serde(default)]
    pub url: String,

    /// DN used for the simple bind. Empty means anonymous bind.
    #[serde(default)]
    pub bind_dn: String,

    /// Environment variable holding the bind password.
    #[serde(default)]
    pub bind_password_env: Option<String>,

    /// Default search base.
    #[serde(default)]
    pub base_dn: String,

    /// Search filter selecting user entries.
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Upgrade a plain `ldap://` connection with StartTLS.
    #[serde(default)]
    pub starttls: bool,

    /// Page size for the paged-results control (0 disables paging).
    #[serde(default = "default_page_size")]
    pub page_size: i32,

    /// Whether the server is Active Directory.
    #[serde(default)]
    pub is_ad: bool,

    /// Attribute name mapping.
    #[serde(default)]
    pub attributes: AttributeConfig,

    /// Resolved bind password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub bind_password: Option<String>,
}

fn default_filter() -> String {
    "(&(objectClass=person)(cn=*))".into()
}
fn default_page_size() -> i32 {
    500
}

impl Default for LdapConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            bind_dn: String::new(),
            bind_password_env: None,
            base_dn: String::new(),
            filter: default_filter(),
            starttls: false,
            page_size: default_page_size(),
            is_ad: false,
            attributes: AttributeConfig::default(),
            bind_password: None,
        }
    }
}

/// Which directory attribute feeds which local user field.
///
/// Attribute names are matched case-insensitively against the entries the
/// server returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeConfig {
    #[serde(default = "default_username_attr")]
    pub username: String,
    #[serde(default = "default_first_name_attr")]
    pub first_name: String,
    #[serde(default = "default_last_name_attr")]
    pub last_name: String,
    #[serde(default = "default_email_attr")]
    pub email: String,
    #[serde(default = "default_employee_number_attr")]
    pub employee_number: String,

    /// Account-status attribute. For AD this is `userAccountControl`; leave
    /// unset for directories that do not expose one.
    #[serde(default)]
    pub active_flag: Option<String>,
}

fn default_username_attr() -> String {
    "uid".into()
}
fn default_first_name_attr() -> String {
    "givenname".into()
}
fn default_last_name_attr() -> String {
    "sn".into()
}
fn default_email_attr() -> String {
    "mail".into()
}
fn default_employee_number_attr() -> String {
    "employeenumber".into()
}

impl Default for AttributeConfig {
    fn default() -> Self {
        Self {
            username: default_username_attr(),
            first_name: default_first_name_attr(),
            last_name: default_last_name_attr(),
            email: default_email_attr(),
            employee_number: default_employee_number_attr(),
            active_flag: None,
        }
    }
}

impl AttributeConfig {
    /// The account-status attribute actually in effect: the configured one,
    /// or `userAccountControl` for Active Directory.
    pub fn effective_active_flag(&self, is_ad: bool) -> Option<&str> {
        match self.active_flag.as_deref() {
            Some(name) if !name.is_empty() => Some(name),
            _ if is_ad => Some("useraccountcontrol"),
            _ => None,
        }
    }

    /// Attribute list requested from the server.
    pub fn requested(&self, is_ad: bool) -> Vec<String> {
        let mut attrs = vec![
            self.username.clone(),
            self.first_name.clone(),
            self.last_name.clone(),
            self.email.clone(),
            self.employee_number.clone(),
        ];
        if let Some(flag) = self.effective_active_flag(is_ad) {
            attrs.push(flag.to_string());
        }
        attrs.retain(|a| !a.is_empty());
        attrs
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve `*_env` fields from environment variables.
    ///
    /// A missing variable logs a warning and leaves the resolved field empty;
    /// the bind then falls back to an empty password.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref env_name) = self.ldap.bind_password_env {
            self.ldap.bind_password = resolve_optional_env(env_name, "ldap.bind_password_env");
        }
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    ///
    /// LDAP fields are only checked when the integration is enabled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app.max_execution_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "app.max_execution_secs".into(),
                detail: "execution budget must be > 0".into(),
            });
        }

        if !self.ldap.enabled {
            return Ok(());
        }

        if self.ldap.url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ldap.url".into(),
                detail: "LDAP URL must not be empty".into(),
            });
        }
        if !(self.ldap.url.starts_with("ldap://") || self.ldap.url.starts_with("ldaps://")) {
            return Err(ConfigError::InvalidValue {
                field: "ldap.url".into(),
                detail: "LDAP URL must start with ldap:// or ldaps://".into(),
            });
        }
        if self.ldap.base_dn.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ldap.base_dn".into(),
                detail: "base DN must not be empty".into(),
            });
        }
        if self.ldap.filter.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ldap.filter".into(),
                detail: "search filter must not be empty".into(),
            });
        }
        if self.ldap.attributes.username.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ldap.attributes.username".into(),
                detail: "username attribute must not be empty".into(),
            });
        }
        if self.ldap.page_size < 0 {
            return Err(ConfigError::InvalidValue {
                field: "ldap.page_size".into(),
                detail: "page size must be >= 0".into(),
            });
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
