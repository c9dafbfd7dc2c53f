//! LDAP / Active Directory client built on the synchronous `ldap3` API.

use std::time::Duration;

use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::{LdapConn, LdapConnSettings, Scope, SearchEntry};
use tracing::{debug, info, warn};

use super::DirectoryClient;
use crate::config::{AttributeConfig, LdapConfig};
use crate::errors::DirectoryError;
use crate::models::DirectoryEntry;

/// Directory client backed by a single `ldap3` connection.
///
/// The connection is opened lazily on first use and reused for the rest of
/// the run.
pub struct LdapDirectory {
    config: LdapConfig,
    timeout: Duration,
    conn: Option<LdapConn>,
}

impl LdapDirectory {
    /// Create a client. No network I/O happens until the first call.
    ///
    /// `timeout` bounds connection setup and every individual operation.
    pub fn new(config: LdapConfig, timeout: Duration) -> Self {
        info!(url = %config.url, base_dn = %config.base_dn, "created LdapDirectory");
        Self {
            config,
            timeout,
            conn: None,
        }
    }

    fn open(&self) -> Result<LdapConn, DirectoryError> {
        debug!(url = %self.config.url, starttls = self.config.starttls, "connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.timeout)
            .set_starttls(self.config.starttls);

        let mut conn = LdapConn::with_settings(settings, &self.config.url).map_err(|e| {
            DirectoryError::ConnectionFailed {
                url: self.config.url.clone(),
                detail: e.to_string(),
            }
        })?;
        conn.with_timeout(self.timeout);

        let password = self.config.bind_password.as_deref().unwrap_or("");
        debug!(bind_dn = %self.config.bind_dn, "performing LDAP bind");
        let result = conn.simple_bind(&self.config.bind_dn, password)?;
        if result.rc != 0 {
            return Err(DirectoryError::BindFailed {
                bind_dn: self.config.bind_dn.clone(),
                rc: result.rc,
                detail: result.text,
            });
        }

        info!(url = %self.config.url, "LDAP bind successful");
        Ok(conn)
    }

    fn connection(&mut self) -> Result<&mut LdapConn, DirectoryError> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.open()?,
        };
        Ok(self.conn.insert(conn))
    }

    fn search(&mut self, base_dn: &str) -> Result<Vec<SearchEntry>, DirectoryError> {
        let filter = self.config.filter.clone();
        let attrs = self.config.attributes.requested(self.config.is_ad);
        let page_size = self.config.page_size;
        let search_failed = |e: ldap3::LdapError| DirectoryError::SearchFailed {
            base_dn: base_dn.to_string(),
            detail: e.to_string(),
        };

        let timeout = self.timeout;
        let conn = self.connection()?;
        debug!(base_dn, filter = %filter, page_size, "searching LDAP");

        // `with_timeout` only covers the next operation, so re-arm it per search.
        if page_size == 0 {
            let (entries, _res) = conn
                .with_timeout(timeout)
                .search(base_dn, Scope::Subtree, &filter, attrs)
                .and_then(|r| r.success())
                .map_err(search_failed)?;
            return Ok(entries.into_iter().map(SearchEntry::construct).collect());
        }

        let adapters: Vec<Box<dyn Adapter<_, _>>> = vec![
            Box::new(EntriesOnly::new()),
            Box::new(PagedResults::new(page_size)),
        ];
        let mut stream = conn
            .with_timeout(timeout)
            .streaming_search_with(adapters, base_dn, Scope::Subtree, &filter, attrs)
            .map_err(search_failed)?;

        let mut entries = Vec::new();
        while let Some(entry) = stream.next().map_err(search_failed)? {
            entries.push(SearchEntry::construct(entry));
        }
        stream.result().success().map_err(search_failed)?;
        Ok(entries)
    }
}

impl DirectoryClient for LdapDirectory {
    fn test_connection(&mut self) -> Result<(), DirectoryError> {
        self.connection()?;
        Ok(())
    }

    fn fetch_users(&mut self, base_dn: Option<&str>) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let base_dn = base_dn.unwrap_or(&self.config.base_dn).to_string();
        let raw = self.search(&base_dn)?;

        let entries: Vec<DirectoryEntry> = raw
            .into_iter()
            .map(|e| map_entry(e, &self.config.attributes, self.config.is_ad))
            .collect();

        info!(base_dn = %base_dn, total_found = entries.len(), "LDAP search completed");
        Ok(entries)
    }
}

impl Drop for LdapDirectory {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.unbind() {
                warn!(error = %e, "LDAP unbind failed");
            }
        }
    }
}

/// Map a raw search entry onto the fields the sync engine understands.
///
/// Attribute names are compared case-insensitively; only the first value of
/// a multi-valued attribute is used.
pub fn map_entry(entry: SearchEntry, attrs: &AttributeConfig, is_ad: bool) -> DirectoryEntry {
    let first = |name: &str| -> Option<String> {
        entry
            .attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first().cloned())
    };

    DirectoryEntry {
        username: first(&attrs.username).unwrap_or_default(),
        first_name: first(&attrs.first_name).unwrap_or_default(),
        last_name: first(&attrs.last_name).unwrap_or_default(),
        email: first(&attrs.email).unwrap_or_default(),
        employee_number: first(&attrs.employee_number).unwrap_or_default(),
        account_enabled_flag: attrs.effective_active_flag(is_ad).and_then(first),
        dn: entry.dn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn search_entry(dn: &str, attrs: &[(&str, &str)]) -> SearchEntry {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (k, v) in attrs {
            map.entry(k.to_string()).or_default().push(v.to_string());
        }
        SearchEntry {
            dn: dn.to_string(),
            attrs: map,
            bin_attrs: HashMap::new(),
        }
    }

    #[test]
    fn test_map_entry_case_insensitive() {
        let attrs = AttributeConfig {
            username: "samaccountname".into(),
            ..AttributeConfig::default()
        };
        let entry = search_entry(
            "CN=Jane Doe,OU=Staff,DC=example,DC=com",
            &[
                ("sAMAccountName", "jdoe"),
                ("givenName", "Jane"),
                ("sn", "Doe"),
                ("mail", "jdoe@example.com"),
                ("mail", "jane@example.com"),
                ("userAccountControl", "512"),
            ],
        );

        let mapped = map_entry(entry, &attrs, true);
        assert_eq!(mapped.dn, "CN=Jane Doe,OU=Staff,DC=example,DC=com");
        assert_eq!(mapped.username, "jdoe");
        assert_eq!(mapped.first_name, "Jane");
        assert_eq!(mapped.email, "jdoe@example.com");
        assert_eq!(mapped.employee_number, "");
        assert_eq!(mapped.account_enabled_flag.as_deref(), Some("512"));
    }

    #[test]
    fn test_map_entry_without_flag_attribute() {
        let entry = search_entry("uid=bob,dc=example,dc=com", &[("uid", "bob")]);
        let mapped = map_entry(entry, &AttributeConfig::default(), false);
        assert_eq!(mapped.username, "bob");
        assert_eq!(mapped.account_enabled_flag, None);
    }

    #[test]
    fn test_map_entry_ad_flag_absent_on_entry() {
        let entry = search_entry("cn=svc,dc=example,dc=com", &[("uid", "svc")]);
        let mapped = map_entry(entry, &AttributeConfig::default(), true);
        assert_eq!(mapped.account_enabled_flag, None);
    }

    #[test]
    fn test_unreachable_server_is_connection_error() {
        let config = LdapConfig {
            enabled: true,
            url: "ldap://127.0.0.1:1".into(),
            base_dn: "dc=example,dc=com".into(),
            ..LdapConfig::default()
        };
        let mut dir = LdapDirectory::new(config, Duration::from_secs(2));
        assert!(matches!(
            dir.test_connection(),
            Err(DirectoryError::ConnectionFailed { .. })
        ));
    }
}
