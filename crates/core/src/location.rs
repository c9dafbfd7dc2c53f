//! Location assignment for synced users.
//!
//! A run either stamps every user with one default location, places users
//! by the OU their DN lives in, or leaves locations alone. OU mappings are
//! kept shortest-OU-first and the longest matching OU wins, so a location
//! configured for `ou=lab,ou=staff,...` beats one for `ou=staff,...`.

use tracing::{debug, info};

use crate::db::Database;
use crate::errors::SyncError;
use crate::models::Location;

/// How the operator asked for a default location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationSelector {
    /// `--location-id`: tried as a name first, then as a numeric id.
    Id(String),
    /// `--location`: tried as a name first, then as a numeric id.
    Name(String),
}

impl LocationSelector {
    /// Pick the selector from the two CLI options; the id option wins when
    /// both are given.
    pub fn from_options(location: Option<String>, location_id: Option<String>) -> Option<Self> {
        match (location_id, location) {
            (Some(id), _) if !id.trim().is_empty() => Some(Self::Id(id)),
            (_, Some(name)) if !name.trim().is_empty() => Some(Self::Name(name)),
            _ => None,
        }
    }

    fn value(&self) -> &str {
        match self {
            Self::Id(v) | Self::Name(v) => v.trim(),
        }
    }
}

/// One OU → location rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OuMapping {
    pub ou: String,
    pub location_id: i64,
    normalized: String,
}

impl OuMapping {
    pub fn new(ou: impl Into<String>, location_id: i64) -> Self {
        let ou = ou.into();
        let normalized = normalize_dn(&ou);
        Self {
            ou,
            location_id,
            normalized,
        }
    }
}

/// The location policy resolved once at the start of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationPlan {
    /// Location applied to every user without an OU override.
    pub default_location: Option<Location>,
    /// OU rules, ordered by OU length ascending.
    pub ou_mappings: Vec<OuMapping>,
}

impl LocationPlan {
    /// Build a plan from OU rules, sorting them shortest first.
    pub fn with_ou_mappings(mut ou_mappings: Vec<OuMapping>) -> Self {
        ou_mappings.sort_by_key(|m| m.ou.len());
        Self {
            default_location: None,
            ou_mappings,
        }
    }

    /// Location id from the most specific OU containing `dn`, if any.
    pub fn ou_override(&self, dn: &str) -> Option<i64> {
        let dn = normalize_dn(dn);
        self.ou_mappings
            .iter()
            .rev()
            .find(|m| dn_within(&dn, &m.normalized))
            .map(|m| m.location_id)
    }

    /// Location id to assign to the entry at `dn`, or `None` to leave the
    /// user's location unchanged.
    pub fn location_for(&self, dn: &str) -> Option<i64> {
        self.ou_override(dn)
            .or_else(|| self.default_location.as_ref().map(|l| l.id))
    }

    pub fn is_empty(&self) -> bool {
        self.default_location.is_none() && self.ou_mappings.is_empty()
    }
}

/// Resolves the [`LocationPlan`] for a run from the location table.
pub struct LocationResolver<'a> {
    db: &'a Database,
}

impl<'a> LocationResolver<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Resolve the plan.
    ///
    /// An explicit selector that matches nothing is fatal. OU mappings are
    /// only loaded when there is neither a default location nor a base-DN
    /// override.
    pub fn resolve(
        &self,
        selector: Option<&LocationSelector>,
        base_dn_override: Option<&str>,
    ) -> Result<LocationPlan, SyncError> {
        let mut plan = LocationPlan::default();

        if let Some(selector) = selector {
            let location = self.lookup(selector)?;
            info!(
                location = %location.name,
                location_id = location.id,
                "Importing users with default location"
            );
            plan.default_location = Some(location);
            return Ok(plan);
        }

        if base_dn_override.is_some() {
            debug!("base DN override given, skipping OU location mapping");
            return Ok(plan);
        }

        let mappings: Vec<OuMapping> = self
            .db
            .list_locations_with_ou()?
            .into_iter()
            .filter_map(|l| l.ldap_ou.map(|ou| OuMapping::new(ou.trim(), l.id)))
            .collect();

        if !mappings.is_empty() {
            info!(
                count = mappings.len(),
                "Some locations have special OUs set. Locations will be automatically set for users in those OUs."
            );
        }
        Ok(LocationPlan::with_ou_mappings(mappings))
    }

    fn lookup(&self, selector: &LocationSelector) -> Result<Location, SyncError> {
        let value = selector.value();
        if let Some(location) = self.db.find_location_by_name(value)? {
            return Ok(location);
        }
        if let Ok(id) = value.parse::<i64>() {
            if let Some(location) = self.db.find_location_by_id(id)? {
                return Ok(location);
            }
        }
        Err(SyncError::InvalidLocation(value.to_string()))
    }
}

/// Lowercase a DN and drop whitespace around `,` and `=` separators.
pub fn normalize_dn(dn: &str) -> String {
    dn.split(',')
        .map(|rdn| {
            rdn.split('=')
                .map(str::trim)
                .collect::<Vec<_>>()
                .join("=")
        })
        .collect::<Vec<_>>()
        .join(",")
        .to_lowercase()
}

/// Whether normalized `dn` equals `base` or lies in its subtree.
fn dn_within(dn: &str, base: &str) -> bool {
    if base.is_empty() {
        return false;
    }
    dn == base
        || dn
            .strip_suffix(base)
            .is_some_and(|prefix| prefix.ends_with(','))
}
