//! Configuration file loading.
//!
//! The file defines the durable-state backend and a list of pollers,
//! each pairing an LDAP connection with the engine's poller settings:
//!
//! ```yaml
//! state:
//!   backend: postgres
//!   url: postgres://adsync@localhost/adsync
//! pollers:
//!   - name: corp-ad
//!     ldap:
//!       host: dc01.example.com
//!       base_dn: dc=example,dc=com
//!       bind_dn: cn=poller,cn=Users,dc=example,dc=com
//!       bind_password: secret
//!     entry_filter:
//!       full_sync: '(&(objectClass=user)(objectCategory=person))'
//!       incremental_sync: '(&(objectClass=user)(objectCategory=person))'
//!       deleted_sync: '(isDeleted=TRUE)'
//!     entry_attributes_to_fetch: []
//!     detect_deleted: true
//!     sync:
//!       type: events
//! ```
//!
//! `entry_filter` also accepts a bare string, which expands to all
//! three phase filters being equal.

use std::path::Path;

use serde::Deserialize;

use adsync_connector_ldap::LdapConfig;
use adsync_poller::PollerConfig;

use crate::error::CliResult;

/// Durable-state backend selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StateBackend {
    /// In-process memory; every restart begins with a full sync.
    Memory,
    /// Postgres-backed state surviving restarts.
    Postgres { url: String },
}

impl Default for StateBackend {
    fn default() -> Self {
        StateBackend::Memory
    }
}

/// One configured poller: directory connection plus engine settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PollerEntry {
    /// Directory connection parameters.
    pub ldap: LdapConfig,
    /// Engine configuration (name, filters, projection, sync type).
    #[serde(flatten)]
    pub poller: PollerConfig,
}

/// The whole configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Where poller watermark state lives.
    #[serde(default)]
    pub state: StateBackend,
    /// Pollers, in the order they are registered and run.
    pub pollers: Vec<PollerEntry>,
}

impl AppConfig {
    /// Load and parse a configuration file.
    pub fn load(path: &Path) -> CliResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_yaml::from_str(&raw)?;
        Ok(config)
    }

    /// Validate every poller definition, failing fast on the first
    /// invalid one.
    pub fn validate(&self) -> CliResult<()> {
        for entry in &self.pollers {
            entry.ldap.validate()?;
            entry.poller.validate()?;
        }
        Ok(())
    }
}
