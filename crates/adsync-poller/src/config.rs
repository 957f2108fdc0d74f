//! Per-poller configuration.
//!
//! A `PollerConfig` is validated once at startup and never mutated
//! afterwards; every poll cycle reads the same snapshot.

use serde::{Deserialize, Serialize};

use adsync_connector::entry::SearchControl;

use crate::error::PollerError;

/// The query filters used for the three sync phases.
///
/// The nested three-filter form is authoritative. A bare string is
/// accepted as a deprecated shorthand that expands to all three filters
/// being equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EntryFilterForm")]
pub struct EntryFilters {
    /// Filter used during full sync.
    #[serde(rename = "full_sync")]
    pub full: String,
    /// Filter used during incremental sync.
    #[serde(rename = "incremental_sync")]
    pub incremental: String,
    /// Filter used during deleted sync; required when deleted-entry
    /// detection is enabled.
    #[serde(rename = "deleted_sync", skip_serializing_if = "Option::is_none")]
    pub deleted: Option<String>,
}

impl EntryFilters {
    /// Create filters with distinct full and incremental queries.
    pub fn new(full: impl Into<String>, incremental: impl Into<String>) -> Self {
        Self {
            full: full.into(),
            incremental: incremental.into(),
            deleted: None,
        }
    }

    /// Use one filter for every phase (the flat shorthand).
    pub fn uniform(filter: impl Into<String>) -> Self {
        let filter = filter.into();
        Self {
            full: filter.clone(),
            incremental: filter.clone(),
            deleted: Some(filter),
        }
    }

    /// Set the deleted-sync filter.
    pub fn with_deleted(mut self, deleted: impl Into<String>) -> Self {
        self.deleted = Some(deleted.into());
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EntryFilterForm {
    Flat(String),
    Nested {
        full_sync: String,
        incremental_sync: String,
        #[serde(default)]
        deleted_sync: Option<String>,
    },
}

impl From<EntryFilterForm> for EntryFilters {
    fn from(form: EntryFilterForm) -> Self {
        match form {
            EntryFilterForm::Flat(filter) => EntryFilters::uniform(filter),
            EntryFilterForm::Nested {
                full_sync,
                incremental_sync,
                deleted_sync,
            } => EntryFilters {
                full: full_sync,
                incremental: incremental_sync,
                deleted: deleted_sync,
            },
        }
    }
}

/// Downstream synchronization strategy, selected per poller.
///
/// A closed set: adding a strategy means adding a variant here and a
/// `Synchronizer` implementation, not a runtime lookup. Unknown tags
/// fail configuration deserialization before any poller runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    /// Dispatch one structured notification per classified entry.
    #[default]
    Events,
    /// Classify but discard; useful for temporarily disabled syncing.
    Noop,
}

impl std::fmt::Display for SyncType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncType::Events => write!(f, "events"),
            SyncType::Noop => write!(f, "noop"),
        }
    }
}

/// Synchronization settings block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Strategy tag.
    #[serde(rename = "type", default)]
    pub kind: SyncType,
}

/// Controls what gets logged for entries seen during incremental and
/// deleted phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryLogging {
    /// Whether per-entry logging is enabled at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Entry attributes included in the log line. "dn" refers to the
    /// distinguished name.
    #[serde(
        rename = "incremental_entry_attributes_to_log",
        default = "default_logged_attributes"
    )]
    pub attributes: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_logged_attributes() -> Vec<String> {
    vec!["dn".to_string()]
}

impl Default for EntryLogging {
    fn default() -> Self {
        Self {
            enabled: true,
            attributes: default_logged_attributes(),
        }
    }
}

fn default_change_marker_attribute() -> String {
    "uSNChanged".to_string()
}

fn default_created_marker_attribute() -> String {
    "uSNCreated".to_string()
}

/// Immutable configuration for one named poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Unique poller name; the key for durable state and event sourcing.
    pub name: String,

    /// Per-phase query filters.
    #[serde(rename = "entry_filter")]
    pub filters: EntryFilters,

    /// Attributes to project from each entry. Empty means the full
    /// projection offered by the directory.
    #[serde(rename = "entry_attributes_to_fetch", default)]
    pub attributes_to_fetch: Vec<String>,

    /// Protocol-level search controls, applied verbatim and in order.
    #[serde(rename = "ldap_search_server_controls", default)]
    pub search_controls: Vec<SearchControl>,

    /// Whether to run the deleted-entry sweep after the primary phase.
    #[serde(default)]
    pub detect_deleted: bool,

    /// Downstream synchronization settings.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Attribute carrying the entry's update sequence number.
    #[serde(default = "default_change_marker_attribute")]
    pub change_marker_attribute: String,

    /// Attribute carrying the entry's creation sequence number.
    #[serde(default = "default_created_marker_attribute")]
    pub created_marker_attribute: String,

    /// Per-entry logging during incremental and deleted phases.
    #[serde(default)]
    pub logging: EntryLogging,
}

impl PollerConfig {
    /// Create a configuration with the given name and phase filters.
    pub fn new(name: impl Into<String>, filters: EntryFilters) -> Self {
        Self {
            name: name.into(),
            filters,
            attributes_to_fetch: Vec::new(),
            search_controls: Vec::new(),
            detect_deleted: false,
            sync: SyncSettings::default(),
            change_marker_attribute: default_change_marker_attribute(),
            created_marker_attribute: default_created_marker_attribute(),
            logging: EntryLogging::default(),
        }
    }

    /// Set the attribute projection.
    pub fn with_attributes(mut self, attributes: Vec<String>) -> Self {
        self.attributes_to_fetch = attributes;
        self
    }

    /// Append a search control.
    pub fn with_control(mut self, control: SearchControl) -> Self {
        self.search_controls.push(control);
        self
    }

    /// Enable the deleted-entry sweep.
    #[must_use]
    pub fn with_detect_deleted(mut self) -> Self {
        self.detect_deleted = true;
        self
    }

    /// Select the synchronization strategy.
    #[must_use]
    pub fn with_sync_type(mut self, kind: SyncType) -> Self {
        self.sync.kind = kind;
        self
    }

    /// Validate the configuration; called once before the poller is
    /// constructed.
    pub fn validate(&self) -> Result<(), PollerError> {
        if self.name.trim().is_empty() {
            return Err(PollerError::configuration("poller name must not be empty"));
        }
        if self.filters.full.trim().is_empty() {
            return Err(PollerError::configuration(format!(
                "poller '{}': full_sync filter must not be empty",
                self.name
            )));
        }
        if self.filters.incremental.trim().is_empty() {
            return Err(PollerError::configuration(format!(
                "poller '{}': incremental_sync filter must not be empty",
                self.name
            )));
        }
        if self.detect_deleted
            && self
                .filters
                .deleted
                .as_ref()
                .map(|f| f.trim().is_empty())
                .unwrap_or(true)
        {
            return Err(PollerError::configuration(format!(
                "poller '{}': detect_deleted requires a deleted_sync filter",
                self.name
            )));
        }
        if self.change_marker_attribute.trim().is_empty() {
            return Err(PollerError::configuration(format!(
                "poller '{}': change_marker_attribute must not be empty",
                self.name
            )));
        }
        if self.logging.enabled && self.logging.attributes.is_empty() {
            return Err(PollerError::configuration(format!(
                "poller '{}': logging requires at least one attribute",
                self.name
            )));
        }
        Ok(())
    }
}
