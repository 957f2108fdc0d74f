//! Per-phase entry fetching.
//!
//! The fetcher owns filter construction: the configured phase filter,
//! with the stored watermark embedded for incremental and deleted
//! fetches. It projects exactly the configured attributes, passes
//! search controls through untouched, and reports the highest change
//! marker it saw as the candidate next watermark.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use adsync_connector::entry::{ChangeMarker, DirectoryEntry};
use adsync_connector::filter::escape_filter_value;
use adsync_connector::traits::DirectorySearch;

use crate::config::PollerConfig;
use crate::error::PollerError;

/// The sync phase a fetch runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// Fetch the entire matching entry set as baseline truth.
    Full,
    /// Fetch entries changed since the watermark.
    Incremental,
    /// Fetch entries removed from the directory (tombstones).
    Deleted,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::Full => write!(f, "full"),
            SyncPhase::Incremental => write!(f, "incremental"),
            SyncPhase::Deleted => write!(f, "deleted"),
        }
    }
}

/// Result of one fetch: the entry batch plus the highest change marker
/// observed across it.
#[derive(Debug)]
pub struct FetchOutcome {
    pub entries: Vec<DirectoryEntry>,
    pub max_marker: Option<ChangeMarker>,
}

/// Fetches directory entries for a poller's phases.
pub struct EntryFetcher {
    directory: Arc<dyn DirectorySearch>,
    config: Arc<PollerConfig>,
}

impl EntryFetcher {
    /// Create a fetcher over the given transport and configuration.
    pub fn new(directory: Arc<dyn DirectorySearch>, config: Arc<PollerConfig>) -> Self {
        Self { directory, config }
    }

    /// Fetch one batch for the given phase.
    ///
    /// One call yields one finite result set; resuming means calling
    /// again with an advanced watermark.
    #[instrument(skip(self), fields(poller = %self.config.name, phase = %phase))]
    pub async fn fetch(
        &self,
        phase: SyncPhase,
        since: Option<ChangeMarker>,
    ) -> Result<FetchOutcome, PollerError> {
        let filter = self.build_filter(phase, since)?;
        let attributes = self.request_attributes();

        debug!(filter = %filter, "fetching directory entries");

        let entries = self
            .directory
            .search(&filter, &attributes, &self.config.search_controls)
            .await?;

        let max_marker = entries.iter().filter_map(|e| e.change_marker).max();

        debug!(
            entry_count = entries.len(),
            max_marker = ?max_marker,
            "fetch completed"
        );

        Ok(FetchOutcome {
            entries,
            max_marker,
        })
    }

    /// Build the query filter for a phase.
    ///
    /// Incremental and deleted filters constrain on the marker
    /// attribute being strictly beyond the watermark; the watermark
    /// value is escaped before embedding.
    pub fn build_filter(
        &self,
        phase: SyncPhase,
        since: Option<ChangeMarker>,
    ) -> Result<String, PollerError> {
        match phase {
            SyncPhase::Full => Ok(self.config.filters.full.clone()),

            SyncPhase::Incremental => {
                let since = since.ok_or_else(|| PollerError::MissingWatermark {
                    poller: self.config.name.clone(),
                })?;
                Ok(self.combine_with_watermark(&self.config.filters.incremental, since))
            }

            SyncPhase::Deleted => {
                let base = self.config.filters.deleted.as_ref().ok_or_else(|| {
                    PollerError::configuration(format!(
                        "poller '{}': deleted fetch without a deleted_sync filter",
                        self.config.name
                    ))
                })?;
                // Before the first watermark exists the deleted filter
                // runs verbatim; the directory decides which tombstones
                // are visible.
                Ok(match since {
                    Some(since) => self.combine_with_watermark(base, since),
                    None => base.clone(),
                })
            }
        }
    }

    /// AND the phase filter with "changed after the watermark".
    ///
    /// The boundary marker itself is excluded so the entry that
    /// produced the watermark is not reprocessed every cycle.
    fn combine_with_watermark(&self, base: &str, since: ChangeMarker) -> String {
        let attribute = &self.config.change_marker_attribute;
        let value = escape_filter_value(&since.to_string());
        format!("(&{base}({attribute}>={value})(!({attribute}={value})))")
    }

    /// The attribute projection sent to the transport.
    ///
    /// An empty configured list is passed through verbatim (full
    /// projection). A non-empty projection gets the marker attributes
    /// appended when missing, so watermark tracking and classification
    /// keep working regardless of what the operator projected.
    fn request_attributes(&self) -> Vec<String> {
        if self.config.attributes_to_fetch.is_empty() {
            return Vec::new();
        }

        let mut attributes = self.config.attributes_to_fetch.clone();
        for marker in [
            &self.config.change_marker_attribute,
            &self.config.created_marker_attribute,
        ] {
            if !attributes.iter().any(|a| a.eq_ignore_ascii_case(marker)) {
                attributes.push(marker.clone());
            }
        }
        attributes
    }
}
