//! The poll cycle state machine.
//!
//! One call to [`Poller::run`] executes the phases exactly once:
//! load state, run the full or incremental phase, optionally run the
//! deleted sweep, then commit the advanced watermark in a single
//! guarded write. Any failure leaves the stored state untouched, so the
//! next cycle replays the same phase from the same watermark.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, instrument};

use adsync_connector::entry::ChangeMarker;
use adsync_connector::traits::DirectorySearch;

use crate::classifier::{classify, ChangeKind, ClassifiedChange};
use crate::config::PollerConfig;
use crate::error::PollerError;
use crate::fetcher::{EntryFetcher, SyncPhase};
use crate::state::{SyncState, SyncStateStore};
use crate::synchronizer::Synchronizer;

/// Outcome of one successful poll cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollReport {
    /// The poller that ran.
    pub poller_name: String,
    /// The primary phase that was executed.
    pub phase: SyncPhase,
    /// Entries fetched across all phases of the run.
    pub fetched: usize,
    /// Added dispatches.
    pub added: usize,
    /// Updated dispatches.
    pub updated: usize,
    /// Deleted dispatches.
    pub deleted: usize,
    /// The committed watermark after the run.
    pub watermark: Option<ChangeMarker>,
}

impl PollReport {
    fn new(poller_name: &str, phase: SyncPhase) -> Self {
        Self {
            poller_name: poller_name.to_string(),
            phase,
            fetched: 0,
            added: 0,
            updated: 0,
            deleted: 0,
            watermark: None,
        }
    }

    fn count(&mut self, kind: ChangeKind) {
        match kind {
            ChangeKind::Added => self.added += 1,
            ChangeKind::Updated => self.updated += 1,
            ChangeKind::Deleted => self.deleted += 1,
        }
    }
}

/// One named directory poller.
pub struct Poller {
    config: Arc<PollerConfig>,
    fetcher: EntryFetcher,
    synchronizer: Arc<dyn Synchronizer>,
    store: Arc<dyn SyncStateStore>,
    /// Serializes runs of this poller instance; the state store's
    /// guarded commit covers runs in other processes.
    run_guard: Mutex<()>,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Poller {
    /// Create a poller. Validates the configuration up front; an
    /// invalid definition never produces a runnable poller.
    pub fn new(
        config: PollerConfig,
        directory: Arc<dyn DirectorySearch>,
        synchronizer: Arc<dyn Synchronizer>,
        store: Arc<dyn SyncStateStore>,
    ) -> Result<Self, PollerError> {
        config.validate()?;

        let config = Arc::new(config);
        let fetcher = EntryFetcher::new(directory, config.clone());

        Ok(Self {
            config,
            fetcher,
            synchronizer,
            store,
            run_guard: Mutex::new(()),
        })
    }

    /// The poller's unique name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The poller's configuration snapshot.
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Execute one poll cycle.
    ///
    /// Routing: no stored watermark means the full phase, otherwise
    /// incremental. The deleted sweep runs after the primary phase when
    /// configured. State is committed once, and only if every dispatch
    /// across all phases succeeded.
    #[instrument(skip(self), fields(poller = %self.config.name))]
    pub async fn run(&self) -> Result<PollReport, PollerError> {
        let _guard = self.run_guard.lock().await;

        let prior = self.store.load(&self.config.name).await?;
        let since = prior.as_ref().and_then(|s| s.last_watermark);

        let phase = if since.is_none() {
            SyncPhase::Full
        } else {
            SyncPhase::Incremental
        };

        info!(phase = %phase, watermark = ?since, "starting poll cycle");

        let mut report = PollReport::new(&self.config.name, phase);

        let outcome = self.fetcher.fetch(phase, since).await?;
        report.fetched += outcome.entries.len();
        let mut observed = outcome.max_marker;

        let changes = classify(phase, since, outcome.entries);
        self.dispatch_all(phase, &changes, &mut report).await?;

        if self.config.detect_deleted {
            let outcome = self.fetcher.fetch(SyncPhase::Deleted, since).await?;
            report.fetched += outcome.entries.len();
            observed = observed.max(outcome.max_marker);

            let changes = classify(SyncPhase::Deleted, since, outcome.entries);
            self.dispatch_all(SyncPhase::Deleted, &changes, &mut report)
                .await?;
        }

        // Never regress: an empty cycle keeps the prior watermark, and
        // a lagging replica cannot pull it backwards.
        let watermark = match (since, observed) {
            (Some(prior), Some(seen)) => Some(prior.max(seen)),
            (Some(prior), None) => Some(prior),
            (None, seen) => seen,
        };

        let last_full_sync_at = if phase == SyncPhase::Full {
            Some(Utc::now())
        } else {
            prior.as_ref().and_then(|s| s.last_full_sync_at)
        };

        let state = SyncState {
            poller_name: self.config.name.clone(),
            last_watermark: watermark,
            last_full_sync_at,
        };
        self.store.commit(&state, since).await?;

        report.watermark = watermark;

        info!(
            fetched = report.fetched,
            added = report.added,
            updated = report.updated,
            deleted = report.deleted,
            watermark = ?report.watermark,
            "poll cycle committed"
        );

        Ok(report)
    }

    /// Dispatch classified entries in order, stopping at the first
    /// failure.
    async fn dispatch_all(
        &self,
        phase: SyncPhase,
        changes: &[ClassifiedChange],
        report: &mut PollReport,
    ) -> Result<(), PollerError> {
        for change in changes {
            self.log_change(phase, change);
            self.synchronizer
                .synchronize(change, &self.config.name)
                .await?;
            report.count(change.kind);
        }
        Ok(())
    }

    /// Log one entry seen during the incremental or deleted phase with
    /// the configured attribute projection. Full-sync batches are only
    /// summarized.
    fn log_change(&self, phase: SyncPhase, change: &ClassifiedChange) {
        if !self.config.logging.enabled || phase == SyncPhase::Full {
            return;
        }

        let mut projection = serde_json::Map::new();
        for attribute in &self.config.logging.attributes {
            let value = if attribute.eq_ignore_ascii_case("dn") {
                serde_json::Value::String(change.entry.dn.clone())
            } else {
                change
                    .entry
                    .attributes
                    .get(attribute)
                    .and_then(|v| serde_json::to_value(v).ok())
                    .unwrap_or(serde_json::Value::Null)
            };
            projection.insert(attribute.clone(), value);
        }

        info!(
            poller = %self.config.name,
            phase = %phase,
            kind = %change.kind,
            entry = %serde_json::Value::Object(projection),
            "classified entry"
        );
    }
}
