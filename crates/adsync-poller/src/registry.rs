//! Named poller registry.
//!
//! Built once at startup, read-only afterwards. The registry is what
//! the external scheduler holds: it exposes run-one and run-all entry
//! points that report per-poller outcomes instead of raising — one
//! poller's failure never blocks the others.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::error::PollerError;
use crate::poller::{PollReport, Poller};

/// Per-poller result of a run-one/run-all invocation.
#[derive(Debug)]
pub struct PollOutcome {
    /// The poller this outcome belongs to.
    pub poller_name: String,
    /// The run's report, or the error that aborted it.
    pub result: Result<PollReport, PollerError>,
}

impl PollOutcome {
    /// Whether this poller's run succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Holds all named pollers in registration order.
#[derive(Default)]
pub struct PollerRegistry {
    pollers: Vec<Arc<Poller>>,
    index: HashMap<String, usize>,
}

impl PollerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a poller. Names are unique; a duplicate is rejected.
    pub fn register(&mut self, poller: Poller) -> Result<(), PollerError> {
        let name = poller.name().to_string();
        if self.index.contains_key(&name) {
            return Err(PollerError::DuplicatePoller { name });
        }

        self.index.insert(name, self.pollers.len());
        self.pollers.push(Arc::new(poller));
        Ok(())
    }

    /// Look up a poller by name.
    pub fn get(&self, name: &str) -> Result<&Arc<Poller>, PollerError> {
        self.index
            .get(name)
            .map(|&i| &self.pollers[i])
            .ok_or_else(|| PollerError::PollerNotFound {
                name: name.to_string(),
            })
    }

    /// All pollers, in registration order.
    pub fn all(&self) -> impl Iterator<Item = &Arc<Poller>> {
        self.pollers.iter()
    }

    /// Number of registered pollers.
    pub fn len(&self) -> usize {
        self.pollers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.pollers.is_empty()
    }

    /// Run a single poller by name.
    #[instrument(skip(self))]
    pub async fn run_one(&self, name: &str) -> PollOutcome {
        let result = match self.get(name) {
            Ok(poller) => poller.run().await,
            Err(e) => Err(e),
        };

        if let Err(ref e) = result {
            warn!(poller = %name, error = %e, "poll cycle failed");
        }

        PollOutcome {
            poller_name: name.to_string(),
            result,
        }
    }

    /// Run every registered poller, in registration order.
    ///
    /// Failures are isolated: each poller gets its own outcome and a
    /// failing poller never prevents the rest from running.
    #[instrument(skip(self), fields(poller_count = self.pollers.len()))]
    pub async fn run_all(&self) -> Vec<PollOutcome> {
        let mut outcomes = Vec::with_capacity(self.pollers.len());

        for poller in &self.pollers {
            let name = poller.name().to_string();
            let result = poller.run().await;

            match &result {
                Ok(report) => info!(
                    poller = %name,
                    fetched = report.fetched,
                    "poll cycle succeeded"
                ),
                Err(e) => warn!(poller = %name, error = %e, "poll cycle failed"),
            }

            outcomes.push(PollOutcome {
                poller_name: name,
                result,
            });
        }

        outcomes
    }
}
