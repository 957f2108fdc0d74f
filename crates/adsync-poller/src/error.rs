//! Poller error taxonomy.
//!
//! Every variant aborts the current run and is reported to the caller
//! with the poller name attached; nothing is swallowed and no in-run
//! retry is performed. Resilience comes from the next scheduled run
//! re-attempting from the last committed watermark.

use thiserror::Error;

use adsync_connector::error::ConnectorError;

use crate::state::StateStoreError;
use crate::synchronizer::SyncDispatchError;

/// Errors that can abort a poll cycle or fail registry operations.
#[derive(Debug, Error)]
pub enum PollerError {
    /// Invalid or missing configuration; fails fast at startup, fatal
    /// for that poller definition only.
    #[error("invalid poller configuration: {message}")]
    Configuration { message: String },

    /// A poller with the same name is already registered.
    #[error("poller '{name}' is already registered")]
    DuplicatePoller { name: String },

    /// No poller with the given name exists.
    #[error("poller '{name}' is not registered")]
    PollerNotFound { name: String },

    /// An incremental fetch was attempted without a stored watermark.
    /// This indicates a logic bug and is never downgraded to a full
    /// sync.
    #[error("poller '{poller}' attempted an incremental fetch without a watermark")]
    MissingWatermark { poller: String },

    /// The directory transport failed.
    #[error("directory fetch failed: {0}")]
    Fetch(#[from] ConnectorError),

    /// The downstream event channel rejected a notification.
    #[error(transparent)]
    Dispatch(#[from] SyncDispatchError),

    /// The sync state store failed to load or commit.
    #[error("sync state store failure: {0}")]
    State(#[from] StateStoreError),
}

impl PollerError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        PollerError::Configuration {
            message: message.into(),
        }
    }

    /// Whether the next scheduled run may succeed without intervention.
    pub fn is_transient(&self) -> bool {
        match self {
            PollerError::Fetch(e) => e.is_transient(),
            PollerError::Dispatch(e) => e.is_transient(),
            // Another run holds the state row; the next cycle retries.
            PollerError::State(StateStoreError::Conflict { .. }) => true,
            _ => false,
        }
    }
}
