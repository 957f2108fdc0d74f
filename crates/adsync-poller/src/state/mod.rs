//! Durable sync state per named poller.
//!
//! The state row is the only thing a poller remembers between runs:
//! the last committed watermark and the time of the last full sync. It
//! is loaded at the start of a cycle and committed once at the end; a
//! run that fails anywhere leaves it untouched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use adsync_connector::entry::ChangeMarker;

mod memory;
mod postgres;

pub use memory::InMemoryStateStore;
pub use postgres::PgSyncStateStore;

/// Durable progress state for one named poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// The owning poller's name.
    pub poller_name: String,
    /// Highest committed change marker; absent before the first
    /// successful full sync.
    pub last_watermark: Option<ChangeMarker>,
    /// When the last successful full sync completed.
    pub last_full_sync_at: Option<DateTime<Utc>>,
}

impl SyncState {
    /// Empty state for a poller that has never completed a cycle.
    pub fn new(poller_name: impl Into<String>) -> Self {
        Self {
            poller_name: poller_name.into(),
            last_watermark: None,
            last_full_sync_at: None,
        }
    }
}

/// Errors from the state store.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// The stored watermark no longer matches what this run loaded;
    /// another run of the same poller committed in between.
    #[error("concurrent state update detected for poller '{poller}'")]
    Conflict { poller: String },

    /// The backing store failed.
    #[error("state store backend failure: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StateStoreError {
    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        StateStoreError::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Create a backend error with source.
    pub fn backend_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        StateStoreError::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Persistence contract for poller sync state.
///
/// `commit` must be atomic (all-or-nothing) and is guarded: it succeeds
/// only while the stored watermark still equals `expected` — the value
/// the run loaded. Runs of the same poller racing each other therefore
/// serialize on the store instead of silently losing watermark
/// advancement.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// Load the state for a poller, or `None` before its first commit.
    async fn load(&self, poller_name: &str) -> Result<Option<SyncState>, StateStoreError>;

    /// Atomically persist `state`, verifying the stored watermark still
    /// matches `expected`.
    async fn commit(
        &self,
        state: &SyncState,
        expected: Option<ChangeMarker>,
    ) -> Result<(), StateStoreError>;
}
