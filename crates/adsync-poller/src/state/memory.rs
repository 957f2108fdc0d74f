//! In-memory state store for tests and ephemeral runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use adsync_connector::entry::ChangeMarker;

use super::{StateStoreError, SyncState, SyncStateStore};

/// A `SyncStateStore` holding state in process memory.
///
/// State does not survive restarts; every poller starts with a full
/// sync after the process comes back up.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    states: RwLock<HashMap<String, SyncState>>,
}

impl InMemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncStateStore for InMemoryStateStore {
    async fn load(&self, poller_name: &str) -> Result<Option<SyncState>, StateStoreError> {
        Ok(self.states.read().await.get(poller_name).cloned())
    }

    async fn commit(
        &self,
        state: &SyncState,
        expected: Option<ChangeMarker>,
    ) -> Result<(), StateStoreError> {
        let mut states = self.states.write().await;

        let current = states
            .get(&state.poller_name)
            .and_then(|s| s.last_watermark);
        if current != expected {
            return Err(StateStoreError::Conflict {
                poller: state.poller_name.clone(),
            });
        }

        states.insert(state.poller_name.clone(), state.clone());
        Ok(())
    }
}
