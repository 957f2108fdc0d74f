//! Downstream synchronization of classified entries.
//!
//! A synchronizer receives classified entries one at a time, in
//! classification order, and performs the configured downstream action.
//! It must not suppress failures: the poller decides what a failed
//! dispatch means (abort the run, keep the watermark where it was).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use adsync_connector::entry::AttributeSet;
use adsync_events::{Event, EventChannel, EventEnvelope, EventError};

use crate::classifier::{ChangeKind, ClassifiedChange};
use crate::config::SyncType;

/// Notification raised for one classified directory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryChangeEvent {
    /// Name of the poller that observed the change.
    pub poller_name: String,
    /// What happened to the entry.
    pub kind: ChangeKind,
    /// The entry's distinguished name.
    pub distinguished_name: String,
    /// The projected attributes at observation time.
    pub attributes: AttributeSet,
    /// When the notification was emitted.
    pub emitted_at: DateTime<Utc>,
}

impl Event for EntryChangeEvent {
    const TOPIC: &'static str = "adsync.directory.entry";
    const EVENT_TYPE: &'static str = "adsync.directory.entry.changed";
}

/// A notification the downstream channel did not accept.
#[derive(Debug, Error)]
#[error("dispatch of {kind} for '{dn}' failed: {source}")]
pub struct SyncDispatchError {
    /// The change kind that failed to dispatch.
    pub kind: ChangeKind,
    /// Distinguished name of the affected entry.
    pub dn: String,
    #[source]
    pub source: EventError,
}

impl SyncDispatchError {
    /// Whether redelivering the same notification later can succeed.
    pub fn is_transient(&self) -> bool {
        self.source.is_transient()
    }
}

/// Performs the downstream action for classified entries.
#[async_trait]
pub trait Synchronizer: Send + Sync {
    /// Handle one classified entry. Called once per entry, in
    /// classification order; an error aborts the remainder of the run.
    async fn synchronize(
        &self,
        change: &ClassifiedChange,
        poller_name: &str,
    ) -> Result<(), SyncDispatchError>;
}

/// Synchronizer that raises one structured notification per entry onto
/// an event channel. Delivery and retry beyond a single publish are the
/// channel's responsibility.
pub struct EventSynchronizer {
    channel: Arc<dyn EventChannel>,
}

impl EventSynchronizer {
    /// Create a synchronizer publishing to the given channel.
    pub fn new(channel: Arc<dyn EventChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl Synchronizer for EventSynchronizer {
    async fn synchronize(
        &self,
        change: &ClassifiedChange,
        poller_name: &str,
    ) -> Result<(), SyncDispatchError> {
        let event = EntryChangeEvent {
            poller_name: poller_name.to_string(),
            kind: change.kind,
            distinguished_name: change.entry.dn.clone(),
            attributes: change.entry.attributes.clone(),
            emitted_at: Utc::now(),
        };

        let envelope = EventEnvelope::new(event, poller_name);
        envelope
            .publish(self.channel.as_ref())
            .await
            .map_err(|source| SyncDispatchError {
                kind: change.kind,
                dn: change.entry.dn.clone(),
                source,
            })
    }
}

/// Synchronizer that classifies but dispatches nothing.
pub struct NoopSynchronizer;

#[async_trait]
impl Synchronizer for NoopSynchronizer {
    async fn synchronize(
        &self,
        change: &ClassifiedChange,
        poller_name: &str,
    ) -> Result<(), SyncDispatchError> {
        debug!(
            poller = %poller_name,
            kind = %change.kind,
            dn = %change.entry.dn,
            "noop synchronizer discarding change"
        );
        Ok(())
    }
}

/// Build the synchronizer for a configured sync type.
///
/// A closed match: new strategies are new `SyncType` variants plus an
/// implementation here, never a runtime lookup.
pub fn make_synchronizer(kind: SyncType, channel: Arc<dyn EventChannel>) -> Arc<dyn Synchronizer> {
    match kind {
        SyncType::Events => Arc::new(EventSynchronizer::new(channel)),
        SyncType::Noop => Arc::new(NoopSynchronizer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adsync_connector::entry::DirectoryEntry;
    use adsync_events::MemoryEventChannel;

    fn change(kind: ChangeKind) -> ClassifiedChange {
        ClassifiedChange {
            entry: DirectoryEntry::new(
                "CN=John Doe,OU=Users,DC=example,DC=com",
                AttributeSet::new().with("cn", "John Doe"),
            ),
            kind,
        }
    }

    #[tokio::test]
    async fn test_event_synchronizer_publishes_notification() {
        let (channel, mut rx) = MemoryEventChannel::new();
        let synchronizer = EventSynchronizer::new(Arc::new(channel));

        synchronizer
            .synchronize(&change(ChangeKind::Added), "corp-ad")
            .await
            .unwrap();

        let record = rx.recv().await.unwrap();
        assert_eq!(record.topic, "adsync.directory.entry");
        assert_eq!(record.key, "corp-ad");

        let envelope: EventEnvelope<EntryChangeEvent> =
            EventEnvelope::from_json_bytes(&record.payload).unwrap();
        assert_eq!(envelope.event_type, "adsync.directory.entry.changed");
        assert_eq!(envelope.source, "corp-ad");
        assert_eq!(envelope.payload.poller_name, "corp-ad");
        assert_eq!(envelope.payload.kind, ChangeKind::Added);
        assert_eq!(
            envelope.payload.distinguished_name,
            "CN=John Doe,OU=Users,DC=example,DC=com"
        );
        assert_eq!(envelope.payload.attributes.get_string("cn"), Some("John Doe"));
    }

    #[tokio::test]
    async fn test_event_synchronizer_surfaces_channel_failure() {
        let (channel, rx) = MemoryEventChannel::new();
        drop(rx);
        let synchronizer = EventSynchronizer::new(Arc::new(channel));

        let err = synchronizer
            .synchronize(&change(ChangeKind::Updated), "corp-ad")
            .await
            .unwrap_err();

        assert_eq!(err.kind, ChangeKind::Updated);
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_noop_synchronizer_accepts_everything() {
        let synchronizer = NoopSynchronizer;
        for kind in [ChangeKind::Added, ChangeKind::Updated, ChangeKind::Deleted] {
            synchronizer
                .synchronize(&change(kind), "corp-ad")
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_make_synchronizer_noop_ignores_channel() {
        let (channel, rx) = MemoryEventChannel::new();
        drop(rx);
        // A closed channel must not matter for the noop variant.
        let synchronizer = make_synchronizer(SyncType::Noop, Arc::new(channel));

        synchronizer
            .synchronize(&change(ChangeKind::Added), "corp-ad")
            .await
            .unwrap();
    }

    #[test]
    fn test_change_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&ChangeKind::Added).unwrap(),
            "\"added\""
        );
        assert_eq!(
            serde_json::to_string(&ChangeKind::Deleted).unwrap(),
            "\"deleted\""
        );
    }
}
