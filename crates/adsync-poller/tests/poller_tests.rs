//! End-to-end poll cycle tests over an in-process directory and event
//! channel.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use adsync_connector::entry::{
    AttributeSet, ChangeMarker, DirectoryEntry, SearchControl,
};
use adsync_connector::error::ConnectorResult;
use adsync_connector::traits::DirectorySearch;
use adsync_events::{EventChannel, EventEnvelope, EventError};
use adsync_poller::{
    make_synchronizer, ChangeKind, EntryChangeEvent, EntryFilters, InMemoryStateStore,
    PollerConfig, Poller, PollerError, PollerRegistry, StateStoreError, SyncPhase, SyncState,
    SyncStateStore,
};

/// Scripted directory routing on the phase the filter encodes.
#[derive(Default)]
struct ScriptedDirectory {
    full: Vec<DirectoryEntry>,
    incremental: Vec<DirectoryEntry>,
    deleted: Vec<DirectoryEntry>,
    filters_seen: Mutex<Vec<String>>,
    attributes_seen: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl DirectorySearch for ScriptedDirectory {
    async fn search(
        &self,
        filter: &str,
        attributes: &[String],
        _controls: &[SearchControl],
    ) -> ConnectorResult<Vec<DirectoryEntry>> {
        self.filters_seen.lock().unwrap().push(filter.to_string());
        self.attributes_seen
            .lock()
            .unwrap()
            .push(attributes.to_vec());

        let entries = if filter.contains("isDeleted=TRUE") {
            &self.deleted
        } else if filter.contains(">=") {
            &self.incremental
        } else {
            &self.full
        };
        Ok(entries.clone())
    }

    async fn test_connection(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

/// Event channel that records accepted notifications and can fail one
/// specific publish.
#[derive(Default)]
struct ScriptedChannel {
    accepted: Mutex<Vec<Vec<u8>>>,
    fail_at: Mutex<Option<usize>>,
    publishes: AtomicUsize,
}

impl ScriptedChannel {
    fn fail_at(&self, index: usize) {
        *self.fail_at.lock().unwrap() = Some(index);
    }

    fn events(&self) -> Vec<EntryChangeEvent> {
        self.accepted
            .lock()
            .unwrap()
            .iter()
            .map(|bytes| {
                EventEnvelope::<EntryChangeEvent>::from_json_bytes(bytes)
                    .unwrap()
                    .payload
            })
            .collect()
    }
}

#[async_trait]
impl EventChannel for ScriptedChannel {
    async fn publish_raw(
        &self,
        topic: &str,
        _key: &str,
        payload: Vec<u8>,
    ) -> Result<(), EventError> {
        let index = self.publishes.fetch_add(1, Ordering::SeqCst);

        let should_fail = {
            let mut fail_at = self.fail_at.lock().unwrap();
            if *fail_at == Some(index) {
                // One-shot failure; the replayed run succeeds.
                *fail_at = None;
                true
            } else {
                false
            }
        };
        if should_fail {
            return Err(EventError::PublishFailed {
                topic: topic.to_string(),
                cause: "simulated channel outage".to_string(),
            });
        }

        self.accepted.lock().unwrap().push(payload);
        Ok(())
    }
}

/// State store wrapper counting commits.
struct CountingStore {
    inner: InMemoryStateStore,
    commits: AtomicUsize,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: InMemoryStateStore::new(),
            commits: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SyncStateStore for CountingStore {
    async fn load(&self, poller_name: &str) -> Result<Option<SyncState>, StateStoreError> {
        self.inner.load(poller_name).await
    }

    async fn commit(
        &self,
        state: &SyncState,
        expected: Option<ChangeMarker>,
    ) -> Result<(), StateStoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit(state, expected).await
    }
}

fn user_entry(dn: &str, changed: u64) -> DirectoryEntry {
    DirectoryEntry::new(dn, AttributeSet::new().with("cn", dn))
        .with_change_marker(changed)
}

fn tombstone(dn: &str, changed: u64) -> DirectoryEntry {
    user_entry(dn, changed).deleted()
}

fn corp_ad_config() -> PollerConfig {
    PollerConfig::new(
        "corp-ad",
        EntryFilters::new("(objectClass=user)", "(objectClass=user)")
            .with_deleted("(isDeleted=TRUE)"),
    )
}

fn build_poller(
    config: PollerConfig,
    directory: Arc<ScriptedDirectory>,
    channel: Arc<ScriptedChannel>,
    store: Arc<dyn SyncStateStore>,
) -> Poller {
    let synchronizer = make_synchronizer(config.sync.kind, channel);
    Poller::new(config, directory, synchronizer, store).unwrap()
}

async fn seed_watermark(store: &dyn SyncStateStore, poller: &str, watermark: u64) {
    let state = SyncState {
        poller_name: poller.to_string(),
        last_watermark: Some(ChangeMarker(watermark)),
        last_full_sync_at: Some(chrono::Utc::now()),
    };
    store.commit(&state, None).await.unwrap();
}

#[tokio::test]
async fn first_run_executes_full_baseline() {
    let directory = Arc::new(ScriptedDirectory {
        full: vec![
            user_entry("CN=A,DC=example,DC=com", 110),
            user_entry("CN=B,DC=example,DC=com", 120),
            user_entry("CN=C,DC=example,DC=com", 115),
        ],
        ..Default::default()
    });
    let channel = Arc::new(ScriptedChannel::default());
    let store = Arc::new(InMemoryStateStore::new());

    let poller = build_poller(corp_ad_config(), directory.clone(), channel.clone(), store.clone());
    let report = poller.run().await.unwrap();

    // Three Added dispatches, in fetch order.
    let events = channel.events();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.kind == ChangeKind::Added));
    assert_eq!(events[0].distinguished_name, "CN=A,DC=example,DC=com");
    assert_eq!(events[1].distinguished_name, "CN=B,DC=example,DC=com");
    assert!(events.iter().all(|e| e.poller_name == "corp-ad"));

    assert_eq!(report.phase, SyncPhase::Full);
    assert_eq!(report.added, 3);
    assert_eq!(report.watermark, Some(ChangeMarker(120)));

    // The full filter ran verbatim with the full projection.
    let filters = directory.filters_seen.lock().unwrap().clone();
    assert_eq!(filters, vec!["(objectClass=user)"]);
    let attributes = directory.attributes_seen.lock().unwrap().clone();
    assert!(attributes[0].is_empty());

    // Committed state: max marker plus a fresh full-sync timestamp.
    let state = store.load("corp-ad").await.unwrap().unwrap();
    assert_eq!(state.last_watermark, Some(ChangeMarker(120)));
    assert!(state.last_full_sync_at.is_some());
}

#[tokio::test]
async fn incremental_run_advances_watermark() {
    let directory = Arc::new(ScriptedDirectory {
        incremental: vec![user_entry("CN=A,DC=example,DC=com", 105)],
        ..Default::default()
    });
    let channel = Arc::new(ScriptedChannel::default());
    let store = Arc::new(InMemoryStateStore::new());
    seed_watermark(store.as_ref(), "corp-ad", 100).await;

    let poller = build_poller(corp_ad_config(), directory.clone(), channel.clone(), store.clone());
    let report = poller.run().await.unwrap();

    let events = channel.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, ChangeKind::Updated);

    assert_eq!(report.phase, SyncPhase::Incremental);
    assert_eq!(report.updated, 1);
    assert_eq!(report.watermark, Some(ChangeMarker(105)));

    // The watermark was embedded, boundary excluded.
    let filters = directory.filters_seen.lock().unwrap().clone();
    assert_eq!(
        filters,
        vec!["(&(objectClass=user)(uSNChanged>=100)(!(uSNChanged=100)))"]
    );

    let state = store.load("corp-ad").await.unwrap().unwrap();
    assert_eq!(state.last_watermark, Some(ChangeMarker(105)));
    // Incremental runs keep the previous full-sync timestamp.
    assert!(state.last_full_sync_at.is_some());
}

#[tokio::test]
async fn incremental_classifies_new_entries_as_added() {
    let directory = Arc::new(ScriptedDirectory {
        incremental: vec![
            user_entry("CN=Old,DC=example,DC=com", 104).with_created_marker(90u64),
            user_entry("CN=New,DC=example,DC=com", 106).with_created_marker(103u64),
        ],
        ..Default::default()
    });
    let channel = Arc::new(ScriptedChannel::default());
    let store = Arc::new(InMemoryStateStore::new());
    seed_watermark(store.as_ref(), "corp-ad", 100).await;

    let poller = build_poller(corp_ad_config(), directory, channel.clone(), store);
    let report = poller.run().await.unwrap();

    let events = channel.events();
    assert_eq!(events[0].kind, ChangeKind::Updated);
    assert_eq!(events[1].kind, ChangeKind::Added);
    assert_eq!(report.added, 1);
    assert_eq!(report.updated, 1);
}

#[tokio::test]
async fn deleted_phase_never_runs_when_detection_disabled() {
    let directory = Arc::new(ScriptedDirectory {
        incremental: vec![user_entry("CN=A,DC=example,DC=com", 101)],
        deleted: vec![tombstone("CN=Gone,DC=example,DC=com", 102)],
        ..Default::default()
    });
    let channel = Arc::new(ScriptedChannel::default());
    let store = Arc::new(InMemoryStateStore::new());
    seed_watermark(store.as_ref(), "corp-ad", 100).await;

    // Deleted filter configured, detection off.
    let poller = build_poller(corp_ad_config(), directory.clone(), channel.clone(), store);
    poller.run().await.unwrap();

    let filters = directory.filters_seen.lock().unwrap().clone();
    assert_eq!(filters.len(), 1);
    assert!(!filters[0].contains("isDeleted"));
    assert!(channel.events().iter().all(|e| e.kind != ChangeKind::Deleted));
}

#[tokio::test]
async fn deleted_phase_dispatches_after_incremental_with_single_commit() {
    let directory = Arc::new(ScriptedDirectory {
        incremental: vec![user_entry("CN=A,DC=example,DC=com", 105)],
        deleted: vec![
            tombstone("CN=Gone1,DC=example,DC=com", 106),
            tombstone("CN=Gone2,DC=example,DC=com", 107),
        ],
        ..Default::default()
    });
    let channel = Arc::new(ScriptedChannel::default());
    let store = Arc::new(CountingStore::new());
    seed_watermark(&*store, "corp-ad", 100).await;
    let seeded_commits = store.commits.load(Ordering::SeqCst);

    let config = corp_ad_config().with_detect_deleted();
    let poller = build_poller(config, directory, channel.clone(), store.clone());
    let report = poller.run().await.unwrap();

    // Incremental dispatches first, then the deleted sweep.
    let events = channel.events();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].kind, ChangeKind::Updated);
    assert_eq!(events[1].kind, ChangeKind::Deleted);
    assert_eq!(events[2].kind, ChangeKind::Deleted);

    // Both phases are reflected in one state commit.
    assert_eq!(store.commits.load(Ordering::SeqCst) - seeded_commits, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.deleted, 2);
    // Tombstone markers participate in the candidate watermark.
    assert_eq!(report.watermark, Some(ChangeMarker(107)));
}

#[tokio::test]
async fn dispatch_failure_aborts_run_without_commit_and_replays() {
    let directory = Arc::new(ScriptedDirectory {
        incremental: vec![
            user_entry("CN=A,DC=example,DC=com", 101),
            user_entry("CN=B,DC=example,DC=com", 102),
            user_entry("CN=C,DC=example,DC=com", 103),
        ],
        ..Default::default()
    });
    let channel = Arc::new(ScriptedChannel::default());
    let store = Arc::new(InMemoryStateStore::new());
    seed_watermark(store.as_ref(), "corp-ad", 100).await;

    // The second dispatch of the first run fails.
    channel.fail_at(1);

    let poller = build_poller(corp_ad_config(), directory, channel.clone(), store.clone());

    let err = poller.run().await.unwrap_err();
    assert!(matches!(err, PollerError::Dispatch(_)));

    // No commit happened; the watermark is untouched.
    let state = store.load("corp-ad").await.unwrap().unwrap();
    assert_eq!(state.last_watermark, Some(ChangeMarker(100)));
    assert_eq!(channel.events().len(), 1);

    // The next cycle replays every entry from the same watermark.
    let report = poller.run().await.unwrap();
    assert_eq!(report.updated, 3);
    assert_eq!(channel.events().len(), 4);

    let state = store.load("corp-ad").await.unwrap().unwrap();
    assert_eq!(state.last_watermark, Some(ChangeMarker(103)));
}

#[tokio::test]
async fn empty_incremental_cycle_keeps_watermark() {
    let directory = Arc::new(ScriptedDirectory::default());
    let channel = Arc::new(ScriptedChannel::default());
    let store = Arc::new(InMemoryStateStore::new());
    seed_watermark(store.as_ref(), "corp-ad", 100).await;

    let poller = build_poller(corp_ad_config(), directory, channel.clone(), store.clone());
    let report = poller.run().await.unwrap();

    assert_eq!(report.fetched, 0);
    assert_eq!(report.watermark, Some(ChangeMarker(100)));
    assert!(channel.events().is_empty());

    let state = store.load("corp-ad").await.unwrap().unwrap();
    assert_eq!(state.last_watermark, Some(ChangeMarker(100)));
}

#[tokio::test]
async fn watermark_never_regresses() {
    // A lagging replica reports an entry below the stored watermark.
    let directory = Arc::new(ScriptedDirectory {
        incremental: vec![user_entry("CN=Stale,DC=example,DC=com", 90)],
        ..Default::default()
    });
    let channel = Arc::new(ScriptedChannel::default());
    let store = Arc::new(InMemoryStateStore::new());
    seed_watermark(store.as_ref(), "corp-ad", 100).await;

    let poller = build_poller(corp_ad_config(), directory, channel, store.clone());
    let report = poller.run().await.unwrap();

    assert_eq!(report.watermark, Some(ChangeMarker(100)));
    let state = store.load("corp-ad").await.unwrap().unwrap();
    assert_eq!(state.last_watermark, Some(ChangeMarker(100)));
}

#[tokio::test]
async fn run_all_isolates_poller_failures() {
    // "corp-ad" fails its only dispatch; "lab-ad" succeeds.
    let failing_directory = Arc::new(ScriptedDirectory {
        full: vec![user_entry("CN=A,DC=example,DC=com", 10)],
        ..Default::default()
    });
    let failing_channel = Arc::new(ScriptedChannel::default());
    failing_channel.fail_at(0);

    let healthy_directory = Arc::new(ScriptedDirectory {
        full: vec![user_entry("CN=B,DC=lab,DC=com", 20)],
        ..Default::default()
    });
    let healthy_channel = Arc::new(ScriptedChannel::default());

    let store: Arc<dyn SyncStateStore> = Arc::new(InMemoryStateStore::new());

    let mut registry = PollerRegistry::new();
    registry
        .register(build_poller(
            corp_ad_config(),
            failing_directory,
            failing_channel,
            store.clone(),
        ))
        .unwrap();

    let mut lab_config = corp_ad_config();
    lab_config.name = "lab-ad".to_string();
    registry
        .register(build_poller(
            lab_config,
            healthy_directory,
            healthy_channel.clone(),
            store.clone(),
        ))
        .unwrap();

    let outcomes = registry.run_all().await;
    assert_eq!(outcomes.len(), 2);

    assert_eq!(outcomes[0].poller_name, "corp-ad");
    assert!(matches!(
        outcomes[0].result,
        Err(PollerError::Dispatch(_))
    ));

    assert_eq!(outcomes[1].poller_name, "lab-ad");
    assert!(outcomes[1].is_success());
    assert_eq!(healthy_channel.events().len(), 1);

    // The failed poller committed nothing; the healthy one did.
    assert!(store.load("corp-ad").await.unwrap().is_none());
    assert!(store.load("lab-ad").await.unwrap().is_some());
}

#[tokio::test]
async fn monotonic_watermark_across_successive_runs() {
    let directory = Arc::new(ScriptedDirectory {
        full: vec![user_entry("CN=A,DC=example,DC=com", 50)],
        incremental: vec![user_entry("CN=A,DC=example,DC=com", 75)],
        ..Default::default()
    });
    let channel = Arc::new(ScriptedChannel::default());
    let store = Arc::new(InMemoryStateStore::new());

    let poller = build_poller(corp_ad_config(), directory, channel, store.clone());

    let mut last = None;
    for _ in 0..3 {
        let report = poller.run().await.unwrap();
        assert!(report.watermark >= last);
        last = report.watermark;
    }
    assert_eq!(last, Some(ChangeMarker(75)));
}
