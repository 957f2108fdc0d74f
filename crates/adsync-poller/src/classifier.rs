//! Change classification.
//!
//! Classification is about phase semantics, not attribute diffing: a
//! full sync establishes baseline truth, an incremental batch already
//! satisfies "changed since the watermark", and the deleted sweep only
//! ever sees tombstones. The classifier reads the watermark and the
//! fetched batch and nothing else; it performs no I/O.

use serde::{Deserialize, Serialize};

use adsync_connector::entry::{ChangeMarker, DirectoryEntry};

use crate::fetcher::SyncPhase;

/// The kind of change detected for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// The entry is new (or baseline truth from a full sync).
    Added,
    /// The entry changed since the watermark.
    Updated,
    /// The entry was removed from the directory.
    Deleted,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Updated => write!(f, "updated"),
            ChangeKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// One fetched entry tagged with its change kind. Produced per poll
/// cycle and consumed immediately by the synchronizer.
#[derive(Debug, Clone)]
pub struct ClassifiedChange {
    pub entry: DirectoryEntry,
    pub kind: ChangeKind,
}

/// Classify one phase's fetched batch, preserving fetch order.
///
/// - Full: every entry is `Added`. Consumers are expected to be
///   idempotent on entries they already know.
/// - Incremental: `Added` when the entry's creation marker lies beyond
///   the watermark (it was created inside the polled window), otherwise
///   `Updated`. Entries without a creation marker are `Updated`.
/// - Deleted: every entry is `Deleted`.
pub fn classify(
    phase: SyncPhase,
    since: Option<ChangeMarker>,
    entries: Vec<DirectoryEntry>,
) -> Vec<ClassifiedChange> {
    entries
        .into_iter()
        .map(|entry| {
            let kind = match phase {
                SyncPhase::Full => ChangeKind::Added,
                SyncPhase::Incremental => match (entry.created_marker, since) {
                    (Some(created), Some(since)) if created > since => ChangeKind::Added,
                    _ => ChangeKind::Updated,
                },
                SyncPhase::Deleted => ChangeKind::Deleted,
            };
            ClassifiedChange { entry, kind }
        })
        .collect()
}
