//! # Directory Poller Engine
//!
//! Periodically reconciles against an external hierarchical directory,
//! detecting added, modified, and deleted entries and dispatching one
//! synchronization event per classified entry.
//!
//! ## Key Components
//!
//! - [`PollerConfig`] - Immutable per-source configuration
//! - [`EntryFetcher`] - Builds the per-phase query and fetches entries
//! - [`SyncStateStore`] - Durable watermark state per named poller
//! - [`classify`] - Tags fetched entries as added/updated/deleted
//! - [`Synchronizer`] - Dispatches classified entries downstream
//! - [`Poller`] - Drives one poll cycle per run
//! - [`PollerRegistry`] - Named pollers with run-one/run-all entry points
//!
//! ## Poll Cycle
//!
//! ```text
//! ┌──────────┐    ┌───────────────┐    ┌────────────┐    ┌──────────────┐
//! │  Load    │───►│ Full | Incr.  │───►│ [Deleted]  │───►│ Commit state │
//! │  state   │    │ fetch+dispatch│    │ sweep      │    │ (all-or-none)│
//! └──────────┘    └───────────────┘    └────────────┘    └──────────────┘
//! ```
//!
//! A run executes the phases exactly once and returns; scheduling
//! cadence belongs to the caller. The watermark is committed only after
//! every dispatch in the run succeeded, so a failed run replays from
//! the previous watermark (at-least-once delivery downstream, no lost
//! progress).

pub mod classifier;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod poller;
pub mod registry;
pub mod state;
pub mod synchronizer;

// Re-exports for convenience
pub use classifier::{classify, ChangeKind, ClassifiedChange};
pub use config::{EntryFilters, EntryLogging, PollerConfig, SyncType};
pub use error::PollerError;
pub use fetcher::{EntryFetcher, FetchOutcome, SyncPhase};
pub use poller::{PollReport, Poller};
pub use registry::{PollOutcome, PollerRegistry};
pub use state::{InMemoryStateStore, PgSyncStateStore, StateStoreError, SyncState, SyncStateStore};
pub use synchronizer::{
    make_synchronizer, EntryChangeEvent, EventSynchronizer, NoopSynchronizer, SyncDispatchError,
    Synchronizer,
};
