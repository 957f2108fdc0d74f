//! Directory transport trait.

use async_trait::async_trait;

use crate::entry::{DirectoryEntry, SearchControl};
use crate::error::ConnectorResult;

/// A directory service that can be searched.
///
/// One search call yields one finite batch of entries (one full
/// snapshot or one delta); there is no implicit resumption — the caller
/// resumes by issuing a new search with an adjusted filter. Attribute
/// multi-values and per-entry change markers must be surfaced when the
/// backend supports them.
#[async_trait]
pub trait DirectorySearch: Send + Sync {
    /// Execute a search with the given filter, attribute projection and
    /// protocol-level controls.
    ///
    /// An empty `attributes` slice requests the backend's full
    /// projection; implementations must pass it through verbatim rather
    /// than substituting a default list. `controls` are applied
    /// unmodified and in order.
    async fn search(
        &self,
        filter: &str,
        attributes: &[String],
        controls: &[SearchControl],
    ) -> ConnectorResult<Vec<DirectoryEntry>>;

    /// Verify the directory is reachable and credentials are accepted.
    async fn test_connection(&self) -> ConnectorResult<()>;
}
