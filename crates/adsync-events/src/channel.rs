//! Publishing seam to the external event bus.

use async_trait::async_trait;

use crate::error::EventError;

/// A channel that accepts serialized event records.
///
/// This is the boundary to the concrete event bus. Delivery and retry
/// semantics beyond a single `publish_raw` call belong to the channel
/// implementation; callers treat any error as "this notification was
/// not accepted" and must not record it as delivered.
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Publish one serialized record to `topic`, keyed by `key`.
    async fn publish_raw(&self, topic: &str, key: &str, payload: Vec<u8>)
        -> Result<(), EventError>;
}
