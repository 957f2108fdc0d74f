//! In-memory event channel.
//!
//! Backs tests and in-process embedding (e.g. the CLI draining poll
//! events to stdout). Records are delivered through an unbounded tokio
//! channel in publish order.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::channel::EventChannel;
use crate::error::EventError;

/// One record accepted by the in-memory channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRecord {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

/// An [`EventChannel`] delivering records to an in-process receiver.
#[derive(Debug, Clone)]
pub struct MemoryEventChannel {
    tx: mpsc::UnboundedSender<PublishedRecord>,
}

impl MemoryEventChannel {
    /// Create a channel together with the receiving end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PublishedRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventChannel for MemoryEventChannel {
    async fn publish_raw(
        &self,
        topic: &str,
        key: &str,
        payload: Vec<u8>,
    ) -> Result<(), EventError> {
        self.tx
            .send(PublishedRecord {
                topic: topic.to_string(),
                key: key.to_string(),
                payload,
            })
            .map_err(|_| EventError::ChannelClosed)
    }
}
