//! Event envelope wrapping all published events with metadata.

use crate::channel::EventChannel;
use crate::error::EventError;
use crate::event::Event;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Standard envelope wrapping every adsync event.
///
/// Carries the metadata required for routing, idempotence, and audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    /// Unique identifier for this event instance.
    /// Consumers use it for idempotence checking.
    pub event_id: Uuid,

    /// Fully qualified event type name, e.g.
    /// "adsync.directory.entry.changed".
    pub event_type: String,

    /// Name of the poller that produced the event. Doubles as the
    /// partition key so one poller's events stay ordered.
    pub source: String,

    /// Timestamp when the envelope was created.
    pub timestamp: DateTime<Utc>,

    /// The actual event payload.
    pub payload: T,
}

impl<T: Event> EventEnvelope<T> {
    /// Create a new event envelope.
    pub fn new(payload: T, source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: T::EVENT_TYPE.to_string(),
            source: source.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Create an envelope with a specific event ID.
    /// Useful for testing or replaying events.
    pub fn with_id(event_id: Uuid, payload: T, source: impl Into<String>) -> Self {
        Self {
            event_id,
            event_type: T::EVENT_TYPE.to_string(),
            source: source.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Get the topic for this event.
    pub fn topic(&self) -> &'static str {
        T::TOPIC
    }

    /// Get the partition key (the source poller name).
    pub fn partition_key(&self) -> &str {
        &self.source
    }

    /// Serialize the envelope to JSON bytes.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationFailed {
            event_type: T::EVENT_TYPE.to_string(),
            cause: e.to_string(),
        })
    }

    /// Deserialize an envelope from JSON bytes.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationFailed {
            event_type: T::EVENT_TYPE.to_string(),
            cause: e.to_string(),
        })
    }

    /// Publish this envelope through the given channel.
    pub async fn publish(&self, channel: &dyn EventChannel) -> Result<(), EventError> {
        let payload = self.to_json_bytes()?;
        channel
            .publish_raw(self.topic(), self.partition_key(), payload)
            .await
    }
}

/// Raw envelope for consumers that do not know the event type upfront.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEnvelope {
    pub event_id: Uuid,
    pub event_type: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl RawEnvelope {
    /// Parse from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(bytes).map_err(|e| EventError::InvalidEnvelope {
            reason: e.to_string(),
        })
    }

    /// Validate that required fields are present and well-formed.
    pub fn validate(&self) -> Result<(), EventError> {
        if self.event_type.is_empty() {
            return Err(EventError::InvalidEnvelope {
                reason: "event_type is empty".to_string(),
            });
        }

        if !self.event_type.starts_with("adsync.") {
            return Err(EventError::InvalidEnvelope {
                reason: format!(
                    "event_type '{}' does not follow naming convention",
                    self.event_type
                ),
            });
        }

        Ok(())
    }

    /// Try to deserialize the payload into a specific event type.
    pub fn into_typed<T: Event>(self) -> Result<EventEnvelope<T>, EventError> {
        let payload: T = serde_json::from_value(self.payload).map_err(|e| {
            EventError::DeserializationFailed {
                event_type: self.event_type.clone(),
                cause: e.to_string(),
            }
        })?;

        Ok(EventEnvelope {
            event_id: self.event_id,
            event_type: self.event_type,
            source: self.source,
            timestamp: self.timestamp,
            payload,
        })
    }
}
