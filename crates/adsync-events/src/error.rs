//! Error types for the adsync-events crate.

use thiserror::Error;

/// Errors that can occur during event operations.
#[derive(Debug, Error)]
pub enum EventError {
    // Publishing errors (transient, the next poll cycle may succeed)
    /// Failed to publish an event to a topic.
    #[error("failed to publish to topic {topic}: {cause}")]
    PublishFailed { topic: String, cause: String },

    /// The channel is no longer accepting events.
    #[error("event channel closed")]
    ChannelClosed,

    // Serialization errors (permanent)
    /// Failed to serialize an event.
    #[error("failed to serialize event type {event_type}: {cause}")]
    SerializationFailed { event_type: String, cause: String },

    /// Failed to deserialize an event.
    #[error("failed to deserialize event type {event_type}: {cause}")]
    DeserializationFailed { event_type: String, cause: String },

    /// Invalid event envelope.
    #[error("invalid event envelope: {reason}")]
    InvalidEnvelope { reason: String },
}

impl EventError {
    /// Returns true if this error is transient and a later publish of
    /// the same notification can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EventError::PublishFailed { .. } | EventError::ChannelClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_transient() {
        assert!(EventError::ChannelClosed.is_transient());
        assert!(EventError::PublishFailed {
            topic: "t".to_string(),
            cause: "down".to_string(),
        }
        .is_transient());

        assert!(!EventError::SerializationFailed {
            event_type: "adsync.test".to_string(),
            cause: "bad".to_string(),
        }
        .is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = EventError::PublishFailed {
            topic: "adsync.directory.entry".to_string(),
            cause: "broker unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to publish to topic adsync.directory.entry: broker unavailable"
        );
    }
}
