//! Event trait definition for type-safe event publishing.

use serde::{de::DeserializeOwned, Serialize};

/// Trait for types that can be published as synchronization events.
///
/// Implementors define the destination topic and the event type name.
/// Payloads are serialized as JSON inside an envelope.
///
/// # Example
///
/// ```rust
/// use serde::{Serialize, Deserialize};
/// use adsync_events::Event;
///
/// #[derive(Debug, Serialize, Deserialize)]
/// pub struct EntryRemoved {
///     pub dn: String,
/// }
///
/// impl Event for EntryRemoved {
///     const TOPIC: &'static str = "adsync.directory.entry";
///     const EVENT_TYPE: &'static str = "adsync.directory.entry.removed";
/// }
/// ```
pub trait Event: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The channel topic this event type is published to.
    const TOPIC: &'static str;

    /// The fully qualified event type name.
    ///
    /// Stored in the envelope for routing and deserialization.
    /// Convention: `adsync.<entity>.<action>`.
    const EVENT_TYPE: &'static str;
}
