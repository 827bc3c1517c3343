use std::sync::Arc;

use thiserror::Error;

/// A message on the bus.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Unique per (producer, sequence).
    pub id: String,
    /// Message type, e.g. `ItemCreated`.
    pub event_type: String,
    /// Partition/ordering key: the item id.
    pub key: String,
    /// Outbox sequence. Together with `key` this is the idempotency key.
    pub sequence: u64,
    /// MIME type of `payload`, e.g. `application/json`.
    pub content_type: String,
    pub payload: Vec<u8>,
    /// Headers (producer id, occurred-at timestamp, ...).
    pub metadata: Vec<(String, String)>,
}

impl Event {
    pub fn new(
        id: impl Into<String>,
        event_type: impl Into<String>,
        key: impl Into<String>,
        sequence: u64,
        content_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            key: key.into(),
            sequence,
            content_type: content_type.into(),
            payload,
            metadata: Vec::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get the payload as a string (if valid UTF-8).
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Delivery failure. Always transient from the outbox's point of view: the
/// entry stays pending and is retried.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("timeout waiting for acknowledgment")]
    Timeout,

    #[error("{0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Sends events to a message bus.
///
/// `Ok(())` must mean the bus has durably accepted the event; the outbox
/// deletes its entry on the strength of it.
pub trait Publisher: Send + Sync {
    fn publish(&self, event: Event) -> Result<(), PublishError>;

    /// Default implementation publishes events sequentially.
    fn publish_batch(&self, events: Vec<Event>) -> Result<(), PublishError> {
        for event in events {
            self.publish(event)?;
        }
        Ok(())
    }
}

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    fn publish(&self, event: Event) -> Result<(), PublishError> {
        (**self).publish(event)
    }

    fn publish_batch(&self, events: Vec<Event>) -> Result<(), PublishError> {
        (**self).publish_batch(events)
    }
}
