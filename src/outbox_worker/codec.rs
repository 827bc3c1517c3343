use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::bus::{Event, PublishError};
use crate::item::{ItemCreated, ItemDeleted, ItemEvent, ItemUpdated};
use crate::store::OutboxEntry;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const BITCODE_CONTENT_TYPE: &str = "application/x-bitcode";

/// Wire format of event payloads on the bus.
///
/// The payload is the variant body alone (`ItemCreated`, ...); the variant
/// itself travels as `Event::event_type`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCodec {
    #[default]
    Json,
    Bitcode,
}

impl EventCodec {
    pub fn content_type(&self) -> &'static str {
        match self {
            EventCodec::Json => JSON_CONTENT_TYPE,
            EventCodec::Bitcode => BITCODE_CONTENT_TYPE,
        }
    }

    pub fn from_content_type(content_type: &str) -> Option<EventCodec> {
        match content_type {
            JSON_CONTENT_TYPE => Some(EventCodec::Json),
            BITCODE_CONTENT_TYPE => Some(EventCodec::Bitcode),
            _ => None,
        }
    }

    /// Build the bus message for an outbox entry.
    pub fn encode(&self, entry: &OutboxEntry) -> Result<Event, PublishError> {
        let payload = match &entry.event {
            ItemEvent::Created(body) => self.serialize(body)?,
            ItemEvent::Updated(body) => self.serialize(body)?,
            ItemEvent::Deleted(body) => self.serialize(body)?,
        };

        Ok(Event::new(
            format!("{}:{}", entry.producer, entry.sequence),
            entry.event.message_type(),
            entry.item_id.to_string(),
            entry.sequence.value(),
            self.content_type(),
            payload,
        )
        .with_metadata("producer", entry.producer.to_string())
        .with_metadata("occurred_at", entry.occurred_at.to_rfc3339()))
    }

    /// Recover the domain event from a bus message, choosing the codec from
    /// its content type.
    pub fn decode(event: &Event) -> Result<ItemEvent, PublishError> {
        let codec = EventCodec::from_content_type(&event.content_type).ok_or_else(|| {
            PublishError::SerializationFailed(format!(
                "unsupported content type '{}'",
                event.content_type
            ))
        })?;

        match event.event_type.as_str() {
            "ItemCreated" => Ok(ItemEvent::Created(
                codec.deserialize::<ItemCreated>(&event.payload)?,
            )),
            "ItemUpdated" => Ok(ItemEvent::Updated(
                codec.deserialize::<ItemUpdated>(&event.payload)?,
            )),
            "ItemDeleted" => Ok(ItemEvent::Deleted(
                codec.deserialize::<ItemDeleted>(&event.payload)?,
            )),
            other => Err(PublishError::SerializationFailed(format!(
                "unknown event type '{other}'"
            ))),
        }
    }

    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, PublishError> {
        match self {
            EventCodec::Json => serde_json::to_vec(value)
                .map_err(|e| PublishError::SerializationFailed(e.to_string())),
            EventCodec::Bitcode => bitcode::serialize(value)
                .map_err(|e| PublishError::SerializationFailed(e.to_string())),
        }
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, PublishError> {
        match self {
            EventCodec::Json => serde_json::from_slice(bytes)
                .map_err(|e| PublishError::SerializationFailed(e.to_string())),
            EventCodec::Bitcode => bitcode::deserialize(bytes)
                .map_err(|e| PublishError::SerializationFailed(e.to_string())),
        }
    }
}
