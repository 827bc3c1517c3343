use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Item, ItemId};

/// Which mutation an outbox entry records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Created => write!(f, "created"),
            EventKind::Updated => write!(f, "updated"),
            EventKind::Deleted => write!(f, "deleted"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCreated {
    pub id: ItemId,
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdated {
    pub id: ItemId,
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDeleted {
    pub id: ItemId,
}

/// Domain event recorded in the outbox alongside the mutation it describes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ItemEvent {
    Created(ItemCreated),
    Updated(ItemUpdated),
    Deleted(ItemDeleted),
}

impl ItemEvent {
    pub fn created(item: &Item) -> Self {
        ItemEvent::Created(ItemCreated {
            id: item.id,
            name: item.name.clone(),
            description: item.description.clone(),
        })
    }

    pub fn updated(item: &Item) -> Self {
        ItemEvent::Updated(ItemUpdated {
            id: item.id,
            name: item.name.clone(),
            description: item.description.clone(),
        })
    }

    pub fn deleted(id: ItemId) -> Self {
        ItemEvent::Deleted(ItemDeleted { id })
    }

    pub fn item_id(&self) -> ItemId {
        match self {
            ItemEvent::Created(e) => e.id,
            ItemEvent::Updated(e) => e.id,
            ItemEvent::Deleted(e) => e.id,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ItemEvent::Created(_) => EventKind::Created,
            ItemEvent::Updated(_) => EventKind::Updated,
            ItemEvent::Deleted(_) => EventKind::Deleted,
        }
    }

    /// Message type name used on the bus.
    pub fn message_type(&self) -> &'static str {
        match self {
            ItemEvent::Created(_) => "ItemCreated",
            ItemEvent::Updated(_) => "ItemUpdated",
            ItemEvent::Deleted(_) => "ItemDeleted",
        }
    }
}
