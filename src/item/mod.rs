//! The catalog's single entity type and the domain events it produces.

mod event;
mod item;

pub use event::{EventKind, ItemCreated, ItemDeleted, ItemEvent, ItemUpdated};
pub use item::{Item, ItemId, ItemInput, Price};
