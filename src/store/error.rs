use thiserror::Error;

use crate::item::ItemId;

use super::journal::JournalError;
use super::Sequence;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock poisoned during {0}")]
    LockPoisoned(&'static str),

    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    #[error("outbox entry {0} not found")]
    EntryNotFound(Sequence),

    #[error("item {0} already exists")]
    AlreadyExists(ItemId),

    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
