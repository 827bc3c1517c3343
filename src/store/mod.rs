//! Entity store and outbox log.
//!
//! Both live behind one store so a mutation and the outbox entry describing
//! it commit together:
//!
//! ```text
//! Catalog ──transaction──▶ ┌──────────────────────────────┐
//!                          │ Transaction                  │
//!                          │  create/update/remove(item)  │
//!                          │  append(event) -> Sequence   │
//!                          └──────────────┬───────────────┘
//!                                         ▼ one journal line
//!                          ┌──────────────────────────────┐
//!                          │ CatalogRepository            │
//!                          │  items  │  outbox (by seq)   │
//!                          └──────────────┬───────────────┘
//! OutboxWorker ◀── claim_pending / mark_delivered / release
//! ```

mod error;
pub mod journal;
mod record;
mod repository;
mod state;

use std::time::Duration;

use crate::item::{Item, ItemEvent, ItemId};

pub use error::StoreError;
pub use journal::JournalError;
pub use record::{Claim, DeliveryStatus, OutboxEntry, ProducerId, Sequence};
pub use repository::CatalogRepository;

/// Read access to items.
pub trait EntityStore {
    fn get(&self, id: &ItemId) -> Result<Option<Item>, StoreError>;

    /// Every item, oldest first.
    fn get_all(&self) -> Result<Vec<Item>, StoreError>;
}

/// Writes staged inside one atomic unit. Nothing is visible to other readers
/// until the unit commits, and nothing survives if it does not.
pub trait Transaction {
    fn get(&self, id: &ItemId) -> Option<&Item>;

    /// Insert a new item, assigning a fresh id when `item.id` is nil.
    fn create(&mut self, item: Item) -> Result<ItemId, StoreError>;

    /// Replace the stored item. Fails with `ItemNotFound` if absent.
    fn update(&mut self, id: &ItemId, item: Item) -> Result<(), StoreError>;

    /// Remove and return the stored item. Fails with `ItemNotFound` if absent.
    fn remove(&mut self, id: &ItemId) -> Result<Item, StoreError>;

    /// Record an event in the outbox, returning its sequence number.
    fn append(&mut self, event: ItemEvent) -> Sequence;
}

/// Runs a closure as one atomic unit of work.
pub trait UnitOfWork {
    /// Commit every change `f` stages if it returns `Ok`; roll all of them back
    /// if it returns `Err` or if persisting the unit fails.
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
        E: From<StoreError>;
}

/// Reader/deleter side of the outbox.
pub trait OutboxLog {
    /// Pending entries, oldest first, ignoring claims.
    fn peek_pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError>;

    /// Lease up to `limit` pending entries to `worker_id` for `lease`.
    fn claim_pending(
        &self,
        worker_id: &str,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<OutboxEntry>, StoreError>;

    /// Mark an entry delivered. Idempotent for entries already delivered.
    fn mark_delivered(&self, sequence: Sequence) -> Result<(), StoreError>;

    /// Give a claimed entry back for a later attempt.
    fn release(&self, sequence: Sequence, error: &str) -> Result<(), StoreError>;

    /// Number of entries still awaiting delivery.
    fn backlog(&self) -> Result<usize, StoreError>;
}

/// Everything the coordinator and the outbox worker need from a store.
pub trait CatalogStore: EntityStore + OutboxLog + UnitOfWork + Send + Sync {}

impl<T> CatalogStore for T where T: EntityStore + OutboxLog + UnitOfWork + Send + Sync {}
