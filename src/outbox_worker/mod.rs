//! Outbox worker: drains committed outbox entries onto the bus.
//!
//! The outbox pattern has two distinct phases:
//! 1. **Commit phase** (see `coordinator`): the item write and its outbox
//!    entry commit atomically.
//! 2. **Worker phase** (this module): claim pending entries, publish them,
//!    mark them delivered.
//!
//! - [`OutboxWorker`]: synchronous drain of one batch
//! - [`OutboxWorkerThread`]: background loop with wake-ups and backoff
//! - [`EventCodec`]: outbox entry to bus [`Event`](crate::bus::Event)
//!
//! ## Example
//!
//! ```
//! use catalog_outbox::bus::InMemoryQueue;
//! use catalog_outbox::outbox_worker::OutboxWorker;
//! use catalog_outbox::{Catalog, CatalogRepository, ItemInput};
//!
//! let repo = CatalogRepository::in_memory();
//! let catalog = Catalog::new(repo.clone());
//! catalog.create(ItemInput::new("Sword", "Sharp", 10.0)).unwrap();
//!
//! let queue = InMemoryQueue::new();
//! let worker = OutboxWorker::new(repo, queue.clone());
//! assert_eq!(worker.drain_once().unwrap().delivered, 1);
//! assert_eq!(queue.event_types(), vec!["ItemCreated"]);
//! ```

mod backoff;
mod codec;
mod thread;
mod worker;

pub use backoff::Backoff;
pub use codec::{EventCodec, BITCODE_CONTENT_TYPE, JSON_CONTENT_TYPE};
pub use thread::{Notifier, OutboxWorkerThread, WorkerStats};
pub use worker::{DrainResult, OutboxWorker};
