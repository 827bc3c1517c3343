//! Item catalog with a transactional outbox.
//!
//! Every accepted mutation commits together with an outbox entry describing
//! it; an [`OutboxWorker`](outbox_worker::OutboxWorker) later moves those
//! entries onto the bus. A crash between the two phases loses nothing: the
//! journal replays the store and the still-pending entries on restart.
//!
//! ```
//! use catalog_outbox::bus::InMemoryQueue;
//! use catalog_outbox::outbox_worker::OutboxWorker;
//! use catalog_outbox::{Catalog, CatalogRepository, ItemInput};
//!
//! let repo = CatalogRepository::in_memory();
//! let catalog = Catalog::new(repo.clone());
//!
//! let sword = catalog.create(ItemInput::new("Sword", "Sharp", 10.0)).unwrap();
//! assert_eq!(catalog.get_by_id(&sword.id).unwrap().name, "Sword");
//!
//! let queue = InMemoryQueue::new();
//! OutboxWorker::new(repo, queue.clone()).drain_once().unwrap();
//! assert_eq!(queue.find_by_type("ItemCreated").unwrap().key, sword.id.to_string());
//! ```

pub mod bus;
pub mod config;
pub mod consumer;
mod coordinator;
mod error;
pub mod item;
pub mod lock;
pub mod outbox_worker;
pub mod store;
pub mod telemetry;

pub use config::{CatalogConfig, ConfigError, PublisherConfig, StoreConfig};
pub use consumer::{Deduplicator, IdempotentConsumer};
pub use coordinator::Catalog;
pub use error::CatalogError;
pub use item::{EventKind, Item, ItemEvent, ItemId, ItemInput, Price};
pub use outbox_worker::{Notifier, OutboxWorker, OutboxWorkerThread};
pub use store::{
    CatalogRepository, CatalogStore, EntityStore, OutboxEntry, OutboxLog, Sequence, StoreError,
    Transaction, UnitOfWork,
};
