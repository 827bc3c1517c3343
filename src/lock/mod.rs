//! Per-item locks.
//!
//! The coordinator holds one lock per item id for the length of a mutation,
//! so a delete or update racing another mutation of the same item commits
//! strictly after it and the item's outbox entries keep their order.
//!
//! `InMemoryLockManager` covers a single process. A deployment that runs
//! several coordinators against one store would plug in a distributed
//! `LockManager` (Postgres advisory locks, Redis, etcd leases).

mod error;
mod in_memory;
mod lock;
mod lock_manager;

pub use error::LockError;
pub use in_memory::{InMemoryLock, InMemoryLockManager};
pub use lock::{Lock, LockGuard};
pub use lock_manager::LockManager;
