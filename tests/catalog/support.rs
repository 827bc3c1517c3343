//! Test doubles shared by the catalog scenarios.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use catalog_outbox::bus::{Event, InMemoryQueue, PublishError, Publisher};
use catalog_outbox::{
    CatalogRepository, EntityStore, Item, ItemId, OutboxEntry, OutboxLog, Sequence, StoreConfig,
    StoreError, Transaction, UnitOfWork,
};
use tempfile::TempDir;

/// A bus that can be taken offline. While offline every publish fails with
/// `ConnectionFailed` and nothing reaches the queue.
#[derive(Clone)]
pub struct SwitchablePublisher {
    online: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
    pub queue: InMemoryQueue,
}

impl SwitchablePublisher {
    pub fn online() -> Self {
        Self {
            online: Arc::new(AtomicBool::new(true)),
            attempts: Arc::new(AtomicUsize::new(0)),
            queue: InMemoryQueue::new(),
        }
    }

    pub fn offline() -> Self {
        let publisher = Self::online();
        publisher.set_online(false);
        publisher
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Publish calls seen, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Publisher for SwitchablePublisher {
    fn publish(&self, event: Event) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.online.load(Ordering::SeqCst) {
            return Err(PublishError::ConnectionFailed("bus offline".into()));
        }
        self.queue.publish(event)
    }
}

/// Wraps a repository and refuses every unit of work while `down`.
#[derive(Clone)]
pub struct FlakyStore {
    inner: CatalogRepository,
    down: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn new(inner: CatalogRepository) -> Self {
        Self {
            inner,
            down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &CatalogRepository {
        &self.inner
    }
}

impl EntityStore for FlakyStore {
    fn get(&self, id: &ItemId) -> Result<Option<Item>, StoreError> {
        self.inner.get(id)
    }

    fn get_all(&self) -> Result<Vec<Item>, StoreError> {
        self.inner.get_all()
    }
}

impl UnitOfWork for FlakyStore {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk offline".into()).into());
        }
        self.inner.transaction(f)
    }
}

impl OutboxLog for FlakyStore {
    fn peek_pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        self.inner.peek_pending(limit)
    }

    fn claim_pending(
        &self,
        worker_id: &str,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        self.inner.claim_pending(worker_id, limit, lease)
    }

    fn mark_delivered(&self, sequence: Sequence) -> Result<(), StoreError> {
        self.inner.mark_delivered(sequence)
    }

    fn release(&self, sequence: Sequence, error: &str) -> Result<(), StoreError> {
        self.inner.release(sequence, error)
    }

    fn backlog(&self) -> Result<usize, StoreError> {
        self.inner.backlog()
    }
}

/// A journal path inside a fresh temporary directory.
pub fn journal_dir() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("catalog.journal");
    (dir, path)
}

/// Open a journaled repository with fsync off (tests only).
pub fn open_repo(path: &Path) -> CatalogRepository {
    CatalogRepository::open(&StoreConfig::journal(path).with_fsync(false)).expect("open journal")
}
