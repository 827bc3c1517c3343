//! The mutation coordinator: the only writer of item state.
//!
//! Each mutation validates its input, takes the item's lock (update and
//! delete), and commits the item change together with its outbox entry in one
//! unit of work. The
//! outbox worker is woken afterwards; callers never wait on the bus.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};

use crate::error::CatalogError;
use crate::item::{Item, ItemEvent, ItemId, ItemInput};
use crate::lock::{InMemoryLockManager, LockManager};
use crate::outbox_worker::Notifier;
use crate::store::CatalogStore;

pub struct Catalog<S, M = InMemoryLockManager> {
    store: S,
    locks: Arc<M>,
    notifier: Option<Notifier>,
}

impl<S: CatalogStore> Catalog<S> {
    pub fn new(store: S) -> Self {
        Catalog {
            store,
            locks: Arc::new(InMemoryLockManager::new()),
            notifier: None,
        }
    }
}

impl<S: Clone, M> Clone for Catalog<S, M> {
    fn clone(&self) -> Self {
        Catalog {
            store: self.store.clone(),
            locks: Arc::clone(&self.locks),
            notifier: self.notifier.clone(),
        }
    }
}

impl<S: CatalogStore, M: LockManager> Catalog<S, M> {
    /// Serialize mutations through a different lock manager.
    pub fn with_lock_manager<N: LockManager>(self, locks: Arc<N>) -> Catalog<S, N> {
        Catalog {
            store: self.store,
            locks,
            notifier: self.notifier,
        }
    }

    /// Wake this notifier after every commit.
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Every item, oldest first.
    pub fn list(&self) -> Result<Vec<Item>, CatalogError> {
        Ok(self.store.get_all()?)
    }

    pub fn get_by_id(&self, id: &ItemId) -> Result<Item, CatalogError> {
        self.store.get(id)?.ok_or(CatalogError::NotFound(*id))
    }

    #[instrument(skip_all, fields(name = %input.name))]
    pub fn create(&self, input: ItemInput) -> Result<Item, CatalogError> {
        let fields = input.validate()?;
        // A fresh id is unknown to every other caller, so there is nothing to lock.
        let mut item = Item::from_fields(fields, Utc::now());
        item.id = ItemId::new();

        let (item, sequence) = self.store.transaction(|tx| {
            tx.create(item.clone())?;
            let sequence = tx.append(ItemEvent::created(&item));
            Ok::<_, CatalogError>((item, sequence))
        })?;

        debug!(item_id = %item.id, %sequence, "item created");
        self.wake_publisher();
        Ok(item)
    }

    /// Replace every mutable field of the item. Fields absent from `input`
    /// become empty; `id` and `created_at` are kept.
    #[instrument(skip_all, fields(item_id = %id))]
    pub fn update(&self, id: &ItemId, input: ItemInput) -> Result<Item, CatalogError> {
        let fields = input.validate()?;
        let _guard = self.locks.acquire(id)?;

        let (item, sequence) = self.store.transaction(|tx| {
            let mut item = tx.get(id).cloned().ok_or(CatalogError::NotFound(*id))?;
            item.replace(fields);
            tx.update(id, item.clone())?;
            let sequence = tx.append(ItemEvent::updated(&item));
            Ok::<_, CatalogError>((item, sequence))
        })?;

        debug!(%sequence, "item updated");
        self.wake_publisher();
        Ok(item)
    }

    #[instrument(skip_all, fields(item_id = %id))]
    pub fn delete(&self, id: &ItemId) -> Result<(), CatalogError> {
        let _guard = self.locks.acquire(id)?;

        let sequence = self.store.transaction(|tx| {
            tx.remove(id)?;
            Ok::<_, CatalogError>(tx.append(ItemEvent::deleted(*id)))
        })?;

        debug!(%sequence, "item deleted");
        self.wake_publisher();
        Ok(())
    }

    fn wake_publisher(&self) {
        if let Some(notifier) = &self.notifier {
            notifier.notify();
        }
    }
}
