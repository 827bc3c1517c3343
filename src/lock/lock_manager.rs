use std::sync::Arc;

use crate::item::ItemId;

use super::{Lock, LockError, LockGuard};

/// Hands out one lock per item id.
pub trait LockManager: Send + Sync {
    type Lock: Lock;

    /// Get (or create) the lock for `id`. Repeated calls with the same id
    /// must return the same logical lock.
    fn get_lock(&self, id: &ItemId) -> Result<Arc<Self::Lock>, LockError>;

    /// Block until the lock for `id` is held; released when the guard drops.
    fn acquire(&self, id: &ItemId) -> Result<LockGuard<Self::Lock>, LockError> {
        LockGuard::acquire(self.get_lock(id)?)
    }
}
