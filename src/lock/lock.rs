use std::sync::Arc;

use tracing::warn;

use super::LockError;

/// A single mutual-exclusion lock.
pub trait Lock: Send + Sync {
    /// Acquire the lock, blocking until it becomes available.
    fn lock(&self) -> Result<(), LockError>;

    /// Returns `Ok(true)` if acquired, `Ok(false)` if already held.
    fn try_lock(&self) -> Result<bool, LockError>;

    fn unlock(&self) -> Result<(), LockError>;
}

/// Holds a lock until dropped.
pub struct LockGuard<L: Lock> {
    lock: Arc<L>,
}

impl<L: Lock> LockGuard<L> {
    /// Block until `lock` is acquired.
    pub fn acquire(lock: Arc<L>) -> Result<Self, LockError> {
        lock.lock()?;
        Ok(LockGuard { lock })
    }

    /// Acquire without blocking, or `None` if someone else holds it.
    pub fn try_acquire(lock: Arc<L>) -> Result<Option<Self>, LockError> {
        if lock.try_lock()? {
            Ok(Some(LockGuard { lock }))
        } else {
            Ok(None)
        }
    }
}

impl<L: Lock> Drop for LockGuard<L> {
    fn drop(&mut self) {
        if let Err(err) = self.lock.unlock() {
            warn!(error = %err, "failed to release lock");
        }
    }
}
