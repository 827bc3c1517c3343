use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use crate::item::ItemId;

use super::{Lock, LockError, LockManager};

/// Lock backed by `Mutex<bool>` + `Condvar`, so it can be held without
/// borrowing a guard from the mutex itself.
pub struct InMemoryLock {
    state: Mutex<bool>,
    wake: Condvar,
}

impl InMemoryLock {
    pub fn new() -> Self {
        InMemoryLock {
            state: Mutex::new(false),
            wake: Condvar::new(),
        }
    }
}

impl Default for InMemoryLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Lock for InMemoryLock {
    fn lock(&self) -> Result<(), LockError> {
        let mut locked = self
            .state
            .lock()
            .map_err(|e| LockError::Poisoned(e.to_string()))?;
        while *locked {
            locked = self
                .wake
                .wait(locked)
                .map_err(|e| LockError::Poisoned(e.to_string()))?;
        }
        *locked = true;
        Ok(())
    }

    fn try_lock(&self) -> Result<bool, LockError> {
        let mut locked = self
            .state
            .lock()
            .map_err(|e| LockError::Poisoned(e.to_string()))?;
        if *locked {
            Ok(false)
        } else {
            *locked = true;
            Ok(true)
        }
    }

    fn unlock(&self) -> Result<(), LockError> {
        let mut locked = self
            .state
            .lock()
            .map_err(|e| LockError::Poisoned(e.to_string()))?;
        if !*locked {
            return Err(LockError::ReleaseFailed("lock is not held".into()));
        }
        *locked = false;
        self.wake.notify_one();
        Ok(())
    }
}

/// Lazily creates one `InMemoryLock` per item id.
///
/// Once the map grows past `prune_above` entries, locks nobody references any
/// more are dropped. A lock is only held through a `LockGuard`, which keeps its
/// own `Arc`, so an unreferenced lock is always free.
pub struct InMemoryLockManager {
    locks: Mutex<HashMap<ItemId, Arc<InMemoryLock>>>,
    prune_above: usize,
}

impl InMemoryLockManager {
    pub fn new() -> Self {
        Self::with_prune_threshold(1024)
    }

    pub fn with_prune_threshold(prune_above: usize) -> Self {
        InMemoryLockManager {
            locks: Mutex::new(HashMap::new()),
            prune_above,
        }
    }

    /// Number of locks currently tracked.
    pub fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryLockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager for InMemoryLockManager {
    type Lock = InMemoryLock;

    fn get_lock(&self, id: &ItemId) -> Result<Arc<InMemoryLock>, LockError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| LockError::Poisoned("lock manager map poisoned".into()))?;

        if locks.len() > self.prune_above {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }

        Ok(locks
            .entry(*id)
            .or_insert_with(|| Arc::new(InMemoryLock::new()))
            .clone())
    }
}
