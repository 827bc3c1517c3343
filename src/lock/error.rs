use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// A thread panicked while holding the lock's internal state.
    #[error("lock poisoned: {0}")]
    Poisoned(String),

    /// Unlocking a lock nobody holds.
    #[error("lock release failed: {0}")]
    ReleaseFailed(String),
}
