use thiserror::Error;

use crate::item::ItemId;
use crate::lock::LockError;
use crate::store::StoreError;

/// Errors surfaced to callers of the [`Catalog`](crate::Catalog) operations.
///
/// Publish failures are deliberately absent: the outbox worker retries them
/// and callers never observe them.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Malformed input, rejected before any write.
    #[error("validation failed: {0}")]
    Validation(String),

    /// No item with the given id.
    #[error("item {0} not found")]
    NotFound(ItemId),

    /// Transient persistence failure. Nothing was written; the caller may retry.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl CatalogError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::StoreUnavailable(_) | CatalogError::Lock(_))
    }

    /// HTTP-equivalent status for a transport layer mapping these errors.
    pub fn status_code(&self) -> u16 {
        match self {
            CatalogError::Validation(_) => 400,
            CatalogError::NotFound(_) => 404,
            CatalogError::StoreUnavailable(_) | CatalogError::Lock(_) => 503,
        }
    }
}

impl From<StoreError> for CatalogError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ItemNotFound(id) => CatalogError::NotFound(id),
            other => CatalogError::StoreUnavailable(other),
        }
    }
}
