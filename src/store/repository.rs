use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::item::{Item, ItemId};

use super::journal::{Journal, JournalRecord};
use super::state::{State, StateTransaction};
use super::{
    DeliveryStatus, EntityStore, OutboxEntry, OutboxLog, ProducerId, Sequence, StoreError,
    Transaction, UnitOfWork,
};

struct Inner {
    state: State,
    journal: Option<Journal>,
    compact_after: Option<u64>,
}

impl Inner {
    fn compact(&mut self) -> Result<usize, StoreError> {
        let pruned = self.state.prune_delivered();
        if let Some(journal) = self.journal.as_mut() {
            journal.rewrite(&self.state.snapshot_records())?;
        }
        Ok(pruned)
    }
}

/// Item store plus outbox log sharing one lock and one journal.
///
/// Cloning gives another handle to the same storage, which is how the
/// coordinator and the outbox worker thread share it.
#[derive(Clone)]
pub struct CatalogRepository {
    inner: Arc<RwLock<Inner>>,
}

impl CatalogRepository {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::from_parts(State::new(ProducerId::new()), None, StoreConfig::default().compact_after)
    }

    /// Open the store described by `config`, replaying its journal if it has one.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let Some(path) = &config.journal_path else {
            return Ok(Self::from_parts(
                State::new(ProducerId::new()),
                None,
                config.compact_after,
            ));
        };

        let (mut journal, records) = Journal::open(path, config.fsync)?;
        let has_genesis = records
            .iter()
            .any(|record| matches!(record, JournalRecord::Genesis { .. }));
        let replayed = records.len();

        let mut state = State::new(ProducerId::new());
        for record in records {
            state.apply(record);
        }
        if !has_genesis {
            journal.append(&JournalRecord::Genesis {
                producer: state.producer,
                next_sequence: state.next_sequence,
            })?;
        }

        info!(
            path = %path.display(),
            producer = %state.producer,
            records = replayed,
            items = state.items.len(),
            pending = state.backlog(),
            "catalog store recovered"
        );

        Ok(Self::from_parts(state, Some(journal), config.compact_after))
    }

    fn from_parts(state: State, journal: Option<Journal>, compact_after: Option<u64>) -> Self {
        CatalogRepository {
            inner: Arc::new(RwLock::new(Inner {
                state,
                journal,
                compact_after,
            })),
        }
    }

    pub fn producer(&self) -> Result<ProducerId, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(inner.state.producer)
    }

    pub fn journal_path(&self) -> Result<Option<PathBuf>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(inner.journal.as_ref().map(|j| j.path().to_path_buf()))
    }

    /// Every outbox entry with the given status, oldest first.
    pub fn entries_by_status(&self, status: DeliveryStatus) -> Result<Vec<OutboxEntry>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::LockPoisoned("outbox read"))?;
        Ok(inner
            .state
            .outbox
            .values()
            .filter(|entry| entry.status == status)
            .cloned()
            .collect())
    }

    /// Drop delivered entries and rewrite the journal without them.
    pub fn compact(&self) -> Result<usize, StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::LockPoisoned("compact"))?;
        inner.compact()
    }
}

impl EntityStore for CatalogRepository {
    fn get(&self, id: &ItemId) -> Result<Option<Item>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(inner.state.items.get(id).cloned())
    }

    fn get_all(&self) -> Result<Vec<Item>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;
        Ok(inner.state.items_sorted())
    }
}

impl UnitOfWork for CatalogRepository {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;
        let inner = &mut *guard;

        let mut tx = StateTransaction::new(&mut inner.state);
        let value = f(&mut tx)?;

        if !tx.changes().is_empty() {
            if let Some(journal) = inner.journal.as_mut() {
                let record = JournalRecord::Commit {
                    changes: tx.changes().to_vec(),
                };
                journal.append(&record).map_err(StoreError::from)?;
            }
            debug!(changes = tx.changes().len(), "transaction committed");
        }

        tx.commit();
        Ok(value)
    }
}

impl OutboxLog for CatalogRepository {
    fn peek_pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::LockPoisoned("outbox read"))?;
        Ok(inner.state.pending(limit))
    }

    fn claim_pending(
        &self,
        worker_id: &str,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::LockPoisoned("outbox write"))?;
        let now = Utc::now();
        let lease = chrono::Duration::from_std(lease).unwrap_or(chrono::Duration::MAX);
        let expires_at = now.checked_add_signed(lease).unwrap_or(now);
        Ok(inner.state.claim(worker_id, limit, now, expires_at))
    }

    fn mark_delivered(&self, sequence: Sequence) -> Result<(), StoreError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| StoreError::LockPoisoned("outbox write"))?;
        let inner = &mut *guard;

        let entry = inner
            .state
            .outbox
            .get(&sequence)
            .ok_or(StoreError::EntryNotFound(sequence))?;
        if entry.is_delivered() {
            return Ok(());
        }

        let at = Utc::now();
        if let Some(journal) = inner.journal.as_mut() {
            journal.append(&JournalRecord::Delivered { sequence, at })?;
        }
        if let Some(entry) = inner.state.outbox.get_mut(&sequence) {
            entry.deliver(at);
        }
        inner.state.delivered_since_compaction += 1;

        let due = inner
            .compact_after
            .is_some_and(|threshold| inner.state.delivered_since_compaction >= threshold);
        if due {
            // The delivery itself is already durable; a failed compaction only
            // leaves a longer journal behind.
            if let Err(err) = inner.compact() {
                warn!(error = %err, "outbox compaction failed");
            }
        }
        Ok(())
    }

    fn release(&self, sequence: Sequence, error: &str) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::LockPoisoned("outbox write"))?;
        let entry = inner
            .state
            .outbox
            .get_mut(&sequence)
            .ok_or(StoreError::EntryNotFound(sequence))?;
        let error = if error.is_empty() { None } else { Some(error) };
        entry.release(error);
        Ok(())
    }

    fn backlog(&self) -> Result<usize, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::LockPoisoned("outbox read"))?;
        Ok(inner.state.backlog())
    }
}
