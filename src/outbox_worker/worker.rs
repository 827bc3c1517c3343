use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, warn};

use crate::bus::Publisher;
use crate::config::PublisherConfig;
use crate::item::ItemId;
use crate::store::{OutboxEntry, OutboxLog, StoreError};

use super::EventCodec;

/// Result of one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainResult {
    pub claimed: usize,
    pub delivered: usize,
    /// Entries the publisher refused. Released for retry.
    pub failed: usize,
    /// Entries released untried because an earlier entry of the same item failed.
    pub deferred: usize,
}

impl DrainResult {
    pub fn is_idle(&self) -> bool {
        self.claimed == 0
    }

    pub fn merge(&mut self, other: DrainResult) {
        self.claimed += other.claimed;
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.deferred += other.deferred;
    }
}

/// Moves outbox entries onto the bus.
///
/// An entry is marked delivered only after the publisher accepted it, so a
/// crash in between redelivers it (at-least-once). Failed entries are
/// released, never dropped.
pub struct OutboxWorker<S, P> {
    store: S,
    publisher: P,
    codec: EventCodec,
    worker_id: String,
    batch_size: usize,
    lease: Duration,
}

impl<S, P> OutboxWorker<S, P> {
    pub fn new(store: S, publisher: P) -> Self {
        Self::from_config(store, publisher, &PublisherConfig::default())
    }

    pub fn from_config(store: S, publisher: P, config: &PublisherConfig) -> Self {
        Self {
            store,
            publisher,
            codec: config.codec,
            worker_id: config.worker_id.clone(),
            batch_size: config.batch_size.max(1),
            lease: config.lease(),
        }
    }

    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn with_codec(mut self, codec: EventCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }
}

impl<S: OutboxLog, P: Publisher> OutboxWorker<S, P> {
    /// Claim one batch and publish it in sequence order.
    ///
    /// When an entry fails, every later entry of the same item in the batch
    /// is released untried so that item's events stay in order. A store error
    /// ends the pass, releasing whatever the batch had not finished first.
    pub fn drain_once(&self) -> Result<DrainResult, StoreError> {
        let entries = self
            .store
            .claim_pending(&self.worker_id, self.batch_size, self.lease)?;
        let mut result = DrainResult {
            claimed: entries.len(),
            ..DrainResult::default()
        };
        let mut stalled: HashSet<ItemId> = HashSet::new();

        let mut remaining = entries.into_iter();
        while let Some(entry) = remaining.next() {
            if let Err(err) = self.deliver(&entry, &mut stalled, &mut result) {
                let reason = format!("batch abandoned: {err}");
                for unfinished in std::iter::once(entry).chain(remaining) {
                    if let Err(release_err) = self.store.release(unfinished.sequence, &reason) {
                        warn!(
                            sequence = %unfinished.sequence,
                            error = %release_err,
                            "could not release claimed entry, it waits for its lease"
                        );
                    }
                }
                return Err(err);
            }
        }

        Ok(result)
    }

    fn deliver(
        &self,
        entry: &OutboxEntry,
        stalled: &mut HashSet<ItemId>,
        result: &mut DrainResult,
    ) -> Result<(), StoreError> {
        if stalled.contains(&entry.item_id) {
            self.store
                .release(entry.sequence, "deferred behind a failed entry")?;
            result.deferred += 1;
            return Ok(());
        }

        let published = self
            .codec
            .encode(entry)
            .and_then(|event| self.publisher.publish(event));

        match published {
            Ok(()) => {
                self.store.mark_delivered(entry.sequence)?;
                result.delivered += 1;
                debug!(
                    sequence = %entry.sequence,
                    item_id = %entry.item_id,
                    kind = %entry.kind,
                    "outbox entry delivered"
                );
            }
            Err(err) => {
                warn!(
                    sequence = %entry.sequence,
                    item_id = %entry.item_id,
                    attempts = entry.attempts,
                    error = %err,
                    "publish failed, entry released for retry"
                );
                self.store.release(entry.sequence, &err.to_string())?;
                stalled.insert(entry.item_id);
                result.failed += 1;
            }
        }
        Ok(())
    }

    /// Drain until the outbox is empty or a pass stops making progress.
    pub fn drain_all(&self) -> Result<DrainResult, StoreError> {
        let mut total = DrainResult::default();
        loop {
            let pass = self.drain_once()?;
            total.merge(pass);
            if pass.is_idle() || pass.delivered == 0 {
                return Ok(total);
            }
        }
    }
}
