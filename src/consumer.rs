//! Consumer-side deduplication.
//!
//! The outbox delivers at least once, so a consumer may see the same event
//! twice (a crash between publish and `mark_delivered`, an expired lease).
//! Sequences only grow per producer and each item's events arrive in order,
//! so a per-item high-water mark is enough to drop the repeats.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::bus::{Event, PublishError, Subscriber};
use crate::item::ItemEvent;
use crate::outbox_worker::EventCodec;

/// Remembers the highest sequence seen per key.
#[derive(Debug, Default, Clone)]
pub struct Deduplicator {
    high_water: HashMap<String, u64>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_duplicate(&self, key: &str, sequence: u64) -> bool {
        self.high_water
            .get(key)
            .is_some_and(|&seen| sequence <= seen)
    }

    /// Record `sequence` for `key`. Returns `false` if it was already seen.
    pub fn observe(&mut self, key: &str, sequence: u64) -> bool {
        if self.is_duplicate(key, sequence) {
            return false;
        }
        self.high_water.insert(key.to_string(), sequence);
        true
    }

    pub fn len(&self) -> usize {
        self.high_water.len()
    }

    pub fn is_empty(&self) -> bool {
        self.high_water.is_empty()
    }
}

/// Decodes bus events and hands each (producer, item, sequence) to `handler`
/// exactly once.
pub struct IdempotentConsumer<F> {
    dedup: Deduplicator,
    handler: F,
    handled: usize,
    duplicates: usize,
}

impl<F> IdempotentConsumer<F>
where
    F: FnMut(ItemEvent),
{
    pub fn new(handler: F) -> Self {
        IdempotentConsumer {
            dedup: Deduplicator::new(),
            handler,
            handled: 0,
            duplicates: 0,
        }
    }

    /// Handle one event. `Ok(false)` means it was a duplicate and skipped.
    ///
    /// The event only counts as seen once the handler has run, so a payload
    /// that fails to decode is retried on redelivery.
    pub fn deliver(&mut self, event: &Event) -> Result<bool, PublishError> {
        let key = dedup_key(event);
        if self.dedup.is_duplicate(&key, event.sequence) {
            debug!(event_id = %event.id, "duplicate event skipped");
            self.duplicates += 1;
            return Ok(false);
        }

        let decoded = EventCodec::decode(event)?;
        (self.handler)(decoded);
        self.dedup.observe(&key, event.sequence);
        self.handled += 1;
        Ok(true)
    }

    /// Poll `subscriber` until it has nothing within `timeout_ms`, acking
    /// every event handled or skipped and nacking the ones that fail to
    /// decode. Returns how many events were polled.
    pub fn drain<S: Subscriber + ?Sized>(
        &mut self,
        subscriber: &S,
        timeout_ms: u64,
    ) -> Result<usize, PublishError> {
        let mut polled = 0;
        while let Some(event) = subscriber.poll(timeout_ms)? {
            polled += 1;
            match self.deliver(&event) {
                Ok(_) => subscriber.ack(&event.id)?,
                Err(err) => {
                    warn!(event_id = %event.id, error = %err, "event rejected");
                    subscriber.nack(&event.id, &err.to_string())?;
                }
            }
        }
        Ok(polled)
    }

    pub fn handled(&self) -> usize {
        self.handled
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    pub fn into_handler(self) -> F {
        self.handler
    }
}

fn dedup_key(event: &Event) -> String {
    match event.meta("producer") {
        Some(producer) => format!("{producer}/{}", event.key),
        None => event.key.clone(),
    }
}
