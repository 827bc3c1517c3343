//! In-memory queue for tests and single-process deployments.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use std::time::{Duration, Instant};

use super::{Event, PublishError, Publisher, Subscriber};

/// Thread-safe append-only event log implementing both [`Publisher`] and
/// [`Subscriber`].
///
/// Clones share the log *and* the read position; [`InMemoryQueue::new_subscriber`]
/// shares the log with a fresh position.
///
/// ```
/// use catalog_outbox::bus::{Event, InMemoryQueue, Publisher, Subscriber};
///
/// let queue = InMemoryQueue::new();
/// queue
///     .publish(Event::new("p:1", "ItemDeleted", "item-1", 1, "application/json", b"{}".to_vec()))
///     .unwrap();
///
/// let consumer = queue.new_subscriber();
/// assert_eq!(consumer.poll(10).unwrap().unwrap().event_type, "ItemDeleted");
/// ```
#[derive(Clone)]
pub struct InMemoryQueue {
    log: Arc<RwLock<Vec<Event>>>,
    position: Arc<Mutex<usize>>,
    acked: Arc<Mutex<Vec<String>>>,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self {
            log: Arc::new(RwLock::new(Vec::new())),
            position: Arc::new(Mutex::new(0)),
            acked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A subscriber over the same log with its own read position.
    pub fn new_subscriber(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
            position: Arc::new(Mutex::new(0)),
            acked: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn read_log(&self) -> RwLockReadGuard<'_, Vec<Event>> {
        self.log.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn position(&self) -> MutexGuard<'_, usize> {
        self.position.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<Event> {
        self.read_log().clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.read_log()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read_log().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_log().is_empty()
    }

    pub fn find_by_type(&self, event_type: &str) -> Option<Event> {
        self.read_log()
            .iter()
            .find(|e| e.event_type == event_type)
            .cloned()
    }

    /// Every event published for one item, in publish order.
    pub fn events_for_key(&self, key: &str) -> Vec<Event> {
        self.read_log()
            .iter()
            .filter(|e| e.key == key)
            .cloned()
            .collect()
    }

    pub fn current_position(&self) -> usize {
        *self.position()
    }

    pub fn acknowledged(&self) -> Vec<String> {
        self.acked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Publisher for InMemoryQueue {
    fn publish(&self, event: Event) -> Result<(), PublishError> {
        self.log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }

    fn publish_batch(&self, events: Vec<Event>) -> Result<(), PublishError> {
        self.log
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(events);
        Ok(())
    }
}

impl Subscriber for InMemoryQueue {
    fn poll(&self, timeout_ms: u64) -> Result<Option<Event>, PublishError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            {
                let log = self.read_log();
                let mut pos = self.position();
                if *pos < log.len() {
                    let event = log[*pos].clone();
                    *pos += 1;
                    return Ok(Some(event));
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn ack(&self, event_id: &str) -> Result<(), PublishError> {
        self.acked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event_id.to_string());
        Ok(())
    }

    fn nack(&self, _event_id: &str, _reason: &str) -> Result<(), PublishError> {
        // No redelivery queue; the event stays in the log.
        Ok(())
    }
}
