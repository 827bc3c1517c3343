use std::sync::{Arc, Mutex};

use tracing::info;

use super::{Event, PublishError, Publisher};

/// A publisher that writes events to the log, or into a buffer.
///
/// Useful as a stand-in bus while a real broker client is not wired up.
#[derive(Clone, Default)]
pub struct LogPublisher {
    buffer: Option<Arc<Mutex<Vec<String>>>>,
}

impl LogPublisher {
    pub fn new() -> Self {
        LogPublisher { buffer: None }
    }

    pub fn with_buffer(buffer: Arc<Mutex<Vec<String>>>) -> Self {
        LogPublisher {
            buffer: Some(buffer),
        }
    }
}

impl Publisher for LogPublisher {
    fn publish(&self, event: Event) -> Result<(), PublishError> {
        let payload = String::from_utf8_lossy(&event.payload);

        match &self.buffer {
            Some(buffer) => {
                let line = format!(
                    "[OUTBOX] {} key={} seq={} {}",
                    event.event_type, event.key, event.sequence, payload
                );
                buffer
                    .lock()
                    .map_err(|_| PublishError::Rejected("log publisher buffer poisoned".into()))?
                    .push(line);
            }
            None => info!(
                event_id = %event.id,
                event_type = %event.event_type,
                key = %event.key,
                sequence = event.sequence,
                payload = %payload,
                "outbox event published"
            ),
        }
        Ok(())
    }
}
