use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::item::{EventKind, ItemEvent, ItemId};

/// Identity of the process (journal) that produced an outbox entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProducerId(Uuid);

impl ProducerId {
    pub fn new() -> Self {
        ProducerId(Uuid::now_v7())
    }
}

impl Default for ProducerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outbox sequence number, strictly increasing per producer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequence(u64);

impl Sequence {
    pub const FIRST: Sequence = Sequence(1);

    pub fn new(value: u64) -> Self {
        Sequence(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Sequence {
        Sequence(self.0 + 1)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Delivered,
}

/// Time-bounded reservation of an entry by one worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claim {
    pub worker_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Durable record of an event awaiting delivery.
///
/// `claim`, `attempts` and `last_error` are runtime bookkeeping and are not
/// journaled: after a restart every undelivered entry is simply Pending again.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub producer: ProducerId,
    pub sequence: Sequence,
    pub item_id: ItemId,
    pub kind: EventKind,
    pub event: ItemEvent,
    pub status: DeliveryStatus,
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub claim: Option<Claim>,
    #[serde(skip)]
    pub attempts: u32,
    #[serde(skip)]
    pub last_error: Option<String>,
}

impl OutboxEntry {
    pub(crate) fn new(producer: ProducerId, sequence: Sequence, event: ItemEvent) -> Self {
        OutboxEntry {
            producer,
            sequence,
            item_id: event.item_id(),
            kind: event.kind(),
            event,
            status: DeliveryStatus::Pending,
            occurred_at: Utc::now(),
            delivered_at: None,
            claim: None,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == DeliveryStatus::Pending
    }

    pub fn is_delivered(&self) -> bool {
        self.status == DeliveryStatus::Delivered
    }

    /// Whether a live claim held by someone blocks `now`.
    pub fn is_claimed(&self, now: DateTime<Utc>) -> bool {
        self.claim
            .as_ref()
            .map(|claim| claim.expires_at > now)
            .unwrap_or(false)
    }

    pub(crate) fn claim(&mut self, worker_id: &str, expires_at: DateTime<Utc>) {
        self.attempts = self.attempts.saturating_add(1);
        self.claim = Some(Claim {
            worker_id: worker_id.to_string(),
            expires_at,
        });
    }

    pub(crate) fn release(&mut self, error: Option<&str>) {
        self.claim = None;
        self.last_error = error.map(|value| value.to_string());
    }

    pub(crate) fn deliver(&mut self, at: DateTime<Utc>) {
        self.status = DeliveryStatus::Delivered;
        self.delivered_at = Some(at);
        self.claim = None;
        self.last_error = None;
    }
}
