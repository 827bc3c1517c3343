//! Message bus seam.
//!
//! The outbox worker only needs [`Publisher`]; consumers pull through
//! [`Subscriber`]. A broker client (Kafka, NATS, RabbitMQ) implements these
//! traits outside this crate.
//!
//! ```text
//! OutboxWorker ──publish(Event)──▶ Publisher ══ broker ══▶ Subscriber ──poll──▶ IdempotentConsumer
//! ```
//!
//! Delivery is at-least-once. Every [`Event`] carries its idempotency key
//! (`key` = item id, `sequence`) so consumers can drop redeliveries.

mod in_memory_queue;
mod log_publisher;
mod publisher;
mod subscriber;

pub use in_memory_queue::InMemoryQueue;
pub use log_publisher::LogPublisher;
pub use publisher::{Event, PublishError, Publisher};
pub use subscriber::Subscriber;
