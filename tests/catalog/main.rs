//! End-to-end scenarios for the catalog and its outbox.
//!
//! - `crud`: coordinator behaviour seen by callers
//! - `outbox_delivery`: bus outages, retries, per-item ordering
//! - `crash_recovery`: journal replay after an abrupt stop
//! - `properties`: generated inputs

mod crash_recovery;
mod crud;
mod outbox_delivery;
mod properties;
mod support;
