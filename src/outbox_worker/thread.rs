//! Background thread that keeps the outbox drained.
//!
//! The thread sleeps for `poll_interval` between passes unless a
//! [`Notifier`] wakes it earlier. After a failed pass it waits out an
//! exponential backoff instead, and wakes do not cut that wait short.

use std::io;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::bus::Publisher;
use crate::config::PublisherConfig;
use crate::store::OutboxLog;

use super::{Backoff, OutboxWorker};

enum Signal {
    Wake,
    Stop,
}

/// Statistics from the outbox worker thread.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub polls: usize,
    pub delivered: usize,
    pub failed: usize,
    pub deferred: usize,
    pub store_errors: usize,
}

/// Wakes the worker thread. Sending never blocks and never fails, even after
/// the thread has stopped.
#[derive(Clone)]
pub struct Notifier {
    tx: Sender<Signal>,
}

impl Notifier {
    pub fn notify(&self) {
        let _ = self.tx.send(Signal::Wake);
    }
}

/// A background thread draining the outbox into a publisher.
///
/// ```ignore
/// let repo = CatalogRepository::in_memory();
/// let worker = OutboxWorker::new(repo.clone(), InMemoryQueue::new());
/// let thread = OutboxWorkerThread::spawn(worker, &PublisherConfig::default())?;
///
/// let catalog = Catalog::new(repo).with_notifier(thread.notifier());
/// catalog.create(ItemInput::new("Sword", "Sharp", 10.0))?;
///
/// let stats = thread.stop();
/// ```
pub struct OutboxWorkerThread {
    tx: Sender<Signal>,
    handle: Option<JoinHandle<WorkerStats>>,
}

impl OutboxWorkerThread {
    /// Start the thread. Fails only if the OS refuses to create it.
    pub fn spawn<S, P>(worker: OutboxWorker<S, P>, config: &PublisherConfig) -> io::Result<Self>
    where
        S: OutboxLog + Send + 'static,
        P: Publisher + 'static,
    {
        let (tx, rx) = channel();
        let poll_interval = config.poll_interval();
        let backoff = Backoff::new(config.initial_backoff(), config.max_backoff());

        let handle = thread::Builder::new()
            .name(format!("outbox-{}", worker.worker_id()))
            .spawn(move || run(worker, rx, poll_interval, backoff))?;

        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// A handle for waking the thread after a commit.
    pub fn notifier(&self) -> Notifier {
        Notifier {
            tx: self.tx.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signal the worker to stop and wait for it to finish.
    /// Returns the worker statistics.
    pub fn stop(mut self) -> WorkerStats {
        let _ = self.tx.send(Signal::Stop);
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => WorkerStats::default(),
        }
    }

    /// Signal the worker to stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.tx.send(Signal::Stop);
    }
}

impl Drop for OutboxWorkerThread {
    fn drop(&mut self) {
        let _ = self.tx.send(Signal::Stop);
    }
}

fn run<S, P>(
    worker: OutboxWorker<S, P>,
    rx: Receiver<Signal>,
    poll_interval: Duration,
    mut backoff: Backoff,
) -> WorkerStats
where
    S: OutboxLog,
    P: Publisher,
{
    let mut stats = WorkerStats::default();
    info!(worker_id = worker.worker_id(), "outbox worker started");

    loop {
        stats.polls += 1;

        let keep_running = match worker.drain_once() {
            Ok(result) => {
                stats.delivered += result.delivered;
                stats.failed += result.failed;
                stats.deferred += result.deferred;

                if result.failed > 0 {
                    let delay = backoff.next_delay();
                    warn!(
                        failed = result.failed,
                        attempt = backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "bus unavailable, backing off"
                    );
                    sleep_unless_stopped(&rx, delay)
                } else {
                    backoff.reset();
                    if result.claimed >= worker.batch_size() {
                        // More may be waiting; drain again right away.
                        !stop_requested(&rx)
                    } else {
                        wait_for_wake(&rx, poll_interval)
                    }
                }
            }
            Err(err) => {
                stats.store_errors += 1;
                let delay = backoff.next_delay();
                warn!(error = %err, delay_ms = delay.as_millis() as u64, "outbox store error");
                sleep_unless_stopped(&rx, delay)
            }
        };

        if !keep_running {
            break;
        }
    }

    info!(
        worker_id = worker.worker_id(),
        delivered = stats.delivered,
        failed = stats.failed,
        "outbox worker stopped"
    );
    stats
}

/// Wait up to `timeout` or until woken. Returns `false` once told to stop.
fn wait_for_wake(rx: &Receiver<Signal>, timeout: Duration) -> bool {
    match rx.recv_timeout(timeout) {
        Ok(Signal::Wake) => !stop_requested(rx),
        Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => false,
        Err(RecvTimeoutError::Timeout) => true,
    }
}

/// Wait the full `delay`, ignoring wakes. Returns `false` once told to stop.
fn sleep_unless_stopped(rx: &Receiver<Signal>, delay: Duration) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(Signal::Wake) => continue,
            Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => return false,
            Err(RecvTimeoutError::Timeout) => return true,
        }
    }
}

/// Drain queued wakes, reporting whether a stop is among them.
fn stop_requested(rx: &Receiver<Signal>) -> bool {
    loop {
        match rx.try_recv() {
            Ok(Signal::Wake) => continue,
            Ok(Signal::Stop) | Err(TryRecvError::Disconnected) => return true,
            Err(TryRecvError::Empty) => return false,
        }
    }
}
