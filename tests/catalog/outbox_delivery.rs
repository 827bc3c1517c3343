use std::time::{Duration, Instant};

use catalog_outbox::bus::{InMemoryQueue, Publisher, Subscriber};
use catalog_outbox::outbox_worker::{DrainResult, OutboxWorker, OutboxWorkerThread};
use catalog_outbox::{
    Catalog, CatalogRepository, IdempotentConsumer, ItemEvent, ItemInput, OutboxLog,
    PublisherConfig,
};

use crate::support::SwitchablePublisher;

fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn delete_while_bus_offline_is_delivered_once_online() {
    let repo = CatalogRepository::in_memory();
    let catalog = Catalog::new(repo.clone());
    let bus = SwitchablePublisher::online();
    let worker = OutboxWorker::new(repo.clone(), bus.clone());

    let item = catalog.create(ItemInput::new("Sword", "Sharp", 10.0)).unwrap();
    worker.drain_once().unwrap();
    assert_eq!(bus.queue.len(), 1);

    bus.set_online(false);
    catalog.delete(&item.id).unwrap();
    assert!(catalog.get_by_id(&item.id).is_err());

    for _ in 0..3 {
        let pass = worker.drain_once().unwrap();
        assert_eq!(pass.failed, 1);
    }
    let pending = repo.peek_pending(10).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].event, ItemEvent::deleted(item.id));

    bus.set_online(true);
    assert_eq!(
        worker.drain_once().unwrap(),
        DrainResult {
            claimed: 1,
            delivered: 1,
            failed: 0,
            deferred: 0,
        }
    );
    assert_eq!(repo.backlog().unwrap(), 0);
    assert_eq!(bus.queue.event_types(), vec!["ItemCreated", "ItemDeleted"]);
}

#[test]
fn background_thread_retries_through_an_outage() {
    let repo = CatalogRepository::in_memory();
    let bus = SwitchablePublisher::offline();
    let config = PublisherConfig::default()
        .with_worker_id("it-worker")
        .with_poll_interval(Duration::from_millis(10))
        .with_backoff(Duration::from_millis(5), Duration::from_millis(20));
    let thread = OutboxWorkerThread::spawn(
        OutboxWorker::from_config(repo.clone(), bus.clone(), &config),
        &config,
    )
    .unwrap();
    let catalog = Catalog::new(repo.clone()).with_notifier(thread.notifier());

    let item = catalog.create(ItemInput::new("Sword", "", 1.0)).unwrap();
    catalog
        .update(&item.id, ItemInput::new("Sword", "Sharper", 2.0))
        .unwrap();

    wait_until(|| bus.attempts() >= 3);
    assert!(bus.queue.is_empty());
    assert_eq!(repo.backlog().unwrap(), 2);

    bus.set_online(true);
    wait_until(|| repo.backlog().unwrap() == 0);

    let stats = thread.stop();
    assert_eq!(stats.delivered, 2);
    assert!(stats.failed >= 1);
    assert_eq!(bus.queue.event_types(), vec!["ItemCreated", "ItemUpdated"]);
}

#[test]
fn consumer_absorbs_redelivery() {
    let repo = CatalogRepository::in_memory();
    let catalog = Catalog::new(repo.clone());
    let queue = InMemoryQueue::new();

    let item = catalog.create(ItemInput::new("Sword", "", 1.0)).unwrap();
    OutboxWorker::new(repo.clone(), queue.clone())
        .drain_once()
        .unwrap();

    // Redeliver the same message, as after a crash between publish and
    // mark_delivered.
    let duplicate = queue.events()[0].clone();
    catalog.delete(&item.id).unwrap();
    OutboxWorker::new(repo, queue.clone()).drain_once().unwrap();
    queue.publish(duplicate).unwrap();

    let subscriber = queue.new_subscriber();
    let mut effects = Vec::new();
    let mut consumer = IdempotentConsumer::new(|event| effects.push(event));
    assert_eq!(consumer.drain(&subscriber, 10).unwrap(), 3);
    assert_eq!(consumer.duplicates(), 1);
    drop(consumer);

    assert_eq!(effects.len(), 2);
    assert!(matches!(effects[0], ItemEvent::Created(_)));
    assert_eq!(effects[1], ItemEvent::deleted(item.id));
    assert!(subscriber.poll(1).unwrap().is_none());
}
