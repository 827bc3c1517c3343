use std::sync::Arc;
use std::thread;

use catalog_outbox::bus::InMemoryQueue;
use catalog_outbox::outbox_worker::{EventCodec, OutboxWorker};
use catalog_outbox::{
    Catalog, CatalogError, CatalogRepository, EventKind, ItemEvent, ItemId, ItemInput, OutboxLog,
};
use chrono::Utc;

use crate::support::FlakyStore;

#[test]
fn create_sword_publishes_created_event() {
    let repo = CatalogRepository::in_memory();
    let catalog = Catalog::new(repo.clone());

    let before = Utc::now();
    let sword = catalog
        .create(ItemInput::new("Sword", "Sharp", 10.0))
        .unwrap();
    let after = Utc::now();

    assert!(!sword.id.is_nil());
    assert_eq!(sword.name, "Sword");
    assert_eq!(sword.description, "Sharp");
    assert_eq!(sword.price.value(), 10.0);
    assert!(sword.created_at >= before && sword.created_at <= after);

    let queue = InMemoryQueue::new();
    OutboxWorker::new(repo.clone(), queue.clone())
        .drain_once()
        .unwrap();

    let message = queue.find_by_type("ItemCreated").unwrap();
    assert_eq!(message.key, sword.id.to_string());
    match EventCodec::decode(&message).unwrap() {
        ItemEvent::Created(created) => {
            assert_eq!(created.id, sword.id);
            assert_eq!(created.name, "Sword");
            assert_eq!(created.description, "Sharp");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(repo.backlog().unwrap(), 0);
}

#[test]
fn update_of_unknown_id_creates_nothing() {
    let repo = CatalogRepository::in_memory();
    let catalog = Catalog::new(repo.clone());

    let err = catalog
        .update(&ItemId::new(), ItemInput::new("Shield", "Round", 5.0))
        .unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));
    assert_eq!(err.status_code(), 404);
    assert_eq!(repo.backlog().unwrap(), 0);

    let queue = InMemoryQueue::new();
    let drained = OutboxWorker::new(repo, queue.clone()).drain_once().unwrap();
    assert!(drained.is_idle());
    assert!(queue.is_empty());
}

#[test]
fn every_mutation_has_exactly_one_entry() {
    let repo = CatalogRepository::in_memory();
    let catalog = Catalog::new(repo.clone());

    let a = catalog.create(ItemInput::new("a", "", 1.0)).unwrap();
    let b = catalog.create(ItemInput::new("b", "", 2.0)).unwrap();
    catalog.update(&a.id, ItemInput::new("a2", "", 1.5)).unwrap();
    catalog.delete(&b.id).unwrap();
    // Rejected calls leave no trace.
    let _ = catalog.create(ItemInput::new("", "", 1.0));
    let _ = catalog.delete(&b.id);

    let entries: Vec<_> = repo
        .peek_pending(100)
        .unwrap()
        .into_iter()
        .map(|entry| (entry.item_id, entry.kind, entry.sequence.value()))
        .collect();
    assert_eq!(
        entries,
        vec![
            (a.id, EventKind::Created, 1),
            (b.id, EventKind::Created, 2),
            (a.id, EventKind::Updated, 3),
            (b.id, EventKind::Deleted, 4),
        ]
    );
}

#[test]
fn store_outage_is_retryable_and_writes_nothing() {
    let store = FlakyStore::new(CatalogRepository::in_memory());
    let catalog = Catalog::new(store.clone());
    let existing = catalog.create(ItemInput::new("Sword", "", 1.0)).unwrap();

    store.set_down(true);
    let err = catalog
        .create(ItemInput::new("Shield", "", 1.0))
        .unwrap_err();
    assert!(matches!(err, CatalogError::StoreUnavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(err.status_code(), 503);
    assert!(catalog.delete(&existing.id).is_err());

    store.set_down(false);
    assert_eq!(catalog.list().unwrap(), vec![existing]);
    assert_eq!(store.inner().backlog().unwrap(), 1);
}

#[test]
fn concurrent_updates_keep_item_and_outbox_in_step() {
    let repo = CatalogRepository::in_memory();
    let catalog = Arc::new(Catalog::new(repo.clone()));
    let item = catalog.create(ItemInput::new("Counter", "", 0.0)).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let catalog = Arc::clone(&catalog);
            let id = item.id;
            thread::spawn(move || {
                for round in 0..25 {
                    let name = format!("w{worker}-r{round}");
                    catalog.update(&id, ItemInput::new(name, "", 1.0)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let pending = repo.peek_pending(1000).unwrap();
    assert_eq!(pending.len(), 1 + 8 * 25);

    // The last outbox entry describes the state that was left behind.
    let stored = catalog.get_by_id(&item.id).unwrap();
    match &pending.last().unwrap().event {
        ItemEvent::Updated(last) => assert_eq!(last.name, stored.name),
        other => panic!("unexpected event {other:?}"),
    }
}
