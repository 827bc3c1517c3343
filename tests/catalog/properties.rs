use catalog_outbox::bus::InMemoryQueue;
use catalog_outbox::outbox_worker::OutboxWorker;
use catalog_outbox::{Catalog, CatalogError, CatalogRepository, ItemId, ItemInput, OutboxLog};
use proptest::prelude::*;

fn valid_input() -> impl Strategy<Value = ItemInput> {
    (
        "[A-Za-z][A-Za-z0-9 ]{0,31}",
        ".{0,64}",
        0.0f64..1_000_000.0,
    )
        .prop_map(|(name, description, price)| ItemInput::new(name, description, price))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn create_then_get_returns_the_input(input in valid_input()) {
        let catalog = Catalog::new(CatalogRepository::in_memory());
        let created = catalog.create(input.clone()).unwrap();
        let fetched = catalog.get_by_id(&created.id).unwrap();

        prop_assert_eq!(&fetched, &created);
        prop_assert_eq!(&fetched.name, &input.name);
        prop_assert_eq!(&fetched.description, &input.description);
        prop_assert_eq!(fetched.price.value(), input.price);
    }

    #[test]
    fn unknown_ids_are_not_found(input in valid_input(), seeded in 0usize..4) {
        let catalog = Catalog::new(CatalogRepository::in_memory());
        for _ in 0..seeded {
            catalog.create(input.clone()).unwrap();
        }
        let missing = ItemId::new();

        prop_assert!(matches!(catalog.get_by_id(&missing), Err(CatalogError::NotFound(_))));
        prop_assert!(matches!(catalog.update(&missing, input), Err(CatalogError::NotFound(_))));
        prop_assert!(matches!(catalog.delete(&missing), Err(CatalogError::NotFound(_))));
        prop_assert_eq!(catalog.store().backlog().unwrap(), seeded);
    }

    #[test]
    fn every_mutation_is_delivered_exactly_once(
        names in prop::collection::vec("[a-z]{1,8}", 1..12),
        delete_every in 1usize..4,
    ) {
        let repo = CatalogRepository::in_memory();
        let catalog = Catalog::new(repo.clone());
        let mut mutations = 0;
        for (i, name) in names.iter().enumerate() {
            let item = catalog.create(ItemInput::new(name.as_str(), "", 1.0)).unwrap();
            mutations += 1;
            if i % delete_every == 0 {
                catalog.delete(&item.id).unwrap();
                mutations += 1;
            }
        }

        let queue = InMemoryQueue::new();
        let worker = OutboxWorker::new(repo.clone(), queue.clone()).with_batch_size(3);
        let drained = worker.drain_all().unwrap();

        prop_assert_eq!(drained.delivered, mutations);
        prop_assert_eq!(queue.len(), mutations);
        prop_assert_eq!(repo.backlog().unwrap(), 0);
        prop_assert!(worker.drain_once().unwrap().is_idle());
    }
}
