use std::fs::OpenOptions;
use std::io::Write;

use catalog_outbox::bus::{InMemoryQueue, Publisher};
use catalog_outbox::outbox_worker::{EventCodec, OutboxWorker};
use catalog_outbox::store::JournalError;
use catalog_outbox::{
    Catalog, CatalogConfig, CatalogRepository, ItemInput, OutboxLog, Sequence, StoreConfig,
    StoreError,
};

use crate::support::{journal_dir, open_repo};

#[test]
fn committed_but_undelivered_entries_survive_a_crash() {
    let (_dir, path) = journal_dir();

    let sword = {
        let repo = open_repo(&path);
        let catalog = Catalog::new(repo.clone());
        let sword = catalog.create(ItemInput::new("Sword", "Sharp", 10.0)).unwrap();
        catalog
            .update(&sword.id, ItemInput::new("Sword", "Sharper", 12.0))
            .unwrap();
        // Claimed but never published: the lease dies with the process.
        repo.claim_pending("doomed", 10, std::time::Duration::from_secs(3600))
            .unwrap();
        sword
    };

    let repo = open_repo(&path);
    let catalog = Catalog::new(repo.clone());
    let restored = catalog.get_by_id(&sword.id).unwrap();
    assert_eq!(restored.description, "Sharper");
    assert_eq!(restored.created_at, sword.created_at);
    assert_eq!(repo.backlog().unwrap(), 2);

    let queue = InMemoryQueue::new();
    let result = OutboxWorker::new(repo.clone(), queue.clone())
        .drain_once()
        .unwrap();
    assert_eq!(result.delivered, 2);
    assert_eq!(queue.event_types(), vec!["ItemCreated", "ItemUpdated"]);

    // Sequences continue after the recovered ones.
    catalog.delete(&sword.id).unwrap();
    let pending = repo.peek_pending(10).unwrap();
    assert_eq!(pending[0].sequence, Sequence::new(3));
}

#[test]
fn publish_without_mark_delivered_is_redelivered() {
    let (_dir, path) = journal_dir();
    let queue = InMemoryQueue::new();

    {
        let repo = open_repo(&path);
        Catalog::new(repo.clone())
            .create(ItemInput::new("Sword", "", 1.0))
            .unwrap();
        // Published, then the process died before recording delivery.
        let entry = repo.peek_pending(1).unwrap().remove(0);
        queue.publish(EventCodec::Json.encode(&entry).unwrap()).unwrap();
    }

    let repo = open_repo(&path);
    OutboxWorker::new(repo.clone(), queue.clone())
        .drain_once()
        .unwrap();

    let events = queue.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id, events[1].id);
    assert_eq!(repo.backlog().unwrap(), 0);

    // Delivery was journaled this time.
    drop(repo);
    assert_eq!(open_repo(&path).backlog().unwrap(), 0);
}

#[test]
fn torn_final_line_is_discarded() {
    let (_dir, path) = journal_dir();

    let kept = {
        let catalog = Catalog::new(open_repo(&path));
        catalog.create(ItemInput::new("Sword", "", 1.0)).unwrap()
    };

    // A write cut short by the crash.
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(br#"{"seq":3,"ts":"2024-01-01T00:00:00Z","record":{"op":"com"#)
        .unwrap();
    drop(file);

    let repo = open_repo(&path);
    let catalog = Catalog::new(repo.clone());
    assert_eq!(catalog.list().unwrap(), vec![kept.clone()]);
    assert_eq!(repo.backlog().unwrap(), 1);

    // The journal accepts new commits after the truncation.
    let shield = catalog.create(ItemInput::new("Shield", "", 2.0)).unwrap();
    drop(catalog);
    drop(repo);
    let ids: Vec<_> = Catalog::new(open_repo(&path))
        .list()
        .unwrap()
        .into_iter()
        .map(|item| item.id)
        .collect();
    assert_eq!(ids, vec![kept.id, shield.id]);
}

#[test]
fn torn_non_ascii_tail_is_discarded() {
    let (_dir, path) = journal_dir();

    let kept = {
        let catalog = Catalog::new(open_repo(&path));
        let kept = catalog.create(ItemInput::new("Sword", "", 1.0)).unwrap();
        catalog
            .create(ItemInput::new("Rapier", "épée⚔", 3.0))
            .unwrap();
        kept
    };

    // Cut the last commit inside the three bytes of "⚔".
    let bytes = std::fs::read(&path).unwrap();
    let sword = "⚔".as_bytes();
    let at = bytes
        .windows(sword.len())
        .rposition(|window| window == sword)
        .unwrap();
    OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(at as u64 + 1)
        .unwrap();

    let repo = open_repo(&path);
    assert_eq!(Catalog::new(repo.clone()).list().unwrap(), vec![kept]);
    assert_eq!(repo.backlog().unwrap(), 1);
}

#[test]
fn damaged_line_mid_journal_refuses_to_open() {
    let (_dir, path) = journal_dir();

    {
        let catalog = Catalog::new(open_repo(&path));
        catalog.create(ItemInput::new("Sword", "", 1.0)).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"seq\":\n").unwrap();
        drop(file);
        // Later commits land after the damage.
        catalog.create(ItemInput::new("Shield", "", 2.0)).unwrap();
        catalog.create(ItemInput::new("Bow", "", 3.0)).unwrap();
    }
    let before = std::fs::read(&path).unwrap();

    let opened = CatalogRepository::open(&StoreConfig::journal(&path).with_fsync(false));
    assert!(matches!(
        opened,
        Err(StoreError::Journal(JournalError::Corrupt { .. }))
    ));
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn compaction_keeps_pending_entries_and_sequence() {
    let (_dir, path) = journal_dir();
    let repo = open_repo(&path);
    let catalog = Catalog::new(repo.clone());

    let sword = catalog.create(ItemInput::new("Sword", "", 1.0)).unwrap();
    catalog.create(ItemInput::new("Shield", "", 1.0)).unwrap();
    repo.mark_delivered(Sequence::new(1)).unwrap();
    assert_eq!(repo.compact().unwrap(), 1);
    drop(catalog);
    drop(repo);

    let repo = open_repo(&path);
    assert_eq!(repo.backlog().unwrap(), 1);
    let catalog = Catalog::new(repo.clone());
    assert_eq!(catalog.list().unwrap().len(), 2);

    catalog.delete(&sword.id).unwrap();
    let sequences: Vec<_> = repo
        .peek_pending(10)
        .unwrap()
        .into_iter()
        .map(|entry| entry.sequence.value())
        .collect();
    assert_eq!(sequences, vec![2, 3]);
}

#[test]
fn config_file_selects_the_journal() {
    let (dir, path) = journal_dir();
    let config_path = dir.path().join("catalog.json");
    std::fs::write(
        &config_path,
        serde_json::json!({
            "store": { "journal_path": path, "fsync": false },
            "publisher": { "batch_size": 10 }
        })
        .to_string(),
    )
    .unwrap();

    let config = CatalogConfig::from_file(&config_path).unwrap();
    let repo = CatalogRepository::open(&config.store).unwrap();
    Catalog::new(repo.clone())
        .create(ItemInput::new("Sword", "", 1.0))
        .unwrap();
    assert_eq!(repo.journal_path().unwrap().as_deref(), Some(path.as_path()));
    assert!(path.exists());
}
