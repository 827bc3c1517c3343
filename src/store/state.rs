use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::item::{Item, ItemEvent, ItemId};

use super::journal::{Change, JournalRecord};
use super::{OutboxEntry, ProducerId, Sequence, StoreError, Transaction};

/// In-memory image of the items and the outbox, rebuilt from the journal on open.
pub(crate) struct State {
    pub producer: ProducerId,
    pub items: HashMap<ItemId, Item>,
    pub outbox: BTreeMap<Sequence, OutboxEntry>,
    pub next_sequence: Sequence,
    pub delivered_since_compaction: u64,
}

impl State {
    pub fn new(producer: ProducerId) -> Self {
        State {
            producer,
            items: HashMap::new(),
            outbox: BTreeMap::new(),
            next_sequence: Sequence::FIRST,
            delivered_since_compaction: 0,
        }
    }

    /// Replay one journal record.
    pub fn apply(&mut self, record: JournalRecord) {
        match record {
            JournalRecord::Genesis {
                producer,
                next_sequence,
            } => {
                self.producer = producer;
                self.next_sequence = self.next_sequence.max(next_sequence);
            }
            JournalRecord::Commit { changes } => {
                for change in changes {
                    self.apply_change(change);
                }
            }
            JournalRecord::Delivered { sequence, at } => match self.outbox.get_mut(&sequence) {
                Some(entry) => {
                    entry.deliver(at);
                    self.delivered_since_compaction += 1;
                }
                None => warn!(%sequence, "journal marks unknown outbox entry delivered"),
            },
        }
    }

    fn apply_change(&mut self, change: Change) {
        match change {
            Change::PutItem { item } => {
                self.items.insert(item.id, item);
            }
            Change::RemoveItem { id } => {
                self.items.remove(&id);
            }
            Change::Append { entry } => {
                self.next_sequence = self.next_sequence.max(entry.sequence.next());
                self.outbox.insert(entry.sequence, entry);
            }
        }
    }

    pub fn items_sorted(&self) -> Vec<Item> {
        let mut items: Vec<Item> = self.items.values().cloned().collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        items
    }

    pub fn pending(&self, limit: usize) -> Vec<OutboxEntry> {
        self.outbox
            .values()
            .filter(|entry| entry.is_pending())
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn backlog(&self) -> usize {
        self.outbox.values().filter(|entry| entry.is_pending()).count()
    }

    /// Claim up to `limit` pending entries, oldest first.
    ///
    /// An item whose oldest undelivered entry is leased by a live claim is
    /// skipped entirely, so its later entries cannot overtake it.
    pub fn claim(
        &mut self,
        worker_id: &str,
        limit: usize,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Vec<OutboxEntry> {
        let mut blocked: HashSet<ItemId> = HashSet::new();
        let mut claimed = Vec::new();

        for entry in self.outbox.values_mut() {
            if claimed.len() >= limit {
                break;
            }
            if entry.is_delivered() || blocked.contains(&entry.item_id) {
                continue;
            }
            if entry.is_claimed(now) {
                blocked.insert(entry.item_id);
                continue;
            }

            entry.claim(worker_id, expires_at);
            claimed.push(entry.clone());
        }

        claimed
    }

    /// Drop delivered entries, returning how many were removed.
    pub fn prune_delivered(&mut self) -> usize {
        let before = self.outbox.len();
        self.outbox.retain(|_, entry| !entry.is_delivered());
        self.delivered_since_compaction = 0;
        before - self.outbox.len()
    }

    /// Records that rebuild this state from scratch.
    pub fn snapshot_records(&self) -> Vec<JournalRecord> {
        let mut changes: Vec<Change> = self
            .items_sorted()
            .into_iter()
            .map(|item| Change::PutItem { item })
            .collect();
        changes.extend(self.outbox.values().map(|entry| {
            let mut entry = entry.clone();
            entry.release(None);
            Change::Append { entry }
        }));

        let mut records = vec![JournalRecord::Genesis {
            producer: self.producer,
            next_sequence: self.next_sequence,
        }];
        if !changes.is_empty() {
            records.push(JournalRecord::Commit { changes });
        }
        records
    }
}

enum Undo {
    Item { id: ItemId, previous: Option<Item> },
    Append { sequence: Sequence, previous_next: Sequence },
}

/// Transaction applied directly to [`State`] with an undo log.
///
/// Dropping it without calling [`StateTransaction::commit`] restores every
/// item and outbox entry it touched.
pub(crate) struct StateTransaction<'a> {
    state: &'a mut State,
    changes: Vec<Change>,
    undo: Vec<Undo>,
    committed: bool,
}

impl<'a> StateTransaction<'a> {
    pub fn new(state: &'a mut State) -> Self {
        StateTransaction {
            state,
            changes: Vec::new(),
            undo: Vec::new(),
            committed: false,
        }
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn commit(mut self) {
        self.committed = true;
    }

    fn rollback(&mut self) {
        while let Some(undo) = self.undo.pop() {
            match undo {
                Undo::Item { id, previous } => match previous {
                    Some(item) => {
                        self.state.items.insert(id, item);
                    }
                    None => {
                        self.state.items.remove(&id);
                    }
                },
                Undo::Append {
                    sequence,
                    previous_next,
                } => {
                    self.state.outbox.remove(&sequence);
                    self.state.next_sequence = previous_next;
                }
            }
        }
        self.changes.clear();
    }
}

impl Drop for StateTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

impl Transaction for StateTransaction<'_> {
    fn get(&self, id: &ItemId) -> Option<&Item> {
        self.state.items.get(id)
    }

    fn create(&mut self, mut item: Item) -> Result<ItemId, StoreError> {
        if item.id.is_nil() {
            item.id = ItemId::new();
        }
        let id = item.id;
        if self.state.items.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }

        self.state.items.insert(id, item.clone());
        self.undo.push(Undo::Item { id, previous: None });
        self.changes.push(Change::PutItem { item });
        Ok(id)
    }

    fn update(&mut self, id: &ItemId, mut item: Item) -> Result<(), StoreError> {
        if !self.state.items.contains_key(id) {
            return Err(StoreError::ItemNotFound(*id));
        }
        item.id = *id;

        let previous = self.state.items.insert(*id, item.clone());
        self.undo.push(Undo::Item { id: *id, previous });
        self.changes.push(Change::PutItem { item });
        Ok(())
    }

    fn remove(&mut self, id: &ItemId) -> Result<Item, StoreError> {
        let removed = self
            .state
            .items
            .remove(id)
            .ok_or(StoreError::ItemNotFound(*id))?;

        self.undo.push(Undo::Item {
            id: *id,
            previous: Some(removed.clone()),
        });
        self.changes.push(Change::RemoveItem { id: *id });
        Ok(removed)
    }

    fn append(&mut self, event: ItemEvent) -> Sequence {
        let sequence = self.state.next_sequence;
        let entry = OutboxEntry::new(self.state.producer, sequence, event);

        self.state.next_sequence = sequence.next();
        self.state.outbox.insert(sequence, entry.clone());
        self.undo.push(Undo::Append {
            sequence,
            previous_next: sequence,
        });
        self.changes.push(Change::Append { entry });
        sequence
    }
}
