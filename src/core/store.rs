use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use hashbrown::HashMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    item::{Item, ItemDraft},
    op::{Op, StoredOp},
    schedule::{
        ContestState, EntryDraft, ScheduleEntry, ScheduleView, ScheduledItem, default_start,
        serve_order,
    },
    snapshot::{ScheduleSnapshot, SnapshotMeta, SnapshotPayload},
    types::{EntryId, ItemId, KindFilter, OpSeq, SnapshotId, Timestamp},
};

/// Caller-facing failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Duplicate unique key.
    Conflict,
    /// Referenced id is absent.
    NotFound,
    /// Schedule write names an unknown item.
    InvalidReference,
    /// Malformed input.
    Validation,
    /// Stored data could not be interpreted.
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("item named {0:?} already exists")]
    Conflict(String),
    #[error("item {0} not found")]
    MissingItem(ItemId),
    #[error("snapshot {0} not found")]
    MissingSnapshot(SnapshotId),
    #[error("unknown item {0}")]
    InvalidReference(ItemId),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("snapshot {id} has an unreadable payload: {reason}")]
    CorruptPayload { id: SnapshotId, reason: String },
    #[error("snapshot payload encode failed: {0}")]
    Encode(String),
    #[error("inconsistent store state: {0}")]
    Inconsistent(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::MissingItem(_) | Self::MissingSnapshot(_) => ErrorKind::NotFound,
            Self::InvalidReference(_) => ErrorKind::InvalidReference,
            Self::Validation(_) => ErrorKind::Validation,
            Self::CorruptPayload { .. } | Self::Encode(_) | Self::Inconsistent(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Full store contents, used to rebuild a store from persisted tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreImageV1 {
    pub next_op_seq: OpSeq,
    pub items: Vec<Item>,
    /// Schedule rows in insertion order.
    pub entries: Vec<ScheduleEntry>,
    pub contest: Option<ContestState>,
    /// Snapshots in save order.
    pub snapshots: Vec<ScheduleSnapshot>,
}

/// Authoritative catalog, schedule table, contest clock, and snapshot store.
///
/// Every mutating method validates its input completely before touching any
/// state, then applies exactly one [`Op`]. A failed call leaves the store
/// unchanged and journals nothing.
#[derive(Debug, Default)]
pub struct ScheduleStore {
    items: HashMap<ItemId, Item>,
    by_name: HashMap<String, ItemId>,
    entries: Vec<ScheduleEntry>,
    contest: Option<ContestState>,
    snapshots: Vec<ScheduleSnapshot>,
    snapshot_pos: HashMap<SnapshotId, usize>,
    pending_ops: Vec<StoredOp>,
    next_op_seq: OpSeq,
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self {
            next_op_seq: 1,
            ..Self::default()
        }
    }

    pub fn from_image(image: StoreImageV1) -> Result<Self, StoreError> {
        let mut store = Self {
            next_op_seq: image.next_op_seq.max(1),
            contest: image.contest,
            ..Self::default()
        };

        for item in image.items {
            if store.by_name.contains_key(&item.name) {
                return Err(StoreError::Inconsistent(format!(
                    "duplicate item name {:?}",
                    item.name
                )));
            }
            store.by_name.insert(item.name.clone(), item.id.clone());
            store.items.insert(item.id.clone(), item);
        }

        if let Some(orphan) = image
            .entries
            .iter()
            .find(|e| !store.items.contains_key(&e.item_id))
        {
            return Err(StoreError::Inconsistent(format!(
                "entry {} references missing item {}",
                orphan.id, orphan.item_id
            )));
        }
        store.entries = image.entries;

        for snapshot in image.snapshots {
            store
                .snapshot_pos
                .insert(snapshot.id().clone(), store.snapshots.len());
            store.snapshots.push(snapshot);
        }

        Ok(store)
    }

    pub fn export_image(&self) -> StoreImageV1 {
        let mut items: Vec<Item> = self.items.values().cloned().collect();
        items.sort_by(|a, b| a.name.cmp(&b.name));
        StoreImageV1 {
            next_op_seq: self.next_op_seq,
            items,
            entries: self.entries.clone(),
            contest: self.contest,
            snapshots: self.snapshots.clone(),
        }
    }

    // ---- item catalog ----

    /// Items matching `filter`, ordered by name.
    pub fn list_items(&self, filter: KindFilter) -> Vec<&Item> {
        let mut out: Vec<&Item> = self
            .items
            .values()
            .filter(|item| filter.matches(item.kind))
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn list_items_cloned(&self, filter: KindFilter) -> Vec<Item> {
        self.list_items(filter).into_iter().cloned().collect()
    }

    pub fn item(&self, id: &ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn item_by_name(&self, name: &str) -> Option<&Item> {
        self.by_name.get(name).and_then(|id| self.items.get(id))
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn create_item(&mut self, draft: ItemDraft) -> Result<(Item, StoredOp), StoreError> {
        let duration_ms = draft.validate().map_err(StoreError::Validation)?;
        if self.by_name.contains_key(&draft.name) {
            return Err(StoreError::Conflict(draft.name));
        }

        let now = Utc::now();
        let item = Item {
            id: ItemId::generate(),
            name: draft.name,
            duration_ms,
            kind: draft.kind,
            created_at: now,
            updated_at: now,
        };
        let stored = self.commit(Op::PutItem { item: item.clone() })?;
        Ok((item, stored))
    }

    pub fn update_item(
        &mut self,
        id: &ItemId,
        draft: ItemDraft,
    ) -> Result<(Item, StoredOp), StoreError> {
        let existing = self
            .items
            .get(id)
            .ok_or_else(|| StoreError::MissingItem(id.clone()))?;
        let duration_ms = draft.validate().map_err(StoreError::Validation)?;
        if let Some(holder) = self.by_name.get(&draft.name) {
            if holder != id {
                return Err(StoreError::Conflict(draft.name));
            }
        }

        let item = Item {
            id: id.clone(),
            name: draft.name,
            duration_ms,
            kind: draft.kind,
            created_at: existing.created_at,
            updated_at: Utc::now(),
        };
        let stored = self.commit(Op::PutItem { item: item.clone() })?;
        Ok((item, stored))
    }

    /// Media-inventory entry point: creates the item, or overwrites duration
    /// and kind of the item that already holds `draft.name`.
    pub fn upsert_item(&mut self, draft: ItemDraft) -> Result<(Item, StoredOp), StoreError> {
        let duration_ms = draft.validate().map_err(StoreError::Validation)?;
        let Some(existing) = self.item_by_name(&draft.name) else {
            return self.create_item(draft);
        };

        let item = Item {
            duration_ms,
            kind: draft.kind,
            updated_at: Utc::now(),
            ..existing.clone()
        };
        let stored = self.commit(Op::PutItem { item: item.clone() })?;
        Ok((item, stored))
    }

    /// Deletes an item and the schedule entries that reference it. Returns
    /// the number of entries removed with it.
    pub fn delete_item(&mut self, id: &ItemId) -> Result<(usize, StoredOp), StoreError> {
        if !self.items.contains_key(id) {
            return Err(StoreError::MissingItem(id.clone()));
        }
        let dependents = self.entries.iter().filter(|e| &e.item_id == id).count();
        let stored = self.commit(Op::DeleteItem { id: id.clone() })?;
        Ok((dependents, stored))
    }

    // ---- schedule table ----

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// Schedule joined with items, in serve order, plus the contest clock.
    pub fn schedule(&self) -> ScheduleView {
        let schedule = serve_order(&self.entries)
            .into_iter()
            .filter_map(|idx| {
                let entry = &self.entries[idx];
                self.items.get(&entry.item_id).map(|item| ScheduledItem {
                    id: entry.id.clone(),
                    start_timestamp: entry.start_timestamp,
                    item: item.clone(),
                })
            })
            .collect();

        ScheduleView {
            contest_timestamp: self.contest_start(),
            schedule,
        }
    }

    /// Replaces the whole table. Every item id is resolved before anything
    /// changes; the first unknown id aborts the call.
    pub fn replace_schedule(
        &mut self,
        drafts: Vec<EntryDraft>,
    ) -> Result<(ScheduleView, StoredOp), StoreError> {
        if let Some(unknown) = drafts.iter().find(|d| !self.items.contains_key(&d.item_id)) {
            return Err(StoreError::InvalidReference(unknown.item_id.clone()));
        }

        let entries = drafts
            .into_iter()
            .map(|d| ScheduleEntry {
                id: EntryId::generate(),
                start_timestamp: d.start_timestamp,
                item_id: d.item_id,
            })
            .collect();
        let stored = self.commit(Op::ReplaceSchedule { entries })?;
        Ok((self.schedule(), stored))
    }

    /// Appends one placement. Without `start`, the entry lands five minutes
    /// from now on the contest's minute grid.
    pub fn add_entry(
        &mut self,
        item_id: &ItemId,
        start: Option<Timestamp>,
    ) -> Result<(ScheduleView, StoredOp), StoreError> {
        if !self.items.contains_key(item_id) {
            return Err(StoreError::InvalidReference(item_id.clone()));
        }
        let start_timestamp =
            start.unwrap_or_else(|| default_start(now_ms() as Timestamp, self.contest_start()));

        let mut entries = self.entries.clone();
        entries.push(ScheduleEntry {
            id: EntryId::generate(),
            start_timestamp,
            item_id: item_id.clone(),
        });
        let stored = self.commit(Op::ReplaceSchedule { entries })?;
        Ok((self.schedule(), stored))
    }

    /// Drops one entry. An unknown id leaves the table as it is and journals
    /// nothing.
    pub fn remove_entry(
        &mut self,
        entry_id: &EntryId,
    ) -> Result<(ScheduleView, Option<StoredOp>), StoreError> {
        let Some(pos) = self.entries.iter().position(|e| &e.id == entry_id) else {
            return Ok((self.schedule(), None));
        };

        let mut entries = self.entries.clone();
        entries.remove(pos);
        let stored = self.commit(Op::ReplaceSchedule { entries })?;
        Ok((self.schedule(), Some(stored)))
    }

    /// Moves one entry to `start`. An unknown id leaves the table as it is.
    pub fn reschedule_entry(
        &mut self,
        entry_id: &EntryId,
        start: Timestamp,
    ) -> Result<(ScheduleView, Option<StoredOp>), StoreError> {
        let Some(pos) = self.entries.iter().position(|e| &e.id == entry_id) else {
            return Ok((self.schedule(), None));
        };

        let mut entries = self.entries.clone();
        entries[pos].start_timestamp = start;
        let stored = self.commit(Op::ReplaceSchedule { entries })?;
        Ok((self.schedule(), Some(stored)))
    }

    // ---- contest clock ----

    pub fn contest_start(&self) -> Option<Timestamp> {
        self.contest.and_then(|c| c.start_timestamp)
    }

    pub fn contest_state(&self) -> Option<ContestState> {
        self.contest
    }

    /// Sets (or with `None`, clears) the contest anchor. Entry timestamps are
    /// not touched.
    pub fn set_contest_start(
        &mut self,
        start_timestamp: Option<Timestamp>,
    ) -> Result<(ScheduleView, StoredOp), StoreError> {
        let stored = self.commit(Op::SetContestStart { start_timestamp })?;
        Ok((self.schedule(), stored))
    }

    // ---- snapshot store ----

    /// Captures the current schedule and clock. An unset clock is saved as 0.
    pub fn save_snapshot(
        &mut self,
        label: impl Into<String>,
    ) -> Result<(SnapshotMeta, StoredOp), StoreError> {
        let ordered = serve_order(&self.entries)
            .into_iter()
            .map(|idx| &self.entries[idx]);
        let payload =
            SnapshotPayload::capture(ordered).map_err(|e| StoreError::Encode(e.to_string()))?;

        let meta = SnapshotMeta {
            id: SnapshotId::generate(),
            label: label.into(),
            created_at: Utc::now(),
            start_timestamp: self.contest_start().unwrap_or(0),
        };
        let snapshot = ScheduleSnapshot::new(meta.clone(), payload);
        let stored = self.commit(Op::SaveSnapshot { snapshot })?;
        Ok((meta, stored))
    }

    /// Snapshot metadata, most recent first.
    pub fn list_snapshots(&self) -> Vec<SnapshotMeta> {
        let mut out: Vec<SnapshotMeta> = self
            .snapshots
            .iter()
            .rev()
            .map(|s| s.meta().clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    pub fn snapshot(&self, id: &SnapshotId) -> Option<&ScheduleSnapshot> {
        self.snapshot_pos.get(id).map(|pos| &self.snapshots[*pos])
    }

    /// Overwrites schedule and clock from a saved snapshot. Entries whose
    /// item has since been deleted are skipped, not reported as errors.
    pub fn restore_snapshot(
        &mut self,
        id: &SnapshotId,
    ) -> Result<(ScheduleView, StoredOp), StoreError> {
        let snapshot = self
            .snapshot(id)
            .ok_or_else(|| StoreError::MissingSnapshot(id.clone()))?;

        let (entries, skipped) = snapshot
            .payload()
            .restore_entries(|item_id| self.items.contains_key(item_id))
            .map_err(|reason| StoreError::CorruptPayload {
                id: id.clone(),
                reason,
            })?;
        if skipped > 0 {
            warn!(
                "restore of snapshot {id} skipped {skipped} entries with deleted items"
            );
        }

        let start_timestamp = snapshot.start_timestamp();
        let stored = self.commit(Op::RestoreSnapshot {
            snapshot_id: id.clone(),
            entries,
            start_timestamp,
        })?;
        Ok((self.schedule(), stored))
    }

    // ---- journal ----

    /// Applies an op read back from the journal, keeping its sequence.
    pub fn apply_replayed_op(&mut self, stored: StoredOp) -> Result<(), StoreError> {
        self.apply(stored.op)?;
        self.bump_next_seq_from(stored.seq);
        Ok(())
    }

    pub fn drain_pending_ops(&mut self) -> Vec<StoredOp> {
        std::mem::take(&mut self.pending_ops)
    }

    pub fn latest_op_seq(&self) -> OpSeq {
        self.next_op_seq.saturating_sub(1)
    }

    fn commit(&mut self, op: Op) -> Result<StoredOp, StoreError> {
        self.apply(op.clone())?;
        let seq = self.take_next_op_seq();
        let stored = StoredOp {
            seq,
            ts_ms: now_ms(),
            op,
        };
        debug!("applied op seq={} kind={}", stored.seq, stored.op.kind());
        self.pending_ops.push(stored.clone());
        Ok(stored)
    }

    fn apply(&mut self, op: Op) -> Result<(), StoreError> {
        match op {
            Op::PutItem { item } => {
                if let Some(prev) = self.items.get(&item.id) {
                    self.by_name.remove(&prev.name);
                }
                self.by_name.insert(item.name.clone(), item.id.clone());
                self.items.insert(item.id.clone(), item);
            }
            Op::DeleteItem { id } => {
                let item = self
                    .items
                    .remove(&id)
                    .ok_or_else(|| StoreError::MissingItem(id.clone()))?;
                self.by_name.remove(&item.name);
                self.entries.retain(|e| e.item_id != id);
            }
            Op::ReplaceSchedule { entries } => {
                self.entries = entries;
            }
            Op::SetContestStart { start_timestamp } => {
                self.contest = Some(ContestState { start_timestamp });
            }
            Op::SaveSnapshot { snapshot } => {
                if self.snapshot_pos.contains_key(snapshot.id()) {
                    return Err(StoreError::Inconsistent(format!(
                        "snapshot {} saved twice",
                        snapshot.id()
                    )));
                }
                self.snapshot_pos
                    .insert(snapshot.id().clone(), self.snapshots.len());
                self.snapshots.push(snapshot);
            }
            Op::RestoreSnapshot {
                entries,
                start_timestamp,
                ..
            } => {
                self.entries = entries;
                self.contest = Some(ContestState {
                    start_timestamp: Some(start_timestamp),
                });
            }
        }
        Ok(())
    }

    fn take_next_op_seq(&mut self) -> OpSeq {
        let seq = self.next_op_seq;
        self.next_op_seq += 1;
        seq
    }

    fn bump_next_seq_from(&mut self, seq: OpSeq) {
        self.next_op_seq = self.next_op_seq.max(seq.saturating_add(1));
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
