//! Schedule table rows and the joined view served to clients.

use serde::{Deserialize, Serialize};

use crate::{
    item::Item,
    types::{EntryId, ItemId, Timestamp},
};

/// Lead time applied when an entry is added without an explicit start.
pub const DEFAULT_ADD_LEAD_MS: Timestamp = 5 * 60 * 1000;
/// Grid that defaulted starts are snapped onto, relative to contest start.
pub const START_GRID_MS: Timestamp = 60 * 1000;

/// One placement of one item at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Entry identifier.
    pub id: EntryId,
    /// Absolute start time.
    pub start_timestamp: Timestamp,
    /// Referenced catalog item.
    pub item_id: ItemId,
}

/// Client-submitted entry for a full schedule replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDraft {
    /// Absolute start time.
    pub start_timestamp: Timestamp,
    /// Item to place.
    pub item_id: ItemId,
}

impl EntryDraft {
    pub fn new(start_timestamp: Timestamp, item_id: impl Into<ItemId>) -> Self {
        Self {
            start_timestamp,
            item_id: item_id.into(),
        }
    }
}

/// Entry joined with its live item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledItem {
    pub id: EntryId,
    pub start_timestamp: Timestamp,
    pub item: Item,
}

/// Full schedule as served: contest anchor plus ordered entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleView {
    /// Contest start, `None` until first set.
    pub contest_timestamp: Option<Timestamp>,
    /// Entries ascending by start; ties keep insertion order.
    pub schedule: Vec<ScheduledItem>,
}

impl ScheduleView {
    pub fn start_timestamps(&self) -> Vec<Timestamp> {
        self.schedule.iter().map(|e| e.start_timestamp).collect()
    }

    pub fn item_ids(&self) -> Vec<ItemId> {
        self.schedule.iter().map(|e| e.item.id.clone()).collect()
    }
}

/// Returns indices of `entries` in serve order.
///
/// `sort_by_key` is stable, so equal starts keep their relative position.
pub fn serve_order(entries: &[ScheduleEntry]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..entries.len()).collect();
    idx.sort_by_key(|i| entries[*i].start_timestamp);
    idx
}

/// Start used when an entry is added without one: `now` plus the lead time,
/// pulled back onto the minute grid anchored at `contest_start`.
pub fn default_start(now_ms: Timestamp, contest_start: Option<Timestamp>) -> Timestamp {
    let start = now_ms.saturating_add(DEFAULT_ADD_LEAD_MS);
    let anchor = contest_start.unwrap_or(0);
    let offset = (start.wrapping_sub(anchor)).unsigned_abs() % START_GRID_MS as u64;
    start - offset as Timestamp
}

/// Fixed key of the contest clock singleton row.
pub const CONTEST_STATE_ID: i64 = 1;

/// Contest clock singleton. Absent until the first write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContestState {
    /// Absolute contest start, `None` when cleared.
    pub start_timestamp: Option<Timestamp>,
}
