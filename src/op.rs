//! Mutation operation model and persistence wrappers.

use serde::{Deserialize, Serialize};

use crate::{
    item::Item,
    schedule::ScheduleEntry,
    snapshot::ScheduleSnapshot,
    types::{ItemId, OpSeq, SnapshotId, Timestamp},
};

/// Version number for serialized [`StoredOpEnvelope`] payloads.
pub const OP_FORMAT_VERSION: u16 = 1;

/// Fully materialized mutation. Replaying an op never consults the clock or
/// generates ids, so a sink can apply it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// Create or overwrite an item by id.
    PutItem {
        /// Item as it exists after the write.
        item: Item,
    },
    /// Delete an item and every schedule entry that references it.
    DeleteItem {
        /// Deleted item.
        id: ItemId,
    },
    /// Discard the schedule table and install `entries` in order.
    ReplaceSchedule {
        /// New table contents in insertion order.
        entries: Vec<ScheduleEntry>,
    },
    /// Set the contest clock singleton.
    SetContestStart {
        /// New anchor; `None` clears it.
        start_timestamp: Option<Timestamp>,
    },
    /// Persist a new snapshot.
    SaveSnapshot {
        /// Saved snapshot.
        snapshot: ScheduleSnapshot,
    },
    /// Overwrite schedule and clock from a snapshot.
    RestoreSnapshot {
        /// Source snapshot.
        snapshot_id: SnapshotId,
        /// Surviving entries after dangling references were skipped.
        entries: Vec<ScheduleEntry>,
        /// Clock value written.
        start_timestamp: Timestamp,
    },
}

impl Op {
    /// Short tag used for logging and the journal index column.
    pub fn kind(&self) -> &'static str {
        match self {
            Op::PutItem { .. } => "put_item",
            Op::DeleteItem { .. } => "delete_item",
            Op::ReplaceSchedule { .. } => "replace_schedule",
            Op::SetContestStart { .. } => "set_contest_start",
            Op::SaveSnapshot { .. } => "save_snapshot",
            Op::RestoreSnapshot { .. } => "restore_snapshot",
        }
    }
}

/// Operation plus journal metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOp {
    /// Monotonic operation sequence.
    pub seq: OpSeq,
    /// Operation timestamp in milliseconds.
    pub ts_ms: u64,
    /// Operation body.
    pub op: Op,
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredOpEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped operation.
    pub stored: StoredOp,
}

impl StoredOpEnvelope {
    /// Constructs an envelope using [`OP_FORMAT_VERSION`].
    pub fn new(stored: StoredOp) -> Self {
        Self {
            format_version: OP_FORMAT_VERSION,
            stored,
        }
    }
}
