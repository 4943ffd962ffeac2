//! Runtime event stream payloads.

use crate::types::{ItemId, OpSeq, SnapshotId, Timestamp};

/// Events emitted from the single-writer runtime loop after a mutation lands.
///
/// Control-surface drivers subscribe here instead of being called from inside
/// a schedule mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleEvent {
    /// A catalog item was created.
    ItemCreated {
        /// New item id.
        id: ItemId,
    },
    /// A catalog item was updated in place.
    ItemUpdated {
        /// Updated item id.
        id: ItemId,
    },
    /// A catalog item was deleted along with its schedule entries.
    ItemDeleted {
        /// Deleted item id.
        id: ItemId,
        /// Schedule entries removed with it.
        removed_entries: usize,
    },
    /// The schedule table was replaced.
    ScheduleReplaced {
        /// Entries now in the table.
        entries: usize,
    },
    /// The contest clock was set or cleared.
    ContestClockSet {
        /// New anchor.
        start_timestamp: Option<Timestamp>,
    },
    /// A snapshot was saved.
    SnapshotSaved {
        /// New snapshot id.
        id: SnapshotId,
    },
    /// A snapshot was restored over the live schedule.
    SnapshotRestored {
        /// Source snapshot id.
        id: SnapshotId,
        /// Entries now in the table.
        entries: usize,
    },
    /// Persistence has reached at least this op sequence.
    DurableUpTo {
        /// Highest sequence known durable.
        op_seq: OpSeq,
    },
}
