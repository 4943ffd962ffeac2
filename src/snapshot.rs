//! Saved schedule snapshots and their opaque payload encoding.
//!
//! A snapshot payload is a denormalized copy of the schedule table at save
//! time. Outside this module it is an opaque JSON string; only
//! [`SnapshotPayload::capture`] and [`SnapshotPayload::restore_entries`] know
//! its shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    schedule::ScheduleEntry,
    types::{EntryId, ItemId, SnapshotId, Timestamp},
};

/// Version number written into every payload envelope.
pub const PAYLOAD_FORMAT_VERSION: u16 = 1;

/// One saved placement. Holds ids only, never live item references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SavedEntry {
    /// Saved entry id. Older payloads call this `id`; it may be absent.
    #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
    entry_id: Option<EntryId>,
    start_timestamp: Timestamp,
    item_id: ItemId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PayloadEnvelope {
    format_version: u16,
    entries: Vec<SavedEntry>,
}

/// Serialized, immutable entry list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotPayload(String);

impl SnapshotPayload {
    /// Encodes `entries` in the given serve order.
    pub fn capture<'a>(
        entries: impl IntoIterator<Item = &'a ScheduleEntry>,
    ) -> Result<Self, serde_json::Error> {
        let env = PayloadEnvelope {
            format_version: PAYLOAD_FORMAT_VERSION,
            entries: entries
                .into_iter()
                .map(|e| SavedEntry {
                    entry_id: Some(e.id.clone()),
                    start_timestamp: e.start_timestamp,
                    item_id: e.item_id.clone(),
                })
                .collect(),
        };
        serde_json::to_string(&env).map(Self)
    }

    /// Wraps text read back from storage without inspecting it.
    pub fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuilds schedule rows from the payload, in saved order.
    ///
    /// Entries whose item fails `item_exists` are dropped; the second value
    /// is how many were dropped. Saved entry ids are reused, missing ones are
    /// generated.
    pub fn restore_entries(
        &self,
        item_exists: impl Fn(&ItemId) -> bool,
    ) -> Result<(Vec<ScheduleEntry>, usize), String> {
        let saved = self.decode()?;
        let total = saved.len();
        let entries: Vec<ScheduleEntry> = saved
            .into_iter()
            .filter(|e| item_exists(&e.item_id))
            .map(|e| ScheduleEntry {
                id: e.entry_id.unwrap_or_else(EntryId::generate),
                start_timestamp: e.start_timestamp,
                item_id: e.item_id,
            })
            .collect();
        let skipped = total - entries.len();
        Ok((entries, skipped))
    }

    /// Number of saved entries, for diagnostics.
    pub fn entry_count(&self) -> Result<usize, String> {
        self.decode().map(|v| v.len())
    }

    fn decode(&self) -> Result<Vec<SavedEntry>, String> {
        if let Ok(env) = serde_json::from_str::<PayloadEnvelope>(&self.0) {
            if env.format_version != PAYLOAD_FORMAT_VERSION {
                return Err(format!(
                    "unsupported payload format version: {}",
                    env.format_version
                ));
            }
            return Ok(env.entries);
        }

        // Payloads written before the envelope existed are a bare array.
        serde_json::from_str::<Vec<SavedEntry>>(&self.0)
            .map_err(|e| format!("snapshot payload decode failed: {e}"))
    }
}

/// Listing view of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub id: SnapshotId,
    pub label: String,
    pub created_at: DateTime<Utc>,
    /// Contest clock value captured at save time.
    pub start_timestamp: Timestamp,
}

/// Labeled, point-in-time copy of the schedule and contest clock.
///
/// Fields are private: a snapshot is created once and only read afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    meta: SnapshotMeta,
    payload: SnapshotPayload,
}

impl ScheduleSnapshot {
    pub fn new(meta: SnapshotMeta, payload: SnapshotPayload) -> Self {
        Self { meta, payload }
    }

    pub fn id(&self) -> &SnapshotId {
        &self.meta.id
    }

    pub fn label(&self) -> &str {
        &self.meta.label
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.meta.created_at
    }

    pub fn start_timestamp(&self) -> Timestamp {
        self.meta.start_timestamp
    }

    pub fn meta(&self) -> &SnapshotMeta {
        &self.meta
    }

    pub fn payload(&self) -> &SnapshotPayload {
        &self.payload
    }
}
