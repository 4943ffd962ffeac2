//! Request and response bodies for the REST API.
//!
//! Items travel with an `is_video` flag and a `duration` in milliseconds;
//! the domain types use [`ItemKind`] and `duration_ms`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    item::{Item, ItemDraft},
    schedule::{ScheduleView, ScheduledItem},
    types::{EntryId, ItemId, ItemKind, Timestamp},
};

/// Body of `POST /items`, `PUT /items/{id}` and `POST /items/upsert`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemBody {
    pub name: String,
    pub duration: i64,
    #[serde(default = "default_true")]
    pub is_video: bool,
}

fn default_true() -> bool {
    true
}

impl From<ItemBody> for ItemDraft {
    fn from(body: ItemBody) -> Self {
        ItemDraft::new(body.name, body.duration, ItemKind::from_is_video(body.is_video))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDto {
    pub id: ItemId,
    pub name: String,
    pub duration: u64,
    pub is_video: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Item> for ItemDto {
    fn from(item: Item) -> Self {
        Self {
            id: item.id,
            name: item.name,
            duration: item.duration_ms,
            is_video: item.kind.is_video(),
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntryDto {
    pub id: EntryId,
    pub start_timestamp: Timestamp,
    pub item: ItemDto,
}

impl From<ScheduledItem> for ScheduleEntryDto {
    fn from(entry: ScheduledItem) -> Self {
        Self {
            id: entry.id,
            start_timestamp: entry.start_timestamp,
            item: entry.item.into(),
        }
    }
}

/// Response of every schedule-shaped endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePayload {
    pub contest_timestamp: Option<Timestamp>,
    pub schedule: Vec<ScheduleEntryDto>,
}

impl From<ScheduleView> for SchedulePayload {
    fn from(view: ScheduleView) -> Self {
        Self {
            contest_timestamp: view.contest_timestamp,
            schedule: view.schedule.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemsQuery {
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotCreate {
    pub label: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContestUpdate {
    #[serde(default)]
    pub start_timestamp: Option<Timestamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddEntryBody {
    pub item_id: ItemId,
    #[serde(default)]
    pub start_timestamp: Option<Timestamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveEntryBody {
    pub entry_id: EntryId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleBody {
    pub entry_id: EntryId,
    pub start_timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuteBody {
    pub source_name: String,
}

/// `{status}` body of the control routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn queued() -> Self {
        Self {
            status: "queued".to_string(),
        }
    }

    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}
