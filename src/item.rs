//! Catalog item record and write payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ItemId, ItemKind};

/// Reusable playable entry in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Stable item identifier.
    pub id: ItemId,
    /// Unique display name, usually a media path relative to the library root.
    pub name: String,
    /// Play length in milliseconds.
    pub duration_ms: u64,
    /// Video or activity.
    pub kind: ItemKind,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Create/update payload for an [`Item`].
///
/// Duration is signed; [`ItemDraft::validate`] rejects negative values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDraft {
    /// Requested name.
    pub name: String,
    /// Requested duration in milliseconds.
    pub duration_ms: i64,
    /// Requested kind.
    pub kind: ItemKind,
}

impl ItemDraft {
    pub fn new(name: impl Into<String>, duration_ms: i64, kind: ItemKind) -> Self {
        Self {
            name: name.into(),
            duration_ms,
            kind,
        }
    }

    /// Checks field constraints and returns the validated duration.
    pub fn validate(&self) -> Result<u64, String> {
        if self.name.trim().is_empty() {
            return Err("item name must not be empty".to_string());
        }
        u64::try_from(self.duration_ms)
            .map_err(|_| format!("duration must be non-negative, got {}", self.duration_ms))
    }
}
