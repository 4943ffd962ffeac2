//! Shared primitive IDs, timestamps, and item kinds.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Absolute instant in milliseconds. Schedule entries and the contest clock
/// use the same scale.
pub type Timestamp = i64;
/// Monotonic operation sequence number.
pub type OpSeq = u64;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Borrows the identifier text.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(
    /// Catalog item identifier.
    ItemId
);
opaque_id!(
    /// Schedule entry identifier.
    EntryId
);
opaque_id!(
    /// Saved snapshot identifier.
    SnapshotId
);

/// What an item is when it airs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// Pre-recorded video file.
    Video,
    /// Any other timed activity.
    Activity,
}

impl ItemKind {
    /// Maps the wire-level `is_video` flag onto a kind.
    pub fn from_is_video(is_video: bool) -> Self {
        if is_video { Self::Video } else { Self::Activity }
    }

    pub fn is_video(self) -> bool {
        matches!(self, Self::Video)
    }
}

/// Catalog listing filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KindFilter {
    #[default]
    All,
    Video,
    Activity,
}

impl KindFilter {
    pub fn matches(self, kind: ItemKind) -> bool {
        match self {
            Self::All => true,
            Self::Video => kind == ItemKind::Video,
            Self::Activity => kind == ItemKind::Activity,
        }
    }
}

impl FromStr for KindFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "all" => Ok(Self::All),
            "video" => Ok(Self::Video),
            "activity" => Ok(Self::Activity),
            other => Err(format!("unknown item kind filter: {other}")),
        }
    }
}
