//! Contest broadcast schedule: item catalog, schedule table, contest clock,
//! and restorable snapshots, behind a single-writer runtime with a SQLite
//! sink.
//!
//! # Examples
//!
//! In-memory usage with [`core::store::ScheduleStore`]:
//! ```
//! use obs_scheduler::{
//!     core::store::ScheduleStore,
//!     item::ItemDraft,
//!     schedule::EntryDraft,
//!     types::ItemKind,
//! };
//!
//! let mut store = ScheduleStore::new();
//! let (intro, _op) = store
//!     .create_item(ItemDraft::new("intro.mp4", 5000, ItemKind::Video))
//!     .expect("create");
//! let (view, _op) = store
//!     .replace_schedule(vec![EntryDraft::new(100, intro.id.clone())])
//!     .expect("replace");
//! assert_eq!(view.contest_timestamp, None);
//! assert_eq!(view.schedule[0].item.name, "intro.mp4");
//! ```
//!
//! Runtime usage with SQLite sink:
//! ```no_run
//! use obs_scheduler::{
//!     item::ItemDraft,
//!     persist::sqlite::SqliteOpSink,
//!     runtime::handle::{spawn_scheduler, RuntimeConfig},
//!     types::ItemKind,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sink = SqliteOpSink::open("data.db").expect("open sqlite");
//! let store = sink.load_store().expect("load");
//! let handle = spawn_scheduler(store, Some(Box::new(sink)), RuntimeConfig::default());
//! let item = handle
//!     .create_item(ItemDraft::new("intro.mp4", 5000, ItemKind::Video))
//!     .await
//!     .expect("create");
//! let snapshot = handle.save_snapshot("v1").await.expect("save");
//! handle.restore_snapshot(snapshot.id).await.expect("restore");
//! # let _ = item;
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```

/// Service settings.
pub mod config;
/// Streaming-control collaborator seam.
pub mod control;
/// Core in-memory store.
pub mod core;
/// REST surface.
pub mod http;
/// Catalog item records.
pub mod item;
/// Mutation op model and persistence wrapper types.
pub mod op;
/// Persistence abstraction and SQLite implementation.
pub mod persist;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Schedule rows and views.
pub mod schedule;
/// Saved schedule snapshots.
pub mod snapshot;
/// Shared primitive types and enums.
pub mod types;
