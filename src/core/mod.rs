//! In-memory authoritative store.

/// Catalog, schedule table, contest clock, and snapshot store.
pub mod store;
