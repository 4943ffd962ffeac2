//! Single-writer scheduler loop, its handle, and the event stream.

/// Notifications broadcast after each committed mutation.
pub mod events;
/// [`handle::SchedulerHandle`], commands, and the persistence worker.
pub mod handle;
