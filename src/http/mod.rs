//! REST surface over the scheduler runtime.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;

use std::sync::Arc;

pub use router::build_router;

use crate::{control::ControlSurface, runtime::handle::SchedulerHandle};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: SchedulerHandle,
    pub control: Arc<dyn ControlSurface>,
    /// Database location reported by `/health`.
    pub database: String,
}

impl AppState {
    pub fn new(
        scheduler: SchedulerHandle,
        control: Arc<dyn ControlSurface>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            scheduler,
            control,
            database: database.into(),
        }
    }
}
