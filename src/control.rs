//! Streaming-control collaborator seam.
//!
//! The scheduler never drives the control surface from inside a schedule
//! mutation. Commands go through [`dispatch_control`], which runs them on a
//! blocking task and only logs the outcome.

use std::sync::{Arc, Mutex};

use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("control surface unreachable: {0}")]
    Unreachable(String),
    #[error("control surface rejected command: {0}")]
    Rejected(String),
}

/// Show a media source on a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    /// Media path as seen by the streaming host.
    pub path: String,
    /// Stacking index; 0 leaves the default.
    #[serde(default)]
    pub layer: u32,
    pub scene_name: String,
    pub source_name: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// Hide the source when playback ends.
    #[serde(default = "default_true")]
    pub clear_on_media_end: bool,
}

fn default_true() -> bool {
    true
}

/// Identifies a source on a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub scene_name: String,
    pub source_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Launch(LaunchRequest),
    Remove(SourceRef),
    Mute { source_name: String },
    Unmute { source_name: String },
}

/// Driver for an external streaming-control surface.
pub trait ControlSurface: Send + Sync {
    fn launch(&self, req: &LaunchRequest) -> Result<(), ControlError>;
    fn remove(&self, source: &SourceRef) -> Result<(), ControlError>;
    fn mute(&self, source_name: &str) -> Result<(), ControlError>;
    fn unmute(&self, source_name: &str) -> Result<(), ControlError>;
    /// Confirms the surface is reachable right now.
    fn heartbeat(&self) -> Result<(), ControlError>;

    fn execute(&self, cmd: &ControlCommand) -> Result<(), ControlError> {
        match cmd {
            ControlCommand::Launch(req) => self.launch(req),
            ControlCommand::Remove(source) => self.remove(source),
            ControlCommand::Mute { source_name } => self.mute(source_name),
            ControlCommand::Unmute { source_name } => self.unmute(source_name),
        }
    }
}

/// Runs [`ControlSurface::heartbeat`] on a blocking task and waits for it.
pub async fn check_control(surface: Arc<dyn ControlSurface>) -> Result<(), ControlError> {
    tokio::task::spawn_blocking(move || surface.heartbeat())
        .await
        .map_err(|err| ControlError::Unreachable(format!("heartbeat task failed: {err}")))?
}

/// Fire-and-forget: runs `cmd` off the async executor and logs failure.
///
/// Must be called from within a tokio runtime.
pub fn dispatch_control(surface: Arc<dyn ControlSurface>, cmd: ControlCommand) {
    tokio::task::spawn_blocking(move || {
        if let Err(err) = surface.execute(&cmd) {
            warn!("control command {cmd:?} failed: {err}");
        }
    });
}

/// Surface used when no driver is configured. Logs and records commands.
#[derive(Debug, Default)]
pub struct LogOnlySurface {
    seen: Mutex<Vec<ControlCommand>>,
}

impl LogOnlySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands received so far, oldest first.
    pub fn commands(&self) -> Vec<ControlCommand> {
        self.seen.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn record(&self, cmd: ControlCommand) -> Result<(), ControlError> {
        info!("control surface (log only): {cmd:?}");
        self.seen
            .lock()
            .map_err(|_| ControlError::Unreachable("command log poisoned".to_string()))?
            .push(cmd);
        Ok(())
    }
}

impl ControlSurface for LogOnlySurface {
    fn launch(&self, req: &LaunchRequest) -> Result<(), ControlError> {
        self.record(ControlCommand::Launch(req.clone()))
    }

    fn remove(&self, source: &SourceRef) -> Result<(), ControlError> {
        self.record(ControlCommand::Remove(source.clone()))
    }

    fn mute(&self, source_name: &str) -> Result<(), ControlError> {
        self.record(ControlCommand::Mute {
            source_name: source_name.to_string(),
        })
    }

    fn unmute(&self, source_name: &str) -> Result<(), ControlError> {
        self.record(ControlCommand::Unmute {
            source_name: source_name.to_string(),
        })
    }

    fn heartbeat(&self) -> Result<(), ControlError> {
        info!("control surface (log only): heartbeat");
        Ok(())
    }
}
