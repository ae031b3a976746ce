//! Worker boundary: the capability the coordinator needs from each of the
//! three agent processes.
//!
//! [`ProcessWorker`] is the production implementation. Tests drive the
//! coordinator through a scripted double behind the same trait.

pub mod process;
pub mod profile;

pub use process::ProcessWorker;
pub use profile::RoleProfile;

use crate::errors::{IngestError, SupervisionError};
use crate::event::{Event, Role};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Launch parameters that survive a relaunch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LaunchConfig {
    /// Directories the agent must be allowed to read and write
    pub required_dirs: Vec<PathBuf>,
    /// Working directory of the spawned process
    pub working_dir: PathBuf,
    /// Skip the agent's own trusted-directory check
    pub skip_env_check: bool,
}

/// Handle returned by a successful launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerHandle {
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

/// One supervised agent.
///
/// Reads never block: both `read_new_events` and
/// `read_new_diagnostic_lines` return what is available right now.
#[async_trait]
pub trait Worker: Send {
    fn role(&self) -> Role;

    /// Start the agent with the current [`LaunchConfig`].
    async fn launch(&mut self) -> Result<WorkerHandle, SupervisionError>;

    /// Whether the agent process is still alive.
    fn is_running(&mut self) -> bool;

    /// Ask the agent to terminate, force-killing it after the grace period.
    async fn stop(&mut self) -> Result<(), SupervisionError>;

    /// Events written since the previous call.
    fn read_new_events(&mut self) -> Result<Vec<Event>, IngestError>;

    /// Diagnostic (stderr) lines written since the previous call.
    fn read_new_diagnostic_lines(&mut self) -> Vec<String>;

    fn launch_config(&self) -> &LaunchConfig;

    fn launch_config_mut(&mut self) -> &mut LaunchConfig;

    /// Stop then start again. Atomic from the supervisor's point of view.
    async fn relaunch(&mut self) -> Result<WorkerHandle, SupervisionError> {
        self.stop().await?;
        self.launch().await
    }
}
