//! Session aggregate: per-worker state plus the review, decision and
//! recovery logs of one end-to-end run.
//!
//! A [`SessionState`] is owned by its coordinator and only mutated inside
//! the polling loop. External readers see a [`SessionSnapshot`] published
//! behind a read/write lock.

pub mod store;
pub mod summary;

pub use store::SessionStore;
pub use summary::SessionSummary;

use crate::event::{Event, Role};
use crate::recovery::RecoveryAction;
use crate::review::{OrchestratorDecision, PeerReview};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Lifecycle status of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Idle,
    Running,
    Blocked,
    Recovering,
    Completed,
    Failed,
}

impl Status {
    /// `completed` and `failed` are terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Running => "running",
            Status::Blocked => "blocked",
            Status::Recovering => "recovering",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracked state of one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerState {
    pub role: Role,
    pub status: Status,
    /// Task description the worker was launched with
    pub task: Option<String>,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_event: Option<Event>,
    /// Never decreases within a session
    pub progress: u8,
    /// Never decreases within a session
    pub error_count: u32,
}

impl WorkerState {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            status: Status::Idle,
            task: None,
            pid: None,
            started_at: None,
            last_event: None,
            progress: 0,
            error_count: 0,
        }
    }
}

/// Aggregate root for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub user_prompt: String,
    pub workspace_dir: PathBuf,
    pub target_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    /// One entry per role, created at session start and never removed
    pub workers: BTreeMap<Role, WorkerState>,
    pub reviews: Vec<PeerReview>,
    pub decisions: Vec<OrchestratorDecision>,
    pub recoveries: Vec<RecoveryAction>,
    pub complete: bool,
}

impl SessionState {
    pub fn new(
        session_id: impl Into<String>,
        user_prompt: impl Into<String>,
        workspace_dir: PathBuf,
        target_dir: PathBuf,
    ) -> Self {
        let workers = Role::ALL
            .iter()
            .map(|role| (*role, WorkerState::new(*role)))
            .collect();
        Self {
            session_id: session_id.into(),
            user_prompt: user_prompt.into(),
            workspace_dir,
            target_dir,
            started_at: Utc::now(),
            workers,
            reviews: Vec::new(),
            decisions: Vec::new(),
            recoveries: Vec::new(),
            complete: false,
        }
    }

    pub fn worker(&self, role: Role) -> Option<&WorkerState> {
        self.workers.get(&role)
    }

    pub fn worker_mut(&mut self, role: Role) -> Option<&mut WorkerState> {
        self.workers.get_mut(&role)
    }

    /// True when every worker has reached a terminal status.
    pub fn all_terminal(&self) -> bool {
        self.workers.values().all(|w| w.status.is_terminal())
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary::from_state(self)
    }
}

/// What external readers see: the session state plus loop control flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: SessionState,
    pub paused: bool,
    pub stopped: bool,
}

/// Generate a session id of the form `orch_<YYYYmmdd_HHMMSS>_<8 hex>`.
pub fn new_session_id() -> String {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("orch_{}_{}", stamp, &suffix[..8])
}
