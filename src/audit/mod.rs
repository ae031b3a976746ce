//! Persisted audit trail of a session.
//!
//! Everything the supervisor observes or decides is written under the
//! session directory: one event file per role, one JSON file per peer
//! review, and append-only decision and recovery logs. A finished or
//! interrupted session can be reconstructed from these files alone.

pub mod logger;

pub use logger::{AuditLog, load_manifest};

use crate::config::SessionPaths;
use crate::event::Role;
use crate::session::SessionState;
use crate::tracker::StateTracker;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Identity of a session, written once at start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionManifest {
    pub session_id: String,
    pub user_prompt: String,
    pub target_dir: PathBuf,
    pub support_dir: PathBuf,
    pub started_at: DateTime<Utc>,
}

/// Rebuild a session's state from its audit trail.
///
/// Worker states are re-derived by folding each role's recorded events;
/// liveness is unknown offline, so no reconciliation is applied.
pub fn reconstruct_session(workspace_dir: &Path, tracker: &StateTracker) -> Result<SessionState> {
    let manifest = load_manifest(workspace_dir)?;
    let paths = SessionPaths::new(
        workspace_dir.to_path_buf(),
        manifest.target_dir.clone(),
        manifest.support_dir.clone(),
    );
    let log = AuditLog::new(paths);

    let mut state = SessionState::new(
        manifest.session_id,
        manifest.user_prompt,
        workspace_dir.to_path_buf(),
        manifest.target_dir,
    );
    state.started_at = manifest.started_at;

    for role in Role::ALL {
        let events = log.load_events(role)?;
        if let Some(worker) = state.worker_mut(role) {
            if let Some(first) = events.first() {
                worker.started_at = Some(first.timestamp);
            }
            tracker.fold(worker, &events);
        }
    }
    state.reviews = log.load_reviews()?;
    state.decisions = log.load_decisions()?;
    state.recoveries = log.load_recoveries()?;
    state.complete = state.all_terminal();
    Ok(state)
}
