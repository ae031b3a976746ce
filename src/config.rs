use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::event::Role;

/// Name of the session manifest inside a session directory.
pub const MANIFEST_FILE: &str = "session.json";

/// On-disk layout of one session.
///
/// ```text
/// <workspace_root>/<session_id>/
///   session.json           manifest (id, prompt, directories, start time)
///   streams/<role>.jsonl   raw worker stdout
///   events/<role>.jsonl    audit trail of every ingested or synthesized event
///   reviews/review_NNN.json
///   logs/triad.log
///   decisions.jsonl
///   recoveries.jsonl
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    /// Session directory, `<workspace_root>/<session_id>`
    pub workspace_dir: PathBuf,
    /// Project the workers operate on
    pub target_dir: PathBuf,
    /// Supervisor's own directory (`.triad` in the project)
    pub support_dir: PathBuf,
}

impl SessionPaths {
    pub fn new(workspace_dir: PathBuf, target_dir: PathBuf, support_dir: PathBuf) -> Self {
        Self {
            workspace_dir,
            target_dir,
            support_dir,
        }
    }

    /// Layout for `session_id` under `workspace_root`.
    pub fn for_session(
        workspace_root: &Path,
        session_id: &str,
        target_dir: PathBuf,
        support_dir: PathBuf,
    ) -> Self {
        Self::new(workspace_root.join(session_id), target_dir, support_dir)
    }

    pub fn streams_dir(&self) -> PathBuf {
        self.workspace_dir.join("streams")
    }

    pub fn events_dir(&self) -> PathBuf {
        self.workspace_dir.join("events")
    }

    pub fn reviews_dir(&self) -> PathBuf {
        self.workspace_dir.join("reviews")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.workspace_dir.join("logs")
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.workspace_dir.join(MANIFEST_FILE)
    }

    pub fn decisions_file(&self) -> PathBuf {
        self.workspace_dir.join("decisions.jsonl")
    }

    pub fn recoveries_file(&self) -> PathBuf {
        self.workspace_dir.join("recoveries.jsonl")
    }

    pub fn stream_file(&self, role: Role) -> PathBuf {
        self.streams_dir().join(format!("{}.jsonl", role))
    }

    pub fn event_file(&self, role: Role) -> PathBuf {
        self.events_dir().join(format!("{}.jsonl", role))
    }

    /// Every directory an agent needs read/write access to, deduplicated.
    pub fn required_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::with_capacity(3);
        for dir in [&self.workspace_dir, &self.target_dir, &self.support_dir] {
            if !dirs.contains(dir) {
                dirs.push(dir.clone());
            }
        }
        dirs
    }

    /// Create the session directory tree.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.streams_dir(),
            self.events_dir(),
            self.reviews_dir(),
            self.logs_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_session_layout() {
        let paths = SessionPaths::for_session(
            Path::new("/root/.triad/sessions"),
            "orch_1",
            PathBuf::from("/proj"),
            PathBuf::from("/proj/.triad"),
        );
        assert_eq!(paths.workspace_dir, PathBuf::from("/root/.triad/sessions/orch_1"));
        assert_eq!(
            paths.stream_file(Role::Architect),
            PathBuf::from("/root/.triad/sessions/orch_1/streams/architect.jsonl")
        );
        assert_eq!(
            paths.event_file(Role::Reviewer),
            PathBuf::from("/root/.triad/sessions/orch_1/events/reviewer.jsonl")
        );
        assert_eq!(
            paths.decisions_file(),
            PathBuf::from("/root/.triad/sessions/orch_1/decisions.jsonl")
        );
    }

    #[test]
    fn test_required_dirs_are_deduplicated() {
        let paths = SessionPaths::new(
            PathBuf::from("/ws"),
            PathBuf::from("/proj"),
            PathBuf::from("/proj"),
        );
        assert_eq!(
            paths.required_dirs(),
            vec![PathBuf::from("/ws"), PathBuf::from("/proj")]
        );
    }

    #[test]
    fn test_ensure_directories() {
        let dir = TempDir::new().unwrap();
        let paths = SessionPaths::for_session(
            dir.path(),
            "orch_x",
            dir.path().join("target"),
            dir.path().to_path_buf(),
        );
        paths.ensure_directories().unwrap();
        assert!(paths.streams_dir().is_dir());
        assert!(paths.events_dir().is_dir());
        assert!(paths.reviews_dir().is_dir());
        assert!(paths.logs_dir().is_dir());
    }
}
