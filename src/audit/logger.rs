use super::SessionManifest;
use crate::config::SessionPaths;
use crate::event::{Event, Role};
use crate::recovery::RecoveryAction;
use crate::review::{OrchestratorDecision, PeerReview};
use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Append-only persistence for one session.
pub struct AuditLog {
    paths: SessionPaths,
    review_counter: u32,
}

impl AuditLog {
    /// Open the audit log. Review numbering continues after any review
    /// files already present.
    pub fn new(paths: SessionPaths) -> Self {
        let mut log = Self {
            paths,
            review_counter: 0,
        };
        log.review_counter = log.list_reviews().map(|r| r.len() as u32).unwrap_or(0);
        log
    }

    pub fn paths(&self) -> &SessionPaths {
        &self.paths
    }

    pub fn write_manifest(&self, manifest: &SessionManifest) -> Result<()> {
        let path = self.paths.manifest_file();
        let json =
            serde_json::to_string_pretty(manifest).context("Failed to serialize session manifest")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write session manifest {}", path.display()))
    }

    pub fn load_manifest(&self) -> Result<SessionManifest> {
        load_manifest(&self.paths.workspace_dir)
    }

    /// Append an event to its role's audit file.
    pub fn append_event(&self, event: &Event) -> Result<()> {
        append_jsonl(&self.paths.event_file(event.role), event)
    }

    /// Persist one review as `reviews/review_NNN.json`.
    pub fn save_review(&mut self, review: &PeerReview) -> Result<PathBuf> {
        self.review_counter += 1;
        let path = self
            .paths
            .reviews_dir()
            .join(format!("review_{:03}.json", self.review_counter));
        let json = serde_json::to_string_pretty(review).context("Failed to serialize review")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write review {}", path.display()))?;
        debug!(path = %path.display(), "Saved review");
        Ok(path)
    }

    pub fn append_decision(&self, decision: &OrchestratorDecision) -> Result<()> {
        append_jsonl(&self.paths.decisions_file(), decision)
    }

    pub fn append_recovery(&self, action: &RecoveryAction) -> Result<()> {
        append_jsonl(&self.paths.recoveries_file(), action)
    }

    pub fn load_events(&self, role: Role) -> Result<Vec<Event>> {
        load_jsonl(&self.paths.event_file(role))
    }

    pub fn load_decisions(&self) -> Result<Vec<OrchestratorDecision>> {
        load_jsonl(&self.paths.decisions_file())
    }

    pub fn load_recoveries(&self) -> Result<Vec<RecoveryAction>> {
        load_jsonl(&self.paths.recoveries_file())
    }

    /// Review files in numbering order.
    pub fn list_reviews(&self) -> Result<Vec<PathBuf>> {
        let dir = self.paths.reviews_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut reviews: Vec<PathBuf> = fs::read_dir(&dir)
            .with_context(|| format!("Failed to read reviews directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("review_") && n.ends_with(".json"))
            })
            .collect();
        reviews.sort();
        Ok(reviews)
    }

    pub fn load_reviews(&self) -> Result<Vec<PeerReview>> {
        self.list_reviews()?
            .iter()
            .map(|path| {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read review {}", path.display()))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse review {}", path.display()))
            })
            .collect()
    }
}

/// Read the manifest of the session stored in `workspace_dir`.
pub fn load_manifest(workspace_dir: &Path) -> Result<SessionManifest> {
    let path = workspace_dir.join(crate::config::MANIFEST_FILE);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read session manifest {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse session manifest {}", path.display()))
}

fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let line = serde_json::to_string(record).context("Failed to serialize audit record")?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    writeln!(file, "{}", line).with_context(|| format!("Failed to append to {}", path.display()))
}

fn load_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut records = Vec::new();
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                path = %path.display(),
                line = n + 1,
                error = %e,
                "Skipping unreadable audit record"
            ),
        }
    }
    Ok(records)
}
