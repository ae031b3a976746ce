//! Pattern-based recovery from worker permission failures.
//!
//! The engine scans a worker's `error` events and stderr lines against the
//! role's signature table ([`signatures`]). Known role-specific failures are
//! fixed by relaunching the worker with corrected launch parameters;
//! everything else is escalated as a blocker that needs a human.
//!
//! | Issue                  | Action                           |
//! |------------------------|----------------------------------|
//! | `workspace_permission` | relaunch with all required dirs  |
//! | `environment_check`    | relaunch with the skip flag set  |
//! | `generic_permission`   | escalate for manual intervention |
//!
//! Each role gets at most `max_relaunches` automatic relaunches per
//! session; past that, fixable issues are escalated too.

pub mod environment;
pub mod signatures;

pub use environment::prepare_environment;

use crate::config::SessionPaths;
use crate::event::{Event, EventKind, Role};
use crate::worker::{RoleProfile, Worker, WorkerHandle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Default number of automatic relaunches per role.
pub const DEFAULT_MAX_RELAUNCHES: u32 = 3;

const ACTION_REQUIRED: &str = "Manual intervention needed";
const SUGGESTIONS: [&str; 3] = [
    "Check file permissions on target directories",
    "Verify agent authentication status",
    "Review security settings",
];

/// Failure class detected in a worker's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Sandbox path violation, fixed by granting more directories
    WorkspacePermission,
    /// Trusted-directory precondition, fixed by skipping the check
    EnvironmentCheck,
    /// Plain permission denial, never auto-fixed
    GenericPermission,
    /// Recorded for every escalation
    EscalatedPermission,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::WorkspacePermission => "workspace_permission",
            IssueKind::EnvironmentCheck => "environment_check",
            IssueKind::GenericPermission => "generic_permission",
            IssueKind::EscalatedPermission => "escalated_permission",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the engine did about an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    RelaunchedWithDirectories,
    RelaunchedWithSkipFlag,
    RequiresManualIntervention,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::RelaunchedWithDirectories => "relaunched_with_directories",
            ActionKind::RelaunchedWithSkipFlag => "relaunched_with_skip_flag",
            ActionKind::RequiresManualIntervention => "requires_manual_intervention",
        }
    }

    pub fn is_escalation(&self) -> bool {
        matches!(self, ActionKind::RequiresManualIntervention)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record of one recovery or escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub role: Role,
    pub issue: IssueKind,
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directories: Option<Vec<PathBuf>>,
    pub timestamp: DateTime<Utc>,
}

/// Human-actionable notice attached to an escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionBlocker {
    pub role: Role,
    pub error: String,
    pub action_required: String,
    pub suggestions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl PermissionBlocker {
    fn new(role: Role, error: impl Into<String>) -> Self {
        Self {
            role,
            error: error.into(),
            action_required: ACTION_REQUIRED.to_string(),
            suggestions: SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
            timestamp: Utc::now(),
        }
    }

    fn to_data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("error".into(), json!(self.error));
        data.insert("action_required".into(), json!(self.action_required));
        data.insert("suggestions".into(), json!(self.suggestions));
        data
    }
}

/// Where a detected issue came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSource {
    Event,
    Diagnostic,
}

/// An issue found by [`RecoveryEngine::scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedIssue {
    pub role: Role,
    pub issue: IssueKind,
    pub text: String,
    pub source: IssueSource,
}

/// Result of acting on a [`DetectedIssue`].
#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    pub action: RecoveryAction,
    pub blocker: Option<PermissionBlocker>,
    /// Handle of the relaunched process
    pub handle: Option<WorkerHandle>,
    /// Synthesized events for the worker's own stream, in emission order
    pub events: Vec<Event>,
}

impl RecoveryOutcome {
    /// Whether the worker was relaunched.
    pub fn relaunched(&self) -> bool {
        !self.action.action.is_escalation()
    }
}

/// Detects known failures and applies the bounded recovery policy.
#[derive(Debug)]
pub struct RecoveryEngine {
    paths: SessionPaths,
    max_relaunches: u32,
    relaunches: HashMap<Role, u32>,
    escalated: HashSet<(Role, String)>,
}

impl RecoveryEngine {
    pub fn new(paths: SessionPaths) -> Self {
        Self {
            paths,
            max_relaunches: DEFAULT_MAX_RELAUNCHES,
            relaunches: HashMap::new(),
            escalated: HashSet::new(),
        }
    }

    pub fn with_max_relaunches(mut self, max: u32) -> Self {
        self.max_relaunches = max;
        self
    }

    /// Classify one piece of error text for `role`.
    pub fn detect(role: Role, text: &str) -> Option<IssueKind> {
        RoleProfile::for_role(role).detect(text)
    }

    /// Find the first known issue in a worker's new output. Structured
    /// `error` events are checked before stderr lines.
    pub fn scan(&self, role: Role, events: &[Event], diagnostics: &[String]) -> Option<DetectedIssue> {
        let from_events = events
            .iter()
            .filter(|e| e.kind == EventKind::Error)
            .find_map(|e| {
                Self::detect(role, e.text()).map(|issue| DetectedIssue {
                    role,
                    issue,
                    text: e.text().to_string(),
                    source: IssueSource::Event,
                })
            });
        if from_events.is_some() {
            return from_events;
        }

        diagnostics.iter().find_map(|line| {
            Self::detect(role, line).map(|issue| {
                info!(role = %role, line = %line, "Detected issue in stderr");
                DetectedIssue {
                    role,
                    issue,
                    text: line.clone(),
                    source: IssueSource::Diagnostic,
                }
            })
        })
    }

    pub fn relaunch_count(&self, role: Role) -> u32 {
        self.relaunches.get(&role).copied().unwrap_or(0)
    }

    /// Act on a detected issue. Every call yields an outcome; a repeated
    /// escalation of the same error text is only logged at debug level.
    pub async fn recover(
        &mut self,
        worker: &mut dyn Worker,
        detected: &DetectedIssue,
    ) -> RecoveryOutcome {
        let role = worker.role();
        info!(role = %role, issue = %detected.issue, "Attempting recovery");

        let fixable = matches!(
            detected.issue,
            IssueKind::WorkspacePermission | IssueKind::EnvironmentCheck
        );
        if !fixable {
            return self.escalate(role, &detected.text);
        }
        if self.relaunch_count(role) >= self.max_relaunches {
            warn!(
                role = %role,
                max_relaunches = self.max_relaunches,
                "Relaunch limit reached, escalating"
            );
            let text = format!(
                "{} (relaunch limit of {} reached)",
                detected.text, self.max_relaunches
            );
            return self.escalate(role, &text);
        }

        let (action, directories) = match detected.issue {
            IssueKind::WorkspacePermission => {
                let config = match prepare_environment(
                    RoleProfile::for_role(role),
                    &self.paths,
                    worker.launch_config().skip_env_check,
                ) {
                    Ok(config) => config,
                    Err(e) => {
                        error!(role = %role, error = %e, "Environment preparation failed during recovery");
                        return self.escalate(role, &e.to_string());
                    }
                };
                let dirs = config.required_dirs.clone();
                worker.launch_config_mut().required_dirs = config.required_dirs;
                (ActionKind::RelaunchedWithDirectories, Some(dirs))
            }
            _ => {
                worker.launch_config_mut().skip_env_check = true;
                (ActionKind::RelaunchedWithSkipFlag, None)
            }
        };

        *self.relaunches.entry(role).or_insert(0) += 1;
        let handle = match worker.relaunch().await {
            Ok(handle) => handle,
            Err(e) => {
                error!(role = %role, error = %e, "Relaunch failed");
                return self.escalate(role, &format!("Relaunch failed: {}", e));
            }
        };

        let record = RecoveryAction {
            role,
            issue: detected.issue,
            action,
            directories,
            timestamp: Utc::now(),
        };
        info!(role = %role, issue = %record.issue, action = %record.action, "Recovery succeeded");
        let events = vec![recovery_event(&record, "success", None)];
        RecoveryOutcome {
            action: record,
            blocker: None,
            handle: Some(handle),
            events,
        }
    }

    fn escalate(&mut self, role: Role, error_text: &str) -> RecoveryOutcome {
        if self.escalated.insert((role, error_text.to_string())) {
            warn!(role = %role, error = %error_text, "Escalating permission issue");
        } else {
            debug!(role = %role, error = %error_text, "Escalating repeated permission issue");
        }

        let blocker = PermissionBlocker::new(role, error_text);
        let record = RecoveryAction {
            role,
            issue: IssueKind::EscalatedPermission,
            action: ActionKind::RequiresManualIntervention,
            directories: None,
            timestamp: Utc::now(),
        };
        let events = vec![
            blocker_event(&blocker),
            recovery_event(&record, "escalated", Some(&blocker)),
        ];
        RecoveryOutcome {
            action: record,
            blocker: Some(blocker),
            handle: None,
            events,
        }
    }
}

fn recovery_event(record: &RecoveryAction, status: &str, blocker: Option<&PermissionBlocker>) -> Event {
    let mut data = Map::new();
    data.insert("issue".into(), json!(record.issue));
    data.insert("action".into(), json!(record.action));
    data.insert("status".into(), json!(status));
    data.insert("directories".into(), json!(record.directories));
    if let Some(blocker) = blocker {
        data.insert("blocker".into(), Value::Object(blocker.to_data()));
    }
    Event::new(
        record.role,
        EventKind::Recovery,
        format!("Recovery: {} - {}", record.issue, record.action),
    )
    .with_timestamp(record.timestamp)
    .with_data(data)
}

fn blocker_event(blocker: &PermissionBlocker) -> Event {
    Event::new(
        blocker.role,
        EventKind::PermissionBlocker,
        format!("Permission blocker: {}", blocker.error),
    )
    .with_timestamp(blocker.timestamp)
    .with_data(blocker.to_data())
}
