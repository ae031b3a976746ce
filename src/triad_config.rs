//! Unified configuration for triad.
//!
//! Settings are read from `.triad/triad.toml` in the project directory and
//! layered file → environment → CLI. Every field has a default, so an empty
//! or missing file is a valid configuration.
//!
//! # Configuration File Format
//!
//! ```toml
//! [supervisor]
//! poll_interval_secs = 5
//! stop_grace_secs = 5
//! max_relaunches = 3
//! workspace_root = ".triad/sessions"
//!
//! [review]
//! fallback_minutes = 15
//! max_words = 200
//!
//! [tracker]
//! milestone_step = 20
//! milestone_cap = 90
//! completion_threshold = 90
//!
//! [server]
//! enabled = true
//! port = 8000
//!
//! [workers.architect]
//! command = "gemini"
//!
//! [workers.reviewer]
//! command = "codex"
//! skip_env_check = true
//!
//! [workers.implementer]
//! extra_args = ["--model", "sonnet"]
//! ```
//!
//! Environment overrides: `TRIAD_ARCHITECT_CMD`, `TRIAD_IMPLEMENTER_CMD`,
//! `TRIAD_REVIEWER_CMD` and `TRIAD_POLL_INTERVAL`.

use crate::event::Role;
use crate::review::ReviewPolicy;
use crate::tracker::TrackerPolicy;
use crate::worker::RoleProfile;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of the configuration inside the support directory.
pub const CONFIG_FILE: &str = "triad.toml";
/// Support directory inside the project.
pub const SUPPORT_DIR: &str = ".triad";

/// Supervisor loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorSection {
    /// Seconds between polling iterations
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Seconds a worker gets to exit after SIGTERM
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
    /// Automatic relaunches allowed per role and session
    #[serde(default = "default_max_relaunches")]
    pub max_relaunches: u32,
    /// Where session directories are created, relative to the project
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_stop_grace_secs() -> u64 {
    crate::worker::process::DEFAULT_STOP_GRACE_SECS
}

fn default_max_relaunches() -> u32 {
    crate::recovery::DEFAULT_MAX_RELAUNCHES
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(SUPPORT_DIR).join("sessions")
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            stop_grace_secs: default_stop_grace_secs(),
            max_relaunches: default_max_relaunches(),
            workspace_root: default_workspace_root(),
        }
    }
}

/// Review scheduling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSection {
    /// Minutes without a review before one is forced
    #[serde(default = "default_fallback_minutes")]
    pub fallback_minutes: u64,
    /// Word limit passed to verdict sources
    #[serde(default = "default_max_words")]
    pub max_words: usize,
}

fn default_fallback_minutes() -> u64 {
    crate::review::DEFAULT_FALLBACK_MINUTES
}

fn default_max_words() -> usize {
    crate::review::DEFAULT_MAX_WORDS
}

impl Default for ReviewSection {
    fn default() -> Self {
        Self {
            fallback_minutes: default_fallback_minutes(),
            max_words: default_max_words(),
        }
    }
}

/// Progress heuristics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSection {
    #[serde(default = "default_milestone_step")]
    pub milestone_step: u8,
    #[serde(default = "default_milestone_cap")]
    pub milestone_cap: u8,
    #[serde(default = "default_completion_threshold")]
    pub completion_threshold: u8,
}

fn default_milestone_step() -> u8 {
    crate::tracker::DEFAULT_MILESTONE_STEP
}

fn default_milestone_cap() -> u8 {
    crate::tracker::DEFAULT_MILESTONE_CAP
}

fn default_completion_threshold() -> u8 {
    crate::tracker::DEFAULT_COMPLETION_THRESHOLD
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            milestone_step: default_milestone_step(),
            milestone_cap: default_milestone_cap(),
            completion_threshold: default_completion_threshold(),
        }
    }
}

/// Control API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_server_enabled")]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_server_enabled() -> bool {
    true
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            enabled: default_server_enabled(),
            port: default_port(),
        }
    }
}

/// Per-role launch overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSection {
    /// Agent binary (defaults to the role's own CLI)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Arguments inserted before the prompt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,
    /// Start with the agent's trusted-directory check disabled
    #[serde(default)]
    pub skip_env_check: bool,
}

/// The complete triad.toml structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriadToml {
    #[serde(default)]
    pub supervisor: SupervisorSection,
    #[serde(default)]
    pub review: ReviewSection,
    #[serde(default)]
    pub tracker: TrackerSection,
    #[serde(default)]
    pub server: ServerSection,
    /// Keyed by role name (`architect`, `implementer`, `reviewer`)
    #[serde(default)]
    pub workers: BTreeMap<String, WorkerSection>,
}

impl TriadToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse triad.toml")
    }

    /// Load `triad.toml` from the support directory, or defaults if absent.
    pub fn load_or_default(support_dir: &Path) -> Result<Self> {
        let config_path = support_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize triad.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Settings for one role, empty if the file has none.
    pub fn worker(&self, role: Role) -> WorkerSection {
        self.workers.get(role.as_str()).cloned().unwrap_or_default()
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.supervisor.poll_interval_secs == 0 {
            warnings.push("poll_interval_secs is 0: the supervisor will busy-loop".to_string());
        }
        if self.review.fallback_minutes == 0 {
            warnings.push("fallback_minutes is 0: a review will run on every poll".to_string());
        }
        if self.review.fallback_minutes > crate::review::MAX_FALLBACK_MINUTES {
            warnings.push(format!(
                "fallback_minutes {} is above {}: the longer value is capped",
                self.review.fallback_minutes,
                crate::review::MAX_FALLBACK_MINUTES
            ));
        }
        if self.tracker.milestone_cap > 100 {
            warnings.push(format!(
                "milestone_cap {} is above 100: capped at 100",
                self.tracker.milestone_cap
            ));
        }
        if self.tracker.completion_threshold > 100 {
            warnings.push(format!(
                "completion_threshold {} is above 100: capped at 100",
                self.tracker.completion_threshold
            ));
        }
        if self.tracker.milestone_step == 0 {
            warnings.push("milestone_step is 0: milestones will not move progress".to_string());
        }

        for (name, section) in &self.workers {
            if name.parse::<Role>().is_err() {
                warnings.push(format!(
                    "Unknown worker '{}'. Valid values: architect, implementer, reviewer",
                    name
                ));
            }
            if section.command.as_deref().is_some_and(|c| c.trim().is_empty()) {
                warnings.push(format!("Empty command for worker '{}'", name));
            }
        }

        warnings
    }
}

/// Resolved configuration: file, then environment, then CLI.
#[derive(Debug, Clone)]
pub struct TriadConfig {
    pub project_dir: PathBuf,
    pub support_dir: PathBuf,
    pub toml: TriadToml,
    env_commands: BTreeMap<Role, String>,
    env_poll_interval: Option<u64>,
    cli_port: Option<u16>,
    cli_no_server: bool,
    cli_poll_interval: Option<u64>,
}

impl TriadConfig {
    /// Load the configuration of a project directory.
    ///
    /// `config_file` replaces `.triad/triad.toml` when given.
    pub fn new(project_dir: PathBuf, config_file: Option<&Path>) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let support_dir = project_dir.join(SUPPORT_DIR);
        let toml = match config_file {
            Some(path) => TriadToml::load(path)?,
            None => TriadToml::load_or_default(&support_dir)?,
        };
        let mut config = Self::from_toml(project_dir, toml);
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Build from an already parsed file, without environment overrides.
    pub fn from_toml(project_dir: PathBuf, toml: TriadToml) -> Self {
        Self {
            support_dir: project_dir.join(SUPPORT_DIR),
            project_dir,
            toml,
            env_commands: BTreeMap::new(),
            env_poll_interval: None,
            cli_port: None,
            cli_no_server: false,
            cli_poll_interval: None,
        }
    }

    /// Pick up `TRIAD_*` overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for role in Role::ALL {
            let key = format!("TRIAD_{}_CMD", role.as_str().to_uppercase());
            if let Some(cmd) = lookup(&key).filter(|c| !c.trim().is_empty()) {
                self.env_commands.insert(role, cmd);
            }
        }
        self.env_poll_interval = lookup("TRIAD_POLL_INTERVAL").and_then(|v| v.trim().parse().ok());
    }

    /// Apply CLI flags, the highest-priority layer.
    pub fn with_cli_args(
        mut self,
        port: Option<u16>,
        no_server: bool,
        poll_interval: Option<u64>,
    ) -> Self {
        self.cli_port = port;
        self.cli_no_server = no_server;
        self.cli_poll_interval = poll_interval;
        self
    }

    /// Agent binary for `role` (env → file → role default).
    pub fn worker_command(&self, role: Role) -> String {
        self.env_commands
            .get(&role)
            .cloned()
            .or_else(|| self.toml.worker(role).command)
            .unwrap_or_else(|| RoleProfile::for_role(role).default_command.to_string())
    }

    pub fn worker_extra_args(&self, role: Role) -> Vec<String> {
        self.toml.worker(role).extra_args
    }

    pub fn worker_skip_env_check(&self, role: Role) -> bool {
        self.toml.worker(role).skip_env_check
    }

    /// Poll interval (CLI → env → file).
    pub fn poll_interval(&self) -> Duration {
        let secs = self
            .cli_poll_interval
            .or(self.env_poll_interval)
            .unwrap_or(self.toml.supervisor.poll_interval_secs);
        Duration::from_secs(secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.toml.supervisor.stop_grace_secs)
    }

    pub fn max_relaunches(&self) -> u32 {
        self.toml.supervisor.max_relaunches
    }

    pub fn server_enabled(&self) -> bool {
        !self.cli_no_server && self.toml.server.enabled
    }

    pub fn port(&self) -> u16 {
        self.cli_port.unwrap_or(self.toml.server.port)
    }

    /// Absolute directory holding session workspaces.
    pub fn workspace_root(&self) -> PathBuf {
        let root = &self.toml.supervisor.workspace_root;
        if root.is_absolute() {
            root.clone()
        } else {
            self.project_dir.join(root)
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.support_dir.join(CONFIG_FILE)
    }

    pub fn tracker_policy(&self) -> TrackerPolicy {
        TrackerPolicy {
            milestone_step: self.toml.tracker.milestone_step,
            milestone_cap: self.toml.tracker.milestone_cap,
            completion_threshold: self.toml.tracker.completion_threshold,
        }
        .clamped()
    }

    /// Review policy. The fallback interval is capped at
    /// [`MAX_FALLBACK_MINUTES`](crate::review::MAX_FALLBACK_MINUTES).
    pub fn review_policy(&self) -> ReviewPolicy {
        use crate::review::{DEFAULT_FALLBACK_MINUTES, MAX_FALLBACK_MINUTES};

        let minutes = self.toml.review.fallback_minutes.min(MAX_FALLBACK_MINUTES);
        let fallback = i64::try_from(minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .unwrap_or_else(|| chrono::Duration::minutes(DEFAULT_FALLBACK_MINUTES as i64));
        ReviewPolicy {
            fallback,
            max_words: self.toml.review.max_words,
        }
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
