//! Process-backed [`Worker`] built on `tokio::process`.
//!
//! Stdout is appended to the role's stream file and read back through an
//! [`EventReader`]. Stderr is forwarded line by line into a channel that
//! the supervisor drains without blocking.

use super::{LaunchConfig, RoleProfile, Worker, WorkerHandle};
use crate::errors::{IngestError, SupervisionError};
use crate::event::{Event, Role};
use crate::stream::EventReader;
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Default time a worker gets to exit after SIGTERM.
pub const DEFAULT_STOP_GRACE_SECS: u64 = 5;

/// A worker running as a child process.
pub struct ProcessWorker {
    role: Role,
    command: String,
    prompt: String,
    extra_args: Vec<String>,
    args_override: Option<Vec<String>>,
    stream_path: PathBuf,
    config: LaunchConfig,
    stop_grace: Duration,
    child: Option<Child>,
    reader: EventReader,
    stderr_tx: mpsc::UnboundedSender<String>,
    stderr_rx: mpsc::UnboundedReceiver<String>,
}

impl ProcessWorker {
    pub fn new(
        role: Role,
        command: impl Into<String>,
        prompt: impl Into<String>,
        stream_path: PathBuf,
        config: LaunchConfig,
    ) -> Self {
        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
        Self {
            role,
            command: command.into(),
            prompt: prompt.into(),
            extra_args: Vec::new(),
            args_override: None,
            reader: EventReader::new(role, stream_path.clone()),
            stream_path,
            config,
            stop_grace: Duration::from_secs(DEFAULT_STOP_GRACE_SECS),
            child: None,
            stderr_tx,
            stderr_rx,
        }
    }

    /// Arguments appended after the role's own flags, before the prompt.
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Replace the role's argument list entirely, prompt included.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args_override = Some(args);
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn stream_path(&self) -> &PathBuf {
        &self.stream_path
    }

    /// Full argument list for the next launch.
    pub fn command_args(&self) -> Vec<String> {
        match &self.args_override {
            Some(args) => args.clone(),
            None => RoleProfile::for_role(self.role).build_args(
                &self.config,
                &self.extra_args,
                &self.prompt,
            ),
        }
    }

    fn forward_stderr(&self, child: &mut Child) {
        let Some(stderr) = child.stderr.take() else {
            return;
        };
        let tx = self.stderr_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    }
}

#[async_trait]
impl Worker for ProcessWorker {
    fn role(&self) -> Role {
        self.role
    }

    async fn launch(&mut self) -> Result<WorkerHandle, SupervisionError> {
        let stream = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.stream_path)
            .map_err(|e| SupervisionError::StreamSetupFailed {
                role: self.role,
                path: self.stream_path.clone(),
                source: e,
            })?;

        let args = self.command_args();
        debug!(role = %self.role, command = %self.command, ?args, "Launching worker");

        let mut cmd = Command::new(&self.command);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stream))
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if self.config.working_dir.is_dir() {
            cmd.current_dir(&self.config.working_dir);
        }

        let mut child = cmd.spawn().map_err(|e| SupervisionError::SpawnFailed {
            role: self.role,
            command: self.command.clone(),
            source: e,
        })?;
        self.forward_stderr(&mut child);

        let pid = child.id();
        self.child = Some(child);
        info!(role = %self.role, pid = ?pid, "Worker launched");

        Ok(WorkerHandle {
            pid,
            started_at: Utc::now(),
        })
    }

    fn is_running(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(role = %self.role, %status, "Worker exited");
                false
            }
            Err(e) => {
                warn!(role = %self.role, error = %e, "Failed to poll worker process");
                false
            }
        }
    }

    async fn stop(&mut self) -> Result<(), SupervisionError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if matches!(child.try_wait(), Ok(Some(_))) {
            return Ok(());
        }

        info!(role = %self.role, "Stopping worker");
        if let Err(e) = send_terminate(&mut child) {
            warn!(role = %self.role, error = %e, "Failed to signal worker, killing");
        }

        match tokio::time::timeout(self.stop_grace, child.wait()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(SupervisionError::StopFailed {
                role: self.role,
                source: e,
            }),
            Err(_) => {
                warn!(
                    role = %self.role,
                    grace_secs = self.stop_grace.as_secs(),
                    "Worker ignored SIGTERM, force killing"
                );
                child.kill().await.map_err(|e| SupervisionError::StopFailed {
                    role: self.role,
                    source: e,
                })
            }
        }
    }

    fn read_new_events(&mut self) -> Result<Vec<Event>, IngestError> {
        Ok(self.reader.read_new()?.collect())
    }

    fn read_new_diagnostic_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.stderr_rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    fn launch_config(&self) -> &LaunchConfig {
        &self.config
    }

    fn launch_config_mut(&mut self) -> &mut LaunchConfig {
        &mut self.config
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = libc::pid_t::try_from(pid).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range")
    })?;
    // SAFETY: kill(2) with a pid we spawned and a valid signal number.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}
