//! The supervisor loop.
//!
//! A [`Coordinator`] owns one session: its three workers, the tracked state,
//! and the recovery, review and audit machinery. Each [`Coordinator::tick`]
//! runs one iteration:
//!
//! 1. ingest new events and stderr lines from every worker
//! 2. append them to the audit trail and fold them into worker state
//! 3. reconcile state with process liveness
//! 4. detect and act on known failures
//! 5. run a review round if one is due and apply its decision
//! 6. check completion and publish a snapshot
//!
//! [`Coordinator::run`] repeats that at a fixed interval until every worker
//! is finished or a stop is requested.

use super::control::SessionHandle;
use super::tasks::decompose_task;
use crate::audit::{AuditLog, SessionManifest};
use crate::config::SessionPaths;
use crate::errors::SessionError;
use crate::event::{Event, Role};
use crate::recovery::{RecoveryEngine, RecoveryOutcome, prepare_environment};
use crate::review::{DecisionAction, OrchestratorDecision, ReviewEngine, ReviewPolicy, VerdictSource};
use crate::session::{SessionState, SessionSummary, Status};
use crate::tracker::{StateTracker, TrackerPolicy};
use crate::triad_config::TriadConfig;
use crate::worker::{LaunchConfig, ProcessWorker, RoleProfile, Worker};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Loop and policy settings of one coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSettings {
    pub poll_interval: Duration,
    pub max_relaunches: u32,
    pub tracker: TrackerPolicy,
    pub review: ReviewPolicy,
    /// Roles launched with the trusted-directory check disabled
    pub skip_env_check: BTreeSet<Role>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_relaunches: crate::recovery::DEFAULT_MAX_RELAUNCHES,
            tracker: TrackerPolicy::default(),
            review: ReviewPolicy::default(),
            skip_env_check: BTreeSet::new(),
        }
    }
}

impl CoordinatorSettings {
    pub fn from_config(config: &TriadConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_relaunches: config.max_relaunches(),
            tracker: config.tracker_policy(),
            review: config.review_policy(),
            skip_env_check: Role::ALL
                .into_iter()
                .filter(|r| config.worker_skip_env_check(*r))
                .collect(),
        }
    }
}

/// Builds the worker for each role at session start.
pub trait WorkerFactory: Send + Sync {
    fn create(
        &self,
        role: Role,
        prompt: String,
        paths: &SessionPaths,
        config: LaunchConfig,
    ) -> Box<dyn Worker>;
}

/// Spawns the configured agent CLIs as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessWorkerFactory {
    commands: BTreeMap<Role, String>,
    extra_args: BTreeMap<Role, Vec<String>>,
    stop_grace: Option<Duration>,
}

impl ProcessWorkerFactory {
    pub fn from_config(config: &TriadConfig) -> Self {
        Self {
            commands: Role::ALL
                .into_iter()
                .map(|r| (r, config.worker_command(r)))
                .collect(),
            extra_args: Role::ALL
                .into_iter()
                .map(|r| (r, config.worker_extra_args(r)))
                .collect(),
            stop_grace: Some(config.stop_grace()),
        }
    }
}

impl WorkerFactory for ProcessWorkerFactory {
    fn create(
        &self,
        role: Role,
        prompt: String,
        paths: &SessionPaths,
        config: LaunchConfig,
    ) -> Box<dyn Worker> {
        let command = self
            .commands
            .get(&role)
            .cloned()
            .unwrap_or_else(|| RoleProfile::for_role(role).default_command.to_string());
        let mut worker = ProcessWorker::new(role, command, prompt, paths.stream_file(role), config)
            .with_extra_args(self.extra_args.get(&role).cloned().unwrap_or_default());
        if let Some(grace) = self.stop_grace {
            worker = worker.with_stop_grace(grace);
        }
        Box::new(worker)
    }
}

/// What one iteration did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Events ingested from worker streams
    pub events: usize,
    /// Recoveries and escalations recorded
    pub recoveries: usize,
    pub decision: Option<OrchestratorDecision>,
    pub complete: bool,
}

pub struct Coordinator {
    state: SessionState,
    paths: SessionPaths,
    settings: CoordinatorSettings,
    workers: BTreeMap<Role, Box<dyn Worker>>,
    tracker: StateTracker,
    recovery: RecoveryEngine,
    review: ReviewEngine,
    audit: AuditLog,
    /// Events since the last review round, per role
    pending: BTreeMap<Role, Vec<Event>>,
    handle: SessionHandle,
}

impl Coordinator {
    /// Create the session workspace, prepare every role's directories and
    /// launch the three workers.
    ///
    /// Environment failures are fatal. If a worker fails to launch, the
    /// workers already started are stopped before the error is returned.
    pub async fn start_session(
        session_id: &str,
        user_prompt: &str,
        paths: SessionPaths,
        settings: CoordinatorSettings,
        factory: &dyn WorkerFactory,
    ) -> Result<Self, SessionError> {
        info!(session_id = %session_id, workspace = %paths.workspace_dir.display(), "Starting session");
        paths.ensure_directories()?;

        let mut state = SessionState::new(
            session_id,
            user_prompt,
            paths.workspace_dir.clone(),
            paths.target_dir.clone(),
        );
        let audit = AuditLog::new(paths.clone());
        audit.write_manifest(&SessionManifest {
            session_id: state.session_id.clone(),
            user_prompt: state.user_prompt.clone(),
            target_dir: paths.target_dir.clone(),
            support_dir: paths.support_dir.clone(),
            started_at: state.started_at,
        })?;

        let mut launch_configs = BTreeMap::new();
        for role in Role::ALL {
            let skip = settings.skip_env_check.contains(&role);
            let config = prepare_environment(RoleProfile::for_role(role), &paths, skip)
                .map_err(|source| SessionError::Environment { role, source })?;
            launch_configs.insert(role, config);
        }

        let breakdown = decompose_task(user_prompt);
        let mut workers: BTreeMap<Role, Box<dyn Worker>> = BTreeMap::new();
        for (role, config) in launch_configs {
            let mut worker = factory.create(role, breakdown.prompt_for(role), &paths, config);
            match worker.launch().await {
                Ok(handle) => {
                    info!(role = %role, pid = ?handle.pid, "Worker launched");
                    if let Some(ws) = state.worker_mut(role) {
                        ws.status = Status::Running;
                        ws.pid = handle.pid;
                        ws.started_at = Some(handle.started_at);
                        ws.task = breakdown.assignment(role).map(|a| a.title.clone());
                    }
                    workers.insert(role, worker);
                }
                Err(source) => {
                    error!(role = %role, error = %source, "Worker launch failed, stopping session");
                    for (launched, w) in workers.iter_mut() {
                        if let Err(e) = w.stop().await {
                            warn!(role = %launched, error = %e, "Failed to stop worker");
                        }
                    }
                    return Err(SessionError::LaunchFailed { role, source });
                }
            }
        }

        let review = ReviewEngine::new(settings.review, state.started_at);
        let recovery =
            RecoveryEngine::new(paths.clone()).with_max_relaunches(settings.max_relaunches);
        let handle = SessionHandle::new(state.clone());

        Ok(Self {
            state,
            paths,
            tracker: StateTracker::new(settings.tracker),
            settings,
            workers,
            recovery,
            review,
            audit,
            pending: BTreeMap::new(),
            handle,
        })
    }

    /// Replace the heuristic verdict source.
    pub fn with_verdict_source(mut self, source: Box<dyn VerdictSource>) -> Self {
        self.review =
            ReviewEngine::new(self.settings.review, self.review.last_review()).with_source(source);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.state.session_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn paths(&self) -> &SessionPaths {
        &self.paths
    }

    /// Handle for external readers and control calls.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn worker(&self, role: Role) -> Option<&(dyn Worker + 'static)> {
        self.workers.get(&role).map(|w| w.as_ref())
    }

    pub fn worker_mut(&mut self, role: Role) -> Option<&mut (dyn Worker + 'static)> {
        self.workers.get_mut(&role).map(|w| w.as_mut())
    }

    /// Events waiting for the next review round.
    pub fn pending(&self) -> &BTreeMap<Role, Vec<Event>> {
        &self.pending
    }

    /// Run one polling iteration.
    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let mut alive: BTreeMap<Role, bool> = BTreeMap::new();

        for role in Role::ALL {
            let Some(worker) = self.workers.get_mut(&role) else {
                continue;
            };

            let events = worker.read_new_events().unwrap_or_else(|e| {
                warn!(role = %role, error = %e, "Failed to read worker stream");
                Vec::new()
            });
            let diagnostics = worker.read_new_diagnostic_lines();
            for line in &diagnostics {
                debug!(role = %role, line = %line, "Worker stderr");
            }

            for event in &events {
                if let Err(e) = self.audit.append_event(event) {
                    warn!(role = %role, error = %e, "Failed to record event");
                }
            }

            let running = worker.is_running();
            if let Some(ws) = self.state.worker_mut(role) {
                let before = ws.status;
                self.tracker.fold(ws, &events);
                self.tracker.reconcile(ws, running);
                if ws.status != before {
                    info!(role = %role, from = %before, to = %ws.status, progress = ws.progress, "Worker status changed");
                }
            }
            alive.insert(role, running);
            report.events += events.len();

            if let Some(issue) = self.recovery.scan(role, &events, &diagnostics) {
                let outcome = self.recovery.recover(worker.as_mut(), &issue).await;
                if outcome.relaunched() {
                    alive.insert(role, true);
                }
                let synthesized = self.apply_recovery(role, outcome);
                report.recoveries += 1;
                self.pending.entry(role).or_default().extend(events);
                self.pending.entry(role).or_default().extend(synthesized);
                continue;
            }

            self.pending.entry(role).or_default().extend(events);
        }

        report.decision = self.maybe_review().await;

        let any_alive = alive.values().any(|a| *a);
        if self.state.all_terminal() && !any_alive {
            if !self.state.complete {
                info!(session_id = %self.state.session_id, "All workers finished");
            }
            self.state.complete = true;
        }
        report.complete = self.state.complete;

        self.handle.publish(self.state.clone()).await;
        report
    }

    /// Record a recovery outcome and fold its synthesized events. Returns
    /// those events for the pending window.
    fn apply_recovery(&mut self, role: Role, outcome: RecoveryOutcome) -> Vec<Event> {
        if let Some(blocker) = &outcome.blocker {
            warn!(
                role = %role,
                error = %blocker.error,
                action_required = %blocker.action_required,
                "Permission blocker needs attention"
            );
        }
        if let Err(e) = self.audit.append_recovery(&outcome.action) {
            warn!(role = %role, error = %e, "Failed to record recovery action");
        }
        for event in &outcome.events {
            if let Err(e) = self.audit.append_event(event) {
                warn!(role = %role, error = %e, "Failed to record recovery event");
            }
        }

        if let Some(ws) = self.state.worker_mut(role) {
            if outcome.relaunched() {
                self.tracker.revive(ws);
                if let Some(handle) = &outcome.handle {
                    ws.pid = handle.pid;
                    ws.started_at = Some(handle.started_at);
                }
            }
            self.tracker.fold(ws, &outcome.events);
        }
        self.state.recoveries.push(outcome.action);
        outcome.events
    }

    /// Run a review round if one is due, persist it and apply the decision.
    async fn maybe_review(&mut self) -> Option<OrchestratorDecision> {
        let force = self.handle.take_review_request();
        let now = Utc::now();
        let trigger = self.review.should_trigger_review(&self.pending, force, now)?;
        info!(trigger = ?trigger, "Review round");

        let round = self.review.conduct_round(&self.pending, now).await;
        for review in &round.reviews {
            if let Err(e) = self.audit.save_review(review) {
                warn!(error = %e, "Failed to save review");
            }
        }
        if let Err(e) = self.audit.append_decision(&round.decision) {
            warn!(error = %e, "Failed to record decision");
        }

        let decision = round.decision;
        match decision.action {
            DecisionAction::Continue => info!(reason = %decision.reason, "Decision: continue"),
            DecisionAction::LogWarning => {
                warn!(reason = %decision.reason, next_steps = %decision.next_steps, "Decision: warning")
            }
            DecisionAction::PauseAndClarify | DecisionAction::StopAndEscalate => {
                warn!(
                    action = %decision.action,
                    reason = %decision.reason,
                    next_steps = %decision.next_steps,
                    "Decision requires attention, pausing"
                );
            }
        }
        if decision.action.pauses() {
            self.handle.pause();
        }

        self.state.reviews.extend(round.reviews);
        self.state.decisions.push(decision.clone());
        self.pending.clear();
        Some(decision)
    }

    /// Drive the loop until completion or stop, then stop every worker.
    pub async fn run(&mut self) -> SessionSummary {
        let handle = self.handle.clone();
        let interval = self.settings.poll_interval;
        info!(
            session_id = %self.state.session_id,
            poll_interval_secs = interval.as_secs(),
            "Supervisor loop started"
        );

        loop {
            if handle.is_stopped() {
                info!("Stop requested, leaving supervisor loop");
                break;
            }
            if !handle.is_paused() {
                let report = self.tick().await;
                if report.complete {
                    break;
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = handle.notified() => {}
            }
        }

        self.shutdown().await;
        self.state.summary()
    }

    /// Stop every worker and publish the final state.
    pub async fn shutdown(&mut self) {
        for (role, worker) in self.workers.iter_mut() {
            if let Err(e) = worker.stop().await {
                error!(role = %role, error = %e, "Failed to stop worker");
            }
        }
        self.handle.stop();
        self.handle.publish(self.state.clone()).await;
        info!(session_id = %self.state.session_id, "Session shut down");
    }
}
