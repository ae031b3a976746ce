//! Folds worker events into [`WorkerState`] and reconciles the result with
//! process liveness.

use crate::event::{Event, EventKind};
use crate::session::{Status, WorkerState};
use serde::{Deserialize, Serialize};

/// Default progress bump per milestone.
pub const DEFAULT_MILESTONE_STEP: u8 = 20;
/// Milestones alone never push progress past this.
pub const DEFAULT_MILESTONE_CAP: u8 = 90;
/// A worker that exits at or above this progress counts as completed.
pub const DEFAULT_COMPLETION_THRESHOLD: u8 = 90;

/// Heuristic constants used by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerPolicy {
    pub milestone_step: u8,
    pub milestone_cap: u8,
    pub completion_threshold: u8,
}

impl TrackerPolicy {
    /// Copy with the cap and threshold held to the 0..=100 progress range.
    pub fn clamped(self) -> Self {
        Self {
            milestone_step: self.milestone_step,
            milestone_cap: self.milestone_cap.min(100),
            completion_threshold: self.completion_threshold.min(100),
        }
    }
}

impl Default for TrackerPolicy {
    fn default() -> Self {
        Self {
            milestone_step: DEFAULT_MILESTONE_STEP,
            milestone_cap: DEFAULT_MILESTONE_CAP,
            completion_threshold: DEFAULT_COMPLETION_THRESHOLD,
        }
    }
}

/// Applies the per-event status rules.
#[derive(Debug, Clone, Default)]
pub struct StateTracker {
    policy: TrackerPolicy,
}

impl StateTracker {
    pub fn new(policy: TrackerPolicy) -> Self {
        Self {
            policy: policy.clamped(),
        }
    }

    pub fn policy(&self) -> &TrackerPolicy {
        &self.policy
    }

    /// Fold a batch of events, in arrival order, into `state`.
    ///
    /// Once a worker is terminal its status and progress are frozen; later
    /// events still update `last_event` and the error count.
    pub fn fold(&self, state: &mut WorkerState, events: &[Event]) {
        for event in events {
            self.apply(state, event);
        }
    }

    fn apply(&self, state: &mut WorkerState, event: &Event) {
        state.last_event = Some(event.clone());
        if event.kind == EventKind::Error {
            state.error_count = state.error_count.saturating_add(1);
        }
        if state.status.is_terminal() {
            return;
        }

        if let Some(p) = event.payload.progress {
            state.progress = state.progress.max(p.min(100));
        }

        match event.kind {
            EventKind::Progress | EventKind::Status => state.status = Status::Running,
            EventKind::Blocker => state.status = Status::Blocked,
            EventKind::Error if event.text_contains("blocker") => {
                state.status = Status::Blocked;
            }
            EventKind::Milestone => {
                let bumped = state
                    .progress
                    .saturating_add(self.policy.milestone_step)
                    .min(self.policy.milestone_cap)
                    .min(100);
                state.progress = state.progress.max(bumped);
            }
            EventKind::Recovery => state.status = Status::Recovering,
            _ => {}
        }

        if event.text_contains("complete") || event.text_contains("done") {
            state.status = Status::Completed;
            state.progress = 100;
        }
    }

    /// Resolve a worker whose process has exited before reaching a terminal
    /// status. A blocked worker that exits has failed; any other is judged
    /// by its progress.
    pub fn reconcile(&self, state: &mut WorkerState, alive: bool) {
        if alive || state.status.is_terminal() {
            return;
        }
        state.status = if state.status != Status::Blocked
            && state.progress >= self.policy.completion_threshold
        {
            Status::Completed
        } else {
            Status::Failed
        };
    }

    /// Move a worker back to `recovering` after a supervisor relaunch. This
    /// is the only way out of a terminal status.
    pub fn revive(&self, state: &mut WorkerState) {
        state.status = Status::Recovering;
    }
}
