//! Reduction of a review round's verdicts to one orchestration decision.
//!
//! Rules are evaluated in a fixed order and the first match wins:
//!
//! 1. any `blocker` - **stop and escalate**
//! 2. two or more `concerns` - **pause and clarify**
//! 3. exactly one `concerns` - **log a warning**
//! 4. every verdict `approved` - **continue**
//! 5. anything else, including an empty set - **log a warning**
//!
//! ## Example
//!
//! ```
//! use triad::event::Role;
//! use triad::review::{PeerReview, Verdict};
//! use triad::review::arbiter::{DecisionAction, reduce_verdicts};
//!
//! let reviews = vec![
//!     PeerReview::new(Role::Reviewer, Role::Implementer, Verdict::Approved),
//!     PeerReview::new(Role::Architect, Role::Implementer, Verdict::Blocker),
//! ];
//! let decision = reduce_verdicts(&reviews);
//! assert_eq!(decision.action, DecisionAction::StopAndEscalate);
//! assert_eq!(decision.reason, "1 blocker(s) detected");
//! ```

use super::{PeerReview, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Orchestration-level action chosen from a review round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    Continue,
    LogWarning,
    PauseAndClarify,
    StopAndEscalate,
}

impl DecisionAction {
    /// Whether the coordinator must suspend its loop.
    pub fn pauses(&self) -> bool {
        matches!(self, Self::PauseAndClarify | Self::StopAndEscalate)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "CONTINUE",
            Self::LogWarning => "LOG_WARNING",
            Self::PauseAndClarify => "PAUSE_AND_CLARIFY",
            Self::StopAndEscalate => "STOP_AND_ESCALATE",
        }
    }
}

impl fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision produced by a review round. Appended, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorDecision {
    pub action: DecisionAction,
    pub reason: String,
    pub next_steps: String,
    pub timestamp: DateTime<Utc>,
}

impl OrchestratorDecision {
    pub fn new(action: DecisionAction, reason: impl Into<String>, next_steps: impl Into<String>) -> Self {
        Self {
            action,
            reason: reason.into(),
            next_steps: next_steps.into(),
            timestamp: Utc::now(),
        }
    }

    /// Decision for a round that produced no reviews.
    pub fn no_reviews() -> Self {
        Self::new(
            DecisionAction::Continue,
            "No reviews to evaluate",
            "Continue monitoring",
        )
    }
}

impl fmt::Display for OrchestratorDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.action, self.reason)
    }
}

/// Apply the fixed-precedence rule set to a round's reviews.
pub fn reduce_verdicts(reviews: &[PeerReview]) -> OrchestratorDecision {
    let count = |verdict: Verdict| reviews.iter().filter(|r| r.verdict == verdict).count();
    let blockers = count(Verdict::Blocker);
    let concerns = count(Verdict::Concerns);
    let approved = count(Verdict::Approved);

    if blockers > 0 {
        OrchestratorDecision::new(
            DecisionAction::StopAndEscalate,
            format!("{} blocker(s) detected", blockers),
            "Present issue to user, await decision",
        )
    } else if concerns >= 2 {
        OrchestratorDecision::new(
            DecisionAction::PauseAndClarify,
            "Majority have concerns",
            "Orchestrator clarifies requirements, agents resume",
        )
    } else if concerns == 1 {
        OrchestratorDecision::new(
            DecisionAction::LogWarning,
            "One agent has concerns",
            "Continue but monitor closely, review again in 10 min",
        )
    } else if !reviews.is_empty() && approved == reviews.len() {
        OrchestratorDecision::new(
            DecisionAction::Continue,
            "All reviews positive",
            "Continue work, next review on event trigger",
        )
    } else {
        OrchestratorDecision::new(
            DecisionAction::LogWarning,
            "Mixed or unclear review results",
            "Continue with caution",
        )
    }
}
