//! Condensed, serializable view of a session for status output and the
//! control API.

use super::{SessionState, Status};
use crate::event::Role;
use crate::recovery::RecoveryAction;
use crate::review::DecisionAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub status: Status,
    pub progress: u8,
    pub error_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionSummary {
    pub action: DecisionAction,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReviewSummary {
    pub total: usize,
    pub by_reviewer: BTreeMap<String, usize>,
    pub by_verdict: BTreeMap<String, usize>,
    pub decisions: Vec<DecisionSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RecoverySummary {
    pub total: usize,
    pub by_role: BTreeMap<String, usize>,
    pub by_issue: BTreeMap<String, usize>,
    pub actions: Vec<RecoveryAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub user_prompt: String,
    pub started_at: DateTime<Utc>,
    pub complete: bool,
    pub workers: BTreeMap<Role, WorkerSummary>,
    pub reviews: ReviewSummary,
    pub recoveries: RecoverySummary,
    pub decision_count: usize,
}

fn tally<'a>(keys: impl Iterator<Item = &'a str>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for key in keys {
        *counts.entry(key.to_string()).or_insert(0) += 1;
    }
    counts
}

impl SessionSummary {
    pub fn from_state(state: &SessionState) -> Self {
        let workers = state
            .workers
            .iter()
            .map(|(role, w)| {
                (
                    *role,
                    WorkerSummary {
                        status: w.status,
                        progress: w.progress,
                        error_count: w.error_count,
                    },
                )
            })
            .collect();

        let reviews = ReviewSummary {
            total: state.reviews.len(),
            by_reviewer: tally(state.reviews.iter().map(|r| r.reviewer.as_str())),
            by_verdict: tally(state.reviews.iter().map(|r| r.verdict.as_str())),
            decisions: state
                .decisions
                .iter()
                .map(|d| DecisionSummary {
                    action: d.action,
                    reason: d.reason.clone(),
                    timestamp: d.timestamp,
                })
                .collect(),
        };

        let recoveries = RecoverySummary {
            total: state.recoveries.len(),
            by_role: tally(state.recoveries.iter().map(|r| r.role.as_str())),
            by_issue: tally(state.recoveries.iter().map(|r| r.issue.as_str())),
            actions: state.recoveries.clone(),
        };

        Self {
            session_id: state.session_id.clone(),
            user_prompt: state.user_prompt.clone(),
            started_at: state.started_at,
            complete: state.complete,
            workers,
            reviews,
            recoveries,
            decision_count: state.decisions.len(),
        }
    }
}
