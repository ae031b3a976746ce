//! Cross-worker peer review.
//!
//! The [`ReviewEngine`] decides when a review round is due, builds a short
//! progress summary per role as review context, collects one verdict per
//! (reviewer, target) pair from a [`VerdictSource`], and reduces them to an
//! [`OrchestratorDecision`] (see [`arbiter`]).
//!
//! ## Components
//!
//! - [`arbiter`]: fixed-precedence decision reduction
//! - [`verdict`]: verdict sources and review-text parsing
//!
//! ## Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use triad::event::{Event, EventKind, Role};
//! use triad::review::{ReviewEngine, ReviewPolicy, ReviewTrigger};
//!
//! let started = chrono::Utc::now();
//! let engine = ReviewEngine::new(ReviewPolicy::default(), started);
//!
//! let mut pending = BTreeMap::new();
//! pending.insert(
//!     Role::Architect,
//!     vec![Event::new(Role::Architect, EventKind::Milestone, "Design ready")],
//! );
//! assert_eq!(
//!     engine.should_trigger_review(&pending, false, started),
//!     Some(ReviewTrigger::Milestone)
//! );
//! ```

pub mod arbiter;
pub mod verdict;

pub use arbiter::{DecisionAction, OrchestratorDecision, reduce_verdicts};
pub use verdict::{HeuristicVerdictSource, VerdictSource, parse_review_text};

use crate::event::{Event, EventKind, Role};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

/// Default minutes without a review before one is forced.
pub const DEFAULT_FALLBACK_MINUTES: u64 = 15;
/// Longest accepted fallback interval (one week).
pub const MAX_FALLBACK_MINUTES: u64 = 7 * 24 * 60;
/// Default word limit asked of reviewers.
pub const DEFAULT_MAX_WORDS: usize = 200;

/// Who reviews whom in every round, with the review focus.
pub const REVIEW_PAIRS: [(Role, Role, &str); 3] = [
    (
        Role::Architect,
        Role::Implementer,
        "Review the implementation for quality, correctness, and adherence to architecture",
    ),
    (
        Role::Reviewer,
        Role::Architect,
        "Review the architecture for potential issues and design flaws",
    ),
    (
        Role::Reviewer,
        Role::Implementer,
        "Review the implementation for bugs and quality issues",
    ),
];

/// Peer verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approved,
    Concerns,
    Blocker,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Approved => "approved",
            Verdict::Concerns => "concerns",
            Verdict::Blocker => "blocker",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reviewer's assessment of one target. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerReview {
    pub reviewer: Role,
    pub target: Role,
    pub verdict: Verdict,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl PeerReview {
    pub fn new(reviewer: Role, target: Role, verdict: Verdict) -> Self {
        Self {
            reviewer,
            target,
            verdict,
            issues: Vec::new(),
            recommendations: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_issues(mut self, issues: Vec<String>) -> Self {
        self.issues = issues;
        self
    }

    pub fn with_recommendations(mut self, recommendations: Vec<String>) -> Self {
        self.recommendations = recommendations;
        self
    }
}

/// What a reviewer is asked to assess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub reviewer: Role,
    pub target: Role,
    pub focus: String,
    /// Work summary per role
    pub context: BTreeMap<Role, String>,
    pub max_words: usize,
}

impl ReviewRequest {
    pub fn new(reviewer: Role, target: Role, focus: impl Into<String>) -> Self {
        Self {
            reviewer,
            target,
            focus: focus.into(),
            context: BTreeMap::new(),
            max_words: DEFAULT_MAX_WORDS,
        }
    }

    pub fn with_context(mut self, context: BTreeMap<Role, String>) -> Self {
        self.context = context;
        self
    }

    pub fn with_max_words(mut self, max_words: usize) -> Self {
        self.max_words = max_words;
        self
    }
}

/// Why a review round started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewTrigger {
    Forced,
    Milestone,
    Blocker,
    /// An event's text asked for a review
    Requested,
    /// Too long since the last round
    Fallback,
}

/// Review timing and sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewPolicy {
    pub fallback: Duration,
    pub max_words: usize,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            fallback: Duration::minutes(DEFAULT_FALLBACK_MINUTES as i64),
            max_words: DEFAULT_MAX_WORDS,
        }
    }
}

/// Reviews and decision of one round.
#[derive(Debug, Clone)]
pub struct ReviewRound {
    pub reviews: Vec<PeerReview>,
    pub decision: OrchestratorDecision,
}

/// Schedules and runs review rounds.
pub struct ReviewEngine {
    policy: ReviewPolicy,
    last_review: DateTime<Utc>,
    source: Box<dyn VerdictSource>,
}

impl ReviewEngine {
    /// Engine using the heuristic verdict source. The fallback clock starts
    /// at `started_at`.
    pub fn new(policy: ReviewPolicy, started_at: DateTime<Utc>) -> Self {
        Self {
            policy,
            last_review: started_at,
            source: Box::new(HeuristicVerdictSource),
        }
    }

    pub fn with_source(mut self, source: Box<dyn VerdictSource>) -> Self {
        self.source = source;
        self
    }

    pub fn last_review(&self) -> DateTime<Utc> {
        self.last_review
    }

    /// Decide whether a round is due for the pending events.
    pub fn should_trigger_review(
        &self,
        pending: &BTreeMap<Role, Vec<Event>>,
        force: bool,
        now: DateTime<Utc>,
    ) -> Option<ReviewTrigger> {
        if force {
            return Some(ReviewTrigger::Forced);
        }
        for event in pending.values().flatten() {
            match event.kind {
                EventKind::Milestone => return Some(ReviewTrigger::Milestone),
                EventKind::Blocker => return Some(ReviewTrigger::Blocker),
                _ if event.text_contains("review") => return Some(ReviewTrigger::Requested),
                _ => {}
            }
        }
        if now - self.last_review > self.policy.fallback {
            return Some(ReviewTrigger::Fallback);
        }
        None
    }

    /// Work summary per role.
    pub fn build_context(pending: &BTreeMap<Role, Vec<Event>>) -> BTreeMap<Role, String> {
        Role::ALL
            .iter()
            .map(|role| {
                let events = pending.get(role).map(Vec::as_slice).unwrap_or(&[]);
                (*role, summarize_work(events))
            })
            .collect()
    }

    /// Run one round over the pending events and reduce it to a decision.
    pub async fn conduct_round(
        &mut self,
        pending: &BTreeMap<Role, Vec<Event>>,
        now: DateTime<Utc>,
    ) -> ReviewRound {
        let context = Self::build_context(pending);
        let mut reviews = Vec::with_capacity(REVIEW_PAIRS.len());

        for (reviewer, target, focus) in REVIEW_PAIRS {
            let request = ReviewRequest::new(reviewer, target, focus)
                .with_context(context.clone())
                .with_max_words(self.policy.max_words);
            let target_events = pending.get(&target).map(Vec::as_slice).unwrap_or(&[]);
            match self.source.review(&request, target_events).await {
                Ok(review) => {
                    info!(
                        reviewer = %review.reviewer,
                        target = %review.target,
                        verdict = %review.verdict,
                        "Peer review"
                    );
                    reviews.push(review);
                }
                Err(e) => warn!(
                    reviewer = %reviewer,
                    target = %target,
                    source = self.source.name(),
                    error = %e,
                    "Verdict source failed, skipping pair"
                ),
            }
        }

        self.last_review = now;
        let decision = if reviews.is_empty() {
            OrchestratorDecision::no_reviews()
        } else {
            reduce_verdicts(&reviews)
        };
        ReviewRound { reviews, decision }
    }
}

/// Condense a role's events into one line of review context.
pub fn summarize_work(events: &[Event]) -> String {
    if events.is_empty() {
        return "No activity yet".to_string();
    }

    let mut parts = Vec::new();
    for (kind, label, noun) in [
        (EventKind::Milestone, "Completed", "milestone"),
        (EventKind::Task, "Working on", "task"),
        (EventKind::Finding, "Found", "finding"),
    ] {
        let matching: Vec<&Event> = events.iter().filter(|e| e.kind == kind).collect();
        if let Some(last) = matching.last() {
            parts.push(format!(
                "{} {} {}(s): {}",
                label,
                matching.len(),
                noun,
                last.text()
            ));
        }
    }
    if let Some(p) = events.iter().rev().find_map(|e| e.payload.progress) {
        parts.push(format!("Progress: {}%", p));
    }

    if parts.is_empty() {
        "Working...".to_string()
    } else {
        parts.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSource;

    #[async_trait::async_trait]
    impl VerdictSource for FailingSource {
        async fn review(&self, _: &ReviewRequest, _: &[Event]) -> anyhow::Result<PeerReview> {
            anyhow::bail!("agent unavailable")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn pending(role: Role, events: Vec<Event>) -> BTreeMap<Role, Vec<Event>> {
        let mut map = BTreeMap::new();
        map.insert(role, events);
        map
    }

    #[test]
    fn test_trigger_conditions() {
        let start = Utc::now();
        let engine = ReviewEngine::new(ReviewPolicy::default(), start);

        assert_eq!(
            engine.should_trigger_review(&BTreeMap::new(), true, start),
            Some(ReviewTrigger::Forced)
        );
        assert_eq!(
            engine.should_trigger_review(
                &pending(Role::Implementer, vec![Event::new(Role::Implementer, EventKind::Blocker, "x")]),
                false,
                start
            ),
            Some(ReviewTrigger::Blocker)
        );
        assert_eq!(
            engine.should_trigger_review(
                &pending(Role::Reviewer, vec![Event::new(Role::Reviewer, EventKind::Status, "Ready for REVIEW")]),
                false,
                start
            ),
            Some(ReviewTrigger::Requested)
        );
        assert_eq!(
            engine.should_trigger_review(
                &pending(Role::Reviewer, vec![Event::new(Role::Reviewer, EventKind::Progress, "busy")]),
                false,
                start
            ),
            None
        );
    }

    #[test]
    fn test_fallback_trigger() {
        let start = Utc::now();
        let engine = ReviewEngine::new(ReviewPolicy::default(), start);
        assert_eq!(
            engine.should_trigger_review(&BTreeMap::new(), false, start + Duration::minutes(15)),
            None
        );
        assert_eq!(
            engine.should_trigger_review(
                &BTreeMap::new(),
                false,
                start + Duration::minutes(15) + Duration::seconds(1)
            ),
            Some(ReviewTrigger::Fallback)
        );
    }

    #[test]
    fn test_summarize_work() {
        assert_eq!(summarize_work(&[]), "No activity yet");
        assert_eq!(
            summarize_work(&[Event::new(Role::Architect, EventKind::Status, "hi")]),
            "Working..."
        );

        let events = vec![
            Event::new(Role::Architect, EventKind::Milestone, "m1"),
            Event::new(Role::Architect, EventKind::Task, "t1"),
            Event::new(Role::Architect, EventKind::Milestone, "m2").with_progress(40),
            Event::new(Role::Architect, EventKind::Finding, "f1"),
        ];
        assert_eq!(
            summarize_work(&events),
            "Completed 2 milestone(s): m2 | Working on 1 task(s): t1 | Found 1 finding(s): f1 | Progress: 40%"
        );
    }

    #[test]
    fn test_build_context_covers_every_role() {
        let context = ReviewEngine::build_context(&pending(
            Role::Implementer,
            vec![Event::new(Role::Implementer, EventKind::Task, "api")],
        ));
        assert_eq!(context.len(), 3);
        assert_eq!(context[&Role::Architect], "No activity yet");
        assert_eq!(context[&Role::Implementer], "Working on 1 task(s): api");
    }

    #[tokio::test]
    async fn test_round_with_blocker_escalates() {
        let start = Utc::now();
        let mut engine = ReviewEngine::new(ReviewPolicy::default(), start);
        let later = start + Duration::minutes(1);
        let round = engine
            .conduct_round(
                &pending(
                    Role::Implementer,
                    vec![Event::new(Role::Implementer, EventKind::Blocker, "no db")],
                ),
                later,
            )
            .await;

        assert_eq!(round.reviews.len(), 3);
        // architect->implementer and reviewer->implementer both see the blocker
        assert_eq!(
            round.reviews.iter().filter(|r| r.verdict == Verdict::Blocker).count(),
            2
        );
        assert_eq!(round.decision.action, DecisionAction::StopAndEscalate);
        assert_eq!(round.decision.reason, "2 blocker(s) detected");
        assert_eq!(engine.last_review(), later);
    }

    #[tokio::test]
    async fn test_round_all_quiet_continues() {
        let mut engine = ReviewEngine::new(ReviewPolicy::default(), Utc::now());
        let round = engine.conduct_round(&BTreeMap::new(), Utc::now()).await;
        assert_eq!(round.decision.action, DecisionAction::Continue);
        assert_eq!(round.decision.reason, "All reviews positive");
    }

    #[tokio::test]
    async fn test_round_without_reviews() {
        let mut engine = ReviewEngine::new(ReviewPolicy::default(), Utc::now())
            .with_source(Box::new(FailingSource));
        let round = engine.conduct_round(&BTreeMap::new(), Utc::now()).await;
        assert!(round.reviews.is_empty());
        assert_eq!(round.decision.reason, "No reviews to evaluate");
        assert_eq!(round.decision.next_steps, "Continue monitoring");
    }

    #[test]
    fn test_peer_review_serialization() {
        let review = PeerReview::new(Role::Reviewer, Role::Architect, Verdict::Concerns)
            .with_issues(vec!["naming".to_string()]);
        let json = serde_json::to_string(&review).unwrap();
        assert!(json.contains(r#""verdict":"concerns""#));
        assert!(json.contains(r#""reviewer":"reviewer""#));
        let back: PeerReview = serde_json::from_str(&json).unwrap();
        assert_eq!(back, review);
    }
}
