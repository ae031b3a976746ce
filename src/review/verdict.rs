//! Pluggable verdict sources.
//!
//! A [`VerdictSource`] answers one [`ReviewRequest`]: a reviewer role's
//! assessment of a target role's recent work. The default
//! [`HeuristicVerdictSource`] judges from the target's event stream alone.
//! Sources that obtain free-form text (for example by asking the reviewer
//! agent) can turn it into a [`PeerReview`] with [`parse_review_text`].

use super::{PeerReview, ReviewRequest, Verdict};
use crate::event::{Event, EventKind, Role};
use async_trait::async_trait;

/// Issues copied from the target's stream into a review.
const MAX_ISSUES: usize = 3;

/// Produces one peer review per request.
#[async_trait]
pub trait VerdictSource: Send + Sync {
    /// Review `target_events`, the target's pending events.
    async fn review(
        &self,
        request: &ReviewRequest,
        target_events: &[Event],
    ) -> anyhow::Result<PeerReview>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Judges a target by the blockers and errors in its stream.
///
/// - any `blocker` event: **blocker**, first three blocker texts as issues
/// - three or more `error` events: **concerns**, first three error texts
/// - two `error` events: **concerns**, both texts
/// - otherwise: **approved**
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicVerdictSource;

impl HeuristicVerdictSource {
    pub fn judge(reviewer: Role, target: Role, target_events: &[Event]) -> PeerReview {
        let texts = |kind: EventKind| -> Vec<String> {
            target_events
                .iter()
                .filter(|e| e.kind == kind)
                .map(|e| e.text().to_string())
                .collect()
        };
        let blockers = texts(EventKind::Blocker);
        let errors = texts(EventKind::Error);

        if !blockers.is_empty() {
            PeerReview::new(reviewer, target, Verdict::Blocker)
                .with_issues(blockers.into_iter().take(MAX_ISSUES).collect())
                .with_recommendations(vec![
                    "Address blocker issues before continuing".to_string(),
                ])
        } else if errors.len() >= 3 {
            PeerReview::new(reviewer, target, Verdict::Concerns)
                .with_issues(errors.into_iter().take(MAX_ISSUES).collect())
                .with_recommendations(vec!["Investigate and fix error patterns".to_string()])
        } else if errors.len() == 2 {
            PeerReview::new(reviewer, target, Verdict::Concerns)
                .with_issues(errors)
                .with_recommendations(vec!["Monitor error patterns".to_string()])
        } else {
            PeerReview::new(reviewer, target, Verdict::Approved)
        }
    }
}

#[async_trait]
impl VerdictSource for HeuristicVerdictSource {
    async fn review(
        &self,
        request: &ReviewRequest,
        target_events: &[Event],
    ) -> anyhow::Result<PeerReview> {
        Ok(Self::judge(request.reviewer, request.target, target_events))
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Classify free-form review text by keyword.
///
/// "blocker" or "critical" makes a blocker, "concern" or "issue" makes
/// concerns, anything else is approved. Bullet lines (`- ` or `* `)
/// mentioning an issue or problem become issues; those recommending or
/// suggesting something become recommendations.
pub fn parse_review_text(reviewer: Role, target: Role, text: &str) -> PeerReview {
    let lower = text.to_lowercase();
    let verdict = if lower.contains("blocker") || lower.contains("critical") {
        Verdict::Blocker
    } else if lower.contains("concern") || lower.contains("issue") {
        Verdict::Concerns
    } else {
        Verdict::Approved
    };

    let mut issues = Vec::new();
    let mut recommendations = Vec::new();
    for line in text.lines().map(str::trim) {
        let Some(item) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) else {
            continue;
        };
        let item_lower = item.to_lowercase();
        if item_lower.contains("issue") || item_lower.contains("problem") {
            issues.push(item.to_string());
        } else if item_lower.contains("recommend") || item_lower.contains("suggest") {
            recommendations.push(item.to_string());
        }
    }

    PeerReview::new(reviewer, target, verdict)
        .with_issues(issues)
        .with_recommendations(recommendations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(kind: EventKind, text: &str) -> Event {
        Event::new(Role::Implementer, kind, text)
    }

    #[test]
    fn test_blocker_event_gives_blocker() {
        let events = vec![
            ev(EventKind::Error, "e1"),
            ev(EventKind::Blocker, "b1"),
            ev(EventKind::Blocker, "b2"),
            ev(EventKind::Blocker, "b3"),
            ev(EventKind::Blocker, "b4"),
        ];
        let review = HeuristicVerdictSource::judge(Role::Architect, Role::Implementer, &events);
        assert_eq!(review.verdict, Verdict::Blocker);
        assert_eq!(review.issues, vec!["b1", "b2", "b3"]);
        assert_eq!(
            review.recommendations,
            vec!["Address blocker issues before continuing"]
        );
    }

    #[test]
    fn test_many_errors_give_concerns() {
        let events: Vec<Event> = (1..=4).map(|i| ev(EventKind::Error, &format!("e{}", i))).collect();
        let review = HeuristicVerdictSource::judge(Role::Reviewer, Role::Implementer, &events);
        assert_eq!(review.verdict, Verdict::Concerns);
        assert_eq!(review.issues, vec!["e1", "e2", "e3"]);
    }

    #[test]
    fn test_two_errors_give_concerns() {
        let events = vec![ev(EventKind::Error, "a"), ev(EventKind::Error, "b")];
        let review = HeuristicVerdictSource::judge(Role::Reviewer, Role::Implementer, &events);
        assert_eq!(review.verdict, Verdict::Concerns);
        assert_eq!(review.recommendations, vec!["Monitor error patterns"]);
    }

    #[test]
    fn test_single_error_is_approved() {
        let events = vec![ev(EventKind::Error, "a"), ev(EventKind::Progress, "p")];
        let review = HeuristicVerdictSource::judge(Role::Reviewer, Role::Implementer, &events);
        assert_eq!(review.verdict, Verdict::Approved);
        assert!(review.issues.is_empty());
    }

    #[tokio::test]
    async fn test_heuristic_source_uses_request_roles() {
        let request = ReviewRequest::new(Role::Reviewer, Role::Architect, "focus");
        let review = HeuristicVerdictSource
            .review(&request, &[ev(EventKind::Blocker, "stuck")])
            .await
            .unwrap();
        assert_eq!(review.reviewer, Role::Reviewer);
        assert_eq!(review.target, Role::Architect);
        assert_eq!(review.verdict, Verdict::Blocker);
    }

    #[test]
    fn test_parse_review_text_verdicts() {
        let parse = |t: &str| parse_review_text(Role::Reviewer, Role::Implementer, t).verdict;
        assert_eq!(parse("CRITICAL: data loss on restart"), Verdict::Blocker);
        assert_eq!(parse("One blocker remains"), Verdict::Blocker);
        assert_eq!(parse("Minor concern about naming"), Verdict::Concerns);
        assert_eq!(parse("Looks good to me"), Verdict::Approved);
    }

    #[test]
    fn test_parse_review_text_bullets() {
        let text = "Some concerns:\n- Issue with error handling\n* Problem in retry loop\n- Recommend adding tests\n* I suggest renaming\n- unrelated bullet\nplain issue line";
        let review = parse_review_text(Role::Architect, Role::Implementer, text);
        assert_eq!(
            review.issues,
            vec!["Issue with error handling", "Problem in retry loop"]
        );
        assert_eq!(
            review.recommendations,
            vec!["Recommend adding tests", "I suggest renaming"]
        );
    }
}
