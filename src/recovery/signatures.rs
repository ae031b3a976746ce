//! Known failure phrasings per role. Each
//! [`RoleProfile`](crate::worker::RoleProfile) points at one
//! of these tables.
//!
//! Each table is checked in order and the first match wins, so the
//! role-specific signatures come before the generic permission one.

use super::IssueKind;
use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug)]
pub struct Signature {
    pub pattern: Regex,
    pub issue: IssueKind,
}

fn signature(pattern: &str, issue: IssueKind) -> Signature {
    Signature {
        pattern: Regex::new(&format!("(?i){}", pattern)).unwrap(),
        issue,
    }
}

pub static ARCHITECT_SIGNATURES: LazyLock<Vec<Signature>> = LazyLock::new(|| {
    vec![
        signature(
            r"(file )?path must be within one of the workspace directories",
            IssueKind::WorkspacePermission,
        ),
        signature(r"permission denied", IssueKind::GenericPermission),
    ]
});

pub static REVIEWER_SIGNATURES: LazyLock<Vec<Signature>> = LazyLock::new(|| {
    vec![
        signature(r"not inside a trusted directory", IssueKind::EnvironmentCheck),
        signature(r"not a git repository", IssueKind::EnvironmentCheck),
        signature(r"repository check failed", IssueKind::EnvironmentCheck),
        signature(r"permission denied", IssueKind::GenericPermission),
    ]
});

pub static IMPLEMENTER_SIGNATURES: LazyLock<Vec<Signature>> =
    LazyLock::new(|| vec![signature(r"permission denied", IssueKind::GenericPermission)]);
