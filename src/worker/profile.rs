//! Per-role table: which agent binary fills each role, how its command
//! line is laid out and which failure signatures it is scanned for.

use super::LaunchConfig;
use crate::event::Role;
use crate::recovery::IssueKind;
use crate::recovery::signatures::{
    ARCHITECT_SIGNATURES, IMPLEMENTER_SIGNATURES, REVIEWER_SIGNATURES, Signature,
};
use std::sync::LazyLock;

/// Static description of one role.
#[derive(Debug)]
pub struct RoleProfile {
    pub role: Role,
    /// Binary used when no command override is configured
    pub default_command: &'static str,
    /// Human-readable title used in task prompts
    pub title: &'static str,
    /// Leading arguments, always passed
    pub base_args: &'static [&'static str],
    /// Flag repeated before each required directory
    pub dir_flag: Option<&'static str>,
    /// Flag that turns off the agent's own environment check
    pub skip_env_flag: Option<&'static str>,
    /// Flag that sets the agent's working directory
    pub working_dir_flag: Option<&'static str>,
    /// Arguments after the directory list
    pub trailing_args: &'static [&'static str],
    /// Failure phrasings, checked in order
    pub signatures: &'static LazyLock<Vec<Signature>>,
}

static PROFILES: [RoleProfile; 3] = [
    RoleProfile {
        role: Role::Architect,
        default_command: "gemini",
        title: "Architect & Planner",
        base_args: &["--yolo", "--output-format", "json"],
        dir_flag: Some("--include-directories"),
        skip_env_flag: None,
        working_dir_flag: None,
        trailing_args: &[],
        signatures: &ARCHITECT_SIGNATURES,
    },
    RoleProfile {
        role: Role::Implementer,
        default_command: "claude",
        title: "Implementation Engineer",
        base_args: &[
            "--print",
            "--dangerously-skip-permissions",
            "--strict-mcp-config",
        ],
        dir_flag: Some("--add-dir"),
        skip_env_flag: None,
        working_dir_flag: None,
        trailing_args: &["--output-format", "json"],
        signatures: &IMPLEMENTER_SIGNATURES,
    },
    RoleProfile {
        role: Role::Reviewer,
        default_command: "codex",
        title: "Code Reviewer & Problem Solver",
        base_args: &["exec", "--json", "--dangerously-bypass-approvals-and-sandbox"],
        dir_flag: None,
        skip_env_flag: Some("--skip-git-repo-check"),
        working_dir_flag: Some("-C"),
        trailing_args: &[],
        signatures: &REVIEWER_SIGNATURES,
    },
];

impl RoleProfile {
    pub fn for_role(role: Role) -> &'static RoleProfile {
        match role {
            Role::Architect => &PROFILES[0],
            Role::Implementer => &PROFILES[1],
            Role::Reviewer => &PROFILES[2],
        }
    }

    /// Arguments passed to the agent binary, prompt last.
    pub fn build_args(&self, config: &LaunchConfig, extra_args: &[String], prompt: &str) -> Vec<String> {
        let mut args: Vec<String> = self.base_args.iter().map(|a| a.to_string()).collect();
        if let Some(flag) = self.dir_flag {
            for dir in &config.required_dirs {
                args.push(flag.to_string());
                args.push(dir.display().to_string());
            }
        }
        if config.skip_env_check
            && let Some(flag) = self.skip_env_flag
        {
            args.push(flag.to_string());
        }
        if let Some(flag) = self.working_dir_flag {
            args.push(flag.to_string());
            args.push(config.working_dir.display().to_string());
        }
        args.extend(self.trailing_args.iter().map(|a| a.to_string()));
        args.extend(extra_args.iter().cloned());
        args.push(prompt.to_string());
        args
    }

    /// First signature matching `text`.
    pub fn detect(&self, text: &str) -> Option<IssueKind> {
        self.signatures
            .iter()
            .find(|sig| sig.pattern.is_match(text))
            .map(|sig| sig.issue)
    }
}
