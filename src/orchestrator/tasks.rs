//! Splits a user task into one assignment per role and renders the prompt
//! each worker is launched with.

use crate::event::Role;
use crate::worker::RoleProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Expected effort of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Complexity {
    Low,
    High,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Low => "LOW",
            Complexity::High => "HIGH",
        }
    }
}

/// Work handed to one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub role: Role,
    pub title: String,
    pub responsibilities: Vec<String>,
    pub deliverables: Vec<String>,
    pub complexity: Complexity,
    pub estimated_tokens: String,
}

/// All three assignments for one user task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBreakdown {
    pub user_prompt: String,
    pub assignments: BTreeMap<Role, TaskAssignment>,
}

impl TaskBreakdown {
    pub fn assignment(&self, role: Role) -> Option<&TaskAssignment> {
        self.assignments.get(&role)
    }

    /// Launch prompt for `role`, empty if the role has no assignment.
    pub fn prompt_for(&self, role: Role) -> String {
        self.assignment(role)
            .map(|a| format_prompt(a, &self.user_prompt))
            .unwrap_or_default()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn assignment_for(role: Role) -> TaskAssignment {
    let (responsibilities, deliverables, complexity, estimated_tokens) = match role {
        Role::Architect => (
            strings(&[
                "Analyze the codebase structure and its dependencies",
                "Design the architecture and system changes",
                "Write a technical specification for the implementer",
                "Identify affected components and integration points",
                "Point out optimization and refactoring opportunities",
                "Document design decisions",
            ]),
            strings(&[
                "Architecture design document",
                "Component interaction overview",
                "Implementation specification",
                "List of files to create or modify",
                "API contracts and interfaces",
            ]),
            Complexity::High,
            "8000-10000",
        ),
        Role::Implementer => (
            strings(&[
                "Implement the code described by the architect's design",
                "Write production code and its tests",
                "Create, modify and delete files as needed",
                "Integrate components according to the specification",
                "Run build, test and validation commands",
                "Carry out larger refactorings",
            ]),
            strings(&[
                "Production code",
                "Test suites",
                "Integration code",
                "Build and test results",
                "Refactored code where needed",
            ]),
            Complexity::High,
            "8000-10000",
        ),
        Role::Reviewer => (
            strings(&[
                "Review the architect's design for potential issues",
                "Review the implementation for bugs and quality problems",
                "Validate integration points",
                "Solve specific, well-defined technical problems",
                "Give focused feedback and recommendations",
            ]),
            strings(&[
                "Short review reports (200 words max)",
                "Solutions to specific problems",
                "Validation results",
                "Integration checks",
            ]),
            Complexity::Low,
            "2000-3000",
        ),
    };

    TaskAssignment {
        role,
        title: RoleProfile::for_role(role).title.to_string(),
        responsibilities,
        deliverables,
        complexity,
        estimated_tokens: estimated_tokens.to_string(),
    }
}

/// Break a user task into the three role assignments.
pub fn decompose_task(user_prompt: &str) -> TaskBreakdown {
    TaskBreakdown {
        user_prompt: user_prompt.to_string(),
        assignments: Role::ALL.iter().map(|r| (*r, assignment_for(*r))).collect(),
    }
}

/// Render the launch prompt, including the event protocol the supervisor
/// reads back from the worker's stdout.
pub fn format_prompt(assignment: &TaskAssignment, user_prompt: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("TASK: {}\n\n", assignment.title));
    prompt.push_str(&format!("USER REQUEST: {}\n\n", user_prompt));

    prompt.push_str("RESPONSIBILITIES:\n");
    for item in &assignment.responsibilities {
        prompt.push_str(&format!("- {}\n", item));
    }
    prompt.push('\n');

    prompt.push_str("DELIVERABLES:\n");
    for item in &assignment.deliverables {
        prompt.push_str(&format!("- {}\n", item));
    }
    prompt.push('\n');

    prompt.push_str(&format!(
        "COMPLEXITY: {}\nESTIMATED TOKENS: {}\n\n",
        assignment.complexity.as_str(),
        assignment.estimated_tokens
    ));

    prompt.push_str("Emit one JSON event per line to report progress:\n");
    prompt.push_str(
        r#"- {"type": "milestone", "payload": {"text": "Major phase complete"}}"#,
    );
    prompt.push('\n');
    prompt.push_str(
        r#"- {"type": "progress", "payload": {"text": "Working...", "progress": 50}}"#,
    );
    prompt.push('\n');
    prompt.push_str(r#"- {"type": "blocker", "payload": {"text": "Blocked on X"}}"#);
    prompt.push('\n');
    prompt.push_str(r#"- {"type": "finding", "payload": {"text": "Discovered Y"}}"#);
    prompt.push_str("\n\nBegin work now.");
    prompt
}
