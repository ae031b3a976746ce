//! Event model shared by every part of the supervisor.
//!
//! Workers emit newline-delimited JSON status records. Once decoded (see
//! [`crate::stream`]) each record becomes an [`Event`] tagged with the
//! [`Role`] of the worker that produced it.
//!
//! ## Example
//!
//! ```
//! use triad::event::{Event, EventKind, Role};
//!
//! let event = Event::new(Role::Architect, EventKind::Progress, "Designing schema")
//!     .with_progress(140);
//!
//! // Progress is clamped into 0..=100
//! assert_eq!(event.payload.progress, Some(100));
//! assert!(event.text_contains("schema"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One of the three fixed worker identities.
///
/// The set is closed: there is no dynamic registration. The aliases accept
/// the names of the agent binaries that fill each role by default.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Designs the architecture (gemini by default)
    #[serde(alias = "gemini")]
    Architect,
    /// Writes the code (claude by default)
    #[serde(alias = "claude")]
    Implementer,
    /// Reviews and solves focused problems (codex by default)
    #[serde(alias = "codex")]
    Reviewer,
}

impl Role {
    /// All roles in launch order.
    pub const ALL: [Role; 3] = [Role::Architect, Role::Implementer, Role::Reviewer];

    /// Stable lowercase name, used for file names and map keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Architect => "architect",
            Role::Implementer => "implementer",
            Role::Reviewer => "reviewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "architect" | "gemini" => Ok(Role::Architect),
            "implementer" | "claude" => Ok(Role::Implementer),
            "reviewer" | "codex" => Ok(Role::Reviewer),
            _ => anyhow::bail!(
                "Invalid role '{}'. Valid values: architect, implementer, reviewer",
                s
            ),
        }
    }
}

/// Closed set of event kinds a worker may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Status,
    Progress,
    Finding,
    Task,
    Blocker,
    Milestone,
    Review,
    Error,
    Recovery,
    PermissionBlocker,
}

impl EventKind {
    /// Parse a wire name. Unknown names yield `None`; callers must not
    /// substitute a default kind.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "status" => Some(Self::Status),
            "progress" => Some(Self::Progress),
            "finding" => Some(Self::Finding),
            "task" => Some(Self::Task),
            "blocker" => Some(Self::Blocker),
            "milestone" => Some(Self::Milestone),
            "review" => Some(Self::Review),
            "error" => Some(Self::Error),
            "recovery" => Some(Self::Recovery),
            "permission_blocker" => Some(Self::PermissionBlocker),
            _ => None,
        }
    }

    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Progress => "progress",
            Self::Finding => "finding",
            Self::Task => "task",
            Self::Blocker => "blocker",
            Self::Milestone => "milestone",
            Self::Review => "review",
            Self::Error => "error",
            Self::Recovery => "recovery",
            Self::PermissionBlocker => "permission_blocker",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload carried by every event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    /// Display text, never empty
    pub text: String,
    /// Completion percentage, always within 0..=100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// File the event refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Structured extra data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl EventPayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            progress: None,
            file: None,
            data: None,
        }
    }
}

/// A single timestamped status update from a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(role: Role, kind: EventKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            role,
            timestamp: Utc::now(),
            payload: EventPayload::new(text),
        }
    }

    /// Set the progress percentage, clamped to 100.
    pub fn with_progress(mut self, progress: u32) -> Self {
        self.payload.progress = Some(clamp_progress(progress as f64));
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.payload.file = Some(file.into());
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.payload.data = Some(data);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn text(&self) -> &str {
        &self.payload.text
    }

    /// Case-insensitive substring check on the display text.
    pub fn text_contains(&self, needle: &str) -> bool {
        self.payload
            .text
            .to_lowercase()
            .contains(&needle.to_lowercase())
    }

    /// Serialize as one audit-trail line (no trailing newline).
    pub fn to_record(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.role.as_str().to_uppercase(),
            self.kind.as_str().to_uppercase(),
            self.payload.text
        )
    }
}

/// Clamp an arbitrary numeric progress value into 0..=100.
pub fn clamp_progress(value: f64) -> u8 {
    if value.is_nan() || value <= 0.0 {
        0
    } else if value >= 100.0 {
        100
    } else {
        value.round() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(
            serde_json::to_string(&Role::Architect).unwrap(),
            r#""architect""#
        );
        let parsed: Role = serde_json::from_str(r#""codex""#).unwrap();
        assert_eq!(parsed, Role::Reviewer);
    }

    #[test]
    fn test_role_from_str_accepts_agent_names() {
        assert_eq!("gemini".parse::<Role>().unwrap(), Role::Architect);
        assert_eq!("Claude".parse::<Role>().unwrap(), Role::Implementer);
        assert_eq!("reviewer".parse::<Role>().unwrap(), Role::Reviewer);
        assert!("scheduler".parse::<Role>().is_err());
    }

    #[test]
    fn test_event_kind_wire_names() {
        for kind in [
            EventKind::Status,
            EventKind::Progress,
            EventKind::Finding,
            EventKind::Task,
            EventKind::Blocker,
            EventKind::Milestone,
            EventKind::Review,
            EventKind::Error,
            EventKind::Recovery,
            EventKind::PermissionBlocker,
        ] {
            assert_eq!(EventKind::from_wire(kind.as_str()), Some(kind));
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
        assert_eq!(EventKind::from_wire("heartbeat"), None);
    }

    #[test]
    fn test_clamp_progress() {
        assert_eq!(clamp_progress(-5.0), 0);
        assert_eq!(clamp_progress(42.4), 42);
        assert_eq!(clamp_progress(250.0), 100);
        assert_eq!(clamp_progress(f64::NAN), 0);
    }

    #[test]
    fn test_text_contains_is_case_insensitive() {
        let event = Event::new(Role::Implementer, EventKind::Status, "Build DONE");
        assert!(event.text_contains("done"));
        assert!(!event.text_contains("complete"));
    }

    #[test]
    fn test_payload_skips_empty_fields() {
        let event = Event::new(Role::Reviewer, EventKind::Finding, "ok");
        let json = event.to_record().unwrap();
        assert!(json.contains(r#""kind":"finding""#));
        assert!(!json.contains("progress"));
        assert!(!json.contains("file"));
    }

    #[test]
    fn test_display_format() {
        let event = Event::new(Role::Architect, EventKind::Milestone, "Design ready");
        assert_eq!(event.to_string(), "[ARCHITECT] MILESTONE: Design ready");
    }
}
