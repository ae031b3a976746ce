//! Typed error hierarchy for the triad supervisor.
//!
//! Four enums cover the subsystems that can fail in a way callers need to
//! match on:
//! - `IngestError` - stream file I/O while reading worker output
//! - `EnvironmentError` - directory preparation before a worker launches
//! - `SupervisionError` - spawning, signalling and relaunching processes
//! - `SessionError` - session start and control-surface lookups
//!
//! Malformed worker output is not an error here: it is recovered in-band as
//! a synthetic `error` event.

use crate::event::Role;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from reading a worker's output stream.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to open stream file at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read stream file at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from preparing a worker's directories. Always fatal.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("Failed to create directory {path}: {source}")]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory {path} is still not read/write accessible after fixing permissions")]
    Inaccessible { path: PathBuf },
}

/// Errors from supervising worker processes.
#[derive(Debug, Error)]
pub enum SupervisionError {
    #[error("Failed to spawn {role} worker '{command}': {source}")]
    SpawnFailed {
        role: Role,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open output stream for {role} worker at {path}: {source}")]
    StreamSetupFailed {
        role: Role,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to stop {role} worker: {source}")]
    StopFailed {
        role: Role,
        #[source]
        source: std::io::Error,
    },

    #[error("Relaunch of {role} worker failed: {message}")]
    RelaunchFailed { role: Role, message: String },

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// Errors from starting or addressing a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session {id} not found")]
    NotFound { id: String },

    #[error("Environment preparation failed for {role}: {source}")]
    Environment {
        role: Role,
        #[source]
        source: EnvironmentError,
    },

    #[error("Failed to launch {role} worker: {source}")]
    LaunchFailed {
        role: Role,
        #[source]
        source: SupervisionError,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_error_carries_path() {
        let path = PathBuf::from("/tmp/streams/architect.jsonl");
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = IngestError::OpenFailed {
            path: path.clone(),
            source: io_err,
        };
        match &err {
            IngestError::OpenFailed { path: p, .. } => assert_eq!(p, &path),
            _ => panic!("Expected OpenFailed variant"),
        }
        assert!(err.to_string().contains("architect.jsonl"));
    }

    #[test]
    fn environment_error_inaccessible_message() {
        let err = EnvironmentError::Inaccessible {
            path: PathBuf::from("/locked"),
        };
        assert!(err.to_string().contains("/locked"));
        assert!(err.to_string().contains("not read/write accessible"));
    }

    #[test]
    fn supervision_error_spawn_failed_is_matchable() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gemini not found");
        let err = SupervisionError::SpawnFailed {
            role: Role::Architect,
            command: "gemini".to_string(),
            source: io_err,
        };
        match &err {
            SupervisionError::SpawnFailed { role, source, .. } => {
                assert_eq!(*role, Role::Architect);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            _ => panic!("Expected SpawnFailed variant"),
        }
    }

    #[test]
    fn session_error_wraps_environment_error() {
        let err = SessionError::Environment {
            role: Role::Reviewer,
            source: EnvironmentError::Inaccessible {
                path: PathBuf::from("/target"),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("reviewer"));
        assert!(msg.contains("/target"));
    }

    #[test]
    fn session_error_not_found() {
        let err = SessionError::NotFound {
            id: "orch_1".to_string(),
        };
        assert_eq!(err.to_string(), "Session orch_1 not found");
    }

    #[test]
    fn session_error_from_anyhow() {
        let err: SessionError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, SessionError::Other(_)));
    }
}
