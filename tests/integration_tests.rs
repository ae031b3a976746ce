//! Integration tests for Triad
//!
//! These tests drive the compiled binary against temporary project
//! directories and recorded session workspaces.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper to create a triad Command
fn triad() -> Command {
    cargo_bin_cmd!("triad")
}

/// Helper to create a temporary project directory
fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

/// Write a recorded session under `.triad/sessions/<id>` and return its path.
fn write_session(project: &Path, id: &str, events: &[(&str, Vec<String>)]) -> PathBuf {
    let workspace = project.join(".triad/sessions").join(id);
    fs::create_dir_all(workspace.join("events")).unwrap();
    fs::create_dir_all(workspace.join("reviews")).unwrap();
    let manifest = serde_json::json!({
        "session_id": id,
        "user_prompt": "Add a search endpoint",
        "target_dir": project,
        "support_dir": project.join(".triad"),
        "started_at": "2025-01-01T10:00:00Z"
    });
    fs::write(
        workspace.join("session.json"),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .unwrap();
    for (role, lines) in events {
        fs::write(
            workspace.join("events").join(format!("{}.jsonl", role)),
            lines.join("\n") + "\n",
        )
        .unwrap();
    }
    workspace
}

fn event(role: &str, kind: &str, text: &str, progress: Option<u8>) -> String {
    let mut payload = serde_json::json!({"text": text});
    if let Some(p) = progress {
        payload["progress"] = serde_json::json!(p);
    }
    serde_json::json!({
        "kind": kind,
        "role": role,
        "timestamp": "2025-01-01T10:05:00Z",
        "payload": payload
    })
    .to_string()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_triad_help() {
        triad()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"))
            .stdout(predicate::str::contains("status"));
    }

    #[test]
    fn test_triad_version() {
        triad().arg("--version").assert().success();
    }

    #[test]
    fn test_run_requires_prompt() {
        let dir = create_temp_project();
        triad()
            .current_dir(dir.path())
            .arg("run")
            .assert()
            .failure()
            .stderr(predicate::str::contains("--prompt"));
    }

    #[test]
    fn test_run_rejects_blank_prompt() {
        let dir = create_temp_project();
        triad()
            .current_dir(dir.path())
            .args(["run", "--prompt", "   ", "--no-server"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("must not be empty"));
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        triad()
            .args(["--log-format", "xml", "config"])
            .assert()
            .failure();
    }
}

// =============================================================================
// Configuration Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = create_temp_project();

        triad()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No triad.toml found"))
            .stdout(predicate::str::contains("poll_interval_secs = 5"))
            .stdout(predicate::str::contains("port = 8000"));
    }

    #[test]
    fn test_config_init_creates_toml() {
        let dir = create_temp_project();

        triad()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created triad.toml"));

        let path = dir.path().join(".triad/triad.toml");
        assert!(path.exists());
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("[supervisor]"));
    }

    #[test]
    fn test_config_init_does_not_overwrite() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".triad")).unwrap();
        fs::write(dir.path().join(".triad/triad.toml"), "[server]\nport = 9100\n").unwrap();

        triad()
            .current_dir(dir.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));

        let content = fs::read_to_string(dir.path().join(".triad/triad.toml")).unwrap();
        assert!(content.contains("9100"));
    }

    #[test]
    fn test_config_validate_no_config() {
        let dir = create_temp_project();

        triad()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Using defaults (valid)"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".triad")).unwrap();
        fs::write(
            dir.path().join(".triad/triad.toml"),
            "[supervisor]\npoll_interval_secs = 0\n\n[workers.designer]\ncommand = \"designer\"\n",
        )
        .unwrap();

        triad()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration warnings"))
            .stdout(predicate::str::contains("Unknown worker 'designer'"));
    }

    #[test]
    fn test_config_validate_with_valid_file() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".triad")).unwrap();
        fs::write(
            dir.path().join(".triad/triad.toml"),
            "[workers.reviewer]\ncommand = \"codex\"\nskip_env_check = true\n",
        )
        .unwrap();

        triad()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid."));
    }

    #[test]
    fn test_config_show_reads_explicit_file() {
        let dir = create_temp_project();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[workers.architect]\ncommand = \"my-architect\"\n").unwrap();

        triad()
            .current_dir(dir.path())
            .args(["config", "show", "--config"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("[workers.architect]"))
            .stdout(predicate::str::contains("architect command = \"my-architect\""));
    }

    #[test]
    fn test_env_overrides_worker_command() {
        let dir = create_temp_project();

        triad()
            .current_dir(dir.path())
            .env("TRIAD_IMPLEMENTER_CMD", "/opt/bin/claude-dev")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "implementer command = \"/opt/bin/claude-dev\"",
            ));
    }

    #[test]
    fn test_malformed_config_fails() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".triad")).unwrap();
        fs::write(dir.path().join(".triad/triad.toml"), "[server\nport = ").unwrap();

        triad()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse triad.toml"));
    }
}

// =============================================================================
// Status Tests
// =============================================================================

mod status {
    use super::*;

    #[test]
    fn test_status_without_sessions() {
        let dir = create_temp_project();

        triad()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("No sessions found"));
    }

    #[test]
    fn test_status_reconstructs_latest_session() {
        let dir = create_temp_project();
        write_session(
            dir.path(),
            "orch_20250101_100000_aaaaaaaa",
            &[
                (
                    "implementer",
                    vec![
                        event("implementer", "progress", "Wiring the handler", Some(40)),
                        event("implementer", "status", "All tests pass, done", None),
                    ],
                ),
                (
                    "architect",
                    vec![event("architect", "blocker", "Need the schema", None)],
                ),
            ],
        );

        triad()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("orch_20250101_100000_aaaaaaaa"))
            .stdout(predicate::str::contains("Add a search endpoint"))
            .stdout(predicate::str::contains("completed"))
            .stdout(predicate::str::contains("blocked"));
    }

    #[test]
    fn test_status_json_output() {
        let dir = create_temp_project();
        let workspace = write_session(
            dir.path(),
            "orch_20250101_110000_bbbbbbbb",
            &[(
                "reviewer",
                vec![
                    event("reviewer", "progress", "Reading diff", Some(30)),
                    event("reviewer", "error", "lint failed", None),
                ],
            )],
        );

        let output = triad()
            .current_dir(dir.path())
            .arg("status")
            .arg(&workspace)
            .arg("--json")
            .output()
            .unwrap();
        assert!(output.status.success());

        let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(summary["session_id"], "orch_20250101_110000_bbbbbbbb");
        assert_eq!(summary["workers"]["reviewer"]["status"], "running");
        assert_eq!(summary["workers"]["reviewer"]["progress"], 30);
        assert_eq!(summary["workers"]["reviewer"]["error_count"], 1);
        assert_eq!(summary["workers"]["architect"]["status"], "idle");
        assert_eq!(summary["complete"], false);
    }

    #[test]
    fn test_status_picks_newest_session() {
        let dir = create_temp_project();
        write_session(dir.path(), "orch_20250101_100000_aaaaaaaa", &[]);
        write_session(dir.path(), "orch_20250102_100000_cccccccc", &[]);

        triad()
            .current_dir(dir.path())
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("orch_20250102_100000_cccccccc"));
    }

    #[test]
    fn test_status_missing_workspace_fails() {
        let dir = create_temp_project();

        triad()
            .current_dir(dir.path())
            .args(["status", "does-not-exist"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to read session manifest"));
    }
}

// =============================================================================
// Global Flag Tests
// =============================================================================

mod flags {
    use super::*;

    #[test]
    fn test_project_dir_flag() {
        let dir = create_temp_project();

        triad()
            .arg("--project-dir")
            .arg(dir.path())
            .args(["config", "init"])
            .assert()
            .success();

        assert!(dir.path().join(".triad/triad.toml").exists());
    }

    #[test]
    fn test_verbose_flag() {
        let dir = create_temp_project();

        triad()
            .current_dir(dir.path())
            .args(["-v", "config", "show"])
            .assert()
            .success();
    }
}
