//! Session report from the audit trail (`triad status`).

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use triad::session::{SessionSummary, Status};

/// Most recent session directory under `root`. Session ids start with a
/// timestamp, so the lexically greatest one is the newest.
pub fn latest_session(root: &Path) -> Result<Option<PathBuf>> {
    if !root.exists() {
        return Ok(None);
    }
    let mut sessions: Vec<PathBuf> = std::fs::read_dir(root)
        .with_context(|| format!("Failed to read {}", root.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.join(triad::config::MANIFEST_FILE).is_file())
        .collect();
    sessions.sort();
    Ok(sessions.pop())
}

pub fn cmd_status(
    project_dir: &Path,
    config_file: Option<&Path>,
    workspace: Option<&Path>,
    json: bool,
) -> Result<()> {
    use triad::audit::reconstruct_session;
    use triad::tracker::StateTracker;
    use triad::triad_config::TriadConfig;

    let config = TriadConfig::new(project_dir.to_path_buf(), config_file)?;
    let workspace = match workspace {
        Some(dir) => dir.to_path_buf(),
        None => match latest_session(&config.workspace_root())? {
            Some(dir) => dir,
            None => {
                println!();
                println!(
                    "No sessions found under {}. Start one with 'triad run --prompt <task>'.",
                    config.workspace_root().display()
                );
                println!();
                return Ok(());
            }
        },
    };

    let tracker = StateTracker::new(config.tracker_policy());
    let state = reconstruct_session(&workspace, &tracker)?;
    let summary = state.summary();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
        );
    } else {
        println!();
        println!("Workspace: {}", workspace.display());
        print_summary(&summary);
    }
    Ok(())
}

fn styled_status(status: Status) -> console::StyledObject<&'static str> {
    let style = console::style(status.as_str());
    match status {
        Status::Completed => style.green(),
        Status::Failed => style.red(),
        Status::Blocked => style.red().bold(),
        Status::Recovering => style.yellow(),
        Status::Running => style.cyan(),
        Status::Idle => style.dim(),
    }
}

/// Human-readable summary shared by `status` and the end of `run`.
pub fn print_summary(summary: &SessionSummary) {
    println!();
    println!("{}", console::style(format!("Session {}", summary.session_id)).bold().cyan());
    println!("  Task:     {}", summary.user_prompt);
    println!("  Started:  {}", summary.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!(
        "  Complete: {}",
        if summary.complete {
            console::style("yes").green()
        } else {
            console::style("no").yellow()
        }
    );
    println!();
    println!("{:<12} {:<12} {:>8} {:>7}", "Worker", "Status", "Progress", "Errors");
    println!("{:<12} {:<12} {:>8} {:>7}", "------", "------", "--------", "------");
    for (role, worker) in &summary.workers {
        println!(
            "{:<12} {:<12} {:>7}% {:>7}",
            role.as_str(),
            styled_status(worker.status),
            worker.progress,
            worker.error_count
        );
    }
    println!();

    println!("Reviews: {}", summary.reviews.total);
    for (verdict, count) in &summary.reviews.by_verdict {
        println!("  {:<10} {}", verdict, count);
    }
    if let Some(last) = summary.reviews.decisions.last() {
        println!(
            "Last decision: {} ({})",
            console::style(last.action.as_str()).bold(),
            last.reason
        );
    }
    println!("Decisions: {}", summary.decision_count);

    println!("Recoveries: {}", summary.recoveries.total);
    for action in &summary.recoveries.actions {
        println!("  {} {} -> {}", action.role, action.issue, action.action);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_latest_session_picks_newest_with_manifest() {
        let dir = tempdir().unwrap();
        for id in ["orch_20250101_000000_aaaaaaaa", "orch_20250102_000000_bbbbbbbb"] {
            std::fs::create_dir_all(dir.path().join(id)).unwrap();
            std::fs::write(dir.path().join(id).join(triad::config::MANIFEST_FILE), "{}").unwrap();
        }
        std::fs::create_dir_all(dir.path().join("orch_20250103_000000_cccccccc")).unwrap();

        let latest = latest_session(dir.path()).unwrap().unwrap();
        assert!(latest.ends_with("orch_20250102_000000_bbbbbbbb"));
    }

    #[test]
    fn test_latest_session_without_root() {
        let dir = tempdir().unwrap();
        assert!(latest_session(&dir.path().join("missing")).unwrap().is_none());
    }
}
