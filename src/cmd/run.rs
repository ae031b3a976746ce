//! Supervised session (`triad run`).

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use super::super::Cli;

/// Flags of `triad run`.
pub struct RunArgs {
    pub prompt: String,
    pub target_dir: Option<PathBuf>,
    pub port: Option<u16>,
    pub no_server: bool,
    pub poll_interval: Option<u64>,
}

pub async fn cmd_run(cli: &Cli, project_dir: PathBuf, args: RunArgs) -> Result<()> {
    use triad::config::SessionPaths;
    use triad::logging;
    use triad::orchestrator::{
        Coordinator, CoordinatorSettings, ProcessWorkerFactory, SessionLauncher,
        resolve_target_dir,
    };
    use triad::server::{self, AppState};
    use triad::session::{SessionStore, new_session_id};
    use triad::triad_config::TriadConfig;

    if args.prompt.trim().is_empty() {
        anyhow::bail!("The task prompt must not be empty");
    }

    let config = TriadConfig::new(project_dir, cli.config.as_deref())?.with_cli_args(
        args.port,
        args.no_server,
        args.poll_interval,
    );
    for warning in config.validate() {
        println!("{} {}", console::style("Config warning:").yellow(), warning);
    }

    let target_dir = resolve_target_dir(&config.project_dir, args.target_dir.as_deref());
    let session_id = new_session_id();
    let paths = SessionPaths::for_session(
        &config.workspace_root(),
        &session_id,
        target_dir,
        config.support_dir.clone(),
    );
    paths.ensure_directories()?;
    let _log_guard = logging::init(cli.log_format, cli.verbose, Some(&paths.logs_dir()))?;

    println!();
    println!("{}", console::style("Triad Session").bold().cyan());
    println!("  Session:   {}", session_id);
    println!("  Workspace: {}", paths.workspace_dir.display());
    println!("  Target:    {}", paths.target_dir.display());
    println!();

    let factory = Arc::new(ProcessWorkerFactory::from_config(&config));
    let mut coordinator = Coordinator::start_session(
        &session_id,
        &args.prompt,
        paths,
        CoordinatorSettings::from_config(&config),
        factory.as_ref(),
    )
    .await
    .context("Failed to start session")?;

    let handle = coordinator.handle();
    let store = SessionStore::new();
    store.insert(handle.clone()).await;

    let server_task = if config.server_enabled() {
        let port = config.port();
        let server_handle = handle.clone();
        let state = Arc::new(
            AppState::new(store).with_launcher(SessionLauncher::new(&config, factory.clone())),
        );
        println!("  Control API: http://127.0.0.1:{}/sessions/{}", port, session_id);
        println!();
        Some(tokio::spawn(async move {
            // Polled so the coordinator keeps every wake-up notification.
            let shutdown = async move {
                while !server_handle.is_stopped() {
                    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
                }
            };
            if let Err(e) = server::serve(state, port, shutdown).await {
                tracing::error!(error = %e, "Control API stopped");
            }
        }))
    } else {
        None
    };

    let signal_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nStopping session...");
            signal_handle.stop();
        }
    });

    let summary = coordinator.run().await;

    if let Some(task) = server_task {
        task.abort();
    }

    super::status::print_summary(&summary);
    Ok(())
}
