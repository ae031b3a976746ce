//! Configuration view and validation commands (`triad config`).

use anyhow::Result;
use std::path::Path;

use super::super::ConfigCommands;

fn print_toml(toml: &triad::triad_config::TriadToml) {
    println!("[supervisor]");
    println!("  poll_interval_secs = {}", toml.supervisor.poll_interval_secs);
    println!("  stop_grace_secs = {}", toml.supervisor.stop_grace_secs);
    println!("  max_relaunches = {}", toml.supervisor.max_relaunches);
    println!(
        "  workspace_root = \"{}\"",
        toml.supervisor.workspace_root.display()
    );
    println!();
    println!("[review]");
    println!("  fallback_minutes = {}", toml.review.fallback_minutes);
    println!("  max_words = {}", toml.review.max_words);
    println!();
    println!("[tracker]");
    println!("  milestone_step = {}", toml.tracker.milestone_step);
    println!("  milestone_cap = {}", toml.tracker.milestone_cap);
    println!("  completion_threshold = {}", toml.tracker.completion_threshold);
    println!();
    println!("[server]");
    println!("  enabled = {}", toml.server.enabled);
    println!("  port = {}", toml.server.port);
    println!();
    for (name, worker) in &toml.workers {
        println!("[workers.{}]", name);
        if let Some(cmd) = &worker.command {
            println!("  command = \"{}\"", cmd);
        }
        if !worker.extra_args.is_empty() {
            println!("  extra_args = {:?}", worker.extra_args);
        }
        println!("  skip_env_check = {}", worker.skip_env_check);
        println!();
    }
}

pub fn cmd_config(
    project_dir: &Path,
    config_file: Option<&Path>,
    command: Option<ConfigCommands>,
) -> Result<()> {
    use triad::event::Role;
    use triad::triad_config::{CONFIG_FILE, SUPPORT_DIR, TriadConfig, TriadToml};

    let support_dir = project_dir.join(SUPPORT_DIR);
    let config_path = config_file
        .map(Path::to_path_buf)
        .unwrap_or_else(|| support_dir.join(CONFIG_FILE));

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Triad Configuration");
            println!("===================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                print_toml(&TriadToml::load(&config_path)?);
            } else {
                println!("No triad.toml found at {}", config_path.display());
                println!();
                println!("Using default configuration:");
                print_toml(&TriadToml::default());
                println!("Run 'triad config init' to create a triad.toml file.");
                println!();
            }

            println!("Effective values (with env/CLI overrides):");
            let config = TriadConfig::new(project_dir.to_path_buf(), config_file)?;
            for role in Role::ALL {
                println!("  {} command = \"{}\"", role, config.worker_command(role));
            }
            println!("  poll_interval = {}s", config.poll_interval().as_secs());
            println!("  workspace_root = {}", config.workspace_root().display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No triad.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = TriadToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("triad.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if let Some(parent) = config_path.parent()
                && !parent.exists()
            {
                std::fs::create_dir_all(parent)?;
            }

            TriadToml::default().save(&config_path)?;

            println!("Created triad.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [supervisor] poll_interval_secs, max_relaunches, workspace_root");
            println!("  - [review] fallback_minutes, max_words");
            println!("  - [workers.<role>] command, extra_args, skip_env_check");
            println!();
        }
    }

    Ok(())
}
