use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use triad::logging::{self, LogFormat};

mod cmd;

#[derive(Parser)]
#[command(name = "triad")]
#[command(
    version,
    about = "Supervise an architect, an implementer and a reviewer agent on one task"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Path to a triad.toml. Defaults to .triad/triad.toml in the project directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Console log format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a session: launch the three workers and supervise them until done
    Run {
        /// The task to split between the workers
        #[arg(short, long)]
        prompt: String,

        /// Directory the workers operate on (defaults to the project directory)
        #[arg(long)]
        target_dir: Option<PathBuf>,

        /// Control API port. Overrides triad.toml.
        #[arg(long)]
        port: Option<u16>,

        /// Do not start the control API
        #[arg(long)]
        no_server: bool,

        /// Seconds between supervision ticks. Overrides triad.toml and TRIAD_POLL_INTERVAL.
        #[arg(long)]
        poll_interval: Option<u64>,
    },
    /// Rebuild a session report from its workspace
    Status {
        /// Session workspace directory (defaults to the most recent session)
        workspace: Option<PathBuf>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default triad.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Run {
            prompt,
            target_dir,
            port,
            no_server,
            poll_interval,
        } => {
            // Logging starts inside once the session log directory exists.
            let args = cmd::RunArgs {
                prompt: prompt.clone(),
                target_dir: target_dir.clone(),
                port: *port,
                no_server: *no_server,
                poll_interval: *poll_interval,
            };
            cmd::cmd_run(&cli, project_dir, args).await?;
        }
        Commands::Status { workspace, json } => {
            let _guard = logging::init(cli.log_format, cli.verbose, None)?;
            cmd::cmd_status(
                &project_dir,
                cli.config.as_deref(),
                workspace.as_deref(),
                *json,
            )?;
        }
        Commands::Config { command } => {
            let _guard = logging::init(cli.log_format, cli.verbose, None)?;
            cmd::cmd_config(&project_dir, cli.config.as_deref(), command.clone())?;
        }
    }

    Ok(())
}
