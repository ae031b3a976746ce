//! Tracing setup shared by every command.
//!
//! Console output goes to stderr, human-readable or JSON. When a log
//! directory is given, a non-blocking JSON file log is written there as
//! well; keep the returned [`LogGuard`] alive until exit so it is flushed.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// File name of the session log inside the log directory.
pub const LOG_FILE: &str = "triad.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Keeps the file writer flushing until dropped.
#[must_use]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "triad=debug" } else { "triad=info" }
}

/// Install the global subscriber.
pub fn init(format: LogFormat, verbose: bool, log_dir: Option<&Path>) -> Result<LogGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let console = fmt::layer().with_writer(std::io::stderr).with_target(false);
    layers.push(match format {
        LogFormat::Pretty => console.boxed(),
        LogFormat::Json => console.json().boxed(),
    });

    let file_guard = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(LogGuard { _file: file_guard })
}
