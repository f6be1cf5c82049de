//! Tracing setup for Bitster
//!
//! Console output at a user-chosen level plus a full trace log on disk, so a
//! misbehaving tracker or peer session can be diagnosed after the fact.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name of the per-run trace log inside the logs directory.
pub const LOG_FILE_NAME: &str = "bitster-last-run.log";

/// Installs the global subscriber with a console layer and a trace file layer.
///
/// The console honours `RUST_LOG` when set and falls back to `console_level`.
/// The file at `<logs_dir>/bitster-last-run.log` is truncated on every run and
/// receives everything down to TRACE. Returns the path of the log file.
///
/// # Errors
///
/// - `Box<dyn std::error::Error>` - If the logs directory or file cannot be
///   created, or a global subscriber is already installed
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let logs_path = logs_dir.unwrap_or_else(|| Path::new("logs"));
    create_dir_all(logs_path)?;

    let log_file_path = logs_path.join(LOG_FILE_NAME);
    let log_file = File::create(&log_file_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        "Tracing initialized: console={}, debug_file={}",
        console_level,
        log_file_path.display()
    );

    Ok(log_file_path)
}

/// User-facing log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogVerbosity {
    Quiet,
    Normal,
    Verbose,
    Trace,
}

impl LogVerbosity {
    /// Maps verbosity to the tracing level used for the console layer.
    pub fn as_tracing_level(self) -> Level {
        match self {
            LogVerbosity::Quiet => Level::ERROR,
            LogVerbosity::Normal => Level::INFO,
            LogVerbosity::Verbose => Level::DEBUG,
            LogVerbosity::Trace => Level::TRACE,
        }
    }
}

impl std::str::FromStr for LogVerbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quiet" | "error" => Ok(LogVerbosity::Quiet),
            "normal" | "info" => Ok(LogVerbosity::Normal),
            "verbose" | "debug" => Ok(LogVerbosity::Verbose),
            "trace" => Ok(LogVerbosity::Trace),
            _ => Err(format!("Invalid log verbosity: {s}")),
        }
    }
}
