//! Logging setup for agent-msg using tracing.
//!
//! Two sinks with separate filters:
//! - `<root>/logs/agent-msg.log.<date>`: full library detail, driven by
//!   `RUST_LOG` (default `info,agent_msg=debug`)
//! - stderr: warnings only, or library debug output with `--verbose`, so
//!   command output on stdout stays clean

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log directory name inside the mailbox root.
pub const LOG_DIR: &str = "logs";

const FILE_DEFAULT: &str = "info,agent_msg=debug";

/// Log directory for a mailbox root.
pub fn log_dir(root: &Path) -> PathBuf {
    root.join(LOG_DIR)
}

/// Directives for the stderr layer.
fn console_directives(verbose: bool) -> &'static str {
    if verbose {
        "warn,agent_msg=debug"
    } else {
        "warn"
    }
}

/// Initialize logging under `root`. Keep the guard alive until exit so the
/// file writer flushes.
pub fn init(root: &Path, verbose: bool) -> Result<WorkerGuard> {
    let dir = log_dir(root);
    std::fs::create_dir_all(&dir)?;

    // Daily rotation, written off the async runtime's threads
    let file_appender = tracing_appender::rolling::daily(&dir, "agent-msg.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(FILE_DEFAULT));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .with_filter(file_filter);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_filter(EnvFilter::new(console_directives(verbose)));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    tracing::debug!("Logging to {}", dir.display());

    Ok(guard)
}
