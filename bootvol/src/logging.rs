//! Tracing setup for the `bootvol` binary and embedders.
//!
//! Logs go to stderr and to a daily rolling file under
//! `<home>/logs/bootvol.log`. `RUST_LOG` overrides the default filter.
//!
//! The file is written from a background thread. Hold the returned guard
//! until shutdown; dropping it flushes pending lines.

use std::sync::OnceLock;

use bootvol_shared::errors::{BootvolError, BootvolResult};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::options::BootvolOptions;

const DEFAULT_FILTER: &str = "bootvol=info";
const LOG_FILE_NAME: &str = "bootvol.log";

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Install the global subscriber.
///
/// Returns the file writer's guard, or `None` if a subscriber was already
/// installed by an earlier call or by the embedding application.
pub fn init_logging(options: &BootvolOptions) -> BootvolResult<Option<WorkerGuard>> {
    if INSTALLED.get().is_some() {
        return Ok(None);
    }

    let logs_dir = options.logs_dir();
    std::fs::create_dir_all(&logs_dir)
        .map_err(|e| BootvolError::io(format!("creating {}", logs_dir.display()), e))?;

    let appender = RollingFileAppender::new(Rotation::DAILY, &logs_dir, LOG_FILE_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init();

    // Another subscriber may already be installed by the embedding
    // application; keep theirs.
    if let Err(e) = installed {
        tracing::debug!(error = %e, "Global subscriber already set");
        return Ok(None);
    }

    let _ = INSTALLED.set(());
    tracing::debug!(logs_dir = %logs_dir.display(), "Logging initialized");
    Ok(Some(guard))
}
