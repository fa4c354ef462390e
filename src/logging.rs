//! Tracing subscriber setup for the binary.
//!
//! Logs always go to stderr. When `[logging] log_dir` is set, a daily rolling
//! file is written there as well through a non-blocking writer.

use crate::config::LoggingConfig;
use crate::error::NotifyError;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "patron_notify=info";
const VERBOSE_FILTER: &str = "patron_notify=debug";
const LOG_FILE_PREFIX: &str = "patron-notify.log";

/// Keeps the file writer flushing. Hold it for the life of the process.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Pick the filter directive: `RUST_LOG`, then `--verbose`, then config.
#[must_use]
pub fn resolve_filter(env: Option<&str>, configured: &str, verbose: bool) -> String {
    if let Some(env) = env.map(str::trim).filter(|e| !e.is_empty()) {
        return env.to_owned();
    }
    if verbose {
        return VERBOSE_FILTER.to_owned();
    }
    let configured = configured.trim();
    if configured.is_empty() {
        DEFAULT_FILTER.to_owned()
    } else {
        configured.to_owned()
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns `NotifyError::Config` for an invalid filter directive or when a
/// subscriber is already installed, and `NotifyError::Io` if the log
/// directory cannot be created.
pub fn init(config: &LoggingConfig, verbose: bool) -> crate::Result<LogGuard> {
    let env = std::env::var("RUST_LOG").ok();
    let directive = resolve_filter(env.as_deref(), &config.filter, verbose);
    let filter = EnvFilter::try_new(&directive)
        .map_err(|e| NotifyError::Config(format!("invalid log filter {directive:?}: {e}")))?;

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| NotifyError::Config(format!("logging already initialised: {e}")))?;

    Ok(LogGuard { _file: guard })
}
