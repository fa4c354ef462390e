//! Error types for the notification service.

/// Top-level error type for patron-notify.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Configuration error (unset sheet id, unreadable config file).
    #[error("config error: {0}")]
    Config(String),

    /// The spreadsheet could not be read or written.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// A write was rejected because the target changed underneath us.
    #[error("write conflict: {0}")]
    WriteConflict(String),

    /// The messaging transport rejected or failed a send.
    #[error("transport error: {0}")]
    Transport(String),

    /// A network call did not complete within its budget.
    #[error("{operation} timed out after {secs}s")]
    Timeout {
        /// Which call timed out (e.g. `fetch_table`).
        operation: &'static str,
        /// The budget that was exceeded.
        secs: u64,
    },

    /// Authorization material is missing or could not be refreshed.
    #[error("auth error: {0}")]
    Auth(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NotifyError {
    /// Whether the failure is expected to clear on its own by the next tick.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable(_) | Self::Transport(_) | Self::Timeout { .. }
        )
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, NotifyError>;
