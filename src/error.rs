//! Error types for the sms-spam-report library.
//!
//! Every failure a report, export or feedback call can produce is a variant of
//! [`ReportError`]. The HTTP layer maps each variant onto a status code in
//! `response.rs`; nothing below this module knows about HTTP.

use thiserror::Error;

/// Errors that can occur while serving reports.
#[derive(Error, Debug)]
pub enum ReportError {
    /// Timestamp string without timezone information, or not parseable at all
    #[error("{0}")]
    InvalidTimestamp(String),

    /// `to` earlier than `from`, or the window is wider than allowed
    #[error("{0}")]
    InvalidRange(String),

    /// Query or body parameter outside its accepted domain
    #[error("{0}")]
    InvalidParameter(String),

    /// Feedback request carried no corrections
    #[error("No feedback data provided")]
    EmptyInput,

    /// Feedback update touched zero rows
    #[error("No records matched your condition")]
    NoMatch,

    /// Streaming export ran past its deadline
    #[error("Export exceeded the {0}s stream timeout")]
    ExportTimeout(u64),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool exhausted or unreachable store
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// CSV encoding errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}

impl ReportError {
    /// True for failures caused by the caller's input rather than the service.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTimestamp(_)
                | Self::InvalidRange(_)
                | Self::InvalidParameter(_)
                | Self::EmptyInput
                | Self::NoMatch
        )
    }
}

impl From<tokio::task::JoinError> for ReportError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Convenience type alias for Result with `ReportError`
pub type Result<T> = std::result::Result<T, ReportError>;
