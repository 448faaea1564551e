//! Error types for telemetry operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised while configuring logging.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Installing the tracing subscriber failed.
    #[error("failed to install tracing subscriber")]
    SubscriberInstall {
        /// Underlying tracing subscriber error.
        source: tracing_subscriber::util::TryInitError,
    },
    /// The configured level is not a valid filter directive.
    #[error("invalid log level")]
    InvalidLevel {
        /// Level string as configured.
        value: String,
        /// Underlying directive parse error.
        source: tracing_subscriber::filter::ParseError,
    },
    /// The configured format is neither `pretty` nor `json`.
    #[error("invalid log format")]
    InvalidFormat {
        /// Format string as configured.
        value: String,
    },
    /// Opening the log file failed.
    #[error("failed to open log file")]
    LogFile {
        /// Log file path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
}
