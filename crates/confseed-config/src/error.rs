//! Error types for configuration operations.

use std::io;
use std::path::PathBuf;

use confseed_fsops::FsOpsError;
use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Section that failed validation.
        section: String,
        /// Field that failed validation.
        field: String,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// A value was rejected by the engine while compiling it.
    #[error("invalid configuration value")]
    Engine {
        /// Section holding the value.
        section: String,
        /// Field holding the value.
        field: String,
        /// Engine error detail.
        source: FsOpsError,
    },
    /// Reading a configuration or data file failed.
    #[error("filesystem operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// File involved.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// A YAML document did not parse into the expected shape.
    #[error("invalid yaml document")]
    Yaml {
        /// File that failed to parse.
        path: PathBuf,
        /// Source YAML error.
        source: serde_yaml::Error,
    },
    /// A JSON document did not parse into the expected shape.
    #[error("invalid json document")]
    Json {
        /// File that failed to parse.
        path: PathBuf,
        /// Source JSON error.
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(
        section: impl Into<String>,
        field: impl Into<String>,
        value: Option<String>,
        reason: &'static str,
    ) -> Self {
        Self::InvalidField {
            section: section.into(),
            field: field.into(),
            value,
            reason,
        }
    }

    pub(crate) fn engine(section: impl Into<String>, field: impl Into<String>, source: FsOpsError) -> Self {
        Self::Engine {
            section: section.into(),
            field: field.into(),
            source,
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
