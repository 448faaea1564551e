//! Logging initialisation and output routing.
//!
//! # Design
//! - Single entry point installing a fmt subscriber (human or JSON) behind an `EnvFilter`.
//! - `RUST_LOG` wins over the configured level.
//! - Output routing is resolved into one boxed writer before the subscriber is built.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Result, TelemetryError};

/// Default level when neither `RUST_LOG` nor the configuration provide one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Configure and install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the level is not a valid directive, the log file cannot be opened or a
/// global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig<'_>) -> Result<()> {
    let filter = build_env_filter(config.level)?;
    let writer = config.output.make_writer()?;
    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(writer),
            )
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(writer),
            )
            .try_init(),
    };
    installed.map_err(|source| TelemetryError::SubscriberInstall { source })
}

fn build_env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level = if level.trim().is_empty() {
        DEFAULT_LOG_LEVEL
    } else {
        level
    };
    EnvFilter::try_new(level).map_err(|source| TelemetryError::InvalidLevel {
        value: level.to_string(),
        source,
    })
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig<'a> {
    /// Level or filter directive (e.g. `info`, `confseed_fsops=debug`).
    pub level: &'a str,
    /// Output format selection for the tracing subscriber.
    pub format: LogFormat,
    /// Where formatted lines go.
    pub output: LogOutput,
}

impl Default for LoggingConfig<'_> {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL,
            format: LogFormat::infer(),
            output: LogOutput::Split,
        }
    }
}

/// Available output formats for the logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Emit logs as structured JSON objects.
    Json,
    /// Emit human-readable logs.
    Pretty,
}

impl LogFormat {
    /// Choose a sensible default for the current build.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }

    /// Parse an optional configured format, inferring one when absent or empty.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidFormat`] for anything but `json` or `pretty`.
    pub fn from_config(value: Option<&str>) -> Result<Self> {
        match value.map(str::trim) {
            None | Some("") => Ok(Self::infer()),
            Some(value) => value.parse(),
        }
    }
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            _ => Err(TelemetryError::InvalidFormat {
                value: value.to_string(),
            }),
        }
    }
}

/// Destination of formatted log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    /// Everything to stdout.
    Stdout,
    /// Everything to stderr.
    Stderr,
    /// Warnings and errors to stderr, everything else to stdout.
    Split,
    /// Append to a file.
    File(PathBuf),
    /// Drop everything.
    Discard,
}

impl LogOutput {
    /// Interpret a configured output: a keyword, `-`/empty to discard, or a file path.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "-" => Self::Discard,
            "stdout" => Self::Stdout,
            "stderr" => Self::Stderr,
            "split" => Self::Split,
            path => Self::File(PathBuf::from(path)),
        }
    }

    /// Build the writer for this output.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::LogFile`] when the log file cannot be opened for appending.
    pub fn make_writer(&self) -> Result<BoxMakeWriter> {
        Ok(match self {
            Self::Stdout => BoxMakeWriter::new(std::io::stdout),
            Self::Stderr => BoxMakeWriter::new(std::io::stderr),
            Self::Split => BoxMakeWriter::new(
                std::io::stderr
                    .with_max_level(Level::WARN)
                    .or_else(std::io::stdout),
            ),
            Self::File(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| TelemetryError::LogFile {
                        path: path.clone(),
                        source,
                    })?;
                BoxMakeWriter::new(Mutex::new(file))
            }
            Self::Discard => BoxMakeWriter::new(std::io::sink),
        })
    }
}
