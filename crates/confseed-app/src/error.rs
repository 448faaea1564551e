//! # Design
//!
//! - Centralize application-level errors for bootstrap.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Engine failures during a run are reported per path instead of surfacing here.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: confseed_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: confseed_telemetry::TelemetryError,
    },
    /// Rendering the effective configuration failed.
    #[error("failed to serialize configuration")]
    Serialize {
        /// Source serde error.
        source: serde_json::Error,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: confseed_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: confseed_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[test]
    fn app_error_helpers_build_variants() -> Result<(), Box<dyn Error>> {
        let config = AppError::config(
            "config.load",
            confseed_config::ConfigError::Io {
                operation: "config.read",
                path: "/etc/confseed/config.yml".into(),
                source: io::Error::other("missing"),
            },
        );
        assert!(matches!(config, AppError::Config { .. }));
        assert_eq!(
            confseed_fsops::error_chain(&config),
            "configuration operation failed: filesystem operation failed: missing"
        );

        let telemetry = AppError::telemetry(
            "telemetry.init",
            confseed_telemetry::TelemetryError::InvalidFormat {
                value: "xml".to_string(),
            },
        );
        assert!(matches!(telemetry, AppError::Telemetry { .. }));
        assert!(telemetry.source().is_some());
        Ok(())
    }
}
