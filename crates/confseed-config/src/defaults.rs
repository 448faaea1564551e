//! Serde default values for configuration documents.
//!
//! # Design
//! - Every default a document may omit lives here so loader and model stay declarative.

use confseed_fsops::DEFAULT_TIMEOUT_SECS;

/// Default log level.
pub(crate) fn log_level() -> String {
    "info".to_string()
}

/// Default log output routing.
pub(crate) fn log_output() -> String {
    "split".to_string()
}

/// Default selection regex: everything.
pub(crate) fn regex() -> String {
    ".*".to_string()
}

/// Default permission glob: everything.
pub(crate) fn glob() -> String {
    "*".to_string()
}

/// Default mode string meaning "unset".
pub(crate) fn mode() -> String {
    "0".to_string()
}

/// Default command timeout in seconds.
pub(crate) const fn timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Default for flags that are on unless disabled.
pub(crate) const fn enabled() -> bool {
    true
}
