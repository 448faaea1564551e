//! # Design
//!
//! - Provide structured, constant-message errors for the action engine.
//! - Capture operation context (paths, patterns, commands) to make failures reproducible in tests.
//! - Preserve source errors without interpolating context into error messages.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for engine operations.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors produced by the filesystem action engine.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// IO failures while interacting with the filesystem.
    #[error("fsops io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A selection expression did not compile.
    #[error("fsops invalid pattern")]
    Pattern {
        /// Operation that compiled the pattern.
        operation: &'static str,
        /// Pattern as supplied by the caller.
        pattern: String,
        /// Underlying regex error.
        source: regex::Error,
    },
    /// A glob did not compile.
    #[error("fsops glob failure")]
    Glob {
        /// Operation that compiled the glob.
        operation: &'static str,
        /// Glob as supplied by the caller.
        pattern: String,
        /// Underlying globset error.
        source: globset::Error,
    },
    /// Tree traversal failed; no partial inventory is returned.
    #[error("fsops scan failure")]
    Scan {
        /// Operation that triggered the traversal failure.
        operation: &'static str,
        /// Path that could not be visited.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// Template parsing or execution failed.
    #[error("fsops render failure")]
    Render {
        /// Operation that rendered the template.
        operation: &'static str,
        /// Source path (or template name) that failed to render.
        path: PathBuf,
        /// Underlying template error.
        source: minijinja::Error,
    },
    /// External command execution failed.
    #[error("fsops command failure")]
    Run {
        /// Command line that was executed.
        command: String,
        /// Failure detail.
        source: RunFailure,
    },
    /// User lookup failed while registering a permission rule.
    #[error("fsops user lookup failed")]
    UserLookup {
        /// User specification that failed lookup.
        user: String,
        /// Underlying nix error, when the lookup itself failed.
        source: Option<nix::Error>,
    },
    /// Group lookup failed while registering a permission rule.
    #[error("fsops group lookup failed")]
    GroupLookup {
        /// Group specification that failed lookup.
        group: String,
        /// Underlying nix error, when the lookup itself failed.
        source: Option<nix::Error>,
    },
    /// Changing ownership of a path failed.
    #[error("fsops chown failure")]
    Chown {
        /// Path whose ownership could not be changed.
        path: PathBuf,
        /// Underlying nix error.
        source: nix::Error,
    },
    /// One or more permission rules could not be applied to a path.
    #[error("fsops permissions partially applied")]
    Permissions {
        /// Destination path the rules were applied to.
        path: PathBuf,
        /// Number of matching rules that failed.
        failed: usize,
    },
    /// A condition rendered to a token that is not a known policy.
    #[error("fsops unrecognized condition policy")]
    Policy {
        /// Rendered and trimmed condition output.
        value: String,
    },
    /// Data sources could not be merged or input was malformed.
    #[error("fsops invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// A dispatch pass finished with failing entries.
    #[error("fsops dispatch finished with failures")]
    Dispatch {
        /// Relative paths whose action failed, sorted.
        failed: Vec<String>,
    },
}

/// Reasons an external command did not complete successfully.
#[derive(Debug, Error)]
pub enum RunFailure {
    /// The rendered argument line was empty.
    #[error("empty command line")]
    EmptyCommand,
    /// The process could not be started.
    #[error("failed to start process")]
    Spawn {
        /// Underlying IO error.
        source: io::Error,
    },
    /// The runtime driving the process could not be built.
    #[error("failed to build command runtime")]
    Runtime {
        /// Underlying IO error.
        source: io::Error,
    },
    /// Waiting for the process failed.
    #[error("failed to wait for process")]
    Wait {
        /// Underlying IO error.
        source: io::Error,
    },
    /// The process outlived its deadline and was killed.
    #[error("process killed after timeout")]
    Timeout {
        /// Configured timeout in seconds.
        seconds: u64,
    },
    /// The process exited unsuccessfully.
    #[error("process exited unsuccessfully")]
    Exit {
        /// Exit code, absent when the process was terminated by a signal.
        code: Option<i32>,
    },
}

impl RunFailure {
    /// Exit code reported to callers that track return codes; `-1` when no code exists.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Exit { code: Some(code) } => *code,
            _ => -1,
        }
    }
}

/// Render `err` followed by each of its sources, joined with `: `.
#[must_use]
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut current = err.source();
    while let Some(source) = current {
        rendered.push_str(": ");
        rendered.push_str(&source.to_string());
        current = source.source();
    }
    rendered
}

impl FsOpsError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn pattern(
        operation: &'static str,
        pattern: impl Into<String>,
        source: regex::Error,
    ) -> Self {
        Self::Pattern {
            operation,
            pattern: pattern.into(),
            source,
        }
    }

    pub(crate) fn glob(
        operation: &'static str,
        pattern: impl Into<String>,
        source: globset::Error,
    ) -> Self {
        Self::Glob {
            operation,
            pattern: pattern.into(),
            source,
        }
    }

    pub(crate) fn scan(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: walkdir::Error,
    ) -> Self {
        Self::Scan {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn render(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: minijinja::Error,
    ) -> Self {
        Self::Render {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn run(command: impl Into<String>, source: RunFailure) -> Self {
        Self::Run {
            command: command.into(),
            source,
        }
    }

    /// Returns `true` when the error reports a command killed by its deadline.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Run {
                source: RunFailure::Timeout { .. },
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use walkdir::WalkDir;

    type TestResult<T> = Result<T, Box<dyn Error>>;

    #[test]
    fn fsops_error_helpers_build_variants() -> TestResult<()> {
        let io_err = FsOpsError::io("read", "path", io::Error::other("io"));
        assert!(matches!(io_err, FsOpsError::Io { .. }));
        assert!(io_err.source().is_some());

        let Err(regex_error) = regex::Regex::new("[") else {
            return Err(io::Error::other("expected regex error").into());
        };
        let pattern_err = FsOpsError::pattern("compile", "[", regex_error);
        assert!(matches!(pattern_err, FsOpsError::Pattern { .. }));
        assert!(pattern_err.source().is_some());

        let Err(glob_error) = globset::Glob::new("[") else {
            return Err(io::Error::other("expected glob error").into());
        };
        let glob_err = FsOpsError::glob("compile", "[", glob_error);
        assert!(matches!(glob_err, FsOpsError::Glob { .. }));
        assert_eq!(glob_err.to_string(), "fsops glob failure");

        let temp = tempfile::tempdir()?;
        let missing = temp.path().join("missing");
        let walkdir_error = WalkDir::new(&missing)
            .into_iter()
            .next()
            .and_then(Result::err)
            .ok_or_else(|| io::Error::other("expected walkdir error"))?;
        let scan_err = FsOpsError::scan("walk", &missing, walkdir_error);
        assert!(matches!(scan_err, FsOpsError::Scan { .. }));
        assert!(scan_err.source().is_some());
        Ok(())
    }

    #[test]
    fn timeout_is_distinguishable_from_exit() {
        let timeout = FsOpsError::run("sleep 5", RunFailure::Timeout { seconds: 1 });
        let exit = FsOpsError::run("false", RunFailure::Exit { code: Some(1) });
        assert!(timeout.is_timeout());
        assert!(!exit.is_timeout());
        assert_eq!(RunFailure::Exit { code: Some(3) }.exit_code(), 3);
        assert_eq!(RunFailure::Timeout { seconds: 1 }.exit_code(), -1);
    }

    #[test]
    fn error_chain_joins_sources() {
        let err = FsOpsError::io("render.read", "/src/a", io::Error::other("denied"));
        assert_eq!(error_chain(&err), "fsops io failure: denied");
    }
}
