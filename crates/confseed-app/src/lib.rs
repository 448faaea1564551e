#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    unreachable_pub,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

//! confseed application wiring.
//!
//! Layout: `cli.rs` (arguments and overrides), `bootstrap.rs` (configuration, data and logging
//! setup), `orchestrator.rs` (hooks, umask and process runs), `error.rs`.

/// Application bootstrap.
pub mod bootstrap;
/// Command-line interface.
pub mod cli;
pub mod error;
/// Hook and process orchestration.
pub mod orchestrator;

pub use bootstrap::{BootstrapDependencies, run_app, run_app_with};
pub use cli::Cli;
pub use error::{AppError, AppResult};
pub use orchestrator::{Orchestrator, RunReport, UmaskGuard};
