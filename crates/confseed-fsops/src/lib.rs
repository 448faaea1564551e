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

//! Filesystem action engine: scan a source tree, then copy, render or execute per selected entry.
//!
//! Layout: pattern.rs (glob compiler), scan.rs (inventory), dispatch.rs (selection and per-entry
//! dispatch), permissions.rs (ownership and mode rules), replicator.rs (verbatim copies),
//! functions.rs + templator.rs (rendering), runner.rs (external commands), router.rs (per-entry
//! state machine), operation.rs (one configured pass over an inventory), context.rs (template
//! context and data/environment merging), error.rs.

pub mod context;
pub mod dispatch;
pub mod error;
mod functions;
pub mod operation;
pub mod pattern;
pub mod permissions;
pub mod replicator;
pub mod router;
pub mod runner;
pub mod scan;
pub mod templator;

pub use context::{EnvMap, TemplateContext, inherited_env, merge_data, merge_env};
pub use dispatch::{ItemAction, ItemKind, Selection, Selector};
pub use error::{FsOpsError, FsOpsResult, RunFailure, error_chain};
pub use operation::{Operation, OperationOutcome, OperationSpec, PermissionSpec, SharedContext};
pub use pattern::Pattern;
pub use permissions::{PermissionEnforcer, parse_octal_mode};
pub use router::{ConditionPolicy, DeletePolicy};
pub use runner::{CommandRunner, CommandSpec, DEFAULT_TIMEOUT_SECS, RunStatus};
pub use scan::{Inventory, InventoryEntry, ScanFilters, Scanner};
pub use templator::TemplateEngine;
