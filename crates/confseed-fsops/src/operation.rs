//! Engine-level operation: one selection and action configuration run over an inventory.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;
use tracing::{info, warn};

use crate::context::{EnvMap, merge_data, merge_env};
use crate::dispatch::{ItemAction, ItemKind, Selection, Selector};
use crate::error::{FsOpsError, FsOpsResult, error_chain};
use crate::permissions::PermissionEnforcer;
use crate::router::{ActionRouter, DeletePolicy};
use crate::runner::CommandSpec;
use crate::scan::Inventory;
use crate::templator::TemplateEngine;

/// One permission rule as configured.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionSpec {
    /// Glob matched against the destination-relative path.
    pub glob: String,
    /// User name or numeric id; empty means the current user.
    pub user: String,
    /// Group name or numeric id; empty means the current group.
    pub group: String,
    /// Mode bits; `0` leaves the mode alone.
    pub mode: u32,
}

/// Everything one operation needs besides the inventory.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationSpec {
    /// Selection regex over relative paths.
    pub regex: String,
    /// Relative paths that are never selected.
    pub exclusions: Vec<String>,
    /// Entry kinds handed to the router.
    pub kind: ItemKind,
    /// Destination root; `None` for command-only operations.
    pub destination: Option<PathBuf>,
    /// Create missing directories and overwrite existing copies.
    pub force: bool,
    /// Drop the final extension of file destinations.
    pub strip_extension: bool,
    /// Render instead of copying.
    pub render: bool,
    /// Deletion flags.
    pub delete: DeletePolicy,
    /// Operation-local template data, merged over the global data.
    pub data: Value,
    /// Condition template.
    pub condition: Option<String>,
    /// Permission rules in declaration order.
    pub permissions: Vec<PermissionSpec>,
    /// Mode for created directories; `0` uses the source or default mode.
    pub default_dir_mode: u32,
    /// Mode for written files; `0` uses the source mode.
    pub default_file_mode: u32,
    /// Command executed per entry.
    pub command: Option<CommandSpec>,
}

impl Default for OperationSpec {
    fn default() -> Self {
        Self {
            regex: ".*".to_string(),
            exclusions: Vec::new(),
            kind: ItemKind::File,
            destination: None,
            force: true,
            strip_extension: true,
            render: true,
            delete: DeletePolicy::default(),
            data: Value::Null,
            condition: None,
            permissions: Vec::new(),
            default_dir_mode: 0,
            default_file_mode: 0,
            command: None,
        }
    }
}

/// Inputs shared by every operation of a run.
#[derive(Clone, Debug, Default)]
pub struct SharedContext {
    /// Global template data.
    pub data: Value,
    /// Snapshot of the process environment.
    pub inherited_env: EnvMap,
    /// Global environment overlay.
    pub global_env: EnvMap,
}

/// Result of one operation pass.
#[derive(Debug, Default)]
pub struct OperationOutcome {
    /// Every relative path handed to the router, failed ones included.
    pub processed: Vec<String>,
    /// Entry failures keyed by relative source path.
    pub failures: BTreeMap<String, FsOpsError>,
    /// Permission rules that could not be registered.
    pub rule_failures: Vec<FsOpsError>,
    /// Permission rules that failed on a destination, keyed by destination path.
    pub permission_failures: BTreeMap<String, FsOpsError>,
}

impl OperationOutcome {
    /// Returns `true` when nothing failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.rule_failures.is_empty() && self.permission_failures.is_empty()
    }

    /// One human-readable line per failure.
    #[must_use]
    pub fn failure_lines(&self) -> Vec<String> {
        let rules = self
            .rule_failures
            .iter()
            .map(|err| format!("permission rule: {}", error_chain(err)));
        let entries = self
            .failures
            .iter()
            .map(|(path, err)| format!("{path}: {}", error_chain(err)));
        let permissions = self
            .permission_failures
            .iter()
            .map(|(path, err)| format!("{path}: {}", error_chain(err)));
        rules.chain(entries).chain(permissions).collect()
    }
}

/// A configured operation ready to run against inventories.
#[derive(Debug)]
pub struct Operation {
    spec: OperationSpec,
    engine: TemplateEngine,
}

impl Operation {
    /// Wrap `spec` with a fresh template engine.
    #[must_use]
    pub fn new(spec: OperationSpec) -> Self {
        Self {
            spec,
            engine: TemplateEngine::new(),
        }
    }

    /// The operation's configuration.
    #[must_use]
    pub const fn spec(&self) -> &OperationSpec {
        &self.spec
    }

    /// Run the operation over `inventory`.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Pattern`] for an invalid selection regex and [`FsOpsError::InvalidInput`]
    /// when the data sources cannot be merged. Entry failures are reported in the outcome.
    pub fn run(&self, inventory: &Inventory, shared: &SharedContext) -> FsOpsResult<OperationOutcome> {
        let spec = &self.spec;
        let selector = Selector::new(&spec.regex, spec.exclusions.iter().cloned(), spec.kind)?;
        let data = merge_data(&shared.data, &spec.data)?;
        let local_env = spec
            .command
            .as_ref()
            .map_or_else(EnvMap::new, |command| command.env.clone());
        let env = merge_env(&shared.inherited_env, &shared.global_env, &local_env);

        let mut outcome = OperationOutcome::default();
        let mut permissions = PermissionEnforcer::new();
        for rule in &spec.permissions {
            if let Err(err) = permissions.register(&rule.glob, &rule.user, &rule.group, rule.mode) {
                warn!(glob = %rule.glob, error = %err, "skipping permission rule");
                outcome.rule_failures.push(err);
            }
        }

        let mut router = ActionRouter::new(
            Selection::new(selector),
            spec,
            &self.engine,
            &permissions,
            &data,
            &env,
        );
        if let Err(err) = inventory.dispatch(&mut router) {
            warn!(root = %inventory.root().display(), error = %err, "operation finished with failures");
        }

        let (processed, failures) = router.selection_mut().take_accounting().into_parts();
        outcome.processed = processed;
        outcome.failures = failures;
        outcome.permission_failures = router.take_permission_failures();
        info!(
            root = %inventory.root().display(),
            processed = outcome.processed.len(),
            failed = outcome.failures.len(),
            "operation complete"
        );
        Ok(outcome)
    }
}
