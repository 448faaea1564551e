//! Per-entry action routing: condition, pre-start deletion, one action, cleanup.
//!
//! # Design
//! - The condition renders against the entry context; with `if_condition` its trimmed output is
//!   parsed into a [`ConditionPolicy`] which may add delete flags for the current entry only.
//! - Exactly one of run-command, render or replicate executes per entry.
//! - Pre-start deletion failures are fatal for the entry; post-action cleanup failures are logged.
//! - Permission failures after a successful action are tracked apart from entry failures.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::{EnvMap, TemplateContext};
use crate::dispatch::{ItemAction, Selection};
use crate::error::{FsOpsError, FsOpsResult};
use crate::operation::OperationSpec;
use crate::permissions::PermissionEnforcer;
use crate::replicator::{DEFAULT_DIR_MODE, Replicator};
use crate::runner::CommandRunner;
use crate::scan::InventoryEntry;
use crate::templator::{TemplateEngine, Templator};

/// Independent deletion flags; any subset may be active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeletePolicy {
    /// Remove an existing non-directory destination before acting.
    pub pre_start: bool,
    /// Interpret the condition output as a [`ConditionPolicy`].
    pub if_condition: bool,
    /// Remove rendered output that is exactly zero bytes.
    pub if_empty: bool,
    /// Remove the destination after a failed render.
    pub if_render_fail: bool,
    /// Remove the destination after a command ran, whatever its result.
    pub after_exec: bool,
}

impl Default for DeletePolicy {
    fn default() -> Self {
        Self {
            pre_start: true,
            if_condition: false,
            if_empty: false,
            if_render_fail: false,
            after_exec: false,
        }
    }
}

/// Directive produced by a rendered condition when `if_condition` is active.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConditionPolicy {
    /// Empty output or `render`.
    Render,
    /// `skip`.
    Skip,
    /// `delete`: remove the existing destination and skip.
    Delete,
    /// `delete-if-empty`.
    DeleteIfEmpty,
    /// `delete-if-fail`.
    DeleteIfFail,
    /// `delete-after-exec`.
    DeleteAfterExec,
    /// Anything else; the entry is skipped.
    Unrecognized(String),
}

impl ConditionPolicy {
    /// Parse trimmed, case-insensitive condition output.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let token = raw.trim().to_lowercase();
        match token.as_str() {
            "" | "render" => Self::Render,
            "skip" => Self::Skip,
            "delete" => Self::Delete,
            "delete-if-empty" => Self::DeleteIfEmpty,
            "delete-if-fail" => Self::DeleteIfFail,
            "delete-after-exec" => Self::DeleteAfterExec,
            _ => Self::Unrecognized(raw.trim().to_string()),
        }
    }

    /// Fold the directive into `policy` and decide whether the entry proceeds.
    #[must_use]
    pub fn apply(&self, policy: &mut DeletePolicy) -> Decision {
        match self {
            Self::Render => Decision::Proceed,
            Self::Skip => Decision::Skip("condition requested skip".to_string()),
            Self::Delete => {
                policy.pre_start = true;
                Decision::Skip("condition requested delete".to_string())
            }
            Self::DeleteIfEmpty => {
                policy.if_empty = true;
                Decision::Proceed
            }
            Self::DeleteIfFail => {
                policy.if_render_fail = true;
                Decision::Proceed
            }
            Self::DeleteAfterExec => {
                policy.after_exec = true;
                Decision::Proceed
            }
            Self::Unrecognized(value) => {
                Decision::Skip(format!("unrecognized condition policy '{value}'"))
            }
        }
    }
}

/// Outcome of condition evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Run the selected action.
    Proceed,
    /// Skip the entry; the reason is logged.
    Skip(String),
}

/// The action chosen for an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Run the configured command (rendering first when a destination and render are set).
    RunCommand,
    /// Render the template to the destination.
    Render,
    /// Copy verbatim to the destination.
    Replicate,
    /// Nothing configured.
    Nothing,
}

impl Action {
    /// Select the action from the operation's shape.
    #[must_use]
    pub const fn choose(has_command: bool, has_destination: bool, render: bool) -> Self {
        match (has_command, has_destination, render) {
            (true, _, _) => Self::RunCommand,
            (false, true, true) => Self::Render,
            (false, true, false) => Self::Replicate,
            (false, false, _) => Self::Nothing,
        }
    }
}

/// Remove `path` if present. Directories are only removed when empty.
fn remove_existing(path: &Path, operation: &'static str) -> FsOpsResult<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(FsOpsError::io(operation, path, err)),
    };
    let removed = if metadata.is_dir() {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|source_err| FsOpsError::io(operation, path, source_err))?;
    debug!(path = %path.display(), operation, "removed destination");
    Ok(true)
}

/// Dispatch strategy implementing the per-entry state machine.
pub struct ActionRouter<'a> {
    selection: Selection,
    spec: &'a OperationSpec,
    engine: &'a TemplateEngine,
    permissions: &'a PermissionEnforcer,
    data: &'a Value,
    env: &'a EnvMap,
    replicator: Replicator,
    templator: Templator,
    permission_failures: BTreeMap<String, FsOpsError>,
}

impl<'a> ActionRouter<'a> {
    /// Assemble a router for one operation pass.
    ///
    /// `env` is the merged environment used both by templates and by the command process.
    #[must_use]
    pub fn new(
        selection: Selection,
        spec: &'a OperationSpec,
        engine: &'a TemplateEngine,
        permissions: &'a PermissionEnforcer,
        data: &'a Value,
        env: &'a EnvMap,
    ) -> Self {
        Self {
            selection,
            spec,
            engine,
            permissions,
            data,
            env,
            replicator: Replicator::new(spec.force, spec.default_dir_mode, spec.default_file_mode),
            templator: Templator::new(spec.default_dir_mode, spec.default_file_mode),
            permission_failures: BTreeMap::new(),
        }
    }

    /// Take permission failures recorded so far, keyed by destination path.
    pub fn take_permission_failures(&mut self) -> BTreeMap<String, FsOpsError> {
        std::mem::take(&mut self.permission_failures)
    }

    fn evaluate_condition(
        &self,
        ctx: &TemplateContext<'_>,
        policy: &mut DeletePolicy,
    ) -> FsOpsResult<Decision> {
        let Some(condition) = self
            .spec
            .condition
            .as_deref()
            .filter(|condition| !condition.trim().is_empty())
        else {
            return Ok(Decision::Proceed);
        };
        let rendered = self.engine.render_inline("condition", condition, ctx)?;
        let output = rendered.trim();
        if !policy.if_condition {
            return Ok(if output.is_empty() {
                Decision::Proceed
            } else {
                Decision::Skip(output.to_string())
            });
        }
        let parsed = ConditionPolicy::parse(output);
        if let ConditionPolicy::Unrecognized(value) = &parsed {
            let err = FsOpsError::Policy {
                value: value.clone(),
            };
            warn!(
                source = %ctx.source_full_path,
                value = %value,
                error = %err,
                "ignoring entry with unrecognized condition policy"
            );
        }
        Ok(parsed.apply(policy))
    }

    fn enforce_permissions(&mut self, ctx: &TemplateContext<'_>, dst: &Path) {
        if self.permissions.is_empty() || fs::symlink_metadata(dst).is_err() {
            return;
        }
        if let Err(err) = self.permissions.apply(ctx.relative_destination(), dst) {
            self.permission_failures
                .insert(dst.display().to_string(), err);
        }
    }

    /// Mode applied to the output file: a symlink's target mode, otherwise the entry's own.
    fn source_mode(ctx: &TemplateContext<'_>, entry: &InventoryEntry) -> FsOpsResult<u32> {
        if !entry.is_symlink() {
            return Ok(entry.permissions());
        }
        let source = ctx.source_full();
        let metadata = fs::metadata(source)
            .map_err(|source_err| FsOpsError::io("router.link_target", source, source_err))?;
        Ok(metadata.permissions().mode() & 0o7777)
    }

    fn cleanup(dst: &Path, operation: &'static str) {
        if let Err(err) = remove_existing(dst, operation) {
            warn!(path = %dst.display(), operation, error = %err, "failed to remove destination");
        }
    }

    fn render(
        &mut self,
        ctx: &TemplateContext<'_>,
        entry: &InventoryEntry,
        policy: DeletePolicy,
    ) -> FsOpsResult<()> {
        let Some(dst) = ctx.destination_full() else {
            return Ok(());
        };
        if entry.is_dir() {
            self.templator.create_dir(dst)?;
            self.enforce_permissions(ctx, dst);
            return Ok(());
        }
        let mode = Self::source_mode(ctx, entry)?;
        if let Err(err) = self.templator.render_file(self.engine, ctx, mode) {
            if policy.if_render_fail {
                Self::cleanup(dst, "router.if_render_fail");
            }
            return Err(err);
        }
        if policy.if_empty {
            match fs::metadata(dst) {
                Ok(metadata) if metadata.len() == 0 => {
                    info!(path = %dst.display(), "removing empty rendered file");
                    Self::cleanup(dst, "router.if_empty");
                    return Ok(());
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(path = %dst.display(), error = %err, "cannot stat rendered file");
                }
            }
        }
        self.enforce_permissions(ctx, dst);
        Ok(())
    }

    fn replicate(&mut self, ctx: &TemplateContext<'_>, entry: &InventoryEntry) -> FsOpsResult<()> {
        let Some(dst) = ctx.destination_full() else {
            return Ok(());
        };
        if entry.is_dir() {
            self.replicator.mkdir(dst, entry.permissions())?;
        } else {
            let mode = Self::source_mode(ctx, entry)?;
            self.replicator
                .copy_file(ctx.source_full(), dst, DEFAULT_DIR_MODE, mode)?;
        }
        self.enforce_permissions(ctx, dst);
        Ok(())
    }

    fn run_command(
        &mut self,
        ctx: &TemplateContext<'_>,
        entry: &InventoryEntry,
        policy: DeletePolicy,
    ) -> FsOpsResult<()> {
        let Some(command) = self.spec.command.as_ref() else {
            return Ok(());
        };
        if self.spec.render && ctx.destination_full().is_some() {
            self.render(ctx, entry, policy)?;
        }
        let line = self.engine.render_inline("command", &command.line(), ctx)?;
        let dir = command.dir.clone().unwrap_or_else(|| {
            if ctx.destination_path.is_empty() {
                PathBuf::from(&ctx.source_path)
            } else {
                PathBuf::from(&ctx.destination_path)
            }
        });
        let result = CommandRunner::from_line(
            &line,
            command.timeout_secs,
            Some(&dir),
            self.env.clone(),
        )
        .and_then(|runner| runner.run());

        if policy.after_exec {
            if let Some(dst) = ctx.destination_full() {
                Self::cleanup(dst, "router.after_exec");
            }
        }
        result.map(|status| {
            debug!(
                source = %ctx.source_full_path,
                pid = status.pid,
                "command completed for entry"
            );
        })
    }
}

impl ItemAction for ActionRouter<'_> {
    fn selection(&self) -> &Selection {
        &self.selection
    }

    fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    fn apply(&mut self, root: &Path, path: &str, entry: &InventoryEntry) -> FsOpsResult<()> {
        let spec = self.spec;
        let ctx = TemplateContext::new(
            root,
            path,
            entry,
            spec.destination.as_deref(),
            spec.strip_extension,
            self.data,
            self.env,
        );
        let mut policy = spec.delete;
        let decision = self.evaluate_condition(&ctx, &mut policy)?;

        if policy.pre_start && !entry.is_dir() {
            if let Some(dst) = ctx.destination_full() {
                remove_existing(dst, "router.pre_start")?;
            }
        }
        if let Decision::Skip(reason) = decision {
            info!(source = %ctx.source_full_path, reason = %reason, "skipping entry");
            return Ok(());
        }

        let action = Action::choose(
            spec.command.is_some(),
            spec.destination.is_some(),
            spec.render,
        );
        debug!(source = %ctx.source_full_path, action = ?action, "routing entry");
        match action {
            Action::RunCommand => self.run_command(&ctx, entry, policy),
            Action::Render => self.render(&ctx, entry, policy),
            Action::Replicate => self.replicate(&ctx, entry),
            Action::Nothing => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::inherited_env;
    use crate::dispatch::ItemKind;
    use crate::operation::{Operation, PermissionSpec, SharedContext};
    use crate::runner::CommandSpec;
    use crate::scan::Scanner;
    use confseed_test_support::fixtures::TreeFixture;
    use std::error::Error;

    type TestResult<T> = Result<T, Box<dyn Error>>;

    fn shared() -> SharedContext {
        SharedContext {
            data: Value::Null,
            inherited_env: inherited_env(),
            global_env: EnvMap::new(),
        }
    }

    fn spec_for(dst: &TreeFixture) -> OperationSpec {
        OperationSpec {
            destination: Some(dst.path().to_path_buf()),
            ..OperationSpec::default()
        }
    }

    #[test]
    fn condition_policy_parses_case_insensitively() {
        assert_eq!(ConditionPolicy::parse("  "), ConditionPolicy::Render);
        assert_eq!(ConditionPolicy::parse("RENDER"), ConditionPolicy::Render);
        assert_eq!(ConditionPolicy::parse(" Skip\n"), ConditionPolicy::Skip);
        assert_eq!(ConditionPolicy::parse("delete-if-EMPTY"), ConditionPolicy::DeleteIfEmpty);
        assert_eq!(
            ConditionPolicy::parse("explode"),
            ConditionPolicy::Unrecognized("explode".to_string())
        );
    }

    #[test]
    fn condition_policy_adds_flags() {
        let mut policy = DeletePolicy {
            pre_start: false,
            ..DeletePolicy::default()
        };
        assert!(matches!(ConditionPolicy::Delete.apply(&mut policy), Decision::Skip(_)));
        assert!(policy.pre_start);
        assert_eq!(ConditionPolicy::DeleteAfterExec.apply(&mut policy), Decision::Proceed);
        assert!(policy.after_exec);
        assert!(matches!(
            ConditionPolicy::Unrecognized("x".into()).apply(&mut policy),
            Decision::Skip(_)
        ));
    }

    #[test]
    fn action_choice_follows_configuration() {
        assert_eq!(Action::choose(true, true, true), Action::RunCommand);
        assert_eq!(Action::choose(false, true, true), Action::Render);
        assert_eq!(Action::choose(false, true, false), Action::Replicate);
        assert_eq!(Action::choose(false, false, true), Action::Nothing);
    }

    #[test]
    fn unconditional_render_creates_output() -> TestResult<()> {
        let src = TreeFixture::new()?;
        let dst = TreeFixture::new()?;
        src.write("app.conf.tpl", "value={{ data.value }}\n")?;
        let inventory = Scanner::default().scan(src.path())?;
        let spec = OperationSpec {
            data: serde_json::json!({"value": 42}),
            ..spec_for(&dst)
        };

        let outcome = Operation::new(spec).run(&inventory, &shared())?;
        assert!(outcome.is_success());
        assert_eq!(dst.read("app.conf")?, "value=42\n");
        assert_eq!(outcome.processed, vec!["app.conf.tpl"]);
        Ok(())
    }

    #[test]
    fn skip_token_skips_without_creating_output() -> TestResult<()> {
        let src = TreeFixture::new()?;
        let dst = TreeFixture::new()?;
        src.write("app.conf.tpl", "x")?;
        let inventory = Scanner::default().scan(src.path())?;
        let spec = OperationSpec {
            condition: Some("skip".to_string()),
            delete: DeletePolicy {
                if_condition: true,
                ..DeletePolicy::default()
            },
            ..spec_for(&dst)
        };

        let outcome = Operation::new(spec).run(&inventory, &shared())?;
        assert!(outcome.is_success());
        assert!(!dst.exists("app.conf"));
        Ok(())
    }

    #[test]
    fn non_empty_condition_without_policy_flag_skips() -> TestResult<()> {
        let src = TreeFixture::new()?;
        let dst = TreeFixture::new()?;
        src.write("keep.conf", "k")?;
        src.write("drop.conf", "d")?;
        let inventory = Scanner::default().scan(src.path())?;
        let spec = OperationSpec {
            condition: Some("{% if source == 'drop.conf' %}not wanted{% endif %}".to_string()),
            strip_extension: false,
            ..spec_for(&dst)
        };

        let outcome = Operation::new(spec).run(&inventory, &shared())?;
        assert!(outcome.is_success());
        assert!(dst.exists("keep.conf"));
        assert!(!dst.exists("drop.conf"));
        Ok(())
    }

    #[test]
    fn delete_if_empty_removes_zero_byte_output() -> TestResult<()> {
        let src = TreeFixture::new()?;
        let dst = TreeFixture::new()?;
        src.write("empty.conf.tpl", "{% if false %}never{% endif %}")?;
        let inventory = Scanner::default().scan(src.path())?;
        let spec = OperationSpec {
            condition: Some("delete-if-empty".to_string()),
            delete: DeletePolicy {
                if_condition: true,
                ..DeletePolicy::default()
            },
            ..spec_for(&dst)
        };

        let outcome = Operation::new(spec).run(&inventory, &shared())?;
        assert!(outcome.is_success());
        assert!(!dst.exists("empty.conf"));
        Ok(())
    }

    #[test]
    fn delete_token_removes_existing_destination_and_skips() -> TestResult<()> {
        let src = TreeFixture::new()?;
        let dst = TreeFixture::new()?;
        src.write("old.conf.tpl", "new body")?;
        dst.write("old.conf", "stale")?;
        let inventory = Scanner::default().scan(src.path())?;
        let spec = OperationSpec {
            condition: Some("DELETE".to_string()),
            delete: DeletePolicy {
                pre_start: false,
                if_condition: true,
                ..DeletePolicy::default()
            },
            ..spec_for(&dst)
        };

        let outcome = Operation::new(spec).run(&inventory, &shared())?;
        assert!(outcome.is_success());
        assert!(!dst.exists("old.conf"));
        Ok(())
    }

    #[test]
    fn failed_render_with_if_render_fail_removes_destination() -> TestResult<()> {
        let src = TreeFixture::new()?;
        let dst = TreeFixture::new()?;
        src.write("bad.conf.tpl", "{{ fail('nope') }}")?;
        dst.write("bad.conf", "previous")?;
        let inventory = Scanner::default().scan(src.path())?;
        let spec = OperationSpec {
            delete: DeletePolicy {
                pre_start: false,
                if_render_fail: true,
                ..DeletePolicy::default()
            },
            ..spec_for(&dst)
        };

        let outcome = Operation::new(spec).run(&inventory, &shared())?;
        assert!(!outcome.is_success());
        assert!(matches!(
            outcome.failures.get("bad.conf.tpl"),
            Some(FsOpsError::Render { .. })
        ));
        assert!(!dst.exists("bad.conf"));
        Ok(())
    }

    fn render_fail_and_empty() -> DeletePolicy {
        DeletePolicy {
            pre_start: false,
            if_render_fail: true,
            if_empty: true,
            ..DeletePolicy::default()
        }
    }

    #[test]
    fn render_fail_and_empty_flags_remove_on_failed_render() -> TestResult<()> {
        let src = TreeFixture::new()?;
        let dst = TreeFixture::new()?;
        src.write("svc.conf.tpl", "{{ fail('missing key') }}")?;
        dst.write("svc.conf", "previous")?;
        let inventory = Scanner::default().scan(src.path())?;
        let spec = OperationSpec {
            delete: render_fail_and_empty(),
            ..spec_for(&dst)
        };

        let outcome = Operation::new(spec).run(&inventory, &shared())?;
        assert!(!outcome.is_success());
        assert_eq!(outcome.failures.len(), 1);
        assert!(matches!(
            outcome.failures.get("svc.conf.tpl"),
            Some(FsOpsError::Render { .. })
        ));
        assert!(!dst.exists("svc.conf"));
        Ok(())
    }

    #[test]
    fn render_fail_and_empty_flags_remove_empty_output() -> TestResult<()> {
        let src = TreeFixture::new()?;
        let dst = TreeFixture::new()?;
        src.write("svc.conf.tpl", "{% if data.enabled %}port=80{% endif %}")?;
        src.write("other.conf.tpl", "kept")?;
        dst.write("svc.conf", "previous")?;
        let inventory = Scanner::default().scan(src.path())?;
        let spec = OperationSpec {
            data: serde_json::json!({"enabled": false}),
            delete: render_fail_and_empty(),
            ..spec_for(&dst)
        };

        let outcome = Operation::new(spec).run(&inventory, &shared())?;
        assert!(outcome.is_success(), "failures: {:?}", outcome.failures);
        assert!(!dst.exists("svc.conf"));
        assert_eq!(dst.read("other.conf")?, "kept");
        Ok(())
    }

    #[test]
    fn symlinked_sources_take_the_target_mode() -> TestResult<()> {
        let src = TreeFixture::new()?;
        let dst = TreeFixture::new()?;
        src.write("real.txt", "payload")?;
        src.chmod("real.txt", 0o640)?;
        src.write("real.conf.tpl", "rendered")?;
        src.chmod("real.conf.tpl", 0o600)?;
        std::os::unix::fs::symlink(src.join("real.txt"), src.join("link.txt"))?;
        std::os::unix::fs::symlink(src.join("real.conf.tpl"), src.join("link.conf.tpl"))?;
        let inventory = Scanner::default().scan(src.path())?;

        let copy = OperationSpec {
            render: false,
            strip_extension: false,
            regex: r"\.txt$".to_string(),
            ..spec_for(&dst)
        };
        let outcome = Operation::new(copy).run(&inventory, &shared())?;
        assert!(outcome.is_success(), "failures: {:?}", outcome.failures);
        assert_eq!(dst.read("link.txt")?, "payload");
        assert_eq!(dst.mode("link.txt")?, 0o640);

        let render = OperationSpec {
            regex: r"\.tpl$".to_string(),
            ..spec_for(&dst)
        };
        let outcome = Operation::new(render).run(&inventory, &shared())?;
        assert!(outcome.is_success(), "failures: {:?}", outcome.failures);
        assert_eq!(dst.read("link.conf")?, "rendered");
        assert_eq!(dst.mode("link.conf")?, 0o600);
        Ok(())
    }

    #[test]
    fn command_timeout_fails_only_that_entry() -> TestResult<()> {
        let src = TreeFixture::new()?;
        src.write("fast.sh", "")?;
        src.write("slow.sh", "")?;
        let inventory = Scanner::default().scan(src.path())?;
        let spec = OperationSpec {
            destination: None,
            command: Some(CommandSpec {
                args: vec![
                    "{% if source == 'slow.sh' %}sleep 5{% else %}true{% endif %}".to_string(),
                ],
                timeout_secs: 1,
                ..CommandSpec::default()
            }),
            ..OperationSpec::default()
        };

        let outcome = Operation::new(spec).run(&inventory, &shared())?;
        assert_eq!(outcome.processed.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        let failure = outcome
            .failures
            .get("slow.sh")
            .ok_or_else(|| std::io::Error::other("slow.sh must fail"))?;
        assert!(failure.is_timeout());
        Ok(())
    }

    #[test]
    fn command_after_render_runs_in_destination_directory() -> TestResult<()> {
        let src = TreeFixture::new()?;
        let dst = TreeFixture::new()?;
        src.write("conf/setup.sh.tpl", "echo {{ data.word }}\n")?;
        let inventory = Scanner::default().scan(src.path())?;
        let spec = OperationSpec {
            data: serde_json::json!({"word": "rendered"}),
            command: Some(CommandSpec {
                args: vec!["cp".to_string(), "{{ filename }}".to_string(), "copy.txt".to_string()],
                timeout_secs: 10,
                ..CommandSpec::default()
            }),
            ..spec_for(&dst)
        };

        let outcome = Operation::new(spec).run(&inventory, &shared())?;
        assert!(outcome.is_success(), "failures: {:?}", outcome.failures);
        assert_eq!(dst.read("conf/copy.txt")?, "echo rendered\n");
        Ok(())
    }

    #[test]
    fn after_exec_removes_destination_even_on_failure() -> TestResult<()> {
        let src = TreeFixture::new()?;
        let dst = TreeFixture::new()?;
        src.write("job.sh.tpl", "exit 1\n")?;
        let inventory = Scanner::default().scan(src.path())?;
        let spec = OperationSpec {
            delete: DeletePolicy {
                after_exec: true,
                ..DeletePolicy::default()
            },
            command: Some(CommandSpec {
                args: vec!["sh".to_string(), "{{ destination }}".to_string()],
                timeout_secs: 10,
                ..CommandSpec::default()
            }),
            ..spec_for(&dst)
        };

        let outcome = Operation::new(spec).run(&inventory, &shared())?;
        assert!(matches!(
            outcome.failures.get("job.sh.tpl"),
            Some(FsOpsError::Run { .. })
        ));
        assert!(!dst.exists("job.sh"));
        Ok(())
    }

    #[test]
    fn replicate_keeps_success_when_permission_rule_fails() -> TestResult<()> {
        let src = TreeFixture::new()?;
        let dst = TreeFixture::new()?;
        src.write("a.txt", "payload")?;
        let inventory = Scanner::default().scan(src.path())?;
        let spec = OperationSpec {
            render: false,
            strip_extension: false,
            kind: ItemKind::Any,
            permissions: vec![
                PermissionSpec {
                    glob: "*".to_string(),
                    user: String::new(),
                    group: "no-such-group-confseed".to_string(),
                    mode: 0o600,
                },
                PermissionSpec {
                    glob: "*.txt".to_string(),
                    user: String::new(),
                    group: String::new(),
                    mode: 0o640,
                },
            ],
            ..spec_for(&dst)
        };

        let outcome = Operation::new(spec).run(&inventory, &shared())?;
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.rule_failures.len(), 1);
        assert!(matches!(outcome.rule_failures[0], FsOpsError::GroupLookup { .. }));
        assert!(!outcome.is_success());
        assert_eq!(dst.read("a.txt")?, "payload");
        assert_eq!(dst.mode("a.txt")?, 0o640);
        Ok(())
    }
}
