//! Run orchestration: hooks around the configured processes, umask handling and failure
//! collection.
//!
//! # Design
//! - The umask is cleared for the whole run so configured modes land exactly; the previous mask
//!   is restored when the guard drops.
//! - Processes only run when the start hook succeeded.
//! - The finish hook sees `CONFSEED_RC_START` (only when a start hook ran) and
//!   `CONFSEED_RC_PROCESS` (only when processes ran).
//! - Engine errors never abort the run; each becomes a failure line in the [`RunReport`].

use confseed_config::{CommandConfig, Config, ProcessConfig};
use confseed_fsops::{
    CommandRunner, EnvMap, FsOpsError, FsOpsResult, Operation, Scanner, SharedContext, error_chain,
    merge_env,
};
use nix::sys::stat::{Mode, umask};
use serde_json::Value;
use tracing::{error, info, warn};

/// Exported to the finish hook: exit code of the start hook.
pub const RC_START_VAR: &str = "CONFSEED_RC_START";
/// Exported to the finish hook: `0` when every process succeeded, else `1`.
pub const RC_PROCESS_VAR: &str = "CONFSEED_RC_PROCESS";

/// Clears the process umask and restores the previous one on drop.
#[derive(Debug)]
pub struct UmaskGuard {
    previous: Mode,
}

impl UmaskGuard {
    /// Set the umask to zero.
    #[must_use]
    pub fn clear() -> Self {
        Self {
            previous: umask(Mode::empty()),
        }
    }
}

impl Drop for UmaskGuard {
    fn drop(&mut self) {
        umask(self.previous);
    }
}

/// Summary of a complete run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Start hook exit code; `None` when no start hook is configured.
    pub start_code: Option<i32>,
    /// `0` or `1`; `None` when processes did not run.
    pub process_code: Option<i32>,
    /// Finish hook exit code; `None` when no finish hook is configured.
    pub finish_code: Option<i32>,
    /// One line per failure, in the order they happened.
    pub failures: Vec<String>,
}

impl RunReport {
    /// Returns `true` when nothing failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Process exit code for the run.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::from(!self.is_success())
    }
}

/// Drives one configuration from start hook to finish hook.
#[derive(Debug)]
pub struct Orchestrator {
    config: Config,
    shared: SharedContext,
}

impl Orchestrator {
    /// Build an orchestrator over a validated configuration.
    #[must_use]
    pub fn new(config: Config, data: Value, inherited_env: EnvMap) -> Self {
        let shared = SharedContext {
            data,
            inherited_env,
            global_env: config.env.clone(),
        };
        Self { config, shared }
    }

    /// Execute the run and collect every failure.
    #[must_use]
    pub fn run(&self) -> RunReport {
        let _umask = UmaskGuard::clear();
        let mut report = RunReport::default();

        let start_ok = match &self.config.start {
            Some(hook) => {
                let code = self.run_hook("start", hook, &EnvMap::new(), &mut report);
                report.start_code = Some(code);
                code == 0
            }
            None => true,
        };

        if start_ok {
            let before = report.failures.len();
            self.run_processes(&mut report);
            report.process_code = Some(i32::from(report.failures.len() > before));
        } else {
            warn!("start hook failed; skipping processes");
        }

        if let Some(hook) = &self.config.finish {
            let mut extra = EnvMap::new();
            if let Some(code) = report.start_code {
                extra.insert(RC_START_VAR.to_string(), code.to_string());
            }
            if let Some(code) = report.process_code {
                extra.insert(RC_PROCESS_VAR.to_string(), code.to_string());
            }
            report.finish_code = Some(self.run_hook("finish", hook, &extra, &mut report));
        }

        info!(
            failures = report.failures.len(),
            start_code = ?report.start_code,
            process_code = ?report.process_code,
            "run complete"
        );
        report
    }

    fn run_hook(
        &self,
        name: &str,
        hook: &CommandConfig,
        extra: &EnvMap,
        report: &mut RunReport,
    ) -> i32 {
        info!(hook = name, "running hook");
        match self.execute_hook(hook, extra) {
            Ok(()) => 0,
            Err(err) => {
                error!(hook = name, error = %error_chain(&err), "hook failed");
                report
                    .failures
                    .push(format!("{name} hook: {}", error_chain(&err)));
                hook_exit_code(&err)
            }
        }
    }

    fn execute_hook(&self, hook: &CommandConfig, extra: &EnvMap) -> FsOpsResult<()> {
        let spec = hook.to_spec();
        let mut local = spec.env.clone();
        local.extend(extra.iter().map(|(key, value)| (key.clone(), value.clone())));
        let env = merge_env(&self.shared.inherited_env, &self.shared.global_env, &local);
        let runner = CommandRunner::from_line(&spec.line(), spec.timeout_secs, spec.dir.as_deref(), env)?;
        runner.run()?;
        Ok(())
    }

    fn run_processes(&self, report: &mut RunReport) {
        let mut done = Vec::new();
        for (index, process) in self.config.process.iter().enumerate() {
            let section = format!("process[{index}]");
            self.run_process(&section, process, &mut done, report);
        }
    }

    fn run_process(
        &self,
        section: &str,
        process: &ProcessConfig,
        done: &mut Vec<String>,
        report: &mut RunReport,
    ) {
        let label = format!("{section} {}", process.source.display());
        let inventory = match scan(section, process) {
            Ok(inventory) => inventory,
            Err(err) => {
                error!(process = %label, error = %err, "scan failed; skipping operations");
                report.failures.push(format!("{label}: {err}"));
                return;
            }
        };
        info!(
            process = %label,
            dirs = inventory.list_dirs().len(),
            files = inventory.list_files().len(),
            "scanned source"
        );

        for (index, operation) in process.operations.iter().enumerate() {
            let op_section = format!("{section}.operations[{index}]");
            let op_label = format!("{label} operation[{index}]");
            let spec = match operation.to_spec(&op_section, done.clone()) {
                Ok(spec) => spec,
                Err(err) => {
                    report.failures.push(format!("{op_label}: {}", error_chain(&err)));
                    continue;
                }
            };
            match Operation::new(spec).run(&inventory, &self.shared) {
                Ok(outcome) => {
                    report.failures.extend(
                        outcome
                            .failure_lines()
                            .into_iter()
                            .map(|line| format!("{op_label} {line}")),
                    );
                    if process.exclude_done {
                        done.extend(outcome.processed);
                    }
                }
                Err(err) => {
                    error!(operation = %op_label, error = %error_chain(&err), "operation failed");
                    report.failures.push(format!("{op_label}: {}", error_chain(&err)));
                }
            }
        }
    }
}

fn scan(section: &str, process: &ProcessConfig) -> Result<confseed_fsops::Inventory, String> {
    let filters = process
        .matcher
        .to_filters(section)
        .map_err(|err| error_chain(&err))?;
    Scanner::new(filters)
        .scan(&process.source)
        .map_err(|err| error_chain(&err))
}

fn hook_exit_code(err: &FsOpsError) -> i32 {
    match err {
        FsOpsError::Run { source, .. } => match source.exit_code() {
            code if code > 0 => code,
            _ => 1,
        },
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confseed_config::{DocumentFormat, parse_config};
    use confseed_test_support::fixtures::TreeFixture;
    use serde_json::json;
    use std::error::Error;
    use std::path::Path;

    type TestResult<T> = Result<T, Box<dyn Error>>;

    fn orchestrator(document: &str) -> TestResult<Orchestrator> {
        let config = parse_config(document, DocumentFormat::Yaml, Path::new("inline.yml"))?;
        confseed_config::validate(&config)?;
        Ok(Orchestrator::new(config, json!({"name": "svc"}), confseed_fsops::inherited_env()))
    }

    #[test]
    fn processes_render_and_copy_with_exclusions() -> TestResult<()> {
        let tree = TreeFixture::new()?;
        tree.write("src/app.conf.tpl", "name={{ data.name }}")?;
        tree.write("src/static.txt", "plain")?;
        let document = format!(
            "process:\n  - source: {src}\n    operations:\n      - destination: {dst}\n        regex: '\\.tpl$'\n      - destination: {dst}\n        template: false\n        strip_extension: false\n",
            src = tree.join("src").display(),
            dst = tree.join("dst").display(),
        );
        let report = orchestrator(&document)?.run();
        assert!(report.is_success(), "{:?}", report.failures);
        assert_eq!(report.process_code, Some(0));
        assert_eq!(report.start_code, None);
        assert_eq!(tree.read("dst/app.conf")?, "name=svc");
        assert_eq!(tree.read("dst/static.txt")?, "plain");
        // Already rendered by the first operation, so the copy pass skips it.
        assert!(!tree.exists("dst/app.conf.tpl"));
        Ok(())
    }

    #[test]
    fn failed_start_hook_skips_processes_and_reports_codes() -> TestResult<()> {
        let tree = TreeFixture::new()?;
        tree.write("src/a.txt.tpl", "x")?;
        let script = tree.write(
            "finish.sh",
            &format!(
                "echo \"$CONFSEED_RC_START-${{CONFSEED_RC_PROCESS:-none}}\" > {}\n",
                tree.join("rc.txt").display()
            ),
        )?;
        let document = format!(
            "start: {{ cmd: ['false'] }}\nfinish: {{ cmd: [sh, {script}] }}\nprocess:\n  - source: {src}\n    operations: [ {{ destination: {dst} }} ]\n",
            script = script.display(),
            src = tree.join("src").display(),
            dst = tree.join("dst").display(),
        );
        let report = orchestrator(&document)?.run();
        assert_eq!(report.start_code, Some(1));
        assert_eq!(report.process_code, None);
        assert!(!tree.exists("dst/a.txt"));
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].starts_with("start hook: "));
        assert_eq!(tree.read("rc.txt")?.trim(), "1-none");
        assert_eq!(report.exit_code(), 1);
        Ok(())
    }

    #[test]
    fn missing_source_is_reported_and_later_processes_still_run() -> TestResult<()> {
        let tree = TreeFixture::new()?;
        tree.write("src/ok.txt", "ok")?;
        let document = format!(
            "start: {{ cmd: ['true'] }}\nprocess:\n  - source: {missing}\n    operations: [ {{ destination: {dst} }} ]\n  - source: {src}\n    operations: [ {{ destination: {dst}, template: false, strip_extension: false }} ]\n",
            missing = tree.join("absent").display(),
            src = tree.join("src").display(),
            dst = tree.join("dst").display(),
        );
        let report = orchestrator(&document)?.run();
        assert_eq!(report.start_code, Some(0));
        assert_eq!(report.process_code, Some(1));
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].starts_with("process[0] "));
        assert_eq!(tree.read("dst/ok.txt")?, "ok");
        Ok(())
    }

    #[test]
    fn hooks_see_global_env() -> TestResult<()> {
        let tree = TreeFixture::new()?;
        tree.mkdir("src")?;
        let script = tree.write(
            "start.sh",
            &format!("echo \"$STAGE-$LOCAL\" > {}\n", tree.join("stage.txt").display()),
        )?;
        let document = format!(
            "env: {{ stage: ci }}\nstart: {{ cmd: [sh, {script}], env: {{ local: here }} }}\nprocess:\n  - source: {src}\n    operations: [ {{ destination: {dst} }} ]\n",
            script = script.display(),
            src = tree.join("src").display(),
            dst = tree.join("dst").display(),
        );
        let report = orchestrator(&document)?.run();
        assert!(report.is_success(), "{:?}", report.failures);
        assert_eq!(tree.read("stage.txt")?.trim(), "ci-here");
        Ok(())
    }

    #[test]
    fn hook_exit_codes_fall_back_to_one() {
        let timeout = FsOpsError::Run {
            command: "sleep 5".into(),
            source: confseed_fsops::RunFailure::Timeout { seconds: 1 },
        };
        assert_eq!(hook_exit_code(&timeout), 1);
        let exit = FsOpsError::Run {
            command: "exit 3".into(),
            source: confseed_fsops::RunFailure::Exit { code: Some(3) },
        };
        assert_eq!(hook_exit_code(&exit), 3);
    }
}
