use confseed_config::{Config, load_config, load_data_file, validate};
use confseed_fsops::inherited_env;
use confseed_telemetry::{LogFormat, LogOutput, LoggingConfig};
use serde_json::Value;
use tracing::info;

use crate::cli::Cli;
use crate::error::{AppError, AppResult};
use crate::orchestrator::{Orchestrator, RunReport};

/// Dependencies required to run confseed once.
#[derive(Debug)]
pub struct BootstrapDependencies {
    /// Validated configuration with command-line overrides applied.
    pub config: Config,
    /// Global template data; `null` when no data file is configured.
    pub data: Value,
}

impl BootstrapDependencies {
    /// Load, override and validate the configuration named by `cli`, then read its data file.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when any of those steps fails.
    pub fn from_cli(cli: &Cli) -> AppResult<Self> {
        let mut config =
            load_config(&cli.config).map_err(|err| AppError::config("config.load", err))?;
        cli.apply_overrides(&mut config);
        validate(&config).map_err(|err| AppError::config("config.validate", err))?;
        let data = match &config.data_file {
            Some(path) => {
                load_data_file(path).map_err(|err| AppError::config("config.data_file", err))?
            }
            None => Value::Null,
        };
        Ok(Self { config, data })
    }

    fn logging(&self) -> AppResult<LoggingConfig<'_>> {
        let format = LogFormat::from_config(self.config.log_format.as_deref())
            .map_err(|err| AppError::telemetry("telemetry.format", err))?;
        Ok(LoggingConfig {
            level: &self.config.log_level,
            format,
            output: LogOutput::parse(&self.config.log_output),
        })
    }
}

/// Entry point for the confseed run: bootstrap, logging, then the orchestrated run.
///
/// With `--print-config` the effective configuration is printed as JSON and nothing runs.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or logging cannot be installed.
/// Failures during the run itself are reported through [`RunReport`].
pub fn run_app(cli: &Cli) -> AppResult<RunReport> {
    let dependencies = BootstrapDependencies::from_cli(cli)?;
    if cli.print_config {
        let rendered = serde_json::to_string_pretty(&dependencies.config)
            .map_err(|source| AppError::Serialize { source })?;
        println!("{rendered}");
        return Ok(RunReport::default());
    }
    let logging = dependencies.logging()?;
    confseed_telemetry::init_logging(&logging)
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    Ok(run_app_with(dependencies))
}

/// Run sequence that relies entirely on injected dependencies; logging is left to the caller.
#[must_use]
pub fn run_app_with(dependencies: BootstrapDependencies) -> RunReport {
    let BootstrapDependencies { config, data } = dependencies;
    info!(
        processes = config.process.len(),
        start_hook = config.start.is_some(),
        finish_hook = config.finish.is_some(),
        "confseed run starting"
    );
    Orchestrator::new(config, data, inherited_env()).run()
}
