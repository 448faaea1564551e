//! Structural validation of a loaded configuration.
//!
//! Every glob, regex and mode is compiled here once so a bad document fails before any file is
//! touched.

use confseed_fsops::{ItemKind, Pattern, Selector};

use crate::error::{ConfigError, ConfigResult};
use crate::model::{CommandConfig, Config, OperationConfig, ProcessConfig};

/// Validate the whole document, returning the first problem found.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for structural problems and [`ConfigError::Engine`] for
/// values the engine cannot compile.
pub fn validate(config: &Config) -> ConfigResult<()> {
    if config.process.is_empty() {
        return Err(ConfigError::invalid("config", "process", None, "at_least_one_process"));
    }
    if let Some(start) = &config.start {
        validate_command("start", start)?;
    }
    if let Some(finish) = &config.finish {
        validate_command("finish", finish)?;
    }
    for (index, process) in config.process.iter().enumerate() {
        validate_process(&format!("process[{index}]"), process)?;
    }
    Ok(())
}

fn validate_command(section: &str, command: &CommandConfig) -> ConfigResult<()> {
    if command.cmd.iter().all(|word| word.trim().is_empty()) {
        return Err(ConfigError::invalid(section, "cmd", None, "empty_command"));
    }
    Ok(())
}

fn validate_process(section: &str, process: &ProcessConfig) -> ConfigResult<()> {
    if process.source.as_os_str().is_empty() {
        return Err(ConfigError::invalid(section, "source", None, "required"));
    }
    if process.operations.is_empty() {
        return Err(ConfigError::invalid(section, "operations", None, "at_least_one_operation"));
    }
    process.matcher.to_filters(section)?;
    for (index, operation) in process.operations.iter().enumerate() {
        validate_operation(&format!("{section}.operations[{index}]"), operation)?;
    }
    Ok(())
}

fn validate_operation(section: &str, operation: &OperationConfig) -> ConfigResult<()> {
    Selector::new(&operation.regex, Vec::new(), ItemKind::Any)
        .map_err(|source| ConfigError::engine(section, "regex", source))?;
    for rule in &operation.permissions {
        Pattern::new(&rule.glob)
            .map_err(|source| ConfigError::engine(section, "permissions.glob", source))?;
    }
    let has_destination = operation
        .destination
        .as_ref()
        .is_some_and(|dst| !dst.as_os_str().is_empty());
    match &operation.command {
        Some(command) => validate_command(&format!("{section}.command"), command)?,
        None if !has_destination => {
            return Err(ConfigError::invalid(
                section,
                "destination",
                None,
                "destination_or_command_required",
            ));
        }
        None => {}
    }
    operation.to_spec(section, Vec::new())?;
    Ok(())
}
