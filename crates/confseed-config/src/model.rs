//! Typed configuration document and its conversion into engine inputs.
//!
//! # Design
//! - Pure data carriers deserialized from YAML or JSON; defaults come from `defaults.rs`.
//! - Conversions into engine types compile globs and parse modes, so they double as validation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use confseed_fsops::router::DeletePolicy;
use confseed_fsops::{
    CommandSpec, ItemKind, OperationSpec, PermissionSpec, ScanFilters, parse_octal_mode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::defaults;
use crate::error::{ConfigError, ConfigResult};

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Log level or filter directive.
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    /// `stdout`, `stderr`, `split`, a file path, or `-` to discard.
    #[serde(default = "defaults::log_output")]
    pub log_output: String,
    /// `pretty` or `json`; inferred from the build when absent.
    #[serde(default)]
    pub log_format: Option<String>,
    /// Global environment overlay.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Optional global template data file.
    #[serde(default)]
    pub data_file: Option<PathBuf>,
    /// Hook run before any process.
    #[serde(default)]
    pub start: Option<CommandConfig>,
    /// Hook run after every process.
    #[serde(default)]
    pub finish: Option<CommandConfig>,
    /// Source trees to process in order.
    #[serde(default)]
    pub process: Vec<ProcessConfig>,
}

/// An external command description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandConfig {
    /// Argument words.
    #[serde(default)]
    pub cmd: Vec<String>,
    /// Timeout in seconds; `0` disables it.
    #[serde(default = "defaults::timeout")]
    pub timeout: u64,
    /// Environment overlay for the command.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory; empty means the engine default.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl CommandConfig {
    /// Convert into the engine's command description.
    #[must_use]
    pub fn to_spec(&self) -> CommandSpec {
        CommandSpec {
            args: self.cmd.clone(),
            timeout_secs: self.timeout,
            dir: self
                .dir
                .clone()
                .filter(|dir| !dir.as_os_str().is_empty()),
            env: self.env.clone(),
        }
    }
}

/// One source tree and the operations run over it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessConfig {
    /// Root of the source tree.
    pub source: PathBuf,
    /// Scan filters.
    #[serde(default, rename = "match")]
    pub matcher: MatchConfig,
    /// Feed processed paths into the exclusions of later operations.
    #[serde(default = "defaults::enabled")]
    pub exclude_done: bool,
    /// Operations in order.
    #[serde(default)]
    pub operations: Vec<OperationConfig>,
}

/// Scan filters for directories and files.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchConfig {
    /// Directory filter.
    #[serde(default)]
    pub folder: FilterConfig,
    /// File filter.
    #[serde(default)]
    pub file: FilterConfig,
}

/// Include and skip globs; empty means no filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterConfig {
    /// Entries must match to be kept.
    #[serde(default)]
    pub add: String,
    /// Entries matching are skipped.
    #[serde(default)]
    pub skip: String,
}

impl MatchConfig {
    /// Compile the filters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Engine`] naming `section` when a glob does not compile.
    pub fn to_filters(&self, section: &str) -> ConfigResult<ScanFilters> {
        ScanFilters::from_globs(
            Some(&self.folder.add),
            Some(&self.folder.skip),
            Some(&self.file.add),
            Some(&self.file.skip),
        )
        .map_err(|source| ConfigError::engine(section, "match", source))
    }
}

/// Entry kinds an operation applies to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KindConfig {
    /// Files only.
    #[default]
    File,
    /// Directories only.
    Dir,
    /// Files and directories.
    All,
}

impl From<KindConfig> for ItemKind {
    fn from(kind: KindConfig) -> Self {
        match kind {
            KindConfig::File => Self::File,
            KindConfig::Dir => Self::Directory,
            KindConfig::All => Self::Any,
        }
    }
}

/// A mode written either as a string (`"0644"`, `"0o644"`) or a bare number read as octal digits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ModeValue {
    /// Numeric form; `644` means `0o644`.
    Number(u64),
    /// String form.
    Text(String),
}

impl Default for ModeValue {
    fn default() -> Self {
        Self::Text(defaults::mode())
    }
}

impl ModeValue {
    /// Parse into mode bits.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Engine`] when the value is not a valid octal mode.
    pub fn parse(&self, section: &str, field: &'static str) -> ConfigResult<u32> {
        let text = match self {
            Self::Number(number) => number.to_string(),
            Self::Text(text) => text.clone(),
        };
        parse_octal_mode(field, &text).map_err(|source| ConfigError::engine(section, field, source))
    }
}

/// Default modes and overwrite behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefaultsConfig {
    /// Default modes.
    #[serde(default)]
    pub mode: ModeDefaults,
    /// Create missing directories and overwrite existing copies.
    #[serde(default = "defaults::enabled")]
    pub force: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            mode: ModeDefaults::default(),
            force: true,
        }
    }
}

/// Default directory and file modes; `0` means unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModeDefaults {
    /// Directory mode.
    #[serde(default)]
    pub folder: ModeValue,
    /// File mode.
    #[serde(default)]
    pub file: ModeValue,
}

/// Deletion flags.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteConfig {
    /// Remove an existing destination before acting.
    #[serde(default = "defaults::enabled")]
    pub pre_start: bool,
    /// Interpret condition output as a policy token.
    #[serde(default)]
    pub if_condition: bool,
    /// Remove zero-byte rendered output.
    #[serde(default)]
    pub if_empty: bool,
    /// Remove the destination after a failed render.
    #[serde(default)]
    pub if_render_fail: bool,
    /// Remove the destination after the command ran.
    #[serde(default)]
    pub after_exec: bool,
}

impl Default for DeleteConfig {
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

impl From<DeleteConfig> for DeletePolicy {
    fn from(delete: DeleteConfig) -> Self {
        Self {
            pre_start: delete.pre_start,
            if_condition: delete.if_condition,
            if_empty: delete.if_empty,
            if_render_fail: delete.if_render_fail,
            after_exec: delete.after_exec,
        }
    }
}

/// Ownership and mode rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionConfig {
    /// Glob over destination-relative paths.
    #[serde(default = "defaults::glob")]
    pub glob: String,
    /// User name or id; empty means the current user.
    #[serde(default)]
    pub user: String,
    /// Group name or id; empty means the current group.
    #[serde(default)]
    pub group: String,
    /// Mode; `0` leaves the mode alone.
    #[serde(default)]
    pub mode: ModeValue,
}

/// One operation over a scanned tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationConfig {
    /// Destination root.
    #[serde(default)]
    pub destination: Option<PathBuf>,
    /// Selection regex over relative paths.
    #[serde(default = "defaults::regex")]
    pub regex: String,
    /// Entry kinds.
    #[serde(default)]
    pub kind: KindConfig,
    /// Render instead of copying.
    #[serde(default = "defaults::enabled")]
    pub template: bool,
    /// Drop the final extension of file destinations.
    #[serde(default = "defaults::enabled")]
    pub strip_extension: bool,
    /// Condition template; empty means always proceed.
    #[serde(default)]
    pub condition: String,
    /// Operation-local template data.
    #[serde(default)]
    pub data: Value,
    /// Default modes and force flag.
    #[serde(default)]
    pub defaults: DefaultsConfig,
    /// Deletion flags.
    #[serde(default)]
    pub delete: DeleteConfig,
    /// Permission rules.
    #[serde(default)]
    pub permissions: Vec<PermissionConfig>,
    /// Command run per entry.
    #[serde(default)]
    pub command: Option<CommandConfig>,
}

impl OperationConfig {
    /// Build the engine operation, excluding `exclusions` from selection.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Engine`] when a mode is not octal.
    pub fn to_spec(&self, section: &str, exclusions: Vec<String>) -> ConfigResult<OperationSpec> {
        let permissions = self
            .permissions
            .iter()
            .map(|rule| {
                Ok(PermissionSpec {
                    glob: rule.glob.clone(),
                    user: rule.user.clone(),
                    group: rule.group.clone(),
                    mode: rule.mode.parse(section, "permissions.mode")?,
                })
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        Ok(OperationSpec {
            regex: self.regex.clone(),
            exclusions,
            kind: self.kind.into(),
            destination: self
                .destination
                .clone()
                .filter(|dst| !dst.as_os_str().is_empty()),
            force: self.defaults.force,
            strip_extension: self.strip_extension,
            render: self.template,
            delete: self.delete.into(),
            data: self.data.clone(),
            condition: Some(self.condition.clone()).filter(|condition| !condition.trim().is_empty()),
            permissions,
            default_dir_mode: self.defaults.mode.folder.parse(section, "defaults.mode.folder")?,
            default_file_mode: self.defaults.mode.file.parse(section, "defaults.mode.file")?,
            command: self.command.as_ref().map(CommandConfig::to_spec),
        })
    }
}
