//! Per-entry template context and the data/environment merge rules.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;

use crate::error::{FsOpsError, FsOpsResult};
use crate::scan::InventoryEntry;

/// Environment mapping exposed to templates and commands.
pub type EnvMap = BTreeMap<String, String>;

/// Snapshot of the process environment. Variables that are not valid UTF-8 are dropped.
#[must_use]
pub fn inherited_env() -> EnvMap {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

/// Merge environment layers with precedence `local` over `global` over `inherited`.
///
/// Keys from `global` and `local` are upper-cased; inherited keys are kept as the OS reported them.
#[must_use]
pub fn merge_env(inherited: &EnvMap, global: &EnvMap, local: &EnvMap) -> EnvMap {
    let mut merged = inherited.clone();
    for (key, value) in global.iter().chain(local) {
        merged.insert(key.to_uppercase(), value.clone());
    }
    merged
}

/// Merge two data sources; `local` wins on key collisions.
///
/// # Errors
///
/// Returns [`FsOpsError::InvalidInput`] when both sources are non-null and not both mappings.
pub fn merge_data(global: &Value, local: &Value) -> FsOpsResult<Value> {
    match (global, local) {
        (Value::Null, other) | (other, Value::Null) => Ok(other.clone()),
        (Value::Object(base), Value::Object(overlay)) => {
            let mut merged = base.clone();
            for (key, value) in overlay {
                merged.insert(key.clone(), value.clone());
            }
            Ok(Value::Object(merged))
        }
        _ => Err(FsOpsError::InvalidInput {
            field: "data",
            reason: "cannot merge non-mapping data sources",
            value: None,
        }),
    }
}

/// Destination-relative path for `path`, dropping its extension when requested for non-directories.
#[must_use]
pub fn destination_relative(path: &str, is_dir: bool, strip_extension: bool) -> String {
    if !strip_extension || is_dir {
        return path.to_string();
    }
    match Path::new(path).extension().and_then(|ext| ext.to_str()) {
        Some(ext) => path
            .strip_suffix(&format!(".{ext}"))
            .unwrap_or(path)
            .to_string(),
        None => path.to_string(),
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn parent_of(path: &Path) -> PathBuf {
    path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Values visible to condition, content and argument templates for one entry.
#[derive(Clone, Debug, Serialize)]
pub struct TemplateContext<'a> {
    /// Entry is a directory.
    pub is_dir: bool,
    /// `ls`-style mode string of the source.
    pub mode: String,
    /// Scan root.
    pub source_base_dir: String,
    /// Source base name.
    pub source: String,
    /// Source path relative to the scan root.
    pub source_file: String,
    /// Absolute source path.
    pub source_full_path: String,
    /// Directory holding the source.
    pub source_path: String,
    /// Destination base name (after extension stripping).
    pub filename: String,
    /// Destination extension including the dot, or empty; exposed as `extension`.
    #[serde(rename = "extension")]
    pub ext: String,
    /// Destination root; empty without a destination.
    pub dst_base_dir: String,
    /// Full destination path; empty without a destination.
    pub destination: String,
    /// Directory holding the destination; empty without a destination.
    pub destination_path: String,
    /// Merged template data.
    pub data: &'a Value,
    /// Merged environment, exposed to templates as `environment`.
    #[serde(rename = "environment")]
    pub env: &'a EnvMap,
    #[serde(skip)]
    relative_destination: String,
    #[serde(skip)]
    destination_full: Option<PathBuf>,
    #[serde(skip)]
    source_full: PathBuf,
}

impl<'a> TemplateContext<'a> {
    /// Derive the context for `path` under `root`.
    #[must_use]
    pub fn new(
        root: &Path,
        path: &str,
        entry: &InventoryEntry,
        destination_root: Option<&Path>,
        strip_extension: bool,
        data: &'a Value,
        env: &'a EnvMap,
    ) -> Self {
        let relative_destination = destination_relative(path, entry.is_dir(), strip_extension);
        let source_full = root.join(path);
        let destination_name = Path::new(&relative_destination);
        let filename = destination_name
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = Path::new(&filename)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let destination_full = destination_root.map(|dst| dst.join(&relative_destination));

        Self {
            is_dir: entry.is_dir(),
            mode: entry.mode_string(),
            source_base_dir: display(root),
            source: Path::new(path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            source_file: path.to_string(),
            source_full_path: display(&source_full),
            source_path: display(&parent_of(&source_full)),
            filename,
            ext,
            dst_base_dir: destination_root.map(display).unwrap_or_default(),
            destination: destination_full.as_deref().map(display).unwrap_or_default(),
            destination_path: destination_full
                .as_deref()
                .map(|full| display(&parent_of(full)))
                .unwrap_or_default(),
            data,
            env,
            relative_destination,
            destination_full,
            source_full,
        }
    }

    /// Destination path relative to the destination root.
    #[must_use]
    pub fn relative_destination(&self) -> &str {
        &self.relative_destination
    }

    /// Absolute destination, if the operation has one.
    #[must_use]
    pub fn destination_full(&self) -> Option<&Path> {
        self.destination_full.as_deref()
    }

    /// Absolute source path.
    #[must_use]
    pub fn source_full(&self) -> &Path {
        &self.source_full
    }
}
