//! File loading for configuration and template data documents.
//!
//! # Design
//! - The document format follows the file extension: `.json` is JSON, anything else is YAML.
//! - Parsing never validates; callers run [`crate::validate::validate`] on the result.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::Config;

/// Serialization format of a document on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// YAML (also accepts JSON input).
    Yaml,
    /// JSON.
    Json,
}

impl DocumentFormat {
    /// Pick the format from the file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

fn parse_document<T>(text: &str, format: DocumentFormat, path: &Path) -> ConfigResult<T>
where
    T: DeserializeOwned,
{
    match format {
        DocumentFormat::Yaml => serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        }),
        DocumentFormat::Json => serde_json::from_str(text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn read(path: &Path, operation: &'static str) -> ConfigResult<String> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation,
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a configuration document from text; `origin` is only used for error context.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] or [`ConfigError::Json`] when the document does not parse.
pub fn parse_config(text: &str, format: DocumentFormat, origin: &Path) -> ConfigResult<Config> {
    parse_document(text, format, origin)
}

/// Read and parse the configuration file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read, or a parse error.
pub fn load_config(path: &Path) -> ConfigResult<Config> {
    let text = read(path, "config.read")?;
    let config = parse_config(&text, DocumentFormat::from_path(path), path)?;
    debug!(
        path = %path.display(),
        processes = config.process.len(),
        "loaded configuration"
    );
    Ok(config)
}

/// Read a template data file into a JSON value. An empty file yields `null`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read, or a parse error.
pub fn load_data_file(path: &Path) -> ConfigResult<Value> {
    let text = read(path, "data.read")?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    let data = parse_document(&text, DocumentFormat::from_path(path), path)?;
    debug!(path = %path.display(), "loaded template data");
    Ok(data)
}
