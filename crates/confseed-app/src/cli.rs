//! Command-line arguments and their overrides of the configuration document.

use std::path::PathBuf;

use clap::Parser;
use confseed_config::Config;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/confseed/config.yml";

/// Seed a filesystem from template trees described by a configuration file.
#[derive(Debug, Clone, Parser)]
#[command(name = "confseed", version, about)]
pub struct Cli {
    /// Configuration file (YAML, or JSON when the extension is `.json`).
    #[arg(short, long, env = "CONFSEED_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log level or filter directive, overriding the configuration.
    #[arg(long, env = "CONFSEED_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log destination (`stdout`, `stderr`, `split`, a file path, or `-`), overriding the configuration.
    #[arg(long, env = "CONFSEED_LOG_OUTPUT")]
    pub log_output: Option<String>,

    /// Log format (`pretty` or `json`), overriding the configuration.
    #[arg(long, env = "CONFSEED_LOG_FORMAT")]
    pub log_format: Option<String>,

    /// Global template data file, overriding the configuration.
    #[arg(long, env = "CONFSEED_DATA_FILE")]
    pub data_file: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded document.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(level) = &self.log_level {
            config.log_level.clone_from(level);
        }
        if let Some(output) = &self.log_output {
            config.log_output.clone_from(output);
        }
        if let Some(format) = &self.log_format {
            config.log_format = Some(format.clone());
        }
        if let Some(data_file) = &self.data_file {
            config.data_file = Some(data_file.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confseed_config::{DocumentFormat, parse_config};
    use std::error::Error;
    use std::path::Path;

    type TestResult<T> = Result<T, Box<dyn Error>>;

    #[test]
    fn overrides_replace_only_given_fields() -> TestResult<()> {
        let mut config = parse_config(
            "log_level: warn\nlog_output: stderr\nprocess: [ { source: /s, operations: [ { destination: /d } ] } ]\n",
            DocumentFormat::Yaml,
            Path::new("inline.yml"),
        )?;
        let cli = Cli::try_parse_from([
            "confseed",
            "--config",
            "/tmp/other.yml",
            "--log-level",
            "debug",
            "--data-file",
            "/tmp/data.json",
        ])?;
        cli.apply_overrides(&mut config);
        assert_eq!(cli.config, PathBuf::from("/tmp/other.yml"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_output, "stderr");
        assert!(config.log_format.is_none());
        assert_eq!(config.data_file, Some(PathBuf::from("/tmp/data.json")));
        assert!(!cli.print_config);
        Ok(())
    }

    #[test]
    fn print_config_flag_parses() -> TestResult<()> {
        let cli = Cli::try_parse_from(["confseed", "-c", "conf.json", "--print-config"])?;
        assert!(cli.print_config);
        assert_eq!(cli.config, PathBuf::from("conf.json"));
        Ok(())
    }
}
