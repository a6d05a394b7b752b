//! CLI argument parsing for vigia

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::catalogue::{BuiltinOverrides, DEFAULT_EXECUTABLE, DEFAULT_FILE_PATH, DEFAULT_PORT};

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per scenario plus a summary (default)
    Text,
    /// A single JSON object for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "vigia")]
#[command(version)]
#[command(
    about = "Run a fixed catalogue of file, network and process scenarios and check the results",
    long_about = None
)]
pub struct Cli {
    /// TOML scenario catalogue (default: builtin file/network/process walkthrough)
    #[arg(short = 'c', long = "catalogue", value_name = "FILE")]
    pub catalogue: Option<PathBuf>,

    /// Only run scenarios whose id matches this regex
    #[arg(short = 'e', long = "only", value_name = "REGEX")]
    pub only: Option<String>,

    /// Report format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Print the selected scenarios and their syscall footprints, then exit
    #[arg(long = "list")]
    pub list: bool,

    /// Scratch file for the builtin file scenario
    #[arg(long = "file-path", value_name = "PATH", default_value = DEFAULT_FILE_PATH, conflicts_with = "catalogue")]
    pub file_path: PathBuf,

    /// Port for the builtin network scenario
    #[arg(long = "port", value_name = "PORT", default_value_t = DEFAULT_PORT, conflicts_with = "catalogue")]
    pub port: u16,

    /// Absolute path executed by the builtin process scenario
    #[arg(long = "executable", value_name = "PATH", default_value = DEFAULT_EXECUTABLE, conflicts_with = "catalogue")]
    pub executable: PathBuf,

    /// Keep the builtin scenario's scratch file on disk
    #[arg(long = "keep-artifacts", conflicts_with = "catalogue")]
    pub keep_artifacts: bool,

    /// Print our PID and wait this many milliseconds before running, so a tracer can attach
    #[arg(long = "start-delay", value_name = "MS")]
    pub start_delay: Option<u64>,

    /// Enable debug logging to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Cli {
    /// Overrides for the builtin catalogue
    pub fn builtin_overrides(&self) -> BuiltinOverrides {
        BuiltinOverrides {
            file_path: self.file_path.clone(),
            port: self.port,
            executable: self.executable.clone(),
            keep_artifacts: self.keep_artifacts,
        }
    }

    /// Child output would corrupt a JSON report on the shared stdout
    pub fn silence_children(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["vigia"]);
        assert!(cli.catalogue.is_none());
        assert!(cli.only.is_none());
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(!cli.list);
        assert!(!cli.debug);
        assert_eq!(cli.builtin_overrides(), BuiltinOverrides::default());
    }

    #[test]
    fn test_cli_builtin_overrides() {
        let cli = Cli::parse_from([
            "vigia",
            "--file-path",
            "/tmp/elsewhere",
            "--port",
            "9090",
            "--executable",
            "/bin/true",
            "--keep-artifacts",
        ]);
        let overrides = cli.builtin_overrides();
        assert_eq!(overrides.file_path, PathBuf::from("/tmp/elsewhere"));
        assert_eq!(overrides.port, 9090);
        assert_eq!(overrides.executable, PathBuf::from("/bin/true"));
        assert!(overrides.keep_artifacts);
        assert!(!cli.silence_children());
    }

    #[test]
    fn test_cli_json_silences_children_for_any_catalogue() {
        let cli = Cli::parse_from(["vigia", "-c", "vigia.toml", "--format", "json"]);
        assert!(cli.silence_children());
    }

    #[test]
    fn test_cli_catalogue_conflicts_with_overrides() {
        let result = Cli::try_parse_from(["vigia", "-c", "vigia.toml", "--port", "1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_only_and_start_delay() {
        let cli = Cli::parse_from(["vigia", "-e", "^file", "--start-delay", "250"]);
        assert_eq!(cli.only.as_deref(), Some("^file"));
        assert_eq!(cli.start_delay, Some(250));
    }

    #[test]
    fn test_cli_rejects_invalid_port() {
        assert!(Cli::try_parse_from(["vigia", "--port", "70000"]).is_err());
    }
}
