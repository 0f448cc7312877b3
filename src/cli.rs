//! CLI argument parsing for modtrace

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for call traces
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
    /// CSV format for spreadsheet analysis
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "modtrace")]
#[command(version)]
#[command(about = "Trace every call into a unit's exposed callables for one session", long_about = None)]
pub struct Cli {
    /// Unit to trace (registry name)
    #[arg(short = 'u', long = "unit", value_name = "NAME", default_value = "numlib")]
    pub unit: String,

    /// Also trace sub-units directly reachable from the traced unit
    #[arg(short = 's', long = "submodules")]
    pub submodules: bool,

    /// Output format (text, json or csv)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Load session configuration (denylist, submodules) from a TOML file
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Include per-call offsets from the first recorded call
    #[arg(short = 'T', long = "timing")]
    pub timing: bool,

    /// Do not echo each intercepted call as it happens
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Enable debug logging to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["modtrace"]);
        assert_eq!(cli.unit, "numlib");
        assert!(!cli.submodules);
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(cli.config.is_none());
        assert!(!cli.quiet);
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_submodules_flag() {
        let cli = Cli::parse_from(["modtrace", "--submodules"]);
        assert!(cli.submodules);
        let cli = Cli::parse_from(["modtrace", "-s"]);
        assert!(cli.submodules);
    }

    #[test]
    fn test_cli_format_json() {
        let cli = Cli::parse_from(["modtrace", "--format", "json"]);
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn test_cli_unit_and_config() {
        let cli = Cli::parse_from([
            "modtrace",
            "-u",
            "numlib.linalg",
            "--config",
            "trace.toml",
        ]);
        assert_eq!(cli.unit, "numlib.linalg");
        assert_eq!(cli.config, Some(PathBuf::from("trace.toml")));
    }

    #[test]
    fn test_cli_rejects_unknown_format() {
        let result = Cli::try_parse_from(["modtrace", "--format", "xml"]);
        assert!(result.is_err());
    }
}
