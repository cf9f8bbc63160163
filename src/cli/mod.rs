//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Arbor using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Arbor - relational tables to nested XML and back
#[derive(Parser, Debug)]
#[command(name = "arbor")]
#[command(version, about, long_about = None)]
#[command(author = "Arbor Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "arbor.toml", env = "ARBOR_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "ARBOR_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export a table tree to an XML document
    Export(commands::export::ExportArgs),

    /// Replace a table tree with the rows of an XML document
    Import(commands::import::ImportArgs),

    /// Compare two documents for round-trip equivalence
    Compare(commands::compare::CompareArgs),

    /// Validate configuration file and schema artifacts
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_export() {
        let cli = Cli::parse_from(["arbor", "export", "item"]);
        assert_eq!(cli.config, "arbor.toml");
        assert!(matches!(cli.command, Commands::Export(_)));
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["arbor", "--config", "custom.toml", "export", "item"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["arbor", "--log-level", "debug", "import", "item", "item.xml"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["arbor", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["arbor", "init"]);
        assert!(matches!(cli.command, Commands::Init(_)));
    }

    #[test]
    fn test_cli_export_requires_table() {
        assert!(Cli::try_parse_from(["arbor", "export"]).is_err());
    }
}
