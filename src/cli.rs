//! Command-line interface for tokenrelay
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Streaming relay for Azure OpenAI chat completions and transcriptions
#[derive(Parser, Debug)]
#[command(
    name = "tokenrelay",
    version,
    about = "Streaming relay for Azure OpenAI chat completions and transcriptions"
)]
pub struct Cli {
    /// Subcommand to execute (default: serve)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the relay server
    Serve {
        /// Listen address, overrides the configured one (e.g., 0.0.0.0:3000)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Check that upstream settings are present
    Check,

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration inspection actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the configuration file path
    Path,
    /// Show the effective configuration (API key redacted)
    Show,
    /// Dump a commented configuration template
    Dump,
}

impl Cli {
    /// Log filter directive implied by `-q` / `-v`.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_command() {
        let cli = Cli::try_parse_from(["tokenrelay"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["tokenrelay", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_level(), "trace");
    }

    #[test]
    fn test_parse_verbose_repeated_flags() {
        let cli = Cli::try_parse_from(["tokenrelay", "-v", "-v"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_log_levels() {
        let cli = Cli::try_parse_from(["tokenrelay"]).unwrap();
        assert_eq!(cli.log_level(), "info");
        let cli = Cli::try_parse_from(["tokenrelay", "-v"]).unwrap();
        assert_eq!(cli.log_level(), "debug");
        let cli = Cli::try_parse_from(["tokenrelay", "-q", "-v"]).unwrap();
        assert_eq!(cli.log_level(), "error");
    }

    #[test]
    fn test_parse_serve_with_bind() {
        let cli = Cli::try_parse_from(["tokenrelay", "serve", "--bind", "0.0.0.0:8080"]).unwrap();
        match cli.command {
            Some(Commands::Serve { bind }) => assert_eq!(bind.as_deref(), Some("0.0.0.0:8080")),
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_parse_serve_without_bind() {
        let cli = Cli::try_parse_from(["tokenrelay", "serve"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve { bind: None })));
    }

    #[test]
    fn test_parse_check() {
        let cli = Cli::try_parse_from(["tokenrelay", "check"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Check)));
    }

    #[test]
    fn test_parse_global_config() {
        let cli =
            Cli::try_parse_from(["tokenrelay", "--config", "/path/to/config.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.toml")));
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tokenrelay", "serve", "-q", "--config", "c.toml"]).unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
    }

    #[test]
    fn test_parse_config_actions() {
        let cli = Cli::try_parse_from(["tokenrelay", "config", "path"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Path
            })
        ));
        let cli = Cli::try_parse_from(["tokenrelay", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Show
            })
        ));
        let cli = Cli::try_parse_from(["tokenrelay", "config", "dump"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Dump
            })
        ));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["tokenrelay", "completions", "bash"]).unwrap();
        match cli.command {
            Some(Commands::Completions { shell }) => assert_eq!(shell, Shell::Bash),
            _ => panic!("Expected Completions command"),
        }
    }

    #[test]
    fn test_invalid_command_returns_error() {
        let err = Cli::try_parse_from(["tokenrelay", "invalid"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn test_help_flag() {
        let err = Cli::try_parse_from(["tokenrelay", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_version_flag() {
        let err = Cli::try_parse_from(["tokenrelay", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
