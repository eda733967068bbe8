//! Command-line interface for healthtrack.
//!
//! This module provides the CLI structure for the `healthtrack` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    BackupCommand, ConfigCommand, ExportCommand, FoodCommand, OutputFormat, RemindersCommand,
    RoleArg, StatusCommand, UserCommand,
};

use crate::logging::Verbosity;

/// healthtrack - Track sleep, water, weight and mood
///
/// Runs the web application and the maintenance tasks around it: accounts,
/// backups, reminders and exports.
#[derive(Debug, Parser)]
#[command(name = "healthtrack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the web server and the reminder loop
    Serve {
        /// Override the bind address (e.g. 0.0.0.0:8000)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Show database statistics
    Status(StatusCommand),

    /// Manage accounts
    #[command(subcommand)]
    User(UserCommand),

    /// Create, list and restore backups
    #[command(subcommand)]
    Backup(BackupCommand),

    /// Run reminder jobs once
    #[command(subcommand)]
    Reminders(RemindersCommand),

    /// Export a user's records
    #[command(subcommand)]
    Export(ExportCommand),

    /// Manage food recommendations
    #[command(subcommand)]
    Food(FoodCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn status() -> Command {
        Command::Status(StatusCommand { json: false })
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "healthtrack");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity() {
        let cases = [
            (true, 2, Verbosity::Quiet),
            (false, 0, Verbosity::Normal),
            (false, 1, Verbosity::Verbose),
            (false, 3, Verbosity::Trace),
        ];
        for (quiet, verbose, expected) in cases {
            let cli = Cli {
                config: None,
                verbose,
                quiet,
                command: status(),
            };
            assert_eq!(cli.verbosity(), expected);
        }
    }

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from(["healthtrack", "serve", "--bind", "0.0.0.0:9000"]).unwrap();
        match cli.command {
            Command::Serve { bind } => assert_eq!(bind.as_deref(), Some("0.0.0.0:9000")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_user_create() {
        let cli = Cli::try_parse_from([
            "healthtrack",
            "user",
            "create",
            "drjones",
            "--email",
            "jones@example.com",
            "--password",
            "Secret123",
            "--role",
            "doctor",
        ])
        .unwrap();
        match cli.command {
            Command::User(UserCommand::Create { username, role, .. }) => {
                assert_eq!(username, "drjones");
                assert_eq!(role, RoleArg::Doctor);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_backup_restore() {
        let args = ["healthtrack", "backup", "restore", "/tmp/b.json", "--yes"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(
            cli.command,
            Command::Backup(BackupCommand::Restore { yes: true, .. })
        ));
    }

    #[test]
    fn test_parse_reminders() {
        let args = ["healthtrack", "reminders", "send", "--at", "08:30"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(
            cli.command,
            Command::Reminders(RemindersCommand::Send { at: Some(_) })
        ));
        let cli = Cli::try_parse_from(["healthtrack", "reminders", "weekly-summary"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Reminders(RemindersCommand::WeeklySummary)
        ));
    }

    #[test]
    fn test_parse_export_csv() {
        let cli = Cli::try_parse_from([
            "healthtrack",
            "export",
            "csv",
            "alice",
            "--start",
            "2024-01-01",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Export(ExportCommand::Csv { start: Some(_), end: None, .. })
        ));
    }

    #[test]
    fn test_parse_food_add() {
        let args = ["healthtrack", "food", "add", "Oatmeal", "--calories", "150"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(matches!(
            cli.command,
            Command::Food(FoodCommand::Add {
                calories: Some(150),
                ..
            })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let args = ["healthtrack", "-c", "/custom/config.toml", "status"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_parse_with_verbose_and_quiet() {
        let cli = Cli::try_parse_from(["healthtrack", "-vv", "status"]).unwrap();
        assert_eq!(cli.verbose, 2);
        let cli = Cli::try_parse_from(["healthtrack", "-q", "status"]).unwrap();
        assert!(cli.quiet);
    }
}
