//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::user::Role;

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Account management commands.
#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// Create an account
    Create {
        /// Login name
        username: String,

        /// Email address
        #[arg(short, long)]
        email: String,

        /// Password (read from HEALTHTRACK_PASSWORD when omitted)
        #[arg(short, long, env = "HEALTHTRACK_PASSWORD", hide_env_values = true)]
        password: String,

        /// Given name
        #[arg(long, default_value = "")]
        first_name: String,

        /// Family name
        #[arg(long, default_value = "")]
        last_name: String,

        /// Access level
        #[arg(short, long, value_enum, default_value = "patient")]
        role: RoleArg,
    },

    /// List accounts
    List {
        /// Only show accounts with this role
        #[arg(short, long, value_enum)]
        role: Option<RoleArg>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Clear a lockout after too many failed logins
    Unlock {
        /// Login name
        username: String,
    },
}

/// Backup commands.
#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    /// Write a full JSON backup
    Create,

    /// List backups, newest first
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Replace all data with a backup
    Restore {
        /// Backup file to restore
        file: PathBuf,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Reminder commands.
#[derive(Debug, Subcommand)]
pub enum RemindersCommand {
    /// Send the reminders due at a time of day
    Send {
        /// Time as HH:MM (defaults to now)
        #[arg(short, long)]
        at: Option<String>,
    },

    /// Post the weekly summary notification to every active user
    WeeklySummary,
}

/// Export commands. Output goes to stdout unless `--output` is given.
#[derive(Debug, Subcommand)]
pub enum ExportCommand {
    /// Records as CSV
    Csv {
        /// Whose records to export
        username: String,

        /// First date to include (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// Last date to include (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Records as JSON
    Json {
        /// Whose records to export
        username: String,

        /// Output file (defaults to the generated file name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Health report as HTML or PDF
    Report {
        /// Whose report to build
        username: String,

        /// Convert to PDF
        #[arg(long)]
        pdf: bool,

        /// Output file (defaults to the generated file name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Food recommendation commands.
#[derive(Debug, Subcommand)]
pub enum FoodCommand {
    /// Add a recommendation
    Add {
        /// Display name
        name: String,

        /// Why it is recommended
        #[arg(short, long, default_value = "")]
        description: String,

        /// Energy per serving, in kcal
        #[arg(long)]
        calories: Option<u32>,
    },

    /// List recommendations
    List,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Role argument for account commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    /// Full access
    Admin,
    /// Can view patients
    Doctor,
    /// Own records only
    Patient,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Admin => Self::Admin,
            RoleArg::Doctor => Self::Doctor,
            RoleArg::Patient => Self::Patient,
        }
    }
}

/// Output format for listing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Formatted table
    #[default]
    Table,
    /// JSON output
    Json,
}
