//! Configuration management for healthtrack.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "healthtrack";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "healthtrack.db";

/// Default backup directory name, inside the data directory.
const BACKUP_DIR_NAME: &str = "backups";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `HEALTHTRACK_`, `__` between sections)
/// 2. TOML config file at `~/.config/healthtrack/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Login and password policy.
    pub security: SecurityConfig,
    /// Backup configuration.
    pub backup: BackupConfig,
    /// Reminder dispatch configuration.
    pub reminders: RemindersConfig,
    /// Outgoing mail configuration.
    pub mail: MailConfig,
    /// Export configuration.
    pub export: ExportConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_address: String,
    /// How long a login session stays valid, in hours.
    pub session_ttl_hours: u32,
    /// Mark the session cookie `Secure`.
    pub secure_cookies: bool,
    /// Public URL used in emailed links.
    pub base_url: String,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/healthtrack/healthtrack.db`
    pub database_path: Option<PathBuf>,
}

/// Login lockout, rate limiting and password policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Failed logins before the account is locked.
    pub max_failed_logins: u32,
    /// How long a locked account stays locked.
    pub lockout_minutes: u32,
    /// Requests allowed per window on login and registration.
    pub rate_limit_requests: u32,
    /// Rate limit window length in seconds.
    pub rate_limit_window_secs: u64,
    /// Minimum password length.
    pub password_min_length: usize,
    /// Maximum password length.
    pub password_max_length: usize,
}

/// Backup-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory holding backup archives.
    /// Defaults to `~/.local/share/healthtrack/backups`
    pub backup_dir: Option<PathBuf>,
    /// Number of archives to keep.
    pub max_backups: usize,
}

/// Reminder dispatch configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemindersConfig {
    /// Run the reminder loop inside the server.
    pub enabled: bool,
    /// Seconds between dispatch passes, at most one minute.
    pub check_interval_secs: u64,
}

/// Outgoing mail configuration. Without an SMTP host, mail is only logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// SMTP relay host.
    pub smtp_host: Option<String>,
    /// SMTP relay port.
    pub smtp_port: u16,
    /// SMTP username.
    pub smtp_username: Option<String>,
    /// SMTP password.
    pub smtp_password: Option<String>,
    /// Sender address.
    pub from_address: String,
}

/// Export configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Command that turns HTML into PDF. Chrome or Chromium is detected when unset.
    pub pdf_converter: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
            session_ttl_hours: 24 * 14,
            secure_cookies: false,
            base_url: "http://127.0.0.1:8000".to_string(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_failed_logins: 5,
            lockout_minutes: 15,
            rate_limit_requests: 10,
            rate_limit_window_secs: 60,
            password_min_length: 8,
            password_max_length: 128,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_dir: None,
            max_backups: 7,
        }
    }
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: 60,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            from_address: "healthtrack@localhost".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("HEALTHTRACK_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            return Err(Error::ConfigValidation {
                message: format!("invalid bind_address: {}", self.server.bind_address),
            });
        }

        if self.server.session_ttl_hours == 0 {
            return Err(Error::ConfigValidation {
                message: "session_ttl_hours must be greater than 0".to_string(),
            });
        }

        let security = &self.security;
        if security.max_failed_logins == 0 {
            return Err(Error::ConfigValidation {
                message: "max_failed_logins must be greater than 0".to_string(),
            });
        }

        if security.rate_limit_requests == 0 || security.rate_limit_window_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "rate_limit_requests and rate_limit_window_secs must be greater than 0"
                    .to_string(),
            });
        }

        if security.password_min_length > security.password_max_length {
            return Err(Error::ConfigValidation {
                message: format!(
                    "password_min_length ({}) cannot be greater than password_max_length ({})",
                    security.password_min_length, security.password_max_length
                ),
            });
        }

        if self.backup.max_backups == 0 {
            return Err(Error::ConfigValidation {
                message: "max_backups must be greater than 0".to_string(),
            });
        }

        if !(1..=60).contains(&self.reminders.check_interval_secs) {
            return Err(Error::ConfigValidation {
                message: "check_interval_secs must be between 1 and 60".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the backup directory, resolving defaults if not set.
    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.backup
            .backup_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(BACKUP_DIR_NAME))
    }

    /// Get the session lifetime.
    #[must_use]
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.server.session_ttl_hours))
    }

    /// Get the account lockout duration.
    #[must_use]
    pub fn lockout_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.security.lockout_minutes))
    }

    /// Get the rate limit window.
    #[must_use]
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.security.rate_limit_window_secs)
    }

    /// Get the reminder poll interval.
    #[must_use]
    pub fn reminder_interval(&self) -> Duration {
        Duration::from_secs(self.reminders.check_interval_secs)
    }
}
