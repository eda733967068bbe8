//! JSON snapshot backups.
//!
//! A backup is one file, `health_backup_YYYYMMDD_HHMMSS.json`, holding an
//! info block and every domain table. Sessions and reset tokens are never
//! backed up.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::storage::migrations::CURRENT_VERSION;
use crate::storage::{SnapshotTables, Storage};

const FILE_PREFIX: &str = "health_backup_";
const FILE_SUFFIX: &str = ".json";

/// Summary stored at the top of every backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupInfo {
    /// `YYYYMMDD_HHMMSS` of creation.
    pub timestamp: String,
    /// Always `full`.
    pub backup_type: String,
    /// Schema version of the database that was dumped.
    pub schema_version: i32,
    pub users: usize,
    pub health_records: usize,
    pub notifications: usize,
    pub reminder_settings: usize,
    pub food_recommendations: usize,
}

/// On-disk backup layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupFile {
    /// Summary block.
    pub info: BackupInfo,
    /// Table contents.
    pub tables: SnapshotTables,
}

/// One archive in the backup directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupEntry {
    /// File name.
    pub filename: String,
    /// `YYYYMMDD_HHMMSS` taken from the name.
    pub timestamp: String,
    /// Size in bytes.
    pub size: u64,
    /// Full path.
    pub path: PathBuf,
}

/// Creates, lists, prunes and restores backups in one directory.
#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
    max_backups: usize,
}

impl BackupManager {
    /// Manage backups in `dir`, keeping at most `max_backups`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, max_backups: usize) -> Self {
        Self {
            dir: dir.into(),
            max_backups,
        }
    }

    /// Backup directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|source| Error::DirectoryCreate {
            path: self.dir.clone(),
            source,
        })
    }

    /// Write a snapshot of `storage` and prune old archives.
    ///
    /// # Errors
    ///
    /// Returns `Error::Backup` if the snapshot cannot be read or written.
    pub fn create(&self, storage: &Storage, now: DateTime<Local>) -> Result<PathBuf> {
        self.ensure_dir()?;

        let tables = storage
            .snapshot()
            .map_err(|e| backup_error(format!("could not read database: {e}")))?;
        let timestamp = now.format("%Y%m%d_%H%M%S").to_string();
        let file = BackupFile {
            info: BackupInfo {
                timestamp: timestamp.clone(),
                backup_type: "full".to_string(),
                schema_version: CURRENT_VERSION,
                users: tables.users.len(),
                health_records: tables.health_records.len(),
                notifications: tables.notifications.len(),
                reminder_settings: tables.reminder_settings.len(),
                food_recommendations: tables.food_recommendations.len(),
            },
            tables,
        };

        let path = self.dir.join(format!("{FILE_PREFIX}{timestamp}{FILE_SUFFIX}"));
        let json = serde_json::to_vec_pretty(&file)?;
        fs::write(&path, json)
            .map_err(|e| backup_error(format!("could not write {}: {e}", path.display())))?;
        info!(
            "Created backup {} ({} users, {} records)",
            path.display(),
            file.info.users,
            file.info.health_records
        );

        self.prune()?;
        Ok(path)
    }

    /// Archives in the directory, newest first.
    ///
    /// A missing directory has no backups.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn list(&self) -> Result<Vec<BackupEntry>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let filename = entry.file_name().to_string_lossy().into_owned();
            let Some(timestamp) = filename
                .strip_prefix(FILE_PREFIX)
                .and_then(|rest| rest.strip_suffix(FILE_SUFFIX))
            else {
                continue;
            };
            entries.push(BackupEntry {
                timestamp: timestamp.to_string(),
                size: entry.metadata()?.len(),
                path: entry.path(),
                filename,
            });
        }

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    /// Delete the oldest archives beyond the retention limit.
    ///
    /// Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if an archive cannot be removed.
    pub fn prune(&self) -> Result<usize> {
        let entries = self.list()?;
        let mut removed = 0;
        for entry in entries.iter().skip(self.max_backups) {
            fs::remove_file(&entry.path)?;
            debug!("Removed old backup {}", entry.filename);
            removed += 1;
        }
        Ok(removed)
    }

    /// Replace the database contents with a backup.
    ///
    /// # Errors
    ///
    /// Returns `Error::Restore` if the file cannot be read or parsed, or was
    /// written by a newer schema; the database is untouched in that case.
    pub fn restore(&self, storage: &mut Storage, path: &Path) -> Result<BackupInfo> {
        let bytes = fs::read(path)
            .map_err(|e| restore_error(format!("could not read {}: {e}", path.display())))?;
        let file: BackupFile = serde_json::from_slice(&bytes)
            .map_err(|e| restore_error(format!("{} is not a backup: {e}", path.display())))?;

        if file.info.schema_version > CURRENT_VERSION {
            return Err(restore_error(format!(
                "backup schema version {} is newer than supported version {CURRENT_VERSION}",
                file.info.schema_version
            )));
        }

        storage
            .restore(&file.tables)
            .map_err(|e| restore_error(e.to_string()))?;
        info!("Restored backup {}", path.display());
        Ok(file.info)
    }
}

fn backup_error(message: String) -> Error {
    Error::Backup { message }
}

fn restore_error(message: String) -> Error {
    Error::Restore { message }
}
