//! Crash-safe persistence for the fingerprint database and scan checkpoint
//!
//! Every database write goes through a backup-then-overwrite protocol: the
//! backup copy is written first, then the primary file, then the backup is
//! removed. A backup file found at startup therefore proves the previous write
//! was interrupted. A complete backup is taken as the authoritative copy; one
//! that was cut off mid-write is dropped, since the primary was not yet touched.

use crate::config::Config;
use crate::error::StoreError;
use crate::integrity::fingerprint::{Database, HandledSet};
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const DATABASE_FILE: &str = "db.json";
const DATABASE_BACKUP_FILE: &str = "db_backup.json";
const CHECKPOINT_FILE: &str = "handled.txt";
const RUN_RECORD_FILE: &str = "last_run";

/// Result of [`Store::load`]
#[derive(Debug)]
pub struct LoadedDatabase {
    pub database: Database,
    /// The previous save was interrupted and the backup copy was restored
    pub recovered_from_backup: bool,
    /// A backup left half-written by an interrupted save was deleted; holds the
    /// parse failure. The primary file was still intact and has been loaded.
    pub discarded_backup: Option<String>,
}

/// Owner of all persistent scan state under `<state_dir>/data`
#[derive(Debug, Clone)]
pub struct Store {
    data_dir: PathBuf,
    database_path: PathBuf,
    backup_path: PathBuf,
    checkpoint_path: PathBuf,
    run_record_path: PathBuf,
}

impl Store {
    pub fn new(config: &Config) -> Self {
        let data_dir = config.data_dir();
        Self {
            database_path: data_dir.join(DATABASE_FILE),
            backup_path: data_dir.join(DATABASE_BACKUP_FILE),
            checkpoint_path: data_dir.join(CHECKPOINT_FILE),
            run_record_path: data_dir.join(RUN_RECORD_FILE),
            data_dir,
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    /// Load the database, repairing an interrupted save if needed.
    ///
    /// A parseable backup is authoritative and replaces the primary. A backup
    /// that does not parse was cut off while being written, before the primary
    /// was touched, so it is deleted and the primary is loaded instead.
    /// Creates an empty database when none exists yet. A primary file that
    /// does not parse is reported as [`StoreError::CorruptState`] and left
    /// untouched.
    pub fn load(&self) -> Result<LoadedDatabase, StoreError> {
        fs::create_dir_all(&self.data_dir).map_err(|e| StoreError::io(&self.data_dir, e))?;

        let mut discarded_backup = None;
        if self.backup_path.is_file() {
            match read_database(&self.backup_path) {
                Ok(database) => {
                    write_synced(&self.database_path, &serialize(&database)?)?;
                    remove_if_exists(&self.backup_path)?;
                    return Ok(LoadedDatabase {
                        database,
                        recovered_from_backup: true,
                        discarded_backup: None,
                    });
                }
                Err(StoreError::CorruptState { reason, .. }) => {
                    remove_if_exists(&self.backup_path)?;
                    discarded_backup = Some(reason);
                }
                Err(e) => return Err(e),
            }
        }

        let database = if self.database_path.is_file() {
            read_database(&self.database_path)?
        } else {
            let database = Database::new();
            write_synced(&self.database_path, &serialize(&database)?)?;
            database
        };

        Ok(LoadedDatabase {
            database,
            recovered_from_backup: false,
            discarded_backup,
        })
    }

    /// Whether a run is in progress (or was interrupted)
    pub fn has_checkpoint(&self) -> bool {
        self.checkpoint_path.is_file()
    }

    /// Paths already handled by the current run; empty if no run is in progress
    pub fn load_checkpoint(&self) -> Result<HandledSet, StoreError> {
        let content = match fs::read_to_string(&self.checkpoint_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HandledSet::new()),
            Err(e) => return Err(StoreError::io(&self.checkpoint_path, e)),
        };

        Ok(content
            .lines()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Overwrite the checkpoint file with `handled`, one path per line
    pub fn save_checkpoint(&self, handled: &HandledSet) -> Result<(), StoreError> {
        let mut paths: Vec<&str> = handled.iter().map(String::as_str).collect();
        paths.sort_unstable();

        let mut content = String::with_capacity(paths.iter().map(|p| p.len() + 1).sum());
        for path in paths {
            content.push_str(path);
            content.push('\n');
        }
        write_synced(&self.checkpoint_path, content.as_bytes())
    }

    /// Persist the checkpoint and then the database.
    ///
    /// The checkpoint is written first. If the process dies before the
    /// database write completes, the next run skips the checkpointed paths
    /// while the database still holds their previous fingerprints; any new or
    /// changed fingerprints from the lost interval are picked up by the
    /// following run.
    pub fn save(&self, database: &Database, handled: &HandledSet) -> Result<(), StoreError> {
        self.save_checkpoint(handled)?;
        self.write_database(database)
    }

    /// Keep only entries whose path was handled during this run, and persist
    /// the result.
    pub fn prune(&self, database: &Database, handled: &HandledSet) -> Result<Database, StoreError> {
        let pruned: Database = database
            .iter()
            .filter(|(path, _)| handled.contains(path.as_str()))
            .map(|(path, fp)| (path.clone(), fp.clone()))
            .collect();
        self.write_database(&pruned)?;
        Ok(pruned)
    }

    /// Record `finished_at` as the completion time of the latest run
    pub fn mark_run_finished(&self, finished_at: DateTime<Utc>) -> Result<(), StoreError> {
        let line = format!("{}\n", finished_at.to_rfc3339());
        write_synced(&self.run_record_path, line.as_bytes())
    }

    /// Completion time of the latest run, `None` if no run ever completed
    pub fn last_run_finished(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let content = match fs::read_to_string(&self.run_record_path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.run_record_path, e)),
        };

        DateTime::parse_from_rfc3339(content.trim())
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|e| StoreError::CorruptState {
                path: self.run_record_path.clone(),
                reason: e.to_string(),
            })
    }

    pub fn clear_checkpoint(&self) -> Result<(), StoreError> {
        remove_if_exists(&self.checkpoint_path)
    }

    fn write_database(&self, database: &Database) -> Result<(), StoreError> {
        let bytes = serialize(database)?;
        write_synced(&self.backup_path, &bytes)?;
        write_synced(&self.database_path, &bytes)?;
        remove_if_exists(&self.backup_path)
    }
}

fn serialize(database: &Database) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(database)?)
}

fn read_database(path: &Path) -> Result<Database, StoreError> {
    let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
    let database: Database =
        serde_json::from_slice(&bytes).map_err(|e| StoreError::CorruptState {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if let Some((file, _)) = database.iter().find(|(_, fp)| !fp.has_valid_hash()) {
        return Err(StoreError::CorruptState {
            path: path.to_path_buf(),
            reason: format!("entry for {} has a malformed hash", file),
        });
    }
    Ok(database)
}

/// Write the whole file and flush it to stable storage before returning
fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = File::create(path).map_err(|e| StoreError::io(path, e))?;
    file.write_all(bytes).map_err(|e| StoreError::io(path, e))?;
    file.sync_all().map_err(|e| StoreError::io(path, e))
}

fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}
