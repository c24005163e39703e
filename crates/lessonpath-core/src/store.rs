//! On-device progress storage.
//!
//! Holds exactly one [`UserProgress`] record. Every save writes the whole
//! record through to disk immediately; there is no buffering.
//!
//! Loading never fails: a missing file yields the default record, and a
//! record that cannot be decoded is copied aside (best-effort) and replaced
//! by the default so the learner can keep going.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use fs2::FileExt;
use tracing::{debug, warn};

use crate::model::UserProgress;
use crate::version::{decode_record, encode_record};

/// Trait for single-record progress persistence.
pub trait ProgressStore: Send + Sync {
    /// Load the stored record, or the default record if none is usable.
    fn load(&self) -> UserProgress;

    /// Overwrite the stored record.
    fn save(&self, progress: &UserProgress) -> Result<()>;

    /// Store a record that came from outside this device (after a merge).
    fn import(&self, progress: &UserProgress) -> Result<()> {
        self.save(progress)
    }
}

/// JSON file implementation of the progress store.
///
/// All access is serialized through an advisory `fs2` lock on a sibling
/// `<record>.lock` file: writers hold it exclusively while they write a temp
/// file, fsync it and rename it over the record; readers hold it shared. The
/// lock file is never renamed, so every process contends on the same inode.
#[derive(Debug, Clone)]
pub struct FileProgressStore {
    path: PathBuf,
}

impl FileProgressStore {
    /// Create a store for the record at `path`.
    ///
    /// Does not touch the filesystem until the first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path to the record file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, "tmp")
    }

    fn lock_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, "lock")
    }

    fn corrupt_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, "corrupt")
    }

    fn open_lock_file(&self) -> Result<File> {
        let lock_path = self.lock_path();
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))
    }

    fn write_record(&self, progress: &UserProgress) -> Result<()> {
        let content = encode_record(progress)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create parent directories: {}", parent.display())
                })?;
            }
        }

        let lock = self.open_lock_file()?;
        lock.lock_exclusive()
            .context("Failed to acquire exclusive lock")?;

        let temp = self.temp_path();
        let mut file = File::create(&temp)
            .with_context(|| format!("Failed to open temp record: {}", temp.display()))?;
        file.write_all(content.as_bytes())
            .context("Failed to write progress record")?;
        file.flush().context("Failed to flush progress record")?;
        file.sync_all().context("Failed to sync progress record")?;
        drop(file);

        fs::rename(&temp, &self.path).with_context(|| {
            format!(
                "Failed to move {} into place at {}",
                temp.display(),
                self.path.display()
            )
        })?;

        // Lock is released when `lock` is dropped
        Ok(())
    }

    fn read_record(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let lock = self.open_lock_file()?;
        lock.lock_shared()
            .context("Failed to acquire shared lock")?;

        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read record: {}", self.path.display()))
            }
        }
    }

    fn set_aside_corrupt(&self) {
        let backup = self.corrupt_path();
        let _lock = self.open_lock_file().and_then(|lock| {
            lock.lock_shared()?;
            Ok(lock)
        });
        match fs::copy(&self.path, &backup) {
            Ok(_) => warn!(backup = %backup.display(), "Corrupt progress record copied aside"),
            Err(e) => warn!(error = %e, "Could not copy corrupt progress record aside"),
        }
    }
}

impl ProgressStore for FileProgressStore {
    fn load(&self) -> UserProgress {
        let content = match self.read_record() {
            Ok(Some(content)) => content,
            Ok(None) => {
                debug!(path = %self.path.display(), "No progress record yet; starting fresh");
                return UserProgress::default();
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Progress record unreadable; starting fresh");
                return UserProgress::default();
            }
        };

        match decode_record(&content) {
            Ok(decoded) => {
                debug!(
                    path = %self.path.display(),
                    version = decoded.version.as_u32(),
                    total_xp = decoded.progress.total_xp,
                    "Loaded progress record"
                );
                decoded.progress
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %format!("{e:#}"),
                    "Progress record corrupt; starting fresh"
                );
                self.set_aside_corrupt();
                UserProgress::default()
            }
        }
    }

    fn save(&self, progress: &UserProgress) -> Result<()> {
        self.write_record(progress)?;
        debug!(path = %self.path.display(), total_xp = progress.total_xp, "Saved progress record");
        Ok(())
    }

    fn import(&self, progress: &UserProgress) -> Result<()> {
        self.write_record(progress)?;
        debug!(
            path = %self.path.display(),
            total_xp = progress.total_xp,
            "Imported external progress record"
        );
        Ok(())
    }
}

/// In-memory progress store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    record: Mutex<Option<UserProgress>>,
    fail_writes: Mutex<bool>,
}

impl MemoryProgressStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a record.
    #[must_use]
    pub fn with_record(progress: UserProgress) -> Self {
        Self {
            record: Mutex::new(Some(progress)),
            fail_writes: Mutex::new(false),
        }
    }

    /// Make subsequent saves fail, to exercise storage error paths.
    pub fn set_fail_writes(&self, fail: bool) {
        *self
            .fail_writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// The record currently held, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<UserProgress> {
        self.record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProgressStore for MemoryProgressStore {
    fn load(&self) -> UserProgress {
        self.snapshot().unwrap_or_default()
    }

    fn save(&self, progress: &UserProgress) -> Result<()> {
        if *self
            .fail_writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
        {
            anyhow::bail!("memory store is configured to fail writes");
        }
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = Some(progress.clone());
        Ok(())
    }
}

/// `progress.json` -> `progress.json.<suffix>`
fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map_or_else(
        || std::ffi::OsString::from("progress"),
        std::ffi::OsStr::to_os_string,
    );
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
