//! SQLite-backed remote progress store.
//!
//! One row per user identity in `user_progress`, written with an upsert so
//! the storage layer is last-write-wins. Collection fields are stored as
//! JSON text columns.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{RemoteProgressStore, SyncError};
use crate::model::UserProgress;
use crate::version::{parse_activity_date, CURRENT_VERSION};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS user_progress (
    user_id TEXT PRIMARY KEY,
    schema_version INTEGER NOT NULL,
    total_xp INTEGER NOT NULL DEFAULT 0,
    completed_lessons TEXT NOT NULL DEFAULT '[]',
    lesson_progress TEXT NOT NULL DEFAULT '{}',
    current_streak INTEGER NOT NULL DEFAULT 0,
    last_activity_date TEXT,
    badges TEXT NOT NULL DEFAULT '[]',
    updated_at TEXT NOT NULL
);
";

const UPSERT_SQL: &str = "
INSERT INTO user_progress (
    user_id, schema_version, total_xp, completed_lessons, lesson_progress,
    current_streak, last_activity_date, badges, updated_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
ON CONFLICT(user_id) DO UPDATE SET
    schema_version = excluded.schema_version,
    total_xp = excluded.total_xp,
    completed_lessons = excluded.completed_lessons,
    lesson_progress = excluded.lesson_progress,
    current_streak = excluded.current_streak,
    last_activity_date = excluded.last_activity_date,
    badges = excluded.badges,
    updated_at = excluded.updated_at
";

/// Remote store backed by a SQLite database file.
///
/// rusqlite is blocking, so each operation runs on tokio's blocking pool.
#[derive(Clone)]
pub struct SqliteRemote {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRemote").finish_non_exhaustive()
    }
}

impl SqliteRemote {
    /// Open or create the remote database at the given path.
    ///
    /// Creates parent directories if they don't exist.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create parent directories: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open remote database: {}", path.display()))?;
        conn.busy_timeout(busy_timeout)
            .context("Failed to set busy timeout")?;
        Self::from_connection(conn)
    }

    /// Create an in-memory remote (for tests and demos).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize remote schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, SyncError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, SyncError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            op(&guard)
        })
        .await
        .map_err(|e| SyncError::Backend(format!("remote task failed: {e}")))?
    }
}

#[async_trait]
impl RemoteProgressStore for SqliteRemote {
    async fn pull(&self, user_id: &str) -> Result<Option<UserProgress>, SyncError> {
        let user = user_id.to_string();
        let record = self.run_blocking(move |conn| fetch(conn, &user)).await?;
        debug!(user_id, found = record.is_some(), "Pulled remote progress");
        Ok(record)
    }

    async fn push(&self, user_id: &str, progress: &UserProgress) -> Result<(), SyncError> {
        let user = user_id.to_string();
        let record = progress.clone();
        self.run_blocking(move |conn| upsert(conn, &user, &record))
            .await?;
        debug!(user_id, total_xp = progress.total_xp, "Pushed remote progress");
        Ok(())
    }
}

struct RawRow {
    total_xp: i64,
    completed_lessons: String,
    lesson_progress: String,
    current_streak: i64,
    last_activity_date: Option<String>,
    badges: String,
}

fn fetch(conn: &Connection, user_id: &str) -> Result<Option<UserProgress>, SyncError> {
    let row = conn
        .query_row(
            "SELECT total_xp, completed_lessons, lesson_progress, current_streak,
                    last_activity_date, badges
             FROM user_progress WHERE user_id = ?",
            params![user_id],
            |row| {
                Ok(RawRow {
                    total_xp: row.get(0)?,
                    completed_lessons: row.get(1)?,
                    lesson_progress: row.get(2)?,
                    current_streak: row.get(3)?,
                    last_activity_date: row.get(4)?,
                    badges: row.get(5)?,
                })
            },
        )
        .optional()
        .map_err(|e| map_sqlite_error(user_id, e))?;

    row.map(|raw| decode_row(user_id, raw)).transpose()
}

fn decode_row(user_id: &str, raw: RawRow) -> Result<UserProgress, SyncError> {
    let decode_err = |detail: String| SyncError::Decode {
        user_id: user_id.to_string(),
        detail,
    };

    let total_xp = u32::try_from(raw.total_xp)
        .map_err(|_| decode_err(format!("total_xp out of range: {}", raw.total_xp)))?;
    let current_streak = u32::try_from(raw.current_streak)
        .map_err(|_| decode_err(format!("current_streak out of range: {}", raw.current_streak)))?;

    let mut progress = UserProgress {
        total_xp,
        completed_lesson_ids: json_column(user_id, "completed_lessons", &raw.completed_lessons),
        lesson_progress: json_column(user_id, "lesson_progress", &raw.lesson_progress),
        current_streak,
        last_activity_date: raw.last_activity_date.as_deref().and_then(parse_activity_date),
        badges: json_column(user_id, "badges", &raw.badges),
    };

    if progress.normalize() {
        warn!(user_id, total_xp = progress.total_xp, "Remote progress was inconsistent; repaired");
    }
    Ok(progress)
}

fn json_column<T: DeserializeOwned + Default>(user_id: &str, column: &str, raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(user_id, column, error = %e, "Undecodable remote column; using empty value");
        T::default()
    })
}

fn upsert(conn: &Connection, user_id: &str, progress: &UserProgress) -> Result<(), SyncError> {
    let encode = |e: serde_json::Error| SyncError::Backend(format!("failed to encode record: {e}"));

    let completed = serde_json::to_string(&progress.completed_lesson_ids).map_err(encode)?;
    let lessons = serde_json::to_string(&progress.lesson_progress).map_err(encode)?;
    let badges = serde_json::to_string(&progress.badges).map_err(encode)?;
    let last_activity = progress.last_activity_date.map(|d| d.to_rfc3339());
    let now = Utc::now().to_rfc3339();

    conn.execute(
        UPSERT_SQL,
        params![
            user_id,
            CURRENT_VERSION,
            i64::from(progress.total_xp),
            completed,
            lessons,
            i64::from(progress.current_streak),
            last_activity,
            badges,
            now,
        ],
    )
    .map_err(|e| map_sqlite_error(user_id, e))?;
    Ok(())
}

fn map_sqlite_error(user_id: &str, err: rusqlite::Error) -> SyncError {
    let code = match &err {
        rusqlite::Error::SqliteFailure(e, _) => Some(e.code),
        _ => None,
    };
    match code {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen) => {
            SyncError::Unavailable(err.to_string())
        }
        Some(ErrorCode::PermissionDenied | ErrorCode::ReadOnly) => SyncError::Unauthorized {
            user_id: user_id.to_string(),
        },
        _ => SyncError::Backend(err.to_string()),
    }
}
