//! Remote persistence of progress records, one per user identity.
//!
//! The transport lives behind [`RemoteProgressStore`]; this crate only
//! relies on fetch and upsert semantics. Failures are returned as
//! [`SyncError`] values and never abort local progress.

mod sqlite;

pub use sqlite::SqliteRemote;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

use crate::model::UserProgress;

/// Errors reported by a remote progress store.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// The remote could not be reached.
    #[error("Remote progress store unavailable: {0}")]
    Unavailable(String),

    /// The remote refused access for this identity.
    #[error("Not authorized to sync progress for {user_id}")]
    Unauthorized { user_id: String },

    /// The remote returned a record that could not be decoded.
    #[error("Remote progress for {user_id} could not be decoded: {detail}")]
    Decode { user_id: String, detail: String },

    /// Any other backend failure.
    #[error("Remote progress store failed: {0}")]
    Backend(String),
}

/// Asynchronous fetch/upsert of one progress record per user.
#[async_trait]
pub trait RemoteProgressStore: Send + Sync {
    /// Fetch the record for `user_id`, or `None` if the user has none yet.
    async fn pull(&self, user_id: &str) -> Result<Option<UserProgress>, SyncError>;

    /// Create or replace the record for `user_id`.
    async fn push(&self, user_id: &str, progress: &UserProgress) -> Result<(), SyncError>;
}

/// In-memory remote for tests and offline demos.
///
/// Can be switched offline to simulate transport failures.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    records: Mutex<HashMap<String, UserProgress>>,
    offline: AtomicBool,
    pushes: AtomicUsize,
}

impl MemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record as if another device had pushed it.
    pub fn insert(&self, user_id: &str, progress: UserProgress) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.to_string(), progress);
    }

    /// The record currently held for `user_id`.
    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<UserProgress> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of successful pushes so far.
    #[must_use]
    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> Result<(), SyncError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Unavailable("memory remote is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteProgressStore for MemoryRemote {
    async fn pull(&self, user_id: &str) -> Result<Option<UserProgress>, SyncError> {
        self.check_online()?;
        Ok(self.get(user_id))
    }

    async fn push(&self, user_id: &str, progress: &UserProgress) -> Result<(), SyncError> {
        self.check_online()?;
        self.insert(user_id, progress.clone());
        self.pushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
