//! Shared helpers for CLI commands.
//!
//! Resolves where data lives, builds the [`ProgressTracker`] for one
//! invocation, and turns core errors into messages with a "To fix:" hint.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use lessonpath_core::catalog::Catalog;
use lessonpath_core::config::{
    resolve_subscription, resolve_user_id, DataLayout, TrackerConfig,
};
use lessonpath_core::core::{CoreError, ProgressTracker, SyncOutcome, TrackerParts};
use lessonpath_core::entitlement::{SharedEntitlement, SubscriptionState, SubscriptionStatus};
use lessonpath_core::remote::{MemoryRemote, RemoteProgressStore, SqliteRemote, SyncError};
use lessonpath_core::store::FileProgressStore;
use lessonpath_core::unlock::LockReason;
use tracing::{debug, warn};

use crate::cli::Cli;

/// Everything needed to open a session, resolved from flags and environment.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub layout: DataLayout,
    pub catalog_path: PathBuf,
    pub remote_path: PathBuf,
    pub user_id: Option<String>,
    pub subscription: SubscriptionStatus,
    pub config: TrackerConfig,
}

impl SessionOptions {
    /// Resolve options from parsed flags, falling back to `LESSONPATH_*`
    /// environment variables.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let layout = DataLayout::resolve(cli.data_dir.as_deref())?;
        let config = TrackerConfig::from_env()?;
        let subscription = resolve_subscription(cli.subscription)?;

        Ok(Self {
            catalog_path: cli.catalog.clone().unwrap_or_else(|| layout.catalog_path()),
            remote_path: cli.remote.clone().unwrap_or_else(|| layout.remote_db_path()),
            user_id: resolve_user_id(cli.user.as_deref()),
            subscription,
            config,
            layout,
        })
    }
}

/// A tracker plus the identity it should sync for.
pub struct Session {
    tracker: ProgressTracker,
    user_id: Option<String>,
}

impl Session {
    /// Open the catalog, local store and remote for one invocation.
    ///
    /// An unreachable remote is not an error: the session runs offline and
    /// sync attempts report a notice.
    pub fn open(options: &SessionOptions) -> Result<Self> {
        std::fs::create_dir_all(options.layout.root()).with_context(|| {
            format!(
                "Failed to create data directory {}",
                options.layout.root().display()
            )
        })?;

        let catalog = Catalog::load(&options.catalog_path).map_err(|e| {
            anyhow::anyhow!(
                "{e}\n  To fix: put a lesson catalog at {} or pass --catalog <file>",
                options.catalog_path.display()
            )
        })?;

        let remote: Arc<dyn RemoteProgressStore> =
            match SqliteRemote::open(&options.remote_path, options.config.remote_busy_timeout) {
                Ok(remote) => Arc::new(remote),
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "Remote progress database unavailable");
                    let offline = MemoryRemote::new();
                    offline.set_offline(true);
                    Arc::new(offline)
                }
            };

        let mut parts = TrackerParts::new(
            Arc::new(FileProgressStore::new(options.layout.progress_path())),
            remote,
            Arc::new(catalog),
        );
        parts.entitlement = Arc::new(SharedEntitlement::new(SubscriptionState::with_status(
            options.subscription,
        )));
        parts.config = options.config.clone();
        parts.on_sync_error = Arc::new(print_sync_notice);

        debug!(
            data_dir = %options.layout.root().display(),
            user = options.user_id.as_deref().unwrap_or("anonymous"),
            "Opened session"
        );
        Ok(Self {
            tracker: ProgressTracker::new(parts),
            user_id: options.user_id.clone(),
        })
    }

    #[must_use]
    pub const fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Reconcile with the remote when a user is set. Remote failures only
    /// print a notice.
    pub async fn sign_in(&self) -> Result<Option<SyncOutcome>> {
        let Some(user_id) = self.user_id.as_deref() else {
            return Ok(None);
        };
        let outcome = self
            .tracker
            .on_identity_established(user_id)
            .await
            .map_err(with_hint)?;
        Ok(Some(outcome))
    }

    /// Wait for background pushes before the process exits.
    pub async fn finish(&self) {
        self.tracker.flush_pushes().await;
    }
}

fn print_sync_notice(err: &SyncError) {
    eprintln!("note: {err}; progress is saved locally and will sync later");
}

/// Attach a "To fix:" line to errors a user can act on.
pub fn with_hint(err: CoreError) -> anyhow::Error {
    let hint = match &err {
        CoreError::LessonNotFound { .. } | CoreError::InvalidLessonIndex { .. } => {
            Some("lessonpath lessons")
        }
        CoreError::LessonLocked {
            reason: LockReason::Sequential,
            ..
        } => Some("finish earlier lessons first (lessonpath next)"),
        CoreError::LessonLocked {
            reason: LockReason::Premium,
            ..
        } => Some("subscribe to unlock premium lessons (or pass --subscription active)"),
        CoreError::Storage(_) => Some("check that the data directory is writable (--data-dir)"),
        _ => None,
    };
    match hint {
        Some(hint) => anyhow::anyhow!("{err}\n  To fix: {hint}"),
        None => anyhow::Error::new(err),
    }
}
