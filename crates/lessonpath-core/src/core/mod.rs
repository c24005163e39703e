//! Service layer for lessonpath-core.
//!
//! [`ProgressTracker`] is the single owner of a user's progress record. It
//! persists every change locally first, reconciles with the remote store when
//! an identity is established, and pushes later changes in the background.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use lessonpath_core::catalog::Catalog;
//! use lessonpath_core::core::{ProgressTracker, TrackerParts};
//! use lessonpath_core::remote::MemoryRemote;
//! use lessonpath_core::store::FileProgressStore;
//!
//! let catalog = Catalog::load("catalog.json".as_ref()).unwrap();
//! let tracker = ProgressTracker::new(TrackerParts::new(
//!     Arc::new(FileProgressStore::new("progress.json")),
//!     Arc::new(MemoryRemote::new()),
//!     Arc::new(catalog),
//! ));
//! let outcome = tracker.complete_lesson("L1", 10).unwrap();
//! assert_eq!(outcome.total_xp, 10);
//! ```

pub mod errors;
pub mod identity;
pub mod stats;

pub use errors::{CoreError, CoreResult};
pub use identity::{IdentityState, SyncTicket};
pub use stats::{completion_percentage, LessonMetadata, ProgressStats};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::catalog::{ContentSource, LessonSummary};
use crate::config::TrackerConfig;
use crate::entitlement::{EntitlementSource, SharedEntitlement};
use crate::flow::{CompletionSink, LessonCompletion, LessonFlow};
use crate::merge::{merge_with, MergeStrategy, MergeWinner};
use crate::model::UserProgress;
use crate::remote::{RemoteProgressStore, SyncError};
use crate::store::ProgressStore;
use crate::streak::{streak_status, update_streak, Clock, SystemClock};
use crate::unlock::{LockState, UnlockPolicy};

use identity::{Begin, IdentityMachine};

/// Callback for remote failures. Sync problems never fail an operation; they
/// are reported here instead.
pub type SyncErrorHandler = Arc<dyn Fn(&SyncError) + Send + Sync>;

/// Collaborators a [`ProgressTracker`] is built from.
///
/// [`TrackerParts::new`] fills in a system clock, no subscription, the
/// default configuration and a handler that logs sync failures; override the
/// public fields as needed.
pub struct TrackerParts {
    pub store: Arc<dyn ProgressStore>,
    pub remote: Arc<dyn RemoteProgressStore>,
    pub content: Arc<dyn ContentSource>,
    pub entitlement: Arc<dyn EntitlementSource>,
    pub clock: Arc<dyn Clock>,
    pub config: TrackerConfig,
    pub on_sync_error: SyncErrorHandler,
}

impl TrackerParts {
    #[must_use]
    pub fn new(
        store: Arc<dyn ProgressStore>,
        remote: Arc<dyn RemoteProgressStore>,
        content: Arc<dyn ContentSource>,
    ) -> Self {
        Self {
            store,
            remote,
            content,
            entitlement: Arc::new(SharedEntitlement::default()),
            clock: Arc::new(SystemClock),
            config: TrackerConfig::default(),
            on_sync_error: Arc::new(log_sync_error),
        }
    }
}

fn log_sync_error(err: &SyncError) {
    warn!(error = %err, "Progress sync failed; continuing with local progress");
}

/// Result of [`ProgressTracker::complete_lesson`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompletionOutcome {
    /// False when the lesson was already completed.
    pub newly_completed: bool,
    pub total_xp: u32,
    pub current_streak: u32,
}

/// Result of [`ProgressTracker::on_identity_established`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// This user was already reconciled.
    AlreadySynced,
    /// A sync for this user is already running.
    InFlight,
    /// A remote record existed and was merged with local progress.
    Merged { winner: MergeWinner, pushed: bool },
    /// The remote had no record; local progress was pushed to create it.
    Initialized { pushed: bool },
    /// The remote could not be reached; progress stays local.
    Unavailable,
    /// The identity changed while the pull was in flight.
    Superseded,
}

struct TrackerState {
    progress: UserProgress,
    identity: IdentityMachine,
    /// Bumped on every change to `progress`.
    revision: u64,
}

/// A push waiting to be delivered.
struct PushJob {
    user_id: String,
    progress: UserProgress,
    revision: u64,
}

/// Remote work owed after a local change.
enum FollowUp {
    /// Signed in and reconciled: deliver the new snapshot.
    Push(PushJob),
    /// The last pull failed: pull, merge and push again.
    Resync(String),
}

/// Serializes remote writes and remembers the last revision delivered per
/// user, so an older snapshot never lands after a newer one.
#[derive(Default)]
struct PushLane {
    delivered: tokio::sync::Mutex<HashMap<String, u64>>,
}

impl PushLane {
    async fn deliver(
        &self,
        remote: &dyn RemoteProgressStore,
        job: &PushJob,
    ) -> Result<bool, SyncError> {
        let mut delivered = self.delivered.lock().await;
        if delivered
            .get(&job.user_id)
            .is_some_and(|last| *last >= job.revision)
        {
            debug!(user_id = %job.user_id, revision = job.revision, "Skipping stale push");
            return Ok(false);
        }
        remote.push(&job.user_id, &job.progress).await?;
        delivered.insert(job.user_id.clone(), job.revision);
        debug!(user_id = %job.user_id, revision = job.revision, "Pushed progress");
        Ok(true)
    }
}

/// The record, identity and remote plumbing, shared with background tasks.
struct SyncEngine {
    store: Arc<dyn ProgressStore>,
    remote: Arc<dyn RemoteProgressStore>,
    merge_strategy: MergeStrategy,
    on_sync_error: SyncErrorHandler,
    state: Mutex<TrackerState>,
    lane: PushLane,
}

impl SyncEngine {
    fn guard(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_job(state: &TrackerState) -> Option<PushJob> {
        state.identity.push_target().map(|user_id| PushJob {
            user_id: user_id.to_string(),
            progress: state.progress.clone(),
            revision: state.revision,
        })
    }

    fn follow_up(state: &TrackerState) -> Option<FollowUp> {
        if let Some(job) = Self::push_job(state) {
            return Some(FollowUp::Push(job));
        }
        state
            .identity
            .resync_target()
            .map(|user_id| FollowUp::Resync(user_id.to_string()))
    }

    async fn run(&self, follow_up: FollowUp) {
        match follow_up {
            FollowUp::Push(job) => {
                self.push_now(job).await;
            }
            FollowUp::Resync(user_id) => match self.sync(&user_id).await {
                Ok(outcome) => debug!(user_id, ?outcome, "Background re-sync finished"),
                Err(err) => warn!(user_id, error = %err, "Background re-sync failed"),
            },
        }
    }

    async fn sync(&self, user_id: &str) -> CoreResult<SyncOutcome> {
        let begin = self.guard().identity.begin(user_id);
        let ticket = match begin {
            Begin::AlreadySynced => return Ok(SyncOutcome::AlreadySynced),
            Begin::InFlight => {
                debug!(user_id, "Sync already in flight");
                return Ok(SyncOutcome::InFlight);
            }
            Begin::Started(ticket) => ticket,
        };

        debug!(user_id, "Pulling remote progress");
        let pulled = self.remote.pull(user_id).await;

        let (outcome, push) = self.reconcile(&ticket, pulled)?;
        let pushed = match push {
            Some(job) => self.push_now(job).await,
            None => false,
        };

        let outcome = match outcome {
            SyncOutcome::Merged { winner, .. } => SyncOutcome::Merged { winner, pushed },
            SyncOutcome::Initialized { .. } => SyncOutcome::Initialized { pushed },
            other => other,
        };
        info!(user_id, ?outcome, "Sync finished");
        Ok(outcome)
    }

    /// Apply a pull result under the state lock. Returns the outcome and a
    /// push to make once the lock is released.
    fn reconcile(
        &self,
        ticket: &SyncTicket,
        pulled: Result<Option<UserProgress>, SyncError>,
    ) -> CoreResult<(SyncOutcome, Option<PushJob>)> {
        let mut state = self.guard();
        if !state.identity.is_current(ticket) {
            info!(
                user_id = ticket.user_id(),
                "Identity changed during sync; result ignored"
            );
            return Ok((SyncOutcome::Superseded, None));
        }

        let remote = match pulled {
            Err(err) => {
                state.identity.fail(ticket);
                drop(state);
                (self.on_sync_error)(&err);
                return Ok((SyncOutcome::Unavailable, None));
            }
            Ok(None) => {
                state.identity.complete(ticket);
                state.revision += 1;
                return Ok((
                    SyncOutcome::Initialized { pushed: false },
                    Self::push_job(&state),
                ));
            }
            Ok(Some(mut remote)) => {
                if remote.normalize() {
                    warn!(
                        user_id = ticket.user_id(),
                        "Repaired inconsistent remote progress"
                    );
                }
                remote
            }
        };

        let merged = merge_with(self.merge_strategy, &state.progress, &remote);
        if merged.progress != state.progress {
            if let Err(err) = self.store.import(&merged.progress) {
                state.identity.fail(ticket);
                return Err(CoreError::Storage(err));
            }
            state.progress = merged.progress.clone();
            state.revision += 1;
        }
        state.identity.complete(ticket);

        let push = if merged.winner != MergeWinner::Remote && merged.progress != remote {
            state.revision += 1;
            Self::push_job(&state)
        } else {
            None
        };
        debug!(
            winner = ?merged.winner,
            total_xp = state.progress.total_xp,
            "Merged remote progress"
        );
        Ok((
            SyncOutcome::Merged {
                winner: merged.winner,
                pushed: false,
            },
            push,
        ))
    }

    async fn push_now(&self, job: PushJob) -> bool {
        match self.lane.deliver(self.remote.as_ref(), &job).await {
            Ok(pushed) => pushed,
            Err(err) => {
                (self.on_sync_error)(&err);
                false
            }
        }
    }
}

/// Orchestrates progress: local persistence, sync, streaks, unlocks and
/// lesson flows. Construct once and share by reference or `Arc`.
pub struct ProgressTracker {
    engine: Arc<SyncEngine>,
    content: Arc<dyn ContentSource>,
    entitlement: Arc<dyn EntitlementSource>,
    clock: Arc<dyn Clock>,
    config: TrackerConfig,
    policy: UnlockPolicy,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl ProgressTracker {
    /// Build a tracker, loading the stored record.
    #[must_use]
    pub fn new(parts: TrackerParts) -> Self {
        let progress = parts.store.load();
        debug!(
            total_xp = progress.total_xp,
            completed = progress.completed_lesson_ids.len(),
            "Loaded local progress"
        );

        Self {
            engine: Arc::new(SyncEngine {
                store: parts.store,
                remote: parts.remote,
                merge_strategy: parts.config.merge_strategy,
                on_sync_error: parts.on_sync_error,
                state: Mutex::new(TrackerState {
                    progress,
                    identity: IdentityMachine::new(),
                    revision: 0,
                }),
                lane: PushLane::default(),
            }),
            policy: UnlockPolicy::new(parts.config.free_lesson_count),
            content: parts.content,
            entitlement: parts.entitlement,
            clock: parts.clock,
            config: parts.config,
            pending: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Snapshot of the current record.
    #[must_use]
    pub fn progress(&self) -> UserProgress {
        self.guard().progress.clone()
    }

    #[must_use]
    pub fn identity_state(&self) -> IdentityState {
        self.guard().identity.state().clone()
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Record that a lesson was finished with `earned_xp`.
    ///
    /// A repeat completion keeps XP and the completed set as they are but
    /// still counts as activity for the streak. The record is saved before
    /// returning; a background push follows when signed in, or a background
    /// re-sync when the last pull failed.
    pub fn complete_lesson(
        &self,
        lesson_id: &str,
        earned_xp: u32,
    ) -> CoreResult<CompletionOutcome> {
        let now = self.clock.now();
        let outcome = self.mutate(|progress| {
            let newly_completed =
                progress.record_completion(lesson_id, earned_xp, now.with_timezone(&Utc));
            touch_streak(progress, &now);
            let outcome = CompletionOutcome {
                newly_completed,
                total_xp: progress.total_xp,
                current_streak: progress.current_streak,
            };
            (outcome, true)
        })?;

        if outcome.newly_completed {
            info!(
                lesson_id,
                earned_xp,
                total_xp = outcome.total_xp,
                "Lesson completed"
            );
        } else {
            debug!(lesson_id, "Lesson already completed; streak refreshed");
        }
        Ok(outcome)
    }

    /// Apply a completion produced by a [`LessonFlow`], including its badge.
    pub fn record_completion(
        &self,
        completion: &LessonCompletion,
    ) -> CoreResult<CompletionOutcome> {
        let outcome = self.complete_lesson(&completion.lesson_id, completion.earned_xp)?;
        if let Some(badge) = &completion.badge {
            self.award_badge(badge)?;
        }
        Ok(outcome)
    }

    /// Add a badge. Returns `true` if it is new; only then is anything saved.
    pub fn award_badge(&self, badge: &str) -> CoreResult<bool> {
        let added = self.mutate(|progress| {
            let added = progress.award_badge(badge);
            (added, added)
        })?;
        if added {
            info!(badge, "Badge awarded");
        }
        Ok(added)
    }

    /// Wipe all progress back to the empty record.
    pub fn reset(&self) -> CoreResult<()> {
        self.mutate(|progress| {
            *progress = UserProgress::default();
            ((), true)
        })?;
        info!("Progress reset");
        Ok(())
    }

    /// Apply `change` under the state lock, save, and queue remote work.
    ///
    /// `change` returns its result and whether the record must be saved. On a
    /// failed save the in-memory record is restored.
    fn mutate<T>(&self, change: impl FnOnce(&mut UserProgress) -> (T, bool)) -> CoreResult<T> {
        let (follow_up, result) = {
            let mut state = self.guard();
            let previous = state.progress.clone();
            let (result, persist) = change(&mut state.progress);
            if !persist {
                return Ok(result);
            }

            if let Err(err) = self.engine.store.save(&state.progress) {
                state.progress = previous;
                return Err(CoreError::Storage(err));
            }
            state.revision += 1;
            (SyncEngine::follow_up(&state), result)
        };

        if let Some(follow_up) = follow_up {
            self.spawn_follow_up(follow_up);
        }
        Ok(result)
    }

    fn spawn_follow_up(&self, follow_up: FollowUp) {
        let Ok(handle) = Handle::try_current() else {
            debug!("No async runtime; skipping background sync");
            return;
        };

        let engine = Arc::clone(&self.engine);
        let task = handle.spawn(async move { engine.run(follow_up).await });

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|h| !h.is_finished());
        pending.push(task);
    }

    /// Wait for every background push or re-sync queued so far.
    pub async fn flush_pushes(&self) {
        loop {
            let handles =
                std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(err) = handle.await {
                    warn!(error = %err, "Background sync task failed");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Identity and sync
    // ------------------------------------------------------------------

    /// Reconcile local progress with the remote record for `user_id`.
    ///
    /// Only a failure to save locally is returned as an error; remote
    /// failures are reported to the sync error handler and yield
    /// [`SyncOutcome::Unavailable`].
    pub async fn on_identity_established(&self, user_id: &str) -> CoreResult<SyncOutcome> {
        self.engine.sync(user_id).await
    }

    /// Sign out. Local progress is kept; any sync in flight is ignored.
    pub fn on_identity_cleared(&self) {
        let mut state = self.guard();
        if let Some(user_id) = state.identity.state().user_id() {
            info!(user_id, "Identity cleared");
        }
        state.identity.clear();
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    #[must_use]
    pub fn stats(&self) -> ProgressStats {
        let now = self.clock.now();
        let state = self.guard();
        let progress = &state.progress;
        let lessons = self.content.lessons();
        let completed = lessons
            .iter()
            .filter(|l| progress.is_completed(&l.id))
            .count();

        ProgressStats {
            total_xp: progress.total_xp,
            total_lessons: lessons.len(),
            completed_lessons: completed,
            completion_percentage: completion_percentage(completed, lessons.len()),
            current_streak: progress.current_streak,
            streak_status: streak_status(progress.last_activity_date, &now),
            badges: progress.badges.clone(),
        }
    }

    /// Every catalog lesson with its progress and lock state.
    #[must_use]
    pub fn lessons(&self) -> Vec<LessonMetadata> {
        let state = self.guard();
        let completed = self.completed_flags(&state.progress);
        let subscribed = self.entitlement.has_active_subscription();

        self.content
            .lessons()
            .iter()
            .map(|summary| self.metadata(summary, &state.progress, &completed, subscribed))
            .collect()
    }

    /// One catalog lesson with its progress and lock state.
    pub fn lesson(&self, lesson_id: &str) -> CoreResult<LessonMetadata> {
        let index = self.summary(lesson_id)?.index;
        self.lesson_at(index).ok_or_else(|| CoreError::LessonNotFound {
            lesson_id: lesson_id.to_string(),
        })
    }

    /// Lock state of the lesson at a zero-based flattened index.
    pub fn lock_state(&self, index: usize) -> CoreResult<LockState> {
        let total = self.content.lessons().len();
        if index >= total {
            return Err(CoreError::InvalidLessonIndex { index, total });
        }
        let state = self.guard();
        let completed = self.completed_flags(&state.progress);
        Ok(self
            .policy
            .lock_state(index, &completed, self.entitlement.has_active_subscription()))
    }

    pub fn lock_state_for(&self, lesson_id: &str) -> CoreResult<LockState> {
        let index = self.summary(lesson_id)?.index;
        self.lock_state(index)
    }

    /// The lesson after `lesson_id` in catalog order.
    pub fn next_lesson(&self, lesson_id: &str) -> CoreResult<Option<LessonMetadata>> {
        let index = self.summary(lesson_id)?.index;
        Ok(self.lesson_at(index + 1))
    }

    /// The lesson before `lesson_id` in catalog order.
    pub fn previous_lesson(&self, lesson_id: &str) -> CoreResult<Option<LessonMetadata>> {
        let index = self.summary(lesson_id)?.index;
        Ok(index.checked_sub(1).and_then(|i| self.lesson_at(i)))
    }

    /// Where to resume: the first lesson not yet completed.
    #[must_use]
    pub fn first_incomplete_lesson(&self) -> Option<LessonMetadata> {
        self.lessons().into_iter().find(|l| !l.is_completed)
    }

    /// Open a lesson for playing. Locked lessons are refused.
    pub fn start_lesson(&self, lesson_id: &str) -> CoreResult<LessonFlow> {
        let content = self.content.lesson(lesson_id)?;
        if let LockState::Locked(reason) = self.lock_state(content.summary.index)? {
            return Err(CoreError::LessonLocked {
                lesson_id: lesson_id.to_string(),
                reason,
            });
        }
        Ok(LessonFlow::start(content)?)
    }

    fn summary(&self, lesson_id: &str) -> CoreResult<&LessonSummary> {
        self.content
            .summary(lesson_id)
            .ok_or_else(|| CoreError::LessonNotFound {
                lesson_id: lesson_id.to_string(),
            })
    }

    fn lesson_at(&self, index: usize) -> Option<LessonMetadata> {
        let summary = self.content.lessons().get(index)?;
        let state = self.guard();
        let completed = self.completed_flags(&state.progress);
        Some(self.metadata(
            summary,
            &state.progress,
            &completed,
            self.entitlement.has_active_subscription(),
        ))
    }

    fn metadata(
        &self,
        summary: &LessonSummary,
        progress: &UserProgress,
        completed: &[bool],
        subscribed: bool,
    ) -> LessonMetadata {
        LessonMetadata::from_summary(
            summary,
            progress.is_completed(&summary.id),
            progress.earned_xp(&summary.id),
            self.policy.lock_state(summary.index, completed, subscribed),
        )
    }

    fn completed_flags(&self, progress: &UserProgress) -> Vec<bool> {
        self.content
            .lessons()
            .iter()
            .map(|l| progress.is_completed(&l.id))
            .collect()
    }

    fn guard(&self) -> MutexGuard<'_, TrackerState> {
        self.engine.guard()
    }
}

impl CompletionSink for ProgressTracker {
    fn lesson_completed(&self, completion: &LessonCompletion) -> CoreResult<()> {
        self.record_completion(completion).map(|_| ())
    }
}

fn touch_streak(progress: &mut UserProgress, now: &DateTime<FixedOffset>) {
    let update = update_streak(progress.current_streak, progress.last_activity_date, now);
    progress.current_streak = update.streak;
    progress.last_activity_date = Some(update.last_activity);
}
