//! Lesson access rules.
//!
//! Two gates apply to a lesson at a zero-based flattened catalog index:
//! the sequential gate (every earlier lesson done, or this is the first
//! unfinished one) and the entitlement gate (lessons past the free count
//! need an active subscription). The lock reason tells the caller which
//! prompt to show.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Number of lessons open without a subscription.
pub const DEFAULT_FREE_LESSON_COUNT: usize = 15;

/// Why a lesson cannot be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LockReason {
    /// Earlier lessons must be finished first
    Sequential,
    /// Beyond the free tier without an active subscription
    Premium,
}

impl std::fmt::Display for LockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Premium => write!(f, "premium"),
        }
    }
}

/// Access state of one lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked(LockReason),
}

impl LockState {
    #[must_use]
    pub const fn is_locked(self) -> bool {
        matches!(self, Self::Locked(_))
    }

    #[must_use]
    pub const fn reason(self) -> Option<LockReason> {
        match self {
            Self::Unlocked => None,
            Self::Locked(reason) => Some(reason),
        }
    }
}

// Serialized as `{ "locked": bool, "reason": "sequential" | "premium" | null }`
impl Serialize for LockState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("LockState", 2)?;
        state.serialize_field("locked", &self.is_locked())?;
        state.serialize_field("reason", &self.reason())?;
        state.end()
    }
}

/// Index through which lessons are sequentially open: the first incomplete
/// lesson, or `completed.len()` when everything is done.
#[must_use]
pub fn unlocked_through(completed: &[bool]) -> usize {
    completed
        .iter()
        .position(|done| !done)
        .unwrap_or(completed.len())
}

/// The unlock policy for a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlockPolicy {
    free_lesson_count: usize,
}

impl Default for UnlockPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_FREE_LESSON_COUNT)
    }
}

impl UnlockPolicy {
    #[must_use]
    pub const fn new(free_lesson_count: usize) -> Self {
        Self { free_lesson_count }
    }

    /// Whether the sequential gate lets `index` through.
    #[must_use]
    pub fn is_sequentially_unlocked(index: usize, completed: &[bool]) -> bool {
        index <= unlocked_through(completed)
    }

    /// Whether the entitlement gate blocks `index`.
    ///
    /// The gate counts lessons from 1, so with a free count of 15 the
    /// lesson at index 14 is the last free one.
    #[must_use]
    pub const fn is_premium_locked(&self, index: usize, has_subscription: bool) -> bool {
        !has_subscription && index + 1 > self.free_lesson_count
    }

    /// Access state of the lesson at `index`.
    ///
    /// `completed[i]` is whether the lesson at index `i` is done. When both
    /// gates block, the sequential reason wins.
    #[must_use]
    pub fn lock_state(
        &self,
        index: usize,
        completed: &[bool],
        has_subscription: bool,
    ) -> LockState {
        if !Self::is_sequentially_unlocked(index, completed) {
            LockState::Locked(LockReason::Sequential)
        } else if self.is_premium_locked(index, has_subscription) {
            LockState::Locked(LockReason::Premium)
        } else {
            LockState::Unlocked
        }
    }
}
