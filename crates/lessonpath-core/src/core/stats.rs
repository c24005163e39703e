//! Read-only projections of progress for the presentation layer.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::catalog::LessonSummary;
use crate::streak::StreakStatus;
use crate::unlock::LockState;

/// Aggregate progress figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressStats {
    pub total_xp: u32,
    pub total_lessons: usize,
    pub completed_lessons: usize,
    pub completion_percentage: u32,
    pub current_streak: u32,
    pub streak_status: StreakStatus,
    pub badges: BTreeSet<String>,
}

/// One catalog lesson joined with the user's progress on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LessonMetadata {
    pub id: String,
    pub module_number: u32,
    pub index: usize,
    pub title: String,
    pub xp_value: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    pub is_completed: bool,
    pub earned_xp: u32,
    pub lock: LockState,
}

impl LessonMetadata {
    pub(crate) fn from_summary(
        summary: &LessonSummary,
        is_completed: bool,
        earned_xp: u32,
        lock: LockState,
    ) -> Self {
        Self {
            id: summary.id.clone(),
            module_number: summary.module_number,
            index: summary.index,
            title: summary.title.clone(),
            xp_value: summary.xp_value,
            badge: summary.badge.clone(),
            is_completed,
            earned_xp,
            lock,
        }
    }
}

/// `round(100 * completed / total)` with halves rounded up; 0 for an empty
/// catalog.
#[must_use]
pub fn completion_percentage(completed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let completed = u64::try_from(completed.min(total)).unwrap_or(u64::MAX);
    let total = u64::try_from(total).unwrap_or(u64::MAX);
    let pct = (200 * completed + total) / (2 * total);
    u32::try_from(pct).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_percentage() {
        assert_eq!(completion_percentage(0, 0), 0);
        assert_eq!(completion_percentage(3, 4), 75);
        assert_eq!(completion_percentage(4, 4), 100);
        assert_eq!(completion_percentage(0, 7), 0);
    }

    #[test]
    fn test_completion_percentage_rounds_half_up() {
        // 1/8 = 12.5%
        assert_eq!(completion_percentage(1, 8), 13);
        // 1/3 = 33.3%
        assert_eq!(completion_percentage(1, 3), 33);
        // 2/3 = 66.7%
        assert_eq!(completion_percentage(2, 3), 67);
    }

    #[test]
    fn test_lock_state_serializes_inline() {
        let summary = LessonSummary {
            id: "L1".to_string(),
            module_number: 1,
            index: 0,
            title: "Hello".to_string(),
            xp_value: 10,
            badge: None,
        };
        let meta = LessonMetadata::from_summary(&summary, false, 0, LockState::Unlocked);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["lock"]["locked"], false);
        assert!(json.get("badge").is_none());
    }
}
