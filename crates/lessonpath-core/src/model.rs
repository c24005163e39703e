//! Progress record types.
//!
//! A [`UserProgress`] is the single record kept per user, both on-device and
//! remotely. Its serialized form (camelCase keys) is the on-device record
//! body; see [`crate::version`] for the versioned envelope around it.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress on a single lesson.
///
/// Created on first completion and never deleted (except by an explicit
/// reset of the whole record). `earned_xp` is fixed once set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgress {
    pub lesson_id: String,
    pub completed: bool,
    #[serde(rename = "earnedXP")]
    pub earned_xp: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// The complete progress record for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    #[serde(rename = "totalXP")]
    pub total_xp: u32,
    #[serde(rename = "completedLessons")]
    pub completed_lesson_ids: BTreeSet<String>,
    pub lesson_progress: BTreeMap<String, LessonProgress>,
    pub current_streak: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity_date: Option<DateTime<Utc>>,
    pub badges: BTreeSet<String>,
}

impl UserProgress {
    /// Whether the lesson has been completed.
    #[must_use]
    pub fn is_completed(&self, lesson_id: &str) -> bool {
        self.completed_lesson_ids.contains(lesson_id)
    }

    /// XP earned for a lesson, 0 if it has not been completed.
    #[must_use]
    pub fn earned_xp(&self, lesson_id: &str) -> u32 {
        self.lesson_progress
            .get(lesson_id)
            .filter(|p| p.completed)
            .map_or(0, |p| p.earned_xp)
    }

    /// Record a lesson completion.
    ///
    /// Returns `true` if this is the first completion. A repeat completion
    /// leaves XP, the completed set and the lesson entry untouched.
    pub fn record_completion(
        &mut self,
        lesson_id: &str,
        earned_xp: u32,
        at: DateTime<Utc>,
    ) -> bool {
        if self.is_completed(lesson_id) {
            return false;
        }

        self.lesson_progress.insert(
            lesson_id.to_string(),
            LessonProgress {
                lesson_id: lesson_id.to_string(),
                completed: true,
                earned_xp,
                completed_at: Some(at),
            },
        );
        self.completed_lesson_ids.insert(lesson_id.to_string());
        self.total_xp = self.total_xp.saturating_add(earned_xp);
        true
    }

    /// Add a badge. Returns `true` if the badge was not held before.
    pub fn award_badge(&mut self, badge: &str) -> bool {
        self.badges.insert(badge.to_string())
    }

    /// Sum of `earned_xp` over completed lesson entries.
    #[must_use]
    pub fn xp_from_lessons(&self) -> u32 {
        self.lesson_progress
            .values()
            .filter(|p| p.completed)
            .fold(0_u32, |acc, p| acc.saturating_add(p.earned_xp))
    }

    /// Check the XP and membership invariants.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let completed_entries: BTreeSet<&String> = self
            .lesson_progress
            .iter()
            .filter(|(_, p)| p.completed)
            .map(|(id, _)| id)
            .collect();

        self.total_xp == self.xp_from_lessons()
            && completed_entries.len() == self.completed_lesson_ids.len()
            && self
                .completed_lesson_ids
                .iter()
                .all(|id| completed_entries.contains(id))
    }

    /// Repair a record from an external source so the invariants hold.
    ///
    /// Entries marked completed join the completed set, completed ids
    /// without an entry get a zero-XP entry, entry keys are made to match
    /// their `lesson_id`, and `total_xp` is recomputed from the entries.
    /// Returns `true` if anything had to change.
    pub fn normalize(&mut self) -> bool {
        if self.is_consistent()
            && self
                .lesson_progress
                .iter()
                .all(|(id, p)| *id == p.lesson_id)
        {
            return false;
        }

        for (id, entry) in &mut self.lesson_progress {
            if entry.lesson_id != *id {
                entry.lesson_id.clone_from(id);
            }
            if entry.completed {
                self.completed_lesson_ids.insert(id.clone());
            }
        }

        for id in &self.completed_lesson_ids {
            let entry = self
                .lesson_progress
                .entry(id.clone())
                .or_insert_with(|| LessonProgress {
                    lesson_id: id.clone(),
                    completed: true,
                    earned_xp: 0,
                    completed_at: None,
                });
            entry.completed = true;
        }

        self.total_xp = self.xp_from_lessons();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_record_completion_adds_xp_once() {
        let mut progress = UserProgress::default();

        assert!(progress.record_completion("L1", 10, at(1)));
        assert!(!progress.record_completion("L1", 10, at(2)));

        assert_eq!(progress.total_xp, 10);
        assert_eq!(progress.completed_lesson_ids.len(), 1);
        assert_eq!(progress.lesson_progress["L1"].completed_at, Some(at(1)));
        assert!(progress.is_consistent());
    }

    #[test]
    fn test_repeat_completion_keeps_original_xp() {
        let mut progress = UserProgress::default();
        progress.record_completion("L1", 10, at(1));
        progress.record_completion("L1", 50, at(2));

        assert_eq!(progress.earned_xp("L1"), 10);
        assert_eq!(progress.total_xp, 10);
    }

    #[test]
    fn test_award_badge_is_idempotent() {
        let mut progress = UserProgress::default();
        assert!(progress.award_badge("first-steps"));
        assert!(!progress.award_badge("first-steps"));
        assert_eq!(progress.badges.len(), 1);
    }

    #[test]
    fn test_normalize_recomputes_total() {
        let mut progress = UserProgress::default();
        progress.record_completion("L1", 10, at(1));
        progress.record_completion("L2", 15, at(2));
        progress.total_xp = 999;

        assert!(progress.normalize());
        assert_eq!(progress.total_xp, 25);
        assert!(progress.is_consistent());
    }

    #[test]
    fn test_normalize_fills_missing_entries() {
        let mut progress = UserProgress::default();
        progress.completed_lesson_ids.insert("L7".to_string());
        progress.total_xp = 40;

        assert!(progress.normalize());
        assert_eq!(progress.lesson_progress["L7"].earned_xp, 0);
        assert_eq!(progress.total_xp, 0);
        assert!(progress.is_consistent());
    }

    #[test]
    fn test_normalize_leaves_consistent_record_alone() {
        let mut progress = UserProgress::default();
        progress.record_completion("L1", 10, at(1));
        let before = progress.clone();

        assert!(!progress.normalize());
        assert_eq!(progress, before);
    }

    #[test]
    fn test_serialized_keys_match_record_format() {
        let mut progress = UserProgress::default();
        progress.record_completion("L1", 10, at(1));
        progress.current_streak = 1;
        progress.last_activity_date = Some(at(1));

        let value = serde_json::to_value(&progress).unwrap();
        assert_eq!(value["totalXP"], 10);
        assert_eq!(value["completedLessons"][0], "L1");
        assert_eq!(value["lessonProgress"]["L1"]["earnedXP"], 10);
        assert_eq!(value["lessonProgress"]["L1"]["lessonId"], "L1");
        assert_eq!(value["currentStreak"], 1);
        assert!(value["lastActivityDate"].is_string());
        assert!(value["badges"].as_array().unwrap().is_empty());
    }
}
