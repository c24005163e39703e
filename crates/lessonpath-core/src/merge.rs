//! Reconciliation of the on-device record with the remote record.
//!
//! The default strategy keeps whichever snapshot has strictly more XP, in its
//! entirety, with ties going to the local snapshot. It never loses progress
//! made offline on the device with more XP, but it cannot combine two devices
//! that completed different lessons. The opt-in [`MergeStrategy::Union`]
//! combines them lesson by lesson instead.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::UserProgress;

/// How two progress snapshots are reconciled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// The snapshot with strictly more XP wins whole; ties keep local
    #[default]
    HighestXp,
    /// Union of completions and badges, XP recomputed per lesson
    Union,
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "highest-xp" | "highest_xp" | "xp" => Ok(Self::HighestXp),
            "union" => Ok(Self::Union),
            other => Err(format!(
                "unknown merge strategy '{other}' (expected 'highest-xp' or 'union')"
            )),
        }
    }
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HighestXp => write!(f, "highest-xp"),
            Self::Union => write!(f, "union"),
        }
    }
}

/// Which side the merged record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeWinner {
    Local,
    Remote,
    Combined,
}

/// Output of [`merge_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub progress: UserProgress,
    pub winner: MergeWinner,
}

/// Reconcile with the default highest-XP policy.
#[must_use]
pub fn merge(local: &UserProgress, remote: &UserProgress) -> UserProgress {
    merge_with(MergeStrategy::HighestXp, local, remote).progress
}

/// Reconcile two snapshots with the given strategy.
#[must_use]
pub fn merge_with(
    strategy: MergeStrategy,
    local: &UserProgress,
    remote: &UserProgress,
) -> MergeResult {
    match strategy {
        MergeStrategy::HighestXp => {
            if remote.total_xp > local.total_xp {
                MergeResult {
                    progress: remote.clone(),
                    winner: MergeWinner::Remote,
                }
            } else {
                MergeResult {
                    progress: local.clone(),
                    winner: MergeWinner::Local,
                }
            }
        }
        MergeStrategy::Union => union_merge(local, remote),
    }
}

fn union_merge(local: &UserProgress, remote: &UserProgress) -> MergeResult {
    let mut merged = local.clone();

    for (id, entry) in &remote.lesson_progress {
        let local_done = merged
            .lesson_progress
            .get(id)
            .is_some_and(|existing| existing.completed);
        if !local_done && (entry.completed || !merged.lesson_progress.contains_key(id)) {
            merged.lesson_progress.insert(id.clone(), entry.clone());
        }
    }
    merged
        .completed_lesson_ids
        .extend(remote.completed_lesson_ids.iter().cloned());
    merged.badges.extend(remote.badges.iter().cloned());
    merged.normalize();

    // Streak follows whichever side was active most recently.
    let remote_is_fresher = match (remote.last_activity_date, local.last_activity_date) {
        (Some(r), Some(l)) => match r.cmp(&l) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => remote.current_streak > local.current_streak,
        },
        (Some(_), None) => true,
        (None, _) => false,
    };
    if remote_is_fresher {
        merged.current_streak = remote.current_streak;
        merged.last_activity_date = remote.last_activity_date;
    }

    let winner = if merged == *local {
        MergeWinner::Local
    } else if merged == *remote {
        MergeWinner::Remote
    } else {
        MergeWinner::Combined
    };

    MergeResult {
        progress: merged,
        winner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, day, 10, 0, 0).unwrap()
    }

    fn progress_with(lessons: &[(&str, u32)], streak: u32, last_day: u32) -> UserProgress {
        let mut progress = UserProgress::default();
        for (id, xp) in lessons {
            progress.record_completion(id, *xp, at(last_day));
        }
        progress.current_streak = streak;
        progress.last_activity_date = Some(at(last_day));
        progress
    }

    #[test]
    fn test_higher_xp_wins_entirely() {
        let mut a = progress_with(&[("L1", 60), ("L2", 40)], 5, 3);
        a.award_badge("gold");
        let b = progress_with(&[("L3", 40)], 9, 8);

        assert_eq!(a.total_xp, 100);
        assert_eq!(merge(&a, &b), a);
        assert_eq!(merge(&b, &a), a);
    }

    #[test]
    fn test_merge_with_self_is_identity() {
        let a = progress_with(&[("L1", 10)], 1, 2);
        assert_eq!(merge(&a, &a), a);
        assert_eq!(merge_with(MergeStrategy::Union, &a, &a).progress, a);
    }

    #[test]
    fn test_tie_keeps_local() {
        let local = progress_with(&[("L1", 20)], 1, 2);
        let remote = progress_with(&[("L2", 20)], 3, 4);

        let result = merge_with(MergeStrategy::HighestXp, &local, &remote);
        assert_eq!(result.winner, MergeWinner::Local);
        assert_eq!(result.progress, local);
    }

    #[test]
    fn test_union_combines_divergent_devices() {
        let mut local = progress_with(&[("L1", 10), ("L2", 15)], 2, 5);
        local.award_badge("starter");
        let mut remote = progress_with(&[("L1", 10), ("L3", 20)], 4, 7);
        remote.award_badge("quiz-whiz");

        let result = merge_with(MergeStrategy::Union, &local, &remote);
        let merged = result.progress;

        assert_eq!(result.winner, MergeWinner::Combined);
        assert_eq!(merged.total_xp, 45);
        assert_eq!(merged.completed_lesson_ids.len(), 3);
        assert_eq!(merged.badges.len(), 2);
        assert_eq!(merged.current_streak, 4, "remote was active more recently");
        assert_eq!(merged.last_activity_date, Some(at(7)));
        assert!(merged.is_consistent());
    }

    #[test]
    fn test_union_never_double_counts_a_lesson() {
        let local = progress_with(&[("L1", 10)], 1, 1);
        let remote = progress_with(&[("L1", 30)], 1, 1);

        let merged = merge_with(MergeStrategy::Union, &local, &remote).progress;
        assert_eq!(merged.total_xp, 10, "local entry kept for double completion");
    }

    #[test]
    fn test_union_reports_remote_when_local_adds_nothing() {
        let local = UserProgress::default();
        let remote = progress_with(&[("L1", 10)], 1, 1);

        let result = merge_with(MergeStrategy::Union, &local, &remote);
        assert_eq!(result.winner, MergeWinner::Remote);
        assert_eq!(result.progress, remote);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("highest-xp".parse::<MergeStrategy>(), Ok(MergeStrategy::HighestXp));
        assert_eq!("UNION".parse::<MergeStrategy>(), Ok(MergeStrategy::Union));
        assert!("newest".parse::<MergeStrategy>().is_err());
    }

    #[derive(Debug, Clone)]
    enum Step {
        Complete(usize, u32),
        Badge(usize),
        Merge(Vec<(usize, u32)>, MergeStrategy),
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        let strategy = prop_oneof![Just(MergeStrategy::HighestXp), Just(MergeStrategy::Union)];
        prop_oneof![
            (0usize..8, 0u32..200).prop_map(|(lesson, xp)| Step::Complete(lesson, xp)),
            (0usize..4).prop_map(Step::Badge),
            (proptest::collection::vec((0usize..8, 0u32..200), 0..6), strategy)
                .prop_map(|(lessons, strategy)| Step::Merge(lessons, strategy)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

        #[test]
        fn prop_reachable_records_stay_consistent(
            steps in proptest::collection::vec(step_strategy(), 0..24)
        ) {
            let mut progress = UserProgress::default();
            for (n, step) in steps.into_iter().enumerate() {
                let day = u32::try_from(n % 28).unwrap() + 1;
                match step {
                    Step::Complete(lesson, xp) => {
                        progress.record_completion(&format!("L{lesson}"), xp, at(day));
                    }
                    Step::Badge(badge) => {
                        progress.award_badge(&format!("badge-{badge}"));
                    }
                    Step::Merge(lessons, strategy) => {
                        let mut remote = UserProgress::default();
                        for (lesson, xp) in lessons {
                            remote.record_completion(&format!("L{lesson}"), xp, at(day));
                        }
                        let merged = merge_with(strategy, &progress, &remote).progress;
                        match strategy {
                            MergeStrategy::HighestXp => {
                                prop_assert_eq!(
                                    merged.total_xp,
                                    progress.total_xp.max(remote.total_xp)
                                );
                            }
                            MergeStrategy::Union => {
                                prop_assert!(merged.total_xp >= progress.total_xp);
                                prop_assert!(merged
                                    .completed_lesson_ids
                                    .is_superset(&remote.completed_lesson_ids));
                            }
                        }
                        progress = merged;
                    }
                }
                prop_assert!(progress.is_consistent(), "inconsistent record: {:?}", progress);
            }
        }
    }
}
