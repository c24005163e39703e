//! Implementation of `lessonpath stats`, `complete`, `badge` and `reset`.

use anyhow::Result;
use serde::Serialize;

use crate::cli::commands::helpers::{with_hint, Session};
use crate::output::{Formatter, OutputFormat};

#[derive(Debug, Serialize)]
struct CompleteOutput {
    lesson_id: String,
    newly_completed: bool,
    earned_xp: u32,
    total_xp: u32,
    current_streak: u32,
}

#[derive(Debug, Serialize)]
struct BadgeOutput {
    badge: String,
    awarded: bool,
}

#[derive(Debug, Serialize)]
struct ResetOutput {
    action: &'static str,
}

/// Run the stats command.
#[tracing::instrument(skip(session, format))]
pub fn run_stats(session: &Session, format: OutputFormat) -> Result<()> {
    Formatter::new(format).print(&session.tracker().stats())
}

/// Run the complete command. XP defaults to the lesson's catalog value.
#[tracing::instrument(skip(session, format))]
pub fn run_complete(
    session: &Session,
    lesson_id: &str,
    xp: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let tracker = session.tracker();
    let lesson = tracker.lesson(lesson_id).map_err(with_hint)?;
    let earned_xp = xp.unwrap_or(lesson.xp_value);

    let outcome = tracker
        .complete_lesson(lesson_id, earned_xp)
        .map_err(with_hint)?;

    Formatter::new(format).print(&CompleteOutput {
        lesson_id: lesson_id.to_string(),
        newly_completed: outcome.newly_completed,
        earned_xp: tracker.progress().earned_xp(lesson_id),
        total_xp: outcome.total_xp,
        current_streak: outcome.current_streak,
    })
}

/// Run the badge command.
#[tracing::instrument(skip(session, format))]
pub fn run_badge(session: &Session, name: &str, format: OutputFormat) -> Result<()> {
    let awarded = session.tracker().award_badge(name).map_err(with_hint)?;
    Formatter::new(format).print(&BadgeOutput {
        badge: name.to_string(),
        awarded,
    })
}

/// Run the reset command.
#[tracing::instrument(skip(session, format))]
pub fn run_reset(session: &Session, format: OutputFormat) -> Result<()> {
    session.tracker().reset().map_err(with_hint)?;
    Formatter::new(format).print(&ResetOutput { action: "reset" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::helpers::test_support::session;
    use tempfile::tempdir;

    #[test]
    fn test_complete_uses_catalog_xp_by_default() {
        let dir = tempdir().unwrap();
        let session = session(dir.path());

        run_complete(&session, "L2", None, OutputFormat::Json).unwrap();
        run_complete(&session, "L1", Some(7), OutputFormat::Text).unwrap();

        let progress = session.tracker().progress();
        assert_eq!(progress.earned_xp("L2"), 15);
        assert_eq!(progress.earned_xp("L1"), 7);
        assert_eq!(progress.total_xp, 22);
    }

    #[test]
    fn test_complete_unknown_lesson() {
        let dir = tempdir().unwrap();
        let err = run_complete(&session(dir.path()), "L99", None, OutputFormat::Text).unwrap_err();
        assert!(err.to_string().contains("Lesson not found: L99"));
        assert!(err.to_string().contains("To fix:"));
    }

    #[test]
    fn test_badge_and_reset() {
        let dir = tempdir().unwrap();
        let session = session(dir.path());

        run_badge(&session, "early-bird", OutputFormat::Text).unwrap();
        run_badge(&session, "early-bird", OutputFormat::Text).unwrap();
        assert_eq!(session.tracker().stats().badges.len(), 1);

        run_complete(&session, "L1", None, OutputFormat::Text).unwrap();
        run_reset(&session, OutputFormat::Text).unwrap();
        let stats = session.tracker().stats();
        assert_eq!(stats.total_xp, 0);
        assert!(stats.badges.is_empty());
        run_stats(&session, OutputFormat::Json).unwrap();
    }
}
