//! Implementation of `lessonpath lessons`, `access`, `next` and `prev`.

use anyhow::Result;
use lessonpath_core::unlock::LockState;
use serde::Serialize;

use crate::cli::commands::helpers::{with_hint, Session};
use crate::output::{Formatter, OutputFormat};

#[derive(Debug, Serialize)]
struct AccessOutput {
    lesson_id: String,
    index: usize,
    lock: LockState,
}

/// Run the lessons command.
#[tracing::instrument(skip(session, format))]
pub fn run_lessons(session: &Session, format: OutputFormat) -> Result<()> {
    let lessons = session.tracker().lessons();
    Formatter::new(format).print_list(
        &lessons,
        "No lessons in the catalog.",
        "lessons",
        &["lessonpath play <id> --answers <a,b,...>", "lessonpath next"],
    )
}

/// Run the access command.
#[tracing::instrument(skip(session, format))]
pub fn run_access(session: &Session, lesson_id: &str, format: OutputFormat) -> Result<()> {
    let lesson = session.tracker().lesson(lesson_id).map_err(with_hint)?;
    Formatter::new(format).print(&AccessOutput {
        lesson_id: lesson.id,
        index: lesson.index,
        lock: lesson.lock,
    })
}

/// Run the next command: the lesson after `after`, or where to resume.
#[tracing::instrument(skip(session, format))]
pub fn run_next(session: &Session, after: Option<&str>, format: OutputFormat) -> Result<()> {
    let tracker = session.tracker();
    let next = match after {
        Some(lesson_id) => tracker.next_lesson(lesson_id).map_err(with_hint)?,
        None => tracker.first_incomplete_lesson(),
    };
    let none_message = if after.is_some() {
        "No more lessons."
    } else {
        "All lessons completed."
    };
    Formatter::new(format).print_optional(next.as_ref(), none_message)
}

/// Run the prev command.
#[tracing::instrument(skip(session, format))]
pub fn run_prev(session: &Session, lesson_id: &str, format: OutputFormat) -> Result<()> {
    let previous = session
        .tracker()
        .previous_lesson(lesson_id)
        .map_err(with_hint)?;
    Formatter::new(format).print_optional(previous.as_ref(), "This is the first lesson.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::helpers::test_support::session;
    use tempfile::tempdir;

    #[test]
    fn test_navigation_commands() {
        let dir = tempdir().unwrap();
        let session = session(dir.path());

        run_lessons(&session, OutputFormat::Text).unwrap();
        run_lessons(&session, OutputFormat::Json).unwrap();
        run_next(&session, None, OutputFormat::Text).unwrap();
        run_next(&session, Some("L3"), OutputFormat::Json).unwrap();
        run_prev(&session, "L1", OutputFormat::Text).unwrap();
        run_access(&session, "L2", OutputFormat::Json).unwrap();
    }

    #[test]
    fn test_unknown_lesson_errors_with_hint() {
        let dir = tempdir().unwrap();
        let session = session(dir.path());

        for err in [
            run_access(&session, "nope", OutputFormat::Text).unwrap_err(),
            run_next(&session, Some("nope"), OutputFormat::Text).unwrap_err(),
            run_prev(&session, "nope", OutputFormat::Text).unwrap_err(),
        ] {
            assert!(err.to_string().contains("To fix: lessonpath lessons"));
        }
    }
}
