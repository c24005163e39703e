//! Implementation of `lessonpath play`.
//!
//! Drives a lesson flow with answers given up front: quiz screens take an
//! option index, interactive screens take `pass` or `fail`. Play stops at
//! the first wrong answer or the first screen left without one.

use anyhow::{bail, Context, Result};
use lessonpath_core::catalog::ScreenKind;
use lessonpath_core::flow::{FlowPosition, FlowStep, LessonCompletion};
use serde::Serialize;
use tracing::warn;

use crate::cli::commands::helpers::{with_hint, Session};
use crate::output::{Formatter, OutputFormat};

#[derive(Debug, Serialize)]
struct PlayOutput {
    lesson_id: String,
    completed: bool,
    screens: usize,
    running_xp: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    earned_xp: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<String>,
    total_xp: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stopped_at: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

/// Run the play command.
#[tracing::instrument(skip(session, answers, format))]
pub fn run_play(
    session: &Session,
    lesson_id: &str,
    answers: &[String],
    format: OutputFormat,
) -> Result<()> {
    let tracker = session.tracker();
    let mut flow = tracker.start_lesson(lesson_id).map_err(with_hint)?;
    let mut answers = answers.iter();
    let mut completion: Option<LessonCompletion> = None;
    let mut stopped: Option<(usize, &'static str)> = None;

    while let FlowPosition::Screen(position) = flow.position() {
        let Some(screen) = flow.current_screen() else {
            break;
        };
        let (kind, needs_answer) = (screen.kind(), screen.requires_answer());

        if needs_answer {
            let Some(raw) = answers.next() else {
                stopped = Some((position, "no answer given"));
                break;
            };
            let outcome = if kind == ScreenKind::Quiz {
                let choice: usize = raw.trim().parse().with_context(|| {
                    format!("Answer {raw:?} for screen {position} is not an option index")
                })?;
                flow.answer(choice)?
            } else {
                flow.submit_interactive(parse_pass(raw)?)?
            };
            if !outcome.correct {
                stopped = Some((position, "incorrect answer"));
                break;
            }
        }

        if let FlowStep::Completed(done) = flow.advance(tracker).map_err(with_hint)? {
            completion = Some(done);
        }
    }

    let unused = answers.count();
    if unused > 0 {
        warn!(unused, "Ignoring answers past the end of the lesson");
    }

    Formatter::new(format).print(&PlayOutput {
        lesson_id: lesson_id.to_string(),
        completed: completion.is_some(),
        screens: flow.screen_count(),
        running_xp: flow.running_xp(),
        earned_xp: completion.as_ref().map(|c| c.earned_xp),
        badge: completion.and_then(|c| c.badge),
        total_xp: tracker.progress().total_xp,
        stopped_at: stopped.map(|(pos, _)| pos),
        reason: stopped.map(|(_, reason)| reason),
    })
}

fn parse_pass(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pass" | "yes" | "y" | "true" | "ok" => Ok(true),
        "fail" | "no" | "n" | "false" => Ok(false),
        other => bail!("Interactive answer must be 'pass' or 'fail', got {other:?}"),
    }
}
