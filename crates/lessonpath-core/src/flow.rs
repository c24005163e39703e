//! In-lesson screen sequencing.
//!
//! A [`LessonFlow`] walks one attempt of a lesson from its first screen to
//! `Done`, keeping a display-only running XP total. Reaching the end emits
//! exactly one [`LessonCompletion`] to a [`CompletionSink`]; the XP it
//! carries comes from the lesson's celebration screen, not from the running
//! total.

use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use crate::catalog::{LessonContent, Screen, ScreenKind};
use crate::core::CoreResult;

/// Errors from driving a lesson flow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("Lesson {lesson_id} has no screens")]
    EmptyLesson { lesson_id: String },

    #[error("Lesson {lesson_id} is already finished")]
    AlreadyFinished { lesson_id: String },

    #[error("Screen {position} needs a correct answer before continuing")]
    ScreenIncomplete { position: usize },

    #[error("Screen {position} was already answered; retry it first")]
    AlreadyAnswered { position: usize },

    #[error("Screen {position} is a {actual:?} screen, not {expected:?}")]
    WrongScreenKind {
        position: usize,
        actual: ScreenKind,
        expected: ScreenKind,
    },

    #[error("Choice {choice} is out of range; screen {position} has {options} options")]
    InvalidChoice {
        position: usize,
        choice: usize,
        options: usize,
    },
}

/// The one event a finished lesson attempt produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LessonCompletion {
    pub lesson_id: String,
    pub earned_xp: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
}

/// Receiver of lesson completions.
pub trait CompletionSink {
    fn lesson_completed(&self, completion: &LessonCompletion) -> CoreResult<()>;
}

/// Where a flow currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "position")]
pub enum FlowPosition {
    Screen(usize),
    Done,
}

/// Result of [`LessonFlow::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowStep {
    /// Moved to the screen at this position.
    Moved(usize),
    /// Left the last screen; the completion was delivered.
    Completed(LessonCompletion),
}

/// Result of answering a quiz or interactive screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnswerOutcome {
    pub correct: bool,
    /// XP added to the running total by this answer.
    pub xp_awarded: u32,
    pub running_xp: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct ScreenState {
    answered: bool,
    correct: bool,
}

/// One attempt at one lesson.
#[derive(Debug, Clone)]
pub struct LessonFlow {
    lesson_id: String,
    screens: Vec<Screen>,
    position: FlowPosition,
    screen_state: ScreenState,
    running_xp: u32,
    xp_awarded: BTreeSet<usize>,
    completion_xp: u32,
    badge: Option<String>,
}

impl LessonFlow {
    /// Start an attempt at the first screen.
    ///
    /// The lesson's XP is taken from its last celebration screen, falling
    /// back to the catalog XP value when there is none.
    pub fn start(content: LessonContent) -> Result<Self, FlowError> {
        let LessonContent { summary, screens } = content;
        if screens.is_empty() {
            return Err(FlowError::EmptyLesson {
                lesson_id: summary.id,
            });
        }

        let celebration = screens.iter().rev().find_map(|s| match s {
            Screen::Celebration { xp, badge, .. } => Some((*xp, badge.clone())),
            _ => None,
        });
        let (completion_xp, badge) = match celebration {
            Some((xp, badge)) => (xp, badge.or(summary.badge)),
            None => (summary.xp_value, summary.badge),
        };

        Ok(Self {
            lesson_id: summary.id,
            screens,
            position: FlowPosition::Screen(0),
            screen_state: ScreenState::default(),
            running_xp: 0,
            xp_awarded: BTreeSet::new(),
            completion_xp,
            badge,
        })
    }

    #[must_use]
    pub fn lesson_id(&self) -> &str {
        &self.lesson_id
    }

    #[must_use]
    pub const fn position(&self) -> FlowPosition {
        self.position
    }

    #[must_use]
    pub fn screen_count(&self) -> usize {
        self.screens.len()
    }

    /// The screen being shown, or `None` once done.
    #[must_use]
    pub fn current_screen(&self) -> Option<&Screen> {
        match self.position {
            FlowPosition::Screen(pos) => self.screens.get(pos),
            FlowPosition::Done => None,
        }
    }

    /// XP collected on quiz and interactive screens during this attempt.
    #[must_use]
    pub const fn running_xp(&self) -> u32 {
        self.running_xp
    }

    /// XP the lesson will award on completion.
    #[must_use]
    pub const fn completion_xp(&self) -> u32 {
        self.completion_xp
    }

    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self.position, FlowPosition::Done)
    }

    /// Answer the current quiz screen with the option at `choice`.
    pub fn answer(&mut self, choice: usize) -> Result<AnswerOutcome, FlowError> {
        let pos = self.current_position()?;
        match &self.screens[pos] {
            Screen::Quiz {
                options,
                answer,
                xp,
                ..
            } => {
                if choice >= options.len() {
                    return Err(FlowError::InvalidChoice {
                        position: pos,
                        choice,
                        options: options.len(),
                    });
                }
                let (correct, xp) = (choice == *answer, *xp);
                self.record_answer(pos, correct, xp)
            }
            other => Err(FlowError::WrongScreenKind {
                position: pos,
                actual: other.kind(),
                expected: ScreenKind::Quiz,
            }),
        }
    }

    /// Report the outcome of the current interactive screen.
    pub fn submit_interactive(&mut self, correct: bool) -> Result<AnswerOutcome, FlowError> {
        let pos = self.current_position()?;
        match &self.screens[pos] {
            Screen::Interactive { xp, .. } => {
                let xp = *xp;
                self.record_answer(pos, correct, xp)
            }
            other => Err(FlowError::WrongScreenKind {
                position: pos,
                actual: other.kind(),
                expected: ScreenKind::Interactive,
            }),
        }
    }

    /// Clear the current screen's answer so it can be attempted again.
    ///
    /// The position does not move, and XP already awarded for the screen is
    /// not awarded a second time.
    pub fn retry(&mut self) -> Result<(), FlowError> {
        self.current_position()?;
        self.screen_state = ScreenState::default();
        Ok(())
    }

    /// Move past the current screen.
    ///
    /// On the last screen this delivers the completion to `sink` and ends
    /// the flow. If the sink fails, the flow stays on the last screen so the
    /// completion can be retried.
    pub fn advance(&mut self, sink: &dyn CompletionSink) -> CoreResult<FlowStep> {
        let pos = self.current_position()?;

        if self.screens[pos].requires_answer() && !self.screen_state.correct {
            return Err(FlowError::ScreenIncomplete { position: pos }.into());
        }

        if pos + 1 < self.screens.len() {
            self.position = FlowPosition::Screen(pos + 1);
            self.screen_state = ScreenState::default();
            return Ok(FlowStep::Moved(pos + 1));
        }

        let completion = LessonCompletion {
            lesson_id: self.lesson_id.clone(),
            earned_xp: self.completion_xp,
            badge: self.badge.clone(),
        };
        sink.lesson_completed(&completion)?;
        self.position = FlowPosition::Done;
        Ok(FlowStep::Completed(completion))
    }

    fn current_position(&self) -> Result<usize, FlowError> {
        match self.position {
            FlowPosition::Screen(pos) => Ok(pos),
            FlowPosition::Done => Err(FlowError::AlreadyFinished {
                lesson_id: self.lesson_id.clone(),
            }),
        }
    }

    fn record_answer(
        &mut self,
        pos: usize,
        correct: bool,
        xp: u32,
    ) -> Result<AnswerOutcome, FlowError> {
        if self.screen_state.answered {
            return Err(FlowError::AlreadyAnswered { position: pos });
        }
        self.screen_state = ScreenState {
            answered: true,
            correct,
        };

        let xp_awarded = if correct && self.xp_awarded.insert(pos) {
            self.running_xp = self.running_xp.saturating_add(xp);
            xp
        } else {
            0
        };

        Ok(AnswerOutcome {
            correct,
            xp_awarded,
            running_xp: self.running_xp,
        })
    }
}
