//! Typed error types for the progress tracker service layer.

use thiserror::Error;

use crate::flow::FlowError;
use crate::unlock::LockReason;

/// Result type alias for core service operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the progress tracker service layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No lesson with this id exists in the catalog.
    #[error("Lesson not found: {lesson_id}")]
    LessonNotFound { lesson_id: String },

    /// A flattened lesson index past the end of the catalog.
    #[error("Lesson index {index} is out of range ({total} lessons)")]
    InvalidLessonIndex { index: usize, total: usize },

    /// The lesson cannot be opened yet.
    #[error("Lesson {lesson_id} is locked ({reason})")]
    LessonLocked { lesson_id: String, reason: LockReason },

    /// The catalog file could not be read or is invalid.
    #[error("Invalid lesson catalog: {detail}")]
    Catalog { detail: String },

    /// A configuration value could not be parsed.
    #[error("Invalid configuration: {detail}")]
    Config { detail: String },

    /// The local progress record could not be written.
    #[error("Failed to save progress: {0:#}")]
    Storage(anyhow::Error),

    /// A lesson flow was driven incorrectly.
    #[error(transparent)]
    Flow(#[from] FlowError),

    /// Any other internal failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
