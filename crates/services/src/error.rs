//! Shared error types for the services crate.

use thiserror::Error;

use drill_core::GenerationError;
use drill_core::model::SessionResultError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

use crate::sessions::SessionPhase;

/// Errors emitted by the practice session engine and its orchestration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("{operation} is not allowed while the session is {phase}")]
    OutOfSequence {
        operation: &'static str,
        phase: SessionPhase,
    },
    #[error("question {index} has no submitted answer yet")]
    Unanswered { index: usize },
    #[error("student name cannot be empty")]
    EmptyName,
    #[error("a session needs at least one question")]
    NoQuestions,
    #[error("session was not generated from a configuration")]
    NoConfig,
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Result(#[from] SessionResultError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// True for calls made outside the operation's valid state.
    #[must_use]
    pub fn is_sequencing(&self) -> bool {
        matches!(
            self,
            SessionError::OutOfSequence { .. } | SessionError::Unanswered { .. }
        )
    }
}

/// Errors from turning typed or recognized text into an answer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerParseError {
    #[error("answer is empty")]
    Empty,
    #[error("answer is not a whole number: {0}")]
    Invalid(String),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
