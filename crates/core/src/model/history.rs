use chrono::{DateTime, Utc};

use super::session::{AnswerDetail, SessionResult, SessionResultError, accuracy, count_correct};

/// Flat, persistable view of a finished session.
///
/// Counts are authoritative; accuracy is always derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    student_name: String,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    total_questions: u32,
    correct_count: u32,
    details: Vec<AnswerDetail>,
}

impl HistoryRecord {
    /// Condense a session result into a record. No I/O.
    #[must_use]
    pub fn from_result(result: &SessionResult) -> Self {
        Self {
            student_name: result.student_name().to_owned(),
            started_at: result.started_at(),
            completed_at: result.completed_at(),
            total_questions: result.total_questions(),
            correct_count: result.correct_count(),
            details: result.details().to_vec(),
        }
    }

    /// Rehydrate a record from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionResultError::InvalidTimeRange` for reversed timestamps,
    /// `CountMismatch` if `total_questions` disagrees with the detail rows, or
    /// `CorrectMismatch` if `correct_count` disagrees with the correctness flags.
    pub fn from_persisted(
        student_name: String,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        total_questions: u32,
        correct_count: u32,
        details: Vec<AnswerDetail>,
    ) -> Result<Self, SessionResultError> {
        if completed_at < started_at {
            return Err(SessionResultError::InvalidTimeRange);
        }
        if usize::try_from(total_questions).ok() != Some(details.len()) {
            return Err(SessionResultError::CountMismatch {
                total: total_questions,
                details: details.len(),
            });
        }
        let flagged = count_correct(&details);
        if flagged != correct_count {
            return Err(SessionResultError::CorrectMismatch {
                correct: correct_count,
                flagged,
            });
        }

        Ok(Self {
            student_name,
            started_at,
            completed_at,
            total_questions,
            correct_count,
            details,
        })
    }

    #[must_use]
    pub fn student_name(&self) -> &str {
        &self.student_name
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the session finished; this is the record's timestamp.
    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    #[must_use]
    pub fn elapsed_seconds(&self) -> i64 {
        (self.completed_at - self.started_at).num_seconds()
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    /// Number of correct answers.
    #[must_use]
    pub fn score(&self) -> u32 {
        self.correct_count
    }

    #[must_use]
    pub fn accuracy(&self) -> f64 {
        accuracy(self.correct_count, self.total_questions)
    }

    #[must_use]
    pub fn accuracy_percent(&self) -> f64 {
        self.accuracy() * 100.0
    }

    #[must_use]
    pub fn details(&self) -> &[AnswerDetail] {
        &self.details
    }
}
