use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionResultError {
    #[error("completed_at is before started_at")]
    InvalidTimeRange,

    #[error("a session result needs at least one question")]
    Empty,

    #[error("too many questions for a single session: {len}")]
    TooManyQuestions { len: usize },

    #[error("total questions ({total}) does not match detail rows ({details})")]
    CountMismatch { total: u32, details: usize },

    #[error("correct count ({correct}) does not match correct detail rows ({flagged})")]
    CorrectMismatch { correct: u32, flagged: u32 },
}

/// One answered question as shown in a session report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerDetail {
    /// Rendered expression, e.g. `12 ÷ 4`.
    pub question: String,
    pub submitted: i64,
    pub correct_answer: i64,
    pub is_correct: bool,
}

impl AnswerDetail {
    #[must_use]
    pub fn new(question: impl Into<String>, submitted: i64, correct_answer: i64) -> Self {
        Self {
            question: question.into(),
            submitted,
            correct_answer,
            is_correct: submitted == correct_answer,
        }
    }
}

/// Outcome of a finished practice session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResult {
    student_name: String,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    total_questions: u32,
    correct_count: u32,
    details: Vec<AnswerDetail>,
}

impl SessionResult {
    /// Build a result from the ordered per-question details.
    ///
    /// # Errors
    ///
    /// Returns `SessionResultError::InvalidTimeRange` if `completed_at` is before `started_at`,
    /// `Empty` for no details, or `TooManyQuestions` if the count cannot fit in `u32`.
    pub fn from_details(
        student_name: impl Into<String>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        details: Vec<AnswerDetail>,
    ) -> Result<Self, SessionResultError> {
        if completed_at < started_at {
            return Err(SessionResultError::InvalidTimeRange);
        }
        if details.is_empty() {
            return Err(SessionResultError::Empty);
        }
        let total_questions = u32::try_from(details.len())
            .map_err(|_| SessionResultError::TooManyQuestions { len: details.len() })?;
        let correct_count = count_correct(&details);

        Ok(Self {
            student_name: student_name.into(),
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

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// Whole seconds between start and completion.
    #[must_use]
    pub fn elapsed_seconds(&self) -> i64 {
        (self.completed_at - self.started_at).num_seconds()
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    /// `correct_count / total_questions`, unrounded.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        accuracy(self.correct_count, self.total_questions)
    }

    #[must_use]
    pub fn details(&self) -> &[AnswerDetail] {
        &self.details
    }
}

pub(crate) fn count_correct(details: &[AnswerDetail]) -> u32 {
    details
        .iter()
        .filter(|d| d.is_correct)
        .fold(0_u32, |n, _| n.saturating_add(1))
}

pub(crate) fn accuracy(correct: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    f64::from(correct) / f64::from(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn details(flags: &[bool]) -> Vec<AnswerDetail> {
        flags
            .iter()
            .enumerate()
            .map(|(i, ok)| {
                let answer = i64::try_from(i).unwrap() + 2;
                AnswerDetail::new(format!("{i} + 2"), if *ok { answer } else { -1 }, answer)
            })
            .collect()
    }

    #[test]
    fn result_counts_correct_answers() {
        let now = fixed_now();
        let result = SessionResult::from_details(
            "Mia",
            now,
            now + chrono::Duration::seconds(95),
            details(&[true, false, true, true, false]),
        )
        .unwrap();

        assert_eq!(result.total_questions(), 5);
        assert_eq!(result.correct_count(), 3);
        assert_eq!(result.accuracy(), 3.0 / 5.0);
        assert_eq!(result.elapsed_seconds(), 95);
    }

    #[test]
    fn accuracy_extremes() {
        let now = fixed_now();
        let all = SessionResult::from_details("A", now, now, details(&[true; 5])).unwrap();
        assert_eq!(all.accuracy(), 1.0);

        let none = SessionResult::from_details("A", now, now, details(&[false; 5])).unwrap();
        assert_eq!(none.accuracy(), 0.0);
    }

    #[test]
    fn rejects_bad_input() {
        let now = fixed_now();
        assert_eq!(
            SessionResult::from_details(
                "A",
                now,
                now - chrono::Duration::seconds(1),
                details(&[true])
            ),
            Err(SessionResultError::InvalidTimeRange)
        );
        assert_eq!(
            SessionResult::from_details("A", now, now, Vec::new()),
            Err(SessionResultError::Empty)
        );
    }
}
