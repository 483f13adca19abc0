use chrono::{DateTime, Utc};
use rand::Rng;
use std::fmt;

use drill_core::ProblemGenerator;
use drill_core::model::{AnswerDetail, Expression, GenerationConfig, SessionResult};

use super::progress::SessionProgress;
use crate::error::SessionError;

//
// ─── PHASE ─────────────────────────────────────────────────────────────────────
//

/// Lifecycle tag of a practice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    NotStarted,
    InProgress,
    Finished,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionPhase::NotStarted => "not started",
            SessionPhase::InProgress => "in progress",
            SessionPhase::Finished => "finished",
        })
    }
}

//
// ─── ANSWERS ───────────────────────────────────────────────────────────────────
//

/// Latest answer recorded for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedAnswer {
    pub submitted: i64,
    pub is_correct: bool,
}

/// Immediate feedback returned by a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub is_correct: bool,
    pub correct_answer: i64,
    pub answered_count: usize,
    pub correct_count: usize,
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

struct Run {
    student_name: String,
    config: Option<GenerationConfig>,
    questions: Vec<Expression>,
    answers: Vec<Option<RecordedAnswer>>,
    current: usize,
    started_at: DateTime<Utc>,
}

impl Run {
    fn answered_count(&self) -> usize {
        self.answers.iter().flatten().count()
    }

    fn correct_count(&self) -> usize {
        self.answers.iter().flatten().filter(|a| a.is_correct).count()
    }
}

enum State {
    NotStarted,
    InProgress(Run),
    Finished {
        run: Run,
        completed_at: DateTime<Utc>,
    },
}

impl State {
    fn phase(&self) -> SessionPhase {
        match self {
            State::NotStarted => SessionPhase::NotStarted,
            State::InProgress(_) => SessionPhase::InProgress,
            State::Finished { .. } => SessionPhase::Finished,
        }
    }

    fn run(&self) -> Option<&Run> {
        match self {
            State::NotStarted => None,
            State::InProgress(run) | State::Finished { run, .. } => Some(run),
        }
    }
}

fn out_of_sequence(operation: &'static str, phase: SessionPhase) -> SessionError {
    SessionError::OutOfSequence { operation, phase }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One practice run: `NotStarted → InProgress → Finished`.
///
/// Every operation checks the current phase first. A failed operation leaves
/// the session exactly as it was.
pub struct PracticeSession {
    state: State,
    generator: ProblemGenerator,
    record_id: Option<i64>,
}

impl Default for PracticeSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PracticeSession {
    #[must_use]
    pub fn new() -> Self {
        Self::with_generator(ProblemGenerator::new())
    }

    #[must_use]
    pub fn with_generator(generator: ProblemGenerator) -> Self {
        Self {
            state: State::NotStarted,
            generator,
            record_id: None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// Generate a batch and begin answering.
    ///
    /// Starting over an in-progress session discards it. `started_at` should
    /// come from the services layer clock.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::OutOfSequence` once finished, `EmptyName` for a
    /// blank name, or `Generation` if the batch cannot be produced. On error the
    /// current session is kept.
    pub fn start<R: Rng + ?Sized>(
        &mut self,
        config: &GenerationConfig,
        student_name: &str,
        started_at: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<(), SessionError> {
        self.ensure_startable()?;
        let name = validated_name(student_name)?;
        let questions = self.generator.generate(config, rng)?;
        self.install(name, Some(config.clone()), questions, started_at);
        Ok(())
    }

    /// Begin answering a prepared batch of questions.
    ///
    /// # Errors
    ///
    /// Same sequencing and name rules as [`PracticeSession::start`];
    /// `NoQuestions` for an empty batch.
    pub fn begin(
        &mut self,
        student_name: &str,
        questions: Vec<Expression>,
        started_at: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.ensure_startable()?;
        let name = validated_name(student_name)?;
        if questions.is_empty() {
            return Err(SessionError::NoQuestions);
        }
        self.install(name, None, questions, started_at);
        Ok(())
    }

    fn ensure_startable(&self) -> Result<(), SessionError> {
        match self.state {
            State::Finished { .. } => Err(out_of_sequence("start", SessionPhase::Finished)),
            State::NotStarted | State::InProgress(_) => Ok(()),
        }
    }

    fn install(
        &mut self,
        student_name: String,
        config: Option<GenerationConfig>,
        questions: Vec<Expression>,
        started_at: DateTime<Utc>,
    ) {
        let answers = vec![None; questions.len()];
        self.state = State::InProgress(Run {
            student_name,
            config,
            questions,
            answers,
            current: 0,
            started_at,
        });
        self.record_id = None;
    }

    /// The question awaiting an answer.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::OutOfSequence` unless the session is in progress.
    pub fn current_question(&self) -> Result<&Expression, SessionError> {
        match &self.state {
            State::InProgress(run) => Ok(&run.questions[run.current]),
            other => Err(out_of_sequence("current_question", other.phase())),
        }
    }

    /// 0-based index of the current question; equals the question count once finished.
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        match &self.state {
            State::NotStarted => None,
            State::InProgress(run) => Some(run.current),
            State::Finished { run, .. } => Some(run.questions.len()),
        }
    }

    /// Grade `value` against the current question.
    ///
    /// Submitting again before [`PracticeSession::move_next`] replaces the
    /// earlier answer for this question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::OutOfSequence` unless the session is in progress.
    pub fn submit_answer(&mut self, value: i64) -> Result<SubmitOutcome, SessionError> {
        let phase = self.phase();
        let State::InProgress(run) = &mut self.state else {
            return Err(out_of_sequence("submit_answer", phase));
        };

        let question = &run.questions[run.current];
        let correct_answer = question.answer();
        let is_correct = question.is_correct(value);
        run.answers[run.current] = Some(RecordedAnswer {
            submitted: value,
            is_correct,
        });

        Ok(SubmitOutcome {
            is_correct,
            correct_answer,
            answered_count: run.answered_count(),
            correct_count: run.correct_count(),
        })
    }

    /// Advance past the answered current question.
    ///
    /// Returns `true` while questions remain; `false` once the last question is
    /// passed and the session is finished at `at` (clamped to the start time).
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Unanswered` if the current question has no
    /// answer, or `OutOfSequence` unless the session is in progress.
    pub fn move_next(&mut self, at: DateTime<Utc>) -> Result<bool, SessionError> {
        match std::mem::replace(&mut self.state, State::NotStarted) {
            State::InProgress(mut run) => {
                if run.answers[run.current].is_none() {
                    let index = run.current;
                    self.state = State::InProgress(run);
                    return Err(SessionError::Unanswered { index });
                }

                run.current += 1;
                if run.current < run.questions.len() {
                    self.state = State::InProgress(run);
                    return Ok(true);
                }

                let completed_at = at.max(run.started_at);
                self.state = State::Finished { run, completed_at };
                Ok(false)
            }
            other => {
                let phase = other.phase();
                self.state = other;
                Err(out_of_sequence("move_next", phase))
            }
        }
    }

    /// Build the result of a finished session. Can be called repeatedly.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::OutOfSequence` unless the session is finished.
    pub fn finish(&self) -> Result<SessionResult, SessionError> {
        let State::Finished { run, completed_at } = &self.state else {
            return Err(out_of_sequence("finish", self.phase()));
        };

        let details = run
            .questions
            .iter()
            .zip(&run.answers)
            .enumerate()
            .map(|(index, (question, answer))| {
                let answer = answer.ok_or(SessionError::Unanswered { index })?;
                Ok(AnswerDetail {
                    question: question.render(),
                    submitted: answer.submitted,
                    correct_answer: question.answer(),
                    is_correct: answer.is_correct,
                })
            })
            .collect::<Result<Vec<_>, SessionError>>()?;

        Ok(SessionResult::from_details(
            run.student_name.clone(),
            run.started_at,
            *completed_at,
            details,
        )?)
    }

    /// Returns a summary of the current session progress.
    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let Some(run) = self.state.run() else {
            return SessionProgress {
                position: 0,
                total: 0,
                answered: 0,
                correct: 0,
                remaining: 0,
                is_complete: false,
            };
        };
        let total = run.questions.len();
        let is_complete = self.phase() == SessionPhase::Finished;
        SessionProgress {
            position: if is_complete { total } else { run.current + 1 },
            total,
            answered: run.answered_count(),
            correct: run.correct_count(),
            remaining: total.saturating_sub(run.current),
            is_complete,
        }
    }

    #[must_use]
    pub fn student_name(&self) -> Option<&str> {
        self.state.run().map(|run| run.student_name.as_str())
    }

    /// Configuration the questions were generated from, if any.
    #[must_use]
    pub fn config(&self) -> Option<&GenerationConfig> {
        self.state.run().and_then(|run| run.config.as_ref())
    }

    #[must_use]
    pub fn questions(&self) -> &[Expression] {
        self.state
            .run()
            .map(|run| run.questions.as_slice())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn answer_at(&self, index: usize) -> Option<RecordedAnswer> {
        self.state
            .run()
            .and_then(|run| run.answers.get(index).copied().flatten())
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.state.run().map(|run| run.started_at)
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            State::Finished { completed_at, .. } => Some(completed_at),
            State::NotStarted | State::InProgress(_) => None,
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.phase() == SessionPhase::Finished
    }

    /// Storage id of the saved history record, once persisted.
    #[must_use]
    pub fn record_id(&self) -> Option<i64> {
        self.record_id
    }

    pub(crate) fn set_record_id(&mut self, id: i64) {
        self.record_id = Some(id);
    }
}

fn validated_name(student_name: &str) -> Result<String, SessionError> {
    let trimmed = student_name.trim();
    if trimmed.is_empty() {
        return Err(SessionError::EmptyName);
    }
    Ok(trimmed.to_owned())
}

impl fmt::Debug for PracticeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PracticeSession")
            .field("phase", &self.phase())
            .field("student_name", &self.student_name())
            .field("questions_len", &self.questions().len())
            .field("current_index", &self.current_index())
            .field("record_id", &self.record_id)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use drill_core::GenerationError;
    use drill_core::model::{Difficulty, OperationMode, Operator};
    use drill_core::time::fixed_now;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn additions(sums: &[(i64, i64)]) -> Vec<Expression> {
        sums.iter()
            .map(|(a, b)| Expression::new(vec![*a, *b], vec![Operator::Add], Vec::new()).unwrap())
            .collect()
    }

    fn started(questions: Vec<Expression>) -> PracticeSession {
        let mut session = PracticeSession::new();
        session.begin("Ada", questions, fixed_now()).unwrap();
        session
    }

    #[test]
    fn resubmission_overwrites_before_advancing() {
        let mut session = started(additions(&[(3, 4), (1, 1)]));

        let first = session.submit_answer(7).unwrap();
        assert!(first.is_correct);
        assert_eq!(first.correct_count, 1);
        assert_eq!(session.answer_at(0).map(|a| a.is_correct), Some(true));

        let second = session.submit_answer(8).unwrap();
        assert!(!second.is_correct);
        assert_eq!(second.correct_answer, 7);
        assert_eq!(second.answered_count, 1);
        assert_eq!(second.correct_count, 0);
        assert_eq!(
            session.answer_at(0),
            Some(RecordedAnswer {
                submitted: 8,
                is_correct: false
            })
        );
    }

    #[test]
    fn move_next_requires_an_answer_and_changes_nothing_on_failure() {
        let mut session = started(additions(&[(3, 4), (1, 1)]));

        let err = session.move_next(fixed_now()).unwrap_err();
        assert!(matches!(err, SessionError::Unanswered { index: 0 }));
        assert!(err.is_sequencing());
        assert_eq!(session.phase(), SessionPhase::InProgress);
        assert_eq!(session.current_index(), Some(0));
        assert_eq!(session.progress().answered, 0);
        assert_eq!(session.current_question().unwrap().answer(), 7);
    }

    #[test]
    fn session_advances_and_completes() {
        let mut session = started(additions(&[(1, 2), (2, 2), (5, 5)]));
        let end = fixed_now() + Duration::seconds(61);

        for expected_more in [true, true, false] {
            let answer = session.current_question().unwrap().answer();
            session.submit_answer(answer).unwrap();
            assert_eq!(session.move_next(end).unwrap(), expected_more);
        }

        assert!(session.is_finished());
        assert_eq!(session.current_index(), Some(3));
        assert_eq!(session.completed_at(), Some(end));

        let progress = session.progress();
        assert_eq!(progress.position, 3);
        assert_eq!(progress.remaining, 0);
        assert!(progress.is_complete);

        let result = session.finish().unwrap();
        assert_eq!(result.total_questions(), 3);
        assert_eq!(result.correct_count(), 3);
        assert_eq!(result.accuracy(), 1.0);
        assert_eq!(result.elapsed_seconds(), 61);
        assert_eq!(result.details()[2].question, "5 + 5");
    }

    #[test]
    fn all_wrong_scores_zero() {
        let mut session = started(additions(&[(1, 2), (2, 2)]));
        while !session.is_finished() {
            session.submit_answer(-1).unwrap();
            session.move_next(fixed_now()).unwrap();
        }
        let result = session.finish().unwrap();
        assert_eq!(result.correct_count(), 0);
        assert_eq!(result.accuracy(), 0.0);
    }

    #[test]
    fn accuracy_is_the_exact_ratio() {
        let mut session = started(additions(&[(1, 2), (2, 2), (3, 3), (4, 4), (5, 5), (6, 6)]));
        let mut i = 0;
        while !session.is_finished() {
            let answer = session.current_question().unwrap().answer();
            session
                .submit_answer(if i % 3 == 0 { answer } else { answer + 1 })
                .unwrap();
            session.move_next(fixed_now()).unwrap();
            i += 1;
        }
        let result = session.finish().unwrap();
        assert_eq!(result.correct_count(), 2);
        assert!(result.correct_count() <= result.total_questions());
        assert_eq!(
            result.accuracy(),
            f64::from(result.correct_count()) / f64::from(result.total_questions())
        );
    }

    #[test]
    fn operations_are_guarded_by_phase() {
        let mut session = PracticeSession::new();
        assert!(matches!(
            session.current_question(),
            Err(SessionError::OutOfSequence {
                phase: SessionPhase::NotStarted,
                ..
            })
        ));
        assert!(session.submit_answer(1).unwrap_err().is_sequencing());
        assert!(session.move_next(fixed_now()).unwrap_err().is_sequencing());

        session.begin("Ada", additions(&[(1, 1)]), fixed_now()).unwrap();
        assert!(matches!(
            session.finish(),
            Err(SessionError::OutOfSequence {
                operation: "finish",
                phase: SessionPhase::InProgress
            })
        ));

        session.submit_answer(2).unwrap();
        session.move_next(fixed_now()).unwrap();
        assert!(session.current_question().unwrap_err().is_sequencing());
        assert!(session.submit_answer(2).unwrap_err().is_sequencing());
        assert!(session.move_next(fixed_now()).unwrap_err().is_sequencing());
        assert!(
            session
                .begin("Ada", additions(&[(1, 1)]), fixed_now())
                .unwrap_err()
                .is_sequencing()
        );
        assert_eq!(session.finish().unwrap().correct_count(), 1);
    }

    #[test]
    fn start_generates_from_config() {
        let config =
            GenerationConfig::single(OperationMode::Addition, Difficulty::Easy, 5).unwrap();
        let mut session = PracticeSession::new();
        session
            .start(&config, "  Ada ", fixed_now(), &mut StdRng::seed_from_u64(1))
            .unwrap();

        assert_eq!(session.phase(), SessionPhase::InProgress);
        assert_eq!(session.student_name(), Some("Ada"));
        assert_eq!(session.questions().len(), 5);
        assert_eq!(session.config(), Some(&config));
        assert_eq!(session.progress().position, 1);
    }

    #[test]
    fn restart_discards_in_progress_work() {
        let mut session = started(additions(&[(1, 1), (2, 2)]));
        session.submit_answer(2).unwrap();

        session.begin("Bo", additions(&[(4, 4)]), fixed_now()).unwrap();
        assert_eq!(session.student_name(), Some("Bo"));
        assert_eq!(session.current_index(), Some(0));
        assert_eq!(session.answer_at(0), None);
    }

    #[test]
    fn failed_start_keeps_current_session() {
        let mut session =
            PracticeSession::with_generator(ProblemGenerator::new().with_max_attempts(50));
        session.begin("Ada", additions(&[(1, 1), (2, 2)]), fixed_now()).unwrap();
        session.submit_answer(2).unwrap();

        let impossible =
            GenerationConfig::single(OperationMode::Division, Difficulty::Easy, 50).unwrap();
        let err = session
            .start(&impossible, "Ada", fixed_now(), &mut StdRng::seed_from_u64(3))
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Generation(GenerationError::Exhausted { .. })
        ));
        assert_eq!(session.questions().len(), 2);
        assert_eq!(session.answer_at(0).map(|a| a.submitted), Some(2));
    }

    #[test]
    fn rejects_blank_names_and_empty_batches() {
        let mut session = PracticeSession::new();
        assert!(matches!(
            session.begin("   ", additions(&[(1, 1)]), fixed_now()),
            Err(SessionError::EmptyName)
        ));
        assert!(matches!(
            session.begin("Ada", Vec::new(), fixed_now()),
            Err(SessionError::NoQuestions)
        ));
        assert_eq!(session.phase(), SessionPhase::NotStarted);
    }
}
