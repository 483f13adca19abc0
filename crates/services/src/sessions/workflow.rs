use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info, warn};

use drill_core::ProblemGenerator;
use drill_core::model::{GenerationConfig, HistoryRecord};
use storage::repository::HistoryRepository;

use super::service::{PracticeSession, SubmitOutcome};
use crate::Clock;
use crate::error::SessionError;

/// Result of moving past the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceResult {
    pub is_complete: bool,
    pub record_id: Option<i64>,
}

/// Orchestrates session start, answering and history persistence.
#[derive(Clone)]
pub struct PracticeLoopService {
    clock: Clock,
    history: Arc<dyn HistoryRepository>,
    generator: ProblemGenerator,
}

impl PracticeLoopService {
    #[must_use]
    pub fn new(clock: Clock, history: Arc<dyn HistoryRepository>) -> Self {
        Self {
            clock,
            history,
            generator: ProblemGenerator::new(),
        }
    }

    #[must_use]
    pub fn with_generator(mut self, generator: ProblemGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Start a new session using the thread-local RNG.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` for a blank name or a failed generation.
    pub fn start_session(
        &self,
        config: &GenerationConfig,
        student_name: &str,
    ) -> Result<PracticeSession, SessionError> {
        self.start_session_with_rng(config, student_name, &mut rand::rng())
    }

    /// Start a new session with a caller-supplied RNG.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` for a blank name or a failed generation.
    pub fn start_session_with_rng<R: Rng + ?Sized>(
        &self,
        config: &GenerationConfig,
        student_name: &str,
        rng: &mut R,
    ) -> Result<PracticeSession, SessionError> {
        let mut session = PracticeSession::with_generator(self.generator);
        session.start(config, student_name, self.clock.now(), rng)?;
        info!(
            student = session.student_name().unwrap_or_default(),
            mode = %config.mode(),
            difficulty = config.difficulty().as_str(),
            questions = config.question_count(),
            "practice session started"
        );
        Ok(session)
    }

    /// Start a fresh session with the same student and configuration.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoConfig` if `previous` was not generated from a
    /// configuration, or any error from [`PracticeLoopService::start_session`].
    pub fn restart(&self, previous: &PracticeSession) -> Result<PracticeSession, SessionError> {
        let (Some(config), Some(name)) = (previous.config(), previous.student_name()) else {
            return Err(SessionError::NoConfig);
        };
        self.start_session(config, name)
    }

    /// Grade an answer for the current question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::OutOfSequence` unless the session is in progress.
    pub fn submit(
        &self,
        session: &mut PracticeSession,
        value: i64,
    ) -> Result<SubmitOutcome, SessionError> {
        let outcome = session.submit_answer(value)?;
        debug!(
            index = session.current_index().unwrap_or_default(),
            submitted = value,
            correct = outcome.is_correct,
            "answer submitted"
        );
        Ok(outcome)
    }

    /// Advance the session and persist its history record once finished.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Unanswered`/`OutOfSequence` for sequencing
    /// failures. Returns `SessionError::Storage` if saving fails; the session
    /// stays finished and [`PracticeLoopService::finalize`] can retry the save.
    pub async fn advance(
        &self,
        session: &mut PracticeSession,
    ) -> Result<AdvanceResult, SessionError> {
        let has_more = session.move_next(self.clock.now())?;
        if has_more {
            return Ok(AdvanceResult {
                is_complete: false,
                record_id: None,
            });
        }

        let record_id = self.finalize(session).await?;
        Ok(AdvanceResult {
            is_complete: true,
            record_id: Some(record_id),
        })
    }

    /// Save the finished session's history record, once.
    ///
    /// Returns the existing id if the record was already saved.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::OutOfSequence` if the session is not finished,
    /// or `SessionError::Storage` if persistence fails.
    pub async fn finalize(&self, session: &mut PracticeSession) -> Result<i64, SessionError> {
        if let Some(id) = session.record_id() {
            return Ok(id);
        }

        let result = session.finish()?;
        let record = HistoryRecord::from_result(&result);
        match self.history.save_session(&record).await {
            Ok(id) => {
                session.set_record_id(id);
                info!(
                    record_id = id,
                    student = record.student_name(),
                    score = record.score(),
                    total = record.total_questions(),
                    elapsed_seconds = record.elapsed_seconds(),
                    "practice session saved"
                );
                Ok(id)
            }
            Err(err) => {
                warn!(
                    error = %err,
                    student = record.student_name(),
                    "failed to save practice session"
                );
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_core::model::{Difficulty, OperationMode};
    use drill_core::time::fixed_now;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use storage::repository::InMemoryRepository;

    fn service() -> (PracticeLoopService, InMemoryRepository) {
        let repo = InMemoryRepository::new();
        let svc = PracticeLoopService::new(Clock::fixed(fixed_now()), Arc::new(repo.clone()));
        (svc, repo)
    }

    #[tokio::test]
    async fn finalize_is_idempotent() {
        let (svc, repo) = service();
        let config =
            GenerationConfig::single(OperationMode::Subtraction, Difficulty::Medium, 5).unwrap();
        let mut session = svc
            .start_session_with_rng(&config, "Ada", &mut StdRng::seed_from_u64(11))
            .unwrap();

        assert!(svc.finalize(&mut session).await.unwrap_err().is_sequencing());

        let mut last = None;
        while !session.is_finished() {
            let answer = session.current_question().unwrap().answer();
            svc.submit(&mut session, answer).unwrap();
            last = Some(svc.advance(&mut session).await.unwrap());
        }

        let last = last.unwrap();
        assert!(last.is_complete);
        let id = last.record_id.unwrap();
        assert_eq!(svc.finalize(&mut session).await.unwrap(), id);
        assert_eq!(repo.load_sessions(None).await.unwrap().rows.len(), 1);
    }

    #[test]
    fn restart_reuses_name_and_config() {
        let (svc, _repo) = service();
        let config = GenerationConfig::single(OperationMode::Mixed, Difficulty::Hard, 8).unwrap();
        let first = svc.start_session(&config, "Ada").unwrap();

        let again = svc.restart(&first).unwrap();
        assert_eq!(again.student_name(), Some("Ada"));
        assert_eq!(again.config(), Some(&config));
        assert_eq!(again.questions().len(), 8);
    }

    #[test]
    fn restart_needs_a_config() {
        let (svc, _repo) = service();
        assert!(matches!(
            svc.restart(&PracticeSession::new()),
            Err(SessionError::NoConfig)
        ));
    }
}
