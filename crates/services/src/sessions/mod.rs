mod input;
mod progress;
mod service;
mod view;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::{AnswerParseError, SessionError};
pub use input::parse_answer;
pub use progress::SessionProgress;
pub use service::{PracticeSession, RecordedAnswer, SessionPhase, SubmitOutcome};
pub use view::{
    HistoryDetail, HistoryListItem, HistoryListing, HistoryRecordId, HistoryService, HistorySummary,
};
pub use workflow::{AdvanceResult, PracticeLoopService};
