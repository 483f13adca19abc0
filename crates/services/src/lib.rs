#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod sessions;

pub use drill_core::Clock;

pub use app_services::AppServices;
pub use error::{AnswerParseError, AppServicesError, SessionError};

pub use sessions::{
    AdvanceResult, HistoryDetail, HistoryListItem, HistoryListing, HistoryRecordId, HistoryService,
    HistorySummary, PracticeLoopService, PracticeSession, RecordedAnswer, SessionPhase,
    SessionProgress, SubmitOutcome, parse_answer,
};
