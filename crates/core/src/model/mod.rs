mod config;
mod expression;
mod history;
mod operator;
mod session;

pub use config::{ConfigError, Difficulty, GenerationConfig, OperationMode};
pub use expression::{Expression, ExpressionError, Grouping};
pub use history::HistoryRecord;
pub use operator::Operator;
pub use session::{AnswerDetail, SessionResult, SessionResultError};
