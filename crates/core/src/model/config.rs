use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::operator::Operator;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("question count must be between 5 and 50, got {provided}")]
    InvalidQuestionCount { provided: u32 },

    #[error("operator count must be between 1 and 8, got {provided}")]
    InvalidOperatorCount { provided: u32 },

    #[error("parentheses are enabled but the bracket pair limit is 0")]
    MissingBracketPairs,

    #[error("parentheses need at least two operators, got {operators}")]
    ParenthesesNeedOperators { operators: u32 },

    #[error("unknown operation mode: {0}")]
    UnknownMode(String),

    #[error("unknown difficulty: {0}")]
    UnknownDifficulty(String),
}

//
// ─── OPERATION MODE ────────────────────────────────────────────────────────────
//

/// Which operators a session draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationMode {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Mixed,
}

impl OperationMode {
    /// The single operator this mode repeats, or `None` for `Mixed`.
    #[must_use]
    pub fn fixed_operator(self) -> Option<Operator> {
        match self {
            OperationMode::Addition => Some(Operator::Add),
            OperationMode::Subtraction => Some(Operator::Subtract),
            OperationMode::Multiplication => Some(Operator::Multiply),
            OperationMode::Division => Some(Operator::Divide),
            OperationMode::Mixed => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OperationMode::Addition => "add",
            OperationMode::Subtraction => "sub",
            OperationMode::Multiplication => "mul",
            OperationMode::Division => "div",
            OperationMode::Mixed => "mixed",
        }
    }
}

impl FromStr for OperationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "add" | "addition" => Ok(Self::Addition),
            "sub" | "subtraction" => Ok(Self::Subtraction),
            "mul" | "multiplication" => Ok(Self::Multiplication),
            "div" | "division" => Ok(Self::Division),
            "mixed" => Ok(Self::Mixed),
            other => Err(ConfigError::UnknownMode(other.to_owned())),
        }
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

/// Operand magnitude band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Difficulty {
    /// Operands in `[1, 10]`.
    Easy,
    /// Operands in `[1, 50]`.
    Medium,
    /// Operands in `[1, 100]`.
    Hard,
}

impl Difficulty {
    /// Inclusive `(low, high)` operand bounds.
    #[must_use]
    pub fn bounds(self) -> (i64, i64) {
        match self {
            Difficulty::Easy => (1, 10),
            Difficulty::Medium => (1, 50),
            Difficulty::Hard => (1, 100),
        }
    }

    #[must_use]
    pub fn contains(self, value: i64) -> bool {
        let (low, high) = self.bounds();
        (low..=high).contains(&value)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" | "10" => Ok(Self::Easy),
            "medium" | "50" => Ok(Self::Medium),
            "hard" | "100" => Ok(Self::Hard),
            other => Err(ConfigError::UnknownDifficulty(other.to_owned())),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── GENERATION CONFIG ─────────────────────────────────────────────────────────
//

/// Validated parameters for one session's question batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationConfig {
    mode: OperationMode,
    difficulty: Difficulty,
    operator_count: u32,
    allow_parentheses: bool,
    max_bracket_pairs: u32,
    question_count: u32,
}

impl GenerationConfig {
    pub const MIN_QUESTIONS: u32 = 5;
    pub const MAX_QUESTIONS: u32 = 50;
    /// Keeps the largest product (`100^9`) inside `i64`.
    pub const MAX_OPERATORS: u32 = 8;

    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the question count is outside `[5, 50]`, the
    /// operator count is outside `[1, 8]`, or parentheses are enabled without a
    /// bracket budget or without room for a meaningful grouping.
    pub fn new(
        mode: OperationMode,
        difficulty: Difficulty,
        operator_count: u32,
        allow_parentheses: bool,
        max_bracket_pairs: u32,
        question_count: u32,
    ) -> Result<Self, ConfigError> {
        if !(Self::MIN_QUESTIONS..=Self::MAX_QUESTIONS).contains(&question_count) {
            return Err(ConfigError::InvalidQuestionCount {
                provided: question_count,
            });
        }
        if !(1..=Self::MAX_OPERATORS).contains(&operator_count) {
            return Err(ConfigError::InvalidOperatorCount {
                provided: operator_count,
            });
        }
        if allow_parentheses {
            if max_bracket_pairs == 0 {
                return Err(ConfigError::MissingBracketPairs);
            }
            if operator_count < 2 {
                return Err(ConfigError::ParenthesesNeedOperators {
                    operators: operator_count,
                });
            }
        }

        Ok(Self {
            mode,
            difficulty,
            operator_count,
            allow_parentheses,
            max_bracket_pairs,
            question_count,
        })
    }

    /// One operator per question, no parentheses.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidQuestionCount` if `question_count` is out of range.
    pub fn single(
        mode: OperationMode,
        difficulty: Difficulty,
        question_count: u32,
    ) -> Result<Self, ConfigError> {
        Self::new(mode, difficulty, 1, false, 0, question_count)
    }

    #[must_use]
    pub fn mode(&self) -> OperationMode {
        self.mode
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn operator_count(&self) -> u32 {
        self.operator_count
    }

    #[must_use]
    pub fn allow_parentheses(&self) -> bool {
        self.allow_parentheses
    }

    #[must_use]
    pub fn max_bracket_pairs(&self) -> u32 {
        self.max_bracket_pairs
    }

    #[must_use]
    pub fn question_count(&self) -> u32 {
        self.question_count
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            mode: OperationMode::Addition,
            difficulty: Difficulty::Easy,
            operator_count: 1,
            allow_parentheses: false,
            max_bracket_pairs: 0,
            question_count: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_count_is_bounded() {
        for count in [0, 4, 51] {
            let err = GenerationConfig::single(OperationMode::Addition, Difficulty::Easy, count)
                .unwrap_err();
            assert_eq!(err, ConfigError::InvalidQuestionCount { provided: count });
        }
        assert!(GenerationConfig::single(OperationMode::Addition, Difficulty::Easy, 5).is_ok());
        assert!(GenerationConfig::single(OperationMode::Addition, Difficulty::Easy, 50).is_ok());
    }

    #[test]
    fn operator_count_is_bounded() {
        let err = GenerationConfig::new(OperationMode::Mixed, Difficulty::Easy, 0, false, 0, 10)
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidOperatorCount { provided: 0 });

        let err = GenerationConfig::new(OperationMode::Mixed, Difficulty::Easy, 9, false, 0, 10)
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidOperatorCount { provided: 9 });
    }

    #[test]
    fn parentheses_need_budget_and_room() {
        let err = GenerationConfig::new(OperationMode::Mixed, Difficulty::Easy, 3, true, 0, 10)
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingBracketPairs);

        let err = GenerationConfig::new(OperationMode::Mixed, Difficulty::Easy, 1, true, 1, 10)
            .unwrap_err();
        assert_eq!(err, ConfigError::ParenthesesNeedOperators { operators: 1 });

        let cfg = GenerationConfig::new(OperationMode::Mixed, Difficulty::Medium, 3, true, 2, 10)
            .unwrap();
        assert!(cfg.allow_parentheses());
        assert_eq!(cfg.max_bracket_pairs(), 2);
    }

    #[test]
    fn modes_and_difficulties_parse() {
        assert_eq!("div".parse::<OperationMode>().unwrap(), OperationMode::Division);
        assert_eq!(" Mixed ".parse::<OperationMode>().unwrap(), OperationMode::Mixed);
        assert!("pow".parse::<OperationMode>().is_err());
        assert_eq!("hard".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert_eq!(Difficulty::Medium.bounds(), (1, 50));
    }

    #[test]
    fn default_is_valid() {
        let d = GenerationConfig::default();
        let rebuilt = GenerationConfig::new(
            d.mode(),
            d.difficulty(),
            d.operator_count(),
            d.allow_parentheses(),
            d.max_bracket_pairs(),
            d.question_count(),
        )
        .unwrap();
        assert_eq!(d, rebuilt);
    }
}
