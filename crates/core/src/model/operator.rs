use std::fmt;

use super::expression::ExpressionError;

/// One of the four arithmetic operators a question may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operator {
    /// Every operator, in the order mixed mode draws from.
    pub const ALL: [Operator; 4] = [
        Operator::Add,
        Operator::Subtract,
        Operator::Multiply,
        Operator::Divide,
    ];

    /// Symbol used when rendering a question.
    #[must_use]
    pub fn symbol(self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Subtract => '-',
            Operator::Multiply => '×',
            Operator::Divide => '÷',
        }
    }

    /// True for `×` and `÷`, which bind tighter than `+` and `-`.
    #[must_use]
    pub fn is_multiplicative(self) -> bool {
        matches!(self, Operator::Multiply | Operator::Divide)
    }

    /// Apply the operator to two non-negative integers.
    ///
    /// # Errors
    ///
    /// Returns `ExpressionError` when the result would be negative, fractional,
    /// a division by zero, or would overflow `i64`.
    pub fn apply(self, lhs: i64, rhs: i64) -> Result<i64, ExpressionError> {
        match self {
            Operator::Add => lhs.checked_add(rhs).ok_or(ExpressionError::Overflow),
            Operator::Subtract => {
                if rhs > lhs {
                    return Err(ExpressionError::NegativeResult { lhs, rhs });
                }
                Ok(lhs - rhs)
            }
            Operator::Multiply => lhs.checked_mul(rhs).ok_or(ExpressionError::Overflow),
            Operator::Divide => {
                if rhs == 0 {
                    return Err(ExpressionError::DivisionByZero);
                }
                if lhs % rhs != 0 {
                    return Err(ExpressionError::UnevenDivision { lhs, rhs });
                }
                Ok(lhs / rhs)
            }
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}
