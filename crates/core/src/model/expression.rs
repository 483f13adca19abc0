use std::fmt;

use thiserror::Error;

use super::operator::Operator;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Reasons an operand/operator/grouping combination is not a valid question.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExpressionError {
    #[error("an expression needs at least one operator")]
    NoOperators,

    #[error("{operators} operators need {expected} operands, got {actual}")]
    OperandCount {
        operators: usize,
        expected: usize,
        actual: usize,
    },

    #[error("operand {value} is negative")]
    NegativeOperand { value: i64 },

    #[error("grouping {start}..={end} must cover at least two existing operands")]
    InvalidGrouping { start: usize, end: usize },

    #[error("groupings {first} and {second} overlap")]
    OverlappingGroupings { first: Grouping, second: Grouping },

    #[error("{lhs} - {rhs} would be negative")]
    NegativeResult { lhs: i64, rhs: i64 },

    #[error("{lhs} ÷ {rhs} does not divide evenly")]
    UnevenDivision { lhs: i64, rhs: i64 },

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,
}

//
// ─── GROUPING ──────────────────────────────────────────────────────────────────
//

/// A pair of parentheses around the operands `start..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Grouping {
    start: usize,
    end: usize,
}

impl Grouping {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn start(&self) -> usize {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of operands enclosed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) + 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    #[must_use]
    pub fn overlaps(&self, other: &Grouping) -> bool {
        !(self.end < other.start || other.end < self.start)
    }
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}..={})", self.start, self.end)
    }
}

//
// ─── EXPRESSION ────────────────────────────────────────────────────────────────
//

/// One arithmetic question and its integer answer.
///
/// An `Expression` can only be built from parts that evaluate cleanly: every
/// intermediate value is a non-negative integer and every division is exact.
/// Groupings are flat (never nested) and sorted by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    operands: Vec<i64>,
    operators: Vec<Operator>,
    groupings: Vec<Grouping>,
    answer: i64,
}

impl Expression {
    /// Build an expression, computing its answer.
    ///
    /// # Errors
    ///
    /// Returns `ExpressionError` if the shape is inconsistent, a grouping is
    /// malformed or overlaps another, or evaluation breaks an invariant.
    pub fn new(
        operands: Vec<i64>,
        operators: Vec<Operator>,
        mut groupings: Vec<Grouping>,
    ) -> Result<Self, ExpressionError> {
        if operators.is_empty() {
            return Err(ExpressionError::NoOperators);
        }
        if operands.len() != operators.len() + 1 {
            return Err(ExpressionError::OperandCount {
                operators: operators.len(),
                expected: operators.len() + 1,
                actual: operands.len(),
            });
        }
        if let Some(&value) = operands.iter().find(|v| **v < 0) {
            return Err(ExpressionError::NegativeOperand { value });
        }

        groupings.sort();
        for group in &groupings {
            if group.len() < 2 || group.end >= operands.len() {
                return Err(ExpressionError::InvalidGrouping {
                    start: group.start,
                    end: group.end,
                });
            }
        }
        for pair in groupings.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(ExpressionError::OverlappingGroupings {
                    first: pair[0],
                    second: pair[1],
                });
            }
        }

        let answer = evaluate_parts(&operands, &operators, &groupings)?;
        Ok(Self {
            operands,
            operators,
            groupings,
            answer,
        })
    }

    #[must_use]
    pub fn operands(&self) -> &[i64] {
        &self.operands
    }

    #[must_use]
    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    #[must_use]
    pub fn groupings(&self) -> &[Grouping] {
        &self.groupings
    }

    /// The answer computed at construction.
    #[must_use]
    pub fn answer(&self) -> i64 {
        self.answer
    }

    #[must_use]
    pub fn is_correct(&self, value: i64) -> bool {
        self.answer == value
    }

    /// Re-evaluate from operands, operators and groupings.
    ///
    /// Groups are collapsed first, then `×`/`÷` bind before `+`/`-`, each level
    /// folding left to right.
    ///
    /// # Errors
    ///
    /// Never fails for an `Expression` obtained from [`Expression::new`]; the
    /// `Result` mirrors the construction check.
    pub fn evaluate(&self) -> Result<i64, ExpressionError> {
        evaluate_parts(&self.operands, &self.operators, &self.groupings)
    }

    /// Human-readable form, e.g. `(3 + 4) × 2`.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, operand) in self.operands.iter().enumerate() {
            if i > 0 {
                out.push(' ');
                out.push(self.operators[i - 1].symbol());
                out.push(' ');
            }
            if self.groupings.iter().any(|g| g.start == i) {
                out.push('(');
            }
            out.push_str(&operand.to_string());
            if self.groupings.iter().any(|g| g.end == i) {
                out.push(')');
            }
        }
        out
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Evaluate with groupings collapsed first. `groupings` must be sorted and disjoint.
pub(crate) fn evaluate_parts(
    operands: &[i64],
    operators: &[Operator],
    groupings: &[Grouping],
) -> Result<i64, ExpressionError> {
    let mut values = Vec::with_capacity(operands.len());
    let mut ops = Vec::with_capacity(operators.len());
    let mut i = 0;

    while i < operands.len() {
        match groupings.iter().find(|g| g.start == i) {
            Some(group) => {
                values.push(evaluate_flat(
                    &operands[group.start..=group.end],
                    &operators[group.start..group.end],
                )?);
                i = group.end + 1;
            }
            None => {
                values.push(operands[i]);
                i += 1;
            }
        }
        if i < operands.len() {
            ops.push(operators[i - 1]);
        }
    }

    evaluate_flat(&values, &ops)
}

/// Evaluate a parenthesis-free run with conventional precedence.
pub(crate) fn evaluate_flat(values: &[i64], ops: &[Operator]) -> Result<i64, ExpressionError> {
    let Some((&first, rest)) = values.split_first() else {
        return Err(ExpressionError::NoOperators);
    };

    let mut terms = Vec::with_capacity(values.len());
    let mut additive = Vec::with_capacity(ops.len());
    let mut term = first;
    for (&op, &rhs) in ops.iter().zip(rest) {
        if op.is_multiplicative() {
            term = op.apply(term, rhs)?;
        } else {
            terms.push(term);
            additive.push(op);
            term = rhs;
        }
    }
    terms.push(term);

    let mut acc = terms[0];
    for (&op, &rhs) in additive.iter().zip(&terms[1..]) {
        acc = op.apply(acc, rhs)?;
    }
    Ok(acc)
}
