use std::collections::HashSet;

use rand::Rng;
use rand::seq::IndexedRandom;
use thiserror::Error;

use crate::model::{ConfigError, Expression, GenerationConfig, Grouping, OperationMode, Operator};

/// Attempts allowed per question before the whole batch is abandoned.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1_000;

/// Tries spent picking disjoint spans for one grouping layout.
const SPAN_PICK_TRIES: u32 = 40;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GenerationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not generate question {index} after {attempts} attempts")]
    Exhausted { index: usize, attempts: u32 },
}

//
// ─── GENERATOR ─────────────────────────────────────────────────────────────────
//

/// Builds batches of distinct, well-formed questions from a `GenerationConfig`.
///
/// Each question is drawn forward and then repaired backward: the right-hand
/// operand of a subtraction is swapped or redrawn so the running value still
/// covers the subtractions after it, and a divisor is redrawn from the divisors of the running dividend that fall in
/// the difficulty range. Questions that cannot be repaired, duplicate an earlier
/// question, or disagree with [`Expression::evaluate`] are redrawn, up to
/// `max_attempts` times per question.
///
/// # Examples
///
/// ```
/// # use drill_core::generator::ProblemGenerator;
/// # use drill_core::model::{Difficulty, GenerationConfig, OperationMode};
/// # use rand::SeedableRng;
/// let config = GenerationConfig::single(OperationMode::Division, Difficulty::Medium, 5)?;
/// let mut rng = rand::rngs::StdRng::seed_from_u64(7);
/// let questions = ProblemGenerator::new().generate(&config, &mut rng)?;
///
/// assert_eq!(questions.len(), 5);
/// for q in &questions {
///     assert_eq!(q.operands()[0] % q.operands()[1], 0);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ProblemGenerator {
    max_attempts: u32,
}

impl Default for ProblemGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProblemGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Override the per-question attempt cap (minimum 1).
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Generate `config.question_count()` distinct questions.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::Exhausted` if any question cannot be produced
    /// within the attempt cap. No partial batch is returned.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        config: &GenerationConfig,
        rng: &mut R,
    ) -> Result<Vec<Expression>, GenerationError> {
        let count = usize::try_from(config.question_count()).unwrap_or(usize::MAX);
        let mut questions = Vec::with_capacity(count);
        let mut seen: HashSet<(Vec<Operator>, Vec<i64>)> = HashSet::with_capacity(count);

        for index in 0..count {
            let mut accepted = None;
            for _ in 0..self.max_attempts {
                let Some(candidate) = self.attempt(config, rng) else {
                    continue;
                };
                let key = (candidate.operators().to_vec(), candidate.operands().to_vec());
                if seen.insert(key) {
                    accepted = Some(candidate);
                    break;
                }
            }

            match accepted {
                Some(question) => questions.push(question),
                None => {
                    return Err(GenerationError::Exhausted {
                        index,
                        attempts: self.max_attempts,
                    });
                }
            }
        }

        Ok(questions)
    }

    /// One full draw-repair-group pass. `None` means "try again".
    fn attempt<R: Rng + ?Sized>(
        &self,
        config: &GenerationConfig,
        rng: &mut R,
    ) -> Option<Expression> {
        let operators = draw_operators(config, rng)?;
        let (low, high) = config.difficulty().bounds();
        let mut operands: Vec<i64> = (0..=operators.len())
            .map(|_| rng.random_range(low..=high))
            .collect();

        let value = settle_operands(&mut operands, &operators, low, high, rng)?;
        let plain = Expression::new(operands, operators, Vec::new()).ok()?;
        if plain.answer() != value {
            return None;
        }

        if config.allow_parentheses() {
            if let Some(grouped) = self.group(&plain, config.max_bracket_pairs(), rng) {
                return Some(grouped);
            }
        }
        Some(plain)
    }

    /// Try to wrap spans of `plain` in parentheses, falling back to fewer pairs.
    ///
    /// The budget is split evenly across layout sizes so the total number of
    /// evaluations stays within `max_attempts`.
    fn group<R: Rng + ?Sized>(
        &self,
        plain: &Expression,
        max_pairs: u32,
        rng: &mut R,
    ) -> Option<Expression> {
        let operand_count = plain.operands().len();
        let limit = usize::try_from(max_pairs)
            .unwrap_or(usize::MAX)
            .min(max_groupings(operand_count));
        if limit == 0 {
            return None;
        }

        let target = rng.random_range(1..=limit);
        let per_size = (self.max_attempts / u32::try_from(target).unwrap_or(u32::MAX)).max(1);

        for size in (1..=target).rev() {
            for _ in 0..per_size {
                let spans = pick_spans(operand_count, size, rng);
                if spans.is_empty() {
                    continue;
                }
                if let Ok(grouped) = Expression::new(
                    plain.operands().to_vec(),
                    plain.operators().to_vec(),
                    spans,
                ) {
                    return Some(grouped);
                }
            }
        }
        None
    }
}

//
// ─── DRAWING ───────────────────────────────────────────────────────────────────
//

/// Draw the operator sequence; `None` rejects a degenerate mixed draw.
fn draw_operators<R: Rng + ?Sized>(
    config: &GenerationConfig,
    rng: &mut R,
) -> Option<Vec<Operator>> {
    let count = usize::try_from(config.operator_count()).unwrap_or(1);
    match config.mode().fixed_operator() {
        Some(op) => Some(vec![op; count]),
        None => {
            debug_assert_eq!(config.mode(), OperationMode::Mixed);
            let ops: Vec<Operator> = (0..count)
                .map(|_| Operator::ALL[rng.random_range(0..Operator::ALL.len())])
                .collect();
            // A chain of divisions collapses to quotients of 1.
            if ops.len() >= 2 && ops.iter().all(|op| *op == Operator::Divide) {
                return None;
            }
            Some(ops)
        }
    }
}

/// Repair candidate operands so the expression evaluates cleanly under
/// precedence, returning the value it evaluates to.
///
/// Multiplicative runs are settled first (each divisor redrawn from the
/// divisors of the run's running product), then the additive chain is walked
/// left to right. A subtrahend is capped so the running value keeps room for
/// every subtraction still ahead; a single leading operand is raised to that
/// total up front when the range allows it.
fn settle_operands<R: Rng + ?Sized>(
    operands: &mut [i64],
    operators: &[Operator],
    low: i64,
    high: i64,
    rng: &mut R,
) -> Option<i64> {
    // (first operand index, last operand index) of each additive term
    let mut spans = Vec::with_capacity(operands.len());
    let mut values = Vec::with_capacity(operands.len());
    let mut additive = Vec::with_capacity(operators.len());

    let mut start = 0;
    let mut term = operands[0];
    for (i, &op) in operators.iter().enumerate() {
        let rhs = i + 1;
        match op {
            Operator::Multiply => term = op.apply(term, operands[rhs]).ok()?,
            Operator::Divide => {
                let divisor = pick_divisor(term, low, high, rng)?;
                operands[rhs] = divisor;
                term = op.apply(term, divisor).ok()?;
            }
            Operator::Add | Operator::Subtract => {
                spans.push((start, i));
                values.push(term);
                additive.push(op);
                start = rhs;
                term = operands[rhs];
            }
        }
    }
    spans.push((start, operators.len()));
    values.push(term);

    // reserve[k]: least amount the subtractions from step k onward take away
    let mut reserve = vec![0_i64; additive.len() + 1];
    for k in (0..additive.len()).rev() {
        let (first, last) = spans[k + 1];
        let least = match additive[k] {
            Operator::Subtract if first == last => low,
            Operator::Subtract => values[k + 1],
            _ => 0,
        };
        reserve[k] = reserve[k + 1].saturating_add(least);
    }

    let leading_single = spans[0].0 == spans[0].1;
    if leading_single && values[0] < reserve[0] && reserve[0] <= high {
        values[0] = rng.random_range(reserve[0].max(low)..=high);
        operands[0] = values[0];
    }

    let mut running = values[0];
    for (k, &op) in additive.iter().enumerate() {
        let (first, last) = spans[k + 1];
        let mut rhs = values[k + 1];
        let room = running.saturating_sub(reserve[k + 1]);

        if op == Operator::Subtract && rhs > room {
            if first != last {
                return None;
            }
            if k == 0 && leading_single && running <= rhs.saturating_sub(reserve[1]) {
                operands.swap(0, first);
                running = operands[0];
                rhs = operands[first];
            } else if room >= low {
                rhs = rng.random_range(low..=high.min(room));
                operands[first] = rhs;
            } else {
                return None;
            }
        }

        running = op.apply(running, rhs).ok()?;
    }

    Some(running)
}

/// A divisor of `dividend` within `[low, high]`, chosen uniformly.
fn pick_divisor<R: Rng + ?Sized>(
    dividend: i64,
    low: i64,
    high: i64,
    rng: &mut R,
) -> Option<i64> {
    if dividend == 0 {
        return Some(rng.random_range(low.max(1)..=high));
    }
    let divisors: Vec<i64> = (low.max(1)..=high).filter(|d| dividend % d == 0).collect();
    divisors.choose(rng).copied()
}

//
// ─── GROUPING ──────────────────────────────────────────────────────────────────
//

/// Most disjoint groupings of two or more operands that leave the expression
/// with at least one grouping that is not the whole thing.
fn max_groupings(operand_count: usize) -> usize {
    if operand_count < 3 { 0 } else { operand_count / 2 }
}

/// Pick up to `count` disjoint spans, never covering every operand.
fn pick_spans<R: Rng + ?Sized>(
    operand_count: usize,
    count: usize,
    rng: &mut R,
) -> Vec<Grouping> {
    let mut spans: Vec<Grouping> = Vec::with_capacity(count);
    for _ in 0..SPAN_PICK_TRIES {
        if spans.len() >= count {
            break;
        }
        let start = rng.random_range(0..operand_count - 1);
        let end = rng.random_range(start + 1..operand_count);
        if start == 0 && end == operand_count - 1 {
            continue;
        }
        let candidate = Grouping::new(start, end);
        if spans.iter().any(|g| g.overlaps(&candidate)) {
            continue;
        }
        spans.push(candidate);
    }
    spans.sort();
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Difficulty;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    fn assert_clean(q: &Expression) {
        assert_eq!(q.evaluate(), Ok(q.answer()));
        assert!(q.answer() >= 0);
        assert_eq!(q.operands().len(), q.operators().len() + 1);
    }

    #[test]
    fn addition_scenario() {
        let config =
            GenerationConfig::single(OperationMode::Addition, Difficulty::Easy, 5).unwrap();
        let questions = ProblemGenerator::new().generate(&config, &mut rng(1)).unwrap();

        assert_eq!(questions.len(), 5);
        for q in &questions {
            assert_eq!(q.operators(), &[Operator::Add]);
            assert!(q.groupings().is_empty());
            assert!(q.operands().iter().all(|v| (1..=10).contains(v)));
            assert_eq!(q.answer(), q.operands()[0] + q.operands()[1]);
        }
    }

    #[test]
    fn division_scenario() {
        let config =
            GenerationConfig::single(OperationMode::Division, Difficulty::Medium, 5).unwrap();
        for seed in 0..20 {
            let questions = ProblemGenerator::new()
                .generate(&config, &mut rng(seed))
                .unwrap();
            for q in &questions {
                let (a, b) = (q.operands()[0], q.operands()[1]);
                assert_eq!(a % b, 0);
                assert!(Difficulty::Medium.contains(a));
                assert!(Difficulty::Medium.contains(b));
                assert!(Difficulty::Medium.contains(q.answer()));
                assert_eq!(q.answer(), a / b);
            }
        }
    }

    #[test]
    fn subtraction_never_goes_negative() {
        let config =
            GenerationConfig::single(OperationMode::Subtraction, Difficulty::Hard, 50).unwrap();
        let questions = ProblemGenerator::new().generate(&config, &mut rng(3)).unwrap();
        for q in &questions {
            assert!(q.operands()[0] >= q.operands()[1]);
            assert_clean(q);
        }
    }

    #[test]
    fn batches_are_distinct() {
        let config =
            GenerationConfig::new(OperationMode::Mixed, Difficulty::Easy, 2, false, 0, 50)
                .unwrap();
        let questions = ProblemGenerator::new().generate(&config, &mut rng(11)).unwrap();
        assert_eq!(questions.len(), 50);

        let keys: HashSet<_> = questions
            .iter()
            .map(|q| (q.operators().to_vec(), q.operands().to_vec()))
            .collect();
        assert_eq!(keys.len(), 50);
    }

    #[test]
    fn mixed_with_parentheses_stays_clean() {
        let config =
            GenerationConfig::new(OperationMode::Mixed, Difficulty::Hard, 4, true, 2, 50).unwrap();
        for seed in 0..10 {
            let questions = ProblemGenerator::new()
                .generate(&config, &mut rng(seed))
                .unwrap();
            for q in &questions {
                assert_clean(q);
                assert_eq!(q.operators().len(), 4);
                assert!(q.groupings().len() <= 2);
                for g in q.groupings() {
                    assert!(g.len() >= 2);
                    assert!(g.len() < q.operands().len());
                }
            }
        }
    }

    #[test]
    fn mixed_never_draws_division_chains() {
        let config =
            GenerationConfig::new(OperationMode::Mixed, Difficulty::Medium, 2, false, 0, 50)
                .unwrap();
        let questions = ProblemGenerator::new().generate(&config, &mut rng(5)).unwrap();
        assert!(
            questions
                .iter()
                .all(|q| q.operators().iter().any(|op| *op != Operator::Divide))
        );
    }

    #[test]
    fn exhaustion_is_reported() {
        // Only 27 distinct exact divisions exist with operands in [1, 10].
        let config =
            GenerationConfig::single(OperationMode::Division, Difficulty::Easy, 50).unwrap();
        let err = ProblemGenerator::new()
            .with_max_attempts(200)
            .generate(&config, &mut rng(9))
            .unwrap_err();
        assert!(matches!(err, GenerationError::Exhausted { attempts: 200, .. }));
    }

    #[test]
    fn divisors_stay_in_range() {
        let mut r = rng(2);
        for _ in 0..100 {
            let d = pick_divisor(96, 1, 10, &mut r).unwrap();
            assert!((1..=10).contains(&d));
            assert_eq!(96 % d, 0);
        }
        assert!(pick_divisor(0, 1, 10, &mut r).is_some());
    }

    #[test]
    fn spans_are_disjoint_and_partial() {
        let mut r = rng(4);
        for _ in 0..200 {
            let spans = pick_spans(5, 2, &mut r);
            assert!(spans.len() <= 2);
            for pair in spans.windows(2) {
                assert!(!pair[0].overlaps(&pair[1]));
            }
            for g in &spans {
                assert!(!(g.start() == 0 && g.end() == 4));
            }
        }
        assert_eq!(max_groupings(2), 0);
        assert_eq!(max_groupings(5), 2);
    }

    #[test]
    fn long_subtraction_chains_are_generated() {
        let config =
            GenerationConfig::new(OperationMode::Subtraction, Difficulty::Easy, 7, false, 0, 20)
                .unwrap();
        for seed in 0..20 {
            let questions = ProblemGenerator::new()
                .generate(&config, &mut rng(seed))
                .unwrap();
            assert_eq!(questions.len(), 20);
            for q in &questions {
                assert_clean(q);
                assert!(q.operands().iter().all(|v| Difficulty::Easy.contains(*v)));
            }
        }

        let longest =
            GenerationConfig::new(OperationMode::Subtraction, Difficulty::Easy, 8, false, 0, 5)
                .unwrap();
        for seed in 0..20 {
            assert_eq!(
                ProblemGenerator::new()
                    .generate(&longest, &mut rng(seed))
                    .unwrap()
                    .len(),
                5
            );
        }
    }

    #[test]
    fn settling_keeps_room_for_later_subtractions() {
        let ops = [Operator::Subtract; 7];
        for seed in 0..200 {
            let mut operands = vec![1, 9, 9, 9, 9, 9, 9, 9];
            let value = settle_operands(&mut operands, &ops, 1, 10, &mut rng(seed));
            assert!(value.is_some_and(|v| v >= 0));
            assert!(operands[0] >= 7);
            assert!(operands.iter().all(|v| (1..=10).contains(v)));
        }
    }

    #[test]
    fn settling_swaps_a_simple_subtraction() {
        let mut operands = vec![3, 9];
        let value = settle_operands(&mut operands, &[Operator::Subtract], 1, 10, &mut rng(0));
        assert_eq!(operands, vec![9, 3]);
        assert_eq!(value, Some(6));
    }
}
