//! Math challenge generator for strict alarms.
//!
//! [`generate`] is a pure function of the difficulty tier and a
//! [`RandomSource`]. Every draw is `floor(next() * n) + base`, taken in a
//! fixed order (shape, then `a`, `b`, `c`, then shape-specific redraws), so a
//! scripted [`SequenceRandom`] pins down the exact problem in tests.
//!
//! ## Tiers
//!
//! | tier   | a      | b     | c     | shapes                  |
//! |--------|--------|-------|-------|-------------------------|
//! | easy   | 1-10   | 1-10  | 1-5   | simple, mixed           |
//! | medium | 3-22   | 3-10  | 10-29 | simple, mixed           |
//! | hard   | 10-59  | 2-11  | 10-39 | simple, mixed, bitwise  |

use rand::{Rng, SeedableRng};
use rand_pcg::Mcg128Xsl64;
use serde::{Deserialize, Serialize};

use crate::alarm::Difficulty;

/// Source of uniform values in `[0, 1)`.
pub trait RandomSource: Send {
    fn next(&mut self) -> f64;
}

/// Thread-local OS-seeded generator for production use.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next(&mut self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// PCG generator, reproducible from a seed.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: Mcg128Xsl64,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mcg128Xsl64::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Replays a fixed list of values, wrapping around at the end.
#[derive(Debug, Clone)]
pub struct SequenceRandom {
    values: Vec<f64>,
    pos: usize,
}

impl SequenceRandom {
    pub fn new(values: impl Into<Vec<f64>>) -> Self {
        Self {
            values: values.into(),
            pos: 0,
        }
    }
}

impl RandomSource for SequenceRandom {
    fn next(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let v = self.values[self.pos % self.values.len()];
        self.pos += 1;
        v
    }
}

impl<R: RandomSource + ?Sized> RandomSource for Box<R> {
    fn next(&mut self) -> f64 {
        (**self).next()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    /// `a + b`, `a - b` or `a x b`
    Simple,
    /// `(a x b) + c`
    Mixed,
    /// `a & b`, `a | b`, `a >> n`, `a << n` (hard only)
    Bitwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Shr,
    Shl,
}

impl Operator {
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "x",
            Operator::And => "&",
            Operator::Or => "|",
            Operator::Shr => ">>",
            Operator::Shl => "<<",
        }
    }
}

/// A generated problem. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub problem_text: String,
    pub expected_answer: i64,
    pub shape: Shape,
    pub difficulty: Difficulty,
}

impl Challenge {
    pub fn verify(&self, submitted: i64) -> bool {
        verify(self, submitted)
    }
}

/// Exact integer equality; no tolerance.
pub fn verify(challenge: &Challenge, submitted: i64) -> bool {
    challenge.expected_answer == submitted
}

/// `floor(next * n) + base`, clamped so a misbehaving source cannot escape
/// the range.
fn draw(rng: &mut dyn RandomSource, n: i64, base: i64) -> i64 {
    let raw = (rng.next() * n as f64).floor() as i64;
    raw.clamp(0, n - 1) + base
}

fn operands(difficulty: Difficulty, rng: &mut dyn RandomSource) -> (i64, i64, i64) {
    match difficulty {
        Difficulty::Easy => (draw(rng, 10, 1), draw(rng, 10, 1), draw(rng, 5, 1)),
        Difficulty::Medium => (draw(rng, 20, 3), draw(rng, 8, 3), draw(rng, 20, 10)),
        Difficulty::Hard => (draw(rng, 50, 10), draw(rng, 10, 2), draw(rng, 30, 10)),
    }
}

/// Produce a fresh challenge for `difficulty`.
pub fn generate(difficulty: Difficulty, rng: &mut dyn RandomSource) -> Challenge {
    let shapes: &[Shape] = match difficulty {
        Difficulty::Hard => &[Shape::Simple, Shape::Mixed, Shape::Bitwise],
        Difficulty::Easy | Difficulty::Medium => &[Shape::Simple, Shape::Mixed],
    };
    let shape = shapes[draw(rng, shapes.len() as i64, 0) as usize];
    let (mut a, mut b, c) = operands(difficulty, rng);

    let (problem_text, expected_answer) = match shape {
        Shape::Simple => {
            const OPS: [Operator; 3] = [Operator::Add, Operator::Sub, Operator::Mul];
            let op = OPS[draw(rng, 3, 0) as usize];
            if op == Operator::Sub && a < b {
                std::mem::swap(&mut a, &mut b);
            }
            let result = match op {
                Operator::Add => a + b,
                Operator::Sub => a - b,
                _ => a * b,
            };
            (format!("{a} {} {b}", op.symbol()), result)
        }
        Shape::Mixed => (format!("({a} x {b}) + {c}"), a * b + c),
        Shape::Bitwise => {
            const OPS: [Operator; 4] = [Operator::And, Operator::Or, Operator::Shr, Operator::Shl];
            a = draw(rng, 16, 4);
            b = draw(rng, 8, 1);
            let op = OPS[draw(rng, 4, 0) as usize];
            let result = match op {
                Operator::And => a & b,
                Operator::Or => a | b,
                Operator::Shr => {
                    b = draw(rng, 3, 1);
                    a >> b
                }
                _ => {
                    b = draw(rng, 3, 1);
                    a << b
                }
            };
            (format!("{a} {} {b} (Base 10)", op.symbol()), result)
        }
    };

    Challenge {
        problem_text,
        expected_answer,
        shape,
        difficulty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tier(i: u8) -> Difficulty {
        match i % 3 {
            0 => Difficulty::Easy,
            1 => Difficulty::Medium,
            _ => Difficulty::Hard,
        }
    }

    #[test]
    fn scripted_simple_subtraction_swaps_operands() {
        // shape=simple, a=1, b=10, c=1, op=sub
        let mut rng = SequenceRandom::new(vec![0.0, 0.0, 0.95, 0.0, 0.5]);
        let c = generate(Difficulty::Easy, &mut rng);
        assert_eq!(c.shape, Shape::Simple);
        assert_eq!(c.problem_text, "10 - 1");
        assert_eq!(c.expected_answer, 9);
    }

    #[test]
    fn scripted_mixed_medium() {
        // shape=mixed, a=3+10, b=3+4, c=10+0
        let mut rng = SequenceRandom::new(vec![0.6, 0.5, 0.5, 0.0]);
        let c = generate(Difficulty::Medium, &mut rng);
        assert_eq!(c.problem_text, "(13 x 7) + 10");
        assert_eq!(c.expected_answer, 101);
    }

    #[test]
    fn scripted_hard_shift_redraws_amount() {
        // shape=bitwise, a/b/c (discarded), a=4+8, b=1+0, op=shl, shift=1+2
        let mut rng = SequenceRandom::new(vec![0.9, 0.0, 0.0, 0.0, 0.5, 0.0, 0.99, 0.9]);
        let c = generate(Difficulty::Hard, &mut rng);
        assert_eq!(c.shape, Shape::Bitwise);
        assert_eq!(c.problem_text, "12 << 3 (Base 10)");
        assert_eq!(c.expected_answer, 96);
    }

    #[test]
    fn scripted_hard_and() {
        let mut rng = SequenceRandom::new(vec![0.9, 0.0, 0.0, 0.0, 0.75, 0.5, 0.0]);
        let c = generate(Difficulty::Hard, &mut rng);
        assert_eq!(c.problem_text, "16 & 5 (Base 10)");
        assert_eq!(c.expected_answer, 0);
    }

    #[test]
    fn easy_and_medium_never_produce_bitwise() {
        let mut rng = SeededRandom::new(7);
        for _ in 0..500 {
            assert_ne!(generate(Difficulty::Easy, &mut rng).shape, Shape::Bitwise);
            assert_ne!(generate(Difficulty::Medium, &mut rng).shape, Shape::Bitwise);
        }
    }

    #[test]
    fn hard_reaches_every_shape() {
        let mut rng = SeededRandom::new(42);
        let shapes: Vec<Shape> = (0..300)
            .map(|_| generate(Difficulty::Hard, &mut rng).shape)
            .collect();
        for s in [Shape::Simple, Shape::Mixed, Shape::Bitwise] {
            assert!(shapes.contains(&s), "{s:?} never generated");
        }
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let a = generate(Difficulty::Hard, &mut SeededRandom::new(99));
        let b = generate(Difficulty::Hard, &mut SeededRandom::new(99));
        assert_eq!(a, b);
    }

    #[test]
    fn out_of_range_source_is_clamped() {
        let mut rng = SequenceRandom::new(vec![1.0]);
        let c = generate(Difficulty::Easy, &mut rng);
        // shape index clamps to mixed, operands clamp to their maxima
        assert_eq!(c.problem_text, "(10 x 10) + 5");
    }

    proptest! {
        #[test]
        fn expected_answer_verifies_and_neighbour_does_not(seed in any::<u64>(), t in 0u8..3) {
            let c = generate(tier(t), &mut SeededRandom::new(seed));
            prop_assert!(verify(&c, c.expected_answer));
            prop_assert!(!verify(&c, c.expected_answer - 1));
            prop_assert!(c.expected_answer >= 0);
        }
    }
}
