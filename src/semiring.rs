//! Semirings over which all parse scores are computed.
//!
//! A semiring is a pair of operations (⊕, ⊗) with neutral elements 0̄ and 1̄.
//! Forward, inner and Viterbi scores are all expressed in a single semiring
//! chosen when the grammar is built, so the same deduction code computes
//! plain probabilities, log-probabilities or max-derivation scores.

use log_domain::LogDomain;
use num_traits::{One, Zero};
use std::fmt;

/// Operations of a semiring (⊕, ⊗, 0̄, 1̄) over a real-valued carrier.
///
/// `is_better` orders scores by derivation preference: `is_better(a, b)`
/// holds iff a derivation scored `a` is strictly more probable than one
/// scored `b`.
pub trait Semiring: Copy + fmt::Debug {
    type Score: Copy + PartialEq + fmt::Debug + fmt::Display;

    fn zero(&self) -> Self::Score;
    fn one(&self) -> Self::Score;
    fn plus(&self, a: Self::Score, b: Self::Score) -> Self::Score;
    fn times(&self, a: Self::Score, b: Self::Score) -> Self::Score;
    fn from_probability(&self, p: f64) -> Self::Score;
    fn to_probability(&self, score: Self::Score) -> f64;
    fn is_better(&self, a: Self::Score, b: Self::Score) -> bool;

    fn is_zero(&self, a: Self::Score) -> bool {
        a == self.zero()
    }
}

/// Plain probabilities: ⊕ = +, ⊗ = ×.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProbabilitySemiring;

impl Semiring for ProbabilitySemiring {
    type Score = f64;

    fn zero(&self) -> f64 {
        0.0
    }

    fn one(&self) -> f64 {
        1.0
    }

    fn plus(&self, a: f64, b: f64) -> f64 {
        a + b
    }

    fn times(&self, a: f64, b: f64) -> f64 {
        a * b
    }

    fn from_probability(&self, p: f64) -> f64 {
        p
    }

    fn to_probability(&self, score: f64) -> f64 {
        score
    }

    fn is_better(&self, a: f64, b: f64) -> bool {
        a > b
    }
}

/// Probabilities kept in log-space, carried by [`LogDomain`]: ⊕ is
/// log-sum-exp and ⊗ is addition of logs, both supplied by the carrier
/// type, which also takes care of the usual numeric precautions.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LogSemiring;

impl Semiring for LogSemiring {
    type Score = LogDomain<f64>;

    fn zero(&self) -> LogDomain<f64> {
        LogDomain::zero()
    }

    fn one(&self) -> LogDomain<f64> {
        LogDomain::one()
    }

    fn plus(&self, a: LogDomain<f64>, b: LogDomain<f64>) -> LogDomain<f64> {
        a + b
    }

    fn times(&self, a: LogDomain<f64>, b: LogDomain<f64>) -> LogDomain<f64> {
        a * b
    }

    fn from_probability(&self, p: f64) -> LogDomain<f64> {
        // probabilities reaching this point have been validated upstream
        LogDomain::new(p).unwrap()
    }

    fn to_probability(&self, score: LogDomain<f64>) -> f64 {
        score.value()
    }

    fn is_better(&self, a: LogDomain<f64>, b: LogDomain<f64>) -> bool {
        a > b
    }
}

/// Max-derivation scores: ⊕ = max, ⊗ = ×. Summing over derivations yields
/// the probability of the single best one.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ViterbiSemiring;

impl Semiring for ViterbiSemiring {
    type Score = f64;

    fn zero(&self) -> f64 {
        0.0
    }

    fn one(&self) -> f64 {
        1.0
    }

    fn plus(&self, a: f64, b: f64) -> f64 {
        a.max(b)
    }

    fn times(&self, a: f64, b: f64) -> f64 {
        a * b
    }

    fn from_probability(&self, p: f64) -> f64 {
        p
    }

    fn to_probability(&self, score: f64) -> f64 {
        score
    }

    fn is_better(&self, a: f64, b: f64) -> bool {
        a > b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probability_semiring() {
        let sr = ProbabilitySemiring;
        assert_eq!(sr.plus(0.25, 0.5), 0.75);
        assert_eq!(sr.times(0.25, 0.5), 0.125);
        assert_eq!(sr.plus(0.25, sr.zero()), 0.25);
        assert_eq!(sr.times(0.25, sr.one()), 0.25);
        assert!(sr.is_better(0.5, 0.25));
        assert!(!sr.is_better(0.25, 0.25));
    }

    #[test]
    fn test_log_semiring_round_trip() {
        let sr = LogSemiring;
        for &p in &[0.0, 0.125, 0.5, 1.0] {
            let s = sr.from_probability(p);
            assert!((sr.to_probability(s) - p).abs() < 1e-12);
        }
        let quarter = sr.from_probability(0.25);
        let half = sr.from_probability(0.5);
        let sum = sr.plus(quarter, half);
        assert!((sr.to_probability(sum) - 0.75).abs() < 1e-12);
        let product = sr.times(quarter, half);
        assert!((sr.to_probability(product) - 0.125).abs() < 1e-12);
        assert!(sr.is_better(half, quarter));
        assert!(sr.is_zero(sr.from_probability(0.0)));
    }

    #[test]
    fn test_viterbi_semiring_takes_max() {
        let sr = ViterbiSemiring;
        assert_eq!(sr.plus(0.25, 0.5), 0.5);
        assert_eq!(sr.plus(0.5, 0.25), 0.5);
        assert_eq!(sr.times(0.5, 0.5), 0.25);
    }
}
