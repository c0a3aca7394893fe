//! Reflexive-transitive closures of one-step rule matrices.
//!
//! For a one-step matrix R over the non-terminals (left-corner or
//! unit-production probabilities), the closure R* = I + R + R² + … is the
//! matrix inverse (I − R)⁻¹, provided the series converges. The inversion
//! is carried out in probability space and the entries are converted into
//! the grammar's semiring once, at construction time.

use crate::error::GrammarError;
use crate::semiring::Semiring;
use log::debug;
use nalgebra::DMatrix;

/// Entries smaller than this are treated as structural zeros; inversion
/// noise around 0 would otherwise leak into the non-zero indices.
const ZERO_TOLERANCE: f64 = 1e-12;

/// A closed score matrix with per-row and per-column non-zero indices, so
/// that prediction and completion only ever enumerate reachable pairs.
pub struct ClosureMatrix<S: Semiring> {
    dimension: usize,
    scores: Vec<S::Score>,
    nonzero_cols: Vec<Vec<usize>>,
    nonzero_rows: Vec<Vec<usize>>,
}

impl<S: Semiring> ClosureMatrix<S> {
    /// Computes R* = (I − R)⁻¹ from the one-step matrix `one_step` and
    /// fails when the series behind the inverse does not converge: the
    /// matrix I − R is singular, or the inverse carries negative or
    /// non-finite entries.
    pub fn closure(
        one_step: &DMatrix<f64>,
        semiring: S,
        kind: &str,
    ) -> Result<Self, GrammarError> {
        let n = one_step.nrows();
        if n == 0 {
            return Ok(ClosureMatrix {
                dimension: 0,
                scores: Vec::new(),
                nonzero_cols: Vec::new(),
                nonzero_rows: Vec::new(),
            });
        }

        let star = (DMatrix::identity(n, n) - one_step)
            .try_inverse()
            .ok_or_else(|| {
                GrammarError::NotConvergent(format!(
                    "{} closure does not exist, I - R is singular",
                    kind
                ))
            })?;

        let mut scores = Vec::with_capacity(n * n);
        let mut nonzero_cols = vec![Vec::new(); n];
        let mut nonzero_rows = vec![Vec::new(); n];
        for x in 0..n {
            for y in 0..n {
                let mut entry = star[(x, y)];
                if !entry.is_finite() || entry < -ZERO_TOLERANCE {
                    return Err(GrammarError::NotConvergent(format!(
                        "{} closure diverges at entry ({}, {}): {}",
                        kind, x, y, entry
                    )));
                }
                if entry < ZERO_TOLERANCE {
                    entry = 0.0;
                }
                if entry > 0.0 {
                    nonzero_cols[x].push(y);
                    nonzero_rows[y].push(x);
                }
                scores.push(semiring.from_probability(entry));
            }
        }
        debug!("computed {} closure over {} non-terminals", kind, n);

        Ok(ClosureMatrix {
            dimension: n,
            scores,
            nonzero_cols,
            nonzero_rows,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// R*(x, y) as a semiring score.
    pub fn score(&self, x: usize, y: usize) -> S::Score {
        self.scores[x * self.dimension + y]
    }

    /// All y with R*(x, y) > 0̄.
    pub fn nonzero_cols(&self, x: usize) -> &[usize] {
        &self.nonzero_cols[x]
    }

    /// All x with R*(x, y) > 0̄.
    pub fn nonzero_rows(&self, y: usize) -> &[usize] {
        &self.nonzero_rows[y]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semiring::ProbabilitySemiring;

    #[test]
    fn test_closure_of_zero_matrix_is_identity() {
        let r = DMatrix::zeros(3, 3);
        let star =
            ClosureMatrix::closure(&r, ProbabilitySemiring, "test").unwrap();
        for x in 0..3 {
            for y in 0..3 {
                let expected = if x == y { 1.0 } else { 0.0 };
                assert_eq!(star.score(x, y), expected);
            }
        }
        assert_eq!(star.nonzero_cols(0), &[0]);
        assert_eq!(star.nonzero_rows(2), &[2]);
    }

    #[test]
    fn test_closure_sums_cycles() {
        // single state with a self-loop of weight 0.5: R* = 1/(1-0.5) = 2
        let mut r = DMatrix::zeros(1, 1);
        r[(0, 0)] = 0.5;
        let star =
            ClosureMatrix::closure(&r, ProbabilitySemiring, "test").unwrap();
        assert!((star.score(0, 0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_closure_is_a_fixpoint() {
        // R* = I + R·R* entrywise
        let mut r = DMatrix::zeros(2, 2);
        r[(0, 0)] = 0.25;
        r[(0, 1)] = 0.5;
        r[(1, 0)] = 0.125;
        let star =
            ClosureMatrix::closure(&r, ProbabilitySemiring, "test").unwrap();
        for x in 0..2 {
            for y in 0..2 {
                let identity = if x == y { 1.0 } else { 0.0 };
                let step: f64 =
                    (0..2).map(|z| r[(x, z)] * star.score(z, y)).sum();
                assert!((star.score(x, y) - (identity + step)).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_divergent_cycle_is_rejected() {
        let mut r = DMatrix::zeros(1, 1);
        r[(0, 0)] = 1.0;
        let result: Result<ClosureMatrix<ProbabilitySemiring>, _> =
            ClosureMatrix::closure(&r, ProbabilitySemiring, "test");
        assert!(matches!(result, Err(GrammarError::NotConvergent(_))));
    }

    #[test]
    fn test_overweight_cycle_is_rejected() {
        // gain 2 on the cycle: (1 - 2)⁻¹ = -1, negative mass is divergence
        let mut r = DMatrix::zeros(1, 1);
        r[(0, 0)] = 2.0;
        let result: Result<ClosureMatrix<ProbabilitySemiring>, _> =
            ClosureMatrix::closure(&r, ProbabilitySemiring, "test");
        assert!(matches!(result, Err(GrammarError::NotConvergent(_))));
    }
}
