//! Weighted production rules.

use crate::grammar::category::{Category, NonTerminal};
use crate::semiring::Semiring;
use std::fmt;

/// An immutable production LHS → RHS with a probability, kept both as the
/// original value and pre-converted into the grammar's semiring.
pub struct Rule<T, S: Semiring> {
    lhs: NonTerminal,
    rhs: Vec<Category<T>>,
    probability: f64,
    score: S::Score,
}

impl<T, S: Semiring> Rule<T, S> {
    pub(crate) fn new(
        lhs: NonTerminal,
        rhs: Vec<Category<T>>,
        probability: f64,
        score: S::Score,
    ) -> Self {
        Rule {
            lhs,
            rhs,
            probability,
            score,
        }
    }

    pub fn lhs(&self) -> &NonTerminal {
        &self.lhs
    }

    pub fn rhs(&self) -> &[Category<T>] {
        &self.rhs
    }

    pub fn len(&self) -> usize {
        self.rhs.len()
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn score(&self) -> S::Score {
        self.score
    }

    /// A unit production rewrites a non-terminal into exactly one
    /// non-terminal.
    pub fn is_unit_production(&self) -> bool {
        self.rhs.len() == 1 && self.rhs[0].as_nonterminal().is_some()
    }

    /// Error-recovery rules mention the non-lexical wildcard somewhere on
    /// their right-hand side.
    pub fn is_error_rule(&self) -> bool {
        self.rhs.iter().any(|c| match c {
            Category::Terminal(t) => t.is_non_lexical(),
            Category::Nonterminal(_) => false,
        })
    }

    /// The category right of the dot, if any.
    pub fn category_at(&self, dot: usize) -> Option<&Category<T>> {
        self.rhs.get(dot)
    }
}

impl<T, S: Semiring> Clone for Rule<T, S> {
    fn clone(&self) -> Self {
        Rule {
            lhs: self.lhs.clone(),
            rhs: self.rhs.clone(),
            probability: self.probability,
            score: self.score,
        }
    }
}

impl<T, S: Semiring> fmt::Debug for Rule<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl<T, S: Semiring> fmt::Display for Rule<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} →", self.lhs)?;
        for c in &self.rhs {
            write!(f, " {}", c)?;
        }
        write!(f, " # {}", self.probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::category::Terminal;
    use crate::semiring::ProbabilitySemiring;

    fn rule(
        lhs: &str,
        rhs: Vec<Category<char>>,
        p: f64,
    ) -> Rule<char, ProbabilitySemiring> {
        Rule::new(NonTerminal::new(lhs), rhs, p, p)
    }

    #[test]
    fn test_unit_production() {
        let unit = rule("A", vec![Category::nonterminal("B")], 0.5);
        assert!(unit.is_unit_production());
        let lexical = rule("A", vec![Terminal::new("b", |c| *c == 'b').into()], 0.5);
        assert!(!lexical.is_unit_production());
        let binary = rule(
            "A",
            vec![Category::nonterminal("B"), Category::nonterminal("C")],
            0.5,
        );
        assert!(!binary.is_unit_production());
    }

    #[test]
    fn test_error_rule() {
        let recovery = rule(
            "A",
            vec![Category::nonterminal("B"), Category::non_lexical()],
            1.0,
        );
        assert!(recovery.is_error_rule());
        let plain = rule("A", vec![Category::nonterminal("B")], 1.0);
        assert!(!plain.is_error_rule());
    }

    #[test]
    fn test_display() {
        let r = rule(
            "S",
            vec![
                Category::nonterminal("NP"),
                Category::nonterminal("VP"),
            ],
            0.25,
        );
        assert_eq!(r.to_string(), "S → NP VP # 0.25");
    }
}
