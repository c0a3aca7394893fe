//! Stochastic context-free grammars and their precomputed closures.
//!
//! A [`Grammar`] is an immutable, indexed collection of weighted rules.
//! Besides the rule index it carries two closed score matrices over the
//! non-terminals:
//!
//! * the left-corner closure: entry (X, Y) sums, over all chains of
//!   leftmost rule applications, the probability that expanding X first
//!   reaches a rule with Y on its left-hand side;
//! * the unit closure: the same sum restricted to unit productions.
//!
//! Both are fixpoints of their one-step matrices and keep prediction and
//! completion finite in the presence of unit cycles.

pub mod category;
pub mod closure;
pub mod rule;

use crate::error::GrammarError;
use crate::grammar::category::{Category, NonTerminal};
use crate::grammar::closure::ClosureMatrix;
use crate::grammar::rule::Rule;
use crate::semiring::Semiring;
use integeriser::{HashIntegeriser, Integeriser};
use log::debug;
use nalgebra::DMatrix;
use std::fmt;

pub type RuleId = usize;

pub struct Grammar<T, S: Semiring> {
    semiring: S,
    /// maps non-terminals to integers (usize) and vice versa
    nonterminals: HashIntegeriser<NonTerminal>,
    rules: Vec<Rule<T, S>>,
    rules_by_lhs: Vec<Vec<RuleId>>,
    left_star: ClosureMatrix<S>,
    unit_star: ClosureMatrix<S>,
}

impl<T, S: Semiring> Grammar<T, S> {
    pub fn builder(semiring: S) -> GrammarBuilder<T, S> {
        GrammarBuilder::new(semiring)
    }

    pub fn semiring(&self) -> S {
        self.semiring
    }

    pub fn nonterminal_count(&self) -> usize {
        self.nonterminals.size()
    }

    pub fn nt_id(&self, nt: &NonTerminal) -> Option<usize> {
        self.nonterminals.find_key(nt)
    }

    pub fn nonterminal(&self, id: usize) -> &NonTerminal {
        self.nonterminals
            .find_value(id)
            .expect("non-terminal id out of range")
    }

    pub fn rule(&self, id: RuleId) -> &Rule<T, S> {
        &self.rules[id]
    }

    pub fn rules(&self) -> &[Rule<T, S>] {
        &self.rules
    }

    pub fn rules_for(&self, nt_id: usize) -> &[RuleId] {
        &self.rules_by_lhs[nt_id]
    }

    /// The closed left-corner matrix, indexed by the grammar's
    /// non-terminal ids.
    pub fn left_star(&self) -> &ClosureMatrix<S> {
        &self.left_star
    }

    /// The closed unit-production matrix, indexed by the grammar's
    /// non-terminal ids.
    pub fn unit_star(&self) -> &ClosureMatrix<S> {
        &self.unit_star
    }

    /// Closed left-corner score from `x` to `y`; 0̄ when either symbol is
    /// unknown to the grammar.
    pub fn left_star_score(&self, x: &NonTerminal, y: &NonTerminal) -> S::Score {
        match (self.nt_id(x), self.nt_id(y)) {
            (Some(x), Some(y)) => self.left_star.score(x, y),
            _ => self.semiring.zero(),
        }
    }

    /// Closed unit-production score from `x` to `y`; 0̄ when either symbol
    /// is unknown to the grammar.
    pub fn unit_star_score(&self, x: &NonTerminal, y: &NonTerminal) -> S::Score {
        match (self.nt_id(x), self.nt_id(y)) {
            (Some(x), Some(y)) => self.unit_star.score(x, y),
            _ => self.semiring.zero(),
        }
    }
}

impl<T, S: Semiring> fmt::Display for Grammar<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for rule in &self.rules {
            writeln!(f, "{}", rule)?;
        }
        Ok(())
    }
}

/// Collects weighted rules and assembles the indexed, closed [`Grammar`].
/// Closures are computed eagerly by [`build`](GrammarBuilder::build), which
/// is therefore where divergent grammars are rejected.
pub struct GrammarBuilder<T, S: Semiring> {
    semiring: S,
    rules: Vec<(f64, NonTerminal, Vec<Category<T>>)>,
}

impl<T, S: Semiring> GrammarBuilder<T, S> {
    pub fn new(semiring: S) -> Self {
        GrammarBuilder {
            semiring,
            rules: Vec::new(),
        }
    }

    /// Replaces the semiring all scores will be expressed in.
    pub fn semiring<S2: Semiring>(self, semiring: S2) -> GrammarBuilder<T, S2> {
        GrammarBuilder {
            semiring,
            rules: self.rules,
        }
    }

    /// Adds LHS → RHS with the given probability.
    pub fn rule(
        mut self,
        probability: f64,
        lhs: NonTerminal,
        rhs: Vec<Category<T>>,
    ) -> Self {
        self.rules.push((probability, lhs, rhs));
        self
    }

    /// Adds LHS → RHS with probability 1.
    pub fn rule_unweighted(self, lhs: NonTerminal, rhs: Vec<Category<T>>) -> Self {
        self.rule(1.0, lhs, rhs)
    }

    pub fn build(self) -> Result<Grammar<T, S>, GrammarError> {
        let semiring = self.semiring;
        let mut nonterminals = HashIntegeriser::new();

        for (probability, lhs, rhs) in &self.rules {
            if rhs.is_empty() {
                return Err(GrammarError::Illegal(format!(
                    "rule for {} has an empty right-hand side",
                    lhs
                )));
            }
            if !probability.is_finite() || *probability < 0.0 || *probability > 1.0
            {
                return Err(GrammarError::Illegal(format!(
                    "rule for {} has probability {}, expected a value in [0, 1]",
                    lhs, probability
                )));
            }
            nonterminals.integerise(lhs.clone());
            for category in rhs {
                if let Category::Nonterminal(nt) = category {
                    nonterminals.integerise(nt.clone());
                }
            }
        }

        let n = nonterminals.size();
        let mut rules = Vec::with_capacity(self.rules.len());
        let mut rules_by_lhs = vec![Vec::new(); n];
        let mut left_corner = DMatrix::zeros(n, n);
        let mut unit = DMatrix::zeros(n, n);

        for (probability, lhs, rhs) in self.rules {
            let x = nonterminals
                .find_key(&lhs)
                .expect("left-hand side was interned above");
            if let Some(y) = rhs[0].as_nonterminal() {
                let y = nonterminals
                    .find_key(y)
                    .expect("right-hand side symbol was interned above");
                left_corner[(x, y)] += probability;
                if rhs.len() == 1 {
                    unit[(x, y)] += probability;
                }
            }
            let score = semiring.from_probability(probability);
            rules_by_lhs[x].push(rules.len());
            rules.push(Rule::new(lhs, rhs, probability, score));
        }

        let left_star = ClosureMatrix::closure(&left_corner, semiring, "left-corner")?;
        let unit_star = ClosureMatrix::closure(&unit, semiring, "unit-production")?;
        debug!(
            "built grammar with {} rules over {} non-terminals",
            rules.len(),
            n
        );

        Ok(Grammar {
            semiring,
            nonterminals,
            rules,
            rules_by_lhs,
            left_star,
            unit_star,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::category::Terminal;
    use crate::semiring::{LogSemiring, ProbabilitySemiring, Semiring};

    fn nt(name: &str) -> NonTerminal {
        NonTerminal::new(name)
    }

    fn word(w: &'static str) -> Category<&'static str> {
        Terminal::new(w, move |t: &&str| *t == w).into()
    }

    #[test]
    fn test_empty_rhs_is_rejected() {
        let result = Grammar::<&str, ProbabilitySemiring>::builder(ProbabilitySemiring)
            .rule(1.0, nt("S"), vec![])
            .build();
        assert!(matches!(result, Err(GrammarError::Illegal(_))));
    }

    #[test]
    fn test_probability_outside_unit_interval_is_rejected() {
        for &p in &[-0.5, 1.5, f64::NAN] {
            let result =
                Grammar::<&str, ProbabilitySemiring>::builder(ProbabilitySemiring)
                    .rule(p, nt("S"), vec![word("a")])
                    .build();
            assert!(matches!(result, Err(GrammarError::Illegal(_))));
        }
    }

    #[test]
    fn test_unit_cycle_closure() {
        // A → A (0.5), A → a (0.5): the unit closure sums the geometric
        // series 1 + 0.5 + 0.25 + … = 2
        let grammar = Grammar::<&str, ProbabilitySemiring>::builder(ProbabilitySemiring)
            .rule(0.5, nt("A"), vec![nt("A").into()])
            .rule(0.5, nt("A"), vec![word("a")])
            .build()
            .unwrap();
        assert!((grammar.unit_star_score(&nt("A"), &nt("A")) - 2.0).abs() < 1e-9);
        assert!((grammar.left_star_score(&nt("A"), &nt("A")) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_certain_unit_cycle_diverges() {
        let result = Grammar::<&str, ProbabilitySemiring>::builder(ProbabilitySemiring)
            .rule(1.0, nt("A"), vec![nt("A").into()])
            .rule(0.5, nt("A"), vec![word("a")])
            .build();
        assert!(matches!(result, Err(GrammarError::NotConvergent(_))));
    }

    #[test]
    fn test_left_corner_reaches_through_chains() {
        let grammar = Grammar::<&str, ProbabilitySemiring>::builder(ProbabilitySemiring)
            .rule_unweighted(nt("S"), vec![nt("NP").into(), nt("VP").into()])
            .rule(0.25, nt("NP"), vec![nt("Det").into(), nt("N").into()])
            .rule(0.75, nt("NP"), vec![word("he")])
            .rule_unweighted(nt("Det"), vec![word("the")])
            .rule_unweighted(nt("VP"), vec![word("sleeps")])
            .build()
            .unwrap();
        // S reaches Det only through NP → Det N
        let score = grammar.left_star_score(&nt("S"), &nt("Det"));
        assert!((score - 0.25).abs() < 1e-9);
        // VP is not a left corner of S
        assert_eq!(grammar.left_star_score(&nt("S"), &nt("VP")), 0.0);
        // unknown symbols score 0̄
        assert_eq!(grammar.left_star_score(&nt("S"), &nt("X")), 0.0);
    }

    #[test]
    fn test_log_semiring_closure_matches_probability_closure() {
        let build = || {
            Grammar::<&str, ProbabilitySemiring>::builder(ProbabilitySemiring)
                .rule(0.5, nt("A"), vec![nt("A").into()])
                .rule(0.5, nt("A"), vec![word("a")])
        };
        let probability = build().build().unwrap();
        let log = build().semiring(LogSemiring).build().unwrap();
        let p = probability.unit_star_score(&nt("A"), &nt("A"));
        let l = LogSemiring.to_probability(log.unit_star_score(&nt("A"), &nt("A")));
        assert!((p - l).abs() < 1e-9);
    }
}
