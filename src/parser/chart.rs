//! The chart: per-position Earley state sets, their secondary indices and
//! the associated score maps.
//!
//! States are plain index tuples, canonicalized through a
//! [`HashIntegeriser`] so that every state is stored once and all score
//! maps are dense vectors keyed by [`StateId`]. The secondary indices are
//! maintained inside [`Chart::get_or_create`]; they are never rebuilt from
//! the state set.

use crate::grammar::category::Category;
use crate::grammar::{Grammar, RuleId};
use crate::semiring::Semiring;
use integeriser::{HashIntegeriser, Integeriser};
use std::collections::HashMap;

pub type StateId = usize;

/// An Earley item: a rule, the input position its application started at,
/// the dot position within the right-hand side, and the input position
/// reached so far. Identity is all four components.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct State {
    pub rule: RuleId,
    pub rule_start: usize,
    pub dot: usize,
    pub position: usize,
}

impl State {
    pub fn advanced(&self, position: usize) -> State {
        State {
            rule: self.rule,
            rule_start: self.rule_start,
            dot: self.dot + 1,
            position,
        }
    }
}

/// The best derivation score known for a state, together with the
/// back-pointer it came from: the completed state for an advance over a
/// non-terminal, the pre-scan state for an advance over a terminal, and
/// nothing for a freshly predicted state.
#[derive(Clone, Copy, Debug)]
pub struct ViterbiScore<S: Semiring> {
    pub score: S::Score,
    pub origin: Option<StateId>,
    pub state: StateId,
}

pub struct Chart<'g, T, S: Semiring> {
    grammar: &'g Grammar<T, S>,
    semiring: S,
    states: HashIntegeriser<State>,
    forward: Vec<S::Score>,
    inner: Vec<S::Score>,
    viterbi: Vec<Option<ViterbiScore<S>>>,
    /// position → non-terminal right of the dot → active states
    actives_nt: HashMap<usize, HashMap<usize, Vec<StateId>>>,
    /// position → active states whose next symbol is a terminal
    actives_term: HashMap<usize, Vec<StateId>>,
    /// end position → left-hand side → completed states
    completed: HashMap<usize, HashMap<usize, Vec<StateId>>>,
    /// end position → completed states that are not unit productions
    completed_non_unit: HashMap<usize, Vec<StateId>>,
}

impl<'g, T, S: Semiring> Chart<'g, T, S> {
    pub fn new(grammar: &'g Grammar<T, S>) -> Self {
        Chart {
            grammar,
            semiring: grammar.semiring(),
            states: HashIntegeriser::new(),
            forward: Vec::new(),
            inner: Vec::new(),
            viterbi: Vec::new(),
            actives_nt: HashMap::new(),
            actives_term: HashMap::new(),
            completed: HashMap::new(),
            completed_non_unit: HashMap::new(),
        }
    }

    pub fn state_count(&self) -> usize {
        self.forward.len()
    }

    /// Canonicalizes `state`, returning its id and whether it was new.
    /// A new state starts with 0̄ forward and inner scores, no Viterbi
    /// score, and is filed into every index it belongs to.
    pub fn get_or_create(&mut self, state: State) -> (StateId, bool) {
        let id = self.states.integerise(state);
        // ids are handed out sequentially, so a new state's id equals the
        // number of states seen so far
        let fresh = id == self.forward.len();
        if fresh {
            self.forward.push(self.semiring.zero());
            self.inner.push(self.semiring.zero());
            self.viterbi.push(None);
            self.index(id, &state);
        }
        (id, fresh)
    }

    fn index(&mut self, id: StateId, state: &State) {
        let rule = self.grammar.rule(state.rule);
        if state.dot > rule.len() {
            panic!(
                "invalid dot position {} in rule {}",
                state.dot,
                self.grammar.rule(state.rule)
            );
        }
        match rule.category_at(state.dot) {
            Some(Category::Nonterminal(nt)) => {
                let nt = self
                    .grammar
                    .nt_id(nt)
                    .expect("grammar rule mentions an uninterned non-terminal");
                self.actives_nt
                    .entry(state.position)
                    .or_insert_with(HashMap::new)
                    .entry(nt)
                    .or_insert_with(Vec::new)
                    .push(id);
            }
            Some(Category::Terminal(_)) => {
                self.actives_term
                    .entry(state.position)
                    .or_insert_with(Vec::new)
                    .push(id);
            }
            None => {
                let lhs = self
                    .grammar
                    .nt_id(rule.lhs())
                    .expect("grammar rule mentions an uninterned non-terminal");
                self.completed
                    .entry(state.position)
                    .or_insert_with(HashMap::new)
                    .entry(lhs)
                    .or_insert_with(Vec::new)
                    .push(id);
                if !rule.is_unit_production() {
                    self.completed_non_unit
                        .entry(state.position)
                        .or_insert_with(Vec::new)
                        .push(id);
                }
            }
        }
    }

    pub fn state(&self, id: StateId) -> State {
        *self
            .states
            .find_value(id)
            .expect("state id out of range")
    }

    pub fn find(&self, state: &State) -> Option<StateId> {
        self.states.find_key(state)
    }

    pub fn forward(&self, id: StateId) -> S::Score {
        self.forward[id]
    }

    pub fn inner(&self, id: StateId) -> S::Score {
        self.inner[id]
    }

    pub fn viterbi(&self, id: StateId) -> Option<ViterbiScore<S>> {
        self.viterbi[id]
    }

    /// forward[id] ⊕= score
    pub fn add_forward(&mut self, id: StateId, score: S::Score) {
        self.forward[id] = self.semiring.plus(self.forward[id], score);
    }

    pub fn set_forward(&mut self, id: StateId, score: S::Score) {
        self.forward[id] = score;
    }

    pub fn set_inner(&mut self, id: StateId, score: S::Score) {
        self.inner[id] = score;
    }

    pub fn set_viterbi(&mut self, score: ViterbiScore<S>) {
        self.viterbi[score.state] = Some(score);
    }

    /// Installs `candidate` iff the state has no Viterbi score yet or the
    /// candidate is strictly better. Returns whether it was installed.
    pub fn update_viterbi(&mut self, candidate: ViterbiScore<S>) -> bool {
        let improved = match &self.viterbi[candidate.state] {
            None => true,
            Some(current) => self.semiring.is_better(candidate.score, current.score),
        };
        if improved {
            self.viterbi[candidate.state] = Some(candidate);
        }
        improved
    }

    /// Active states at `position` with the non-terminal `nt` right of
    /// their dot.
    pub fn actives_on(&self, position: usize, nt: usize) -> &[StateId] {
        self.actives_nt
            .get(&position)
            .and_then(|by_nt| by_nt.get(&nt))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Snapshot of the distinct non-terminals active at `position` with
    /// their states.
    pub fn active_nonterminals_at(&self, position: usize) -> Vec<(usize, Vec<StateId>)> {
        self.actives_nt
            .get(&position)
            .map(|by_nt| {
                by_nt
                    .iter()
                    .map(|(nt, states)| (*nt, states.clone()))
                    .collect()
            })
            .unwrap_or_else(Vec::new)
    }

    pub fn actives_on_terminal(&self, position: usize) -> &[StateId] {
        self.actives_term
            .get(&position)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// All completed states ending at `position`.
    pub fn completed_at(&self, position: usize) -> Vec<StateId> {
        self.completed
            .get(&position)
            .map(|by_lhs| by_lhs.values().flatten().cloned().collect())
            .unwrap_or_else(Vec::new)
    }

    /// Completed states for left-hand side `nt` spanning `start..end`.
    pub fn completed_spanning(&self, nt: usize, start: usize, end: usize) -> Vec<StateId> {
        self.completed
            .get(&end)
            .and_then(|by_lhs| by_lhs.get(&nt))
            .map(|states| {
                states
                    .iter()
                    .filter(|&&id| self.state(id).rule_start == start)
                    .cloned()
                    .collect()
            })
            .unwrap_or_else(Vec::new)
    }

    pub fn completed_non_unit_at(&self, position: usize) -> &[StateId] {
        self.completed_non_unit
            .get(&position)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Names of the non-empty terminals that could be consumed at
    /// `position`; sorted and deduplicated for stable error reports.
    pub fn expected_terminals(&self, position: usize) -> Vec<String> {
        let mut names: Vec<String> = self
            .actives_on_terminal(position)
            .iter()
            .filter_map(|&id| {
                let state = self.state(id);
                let rule = self.grammar.rule(state.rule);
                match rule.category_at(state.dot) {
                    Some(Category::Terminal(t)) if !t.is_empty() => {
                        Some(t.name().to_string())
                    }
                    _ => None,
                }
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Dotted-rule rendering of a state, for trace output.
    pub fn format_state(&self, id: StateId) -> String {
        let state = self.state(id);
        let rule = self.grammar.rule(state.rule);
        let mut rhs = String::new();
        for (i, c) in rule.rhs().iter().enumerate() {
            if i == state.dot {
                rhs.push_str(" •");
            }
            rhs.push(' ');
            rhs.push_str(&c.to_string());
        }
        if state.dot == rule.len() {
            rhs.push_str(" •");
        }
        format!(
            "[{}..{}] {} →{}",
            state.rule_start,
            state.position,
            rule.lhs(),
            rhs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::category::{NonTerminal, Terminal};
    use crate::semiring::ProbabilitySemiring;

    fn grammar() -> Grammar<&'static str, ProbabilitySemiring> {
        Grammar::builder(ProbabilitySemiring)
            .rule_unweighted(
                NonTerminal::new("S"),
                vec![
                    NonTerminal::new("A").into(),
                    Terminal::new("b", |t: &&str| *t == "b").into(),
                ],
            )
            .rule_unweighted(
                NonTerminal::new("A"),
                vec![Terminal::new("a", |t: &&str| *t == "a").into()],
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let grammar = grammar();
        let mut chart = Chart::new(&grammar);
        let state = State {
            rule: 0,
            rule_start: 0,
            dot: 0,
            position: 0,
        };
        let (id, fresh) = chart.get_or_create(state);
        assert!(fresh);
        let (again, fresh) = chart.get_or_create(state);
        assert!(!fresh);
        assert_eq!(id, again);
        assert_eq!(chart.state_count(), 1);
    }

    #[test]
    fn test_states_are_indexed_at_creation() {
        let grammar = grammar();
        let a = grammar.nt_id(&NonTerminal::new("A")).unwrap();
        let mut chart = Chart::new(&grammar);
        // S → • A b is active on A
        let (active, _) = chart.get_or_create(State {
            rule: 0,
            rule_start: 0,
            dot: 0,
            position: 0,
        });
        assert_eq!(chart.actives_on(0, a), &[active]);
        // A → a • is completed, and not a unit production
        let (passive, _) = chart.get_or_create(State {
            rule: 1,
            rule_start: 0,
            dot: 1,
            position: 1,
        });
        assert_eq!(chart.completed_spanning(a, 0, 1), vec![passive]);
        assert_eq!(chart.completed_non_unit_at(1), &[passive]);
        // S → A • b is active on the terminal b
        let (scanning, _) = chart.get_or_create(State {
            rule: 0,
            rule_start: 0,
            dot: 1,
            position: 1,
        });
        assert_eq!(chart.actives_on_terminal(1), &[scanning]);
        assert_eq!(chart.expected_terminals(1), vec!["b".to_string()]);
    }

    #[test]
    fn test_viterbi_updates_only_when_strictly_better() {
        let grammar = grammar();
        let mut chart = Chart::new(&grammar);
        let (id, _) = chart.get_or_create(State {
            rule: 1,
            rule_start: 0,
            dot: 1,
            position: 1,
        });
        assert!(chart.update_viterbi(ViterbiScore {
            score: 0.25,
            origin: None,
            state: id,
        }));
        assert!(!chart.update_viterbi(ViterbiScore {
            score: 0.25,
            origin: None,
            state: id,
        }));
        assert!(chart.update_viterbi(ViterbiScore {
            score: 0.5,
            origin: None,
            state: id,
        }));
        assert_eq!(chart.viterbi(id).unwrap().score, 0.5);
    }

    #[test]
    fn test_score_accumulation() {
        let grammar = grammar();
        let mut chart = Chart::new(&grammar);
        let (id, _) = chart.get_or_create(State {
            rule: 0,
            rule_start: 0,
            dot: 0,
            position: 0,
        });
        assert_eq!(chart.forward(id), 0.0);
        chart.add_forward(id, 0.25);
        chart.add_forward(id, 0.25);
        assert_eq!(chart.forward(id), 0.5);
        chart.set_inner(id, 0.125);
        assert_eq!(chart.inner(id), 0.125);
    }
}
