//! The probabilistic Earley parser.
//!
//! For every input position the parser predicts reachable rules through
//! the grammar's left-corner closure, scans the next token, and completes
//! passive states, cascading within the position. Forward and inner
//! scores are accumulated as deferred semiring expressions during
//! completion and resolved once per round; unit-production chains are
//! never expanded in the chart but summed analytically through the unit
//! closure. Viterbi scores are propagated separately, walking unit chains
//! explicitly so that the single best derivation keeps its structure.

pub mod chart;
mod deferred;

use crate::error::ParseError;
use crate::grammar::category::{Category, NonTerminal};
use crate::grammar::rule::Rule;
use crate::grammar::{Grammar, RuleId};
use crate::parser::chart::{Chart, State, StateId, ViterbiScore};
use crate::parser::deferred::DeferredScores;
use crate::semiring::Semiring;
use crate::tree::ParseTree;
use itertools::Itertools;
use log::{debug, trace};
use priority_queue::PriorityQueue;
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// Priority of a state in the best-first Viterbi worklist; ordered by the
/// semiring's derivation preference.
struct Candidate<S: Semiring> {
    semiring: S,
    score: S::Score,
}

impl<S: Semiring> PartialEq for Candidate<S> {
    fn eq(&self, other: &Self) -> bool {
        !self.semiring.is_better(self.score, other.score)
            && !self.semiring.is_better(other.score, self.score)
    }
}

impl<S: Semiring> Eq for Candidate<S> {}

impl<S: Semiring> PartialOrd for Candidate<S> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<S: Semiring> Ord for Candidate<S> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        if self.semiring.is_better(self.score, other.score) {
            std::cmp::Ordering::Greater
        } else if self.semiring.is_better(other.score, self.score) {
            std::cmp::Ordering::Less
        } else {
            std::cmp::Ordering::Equal
        }
    }
}

/// Parses token sequences against one grammar. Each call builds its own
/// chart, so a parser may be used repeatedly; a single chart is never
/// shared. Distinct grammars can be parsed from distinct threads.
pub struct Parser<'g, T, S: Semiring> {
    grammar: &'g Grammar<T, S>,
    scan_probability: Option<Box<dyn Fn(usize) -> f64>>,
}

impl<'g, T, S> Parser<'g, T, S>
where
    T: Clone + fmt::Debug,
    S: Semiring,
{
    pub fn new(grammar: &'g Grammar<T, S>) -> Self {
        Parser {
            grammar,
            scan_probability: None,
        }
    }

    /// Installs a per-position confidence hook: the returned value scales
    /// the scores of states advanced over the token at that position.
    /// Values outside [0, 1], NaN included, are treated as "no opinion"
    /// and ignored.
    pub fn with_scan_probability<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize) -> f64 + 'static,
    {
        self.scan_probability = Some(Box::new(hook));
        self
    }

    /// Runs the full deduction over `tokens` and returns the chart wrapped
    /// in a [`Parse`]. Fails with [`ParseError::UnexpectedToken`] when some
    /// token cannot advance any state.
    pub fn parse(
        &self,
        start: &NonTerminal,
        tokens: &[T],
    ) -> Result<Parse<'g, T, S>, ParseError> {
        let mut chart = Chart::new(self.grammar);
        if let Some(start_id) = self.grammar.nt_id(start) {
            self.seed(&mut chart, start_id);
        }
        self.advance_empties(&mut chart, 0);
        self.complete_viterbi(&mut chart, 0);
        for (i, token) in tokens.iter().enumerate() {
            self.scan(&mut chart, i, token)?;
            let seeds = chart.completed_non_unit_at(i + 1).to_vec();
            self.complete(&mut chart, i + 1, seeds);
            self.predict(&mut chart, i + 1);
            self.advance_empties(&mut chart, i + 1);
            self.complete_viterbi(&mut chart, i + 1);
        }
        debug!(
            "parsed {} tokens into a chart of {} states",
            tokens.len(),
            chart.state_count()
        );
        Ok(Parse {
            grammar: self.grammar,
            chart,
            tokens: tokens.to_vec(),
            start: start.clone(),
        })
    }

    /// Whether the grammar derives `tokens` from `start`.
    pub fn recognize(&self, start: &NonTerminal, tokens: &[T]) -> bool {
        match self.parse(start, tokens) {
            Ok(parse) => parse.recognized(),
            Err(ParseError::UnexpectedToken { .. }) => false,
        }
    }

    /// The total score the grammar assigns to `tokens`: ⊕ over the inner
    /// scores of all completed start states spanning the whole input.
    pub fn parse_score(
        &self,
        start: &NonTerminal,
        tokens: &[T],
    ) -> Result<S::Score, ParseError> {
        self.parse(start, tokens).map(|parse| parse.score())
    }

    /// The total likelihood as a plain probability.
    pub fn probability(
        &self,
        start: &NonTerminal,
        tokens: &[T],
    ) -> Result<f64, ParseError> {
        self.parse(start, tokens).map(|parse| parse.probability())
    }

    /// The single best derivation and its score, if the input is derivable.
    pub fn viterbi_parse(
        &self,
        start: &NonTerminal,
        tokens: &[T],
    ) -> Result<Option<(ParseTree<T>, S::Score)>, ParseError> {
        self.parse(start, tokens).map(|parse| parse.viterbi_parse())
    }

    /// All derivation trees. May be exponentially large.
    pub fn parses(
        &self,
        start: &NonTerminal,
        tokens: &[T],
    ) -> Result<Vec<ParseTree<T>>, ParseError> {
        self.parse(start, tokens).map(|parse| parse.all_parses())
    }

    /// Creates the initial states at position 0: every rule reachable from
    /// the start symbol through the left-corner closure, with forward
    /// 1̄ ⊗ closure ⊗ rule score. This is prediction applied to a virtual
    /// item waiting for the start symbol.
    fn seed(&self, chart: &mut Chart<T, S>, start: usize) {
        let semiring = self.grammar.semiring();
        for &reached in self.grammar.left_star().nonzero_cols(start) {
            let reach_score = self.grammar.left_star().score(start, reached);
            for &rule_id in self.grammar.rules_for(reached) {
                let rule = self.grammar.rule(rule_id);
                let (id, fresh) = chart.get_or_create(State {
                    rule: rule_id,
                    rule_start: 0,
                    dot: 0,
                    position: 0,
                });
                chart.add_forward(id, semiring.times(reach_score, rule.score()));
                if fresh {
                    chart.set_inner(id, rule.score());
                    chart.set_viterbi(ViterbiScore {
                        score: rule.score(),
                        origin: None,
                        state: id,
                    });
                }
            }
        }
        debug!("seeded {} states", chart.state_count());
    }

    /// For every non-terminal B active at `position` and every rule C → δ
    /// with a non-zero closed left-corner score from B to C, adds
    /// (C → •δ, position). Forward accumulates the predictors' forward
    /// mass times the closure entry times the rule score; inner is the
    /// rule score itself. The closure covers chained prediction, so one
    /// pass over the states present at entry suffices.
    fn predict(&self, chart: &mut Chart<T, S>, position: usize) {
        let semiring = self.grammar.semiring();
        let mut created = 0;
        for (active_nt, predictors) in chart.active_nonterminals_at(position) {
            let mut forward_mass = semiring.zero();
            for &predictor in &predictors {
                forward_mass = semiring.plus(forward_mass, chart.forward(predictor));
            }
            for &reached in self.grammar.left_star().nonzero_cols(active_nt) {
                let reach_score = self.grammar.left_star().score(active_nt, reached);
                for &rule_id in self.grammar.rules_for(reached) {
                    let rule = self.grammar.rule(rule_id);
                    let (id, fresh) = chart.get_or_create(State {
                        rule: rule_id,
                        rule_start: position,
                        dot: 0,
                        position,
                    });
                    chart.add_forward(
                        id,
                        semiring.times(
                            forward_mass,
                            semiring.times(reach_score, rule.score()),
                        ),
                    );
                    if fresh {
                        chart.set_inner(id, rule.score());
                        chart.set_viterbi(ViterbiScore {
                            score: rule.score(),
                            origin: None,
                            state: id,
                        });
                        created += 1;
                    }
                }
            }
        }
        debug!("predicted {} new states at position {}", created, position);
    }

    /// Advances every state at `position` that waits for a terminal
    /// matching `token`, copying forward and inner through (scaled by the
    /// scan-probability hook when one is set). The Viterbi score of the
    /// advanced state is the pre-scan inner score times the scan
    /// probability, with the pre-scan state as back-pointer.
    fn scan(
        &self,
        chart: &mut Chart<T, S>,
        position: usize,
        token: &T,
    ) -> Result<(), ParseError> {
        let semiring = self.grammar.semiring();
        let scan_score = self.scan_probability.as_ref().and_then(|hook| {
            let p = hook(position);
            if p.is_finite() && (0.0..=1.0).contains(&p) {
                Some(semiring.from_probability(p))
            } else {
                None
            }
        });
        let mut advanced = 0;
        for id in chart.actives_on_terminal(position).to_vec() {
            let state = chart.state(id);
            let rule = self.grammar.rule(state.rule);
            let terminal = match rule.category_at(state.dot) {
                Some(Category::Terminal(t)) => t,
                _ => panic!(
                    "state indexed as active on a terminal has none: {}",
                    chart.format_state(id)
                ),
            };
            if terminal.is_empty() || !terminal.matches(token) {
                continue;
            }
            let (target, _) = chart.get_or_create(state.advanced(position + 1));
            let mut forward = chart.forward(id);
            let mut inner = chart.inner(id);
            if let Some(scan_score) = scan_score {
                forward = semiring.times(forward, scan_score);
                inner = semiring.times(inner, scan_score);
            }
            chart.set_forward(target, forward);
            chart.set_inner(target, inner);
            chart.set_viterbi(ViterbiScore {
                score: inner,
                origin: Some(id),
                state: target,
            });
            trace!("scanned into {}", chart.format_state(target));
            advanced += 1;
        }
        if advanced == 0 {
            return Err(ParseError::UnexpectedToken {
                position,
                token: format!("{:?}", token),
                expected: chart.expected_terminals(position),
            });
        }
        debug!(
            "scanned token at position {} into {} states",
            position, advanced
        );
        Ok(())
    }

    /// Advances states waiting for an empty terminal without consuming
    /// input, then completes the passives this uncovers; iterated until
    /// nothing new appears at `position`.
    fn advance_empties(&self, chart: &mut Chart<T, S>, position: usize) {
        loop {
            let mut seeds = Vec::new();
            let mut any = false;
            for id in chart.actives_on_terminal(position).to_vec() {
                let state = chart.state(id);
                let rule = self.grammar.rule(state.rule);
                let waits_on_empty = matches!(
                    rule.category_at(state.dot),
                    Some(Category::Terminal(t)) if t.is_empty()
                );
                if !waits_on_empty {
                    continue;
                }
                let (target, fresh) = chart.get_or_create(state.advanced(position));
                if !fresh {
                    continue;
                }
                let forward = chart.forward(id);
                let inner = chart.inner(id);
                chart.set_forward(target, forward);
                chart.set_inner(target, inner);
                chart.set_viterbi(ViterbiScore {
                    score: inner,
                    origin: Some(id),
                    state: target,
                });
                any = true;
                let target_state = chart.state(target);
                let target_rule = self.grammar.rule(target_state.rule);
                if target_state.dot == target_rule.len()
                    && !target_rule.is_unit_production()
                {
                    seeds.push(target);
                }
            }
            if !any {
                break;
            }
            self.complete(chart, position, seeds);
        }
    }

    /// Forward/inner completion at `position`, seeded with the completed
    /// non-unit-production states handed in. For a completer with
    /// left-hand side Y starting at j, every state active at j on some Z
    /// with a non-zero closed unit score to Y is advanced; the updates are
    /// deferred and resolved once after the worklist drains, so their
    /// order within the round cannot matter. Unit-production passives are
    /// created but never enqueued as completers: their effect is already
    /// summed by the unit closure.
    fn complete(&self, chart: &mut Chart<T, S>, position: usize, seeds: Vec<StateId>) {
        if seeds.is_empty() {
            return;
        }
        let semiring = self.grammar.semiring();
        let mut deferred = DeferredScores::new(semiring);
        let mut queue: VecDeque<StateId> = seeds.into();
        let mut processed: HashSet<StateId> = HashSet::new();
        while let Some(completed) = queue.pop_front() {
            if !processed.insert(completed) {
                continue;
            }
            trace!("completing {}", chart.format_state(completed));
            let completed_state = chart.state(completed);
            let lhs = self.lhs_id(self.grammar.rule(completed_state.rule));
            let start = completed_state.rule_start;
            for &active_nt in self.grammar.unit_star().nonzero_rows(lhs) {
                let unit_score = self.grammar.unit_star().score(active_nt, lhs);
                for id in chart.actives_on(start, active_nt).to_vec() {
                    let (target, fresh) =
                        chart.get_or_create(chart.state(id).advanced(position));

                    let unit = deferred.constant(unit_score);
                    let product = {
                        let forward = deferred.forward_of(id);
                        let inner = deferred.inner_of(completed);
                        deferred.times(forward, inner)
                    };
                    let term = deferred.times(unit, product);
                    deferred.accumulate_forward(target, chart.forward(target), term);

                    let unit = deferred.constant(unit_score);
                    let product = {
                        let inner = deferred.inner_of(id);
                        let completed_inner = deferred.inner_of(completed);
                        deferred.times(inner, completed_inner)
                    };
                    let term = deferred.times(unit, product);
                    deferred.accumulate_inner(target, chart.inner(target), term);

                    let target_state = chart.state(target);
                    let target_rule = self.grammar.rule(target_state.rule);
                    if fresh
                        && target_state.dot == target_rule.len()
                        && !target_rule.is_unit_production()
                    {
                        queue.push_back(target);
                    }
                }
            }
        }
        deferred.resolve(chart);
    }

    /// Viterbi completion at `position`: best-first relaxation over the
    /// passive states, walking direct predecessors only (unit chains stay
    /// explicit here). A state's Viterbi score and back-pointer change
    /// only for strictly better candidates, so the relaxation terminates.
    fn complete_viterbi(&self, chart: &mut Chart<T, S>, position: usize) {
        let semiring = self.grammar.semiring();
        let mut queue: PriorityQueue<StateId, Candidate<S>> = PriorityQueue::new();
        for id in chart.completed_at(position) {
            if let Some(viterbi) = chart.viterbi(id) {
                queue.push(
                    id,
                    Candidate {
                        semiring,
                        score: viterbi.score,
                    },
                );
            }
        }
        while let Some((completed, _)) = queue.pop() {
            let completed_state = chart.state(completed);
            let completed_score = chart
                .viterbi(completed)
                .expect("queued state lost its viterbi score")
                .score;
            let lhs = self.lhs_id(self.grammar.rule(completed_state.rule));
            for id in chart
                .actives_on(completed_state.rule_start, lhs)
                .to_vec()
            {
                let predecessor_score = chart
                    .viterbi(id)
                    .unwrap_or_else(|| {
                        panic!(
                            "active state has no viterbi score: {}",
                            chart.format_state(id)
                        )
                    })
                    .score;
                let (target, _) = chart.get_or_create(chart.state(id).advanced(position));
                let candidate = ViterbiScore {
                    score: semiring.times(predecessor_score, completed_score),
                    origin: Some(completed),
                    state: target,
                };
                if chart.update_viterbi(candidate) {
                    trace!(
                        "viterbi {} via {}",
                        chart.format_state(target),
                        chart.format_state(completed)
                    );
                    let target_state = chart.state(target);
                    if target_state.dot == self.grammar.rule(target_state.rule).len() {
                        queue.push(
                            target,
                            Candidate {
                                semiring,
                                score: candidate.score,
                            },
                        );
                    }
                }
            }
        }
    }

    fn lhs_id(&self, rule: &Rule<T, S>) -> usize {
        self.grammar
            .nt_id(rule.lhs())
            .expect("grammar rule mentions an uninterned non-terminal")
    }
}

/// The outcome of a parse: the completed chart plus the input it was built
/// from. All queries are read-only.
pub struct Parse<'g, T, S: Semiring> {
    grammar: &'g Grammar<T, S>,
    chart: Chart<'g, T, S>,
    tokens: Vec<T>,
    start: NonTerminal,
}

impl<'g, T, S> Parse<'g, T, S>
where
    T: Clone + fmt::Debug,
    S: Semiring,
{
    fn completed_start_states(&self) -> Vec<StateId> {
        match self.grammar.nt_id(&self.start) {
            Some(start) => {
                self.chart
                    .completed_spanning(start, 0, self.tokens.len())
            }
            None => Vec::new(),
        }
    }

    /// Whether the start symbol derives the whole input.
    pub fn recognized(&self) -> bool {
        !self.completed_start_states().is_empty()
    }

    /// ⊕ over the inner scores of all completed start states spanning the
    /// whole input; 0̄ when there is no parse.
    pub fn score(&self) -> S::Score {
        let semiring = self.grammar.semiring();
        self.completed_start_states()
            .into_iter()
            .fold(semiring.zero(), |total, id| {
                semiring.plus(total, self.chart.inner(id))
            })
    }

    pub fn probability(&self) -> f64 {
        self.grammar.semiring().to_probability(self.score())
    }

    /// The best derivation, reconstructed from the Viterbi back-pointers.
    pub fn viterbi_parse(&self) -> Option<(ParseTree<T>, S::Score)> {
        let semiring = self.grammar.semiring();
        let mut best: Option<(StateId, S::Score)> = None;
        for id in self.completed_start_states() {
            let viterbi = self.chart.viterbi(id).unwrap_or_else(|| {
                panic!(
                    "completed state has no viterbi score: {}",
                    self.chart.format_state(id)
                )
            });
            let better = match &best {
                None => true,
                Some((_, best_score)) => semiring.is_better(viterbi.score, *best_score),
            };
            if better {
                best = Some((id, viterbi.score));
            }
        }
        best.map(|(id, score)| (self.viterbi_tree(id), score))
    }

    /// Every tree deriving the whole input from the start symbol.
    pub fn all_parses(&self) -> Vec<ParseTree<T>> {
        let start = self.start.clone();
        self.trees_spanning(&start, 0, self.tokens.len())
    }

    /// Every tree rooted at `category` deriving exactly the tokens in
    /// `from..to`. Cyclic unit chains are cut rather than unrolled, so the
    /// result is finite even for cyclic grammars.
    pub fn trees_spanning(
        &self,
        category: &NonTerminal,
        from: usize,
        to: usize,
    ) -> Vec<ParseTree<T>> {
        match self.grammar.nt_id(category) {
            Some(nt) => {
                let mut in_progress = HashSet::new();
                self.trees_for(nt, from, to, &mut in_progress)
            }
            None => Vec::new(),
        }
    }

    fn trees_for(
        &self,
        nt: usize,
        from: usize,
        to: usize,
        in_progress: &mut HashSet<(usize, usize, usize)>,
    ) -> Vec<ParseTree<T>> {
        if !in_progress.insert((nt, from, to)) {
            return Vec::new();
        }
        let mut trees = Vec::new();
        for id in self.chart.completed_spanning(nt, from, to) {
            let state = self.chart.state(id);
            let rule = self.grammar.rule(state.rule);
            for children in
                self.child_sequences(state.rule, rule.len(), from, to, in_progress)
            {
                trees.push(ParseTree::node(rule.lhs().clone(), children));
            }
        }
        in_progress.remove(&(nt, from, to));
        trees
    }

    /// All ways the first `prefix` symbols of the rule can derive the
    /// tokens in `from..to`, as ordered child sequences.
    fn child_sequences(
        &self,
        rule_id: RuleId,
        prefix: usize,
        from: usize,
        to: usize,
        in_progress: &mut HashSet<(usize, usize, usize)>,
    ) -> Vec<Vec<ParseTree<T>>> {
        if prefix == 0 {
            return if from == to {
                vec![Vec::new()]
            } else {
                Vec::new()
            };
        }
        let rule = self.grammar.rule(rule_id);
        let mut sequences = Vec::new();
        match &rule.rhs()[prefix - 1] {
            Category::Terminal(terminal) if terminal.is_empty() => {
                sequences.extend(self.child_sequences(
                    rule_id,
                    prefix - 1,
                    from,
                    to,
                    in_progress,
                ));
            }
            Category::Terminal(terminal) => {
                if to > from && terminal.matches(&self.tokens[to - 1]) {
                    for mut sequence in
                        self.child_sequences(rule_id, prefix - 1, from, to - 1, in_progress)
                    {
                        sequence.push(ParseTree::leaf(
                            terminal.clone(),
                            self.tokens[to - 1].clone(),
                        ));
                        sequences.push(sequence);
                    }
                }
            }
            Category::Nonterminal(nt) => {
                let nt = self
                    .grammar
                    .nt_id(nt)
                    .expect("grammar rule mentions an uninterned non-terminal");
                for mid in from..=to {
                    let subtrees = self.trees_for(nt, mid, to, in_progress);
                    if subtrees.is_empty() {
                        continue;
                    }
                    let prefixes =
                        self.child_sequences(rule_id, prefix - 1, from, mid, in_progress);
                    for (sequence, subtree) in
                        prefixes.iter().cartesian_product(subtrees.iter())
                    {
                        let mut sequence = sequence.clone();
                        sequence.push(subtree.clone());
                        sequences.push(sequence);
                    }
                }
            }
        }
        sequences
    }

    fn viterbi_tree(&self, id: StateId) -> ParseTree<T> {
        let state = self.chart.state(id);
        let rule = self.grammar.rule(state.rule);
        ParseTree::node(rule.lhs().clone(), self.viterbi_children(id))
    }

    /// Collects the child trees for the symbols left of the dot by walking
    /// the back-pointers: the completer's sub-tree for a non-terminal, a
    /// leaf for a scanned terminal, nothing for an empty terminal.
    fn viterbi_children(&self, id: StateId) -> Vec<ParseTree<T>> {
        let mut children = Vec::new();
        let mut cursor = id;
        loop {
            let state = self.chart.state(cursor);
            if state.dot == 0 {
                break;
            }
            let rule = self.grammar.rule(state.rule);
            let viterbi = self.chart.viterbi(cursor).unwrap_or_else(|| {
                panic!(
                    "state on the best derivation has no viterbi score: {}",
                    self.chart.format_state(cursor)
                )
            });
            let origin = viterbi.origin.unwrap_or_else(|| {
                panic!(
                    "state on the best derivation has no back-pointer: {}",
                    self.chart.format_state(cursor)
                )
            });
            match &rule.rhs()[state.dot - 1] {
                Category::Terminal(terminal) => {
                    if !terminal.is_empty() {
                        children.push(ParseTree::leaf(
                            terminal.clone(),
                            self.tokens[state.position - 1].clone(),
                        ));
                    }
                    cursor = origin;
                }
                Category::Nonterminal(_) => {
                    children.push(self.viterbi_tree(origin));
                    let origin_state = self.chart.state(origin);
                    let predecessor = State {
                        rule: state.rule,
                        rule_start: state.rule_start,
                        dot: state.dot - 1,
                        position: origin_state.rule_start,
                    };
                    cursor = self.chart.find(&predecessor).unwrap_or_else(|| {
                        panic!(
                            "predecessor missing from the chart for {}",
                            self.chart.format_state(cursor)
                        )
                    });
                }
            }
        }
        children.reverse();
        children
    }
}
