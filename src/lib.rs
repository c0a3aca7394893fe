//! Probabilistic Earley parsing of token sequences against stochastic
//! context-free grammars.
//!
//! Given a grammar G with weighted rules and a start symbol S, the parser
//! computes for a finite token sequence w:
//!
//! * the total likelihood ∑_{d ∶ S ⇒_d w} Pr(d) the grammar assigns to w,
//! * the single most probable derivation (the Viterbi parse) with its
//!   score, and
//! * optionally the set of all derivation trees.
//!
//! All scores live in a configurable [`semiring`](crate::semiring): plain
//! probabilities, log-probabilities, or max-derivation scores. Grammars
//! with cyclic unit productions (A → B, B → A) are handled analytically:
//! the grammar precomputes the closures of its left-corner and
//! unit-production matrices, so prediction and completion stay finite as
//! long as the cycles' probability mass converges.
//!
//! ```
//! use pep::grammar::category::{NonTerminal, Terminal};
//! use pep::grammar::Grammar;
//! use pep::parser::Parser;
//! use pep::semiring::ProbabilitySemiring;
//!
//! let s = NonTerminal::new("S");
//! let grammar = Grammar::builder(ProbabilitySemiring)
//!     .rule(0.5, s.clone(), vec![Terminal::new("a", |t: &&str| *t == "a").into()])
//!     .rule(0.5, s.clone(), vec![
//!         NonTerminal::new("S").into(),
//!         NonTerminal::new("S").into(),
//!     ])
//!     .build()
//!     .unwrap();
//! let parser = Parser::new(&grammar);
//! assert!(parser.recognize(&s, &["a", "a"]));
//! ```

pub mod error;
pub mod grammar;
pub mod parser;
pub mod semiring;
pub mod tree;

pub use crate::error::{GrammarError, ParseError};
pub use crate::grammar::category::{Category, NonTerminal, Terminal};
pub use crate::grammar::rule::Rule;
pub use crate::grammar::{Grammar, GrammarBuilder};
pub use crate::parser::{Parse, Parser};
pub use crate::semiring::{
    LogSemiring, ProbabilitySemiring, Semiring, ViterbiSemiring,
};
pub use crate::tree::ParseTree;
