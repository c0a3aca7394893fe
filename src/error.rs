//! Error types for grammar construction and parsing.

use std::error::Error;
use std::fmt;

/// Raised synchronously while building a [`Grammar`](crate::grammar::Grammar).
#[derive(Debug, Clone, PartialEq)]
pub enum GrammarError {
    /// The grammar is malformed: an empty right-hand side, or a rule
    /// probability that is not a finite value in [0, 1].
    Illegal(String),
    /// A closure over the rule probabilities diverges, e.g. a cycle of
    /// unit productions whose total probability mass reaches 1.
    NotConvergent(String),
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GrammarError::Illegal(msg) => write!(f, "illegal grammar: {}", msg),
            GrammarError::NotConvergent(msg) => {
                write!(f, "grammar not convergent: {}", msg)
            }
        }
    }
}

impl Error for GrammarError {}

/// A parse that could not consume its input. This is an expected outcome,
/// not a bug; chart inconsistencies and similar internal violations panic
/// instead.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// No active state could be advanced over the token at `position`
    /// (0-based index into the input). `expected` lists the names of the
    /// terminals that were live at that position.
    UnexpectedToken {
        position: usize,
        token: String,
        expected: Vec<String>,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::UnexpectedToken {
                position,
                token,
                expected,
            } => write!(
                f,
                "unexpected token {} at position {}, expected one of [{}]",
                token,
                position,
                expected.join(", ")
            ),
        }
    }
}

impl Error for ParseError {}
