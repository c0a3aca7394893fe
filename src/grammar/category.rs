//! Grammar symbols: named non-terminals and predicate-matching terminals.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Reserved terminal name for the wildcard used by error-recovery rules.
const NON_LEXICAL_NAME: &str = "<non-lexical>";

/// Reserved terminal name for the empty word.
const EMPTY_NAME: &str = "ε";

/// A named non-terminal symbol. Equality and hashing go by name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NonTerminal {
    name: String,
}

impl NonTerminal {
    pub fn new(name: &str) -> Self {
        NonTerminal {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for NonTerminal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A terminal symbol: a name plus a predicate deciding which tokens it
/// matches. The name is the terminal's identity; two terminals with the
/// same name are the same symbol regardless of their predicates.
pub struct Terminal<T> {
    name: String,
    matcher: Rc<dyn Fn(&T) -> bool>,
    empty: bool,
}

impl<T> Terminal<T> {
    pub fn new<F>(name: &str, matcher: F) -> Self
    where
        F: Fn(&T) -> bool + 'static,
    {
        Terminal {
            name: name.to_string(),
            matcher: Rc::new(matcher),
            empty: false,
        }
    }

    /// The empty word: matches no token and is consumed without input.
    pub fn empty() -> Self {
        Terminal {
            name: EMPTY_NAME.to_string(),
            matcher: Rc::new(|_| false),
            empty: true,
        }
    }

    /// The wildcard terminal of error-recovery rules; matches any token.
    pub fn non_lexical() -> Self {
        Terminal {
            name: NON_LEXICAL_NAME.to_string(),
            matcher: Rc::new(|_| true),
            empty: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, token: &T) -> bool {
        (self.matcher)(token)
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn is_non_lexical(&self) -> bool {
        self.name == NON_LEXICAL_NAME
    }
}

impl<T> Clone for Terminal<T> {
    fn clone(&self) -> Self {
        Terminal {
            name: self.name.clone(),
            matcher: Rc::clone(&self.matcher),
            empty: self.empty,
        }
    }
}

impl<T> fmt::Debug for Terminal<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Terminal({})", self.name)
    }
}

impl<T> fmt::Display for Terminal<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl<T> PartialEq for Terminal<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl<T> Eq for Terminal<T> {}

impl<T> Hash for Terminal<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// A grammar symbol; the right-hand side of a rule is a sequence of these.
pub enum Category<T> {
    Nonterminal(NonTerminal),
    Terminal(Terminal<T>),
}

impl<T> Category<T> {
    pub fn nonterminal(name: &str) -> Self {
        Category::Nonterminal(NonTerminal::new(name))
    }

    /// The distinguished wildcard marking error-recovery rules.
    pub fn non_lexical() -> Self {
        Category::Terminal(Terminal::non_lexical())
    }

    pub fn as_nonterminal(&self) -> Option<&NonTerminal> {
        match self {
            Category::Nonterminal(nt) => Some(nt),
            Category::Terminal(_) => None,
        }
    }

    pub fn as_terminal(&self) -> Option<&Terminal<T>> {
        match self {
            Category::Nonterminal(_) => None,
            Category::Terminal(t) => Some(t),
        }
    }
}

impl<T> Clone for Category<T> {
    fn clone(&self) -> Self {
        match self {
            Category::Nonterminal(nt) => Category::Nonterminal(nt.clone()),
            Category::Terminal(t) => Category::Terminal(t.clone()),
        }
    }
}

impl<T> fmt::Debug for Category<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Category::Nonterminal(nt) => write!(f, "Nonterminal({})", nt),
            Category::Terminal(t) => write!(f, "{:?}", t),
        }
    }
}

impl<T> fmt::Display for Category<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Category::Nonterminal(nt) => write!(f, "{}", nt),
            Category::Terminal(t) => write!(f, "{}", t),
        }
    }
}

impl<T> PartialEq for Category<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Category::Nonterminal(a), Category::Nonterminal(b)) => a == b,
            (Category::Terminal(a), Category::Terminal(b)) => a == b,
            _ => false,
        }
    }
}

impl<T> Eq for Category<T> {}

impl<T> Hash for Category<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Category::Nonterminal(nt) => {
                0u8.hash(state);
                nt.hash(state);
            }
            Category::Terminal(t) => {
                1u8.hash(state);
                t.hash(state);
            }
        }
    }
}

impl<T> From<NonTerminal> for Category<T> {
    fn from(nt: NonTerminal) -> Self {
        Category::Nonterminal(nt)
    }
}

impl<T> From<Terminal<T>> for Category<T> {
    fn from(t: Terminal<T>) -> Self {
        Category::Terminal(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_identity_is_its_name() {
        let a: Terminal<char> = Terminal::new("a", |c| *c == 'a');
        let a_again: Terminal<char> = Terminal::new("a", |c| *c == 'b');
        let b: Terminal<char> = Terminal::new("b", |c| *c == 'b');
        assert_eq!(a, a_again);
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_terminal_matches_nothing() {
        let eps: Terminal<char> = Terminal::empty();
        assert!(eps.is_empty());
        assert!(!eps.matches(&'a'));
    }

    #[test]
    fn test_non_lexical_matches_anything() {
        let any: Terminal<&str> = Terminal::non_lexical();
        assert!(any.is_non_lexical());
        assert!(any.matches(&"whatever"));
    }

    #[test]
    fn test_category_equality() {
        let x: Category<char> = Category::nonterminal("X");
        let x_again: Category<char> = Category::nonterminal("X");
        let t: Category<char> = Terminal::new("X", |_| true).into();
        assert_eq!(x, x_again);
        assert_ne!(x, t);
    }
}
