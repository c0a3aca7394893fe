//! Parse trees recovered from the chart.

use crate::grammar::category::{NonTerminal, Terminal};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A derivation tree: interior nodes carry the non-terminal of the applied
/// rule, leaves carry a terminal and the token it consumed. Equality and
/// hashing are structural (category plus ordered children); parent links
/// are not stored.
pub enum ParseTree<T> {
    Leaf { terminal: Terminal<T>, token: T },
    Node {
        category: NonTerminal,
        children: Vec<ParseTree<T>>,
    },
}

impl<T> ParseTree<T> {
    pub fn leaf(terminal: Terminal<T>, token: T) -> Self {
        ParseTree::Leaf { terminal, token }
    }

    pub fn node(category: NonTerminal, children: Vec<ParseTree<T>>) -> Self {
        ParseTree::Node { category, children }
    }

    /// The non-terminal at the root, if this is an interior node.
    pub fn category(&self) -> Option<&NonTerminal> {
        match self {
            ParseTree::Node { category, .. } => Some(category),
            ParseTree::Leaf { .. } => None,
        }
    }

    pub fn children(&self) -> &[ParseTree<T>] {
        match self {
            ParseTree::Node { children, .. } => children,
            ParseTree::Leaf { .. } => &[],
        }
    }

    /// The tokens at the leaves, left to right.
    pub fn yield_tokens(&self) -> Vec<&T> {
        match self {
            ParseTree::Leaf { token, .. } => vec![token],
            ParseTree::Node { children, .. } => {
                children.iter().flat_map(|c| c.yield_tokens()).collect()
            }
        }
    }
}

impl<T: Clone> Clone for ParseTree<T> {
    fn clone(&self) -> Self {
        match self {
            ParseTree::Leaf { terminal, token } => ParseTree::Leaf {
                terminal: terminal.clone(),
                token: token.clone(),
            },
            ParseTree::Node { category, children } => ParseTree::Node {
                category: category.clone(),
                children: children.clone(),
            },
        }
    }
}

impl<T: PartialEq> PartialEq for ParseTree<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                ParseTree::Leaf { terminal, token },
                ParseTree::Leaf {
                    terminal: other_terminal,
                    token: other_token,
                },
            ) => terminal == other_terminal && token == other_token,
            (
                ParseTree::Node { category, children },
                ParseTree::Node {
                    category: other_category,
                    children: other_children,
                },
            ) => category == other_category && children == other_children,
            _ => false,
        }
    }
}

impl<T: Eq> Eq for ParseTree<T> {}

impl<T: Hash> Hash for ParseTree<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ParseTree::Leaf { terminal, token } => {
                0u8.hash(state);
                terminal.hash(state);
                token.hash(state);
            }
            ParseTree::Node { category, children } => {
                1u8.hash(state);
                category.hash(state);
                children.hash(state);
            }
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ParseTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseTree::Leaf { terminal, token } => {
                write!(f, "Leaf({}, {:?})", terminal, token)
            }
            ParseTree::Node { category, children } => {
                write!(f, "Node({}, {:?})", category, children)
            }
        }
    }
}

impl<T: fmt::Display> fmt::Display for ParseTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseTree::Leaf { token, .. } => write!(f, "{}", token),
            ParseTree::Node { category, children } => {
                write!(f, "{}", category)?;
                if !children.is_empty() {
                    write!(f, "( ")?;
                    for (i, child) in children.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", child)?;
                    }
                    write!(f, " )")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, token: &'static str) -> ParseTree<&'static str> {
        ParseTree::leaf(Terminal::new(name, move |t: &&str| *t == token), token)
    }

    #[test]
    fn test_structural_equality() {
        let a = ParseTree::node(NonTerminal::new("S"), vec![leaf("a", "a")]);
        let b = ParseTree::node(NonTerminal::new("S"), vec![leaf("a", "a")]);
        assert_eq!(a, b);

        let other_category =
            ParseTree::node(NonTerminal::new("T"), vec![leaf("a", "a")]);
        assert_ne!(a, other_category);

        let other_children = ParseTree::node(
            NonTerminal::new("S"),
            vec![leaf("a", "a"), leaf("a", "a")],
        );
        assert_ne!(a, other_children);

        let reordered = ParseTree::node(
            NonTerminal::new("S"),
            vec![leaf("b", "b"), leaf("a", "a")],
        );
        let ordered = ParseTree::node(
            NonTerminal::new("S"),
            vec![leaf("a", "a"), leaf("b", "b")],
        );
        assert_ne!(ordered, reordered);
    }

    #[test]
    fn test_yield_is_left_to_right() {
        let tree = ParseTree::node(
            NonTerminal::new("S"),
            vec![
                ParseTree::node(NonTerminal::new("A"), vec![leaf("a", "a")]),
                leaf("b", "b"),
            ],
        );
        assert_eq!(tree.yield_tokens(), vec![&"a", &"b"]);
    }

    #[test]
    fn test_display_is_nested() {
        let tree = ParseTree::node(
            NonTerminal::new("S"),
            vec![
                ParseTree::node(NonTerminal::new("A"), vec![leaf("a", "a")]),
                leaf("b", "b"),
            ],
        );
        assert_eq!(tree.to_string(), "S( A( a ), b )");
    }
}
