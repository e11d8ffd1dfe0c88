use std::collections::HashMap;
use std::fmt;

use crate::clause::ClauseId;
use crate::seen::Seen;
use crate::token::{Token, TokenKind};

/// Label of a trie edge: the literal text of a pattern position, or the single edge shared by
/// every variable position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Edge<'t> {
    Literal(&'t str),
    Variable,
}

impl<'t> Edge<'t> {
    pub fn of(token: &'t Token) -> Self {
        match token.kind() {
            TokenKind::Literal => Edge::Literal(token.text()),
            TokenKind::InternalVar(_) | TokenKind::ExternalVar(_) | TokenKind::Wildcard => {
                Edge::Variable
            }
        }
    }
}

impl fmt::Display for Edge<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Literal(text) => f.write_str(text),
            Edge::Variable => f.write_str("#"),
        }
    }
}

/// A trie node. Owns its children exclusively; nodes are never removed.
#[derive(Clone, Debug, Default)]
pub struct Node {
    literals: HashMap<String, Node>,
    variable: Option<Box<Node>>,
    /// Pattern clause whose content ends at this node.
    replacement: Option<ClauseId>,
}

impl Node {
    pub fn child(&self, edge: Edge<'_>) -> Option<&Node> {
        match edge {
            Edge::Literal(text) => self.literals.get(text),
            Edge::Variable => self.variable.as_deref(),
        }
    }

    /// Follows `input` one level down: an exact literal edge wins over the variable edge.
    pub fn step(&self, input: &Token) -> Option<&Node> {
        self.literals
            .get(input.text())
            .or(self.variable.as_deref())
    }

    pub(crate) fn child_or_insert(&mut self, edge: Edge<'_>) -> Seen<&mut Node> {
        match edge {
            Edge::Literal(text) => {
                let is_new = !self.literals.contains_key(text);
                let child = self.literals.entry(text.to_string()).or_default();
                if is_new {
                    Seen::New(child)
                } else {
                    Seen::Old(child)
                }
            }
            Edge::Variable => {
                let is_new = self.variable.is_none();
                let child = self.variable.get_or_insert_with(Box::default).as_mut();
                if is_new {
                    Seen::New(child)
                } else {
                    Seen::Old(child)
                }
            }
        }
    }

    pub fn replacement(&self) -> Option<ClauseId> {
        self.replacement
    }

    /// Attaches a pattern clause, returning the one it displaced.
    pub(crate) fn attach(&mut self, clause: ClauseId) -> Option<ClauseId> {
        self.replacement.replace(clause)
    }

    pub fn is_leaf(&self) -> bool {
        self.literals.is_empty() && self.variable.is_none()
    }

    pub fn children(&self) -> impl Iterator<Item = (Edge<'_>, &Node)> {
        self.literals
            .iter()
            .map(|(text, node)| (Edge::Literal(text), node))
            .chain(self.variable.as_deref().map(|node| (Edge::Variable, node)))
    }

    /// Number of nodes in this subtree, this one included.
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children().map(|(_, child)| child));
        }
        count
    }
}
