//! The rule graph: an arena of clauses plus a trie over their patterns.
//!
//! Every clause with a replacement contributes one root-to-node path to the trie, keyed by
//! its tokens (all variable positions share a single edge). The terminating node remembers the
//! clause, and [`Graph::execute`] rewrites input by walking these paths.
//!
//! # Circular rules
//!
//! [`Graph::insert`] refuses a clause whose own replacement would immediately match the
//! clause's pattern again, since such a rule never reaches a fixpoint. The check only looks at
//! that one hop. Cycles spanning several rules (`a -> b` in one rule, `b -> a` in a later one)
//! are accepted and must be caught by [`ExecutionConfig`] limits.

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::clause::{Clause, ClauseId};
use crate::rule::{Direction, select_canonical};
use crate::token::{Tokens, VariableId};

pub mod execute;
pub mod node;

pub use execute::{ExecuteError, Execution, ExecutionConfig, StopReason, VariableCounter};
pub use node::{Edge, Node};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InsertError {
    #[error("clause {0} does not exist")]
    UnknownClause(ClauseId),
    #[error("clause {0} has an empty pattern")]
    EmptyPattern(ClauseId),
    #[error("clause {id} (`{pattern}`) would rewrite back into itself")]
    CircularRule { id: ClauseId, pattern: String },
}

/// How a clause ended up in the trie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    /// Canonical clause: its path exists but it rewrites nothing.
    Terminal,
    Rewrite,
    /// The pattern was already attached to another clause, which no longer fires.
    Replaced { previous: ClauseId },
}

/// Outcome of [`Graph::add_rule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleInsertion {
    pub canonical: Option<ClauseId>,
    pub results: Vec<(ClauseId, Result<Inserted, InsertError>)>,
}

#[derive(Clone, Debug, Default)]
pub struct Graph {
    clauses: Vec<Clause>,
    root: Node,
    max_external: Option<VariableId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `clause` in the arena without touching the trie.
    pub fn add_clause(&mut self, clause: Clause) -> ClauseId {
        let id = self.clauses.len();
        self.max_external = self
            .max_external
            .max(clause.content().max_external_variable());
        self.clauses.push(clause);
        id
    }

    /// Selects the canonical clause of one rule, then stores and inserts every clause in
    /// record order.
    pub fn add_rule(&mut self, mut clauses: Vec<Clause>, direction: Direction) -> RuleInsertion {
        let canonical = select_canonical(&mut clauses, self.clauses.len(), direction);

        let ids: Vec<ClauseId> = clauses
            .into_iter()
            .map(|clause| self.add_clause(clause))
            .collect();

        let results = ids.into_iter().map(|id| (id, self.insert(id))).collect();

        RuleInsertion { canonical, results }
    }

    pub fn clause(&self, id: ClauseId) -> Option<&Clause> {
        self.clauses.get(id)
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn node_count(&self) -> usize {
        self.root.size()
    }

    /// Adds the pattern of an arena clause to the trie.
    ///
    /// A rejected clause leaves the graph exactly as it was.
    pub fn insert(&mut self, id: ClauseId) -> Result<Inserted, InsertError> {
        let clause = self.clauses.get(id).ok_or(InsertError::UnknownClause(id))?;

        // An empty canonical clause is a valid target: rewriting into it deletes tokens
        if let Some(target) = clause.replacement() {
            if clause.is_empty() {
                return Err(InsertError::EmptyPattern(id));
            }
            if target >= self.clauses.len() {
                return Err(InsertError::UnknownClause(target));
            }

            if self.is_circular(id) {
                warn!(id, pattern = %clause.content(), "rejecting circular rule");
                return Err(InsertError::CircularRule {
                    id,
                    pattern: clause.content().to_string(),
                });
            }
        }

        debug!(id, pattern = %clause.content(), "inserting clause");
        Ok(self.attach(id))
    }

    /// Whether the replacement of clause `id` contains a match of the clause's own pattern.
    pub fn is_circular(&self, id: ClauseId) -> bool {
        let Some(clause) = self.clauses.get(id) else {
            return false;
        };
        let Some(target) = clause.replacement().and_then(|target| self.clauses.get(target))
        else {
            return false;
        };

        Self::single_pattern(clause).probe(target.content())
    }

    /// A throwaway graph holding only `pattern`, mapped to an inert empty replacement.
    fn single_pattern(pattern: &Clause) -> Self {
        let mut graph = Self::new();
        let inert = graph.add_clause(Clause::from_tokens(Tokens::new(), 0.0));
        let id = graph.add_clause(
            Clause::from_tokens(pattern.content().clone(), pattern.metric())
                .with_replacement(Some(inert)),
        );
        graph.attach(id);
        graph
    }

    fn attach(&mut self, id: ClauseId) -> Inserted {
        let clause = &self.clauses[id];

        let mut node = &mut self.root;
        for token in clause.content() {
            let edge = Edge::of(token);
            let step = node.child_or_insert(edge);
            if step.is_new() {
                trace!(%edge, "created trie node");
            }
            node = step.any();
        }

        if clause.is_canonical() {
            return Inserted::Terminal;
        }

        match node.attach(id) {
            None => Inserted::Rewrite,
            Some(previous) => {
                warn!(
                    id,
                    previous,
                    pattern = %clause.content(),
                    "pattern already had a rewrite, keeping the latest"
                );
                Inserted::Replaced { previous }
            }
        }
    }
}
