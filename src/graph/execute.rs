//! Fixpoint execution of a [`Graph`] over token sequences.
//!
//! Each pass scans the sequence left to right. At every cursor the trie is followed as far
//! as the input allows, then the deepest node carrying a usable rewrite wins, so the longest
//! pattern always takes priority. Passes repeat from the start until one of them makes no
//! rewrite.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use itertools::Itertools;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::clause::{Captures, ClauseId};
use crate::token::{Token, Tokens, VariableId};

use super::Graph;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_passes: Option<usize>,
    pub max_rewrites: Option<usize>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    Fixpoint,
    MaxPasses,
    MaxRewrites,
    /// Every external variable id has been handed out
    VariablesExhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::Fixpoint => "fixpoint",
            StopReason::MaxPasses => "pass limit reached",
            StopReason::MaxRewrites => "rewrite limit reached",
            StopReason::VariablesExhausted => "variable ids exhausted",
        })
    }
}

/// Source of fresh external variable ids. Each execution owns one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableCounter {
    /// `None` once `VariableId::MAX` has been handed out
    next: Option<VariableId>,
}

impl Default for VariableCounter {
    fn default() -> Self {
        Self::starting_at(0)
    }
}

impl VariableCounter {
    pub fn starting_at(next: VariableId) -> Self {
        Self { next: Some(next) }
    }

    /// A counter whose ids are all greater than `max`.
    pub fn after(max: Option<VariableId>) -> Self {
        Self {
            next: max.map_or(Some(0), |id| id.checked_add(1)),
        }
    }

    pub fn fresh(&mut self) -> Option<VariableId> {
        let id = self.next?;
        self.next = id.checked_add(1);
        Some(id)
    }

    pub fn peek(&self) -> Option<VariableId> {
        self.next
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Execution {
    pub tokens: Tokens,
    /// Input token captured for each fresh external variable.
    pub bindings: BTreeMap<VariableId, Token>,
    pub passes: usize,
    pub rewrites: usize,
    pub stop_reason: StopReason,
    /// Counter state after the last rewrite, for chaining executions.
    pub counter: VariableCounter,
}

impl Execution {
    /// The rewritten tokens with every bound external variable replaced by its capture.
    pub fn reinserted(&self) -> Tokens {
        self.tokens
            .iter()
            .map(|token| {
                token
                    .external_variable()
                    .and_then(|id| self.bindings.get(&id))
                    .unwrap_or(token)
                    .clone()
            })
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error(
        "rewriting did not converge: {} after {} passes and {} rewrites",
        .execution.stop_reason,
        .execution.passes,
        .execution.rewrites
    )]
    NoConvergence { execution: Box<Execution> },
    #[error(
        "ran out of fresh variable ids after {} rewrites",
        .execution.rewrites
    )]
    VariablesExhausted { execution: Box<Execution> },
}

impl ExecuteError {
    /// The sequence as it stood when execution stopped.
    pub fn partial(&self) -> &Execution {
        match self {
            ExecuteError::NoConvergence { execution }
            | ExecuteError::VariablesExhausted { execution } => execution,
        }
    }
}

struct Match<'t> {
    /// Number of input tokens the pattern spans.
    depth: usize,
    pattern: ClauseId,
    target: ClauseId,
    captures: Captures<'t>,
}

/// Checked before every pass. A fixpoint is only confirmed by a pass without rewrites, so
/// that pass counts against the limit too.
fn pass_limit_reached(execution: &Execution, config: &ExecutionConfig) -> bool {
    config
        .max_passes
        .is_some_and(|limit| execution.passes >= limit)
}

/// Checked before every rewrite.
fn rewrite_limit_reached(execution: &Execution, config: &ExecutionConfig) -> bool {
    config
        .max_rewrites
        .is_some_and(|limit| execution.rewrites >= limit)
}

impl Graph {
    /// Rewrites `tokens` to a fixpoint.
    ///
    /// Fresh variable ids start above every external id already present in the input or in
    /// the graph's clauses.
    pub fn execute(
        &self,
        tokens: Tokens,
        config: &ExecutionConfig,
    ) -> Result<Execution, ExecuteError> {
        let max = self.max_external.max(tokens.max_external_variable());

        self.execute_with(tokens, config, VariableCounter::after(max))
    }

    /// Like [`Graph::execute`] but continues from a caller-provided counter.
    pub fn execute_with(
        &self,
        tokens: Tokens,
        config: &ExecutionConfig,
        counter: VariableCounter,
    ) -> Result<Execution, ExecuteError> {
        let execution = self.run(tokens, config, counter);
        match execution.stop_reason {
            StopReason::Fixpoint => Ok(execution),
            StopReason::VariablesExhausted => Err(ExecuteError::VariablesExhausted {
                execution: Box::new(execution),
            }),
            StopReason::MaxPasses | StopReason::MaxRewrites => Err(ExecuteError::NoConvergence {
                execution: Box::new(execution),
            }),
        }
    }

    /// Executes independent inputs in parallel. The trie is only read, and every input gets
    /// its own counter.
    pub fn execute_all(
        &self,
        inputs: Vec<Tokens>,
        config: &ExecutionConfig,
    ) -> Vec<Result<Execution, ExecuteError>> {
        inputs
            .into_par_iter()
            .map(|tokens| self.execute(tokens, config))
            .collect()
    }

    /// Whether at least one rewrite would fire anywhere in `tokens`.
    pub fn probe(&self, tokens: &Tokens) -> bool {
        (0..tokens.len()).any(|cursor| self.find_match(tokens, cursor).is_some())
    }

    fn run(&self, tokens: Tokens, config: &ExecutionConfig, counter: VariableCounter) -> Execution {
        let mut execution = Execution {
            tokens,
            bindings: BTreeMap::new(),
            passes: 0,
            rewrites: 0,
            stop_reason: StopReason::Fixpoint,
            counter,
        };

        loop {
            if pass_limit_reached(&execution, config) {
                debug!(passes = execution.passes, "stopping execution at pass limit");
                execution.stop_reason = StopReason::MaxPasses;
                return execution;
            }

            execution.passes += 1;
            let mut modified = false;
            let mut cursor = 0;

            while cursor < execution.tokens.len() {
                let Some(found) = self.find_match(&execution.tokens, cursor) else {
                    cursor += 1;
                    continue;
                };

                if rewrite_limit_reached(&execution, config) {
                    debug!(rewrites = execution.rewrites, "stopping execution at rewrite limit");
                    execution.stop_reason = StopReason::MaxRewrites;
                    return execution;
                }

                let Some(fragment) =
                    self.substitute(&found, &mut execution.counter, &mut execution.bindings)
                else {
                    debug!(cursor, "stopping execution, no fresh variable ids left");
                    execution.stop_reason = StopReason::VariablesExhausted;
                    return execution;
                };
                debug!(
                    cursor,
                    pattern = found.pattern,
                    target = found.target,
                    "rewriting {} tokens into {}",
                    found.depth,
                    fragment.len()
                );

                let end = cursor + found.depth;
                let length = fragment.len();
                execution.tokens.splice(cursor..end, fragment);

                cursor += length;
                execution.rewrites += 1;
                modified = true;
            }

            if !modified {
                return execution;
            }
        }
    }

    fn find_match<'t>(&self, tokens: &'t Tokens, start: usize) -> Option<Match<'t>> {
        // Forward: follow the trie as deep as the input allows
        let mut path = vec![&self.root];
        let mut node = &self.root;
        for token in &tokens[start..tokens.len()] {
            let Some(next) = node.step(token) else {
                break;
            };
            path.push(next);
            node = next;
        }

        trace!(start, depth = path.len() - 1, "forward match");

        // Backward: the deepest node with a rewrite whose variables bind consistently
        path.iter().enumerate().rev().find_map(|(depth, node)| {
            let pattern = node.replacement()?;
            let clause = &self.clauses[pattern];
            let target = clause.replacement()?;
            let captures = clause.capture(&tokens[start..start + depth])?;

            Some(Match {
                depth,
                pattern,
                target,
                captures,
            })
        })
    }

    /// Builds the replacement fragment. `None` if the counter runs out, in which case
    /// `bindings` is left untouched.
    fn substitute(
        &self,
        found: &Match<'_>,
        counter: &mut VariableCounter,
        bindings: &mut BTreeMap<VariableId, Token>,
    ) -> Option<Vec<Token>> {
        let target = &self.clauses[found.target];
        let mut renamed: HashMap<VariableId, VariableId> = HashMap::new();
        let mut bound = Vec::new();
        let mut fragment = Vec::with_capacity(target.len());

        for (token, variable) in target
            .content()
            .iter()
            .zip_eq(target.internal_variables())
        {
            let Some(variable) = variable else {
                fragment.push(token.clone());
                continue;
            };

            let fresh = match renamed.get(variable) {
                Some(fresh) => *fresh,
                None => {
                    let fresh = counter.fresh()?;
                    renamed.insert(*variable, fresh);

                    if let Some(&captured) = found.captures.get(variable) {
                        // Capturing an earlier fresh variable binds to what it stood for
                        let token = captured
                            .external_variable()
                            .and_then(|id| bindings.get(&id))
                            .unwrap_or(captured)
                            .clone();
                        bound.push((fresh, token));
                    }

                    fresh
                }
            };

            fragment.push(
                Token::external(fresh).with_type_tag(token.type_tag().map(str::to_string)),
            );
        }

        bindings.extend(bound);
        Some(fragment)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::{ExecuteError, ExecutionConfig, StopReason, VariableCounter};
    use crate::graph::Graph;
    use crate::token::{Token, TokenKind, Tokens};

    fn run(graph: &Graph, input: &str) -> Tokens {
        graph
            .execute(Tokens::from_input(input), &ExecutionConfig::default())
            .unwrap()
            .tokens
    }

    #[test]
    fn longest_match_priority() {
        let graph = graph!(-1;
            ["X" ~ 1, "a" ~ 2],
            ["Y" ~ 1, "a b" ~ 2],
        );

        assert_eq!(run(&graph, "a b").texts(), ["Y"]);
        assert_eq!(run(&graph, "a c").texts(), ["X", "c"]);
        assert_eq!(run(&graph, "a").texts(), ["X"]);
    }

    #[test]
    fn deepest_node_with_rewrite_wins() {
        // `a b c` has no rewrite, so `a b` applies and `c` is left alone
        let graph = graph!(-1;
            ["Y" ~ 1, "a b" ~ 2],
            ["Z" ~ 1, "a b c d" ~ 2],
        );

        assert_eq!(run(&graph, "a b c").texts(), ["Y", "c"]);
        assert_eq!(run(&graph, "a b c d").texts(), ["Z"]);
    }

    #[test]
    fn chained_rules_reach_fixpoint() {
        let graph = graph!(-1;
            ["b" ~ 1, "a" ~ 2],
            ["c" ~ 1, "b" ~ 2],
        );

        let execution = graph
            .execute(Tokens::from_input("a x a"), &ExecutionConfig::default())
            .unwrap();

        assert_eq!(execution.tokens.texts(), ["c", "x", "c"]);
        assert_eq!(execution.rewrites, 4);
        // a -> b, b -> c, then one clean pass
        assert_eq!(execution.passes, 3);
        assert_eq!(execution.stop_reason, StopReason::Fixpoint);
    }

    #[test]
    fn rewrite_enables_earlier_match_on_next_pass() {
        let graph = graph!(-1;
            ["done" ~ 1, "p q" ~ 2],
            ["q" ~ 1, "r" ~ 2],
        );

        assert_eq!(run(&graph, "p r").texts(), ["done"]);
    }

    #[test]
    fn wildcard_matching() {
        let graph = graph!(-1;
            ["B" ~ 1, "#1 b" ~ 2],
        );

        assert_eq!(run(&graph, "z b").texts(), ["B"]);
        assert_eq!(run(&graph, "q b").texts(), ["B"]);
        assert_eq!(run(&graph, "q c").texts(), ["q", "c"]);
    }

    #[test]
    fn variable_capture_and_renaming() {
        let graph = graph!(-1;
            ["twice #1 #1" ~ 1, "#1 + #1" ~ 2],
        );

        let execution = graph
            .execute(Tokens::from_input("x + x ; y + y"), &ExecutionConfig::default())
            .unwrap();

        let tokens = &execution.tokens;
        assert_eq!(tokens.len(), 7);
        assert_eq!(tokens[0].text(), "twice");

        // Same fresh id within one substitution, a different one for the second site
        assert_eq!(tokens[1], tokens[2]);
        assert_eq!(tokens[5], tokens[6]);
        assert_ne!(tokens[1], tokens[5]);
        assert!(matches!(tokens[1].kind(), TokenKind::ExternalVar(_)));

        let first = tokens[1].external_variable().unwrap();
        let second = tokens[5].external_variable().unwrap();
        assert_eq!(execution.bindings[&first], Token::literal("x"));
        assert_eq!(execution.bindings[&second], Token::literal("y"));

        assert_eq!(
            execution.reinserted().texts(),
            ["twice", "x", "x", ";", "twice", "y", "y"]
        );
    }

    #[test]
    fn inconsistent_capture_does_not_match() {
        let graph = graph!(-1;
            ["twice #1" ~ 1, "#1 + #1" ~ 2],
        );

        assert_eq!(run(&graph, "x + y").texts(), ["x", "+", "y"]);
    }

    #[test]
    fn fresh_ids_avoid_input_variables() {
        let graph = graph!(-1;
            ["neg #1" ~ 1, "0 - #1" ~ 2],
        );

        let execution = graph
            .execute(Tokens::from_input("0 - $7"), &ExecutionConfig::default())
            .unwrap();

        assert_eq!(execution.tokens.texts(), ["neg", "$8"]);
        assert_eq!(execution.bindings[&8], Token::external(7));
        assert_eq!(execution.counter.peek(), Some(9));
    }

    #[test]
    fn bindings_follow_earlier_renames() {
        let graph = graph!(-1;
            ["box #1" ~ 1, "wrap #1" ~ 2],
            ["crate #1" ~ 1, "box #1" ~ 2],
        );

        let execution = graph
            .execute(Tokens::from_input("wrap v"), &ExecutionConfig::default())
            .unwrap();

        assert_eq!(execution.tokens.texts(), ["crate", "$1"]);
        assert_eq!(execution.bindings[&0], Token::literal("v"));
        assert_eq!(execution.bindings[&1], Token::literal("v"));
        assert_eq!(execution.reinserted().texts(), ["crate", "v"]);
    }

    #[test]
    fn threaded_counter() {
        let graph = graph!(-1;
            ["f #1" ~ 1, "g #1" ~ 2],
        );

        let execution = graph
            .execute_with(
                Tokens::from_input("g a"),
                &ExecutionConfig::default(),
                VariableCounter::starting_at(100),
            )
            .unwrap();

        assert_eq!(execution.tokens.texts(), ["f", "$100"]);
        assert_eq!(execution.counter.peek(), Some(101));
    }

    #[test]
    fn counter_exhaustion() {
        let mut counter = VariableCounter::starting_at(u64::MAX - 1);
        assert_eq!(counter.fresh(), Some(u64::MAX - 1));
        assert_eq!(counter.fresh(), Some(u64::MAX));
        assert_eq!(counter.fresh(), None);
        assert_eq!(counter.peek(), None);

        assert_eq!(VariableCounter::after(None).peek(), Some(0));
        assert_eq!(VariableCounter::after(Some(u64::MAX)).peek(), None);
    }

    #[test]
    fn largest_input_variable_does_not_overflow() {
        let graph = graph!(-1;
            ["f #1" ~ 1, "g #1" ~ 2],
            ["b" ~ 1, "a" ~ 2],
        );
        let input = format!("g ${}", u64::MAX);

        let err = graph
            .execute(Tokens::from_input(&input), &ExecutionConfig::default())
            .unwrap_err();
        assert!(matches!(err, ExecuteError::VariablesExhausted { .. }));
        assert_eq!(err.partial().stop_reason, StopReason::VariablesExhausted);
        assert_eq!(err.partial().tokens, Tokens::from_input(&input));
        assert!(err.partial().bindings.is_empty());

        // Rewrites that need no fresh ids still work
        let last = format!("${}", u64::MAX);
        let execution = graph
            .execute(Tokens::from_input(&format!("a {last}")), &ExecutionConfig::default())
            .unwrap();
        assert_eq!(execution.tokens.texts(), ["b", last.as_str()]);
    }

    #[test]
    fn pass_limit_reports_no_convergence() {
        let graph = graph!(1;
            ["a" ~ 1, "b" ~ 2],
            ["a" ~ 2, "b" ~ 1],
        );

        let config = ExecutionConfig {
            max_passes: Some(5),
            max_rewrites: None,
        };
        let ExecuteError::NoConvergence { execution } = graph
            .execute(Tokens::from_input("a"), &config)
            .unwrap_err()
        else {
            panic!("expected the pass limit to stop execution");
        };

        assert_eq!(execution.stop_reason, StopReason::MaxPasses);
        assert_eq!(execution.passes, 5);
        assert_eq!(execution.rewrites, 5);
    }

    #[test]
    fn rewrite_limit_reports_no_convergence() {
        let graph = graph!(-1;
            ["b" ~ 1, "a" ~ 2],
        );

        let config = ExecutionConfig {
            max_passes: None,
            max_rewrites: Some(2),
        };
        let err = graph
            .execute(Tokens::from_input("a a a"), &config)
            .unwrap_err();

        assert_eq!(err.partial().stop_reason, StopReason::MaxRewrites);
        assert_eq!(err.partial().tokens.texts(), ["b", "b", "a"]);

        // Enough headroom converges normally
        let config = ExecutionConfig {
            max_passes: None,
            max_rewrites: Some(3),
        };
        assert!(graph.execute(Tokens::from_input("a a a"), &config).is_ok());
    }

    #[test]
    fn probe_does_not_modify() {
        let graph = graph!(-1;
            ["b" ~ 1, "a" ~ 2],
        );

        let input = Tokens::from_input("x a");
        assert!(graph.probe(&input));
        assert_eq!(input.texts(), ["x", "a"]);
        assert!(!graph.probe(&Tokens::from_input("x b")));
    }

    #[test]
    fn execute_all_in_parallel() {
        let graph = graph!(-1;
            ["f #1" ~ 1, "g #1" ~ 2],
        );

        let inputs = vec![Tokens::from_input("g a"), Tokens::from_input("g b")];
        let results = graph.execute_all(inputs, &ExecutionConfig::default());

        // Independent counters: both start from zero
        for result in results {
            assert_eq!(result.unwrap().tokens.texts(), ["f", "$0"]);
        }
    }

    #[test]
    fn fixpoint_idempotence() {
        // Every rule shortens its input, so execution always terminates
        let graph = graph!(-1;
            ["a" ~ 1, "a a" ~ 2],
            ["c" ~ 1, "b c" ~ 2],
            ["b" ~ 1, "c a b" ~ 2],
            ["#1" ~ 1, "( #1 )" ~ 2],
        );

        let alphabet = ["a", "b", "c", "(", ")"];
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let config = ExecutionConfig::default();

        for _ in 0..200 {
            let length = rng.gen_range(0..24);
            let input: Tokens = (0..length)
                .map(|_| Token::literal(alphabet[rng.gen_range(0..alphabet.len())]))
                .collect();

            let once = graph.execute(input, &config).unwrap();
            assert!(!graph.probe(&once.tokens));

            let twice = graph.execute(once.tokens.clone(), &config).unwrap();
            assert_eq!(twice.tokens, once.tokens);
            assert_eq!(twice.rewrites, 0);
        }
    }
}
