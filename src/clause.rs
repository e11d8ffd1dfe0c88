//! Clauses: one candidate pattern of a rule.

use std::collections::HashMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rule::Direction;
use crate::token::{MalformedVariable, Token, Tokens, VariableId};

/// Index of a clause in the arena owned by a [`Graph`](crate::graph::Graph).
pub type ClauseId = usize;

/// One clause as produced by the rule database scanner, before finalization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClauseSpec {
    pub raw_tokens: Vec<String>,
    pub metric: Option<f64>,
}

impl ClauseSpec {
    pub fn new(raw_tokens: Vec<String>, metric: Option<f64>) -> Self {
        Self { raw_tokens, metric }
    }

    /// Splits an (already unescaped) clause body on whitespace.
    pub fn from_body(body: &str, metric: Option<f64>) -> Self {
        Self::new(
            body.split_whitespace().map(str::to_string).collect(),
            metric,
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClauseError {
    #[error("malformed variable reference at position {position}")]
    MalformedVariable {
        position: usize,
        #[source]
        source: MalformedVariable,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Clause {
    content: Tokens,
    metric: f64,
    replacement: Option<ClauseId>,
    internal_variables: Vec<Option<VariableId>>,
}

/// Input tokens bound to each internal variable of a pattern.
pub type Captures<'t> = HashMap<VariableId, &'t Token>;

impl Clause {
    /// Finalizes raw strings into a clause. Either every position is classified or the
    /// whole clause is rejected.
    pub fn from_raw<S: AsRef<str>>(raw: &[S], metric: f64) -> Result<Self, ClauseError> {
        let content: Tokens = raw
            .iter()
            .enumerate()
            .map(|(position, raw)| {
                Token::parse(raw.as_ref())
                    .map_err(|source| ClauseError::MalformedVariable { position, source })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self::from_tokens(content, metric))
    }

    pub fn from_tokens(content: Tokens, metric: f64) -> Self {
        let internal_variables = content.iter().map(Token::internal_variable).collect();

        Self {
            content,
            metric,
            replacement: None,
            internal_variables,
        }
    }

    /// A missing metric is replaced by the sentinel that always loses under `direction`.
    pub fn from_spec(spec: &ClauseSpec, direction: Direction) -> Result<Self, ClauseError> {
        Self::from_raw(
            spec.raw_tokens.as_slice(),
            spec.metric.unwrap_or(direction.missing_metric()),
        )
    }

    pub fn with_replacement(mut self, replacement: Option<ClauseId>) -> Self {
        self.replacement = replacement;
        self
    }

    pub(crate) fn set_replacement(&mut self, replacement: Option<ClauseId>) {
        self.replacement = replacement;
    }

    pub fn content(&self) -> &Tokens {
        &self.content
    }

    pub fn metric(&self) -> f64 {
        self.metric
    }

    pub fn replacement(&self) -> Option<ClauseId> {
        self.replacement
    }

    /// Canonical clauses are rewrite targets and never rewrite themselves.
    pub fn is_canonical(&self) -> bool {
        self.replacement.is_none()
    }

    pub fn internal_variables(&self) -> &[Option<VariableId>] {
        &self.internal_variables
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Binds the internal variables of this pattern against `span`. A variable occurring
    /// several times must capture the same token text every time.
    pub fn capture<'t>(&self, span: &'t [Token]) -> Option<Captures<'t>> {
        if span.len() != self.len() {
            return None;
        }

        let mut captures = Captures::new();
        for ((pattern, variable), token) in self
            .content
            .iter()
            .zip_eq(&self.internal_variables)
            .zip_eq(span)
        {
            if !pattern.matches(token) {
                return None;
            }

            if let Some(variable) = variable {
                match captures.get(variable) {
                    Some(bound) if bound.text() != token.text() => return None,
                    Some(_) => {}
                    None => {
                        captures.insert(*variable, token);
                    }
                }
            }
        }

        Some(captures)
    }
}
