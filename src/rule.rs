//! Rule records and canonical clause selection.
//!
//! A rule groups the clauses of one `;`-terminated database record. Exactly one of them, the
//! canonical clause, becomes the rewrite target of all the others.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::clause::{Clause, ClauseError, ClauseId, ClauseSpec};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Maximize,
    Minimize,
}

impl Direction {
    /// Only the sign of `direction` is significant; positive maximizes.
    pub fn from_sign(direction: i32) -> Self {
        if direction > 0 {
            Self::Maximize
        } else {
            Self::Minimize
        }
    }

    /// Metric assigned to clauses without a usable one. It loses against every real number.
    pub fn missing_metric(self) -> f64 {
        match self {
            Self::Maximize => f64::NEG_INFINITY,
            Self::Minimize => f64::INFINITY,
        }
    }

    /// Whether `candidate` strictly beats `best`. Ties keep the incumbent.
    pub fn prefers(self, candidate: f64, best: f64) -> bool {
        match self {
            Self::Maximize => candidate > best,
            Self::Minimize => candidate < best,
        }
    }
}

/// The finalized clauses of one rule record.
#[derive(Clone, Debug, Default)]
pub struct Rule {
    clauses: Vec<Clause>,
    /// Record position of each kept clause.
    positions: Vec<usize>,
    dropped: Vec<(usize, ClauseError)>,
}

impl Rule {
    pub fn from_specs(specs: &[ClauseSpec], direction: Direction) -> Self {
        let mut rule = Self::default();

        for (position, spec) in specs.iter().enumerate() {
            match Clause::from_spec(spec, direction) {
                Ok(clause) => {
                    rule.clauses.push(clause);
                    rule.positions.push(position);
                }
                Err(err) => {
                    warn!(
                        clause = %spec.raw_tokens.join(" "),
                        "dropping clause: {err}"
                    );
                    rule.dropped.push((position, err));
                }
            }
        }

        rule
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Record position of every kept clause, parallel to [`Rule::clauses`].
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn dropped(&self) -> &[(usize, ClauseError)] {
        &self.dropped
    }

    pub fn into_clauses(self) -> Vec<Clause> {
        self.clauses
    }
}

/// Picks the canonical clause and points every other clause at it.
///
/// `first_id` is the arena id the first clause of `clauses` will receive; ids are assumed to be
/// contiguous. Returns the canonical id, or `None` for an empty rule.
pub fn select_canonical(
    clauses: &mut [Clause],
    first_id: ClauseId,
    direction: Direction,
) -> Option<ClauseId> {
    let mut best = 0;
    for (index, clause) in clauses.iter().enumerate().skip(1) {
        if direction.prefers(clause.metric(), clauses[best].metric()) {
            best = index;
        }
    }

    let canonical = first_id + best;
    for (index, clause) in clauses.iter_mut().enumerate() {
        clause.set_replacement((index != best).then_some(canonical));
    }

    (!clauses.is_empty()).then_some(canonical)
}
