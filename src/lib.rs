//! A declarative rewrite-rule engine.
//!
//! Rules come from a textual database of quoted clauses. Within each rule the clause with the
//! best metric becomes canonical and every other clause rewrites into it. All patterns are
//! kept in one trie, and [`Graph::execute`](graph::Graph::execute) rewrites token sequences
//! until no pattern matches anymore.

#[cfg(test)]
#[macro_use]
mod macros;

pub mod clause;
pub mod config;
pub mod database;
pub mod graph;
pub mod loader;
pub mod report;
pub mod rule;
mod seen;
pub mod token;
