//! Scanner for rule database text.
//!
//! A database is a sequence of quoted clauses. Clauses accumulate into a rule until a `;`
//! outside quotes closes it:
//!
//! ```text
//! "#1 * 2" ~3:1 = "#1 + #1" ~1:1 = "#1 << 1" ~1:2 ;
//! ```
//!
//! Inside quotes `\x` stands for `x`. A clause may be followed, on the same line, by a
//! metric annotation `~f0:f1:...`, of which one column is used. Text outside quotes is
//! ignored.

use std::fs;
use std::path::{Path, PathBuf};

use pest::Parser;
use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest_derive::Parser;
use thiserror::Error;
use tracing::{debug, warn};

use crate::clause::ClauseSpec;

#[derive(Parser)]
#[grammar = "database/database.pest"]
struct DatabaseParser;

/// The clauses of one `;`-terminated rule, in record order.
pub type RuleRecord = Vec<ClauseSpec>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("{origin}:{line}:{column}: {message}")]
    Syntax {
        origin: String,
        line: usize,
        column: usize,
        message: String,
    },
    #[error("unable to read rule database {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Scans database text that did not come from a file.
pub fn parse_database(text: &str, metric_column: usize) -> Result<Vec<RuleRecord>, DatabaseError> {
    parse_with(text, metric_column, |line| (String::from("<input>"), line))
}

/// Reads and scans several database files as one text, each file followed by a newline.
///
/// Rules may therefore continue from one file into the next.
pub fn read_database_files<P: AsRef<Path>>(
    paths: &[P],
    metric_column: usize,
) -> Result<Vec<RuleRecord>, DatabaseError> {
    let mut text = String::new();
    // First line of each file within `text`
    let mut segments: Vec<(String, usize)> = Vec::with_capacity(paths.len());

    for path in paths {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| DatabaseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = contents.len(), "read rule database");

        let first_line = text.lines().count() + 1;
        segments.push((path.display().to_string(), first_line));
        text.push_str(&contents);
        text.push('\n');
    }

    parse_with(&text, metric_column, |line| {
        segments
            .iter()
            .rev()
            .find(|(_, first_line)| *first_line <= line)
            .map_or((String::from("<input>"), line), |(origin, first_line)| {
                (origin.clone(), line - first_line + 1)
            })
    })
}

/// Scans `text`, resolving error lines to their source with `locate`.
fn parse_with(
    text: &str,
    metric_column: usize,
    locate: impl Fn(usize) -> (String, usize),
) -> Result<Vec<RuleRecord>, DatabaseError> {
    let mut database = DatabaseParser::parse(Rule::database, text).map_err(|err| {
        let (line, column) = match err.line_col {
            LineColLocation::Pos(position) | LineColLocation::Span(position, _) => position,
        };
        let (origin, line) = locate(line);
        DatabaseError::Syntax {
            origin,
            line,
            column,
            message: String::from("unterminated clause or unexpected character"),
        }
    })?;

    let mut records = Vec::new();
    let mut pending = RuleRecord::new();

    let Some(database) = database.next() else {
        return Ok(records);
    };

    for pair in database.into_inner() {
        match pair.as_rule() {
            Rule::clause => pending.push(clause(pair, metric_column)),
            Rule::rule_end => {
                if !pending.is_empty() {
                    records.push(std::mem::take(&mut pending));
                }
            }
            _ => {}
        }
    }

    if !pending.is_empty() {
        warn!(
            clauses = pending.len(),
            "dropping clauses after the last `;`"
        );
    }

    debug!(rules = records.len(), "scanned rule database");
    Ok(records)
}

fn clause(pair: Pair<'_, Rule>, metric_column: usize) -> ClauseSpec {
    let mut body = String::new();
    let mut metric = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::body => body = unescape(inner.as_str()),
            Rule::metric => {
                metric = inner
                    .into_inner()
                    .next()
                    .and_then(|fields| parse_metric(fields.as_str(), metric_column));
            }
            _ => {}
        }
    }

    ClauseSpec::from_body(&body, metric)
}

fn unescape(body: &str) -> String {
    let mut unescaped = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => unescaped.extend(chars.next()),
            c => unescaped.push(c),
        }
    }
    unescaped
}

/// Column `column` of a `:`-separated metric annotation, if it is a number.
pub fn parse_metric(fields: &str, column: usize) -> Option<f64> {
    fields.split(':').nth(column)?.trim().parse().ok()
}
