//! Building a [`Graph`] from scanned rule records.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use tabled::Tabled;
use tracing::info;

use crate::clause::ClauseId;
use crate::config::EngineConfig;
use crate::database::{DatabaseError, RuleRecord, parse_database, read_database_files};
use crate::graph::{Graph, InsertError, Inserted};
use crate::rule::Rule;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum ClauseStatus {
    /// Target of its rule
    Canonical,
    Rewrite,
    /// Took over a pattern previously attached to another clause
    Overrides(ClauseId),
    /// Its pattern was taken over by a later clause
    Shadowed(ClauseId),
    Circular,
    EmptyPattern,
    Malformed(String),
    Rejected(String),
}

impl ClauseStatus {
    /// Whether the clause can fire during execution.
    pub fn is_active(&self) -> bool {
        matches!(self, ClauseStatus::Rewrite | ClauseStatus::Overrides(_))
    }

    /// Whether the clause was refused outright.
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            ClauseStatus::Circular
                | ClauseStatus::EmptyPattern
                | ClauseStatus::Malformed(_)
                | ClauseStatus::Rejected(_)
        )
    }
}

impl fmt::Display for ClauseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClauseStatus::Canonical => write!(f, "canonical"),
            ClauseStatus::Rewrite => write!(f, "rewrite"),
            ClauseStatus::Overrides(previous) => write!(f, "overrides {previous}"),
            ClauseStatus::Shadowed(by) => write!(f, "shadowed by {by}"),
            ClauseStatus::Circular => write!(f, "circular"),
            ClauseStatus::EmptyPattern => write!(f, "empty pattern"),
            ClauseStatus::Malformed(reason) => write!(f, "malformed: {reason}"),
            ClauseStatus::Rejected(reason) => write!(f, "rejected: {reason}"),
        }
    }
}

impl From<&Result<Inserted, InsertError>> for ClauseStatus {
    fn from(result: &Result<Inserted, InsertError>) -> Self {
        match result {
            Ok(Inserted::Terminal) => ClauseStatus::Canonical,
            Ok(Inserted::Rewrite) => ClauseStatus::Rewrite,
            Ok(Inserted::Replaced { previous }) => ClauseStatus::Overrides(*previous),
            Err(InsertError::CircularRule { .. }) => ClauseStatus::Circular,
            Err(InsertError::EmptyPattern(_)) => ClauseStatus::EmptyPattern,
            Err(err @ InsertError::UnknownClause(_)) => ClauseStatus::Rejected(err.to_string()),
        }
    }
}

fn format_optional<T: fmt::Display>(value: &Option<T>) -> String {
    value.as_ref().map_or_else(|| String::from("-"), ToString::to_string)
}

/// What happened to one clause of the database.
#[derive(Clone, Debug, PartialEq, Serialize, Tabled)]
pub struct ClauseEntry {
    /// Index of the rule record
    #[tabled(rename = "Rule")]
    pub rule: usize,
    /// Position within the rule record
    #[tabled(skip)]
    pub position: usize,
    /// Arena id, absent for clauses that never made it into the graph
    #[tabled(rename = "Id", display_with = "format_optional")]
    pub id: Option<ClauseId>,
    #[tabled(rename = "Pattern")]
    pub pattern: String,
    #[tabled(rename = "Metric", display_with = "format_optional")]
    pub metric: Option<f64>,
    #[tabled(rename = "Replacement", display_with = "format_optional")]
    pub replacement: Option<ClauseId>,
    #[tabled(rename = "Status")]
    pub status: ClauseStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LoadReport {
    pub rules: usize,
    pub entries: Vec<ClauseEntry>,
}

impl LoadReport {
    pub fn active(&self) -> usize {
        self.entries.iter().filter(|entry| entry.status.is_active()).count()
    }

    pub fn rejected(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.status.is_rejected())
            .count()
    }

    fn entry_mut(&mut self, id: ClauseId) -> Option<&mut ClauseEntry> {
        self.entries.iter_mut().find(|entry| entry.id == Some(id))
    }
}

/// Inserts every record, in order, into a fresh graph.
pub fn build_graph(records: &[RuleRecord], config: &EngineConfig) -> (Graph, LoadReport) {
    let direction = config.direction();
    let mut graph = Graph::new();
    let mut report = LoadReport {
        rules: records.len(),
        entries: Vec::new(),
    };

    for (index, record) in records.iter().enumerate() {
        let rule = Rule::from_specs(record, direction);
        let start = report.entries.len();

        for (position, err) in rule.dropped() {
            report.entries.push(ClauseEntry {
                rule: index,
                position: *position,
                pattern: record[*position].raw_tokens.join(" "),
                metric: record[*position].metric,
                id: None,
                replacement: None,
                status: ClauseStatus::Malformed(err.to_string()),
            });
        }

        let positions = rule.positions().to_vec();
        let insertion = graph.add_rule(rule.into_clauses(), direction);

        for ((id, result), position) in insertion.results.iter().zip(positions) {
            let status = ClauseStatus::from(result);
            if let ClauseStatus::Overrides(previous) = status {
                if let Some(entry) = report.entry_mut(previous) {
                    entry.status = ClauseStatus::Shadowed(*id);
                }
            }

            let clause = &graph.clauses()[*id];
            report.entries.push(ClauseEntry {
                rule: index,
                position,
                pattern: clause.content().to_string(),
                metric: record[position].metric,
                id: Some(*id),
                replacement: clause.replacement(),
                status,
            });
        }

        report.entries[start..].sort_by_key(|entry| entry.position);
    }

    info!(
        rules = report.rules,
        clauses = graph.clauses().len(),
        nodes = graph.node_count(),
        rejected = report.rejected(),
        "loaded rule graph"
    );

    (graph, report)
}

pub fn load_str(text: &str, config: &EngineConfig) -> Result<(Graph, LoadReport), DatabaseError> {
    let records = parse_database(text, config.metric_column)?;
    Ok(build_graph(&records, config))
}

pub fn load_files<P: AsRef<Path>>(
    paths: &[P],
    config: &EngineConfig,
) -> Result<(Graph, LoadReport), DatabaseError> {
    let records = read_database_files(paths, config.metric_column)?;
    Ok(build_graph(&records, config))
}

#[cfg(test)]
mod tests {
    use super::{ClauseStatus, load_str};
    use crate::config::EngineConfig;
    use crate::token::Tokens;

    fn run(text: &str, config: &EngineConfig, input: &str) -> Vec<String> {
        let (graph, _) = load_str(text, config).unwrap();
        graph
            .execute(Tokens::from_input(input), &config.execution())
            .unwrap()
            .tokens
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn end_to_end() {
        let config = EngineConfig::default();
        let (graph, report) = load_str(r#""a b" ~1 = "x y" ~2 ;"#, &config).unwrap();

        assert_eq!(report.entries[0].status, ClauseStatus::Canonical);
        assert_eq!(report.entries[1].replacement, Some(0));

        let result = graph
            .execute(Tokens::from_input("x y"), &config.execution())
            .unwrap();
        assert_eq!(result.tokens.texts(), ["a", "b"]);
    }

    #[test]
    fn canonical_chosen_by_metric_not_order() {
        let text = r#""x y" ~2 = "a b" ~1 ;"#;
        let config = EngineConfig::default();
        let (_, report) = load_str(text, &config).unwrap();

        let metrics: Vec<_> = report.entries.iter().map(|entry| entry.metric).collect();
        assert_eq!(metrics, [Some(2.0), Some(1.0)]);
        assert_eq!(report.entries[1].status, ClauseStatus::Canonical);

        assert_eq!(run(text, &config, "x y"), ["a", "b"]);
        assert_eq!(run(text, &config, "a b"), ["a", "b"]);
    }

    #[test]
    fn semicolons_separate_rules() {
        // Two single-clause rules: nothing rewrites
        let config = EngineConfig::default();
        let (_, report) = load_str(r#""a b" ~1=; "x y" ~2=;"#, &config).unwrap();

        assert_eq!(report.rules, 2);
        assert!(
            report
                .entries
                .iter()
                .all(|entry| entry.status == ClauseStatus::Canonical)
        );
        assert_eq!(run(r#""a b" ~1=; "x y" ~2=;"#, &config, "x y"), ["x", "y"]);
    }

    #[test]
    fn direction_and_column() {
        let text = r#""small" ~1:9 = "big" ~5:0 ;"#;

        let maximize = EngineConfig {
            direction: 1,
            ..EngineConfig::default()
        };
        assert_eq!(run(text, &maximize, "small"), ["big"]);

        let second_column = EngineConfig {
            metric_column: 1,
            ..EngineConfig::default()
        };
        assert_eq!(run(text, &second_column, "small"), ["big"]);
        assert_eq!(run(text, &EngineConfig::default(), "big"), ["small"]);
    }

    #[test]
    fn empty_canonical_clause_deletes() {
        let text = r#""" ~1 = "noise" ~2 ;"#;
        let config = EngineConfig::default();
        let (_, report) = load_str(text, &config).unwrap();

        let statuses: Vec<_> = report.entries.iter().map(|entry| &entry.status).collect();
        assert_eq!(statuses, [&ClauseStatus::Canonical, &ClauseStatus::Rewrite]);
        assert_eq!(report.rejected(), 0);

        assert_eq!(run(text, &config, "a noise b"), ["a", "b"]);
    }

    #[test]
    fn rejected_clauses_are_reported() {
        let text = r##"
            "a b c" ~1 = "a b c" ~2 ;
            "x" ~1 = "#y" ~2 = "y" ~3 ;
            "p" ~1 = "q" ~2 ;
            "r" ~1 = "q" ~2 ;
        "##;
        let (graph, report) = load_str(text, &EngineConfig::default()).unwrap();

        let statuses: Vec<_> = report.entries.iter().map(|entry| &entry.status).collect();
        assert_eq!(statuses[0], &ClauseStatus::Canonical);
        assert_eq!(statuses[1], &ClauseStatus::Circular);
        assert_eq!(statuses[2], &ClauseStatus::Canonical);
        assert!(matches!(statuses[3], ClauseStatus::Malformed(_)));
        assert_eq!(statuses[4], &ClauseStatus::Rewrite);
        assert_eq!(statuses[6], &ClauseStatus::Shadowed(7));
        assert_eq!(statuses[8], &ClauseStatus::Overrides(5));

        assert_eq!(report.rejected(), 2);
        assert_eq!(report.active(), 2);

        let result = graph
            .execute(Tokens::from_input("q"), &EngineConfig::default().execution())
            .unwrap();
        assert_eq!(result.tokens.texts(), ["r"]);
    }
}
