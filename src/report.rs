//! Formatting of load reports and execution outcomes: pretty tables, CSV and one-line
//! summaries for the terminal.

use std::collections::BTreeMap;

use colored::Colorize;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use thiserror::Error;

use crate::graph::{ExecuteError, Execution, StopReason};
use crate::loader::{ClauseEntry, LoadReport};
use crate::token::{Token, Tokens, VariableId};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("unable to write CSV")]
    Csv(#[from] csv::Error),
    #[error("CSV output is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Rows that can be rendered both as a table and as CSV.
pub trait Formattable: Tabled {
    fn csv_headers() -> Vec<&'static str>;

    fn to_csv_row(&self) -> Vec<String>;
}

/// Pretty table formatter using the tabled library
pub struct PrettyFormatter;

impl PrettyFormatter {
    pub fn format<T: Formattable>(items: &[T]) -> String {
        if items.is_empty() {
            return String::new();
        }

        let mut table = Table::new(items);
        table.with(Style::rounded());

        table.to_string()
    }
}

pub struct CsvFormatter;

impl CsvFormatter {
    pub fn format<T: Formattable>(items: &[T]) -> Result<String, ReportError> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        writer.write_record(T::csv_headers())?;
        for item in items {
            writer.write_record(item.to_csv_row())?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|err| csv::Error::from(err.into_error()))?;
        Ok(String::from_utf8(bytes)?)
    }
}

fn optional_cell<T: ToString>(value: Option<T>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

impl Formattable for ClauseEntry {
    fn csv_headers() -> Vec<&'static str> {
        vec!["Rule", "Position", "Id", "Pattern", "Metric", "Replacement", "Status"]
    }

    fn to_csv_row(&self) -> Vec<String> {
        vec![
            self.rule.to_string(),
            self.position.to_string(),
            optional_cell(self.id),
            self.pattern.clone(),
            optional_cell(self.metric),
            optional_cell(self.replacement),
            self.status.to_string(),
        ]
    }
}

fn format_stop_reason(reason: &StopReason) -> String {
    reason.to_string()
}

/// Result of rewriting one input, in a form that can be printed or serialized.
#[derive(Clone, Debug, PartialEq, Serialize, Tabled)]
pub struct Outcome {
    #[tabled(rename = "Input")]
    pub input: Tokens,
    #[tabled(rename = "Output")]
    pub output: Tokens,
    #[tabled(rename = "Passes")]
    pub passes: usize,
    #[tabled(rename = "Rewrites")]
    pub rewrites: usize,
    #[tabled(rename = "Stop Reason", display_with = "format_stop_reason")]
    pub stop_reason: StopReason,
    #[tabled(skip)]
    pub bindings: BTreeMap<VariableId, Token>,
}

impl Outcome {
    /// `reinsert` replaces bound variables in the output with the tokens they captured.
    pub fn new(input: Tokens, result: &Result<Execution, ExecuteError>, reinsert: bool) -> Self {
        let execution = match result {
            Ok(execution) => execution,
            Err(err) => err.partial(),
        };

        Self {
            input,
            output: if reinsert {
                execution.reinserted()
            } else {
                execution.tokens.clone()
            },
            passes: execution.passes,
            rewrites: execution.rewrites,
            stop_reason: execution.stop_reason,
            bindings: execution.bindings.clone(),
        }
    }

    pub fn converged(&self) -> bool {
        self.stop_reason == StopReason::Fixpoint
    }
}

impl Formattable for Outcome {
    fn csv_headers() -> Vec<&'static str> {
        vec!["Input", "Output", "Passes", "Rewrites", "Stop Reason"]
    }

    fn to_csv_row(&self) -> Vec<String> {
        vec![
            self.input.to_string(),
            self.output.to_string(),
            self.passes.to_string(),
            self.rewrites.to_string(),
            self.stop_reason.to_string(),
        ]
    }
}

/// One line describing how the database loaded.
pub fn load_summary(report: &LoadReport) -> String {
    let rejected = report.rejected();
    let rejected = if rejected > 0 {
        format!("{rejected} rejected").red().bold()
    } else {
        format!("{rejected} rejected").normal()
    };

    format!(
        "{} rules, {} clauses: {}, {}",
        report.rules,
        report.entries.len(),
        format!("{} active", report.active()).green(),
        rejected
    )
}

/// One line describing an outcome that did not reach a fixpoint.
pub fn divergence_warning(outcome: &Outcome) -> String {
    format!(
        "{} `{}` stopped after {} passes and {} rewrites ({})",
        "warning:".yellow().bold(),
        outcome.input,
        outcome.passes,
        outcome.rewrites,
        outcome.stop_reason
    )
}
