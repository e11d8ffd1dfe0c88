use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use rulegraph::config::EngineConfig;
use rulegraph::graph::Graph;
use rulegraph::loader::{LoadReport, load_files};
use rulegraph::report::{self, CsvFormatter, Outcome, PrettyFormatter};
use rulegraph::token::Tokens;

/// Pass limit used when neither the config nor the command line sets one.
const DEFAULT_MAX_PASSES: usize = 10_000;

#[derive(Parser)]
#[command(name = "rulegraph", version, about = "Rewrite token sequences with a rule database")]
struct Cli {
    /// Log rule loading and every rewrite
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rewrite INPUT, or every line of stdin, to a fixpoint
    Rewrite(RewriteArgs),
    /// List the clauses of the database and how they were loaded
    Rules(RulesArgs),
}

#[derive(Args)]
struct DatabaseArgs {
    /// Rule database file, may be repeated
    #[arg(short, long = "database", required = true)]
    databases: Vec<PathBuf>,
    /// JSON engine configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Positive keeps the clause with the highest metric, otherwise the lowest
    #[arg(long, allow_negative_numbers = true)]
    direction: Option<i32>,
    /// Metric annotation column
    #[arg(long)]
    metric: Option<usize>,
}

impl DatabaseArgs {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };

        if let Some(direction) = self.direction {
            config.direction = direction;
        }
        if let Some(metric) = self.metric {
            config.metric_column = metric;
        }

        Ok(config)
    }

    fn load(&self, config: &EngineConfig) -> Result<(Graph, LoadReport)> {
        load_files(&self.databases, config).context("failed to load rule database")
    }
}

#[derive(Args)]
struct RewriteArgs {
    #[command(flatten)]
    database: DatabaseArgs,
    #[arg(long)]
    max_passes: Option<usize>,
    #[arg(long)]
    max_rewrites: Option<usize>,
    /// Replace rewritten variables with the tokens they captured
    #[arg(long)]
    reinsert: bool,
    /// Print outcomes as JSON, including variable bindings
    #[arg(long, conflicts_with = "table")]
    json: bool,
    /// Print outcomes as a table
    #[arg(long)]
    table: bool,
    /// Whitespace-separated tokens; stdin is read line by line when absent
    input: Option<String>,
}

#[derive(Args)]
struct RulesArgs {
    #[command(flatten)]
    database: DatabaseArgs,
    #[arg(long, conflicts_with = "json")]
    csv: bool,
    #[arg(long)]
    json: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn read_inputs(input: Option<String>) -> Result<Vec<Tokens>> {
    let text = match input {
        Some(input) => input,
        None => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("failed to read input from stdin")?;
            text
        }
    };

    Ok(text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(Tokens::from_input)
        .collect())
}

fn rewrite(args: RewriteArgs) -> Result<ExitCode> {
    let mut config = args.database.engine_config()?;
    if args.max_passes.is_some() {
        config.max_passes = args.max_passes;
    }
    if args.max_rewrites.is_some() {
        config.max_rewrites = args.max_rewrites;
    }
    config.max_passes = config.max_passes.or(Some(DEFAULT_MAX_PASSES));

    let (graph, load) = args.database.load(&config)?;
    debug!("{}", report::load_summary(&load));

    let inputs = read_inputs(args.input)?;
    let results = graph.execute_all(inputs.clone(), &config.execution());
    let outcomes: Vec<Outcome> = inputs
        .into_iter()
        .zip(&results)
        .map(|(input, result)| Outcome::new(input, result, args.reinsert))
        .collect();

    if args.json {
        let json = serde_json::to_string_pretty(&outcomes).context("failed to serialize outcomes")?;
        println!("{json}");
    } else if args.table {
        println!("{}", PrettyFormatter::format(&outcomes));
    } else {
        for outcome in &outcomes {
            println!("{}", outcome.output);
        }
    }

    let diverged: Vec<&Outcome> = outcomes.iter().filter(|outcome| !outcome.converged()).collect();
    for outcome in &diverged {
        eprintln!("{}", report::divergence_warning(outcome));
    }

    Ok(if diverged.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn rules(args: RulesArgs) -> Result<ExitCode> {
    let config = args.database.engine_config()?;
    let (_, load) = args.database.load(&config)?;

    if args.json {
        let json = serde_json::to_string_pretty(&load).context("failed to serialize load report")?;
        println!("{json}");
    } else if args.csv {
        print!("{}", CsvFormatter::format(&load.entries)?);
    } else {
        println!("{}", PrettyFormatter::format(&load.entries));
        println!("{}", report::load_summary(&load));
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Rewrite(args) => rewrite(args),
        Command::Rules(args) => rules(args),
    }
}
