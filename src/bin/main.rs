//! crosstab CLI - Build pivot tables and samples from CSV data
//!
//! Usage:
//!   crosstab ingest <file.csv> [--table <name>] [--overwrite] [--delimiter <c>]
//!   crosstab freq --table <name> --row <var>... [--col-pct]
//!   crosstab crosstab --table <name> --row <var>... --col <var>... [--pct row|col|total]
//!   crosstab sample --table <name> --measure <field> [--group <field>=<value>]
//!
//! Examples:
//!   crosstab ingest data/olympics.csv
//!   crosstab crosstab --table olympics --row country --row gender --col sport --totals --pct row
//!   crosstab sample --table olympics --measure height --group sport=Badminton
//!
//! Output is JSON on stdout. Set CROSSTAB_LOG (or RUST_LOG) for logs on stderr.

use clap::{Args, Parser, Subcommand, ValueEnum};
use crosstab::config::Settings;
use crosstab::crosstab::{CrossTab, Measure, Strategy};
use crosstab::db::{InternalDb, Materialized, SourceArgs, Value};
use crosstab::dims::{Axis, DimSpec, Metric, Sort};
use crosstab::labels::VarLabels;
use crosstab::samples::SampleExtractor;
use crosstab::sql::{EngineRegistry, ValFilterSpec, ValSpec};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "crosstab")]
#[command(about = "crosstab - Pivot tables, frequency tables and samples over CSV data")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to crosstab.toml, $CROSSTAB_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a CSV file into the internal database
    Ingest {
        /// Path to the CSV file
        file: PathBuf,

        /// Table name (derived from the file name if not specified)
        #[arg(short, long)]
        table: Option<String>,

        /// Replace an existing table of the same name
        #[arg(long)]
        overwrite: bool,

        /// Field delimiter (defaults to the configured one)
        #[arg(short, long)]
        delimiter: Option<char>,
    },

    /// Frequency table over row dimensions
    Freq {
        #[command(flatten)]
        table: TableArgs,

        /// Include each row's share of the whole table
        #[arg(long)]
        col_pct: bool,
    },

    /// Cross-tabulate row dimensions against column dimensions
    Crosstab {
        #[command(flatten)]
        table: TableArgs,

        /// Column variable; repeat to nest
        #[arg(short, long = "col")]
        cols: Vec<String>,

        /// Percentage metric to compute; repeatable
        #[arg(long)]
        pct: Vec<PctArg>,

        /// Sum this field instead of counting rows
        #[arg(long)]
        sum: Option<String>,

        /// Cell query strategy (defaults to the configured one)
        #[arg(long)]
        strategy: Option<StrategyArg>,
    },

    /// Extract a null-free numeric sample
    Sample {
        /// Table in the internal database
        #[arg(short, long)]
        table: String,

        /// Measure field
        #[arg(short, long)]
        measure: String,

        /// Restrict to one group, as field=value
        #[arg(short, long)]
        group: Option<String>,

        /// Raw filter clause applied to the query
        #[arg(long)]
        filter: Option<String>,
    },
}

#[derive(Args)]
struct TableArgs {
    /// Table in the internal database
    #[arg(short, long)]
    table: String,

    /// Row variable; repeat to nest
    #[arg(short, long = "row", required = true)]
    rows: Vec<String>,

    /// Append a Total entry at every level
    #[arg(long)]
    totals: bool,

    /// Value ordering at every level
    #[arg(long, default_value = "value")]
    sort: SortArg,

    /// JSON file with variable and value labels
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Raw filter clause applied to every query
    #[arg(long)]
    filter: Option<String>,
}

#[derive(Clone, ValueEnum)]
enum PctArg {
    Row,
    Col,
    Total,
}

impl From<PctArg> for Metric {
    fn from(arg: PctArg) -> Self {
        match arg {
            PctArg::Row => Metric::RowPct,
            PctArg::Col => Metric::ColPct,
            PctArg::Total => Metric::TotalPct,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum SortArg {
    Value,
    Label,
    Frequency,
}

impl From<SortArg> for Sort {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Value => Sort::Value,
            SortArg::Label => Sort::Label,
            SortArg::Frequency => Sort::Frequency,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum StrategyArg {
    PerCell,
    PerRow,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::PerCell => Strategy::PerCell,
            StrategyArg::PerRow => Strategy::PerRow,
        }
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env("CROSSTAB_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Everything a subcommand needs from the settings.
struct Context {
    settings: Settings,
    db: InternalDb,
    registry: EngineRegistry,
}

impl Context {
    fn load(config: Option<PathBuf>) -> crosstab::Result<Self> {
        let settings = match config {
            Some(path) => Settings::from_file(path)?,
            None => Settings::load()?,
        };
        let db = InternalDb::new(settings.internal_db_path()?).with_timeout(settings.query_timeout());
        let registry = EngineRegistry::new(settings.descriptor_dir()?);
        Ok(Self {
            settings,
            db,
            registry,
        })
    }

    fn table(&self, table: &str) -> crosstab::Result<Materialized<'_>> {
        SourceArgs::table(table).materialize(&self.db, &self.registry)
    }
}

fn run(cli: Cli) -> crosstab::Result<()> {
    let ctx = Context::load(cli.config)?;

    match cli.command {
        Commands::Ingest {
            file,
            table,
            overwrite,
            delimiter,
        } => {
            let delimiter = match delimiter {
                Some(c) if c.is_ascii() => c as u8,
                Some(c) => {
                    return Err(crosstab::Error::InvalidSource(format!(
                        "delimiter '{c}' is not a single byte"
                    )))
                }
                None => ctx.settings.csv_delimiter()?,
            };
            let mut args = SourceArgs::csv(file)
                .with_delimiter(delimiter)
                .with_overwrite(overwrite);
            if let Some(table) = table {
                args = args.with_table(table);
            }
            let source = args.materialize(&ctx.db, &ctx.registry)?;
            print_json(&source.ingested)
        }
        Commands::Freq { table, col_pct } => {
            let labels = load_labels(table.labels.as_ref())?;
            let mut source = ctx.table(&table.table)?;
            let rows = [chain(&table.rows, Axis::Row, &table, &[])];
            let spec = CrossTab::new(&source.engine, &source.table)
                .with_table_filter(table.filter.as_deref())
                .freq_table(&mut source.cursor, &rows, &labels, col_pct)?;
            print_json(&spec)
        }
        Commands::Crosstab {
            table,
            cols,
            pct,
            sum,
            strategy,
        } => {
            let labels = load_labels(table.labels.as_ref())?;
            let metrics: Vec<Metric> = pct.into_iter().map(Metric::from).collect();
            let (row_metrics, col_metrics) = if cols.is_empty() {
                (metrics.as_slice(), &[][..])
            } else {
                (&[][..], metrics.as_slice())
            };
            let rows = [chain(&table.rows, Axis::Row, &table, row_metrics)];
            let col_specs: Vec<DimSpec> = if cols.is_empty() {
                Vec::new()
            } else {
                vec![chain(&cols, Axis::Col, &table, col_metrics)]
            };
            let measure = sum.map_or(Measure::Count, Measure::Sum);
            let strategy = strategy.map_or(ctx.settings.query.strategy, Strategy::from);

            let mut source = ctx.table(&table.table)?;
            let spec = CrossTab::new(&source.engine, &source.table)
                .with_table_filter(table.filter.as_deref())
                .with_measure(measure)
                .with_strategy(strategy)
                .build(&mut source.cursor, &rows, &col_specs, &labels)?;
            print_json(&spec)
        }
        Commands::Sample {
            table,
            measure,
            group,
            filter,
        } => {
            let group = group.map(|g| parse_group(&g)).transpose()?;
            let mut source = ctx.table(&table)?;
            let sample = SampleExtractor::new(&source.engine, &source.table)
                .with_table_filter(filter.as_deref())
                .sample(&mut source.cursor, &measure, group.as_ref())?;
            print_json(&sample)
        }
    }
}

/// Nest `vars` outermost first, with metrics on the leaf.
fn chain(vars: &[String], axis: Axis, args: &TableArgs, leaf_metrics: &[Metric]) -> DimSpec {
    let mut spec: Option<DimSpec> = None;
    for (i, var) in vars.iter().enumerate().rev() {
        let mut level = DimSpec::new(var.clone(), axis).sorted_by(args.sort.clone().into());
        if args.totals {
            level = level.with_total();
        }
        if i == vars.len() - 1 {
            for metric in leaf_metrics {
                level = level.with_metric(*metric);
            }
        }
        if let Some(child) = spec.take() {
            level = level.with_child(child);
        }
        spec = Some(level);
    }
    // clap guarantees at least one row variable; column chains are only built when non-empty
    spec.unwrap_or_else(|| DimSpec::new(String::new(), axis))
}

fn load_labels(path: Option<&PathBuf>) -> crosstab::Result<VarLabels> {
    let Some(path) = path else {
        return Ok(VarLabels::new());
    };
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| {
        crosstab::Error::InvalidSource(format!("labels file {}: {}", path.display(), e))
    })
}

/// `field=value`; numeric-looking values are compared as numbers.
fn parse_group(raw: &str) -> crosstab::Result<ValFilterSpec> {
    let (field, value) = raw.split_once('=').ok_or_else(|| {
        crosstab::Error::InvalidSource(format!("group filter '{raw}' is not field=value"))
    })?;
    let val = Value::parse_field(value);
    Ok(ValFilterSpec::new(field.trim(), ValSpec::new(val, value.trim())))
}

fn print_json<T: Serialize>(value: &T) -> crosstab::Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    println!("{}", json);
    Ok(())
}
