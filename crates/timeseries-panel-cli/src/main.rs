//! CLI tool for inspecting and completing keyed time-series panels stored as CSV.

mod error;
mod io;

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{
    array::{ArrayRef, RecordBatch},
    datatypes::{DataType, Field, Schema},
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use snafu::{OptionExt, ResultExt};
use timeseries_panel_core::{
    Calendar, FillOptions, FillPolicy, FillScope, FillValue, IndexKind, Interval, KeyTuple,
    PanelSpec, PanelTable,
};

use crate::error::{
    CliError, CliResult, InvalidColumnValueSnafu, MissingIndexSnafu, PanelSnafu, WriteCsvSnafu,
};

/// Where the panel comes from and how to read it.
#[derive(Debug, Args)]
struct PanelArgs {
    /// Input CSV file with a header row
    #[arg(long)]
    csv: PathBuf,

    /// Index column name
    #[arg(long)]
    index: Option<String>,

    /// Repeatable key column names
    #[arg(long = "key")]
    keys: Vec<String>,

    /// Interpret the index as calendar periods: yearweek, yearmonth, yearquarter
    #[arg(long)]
    calendar: Option<Calendar>,

    /// Treat the table as irregular (skip interval inference)
    #[arg(long, default_value_t = false)]
    irregular: bool,

    /// JSON panel spec; replaces --index/--key/--calendar/--irregular
    #[arg(long)]
    spec: Option<PathBuf>,
}

impl PanelArgs {
    fn panel_spec(&self) -> CliResult<PanelSpec> {
        if let Some(path) = &self.spec {
            return io::read_spec(path);
        }
        let index = self.index.as_deref().context(MissingIndexSnafu)?;
        let mut spec = PanelSpec::new(index).with_keys(self.keys.iter().cloned());
        spec.calendar = self.calendar;
        spec.regular = !self.irregular;
        Ok(spec)
    }

    fn load(&self) -> CliResult<PanelTable> {
        let spec = self.panel_spec()?;
        let batch = io::read_csv(&self.csv)?;
        log::info!(
            "loaded {} rows from {}",
            batch.num_rows(),
            self.csv.display()
        );
        PanelTable::try_new(batch, spec).context(PanelSnafu)
    }
}

/// Grid options shared by gap commands.
#[derive(Debug, Args)]
struct GridArgs {
    /// Step override, e.g. 1D, 2h, 1M, 1/4 (default: the table interval)
    #[arg(long)]
    interval: Option<Interval>,

    /// Grid bounds: per-group, global, extend-start, extend-end
    #[arg(long, default_value_t = FillScope::PerGroup)]
    scope: FillScope,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate that every (key, index) pair is unique
    Check {
        #[command(flatten)]
        panel: PanelArgs,
    },

    /// Print the inferred interval of the table (and optionally of each group)
    Interval {
        #[command(flatten)]
        panel: PanelArgs,

        /// Also report each group's own interval
        #[arg(long, default_value_t = false)]
        per_group: bool,
    },

    /// Report missing points on the regular grid
    Gaps {
        #[command(flatten)]
        panel: PanelArgs,

        #[command(flatten)]
        grid: GridArgs,

        /// Report contiguous runs instead of single points
        #[arg(long, default_value_t = false)]
        runs: bool,

        /// Only report whether each group has gaps
        #[arg(long, default_value_t = false, conflicts_with = "runs")]
        summary: bool,

        /// Report how much of its grid each group observes
        #[arg(long, default_value_t = false, conflicts_with_all = ["runs", "summary"])]
        coverage: bool,
    },

    /// Insert rows for missing points and write the completed table as CSV
    Fill {
        #[command(flatten)]
        panel: PanelArgs,

        #[command(flatten)]
        grid: GridArgs,

        /// Constant for every measured column of inserted rows (default: null)
        #[arg(long)]
        value: Option<FillValue>,

        /// Repeatable NAME=VALUE constant for one measured column
        #[arg(long = "column-value", conflicts_with = "value")]
        column_values: Vec<String>,

        /// Output CSV path (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Append a lagged difference of a column, taken per group along the index
    Diff {
        #[command(flatten)]
        panel: PanelArgs,

        /// Numeric column to difference
        #[arg(long)]
        column: String,

        #[arg(long, default_value_t = 1)]
        lag: usize,

        #[arg(long, default_value_t = 1)]
        differences: usize,

        /// Value for the leading positions with no defined difference (default: null)
        #[arg(long)]
        fill: Option<f64>,

        /// Output CSV path (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Emit key and index rows for the next N steps of every group
    Extend {
        #[command(flatten)]
        panel: PanelArgs,

        /// Number of steps past each group's last observation
        #[arg(long = "steps", short = 'n', default_value_t = 1)]
        n: usize,

        /// Output CSV path (default: stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Parser)]
#[command(name = "tspanel", version, about)]
struct Cli {
    /// Log debug details to stderr (RUST_LOG overrides)
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    rows: usize,
    groups: usize,
    index_kind: IndexKind,
}

#[derive(Debug, Serialize)]
struct IntervalReport {
    index_kind: IndexKind,
    interval: String,
    detail: Interval,
    #[serde(skip_serializing_if = "Option::is_none")]
    groups: Option<BTreeMap<String, String>>,
}

fn cmd_check(panel: &PanelArgs) -> CliResult<()> {
    let table = match panel.load() {
        Ok(table) => table,
        Err(err) => {
            // Violations are printed as JSON ahead of the error message.
            if let CliError::Panel { source } = &err {
                if let Some(violations) = source.violations() {
                    io::write_json(&violations)?;
                }
            }
            return Err(err);
        }
    };
    io::write_json(&CheckReport {
        rows: table.num_rows(),
        groups: table.partition().len(),
        index_kind: table.index_kind(),
    })
}

fn cmd_interval(panel: &PanelArgs, per_group: bool) -> CliResult<()> {
    let table = panel.load()?;
    let groups = per_group.then(|| {
        table
            .group_intervals()
            .into_iter()
            .map(|(key, interval)| (key.to_string(), interval.to_string()))
            .collect()
    });
    io::write_json(&IntervalReport {
        index_kind: table.index_kind(),
        interval: table.interval().to_string(),
        detail: table.interval(),
        groups,
    })
}

fn cmd_gaps(
    panel: &PanelArgs,
    grid: &GridArgs,
    runs: bool,
    summary: bool,
    coverage: bool,
) -> CliResult<()> {
    let table = panel.load()?;
    if coverage {
        let summaries = table
            .summarize_gaps(grid.interval, grid.scope)
            .context(PanelSnafu)?;
        io::write_json(&summaries)
    } else if summary {
        let flags: BTreeMap<String, bool> = table
            .has_gaps(grid.interval, grid.scope)
            .context(PanelSnafu)?
            .into_iter()
            .map(|(key, gaps)| (key.to_string(), gaps))
            .collect();
        io::write_json(&flags)
    } else if runs {
        let runs = table
            .count_gaps(grid.interval, grid.scope)
            .context(PanelSnafu)?;
        log::info!("{} gap runs", runs.len());
        io::write_json(&runs)
    } else {
        let points: Vec<(KeyTuple, String)> = table
            .scan_gaps(grid.interval, grid.scope)
            .context(PanelSnafu)?
            .into_iter()
            .map(|(key, index)| (key, index.to_string()))
            .collect();
        log::info!("{} missing points", points.len());
        io::write_json(&points)
    }
}

fn parse_column_values(specs: &[String]) -> CliResult<BTreeMap<String, FillValue>> {
    specs
        .iter()
        .map(|spec| {
            let (name, value) = spec
                .split_once('=')
                .context(InvalidColumnValueSnafu { spec: spec.clone() })?;
            let value = match value.parse::<FillValue>() {
                Ok(v) => v,
                Err(never) => match never {},
            };
            Ok((name.trim().to_string(), value))
        })
        .collect()
}

fn cmd_fill(
    panel: &PanelArgs,
    grid: &GridArgs,
    value: Option<FillValue>,
    column_values: &[String],
    output: Option<&Path>,
) -> CliResult<()> {
    let table = panel.load()?;
    let policy = match value {
        Some(value) => FillPolicy::Value(value),
        None if !column_values.is_empty() => {
            FillPolicy::PerColumn(parse_column_values(column_values)?)
        }
        None => FillPolicy::NoFill,
    };
    let mut options = FillOptions::default()
        .with_policy(policy)
        .with_scope(grid.scope);
    options.interval = grid.interval;

    let before = table.num_rows();
    let filled = table.fill_gaps(&options).context(PanelSnafu)?;
    log::info!("inserted {} rows", filled.num_rows() - before);
    io::write_csv(filled.batch(), output)
}

fn cmd_diff(
    panel: &PanelArgs,
    column: &str,
    lag: usize,
    differences: usize,
    fill: Option<f64>,
    output: Option<&Path>,
) -> CliResult<()> {
    let table = panel.load()?;
    let diffs = table
        .difference(column, lag, differences, fill)
        .context(PanelSnafu)?;

    let batch = table.batch();
    let mut fields: Vec<Field> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    fields.push(Field::new(format!("{column}_diff"), DataType::Float64, true));
    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
    columns.push(Arc::new(diffs));

    let out = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).context(WriteCsvSnafu)?;
    io::write_csv(&out, output)
}

fn cmd_extend(panel: &PanelArgs, n: usize, output: Option<&Path>) -> CliResult<()> {
    let table = panel.load()?;
    let next = table.new_data(n).context(PanelSnafu)?;
    io::write_csv(&next, output)
}

fn run(cli: Cli) -> CliResult<()> {
    match cli.cmd {
        Command::Check { panel } => cmd_check(&panel),
        Command::Interval { panel, per_group } => cmd_interval(&panel, per_group),
        Command::Gaps {
            panel,
            grid,
            runs,
            summary,
            coverage,
        } => cmd_gaps(&panel, &grid, runs, summary, coverage),
        Command::Fill {
            panel,
            grid,
            value,
            column_values,
            output,
        } => cmd_fill(&panel, &grid, value, &column_values, output.as_deref()),
        Command::Diff {
            panel,
            column,
            lag,
            differences,
            fill,
            output,
        } => cmd_diff(&panel, &column, lag, differences, fill, output.as_deref()),
        Command::Extend { panel, n, output } => cmd_extend(&panel, n, output.as_deref()),
    }
}

fn main() {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(e) = run(cli) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
