//! `rollup` job binary.
//!
//! Reads `rollup.toml` (or the path given with `--config`) and `ROLLUP_*`
//! environment variables, opens the SQLite database, and generates one
//! window of rollups. Meant to be invoked by an external scheduler, which
//! owns retries and per-grain locking.
//!
//! ```text
//! rollup hour --since-hours 6
//! rollup day --date 2024-05-01 --dry-run
//! ```

use std::path::PathBuf;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::Parser;
use rollup_core::{
  engine::{self, DEFAULT_SINCE_HOURS, DEFAULT_TOP_N, RunParams, RunSummary},
  window::{Anchor, Grain},
};
use rollup_store_sqlite::{DEFAULT_BATCH_SIZE, SqliteStore};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Generate time-bucketed statistics rollups")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, env = "ROLLUP_CONFIG", default_value = "rollup.toml")]
  config: PathBuf,

  /// SQLite database holding the source tables and `stats_rollups`.
  #[arg(long)]
  database: Option<PathBuf>,

  /// Bucket size: hour, day or week.
  #[arg(value_parser = parse_grain)]
  grain: Grain,

  /// Generate the single hour starting here (hour grain only).
  #[arg(long, conflicts_with_all = ["date", "week_start"])]
  hour_start: Option<String>,

  /// Generate this calendar day, `YYYY-MM-DD` (day grain only).
  #[arg(long, conflicts_with = "week_start")]
  date: Option<String>,

  /// Generate the ISO week containing this date (week grain only).
  #[arg(long)]
  week_start: Option<String>,

  /// Hours to cover when no hour anchor is given.
  #[arg(long)]
  since_hours: Option<u32>,

  /// Keys kept per dimension.
  #[arg(long)]
  top_n: Option<usize>,

  /// Rows per upsert statement.
  #[arg(long)]
  batch_size: Option<usize>,

  /// Create `stats_rollups` if it does not exist.
  #[arg(long)]
  init_schema: bool,

  /// Compute and log the summary without writing.
  #[arg(long)]
  dry_run: bool,
}

fn parse_grain(s: &str) -> Result<Grain, String> {
  Grain::parse(s).map_err(|e| e.to_string())
}

/// Settings read from the config file and environment.
#[derive(Deserialize)]
#[serde(default)]
struct JobConfig {
  database_path: PathBuf,
  since_hours:   u32,
  top_n:         usize,
  batch_size:    usize,
}

impl Default for JobConfig {
  fn default() -> Self {
    Self {
      database_path: PathBuf::from("rollup.db"),
      since_hours:   DEFAULT_SINCE_HOURS,
      top_n:         DEFAULT_TOP_N,
      batch_size:    DEFAULT_BATCH_SIZE,
    }
  }
}

impl Cli {
  /// The anchor flag matching the grain, if any. A flag for another grain is
  /// passed through so the engine reports the mismatch.
  fn anchor(&self) -> anyhow::Result<Option<Anchor>> {
    let given = [
      (Grain::Hour, &self.hour_start),
      (Grain::Day, &self.date),
      (Grain::Week, &self.week_start),
    ];
    let Some((flag_grain, value)) = given
      .into_iter()
      .find_map(|(grain, value)| value.as_deref().map(|v| (grain, v)))
    else {
      return Ok(None);
    };
    let anchor = Anchor::parse(flag_grain, value)
      .with_context(|| format!("invalid --{} value", anchor_flag(flag_grain)))?;
    Ok(Some(anchor))
  }
}

fn anchor_flag(grain: Grain) -> &'static str {
  match grain {
    Grain::Hour => "hour-start",
    Grain::Day => "date",
    Grain::Week => "week-start",
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(config::Environment::with_prefix("ROLLUP"))
    .build()
    .context("failed to read configuration")?;
  let job: JobConfig = settings
    .try_deserialize()
    .context("failed to deserialise JobConfig")?;

  let summary = run(&cli, job, Utc::now()).await?;
  log_summary(&summary, cli.dry_run);
  Ok(())
}

/// Resolve the run, then open the database and execute it. Parameter and
/// anchor errors surface before the database is touched.
async fn run(cli: &Cli, job: JobConfig, now: DateTime<Utc>) -> anyhow::Result<RunSummary> {
  let params = RunParams {
    grain:       cli.grain,
    anchor:      cli.anchor()?,
    since_hours: cli.since_hours.unwrap_or(job.since_hours),
    top_n:       cli.top_n.unwrap_or(job.top_n),
  };
  engine::plan(&params, now).context("invalid run parameters")?;

  let database = cli.database.clone().unwrap_or(job.database_path);
  let store = SqliteStore::open(&database)
    .await
    .with_context(|| format!("failed to open database at {database:?}"))?
    .with_batch_size(cli.batch_size.unwrap_or(job.batch_size));

  if cli.init_schema && !cli.dry_run {
    store
      .init_rollup_schema()
      .await
      .context("failed to create rollup schema")?;
  }

  if cli.dry_run {
    let preview = engine::preview(&store, &params, now)
      .await
      .context("dry run failed")?;
    Ok(preview.summary)
  } else {
    engine::generate(&store, &store, &params, now)
      .await
      .with_context(|| format!("{} rollup generation failed", params.grain))
  }
}

fn log_summary(summary: &RunSummary, dry_run: bool) {
  tracing::info!(
    grain = %summary.grain,
    window_start = %summary.window_start,
    window_end = %summary.window_end,
    buckets = summary.bucket_count,
    facts = summary.fact_count,
    rows = summary.row_count,
    top_n = summary.top_n,
    fingerprint = %summary.fingerprint,
    dry_run,
    "rollup complete"
  );
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("rollup").chain(args.iter().copied())).unwrap()
  }

  #[test]
  fn grain_is_positional() {
    let cli = parse(&["week", "--dry-run"]);
    assert_eq!(cli.grain, Grain::Week);
    assert!(cli.dry_run);
    assert!(cli.anchor().unwrap().is_none());
  }

  #[test]
  fn unknown_grain_is_rejected() {
    assert!(Cli::try_parse_from(["rollup", "month"]).is_err());
  }

  #[test]
  fn anchor_flag_is_parsed_for_its_grain() {
    let cli = parse(&["day", "--date", "2024-05-01"]);
    let expected = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    assert_eq!(cli.anchor().unwrap(), Some(Anchor::Day(expected)));
  }

  #[test]
  fn conflicting_anchor_flags_are_rejected() {
    assert!(
      Cli::try_parse_from(["rollup", "day", "--date", "2024-05-01", "--week-start", "2024-05-06"])
        .is_err()
    );
  }

  #[tokio::test]
  async fn mismatched_anchor_fails_before_opening_the_database() {
    let database = std::env::temp_dir().join(format!("rollup-mismatch-{}.db", std::process::id()));
    let _ = std::fs::remove_file(&database);
    let database_arg = database.to_string_lossy().into_owned();
    let cli = parse(&[
      "--database",
      database_arg.as_str(),
      "week",
      "--date",
      "2024-05-01",
      "--init-schema",
    ]);

    let err = run(&cli, JobConfig::default(), Utc::now()).await.unwrap_err();
    let cause = err.downcast_ref::<rollup_core::Error>().unwrap();
    assert!(cause.is_configuration());
    assert!(!database.exists());
  }

  #[test]
  fn malformed_anchor_is_an_error() {
    let cli = parse(&["hour", "--hour-start", "noon"]);
    assert!(cli.anchor().is_err());
  }
}
