//! The rollup pipeline.
//!
//! `Resolve → Enumerate → LoadFacts → Rank → SelectComposites → Aggregate →
//! BuildRows → Upsert`, run once per invocation. Everything before the upsert
//! is pure computation over in-memory facts; any error aborts the run and is
//! returned to the caller without retries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::{
  Error, Result,
  aggregate::Aggregation,
  fact::Fact,
  fingerprint::fingerprint,
  rank::{rank_dimensions, select_composites},
  row::{RollupRow, build_rows},
  store::{FactSource, RollupSink},
  window::{Anchor, Grain, Window, buckets, resolve_window},
};

pub const DEFAULT_TOP_N: usize = 40;
pub const DEFAULT_SINCE_HOURS: u32 = 48;
/// One leap year of hourly buckets.
pub const MAX_SINCE_HOURS: u32 = 24 * 366;

// ─── Parameters ──────────────────────────────────────────────────────────────

/// Invocation parameters for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParams {
  pub grain:       Grain,
  pub anchor:      Option<Anchor>,
  /// Only used by hourly runs without an anchor.
  pub since_hours: u32,
  pub top_n:       usize,
}

impl RunParams {
  /// Parameters with every optional value set to its default.
  pub fn new(grain: Grain) -> Self {
    Self {
      grain,
      anchor: None,
      since_hours: DEFAULT_SINCE_HOURS,
      top_n: DEFAULT_TOP_N,
    }
  }

  pub fn validate(&self) -> Result<()> {
    if self.top_n == 0 {
      return Err(Error::InvalidParameter {
        name:   "top_n",
        reason: "must be at least 1".into(),
      });
    }
    if self.since_hours == 0 || self.since_hours > MAX_SINCE_HOURS {
      return Err(Error::InvalidParameter {
        name:   "since_hours",
        reason: format!("must be between 1 and {MAX_SINCE_HOURS}"),
      });
    }
    Ok(())
  }
}

/// A resolved window and its buckets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
  pub grain:   Grain,
  pub window:  Window,
  pub buckets: Vec<DateTime<Utc>>,
  pub top_n:   usize,
}

/// Structured outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
  pub grain:        Grain,
  pub window_start: DateTime<Utc>,
  pub window_end:   DateTime<Utc>,
  pub bucket_count: usize,
  pub fact_count:   usize,
  pub row_count:    usize,
  pub top_n:        usize,
  pub fingerprint:  String,
}

/// The result of [`preview`]: what a run would write.
#[derive(Debug, Clone)]
pub struct Preview {
  pub summary: RunSummary,
  pub rows:    Vec<RollupRow>,
}

// ─── Pure stages ─────────────────────────────────────────────────────────────

/// Validate parameters, resolve the window and enumerate its buckets.
/// Performs no I/O.
pub fn plan(params: &RunParams, now: DateTime<Utc>) -> Result<RunPlan> {
  params.validate()?;
  let window = resolve_window(params.grain, params.anchor, params.since_hours, now)?;
  let buckets = buckets(&window, params.grain);
  debug!(
    grain = %params.grain,
    start = %window.start,
    end = %window.end,
    buckets = buckets.len(),
    "resolved window"
  );
  Ok(RunPlan { grain: params.grain, window, buckets, top_n: params.top_n })
}

/// Rank, select composites, aggregate and build rows.
pub fn build_rollups(plan: &RunPlan, facts: &[Fact]) -> Vec<RollupRow> {
  let mut selection = rank_dimensions(facts, plan.top_n);
  select_composites(facts, &mut selection, plan.grain.composite_limit());

  let mut aggregation = Aggregation::seeded(plan.grain, &plan.buckets, &selection);
  for fact in facts {
    aggregation.apply(fact, &selection);
  }
  debug!(
    slots = aggregation.len(),
    skipped = aggregation.skipped(),
    "aggregated facts"
  );

  build_rows(aggregation)
}

// ─── Runs ────────────────────────────────────────────────────────────────────

/// Run every stage except the upsert. Nothing is written.
pub async fn preview<S: FactSource>(
  source: &S,
  params: &RunParams,
  now: DateTime<Utc>,
) -> Result<Preview> {
  let plan = plan(params, now)?;
  let facts = load(source, &plan).await?;
  let rows = build_rollups(&plan, &facts);
  let summary = summarize(&plan, facts.len(), &rows)?;
  Ok(Preview { summary, rows })
}

/// Generate the rollups for one window and upsert them into `sink`.
///
/// `now` anchors default windows and stamps `generated_at` on every row.
pub async fn generate<S: FactSource, K: RollupSink>(
  source: &S,
  sink: &K,
  params: &RunParams,
  now: DateTime<Utc>,
) -> Result<RunSummary> {
  let plan = plan(params, now)?;

  sink
    .check_prerequisites()
    .await
    .map_err(|e| Error::SchemaPrerequisiteMissing(Box::new(e)))?;

  let facts = load(source, &plan).await?;
  let rows = build_rollups(&plan, &facts);
  let summary = summarize(&plan, facts.len(), &rows)?;

  let written = sink
    .upsert_rows(&rows, now)
    .await
    .map_err(|e| Error::UpsertFailure(Box::new(e)))?;
  debug!(written, "upserted rows");

  Ok(summary)
}

async fn load<S: FactSource>(source: &S, plan: &RunPlan) -> Result<Vec<Fact>> {
  let unavailable = |e: S::Error| Error::DataSourceUnavailable(Box::new(e));

  let capabilities = source.probe().await.map_err(unavailable)?;
  debug!(?capabilities, "probed fact source");

  let facts = source
    .load_facts(&plan.window, &capabilities)
    .await
    .map_err(unavailable)?;
  debug!(facts = facts.len(), "loaded facts");
  Ok(facts)
}

fn summarize(plan: &RunPlan, fact_count: usize, rows: &[RollupRow]) -> Result<RunSummary> {
  Ok(RunSummary {
    grain: plan.grain,
    window_start: plan.window.start,
    window_end: plan.window.end,
    bucket_count: plan.buckets.len(),
    fact_count,
    row_count: rows.len(),
    top_n: plan.top_n,
    fingerprint: fingerprint(rows)?,
  })
}
