//! Rollup rows and their breakdown payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::{
  aggregate::{Accumulator, Aggregation},
  dimension::{Attribute, DimensionKey, DimensionType},
  fact::VerificationLevel,
  rank::rank_counts,
  window::Grain,
};

// ─── Breakdown ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakdownEntry {
  pub key:   String,
  pub count: u64,
}

/// The nested detail stored alongside a row's counts. Held typed; the sink
/// decides how to encode it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakdown {
  /// Count per verification level; every level is present.
  pub verification: BTreeMap<VerificationLevel, u64>,
  pub countries:    Vec<BreakdownEntry>,
  pub categories:   Vec<BreakdownEntry>,
  pub assets:       Vec<BreakdownEntry>,
}

impl Breakdown {
  /// Build from an accumulator, keeping the `limit` most frequent nested
  /// entries per attribute (count descending, key ascending).
  pub fn from_accumulator(acc: &Accumulator, limit: usize) -> Self {
    let verification = VerificationLevel::iter()
      .map(|level| (level, acc.levels.get(&level).copied().unwrap_or(0)))
      .collect();

    let top = |attribute: Attribute| -> Vec<BreakdownEntry> {
      rank_counts(
        acc.nested(attribute).iter().map(|(k, c)| (k.as_str(), *c)),
        limit,
      )
      .into_iter()
      .map(|(key, count)| BreakdownEntry { key: key.to_owned(), count })
      .collect()
    };

    Self {
      verification,
      countries: top(Attribute::Country),
      categories: top(Attribute::Category),
      assets: top(Attribute::Asset),
    }
  }
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// One aggregate record for a `(bucket, dimension type, dimension key)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollupRow {
  pub period_start:        DateTime<Utc>,
  pub period_end:          DateTime<Utc>,
  pub grain:               Grain,
  pub dimension:           DimensionType,
  pub key:                 DimensionKey,
  pub total_count:         u64,
  pub verified_count:      u64,
  pub accepting_any_count: u64,
  pub breakdown:           Breakdown,
}

impl RollupRow {
  /// The persisted `dim_key` string.
  pub fn dim_key(&self) -> String { self.key.to_string() }

  /// The deterministic output order: `(period_start, dim_type, dim_key)`.
  pub fn sort_key(&self) -> (DateTime<Utc>, &'static str, String) {
    (self.period_start, self.dimension.into(), self.dim_key())
  }
}

/// Flatten an aggregation into rows sorted by [`RollupRow::sort_key`].
pub fn build_rows(aggregation: Aggregation) -> Vec<RollupRow> {
  let grain = aggregation.grain();
  let step = grain.step();
  let limit = grain.breakdown_limit();

  let mut rows: Vec<RollupRow> = aggregation
    .into_slots()
    .into_iter()
    .map(|(slot, acc)| RollupRow {
      period_start: slot.bucket,
      period_end: slot.bucket + step,
      grain,
      dimension: slot.dimension,
      key: slot.key,
      total_count: acc.total,
      verified_count: acc.verified,
      accepting_any_count: acc.accepting_any,
      breakdown: Breakdown::from_accumulator(&acc, limit),
    })
    .collect();

  rows.sort_by_cached_key(RollupRow::sort_key);
  rows
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::fact::Fact;

  #[test]
  fn breakdown_is_truncated_and_tie_broken_by_key() {
    let mut acc = Accumulator::default();
    for (country, n) in [("US", 3), ("DE", 1), ("AT", 1), ("FR", 2)] {
      acc.countries.insert(country.into(), n);
    }
    acc.levels.insert(VerificationLevel::Owner, 7);

    let breakdown = Breakdown::from_accumulator(&acc, 3);
    let keys: Vec<_> = breakdown.countries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, ["US", "FR", "AT"]);
    assert_eq!(breakdown.verification.len(), 4);
    assert_eq!(breakdown.verification[&VerificationLevel::Owner], 7);
    assert_eq!(breakdown.verification[&VerificationLevel::Unverified], 0);
  }

  #[test]
  fn breakdown_serializes_levels_as_strings() {
    let breakdown = Breakdown::from_accumulator(&Accumulator::default(), 10);
    let json = serde_json::to_value(&breakdown).unwrap();
    assert_eq!(json["verification"]["self_reported"], 0);
    assert!(json["countries"].as_array().unwrap().is_empty());
  }

  #[test]
  fn rows_are_sorted_and_span_one_step() {
    let t0 = Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 0).unwrap();
    let t1 = Utc.with_ymd_and_hms(2024, 5, 7, 0, 0, 0).unwrap();
    let fact = Fact::new("e", t1).with_country(Some("US"));
    let selection = crate::rank::rank_dimensions(std::slice::from_ref(&fact), 5);

    let mut agg = Aggregation::seeded(Grain::Day, &[t0, t1], &selection);
    agg.apply(&fact, &selection);
    let rows = build_rows(agg);

    let keys: Vec<_> = rows
      .iter()
      .map(|r| (r.period_start, r.dimension.as_ref().to_owned(), r.dim_key()))
      .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);

    assert_eq!(rows.len(), 2 * (1 + 4 + 1));
    assert!(rows.iter().all(|r| r.period_end - r.period_start == Grain::Day.step()));
  }
}
