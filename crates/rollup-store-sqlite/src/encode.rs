//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 UTC at second precision with a `Z` suffix, so
//! string order and time order agree. Breakdown payloads are compact JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use rollup_core::{
  dimension::DimensionType,
  fact::{Fact, VerificationLevel},
  row::{Breakdown, RollupRow},
  window::Grain,
};
use rusqlite::ToSql;

use crate::{Error, Result, sink::StoredRollup};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_grain(s: &str) -> Result<Grain> {
  Grain::parse(s).map_err(|_| Error::Decode { kind: "grain", value: s.to_owned() })
}

pub fn decode_dim_type(s: &str) -> Result<DimensionType> {
  s.parse()
    .map_err(|_| Error::Decode { kind: "dim_type", value: s.to_owned() })
}

// ─── Breakdown ───────────────────────────────────────────────────────────────

pub fn encode_breakdown(b: &Breakdown) -> Result<String> {
  Ok(serde_json::to_string(b)?)
}

pub fn decode_breakdown(s: &str) -> Result<Breakdown> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read from the fact query.
pub struct RawFact {
  pub entity_id:      String,
  pub first_at:       String,
  pub country:        Option<String>,
  pub category:       Option<String>,
  pub level_priority: Option<i64>,
  pub accepting_any:  bool,
  pub assets_json:    String,
}

impl RawFact {
  pub fn into_fact(self) -> Result<Fact> {
    let level = self
      .level_priority
      .and_then(|p| u8::try_from(p).ok())
      .map(VerificationLevel::from_priority)
      .unwrap_or_default();
    let assets: Vec<String> = serde_json::from_str(&self.assets_json)?;

    Ok(
      Fact::new(self.entity_id, decode_dt(&self.first_at)?)
        .with_level(level)
        .with_country(self.country.as_deref())
        .with_category(self.category.as_deref())
        .with_accepting_any(self.accepting_any)
        .with_assets(assets),
    )
  }
}

/// A rollup row with every column already encoded, ready to be moved onto the
/// database thread.
pub struct EncodedRow {
  pub period_start:        String,
  pub period_end:          String,
  pub grain:               &'static str,
  pub dim_type:            &'static str,
  pub dim_key:             String,
  pub total_count:         i64,
  pub verified_count:      i64,
  pub accepting_any_count: i64,
  pub breakdown_json:      String,
  pub generated_at:        String,
}

impl EncodedRow {
  pub const COLUMNS: usize = 10;

  pub fn encode(row: &RollupRow, generated_at: DateTime<Utc>) -> Result<Self> {
    Ok(Self {
      period_start:        encode_dt(row.period_start),
      period_end:          encode_dt(row.period_end),
      grain:               row.grain.into(),
      dim_type:            row.dimension.into(),
      dim_key:             row.dim_key(),
      total_count:         row.total_count as i64,
      verified_count:      row.verified_count as i64,
      accepting_any_count: row.accepting_any_count as i64,
      breakdown_json:      encode_breakdown(&row.breakdown)?,
      generated_at:        encode_dt(generated_at),
    })
  }

  /// Bind values in column order.
  pub fn params(&self) -> [&dyn ToSql; Self::COLUMNS] {
    [
      &self.period_start,
      &self.period_end,
      &self.grain,
      &self.dim_type,
      &self.dim_key,
      &self.total_count,
      &self.verified_count,
      &self.accepting_any_count,
      &self.breakdown_json,
      &self.generated_at,
    ]
  }
}

/// Raw strings read directly from a `stats_rollups` row.
pub struct RawRollup {
  pub period_start:        String,
  pub period_end:          String,
  pub grain:               String,
  pub dim_type:            String,
  pub dim_key:             String,
  pub total_count:         i64,
  pub verified_count:      i64,
  pub accepting_any_count: i64,
  pub breakdown_json:      String,
  pub generated_at:        String,
}

impl RawRollup {
  pub fn into_stored(self) -> Result<StoredRollup> {
    Ok(StoredRollup {
      period_start:        decode_dt(&self.period_start)?,
      period_end:          decode_dt(&self.period_end)?,
      grain:               decode_grain(&self.grain)?,
      dim_type:            decode_dim_type(&self.dim_type)?,
      dim_key:             self.dim_key,
      total_count:         self.total_count.max(0) as u64,
      verified_count:      self.verified_count.max(0) as u64,
      accepting_any_count: self.accepting_any_count.max(0) as u64,
      breakdown:           decode_breakdown(&self.breakdown_json)?,
      generated_at:        decode_dt(&self.generated_at)?,
    })
  }
}
