//! The write side: prerequisite checks, transactional upserts and read-back.

use chrono::{DateTime, Utc};
use rollup_core::{
  dimension::DimensionType,
  row::{Breakdown, RollupRow},
  store::RollupSink,
  window::Grain,
};
use rusqlite::TransactionBehavior;

use crate::{
  Error, Result,
  encode::{EncodedRow, RawRollup},
  schema::{NATURAL_KEY, ROLLUP_TABLE, has_unique_index, table_exists},
  store::SqliteStore,
};

/// A row as persisted in `stats_rollups`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRollup {
  pub period_start:        DateTime<Utc>,
  pub period_end:          DateTime<Utc>,
  pub grain:               Grain,
  pub dim_type:            DimensionType,
  pub dim_key:             String,
  pub total_count:         u64,
  pub verified_count:      u64,
  pub accepting_any_count: u64,
  pub breakdown:           Breakdown,
  pub generated_at:        DateTime<Utc>,
}

fn upsert_sql(rows: usize) -> String {
  let tuple = format!("({})", vec!["?"; EncodedRow::COLUMNS].join(", "));
  let values = vec![tuple.as_str(); rows].join(",\n       ");
  format!(
    "INSERT INTO stats_rollups (
       period_start, period_end, grain, dim_type, dim_key,
       total_count, verified_count, accepting_any_count,
       breakdown_json, generated_at
     ) VALUES {values}
     ON CONFLICT (period_start, grain, dim_type, dim_key) DO UPDATE SET
       period_end          = excluded.period_end,
       total_count         = excluded.total_count,
       verified_count      = excluded.verified_count,
       accepting_any_count = excluded.accepting_any_count,
       breakdown_json      = excluded.breakdown_json,
       generated_at        = excluded.generated_at"
  )
}

// ─── RollupSink ──────────────────────────────────────────────────────────────

impl RollupSink for SqliteStore {
  type Error = Error;

  async fn check_prerequisites(&self) -> Result<()> {
    let (exists, indexed) = self
      .conn
      .call(|conn| {
        if !table_exists(conn, ROLLUP_TABLE)? {
          return Ok((false, false));
        }
        Ok((true, has_unique_index(conn, ROLLUP_TABLE, &NATURAL_KEY)?))
      })
      .await?;

    if !exists {
      return Err(Error::MissingRollupTable(ROLLUP_TABLE));
    }
    if !indexed {
      return Err(Error::MissingRollupIndex(ROLLUP_TABLE));
    }
    Ok(())
  }

  async fn upsert_rows<'a>(
    &'a self,
    rows: &'a [RollupRow],
    generated_at: DateTime<Utc>,
  ) -> Result<usize> {
    if rows.is_empty() {
      return Ok(0);
    }

    let encoded = rows
      .iter()
      .map(|row| EncodedRow::encode(row, generated_at))
      .collect::<Result<Vec<_>>>()?;
    let batch_size = self.batch_size;

    let written = self
      .conn
      .call(move |conn| {
        // Dropping `tx` on any error rolls the whole run back.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut written = 0;
        for chunk in encoded.chunks(batch_size) {
          let mut stmt = tx.prepare_cached(&upsert_sql(chunk.len()))?;
          stmt.execute(rusqlite::params_from_iter(
            chunk.iter().flat_map(EncodedRow::params),
          ))?;
          written += chunk.len();
        }
        tx.commit()?;
        Ok(written)
      })
      .await?;

    tracing::debug!(written, batch_size, "upserted rollup rows");
    Ok(written)
  }
}

// ─── Read-back ───────────────────────────────────────────────────────────────

impl SqliteStore {
  /// Stored rows for `grain`, optionally limited to one dimension type,
  /// ordered by `(period_start, dim_type, dim_key)`.
  pub async fn load_rollups(
    &self,
    grain: Grain,
    dim_type: Option<DimensionType>,
  ) -> Result<Vec<StoredRollup>> {
    let grain: &'static str = grain.into();
    let dim_type: Option<&'static str> = dim_type.map(Into::into);

    let raws: Vec<RawRollup> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT period_start, period_end, grain, dim_type, dim_key,
                  total_count, verified_count, accepting_any_count,
                  breakdown_json, generated_at
             FROM stats_rollups
            WHERE grain = ?1 AND (?2 IS NULL OR dim_type = ?2)
            ORDER BY period_start, dim_type, dim_key",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![grain, dim_type], |r| {
            Ok(RawRollup {
              period_start:        r.get(0)?,
              period_end:          r.get(1)?,
              grain:               r.get(2)?,
              dim_type:            r.get(3)?,
              dim_key:             r.get(4)?,
              total_count:         r.get(5)?,
              verified_count:      r.get(6)?,
              accepting_any_count: r.get(7)?,
              breakdown_json:      r.get(8)?,
              generated_at:        r.get(9)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRollup::into_stored).collect()
  }
}
