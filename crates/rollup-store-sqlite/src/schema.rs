//! SQL for the rollup sink table.
//!
//! The source tables belong to the host application and are only read.
//! `stats_rollups` is created explicitly via
//! [`crate::SqliteStore::init_rollup_schema`], never as a side effect of
//! opening a connection.

pub const ROLLUP_TABLE: &str = "stats_rollups";

/// The natural key; must match the UNIQUE constraint below.
pub const NATURAL_KEY: [&str; 4] = ["period_start", "grain", "dim_type", "dim_key"];

/// Sink DDL; idempotent thanks to `IF NOT EXISTS`.
pub const ROLLUP_SCHEMA: &str = "
-- Rows are inserted or overwritten by natural key; never deleted here.
CREATE TABLE IF NOT EXISTS stats_rollups (
    period_start        TEXT    NOT NULL,   -- RFC 3339 UTC, bucket start
    period_end          TEXT    NOT NULL,
    grain               TEXT    NOT NULL,   -- 'hour' | 'day' | 'week'
    dim_type            TEXT    NOT NULL,
    dim_key             TEXT    NOT NULL,   -- composite keys: 'first::second'
    total_count         INTEGER NOT NULL DEFAULT 0,
    verified_count      INTEGER NOT NULL DEFAULT 0,
    accepting_any_count INTEGER NOT NULL DEFAULT 0,
    breakdown_json      TEXT    NOT NULL DEFAULT '{}',
    generated_at        TEXT    NOT NULL,
    UNIQUE (period_start, grain, dim_type, dim_key)
);

CREATE INDEX IF NOT EXISTS stats_rollups_lookup_idx
    ON stats_rollups(grain, dim_type, period_start);
";

// ─── Introspection ───────────────────────────────────────────────────────────

pub fn table_exists(conn: &rusqlite::Connection, table: &str) -> rusqlite::Result<bool> {
  conn.query_row(
    "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
    [table],
    |r| r.get(0),
  )
}

/// Column names of `table`, empty if the table does not exist.
pub fn table_columns(
  conn: &rusqlite::Connection,
  table: &str,
) -> rusqlite::Result<Vec<String>> {
  let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
  let rows = stmt.query_map([table], |r| r.get(0))?;
  rows.collect()
}

/// True if `table` has a unique index whose columns are exactly `columns`,
/// in order.
pub fn has_unique_index(
  conn: &rusqlite::Connection,
  table: &str,
  columns: &[&str],
) -> rusqlite::Result<bool> {
  let mut list = conn.prepare("SELECT name FROM pragma_index_list(?1) WHERE \"unique\" = 1")?;
  let names = list
    .query_map([table], |r| r.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut info = conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
  for name in names {
    let indexed = info
      .query_map([&name], |r| r.get::<_, String>(0))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    if indexed.iter().map(String::as_str).eq(columns.iter().copied()) {
      return Ok(true);
    }
  }
  Ok(false)
}
