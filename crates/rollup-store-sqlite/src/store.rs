//! [`SqliteStore`], the SQLite implementation of both
//! [`rollup_core::store::FactSource`] and [`rollup_core::store::RollupSink`].

use std::path::Path;

use crate::{Result, schema::ROLLUP_SCHEMA};

/// Rows per multi-row `INSERT` statement.
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Upper bound keeping one statement under SQLite's default limit of 32766
/// bound variables (ten per row).
pub const MAX_BATCH_SIZE: usize = 3000;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A rollup store over a single SQLite database.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn:       tokio_rusqlite::Connection,
  pub(crate) batch_size: usize,
}

impl SqliteStore {
  /// Open the database at `path`. No tables are created.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Ok(Self::from_connection(conn))
  }

  /// Open an empty in-memory database, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Ok(Self::from_connection(conn))
  }

  fn from_connection(conn: tokio_rusqlite::Connection) -> Self {
    Self { conn, batch_size: DEFAULT_BATCH_SIZE }
  }

  /// Set the number of rows per upsert statement, clamped to
  /// `1..=MAX_BATCH_SIZE`.
  pub fn with_batch_size(mut self, batch_size: usize) -> Self {
    self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
    self
  }

  pub fn batch_size(&self) -> usize { self.batch_size }

  /// Create `stats_rollups` and its indexes if they do not exist yet.
  pub async fn init_rollup_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(ROLLUP_SCHEMA)?;
        Ok(())
      })
      .await?;
    tracing::debug!("rollup schema initialised");
    Ok(())
  }
}
