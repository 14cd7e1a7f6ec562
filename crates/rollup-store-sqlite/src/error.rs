//! Error type for `rollup-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown {kind} value {value:?}")]
  Decode { kind: &'static str, value: String },

  /// A source table the fact query cannot run without.
  #[error("required source table {0:?} is missing")]
  MissingSourceTable(&'static str),

  #[error("rollup table {0:?} does not exist")]
  MissingRollupTable(&'static str),

  #[error("rollup table {0:?} has no unique index on its natural key")]
  MissingRollupIndex(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
