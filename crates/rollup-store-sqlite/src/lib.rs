//! SQLite backend for the rollup engine.
//!
//! Reads facts from the host application's tables and upserts rollup rows
//! into `stats_rollups`, all through one [`tokio_rusqlite`] connection so no
//! database access blocks the async runtime.

mod encode;
mod schema;
mod sink;
mod source;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use schema::ROLLUP_TABLE;
pub use sink::StoredRollup;
pub use source::{QUALIFYING_ACTIONS, SourceCapabilities};
pub use store::{DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE, SqliteStore};
