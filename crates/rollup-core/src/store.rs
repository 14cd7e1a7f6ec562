//! The [`FactSource`] and [`RollupSink`] traits.
//!
//! Both are implemented by storage backends (e.g. `rollup-store-sqlite`).
//! The engine depends on these abstractions only.
//!
//! All methods return `Send` futures so the traits can be used from
//! multi-threaded async runtimes.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{fact::Fact, row::RollupRow, window::Window};

/// Answers "which entities reached a qualifying lifecycle state in this
/// window, and with what attributes". Implementations never write.
pub trait FactSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// What the backing store can answer, probed once per run and passed
  /// explicitly to [`Self::load_facts`].
  type Capabilities: std::fmt::Debug + Send + Sync;

  /// Inspect the store. Fails if a required source is missing.
  fn probe(
    &self,
  ) -> impl Future<Output = Result<Self::Capabilities, Self::Error>> + Send + '_;

  /// Return one fact per entity whose earliest qualifying event before
  /// `window.end` falls inside `window`.
  fn load_facts<'a>(
    &'a self,
    window: &'a Window,
    capabilities: &'a Self::Capabilities,
  ) -> impl Future<Output = Result<Vec<Fact>, Self::Error>> + Send + 'a;
}

/// Durably upserts rollup rows keyed on
/// `(period_start, grain, dim_type, dim_key)`.
pub trait RollupSink: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Verify the sink's schema is in place. Called before any fact is loaded.
  fn check_prerequisites(
    &self,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Insert or overwrite `rows` inside a single transaction, stamping each
  /// with `generated_at`. Either every row is written or none is.
  ///
  /// Returns the number of rows written.
  fn upsert_rows<'a>(
    &'a self,
    rows: &'a [RollupRow],
    generated_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;
}
