//! Error types for `rollup-core`.

use thiserror::Error;

/// A type-erased error raised by a storage backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid grain: {0:?} (expected hour, day or week)")]
  InvalidGrain(String),

  #[error("invalid {grain} anchor {value:?}: {reason}")]
  InvalidAnchor {
    grain:  &'static str,
    value:  String,
    reason: String,
  },

  #[error("a {anchor} anchor cannot be used with the {grain} grain")]
  AnchorGrainMismatch {
    anchor: &'static str,
    grain:  &'static str,
  },

  #[error("invalid parameter {name}: {reason}")]
  InvalidParameter { name: &'static str, reason: String },

  #[error("rollup sink is missing a schema prerequisite: {0}")]
  SchemaPrerequisiteMissing(#[source] BoxError),

  #[error("fact source unavailable: {0}")]
  DataSourceUnavailable(#[source] BoxError),

  #[error("upsert failed and was rolled back: {0}")]
  UpsertFailure(#[source] BoxError),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// True for errors raised while validating invocation parameters, before
  /// any I/O takes place.
  pub fn is_configuration(&self) -> bool {
    matches!(
      self,
      Self::InvalidGrain(_)
        | Self::InvalidAnchor { .. }
        | Self::AnchorGrainMismatch { .. }
        | Self::InvalidParameter { .. }
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
