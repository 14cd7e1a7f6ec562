//! Run fingerprints.
//!
//! A fingerprint is a SHA-256 over the canonical JSON encoding of every row,
//! taken in [`RollupRow::sort_key`] order. Two runs over unchanged facts
//! produce the same fingerprint regardless of the order rows were handed in.

use sha2::{Digest, Sha256};

use crate::{Result, row::RollupRow};

/// Compute the fingerprint of a row set as lowercase hex.
pub fn fingerprint(rows: &[RollupRow]) -> Result<String> {
  let mut ordered: Vec<&RollupRow> = rows.iter().collect();
  ordered.sort_by_cached_key(|row| row.sort_key());

  let mut hasher = Sha256::new();
  for row in ordered {
    hasher.update(serde_json::to_vec(row)?);
    hasher.update(b"\n");
  }
  Ok(hex::encode(hasher.finalize()))
}
