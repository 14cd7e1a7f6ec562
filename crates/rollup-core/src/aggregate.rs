//! Per-bucket, per-dimension accumulators.
//!
//! Every `(bucket, dimension type, selected key)` slot is seeded before any
//! fact is applied, so each bucket produces a row even when it is empty.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use strum::IntoEnumIterator;

use crate::{
  dimension::{Attribute, DimensionKey, DimensionType, Pair},
  fact::{Fact, VerificationLevel},
  rank::Selection,
  window::Grain,
};

/// Identifies one accumulator. Kept as separate fields; never flattened into
/// a delimited string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey {
  pub bucket:    DateTime<Utc>,
  pub dimension: DimensionType,
  pub key:       DimensionKey,
}

// ─── Accumulator ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accumulator {
  pub total:         u64,
  pub verified:      u64,
  pub accepting_any: u64,
  pub levels:        BTreeMap<VerificationLevel, u64>,
  // Nested frequencies, used only for the breakdown payload.
  pub countries:     BTreeMap<String, u64>,
  pub categories:    BTreeMap<String, u64>,
  pub assets:        BTreeMap<String, u64>,
}

impl Accumulator {
  pub fn apply(&mut self, fact: &Fact) {
    self.total += 1;
    if fact.level.is_verified() {
      self.verified += 1;
    }
    if fact.accepting_any {
      self.accepting_any += 1;
    }
    *self.levels.entry(fact.level).or_default() += 1;

    for attribute in Attribute::iter() {
      let nested = self.nested_mut(attribute);
      for value in attribute.values(fact) {
        *nested.entry(value.to_owned()).or_default() += 1;
      }
    }
  }

  pub fn nested(&self, attribute: Attribute) -> &BTreeMap<String, u64> {
    match attribute {
      Attribute::Country => &self.countries,
      Attribute::Category => &self.categories,
      Attribute::Asset => &self.assets,
    }
  }

  fn nested_mut(&mut self, attribute: Attribute) -> &mut BTreeMap<String, u64> {
    match attribute {
      Attribute::Country => &mut self.countries,
      Attribute::Category => &mut self.categories,
      Attribute::Asset => &mut self.assets,
    }
  }
}

// ─── Aggregation ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Aggregation {
  grain:   Grain,
  buckets: BTreeSet<DateTime<Utc>>,
  slots:   BTreeMap<SlotKey, Accumulator>,
  skipped: usize,
}

impl Aggregation {
  /// Seed a zero-valued accumulator for every bucket and every key the run
  /// tracks: `all`, the four verification levels, the top-ranked attribute
  /// keys and the selected composite pairs.
  pub fn seeded(grain: Grain, buckets: &[DateTime<Utc>], selection: &Selection) -> Self {
    let mut keys: Vec<(DimensionType, DimensionKey)> = vec![(DimensionType::All, DimensionKey::All)];
    keys.extend(
      VerificationLevel::iter()
        .map(|level| (DimensionType::Verification, DimensionKey::Level(level))),
    );
    for attribute in Attribute::iter() {
      keys.extend(
        selection
          .top_keys(attribute)
          .iter()
          .map(|key| (attribute.dimension(), DimensionKey::Plain(key.clone()))),
      );
    }
    for pair in Pair::iter() {
      keys.extend(
        selection
          .composite_keys(pair)
          .map(|(first, second)| (pair.dimension(), DimensionKey::composite(first, second))),
      );
    }

    let mut slots = BTreeMap::new();
    for &bucket in buckets {
      for (dimension, key) in &keys {
        slots.insert(
          SlotKey { bucket, dimension: *dimension, key: key.clone() },
          Accumulator::default(),
        );
      }
    }

    Self {
      grain,
      buckets: buckets.iter().copied().collect(),
      slots,
      skipped: 0,
    }
  }

  /// Fold one fact into every slot it belongs to. Returns `false` if the
  /// fact's bucket is outside the seeded window.
  pub fn apply(&mut self, fact: &Fact, selection: &Selection) -> bool {
    let bucket = self.grain.truncate(fact.occurred_at);
    if !self.buckets.contains(&bucket) {
      tracing::warn!(
        entity_id = %fact.entity_id,
        occurred_at = %fact.occurred_at,
        "fact falls outside the run window; skipping"
      );
      self.skipped += 1;
      return false;
    }

    let mut targets = vec![
      (DimensionType::All, DimensionKey::All),
      (DimensionType::Verification, DimensionKey::Level(fact.level)),
    ];

    for attribute in Attribute::iter() {
      for value in attribute.values(fact) {
        if selection.is_top(attribute, value) {
          targets.push((attribute.dimension(), DimensionKey::Plain(value.to_owned())));
        }
      }
    }

    for pair in Pair::iter() {
      let partners = pair.second().values(fact);
      for parent in pair.first().values(fact) {
        for &partner in &partners {
          if selection.is_partner(pair, parent, partner) {
            targets.push((pair.dimension(), DimensionKey::composite(parent, partner)));
          }
        }
      }
    }

    for (dimension, key) in targets {
      self
        .slots
        .entry(SlotKey { bucket, dimension, key })
        .or_default()
        .apply(fact);
    }
    true
  }

  pub fn grain(&self) -> Grain { self.grain }

  /// Number of facts rejected by [`Self::apply`].
  pub fn skipped(&self) -> usize { self.skipped }

  pub fn get(&self, key: &SlotKey) -> Option<&Accumulator> { self.slots.get(key) }

  pub fn len(&self) -> usize { self.slots.len() }

  pub fn is_empty(&self) -> bool { self.slots.is_empty() }

  pub fn into_slots(self) -> BTreeMap<SlotKey, Accumulator> { self.slots }
}
