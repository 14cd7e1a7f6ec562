//! Top-N dimension ranking and composite partner selection.
//!
//! Both selections are made once per run over every loaded fact, not per
//! bucket, so a key is either tracked for the whole window or not at all.

use std::collections::{BTreeMap, HashMap};

use strum::IntoEnumIterator;

use crate::{
  dimension::{Attribute, Pair},
  fact::Fact,
};

/// Order `(key, count)` entries by count descending, then key ascending, and
/// keep the first `limit`.
pub fn rank_counts<K: Ord>(
  counts: impl IntoIterator<Item = (K, u64)>,
  limit: usize,
) -> Vec<(K, u64)> {
  let mut ranked: Vec<(K, u64)> = counts.into_iter().collect();
  ranked.sort_by(|(ka, ca), (kb, cb)| cb.cmp(ca).then_with(|| ka.cmp(kb)));
  ranked.truncate(limit);
  ranked
}

// ─── Selection ───────────────────────────────────────────────────────────────

/// The keys tracked for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
  /// Top-ranked keys per attribute, best first.
  top:        BTreeMap<Attribute, Vec<String>>,
  /// Partner keys per pair and top-ranked parent, best first.
  composites: BTreeMap<Pair, BTreeMap<String, Vec<String>>>,
}

impl Selection {
  pub fn top_keys(&self, attribute: Attribute) -> &[String] {
    self.top.get(&attribute).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn is_top(&self, attribute: Attribute, key: &str) -> bool {
    self.top_keys(attribute).iter().any(|k| k == key)
  }

  /// Partner keys selected for `parent`, which must be top-ranked in the
  /// pair's first attribute.
  pub fn partners(&self, pair: Pair, parent: &str) -> &[String] {
    self
      .composites
      .get(&pair)
      .and_then(|by_parent| by_parent.get(parent))
      .map(Vec::as_slice)
      .unwrap_or_default()
  }

  pub fn is_partner(&self, pair: Pair, parent: &str, partner: &str) -> bool {
    self.partners(pair, parent).iter().any(|k| k == partner)
  }

  /// Every selected `(parent, partner)` for `pair`.
  pub fn composite_keys(&self, pair: Pair) -> impl Iterator<Item = (&str, &str)> {
    self.composites.get(&pair).into_iter().flat_map(|by_parent| {
      by_parent.iter().flat_map(|(parent, partners)| {
        partners.iter().map(move |p| (parent.as_str(), p.as_str()))
      })
    })
  }
}

// ─── Ranking ─────────────────────────────────────────────────────────────────

/// Select the `top_n` most frequent keys of every attribute across `facts`.
pub fn rank_dimensions(facts: &[Fact], top_n: usize) -> Selection {
  let mut selection = Selection::default();

  for attribute in Attribute::iter() {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for fact in facts {
      for value in attribute.values(fact) {
        *counts.entry(value).or_default() += 1;
      }
    }

    let keys = rank_counts(counts, top_n)
      .into_iter()
      .map(|(key, _)| key.to_owned())
      .collect();
    selection.top.insert(attribute, keys);
  }

  selection
}

/// For every pair and every top-ranked parent key, keep up to `limit` of the
/// partner keys that co-occur with it most often. Partners need not be
/// top-ranked themselves.
pub fn select_composites(facts: &[Fact], selection: &mut Selection, limit: usize) {
  for pair in Pair::iter() {
    let mut counts: BTreeMap<&str, HashMap<&str, u64>> = BTreeMap::new();

    for fact in facts {
      let partners = pair.second().values(fact);
      for parent in pair.first().values(fact) {
        if !selection.is_top(pair.first(), parent) {
          continue;
        }
        let entry = counts.entry(parent).or_default();
        for &partner in &partners {
          *entry.entry(partner).or_default() += 1;
        }
      }
    }

    let by_parent = counts
      .into_iter()
      .map(|(parent, partner_counts)| {
        let partners = rank_counts(partner_counts, limit)
          .into_iter()
          .map(|(key, _)| key.to_owned())
          .collect();
        (parent.to_owned(), partners)
      })
      .collect();
    selection.composites.insert(pair, by_parent);
  }
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};

  use super::*;

  fn fact(id: &str, country: &str, category: &str, assets: &[&str]) -> Fact {
    Fact::new(id, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
      .with_country(Some(country))
      .with_category(Some(category))
      .with_assets(assets.iter().copied())
  }

  #[test]
  fn rank_counts_breaks_ties_by_key() {
    let ranked = rank_counts([("b", 2), ("c", 5), ("a", 2), ("d", 1)], 3);
    assert_eq!(ranked, [("c", 5), ("a", 2), ("b", 2)]);
  }

  #[test]
  fn top_n_is_global_and_bounded() {
    let facts = vec![
      fact("1", "US", "cafe", &["BTC"]),
      fact("2", "US", "cafe", &["BTC", "ETH"]),
      fact("3", "DE", "retail", &["ETH"]),
      fact("4", "FR", "retail", &["LTC"]),
      fact("5", "AT", "bar", &[]),
    ];

    let selection = rank_dimensions(&facts, 2);

    assert_eq!(selection.top_keys(Attribute::Country), ["US", "AT"]);
    assert_eq!(selection.top_keys(Attribute::Category), ["cafe", "retail"]);
    assert_eq!(selection.top_keys(Attribute::Asset), ["BTC", "ETH"]);
    assert!(!selection.is_top(Attribute::Country, "DE"));
  }

  #[test]
  fn absent_attributes_are_not_ranked() {
    let facts = vec![Fact::new("1", Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())];
    let selection = rank_dimensions(&facts, 10);
    assert!(selection.top_keys(Attribute::Country).is_empty());
    assert!(selection.top_keys(Attribute::Asset).is_empty());
  }

  #[test]
  fn composites_are_bounded_per_parent() {
    let mut facts = Vec::new();
    for (i, category) in ["a", "b", "c", "d", "e", "f", "g"].iter().enumerate() {
      facts.push(fact(&format!("us{i}"), "US", category, &[]));
    }
    facts.push(fact("us-extra", "US", "g", &[]));
    facts.push(fact("de", "DE", "z", &[]));

    let mut selection = rank_dimensions(&facts, 1);
    select_composites(&facts, &mut selection, 5);

    // Only US is top-ranked, so DE gets no composite partners.
    assert_eq!(selection.partners(Pair::CountryCategory, "US"), ["g", "a", "b", "c", "d"]);
    assert!(selection.partners(Pair::CountryCategory, "DE").is_empty());
    // Partners need not be top-ranked categories themselves.
    assert!(selection.is_partner(Pair::CountryCategory, "US", "a"));
    assert!(!selection.is_top(Attribute::Category, "a"));
  }

  #[test]
  fn asset_composites_count_every_asset() {
    let facts = vec![
      fact("1", "US", "cafe", &["BTC", "ETH"]),
      fact("2", "US", "shop", &["BTC"]),
    ];
    let mut selection = rank_dimensions(&facts, 10);
    select_composites(&facts, &mut selection, 10);

    assert_eq!(selection.partners(Pair::CountryAsset, "US"), ["BTC", "ETH"]);
    assert_eq!(selection.partners(Pair::CategoryAsset, "cafe"), ["BTC", "ETH"]);
    let keys: Vec<_> = selection.composite_keys(Pair::CategoryAsset).collect();
    assert_eq!(keys, [("cafe", "BTC"), ("cafe", "ETH"), ("shop", "BTC")]);
  }
}
