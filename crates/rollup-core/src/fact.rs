//! Facts: one read-only snapshot per entity, taken as of its first
//! qualifying lifecycle event inside the run's window.
//!
//! Facts are built fresh by a [`crate::store::FactSource`] on every run and
//! are never persisted by the engine.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

// ─── Verification ────────────────────────────────────────────────────────────

/// How strongly an entity's listing has been verified.
///
/// Variants are declared from most to least privileged, so the derived `Ord`
/// sorts the most privileged level first.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumIter,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerificationLevel {
  Owner,
  Community,
  SelfReported,
  #[default]
  Unverified,
}

impl VerificationLevel {
  /// Priority rank; `0` is the most privileged.
  pub fn priority(self) -> u8 {
    match self {
      Self::Owner => 0,
      Self::Community => 1,
      Self::SelfReported => 2,
      Self::Unverified => 3,
    }
  }

  pub fn from_priority(priority: u8) -> Self {
    Self::iter()
      .find(|level| level.priority() == priority)
      .unwrap_or_default()
  }

  /// Decode a stored level string; unknown values fall back to the default.
  pub fn decode_lossy(s: &str) -> Self {
    s.trim().to_ascii_lowercase().parse().unwrap_or_default()
  }

  /// True for the top two privilege tiers.
  pub fn is_verified(self) -> bool {
    matches!(self, Self::Owner | Self::Community)
  }
}

// ─── Fact ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
  pub entity_id:     String,
  /// Timestamp of the entity's earliest qualifying event.
  pub occurred_at:   DateTime<Utc>,
  pub level:         VerificationLevel,
  pub country:       Option<String>,
  pub category:      Option<String>,
  pub accepting_any: bool,
  pub assets:        BTreeSet<String>,
}

impl Fact {
  /// A fact with every optional attribute absent.
  pub fn new(entity_id: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
    Self {
      entity_id: entity_id.into(),
      occurred_at,
      level: VerificationLevel::default(),
      country: None,
      category: None,
      accepting_any: false,
      assets: BTreeSet::new(),
    }
  }

  pub fn with_level(mut self, level: VerificationLevel) -> Self {
    self.level = level;
    self
  }

  pub fn with_country(mut self, country: Option<&str>) -> Self {
    self.country = normalize_attribute(country);
    self
  }

  pub fn with_category(mut self, category: Option<&str>) -> Self {
    self.category = normalize_attribute(category);
    self
  }

  pub fn with_accepting_any(mut self, accepting_any: bool) -> Self {
    self.accepting_any = accepting_any;
    self
  }

  /// Add asset symbols; blanks are dropped and duplicates collapse.
  pub fn with_assets<I, S>(mut self, assets: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    self.assets.extend(
      assets
        .into_iter()
        .filter_map(|a| normalize_attribute(Some(a.as_ref()))),
    );
    self
  }
}

/// Trim an optional attribute; empty strings are treated as absent.
pub fn normalize_attribute(value: Option<&str>) -> Option<String> {
  value
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .map(str::to_owned)
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn levels_order_most_privileged_first() {
    let mut levels: Vec<_> = VerificationLevel::iter().collect();
    levels.reverse();
    levels.sort();
    assert_eq!(levels.first(), Some(&VerificationLevel::Owner));
    assert_eq!(levels.last(), Some(&VerificationLevel::Unverified));
    assert_eq!(VerificationLevel::from_priority(1), VerificationLevel::Community);
    assert_eq!(VerificationLevel::from_priority(42), VerificationLevel::Unverified);
  }

  #[test]
  fn only_top_two_tiers_count_as_verified() {
    assert!(VerificationLevel::Owner.is_verified());
    assert!(VerificationLevel::Community.is_verified());
    assert!(!VerificationLevel::SelfReported.is_verified());
    assert!(!VerificationLevel::Unverified.is_verified());
  }

  #[test]
  fn level_strings_decode_lossily() {
    assert_eq!(VerificationLevel::decode_lossy(" Owner "), VerificationLevel::Owner);
    assert_eq!(
      VerificationLevel::decode_lossy("self_reported"),
      VerificationLevel::SelfReported
    );
    assert_eq!(VerificationLevel::decode_lossy("gold"), VerificationLevel::Unverified);
    assert_eq!(VerificationLevel::SelfReported.to_string(), "self_reported");
  }

  #[test]
  fn attributes_are_trimmed_and_blank_is_absent() {
    let t = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    let fact = Fact::new("e1", t)
      .with_country(Some("  US "))
      .with_category(Some("   "))
      .with_assets([" BTC", "", "ETH", "BTC "]);

    assert_eq!(fact.country.as_deref(), Some("US"));
    assert_eq!(fact.category, None);
    assert_eq!(fact.assets.iter().collect::<Vec<_>>(), ["BTC", "ETH"]);
  }
}
