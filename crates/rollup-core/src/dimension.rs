//! Dimension types and keys.
//!
//! Keys stay structured for the whole pipeline. The `first::second` string
//! form of a composite key exists only on persisted rows and is never parsed
//! back.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use crate::fact::{Fact, VerificationLevel};

/// Joins the two parts of a composite dimension key.
pub const COMPOSITE_SEPARATOR: &str = "::";

// ─── Dimension types ─────────────────────────────────────────────────────────

/// The axis along which facts are grouped for a rollup row.
#[derive(
  Debug,
  Clone,
  Copy,
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
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DimensionType {
  All,
  Verification,
  Country,
  Category,
  Asset,
  CountryCategory,
  CountryAsset,
  CategoryAsset,
}

/// A fact attribute that can be ranked and paired.
#[derive(
  Debug,
  Clone,
  Copy,
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
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Attribute {
  Country,
  Category,
  Asset,
}

impl Attribute {
  pub fn dimension(self) -> DimensionType {
    match self {
      Self::Country => DimensionType::Country,
      Self::Category => DimensionType::Category,
      Self::Asset => DimensionType::Asset,
    }
  }

  /// The values a fact carries for this attribute. Country and category
  /// yield at most one; a fact may accept several assets.
  pub fn values(self, fact: &Fact) -> Vec<&str> {
    match self {
      Self::Country => fact.country.as_deref().into_iter().collect(),
      Self::Category => fact.category.as_deref().into_iter().collect(),
      Self::Asset => fact.assets.iter().map(String::as_str).collect(),
    }
  }
}

/// An ordered attribute pair with its own composite dimension type.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, AsRefStr, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum Pair {
  CountryCategory,
  CountryAsset,
  CategoryAsset,
}

impl Pair {
  pub fn first(self) -> Attribute {
    match self {
      Self::CountryCategory | Self::CountryAsset => Attribute::Country,
      Self::CategoryAsset => Attribute::Category,
    }
  }

  pub fn second(self) -> Attribute {
    match self {
      Self::CountryCategory => Attribute::Category,
      Self::CountryAsset | Self::CategoryAsset => Attribute::Asset,
    }
  }

  pub fn dimension(self) -> DimensionType {
    match self {
      Self::CountryCategory => DimensionType::CountryCategory,
      Self::CountryAsset => DimensionType::CountryAsset,
      Self::CategoryAsset => DimensionType::CategoryAsset,
    }
  }
}

// ─── Dimension keys ──────────────────────────────────────────────────────────

/// The key of a rollup row within its dimension type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DimensionKey {
  /// The single key of the `all` dimension.
  All,
  Level(VerificationLevel),
  Plain(String),
  Composite { first: String, second: String },
}

impl DimensionKey {
  pub fn composite(first: &str, second: &str) -> Self {
    Self::Composite { first: first.to_owned(), second: second.to_owned() }
  }
}

impl fmt::Display for DimensionKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::All => f.write_str("all"),
      Self::Level(level) => f.write_str(level.as_ref()),
      Self::Plain(key) => f.write_str(key),
      Self::Composite { first, second } => {
        write!(f, "{first}{COMPOSITE_SEPARATOR}{second}")
      }
    }
  }
}

impl Serialize for DimensionKey {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}
