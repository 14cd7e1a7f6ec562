//! Grains, windows and buckets.
//!
//! All arithmetic is in UTC. Every boundary produced here is aligned to the
//! grain's natural boundary: top of the hour, midnight, or Monday 00:00 for
//! ISO weeks.

use chrono::{
  DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike,
  Utc,
};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use crate::{Error, Result};

// ─── Grain ───────────────────────────────────────────────────────────────────

/// The bucket size of a rollup run.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Grain {
  Hour,
  Day,
  Week,
}

impl Grain {
  /// Parse `hour`, `day` or `week`.
  pub fn parse(s: &str) -> Result<Self> {
    s.trim()
      .parse()
      .map_err(|_| Error::InvalidGrain(s.to_owned()))
  }

  /// The width of one bucket.
  pub fn step(self) -> TimeDelta {
    match self {
      Self::Hour => TimeDelta::hours(1),
      Self::Day => TimeDelta::days(1),
      Self::Week => TimeDelta::weeks(1),
    }
  }

  /// Truncate `t` to the start of the bucket that contains it.
  pub fn truncate(self, t: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = t.date_naive().and_time(NaiveTime::MIN).and_utc();
    match self {
      Self::Hour => midnight + TimeDelta::hours(i64::from(t.hour())),
      Self::Day => midnight,
      Self::Week => {
        let back = t.weekday().num_days_from_monday();
        midnight - TimeDelta::days(i64::from(back))
      }
    }
  }

  /// Maximum number of composite partner keys kept per top-ranked parent.
  pub fn composite_limit(self) -> usize {
    match self {
      Self::Hour => 5,
      Self::Day | Self::Week => 10,
    }
  }

  /// Maximum number of nested entries per list in a breakdown payload.
  pub fn breakdown_limit(self) -> usize {
    match self {
      Self::Hour => 10,
      Self::Day | Self::Week => 20,
    }
  }
}

// ─── Window ──────────────────────────────────────────────────────────────────

/// A half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>,
}

impl Window {
  pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
    Self { start, end }
  }

  pub fn contains(&self, t: DateTime<Utc>) -> bool {
    self.start <= t && t < self.end
  }
}

// ─── Anchor ──────────────────────────────────────────────────────────────────

/// An explicit position for a run, in place of the "most recent" default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
  /// Start of an hour bucket.
  Hour(DateTime<Utc>),
  /// A calendar day.
  Day(NaiveDate),
  /// Any day of the target ISO week; truncated to its Monday.
  Week(NaiveDate),
}

impl Anchor {
  /// Parse an anchor string for `grain`.
  ///
  /// Hour anchors accept RFC 3339 as well as `YYYY-MM-DDTHH[:MM]` (read as
  /// UTC). Day and week anchors are `YYYY-MM-DD`.
  pub fn parse(grain: Grain, s: &str) -> Result<Self> {
    let s = s.trim();
    let invalid = |reason: String| Error::InvalidAnchor {
      grain: grain.into(),
      value: s.to_owned(),
      reason,
    };

    match grain {
      Grain::Hour => {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
          return Ok(Self::Hour(dt.with_timezone(&Utc)));
        }
        let padded = if s.len() == 13 { format!("{s}:00") } else { s.to_owned() };
        NaiveDateTime::parse_from_str(&padded, "%Y-%m-%dT%H:%M")
          .map(|naive| Self::Hour(naive.and_utc()))
          .map_err(|e| invalid(e.to_string()))
      }
      Grain::Day => NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(Self::Day)
        .map_err(|e| invalid(e.to_string())),
      Grain::Week => NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(Self::Week)
        .map_err(|e| invalid(e.to_string())),
    }
  }

  fn kind(&self) -> &'static str {
    match self {
      Self::Hour(_) => "hour",
      Self::Day(_) => "day",
      Self::Week(_) => "week",
    }
  }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Compute the window for a run.
///
/// Without an anchor, hourly runs cover the `since_hours` hours ending at the
/// next hour boundary (so the current partial hour is included), while daily
/// and weekly runs cover the most recently completed day or ISO week.
pub fn resolve_window(
  grain: Grain,
  anchor: Option<Anchor>,
  since_hours: u32,
  now: DateTime<Utc>,
) -> Result<Window> {
  let step = grain.step();

  let start = match (grain, anchor) {
    (Grain::Hour, Some(Anchor::Hour(t))) => grain.truncate(t),
    (Grain::Hour, None) => {
      let end = hour_ceiling(now);
      return Ok(Window::new(end - TimeDelta::hours(i64::from(since_hours)), end));
    }
    (Grain::Day, Some(Anchor::Day(date))) => midnight(date),
    (Grain::Day, None) => grain.truncate(now) - step,
    (Grain::Week, Some(Anchor::Week(date))) => grain.truncate(midnight(date)),
    (Grain::Week, None) => grain.truncate(now) - step,
    (_, Some(other)) => {
      return Err(Error::AnchorGrainMismatch {
        anchor: other.kind(),
        grain:  grain.into(),
      });
    }
  };

  Ok(Window::new(start, start + step))
}

/// Enumerate bucket starts from `window.start` (inclusive) to `window.end`
/// (exclusive), one grain step apart.
pub fn buckets(window: &Window, grain: Grain) -> Vec<DateTime<Utc>> {
  let step = grain.step();
  let mut out = Vec::new();
  let mut cursor = window.start;
  while cursor < window.end {
    out.push(cursor);
    cursor += step;
  }
  out
}

fn hour_ceiling(now: DateTime<Utc>) -> DateTime<Utc> {
  let floor = Grain::Hour.truncate(now);
  if floor == now { now } else { floor + TimeDelta::hours(1) }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
  date.and_time(NaiveTime::MIN).and_utc()
}
