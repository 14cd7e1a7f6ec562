//! The read side: probing the host schema and loading facts.

use rollup_core::{
  fact::{Fact, VerificationLevel},
  store::FactSource,
  window::Window,
};
use strum::IntoEnumIterator as _;

use crate::{
  Error, Result,
  encode::{RawFact, encode_dt},
  schema::{table_columns, table_exists},
  store::SqliteStore,
};

/// Lifecycle actions that count as an entity "going live".
pub const QUALIFYING_ACTIONS: &[&str] = &["publish", "approve", "verify"];

const EVENTS_TABLE: &str = "entity_events";
const ENTITIES_TABLE: &str = "entities";
const VERIFICATIONS_TABLE: &str = "entity_verifications";
const ACCEPTANCES_TABLE: &str = "entity_acceptances";

/// Which optional sources the database can answer from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceCapabilities {
  /// `entity_verifications` exists with a `level` column.
  pub verifications:      bool,
  /// `entity_acceptances` exists with an `asset` column.
  pub acceptances:        bool,
  /// `entity_acceptances` also has a `network` column.
  pub acceptance_network: bool,
}

// ─── Query composition ───────────────────────────────────────────────────────

fn level_expr(caps: &SourceCapabilities) -> String {
  if !caps.verifications {
    return "NULL".into();
  }
  let arms: String = VerificationLevel::iter()
    .filter(|level| *level != VerificationLevel::default())
    .map(|level| format!("WHEN '{level}' THEN {} ", level.priority()))
    .collect();
  format!(
    "(SELECT MIN(CASE LOWER(TRIM(v.level)) {arms}ELSE {} END)
        FROM entity_verifications v
       WHERE v.entity_id = f.entity_id)",
    VerificationLevel::default().priority(),
  )
}

fn accepting_any_expr(caps: &SourceCapabilities) -> &'static str {
  match (caps.acceptances, caps.acceptance_network) {
    (false, _) => "0",
    (true, false) => {
      "EXISTS (SELECT 1 FROM entity_acceptances a
                WHERE a.entity_id = f.entity_id
                  AND TRIM(COALESCE(a.asset, '')) <> '')"
    }
    (true, true) => {
      "EXISTS (SELECT 1 FROM entity_acceptances a
                WHERE a.entity_id = f.entity_id
                  AND (TRIM(COALESCE(a.asset, '')) <> ''
                       OR TRIM(COALESCE(a.network, '')) <> ''))"
    }
  }
}

fn assets_expr(caps: &SourceCapabilities) -> &'static str {
  if !caps.acceptances {
    return "'[]'";
  }
  "(SELECT json_group_array(DISTINCT TRIM(a.asset))
      FROM entity_acceptances a
     WHERE a.entity_id = f.entity_id
       AND TRIM(COALESCE(a.asset, '')) <> '')"
}

/// Stored event times rewritten to the canonical `encode_dt` form, so text
/// comparison against the bound window matches time order. Offsets are
/// shifted to UTC and fractional seconds dropped; unparseable values become
/// NULL and never qualify.
const CANONICAL_OCCURRED_AT: &str = "strftime('%Y-%m-%dT%H:%M:%SZ', occurred_at)";

/// Build the single fact query. Binds `?1` = window start, `?2` = window end,
/// then one parameter per qualifying action.
fn fact_query(caps: &SourceCapabilities) -> String {
  let actions = (0..QUALIFYING_ACTIONS.len())
    .map(|i| format!("?{}", i + 3))
    .collect::<Vec<_>>()
    .join(", ");

  format!(
    "WITH qualifying AS (
       SELECT entity_id, {CANONICAL_OCCURRED_AT} AS at
         FROM entity_events
        WHERE action IN ({actions})
     ),
     first_events AS (
       SELECT entity_id, MIN(at) AS first_at
         FROM qualifying
        WHERE at < ?2
        GROUP BY entity_id
     )
     SELECT CAST(f.entity_id AS TEXT) AS id,
            f.first_at,
            e.country,
            e.category,
            {level},
            {accepting},
            {assets}
       FROM first_events f
       LEFT JOIN entities e ON e.entity_id = f.entity_id
      WHERE f.first_at >= ?1
      ORDER BY f.first_at, id",
    level = level_expr(caps),
    accepting = accepting_any_expr(caps),
    assets = assets_expr(caps),
  )
}

// ─── FactSource ──────────────────────────────────────────────────────────────

impl FactSource for SqliteStore {
  type Error = Error;
  type Capabilities = SourceCapabilities;

  async fn probe(&self) -> Result<SourceCapabilities> {
    let (events, entities, verifications, acceptances) = self
      .conn
      .call(|conn| {
        Ok((
          table_exists(conn, EVENTS_TABLE)?,
          table_exists(conn, ENTITIES_TABLE)?,
          table_columns(conn, VERIFICATIONS_TABLE)?,
          table_columns(conn, ACCEPTANCES_TABLE)?,
        ))
      })
      .await?;

    if !events {
      return Err(Error::MissingSourceTable(EVENTS_TABLE));
    }
    if !entities {
      return Err(Error::MissingSourceTable(ENTITIES_TABLE));
    }

    let has = |cols: &[String], name: &str| cols.iter().any(|c| c.eq_ignore_ascii_case(name));
    let caps = SourceCapabilities {
      verifications:      has(&verifications, "level"),
      acceptances:        has(&acceptances, "asset"),
      acceptance_network: has(&acceptances, "asset") && has(&acceptances, "network"),
    };

    if !caps.verifications {
      tracing::warn!("{VERIFICATIONS_TABLE} unavailable; every entity counts as unverified");
    }
    if !caps.acceptances {
      tracing::warn!("{ACCEPTANCES_TABLE} unavailable; acceptance counts will be zero");
    }
    tracing::debug!(?caps, "probed source capabilities");
    Ok(caps)
  }

  async fn load_facts<'a>(
    &'a self,
    window: &'a Window,
    capabilities: &'a SourceCapabilities,
  ) -> Result<Vec<Fact>> {
    let sql = fact_query(capabilities);
    let mut params = vec![encode_dt(window.start), encode_dt(window.end)];
    params.extend(QUALIFYING_ACTIONS.iter().map(|a| (*a).to_owned()));

    let raws: Vec<RawFact> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), |r| {
            Ok(RawFact {
              entity_id:      r.get(0)?,
              first_at:       r.get(1)?,
              country:        r.get(2)?,
              category:       r.get(3)?,
              level_priority: r.get(4)?,
              accepting_any:  r.get(5)?,
              assets_json:    r.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let facts = raws.into_iter().map(RawFact::into_fact).collect::<Result<Vec<_>>>()?;
    tracing::debug!(
      start = %window.start,
      end = %window.end,
      count = facts.len(),
      "loaded facts"
    );
    Ok(facts)
  }
}
