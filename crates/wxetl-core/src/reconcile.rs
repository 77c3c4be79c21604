//! Reconciliation of freshly flattened rows against stored keys

use crate::types::{NormalizedRow, ParseError};
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Dedup key of a stored observation.
///
/// Timestamps are held as naive UTC truncated to whole seconds, the
/// granularity the warehouse stores. Both incoming rows and keys read back
/// from storage go through this constructor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    city: String,
    timestamp: NaiveDateTime,
}

impl RowKey {
    pub fn new(city: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            city: city.into(),
            timestamp: timestamp.trunc_subsecs(0),
        }
    }

    pub fn from_utc(city: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(city, timestamp.naive_utc())
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.city, self.timestamp)
    }
}

impl NormalizedRow {
    pub fn key(&self) -> RowKey {
        RowKey::from_utc(self.city.as_str(), self.timestamp)
    }
}

/// What happens when a new row's key is already stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Keep the stored row and skip the new one. Revised forecasts for an
    /// already stored key are therefore never written.
    #[default]
    KeepExisting,
    /// Replace the stored row with the new one
    ReplaceExisting,
}

impl FromStr for CollisionPolicy {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep_existing" | "skip" => Ok(CollisionPolicy::KeepExisting),
            "replace_existing" | "replace" => Ok(CollisionPolicy::ReplaceExisting),
            other => Err(ParseError::UnknownCollisionPolicy(other.to_string())),
        }
    }
}

/// Outcome of reconciling one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Rows whose key is not stored yet
    pub inserts: Vec<NormalizedRow>,
    /// Rows that should overwrite stored rows (only under `ReplaceExisting`)
    pub replacements: Vec<NormalizedRow>,
    /// Rows dropped because their key is already stored
    pub skipped_existing: usize,
    /// Rows dropped because an earlier row in the batch had the same key
    pub skipped_in_batch: usize,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.inserts.is_empty() && self.replacements.is_empty()
    }
}

/// Keyed set difference between a batch and stored keys
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    policy: CollisionPolicy,
}

impl Reconciler {
    pub fn new(policy: CollisionPolicy) -> Self {
        Self { policy }
    }

    /// Split `rows` into inserts and replacements.
    ///
    /// Within the batch the first row for a key wins; later duplicates are
    /// counted in `skipped_in_batch`.
    pub fn reconcile<'a, I>(&self, rows: Vec<NormalizedRow>, existing: I) -> Reconciliation
    where
        I: IntoIterator<Item = &'a RowKey>,
    {
        let stored: HashSet<&RowKey> = existing.into_iter().collect();
        let mut seen: HashSet<RowKey> = HashSet::with_capacity(rows.len());
        let mut outcome = Reconciliation::default();

        for row in rows {
            let key = row.key();
            if stored.contains(&key) {
                if !seen.insert(key) {
                    outcome.skipped_in_batch += 1;
                    continue;
                }
                match self.policy {
                    CollisionPolicy::KeepExisting => outcome.skipped_existing += 1,
                    CollisionPolicy::ReplaceExisting => outcome.replacements.push(row),
                }
            } else if seen.insert(key) {
                outcome.inserts.push(row);
            } else {
                outcome.skipped_in_batch += 1;
            }
        }

        outcome
    }
}

/// Rows of `rows` whose key is not in `existing`, keeping the stored value on collision
pub fn reconcile(rows: Vec<NormalizedRow>, existing: &[RowKey]) -> Vec<NormalizedRow> {
    Reconciler::default().reconcile(rows, existing).inserts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RowKind;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn row(city: &str, secs: i64, temp: f64) -> NormalizedRow {
        NormalizedRow {
            city: city.to_string(),
            kind: RowKind::Hourly,
            timestamp: ts(secs),
            temp_unified: temp,
            temp_actual: Some(temp),
            temp_day: None,
            temp_min: None,
            temp_max: None,
            temp_morn: None,
            temp_eve: None,
            temp_night: None,
            humidity: None,
            weather: None,
            wind_speed: None,
            wind_deg: None,
            wind_gust: 0.0,
            source_time: ts(0),
            daily_avg: None,
        }
    }

    fn key(city: &str, secs: i64) -> RowKey {
        RowKey::from_utc(city, ts(secs))
    }

    #[test]
    fn test_empty_storage_loads_everything() {
        let rows = vec![row("Toronto", 100, 1.0), row("Ottawa", 100, 2.0)];
        assert_eq!(reconcile(rows.clone(), &[]), rows);
    }

    #[test]
    fn test_set_difference() {
        let rows = vec![
            row("Toronto", 100, 1.0),
            row("Toronto", 200, 2.0),
            row("Ottawa", 100, 3.0),
        ];
        let existing = vec![key("Toronto", 100), key("Montreal", 200)];

        let delta = reconcile(rows, &existing);

        assert_eq!(delta.len(), 2);
        assert!(delta.iter().all(|r| !existing.contains(&r.key())));
        assert_eq!(delta[0].key(), key("Toronto", 200));
        assert_eq!(delta[1].key(), key("Ottawa", 100));
    }

    #[test]
    fn test_revised_value_keeps_stored_row() {
        let outcome = Reconciler::default().reconcile(
            vec![row("Toronto", 100, 99.0)],
            &[key("Toronto", 100)],
        );
        assert!(outcome.is_noop());
        assert_eq!(outcome.skipped_existing, 1);
    }

    #[test]
    fn test_replace_policy_returns_replacements() {
        let outcome = Reconciler::new(CollisionPolicy::ReplaceExisting).reconcile(
            vec![row("Toronto", 100, 99.0), row("Toronto", 200, 1.0)],
            &[key("Toronto", 100)],
        );
        assert_eq!(outcome.replacements.len(), 1);
        assert_eq!(outcome.replacements[0].temp_unified, 99.0);
        assert_eq!(outcome.inserts.len(), 1);
        assert_eq!(outcome.skipped_existing, 0);
    }

    #[test]
    fn test_within_batch_duplicates_keep_first() {
        let outcome = Reconciler::default().reconcile(
            vec![
                row("Toronto", 100, 1.0),
                row("Toronto", 100, 2.0),
                row("Toronto", 300, 3.0),
                row("Toronto", 300, 4.0),
            ],
            &[key("Toronto", 300)],
        );
        assert_eq!(outcome.inserts.len(), 1);
        assert_eq!(outcome.inserts[0].temp_unified, 1.0);
        assert_eq!(outcome.skipped_existing, 1);
        assert_eq!(outcome.skipped_in_batch, 2);
    }

    #[test]
    fn test_keys_normalize_subseconds() {
        let stored = RowKey::new(
            "Toronto",
            DateTime::from_timestamp(100, 0).unwrap().naive_utc(),
        );
        let incoming = RowKey::from_utc("Toronto", DateTime::from_timestamp(100, 250_000_000).unwrap());
        assert_eq!(stored, incoming);
    }

    #[test]
    fn test_city_is_part_of_key() {
        let delta = reconcile(vec![row("Ottawa", 100, 1.0)], &[key("Toronto", 100)]);
        assert_eq!(delta.len(), 1);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "keep_existing".parse::<CollisionPolicy>(),
            Ok(CollisionPolicy::KeepExisting)
        );
        assert_eq!(
            "REPLACE_EXISTING".parse::<CollisionPolicy>(),
            Ok(CollisionPolicy::ReplaceExisting)
        );
        assert!("upsert".parse::<CollisionPolicy>().is_err());
    }
}
