//! Flattening of nested forecast payloads into warehouse rows

use crate::payload::{RawObservation, RawRecord};
use crate::types::{NormalizedRow, RowKind};
use chrono::{DateTime, Utc};
use tracing::warn;

/// Fallbacks applied when a record omits a field.
///
/// One table for all three sections: `dt` falls back to the batch time,
/// `wind_gust` to zero, every other optional field stays null.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDefaults {
    pub batch_time: DateTime<Utc>,
    pub wind_gust: f64,
}

impl FieldDefaults {
    pub fn new(batch_time: DateTime<Utc>) -> Self {
        Self {
            batch_time,
            wind_gust: 0.0,
        }
    }

    /// Resolve a record timestamp; the flag is set when the batch time stood in
    pub fn timestamp(&self, dt: Option<i64>) -> (DateTime<Utc>, bool) {
        match dt.and_then(|secs| DateTime::from_timestamp(secs, 0)) {
            Some(ts) => (ts, false),
            None => (self.batch_time, true),
        }
    }

    pub fn wind_gust(&self, gust: Option<f64>) -> f64 {
        gust.unwrap_or(self.wind_gust)
    }
}

/// Flatten one city's payload into rows.
///
/// Rows come out as current, hourly, daily, each section in input order.
/// Records without a derivable unified temperature are dropped.
pub fn flatten(city: &str, payload: &RawObservation, batch_time: DateTime<Utc>) -> Vec<NormalizedRow> {
    let defaults = FieldDefaults::new(batch_time);

    let current = payload
        .current
        .iter()
        .map(|record| (RowKind::Current, record));
    let hourly = payload
        .hourly
        .iter()
        .flatten()
        .map(|record| (RowKind::Hourly, record));
    let daily = payload
        .daily
        .iter()
        .flatten()
        .map(|record| (RowKind::Daily, record));

    current
        .chain(hourly)
        .chain(daily)
        .filter_map(|(kind, record)| build_row(city, kind, record, &defaults))
        .collect()
}

fn build_row(
    city: &str,
    kind: RowKind,
    record: &RawRecord,
    defaults: &FieldDefaults,
) -> Option<NormalizedRow> {
    let (temp_actual, parts) = if kind.is_scalar() {
        (record.temp.scalar(), None)
    } else {
        (None, record.temp.composite().cloned())
    };
    let parts = parts.unwrap_or_default();
    let daily_avg = if kind.is_scalar() { None } else { parts.average() };

    let temp_unified = match kind {
        RowKind::Current | RowKind::Hourly => temp_actual?,
        RowKind::Daily => daily_avg.or(parts.max)?,
    };

    let (timestamp, synthesized) = defaults.timestamp(record.dt);
    if synthesized {
        warn!(
            city,
            section = %kind,
            dt = ?record.dt,
            "record has no usable dt, using batch time"
        );
    }

    Some(NormalizedRow {
        city: city.to_string(),
        kind,
        timestamp,
        temp_unified,
        temp_actual,
        temp_day: parts.day,
        temp_min: parts.min,
        temp_max: parts.max,
        temp_morn: parts.morn,
        temp_eve: parts.eve,
        temp_night: parts.night,
        humidity: record.humidity,
        weather: record.description.clone(),
        wind_speed: record.wind_speed,
        wind_deg: record.wind_deg,
        wind_gust: defaults.wind_gust(record.wind_gust),
        source_time: defaults.batch_time,
        daily_avg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_100_000, 0).unwrap()
    }

    fn payload(value: serde_json::Value) -> RawObservation {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_current_passthrough() {
        let rows = flatten(
            "Toronto",
            &payload(json!({
                "current": {"dt": 1700000000, "temp": 20, "humidity": 50, "weather": [{"description": "ok"}]}
            })),
            batch_time(),
        );

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.city, "Toronto");
        assert_eq!(row.kind, RowKind::Current);
        assert_eq!(row.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(row.temp_actual, Some(20.0));
        assert_eq!(row.temp_unified, 20.0);
        assert_eq!(row.humidity, Some(50.0));
        assert_eq!(row.weather.as_deref(), Some("ok"));
        assert_eq!(row.wind_gust, 0.0);
        assert_eq!(row.daily_avg, None);
        assert_eq!(row.temp_max, None);
        assert_eq!(row.source_time, batch_time());
    }

    #[test]
    fn test_daily_schema_completeness() {
        let rows = flatten(
            "Toronto",
            &payload(json!({
                "daily": [{
                    "dt": 1700086400,
                    "temp": {"day": 25, "min": 18, "max": 27, "night": 20, "eve": 23, "morn": 19},
                    "humidity": 55,
                    "wind_gust": 7.5
                }]
            })),
            batch_time(),
        );

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.kind, RowKind::Daily);
        assert_eq!(row.temp_day, Some(25.0));
        assert_eq!(row.temp_min, Some(18.0));
        assert_eq!(row.temp_max, Some(27.0));
        assert_eq!(row.temp_night, Some(20.0));
        assert_eq!(row.temp_eve, Some(23.0));
        assert_eq!(row.temp_morn, Some(19.0));
        assert_eq!(row.temp_actual, None);

        let avg = row.daily_avg.unwrap();
        assert!((avg - 20.67).abs() < 0.01);
        assert_eq!(row.temp_unified, avg);
        assert_eq!(row.wind_gust, 7.5);
    }

    #[test]
    fn test_daily_falls_back_to_max() {
        let rows = flatten(
            "Toronto",
            &payload(json!({"daily": [{"dt": 1700086400, "temp": {"max": 27}}]})),
            batch_time(),
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].daily_avg, None);
        assert_eq!(rows[0].temp_unified, 27.0);
    }

    #[test]
    fn test_rows_without_temperature_are_dropped() {
        let rows = flatten(
            "Toronto",
            &payload(json!({
                "current": {"dt": 1700000000},
                "hourly": [
                    {"dt": 1700003600, "temp": "n/a"},
                    {"dt": 1700007200, "temp": {"day": 20}},
                    {"dt": 1700010800, "temp": 18.5}
                ],
                "daily": [
                    {"dt": 1700086400, "temp": {"day": 25, "min": 18}},
                    {"dt": 1700172800, "temp": 21}
                ]
            })),
            batch_time(),
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, RowKind::Hourly);
        assert_eq!(rows[0].temp_unified, 18.5);
    }

    #[test]
    fn test_section_order_is_preserved() {
        let rows = flatten(
            "Toronto",
            &payload(json!({
                "daily": [{"dt": 3, "temp": {"max": 1}}, {"dt": 4, "temp": {"max": 2}}],
                "hourly": [{"dt": 2, "temp": 5}, {"dt": 1, "temp": 6}],
                "current": {"dt": 0, "temp": 7}
            })),
            batch_time(),
        );

        let order: Vec<(RowKind, i64)> = rows
            .iter()
            .map(|r| (r.kind, r.timestamp.timestamp()))
            .collect();
        assert_eq!(
            order,
            vec![
                (RowKind::Current, 0),
                (RowKind::Hourly, 2),
                (RowKind::Hourly, 1),
                (RowKind::Daily, 3),
                (RowKind::Daily, 4),
            ]
        );
    }

    #[test]
    fn test_missing_dt_uses_batch_time() {
        let rows = flatten(
            "Toronto",
            &payload(json!({"hourly": [{"temp": 12}, {"dt": "garbage", "temp": 13}]})),
            batch_time(),
        );

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.timestamp == batch_time()));
    }

    #[test]
    fn test_missing_weather_list_is_null() {
        let rows = flatten(
            "Toronto",
            &payload(json!({"current": {"dt": 1700000000, "temp": 3}})),
            batch_time(),
        );
        assert_eq!(rows[0].weather, None);
    }

    #[test]
    fn test_empty_payload_yields_no_rows() {
        assert!(flatten("Toronto", &RawObservation::default(), batch_time()).is_empty());
    }

    #[test]
    fn test_deterministic_for_fixed_batch_time() {
        let raw = payload(json!({
            "current": {"dt": 1700000000, "temp": 20},
            "hourly": [{"temp": 21}]
        }));
        assert_eq!(
            flatten("Toronto", &raw, batch_time()),
            flatten("Toronto", &raw, batch_time())
        );
    }

    #[test]
    fn test_field_defaults() {
        let defaults = FieldDefaults::new(batch_time());

        let (ts, synthesized) = defaults.timestamp(Some(1_700_000_000));
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert!(!synthesized);

        assert_eq!(defaults.timestamp(None), (batch_time(), true));
        assert_eq!(defaults.timestamp(Some(i64::MAX)), (batch_time(), true));

        assert_eq!(defaults.wind_gust(None), 0.0);
        assert_eq!(defaults.wind_gust(Some(7.5)), 7.5);
    }
}
