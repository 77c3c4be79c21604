//! Raw forecast payload as returned by the One Call API
//!
//! Every field is decoded leniently: a malformed value becomes `None`
//! instead of failing the whole payload.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Forecast payload for one city
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawObservation {
    #[serde(default)]
    pub current: Option<RawRecord>,

    #[serde(default)]
    pub hourly: Option<Vec<RawRecord>>,

    #[serde(default)]
    pub daily: Option<Vec<RawRecord>>,
}

impl RawObservation {
    pub fn is_empty(&self) -> bool {
        self.current.is_none()
            && self.hourly.as_ref().map_or(true, Vec::is_empty)
            && self.daily.as_ref().map_or(true, Vec::is_empty)
    }
}

/// A single current, hourly or daily entry
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawRecord {
    /// Unix epoch seconds
    #[serde(default, deserialize_with = "lenient_epoch")]
    pub dt: Option<i64>,

    #[serde(default)]
    pub temp: Temperature,

    #[serde(default, deserialize_with = "lenient_number")]
    pub humidity: Option<f64>,

    /// Description of the first `weather` entry
    #[serde(default, rename = "weather", deserialize_with = "first_description")]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub wind_speed: Option<f64>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub wind_deg: Option<f64>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub wind_gust: Option<f64>,
}

/// Temperature as delivered: a number for current/hourly, an object for daily
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Temperature {
    Scalar(f64),
    Composite(DailyTemperatures),
    #[default]
    Absent,
}

impl Temperature {
    pub fn scalar(&self) -> Option<f64> {
        match self {
            Temperature::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn composite(&self) -> Option<&DailyTemperatures> {
        match self {
            Temperature::Composite(parts) => Some(parts),
            _ => None,
        }
    }
}

/// Parts of a daily temperature object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyTemperatures {
    pub day: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub night: Option<f64>,
    pub eve: Option<f64>,
    pub morn: Option<f64>,
}

impl DailyTemperatures {
    /// Mean of morn, eve and night, skipping missing parts
    pub fn average(&self) -> Option<f64> {
        let parts: Vec<f64> = [self.morn, self.eve, self.night]
            .into_iter()
            .flatten()
            .collect();
        if parts.is_empty() {
            return None;
        }
        Some(parts.iter().sum::<f64>() / parts.len() as f64)
    }
}

impl<'de> Deserialize<'de> for Temperature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match &value {
            Value::Object(map) => {
                let part = |key: &str| map.get(key).and_then(coerce_number);
                Temperature::Composite(DailyTemperatures {
                    day: part("day"),
                    min: part("min"),
                    max: part("max"),
                    night: part("night"),
                    eve: part("eve"),
                    morn: part("morn"),
                })
            }
            other => match coerce_number(other) {
                Some(v) => Temperature::Scalar(v),
                None => Temperature::Absent,
            },
        })
    }
}

/// Parse-or-null: JSON numbers and numeric strings, anything else is `None`
pub fn coerce_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Epoch seconds, truncating fractional values
pub fn coerce_epoch(value: &Value) -> Option<i64> {
    if let Value::Number(n) = value {
        if let Some(secs) = n.as_i64() {
            return Some(secs);
        }
    }
    coerce_number(value)
        .filter(|v| *v >= i64::MIN as f64 && *v <= i64::MAX as f64)
        .map(|v| v.trunc() as i64)
}

fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_number(&value))
}

fn lenient_epoch<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_epoch(&value))
}

fn first_description<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_array()
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.get("description"))
        .and_then(Value::as_str)
        .map(str::to_string))
}
