//! Core data types for normalized weather rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error raised when a textual setting or identifier cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Unknown row type: {0}")]
    UnknownRowKind(String),

    #[error("Unknown unit system: {0}")]
    UnknownUnitSystem(String),

    #[error("Unknown load mode: {0}")]
    UnknownLoadMode(String),

    #[error("Unknown collision policy: {0}")]
    UnknownCollisionPolicy(String),

    #[error("Invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),
}

/// Forecast section a row was flattened from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    Current,
    Hourly,
    Daily,
}

impl RowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowKind::Current => "current",
            RowKind::Hourly => "hourly",
            RowKind::Daily => "daily",
        }
    }

    /// Current and hourly records carry a scalar temperature
    pub fn is_scalar(&self) -> bool {
        !matches!(self, RowKind::Daily)
    }
}

impl fmt::Display for RowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RowKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "current" => Ok(RowKind::Current),
            "hourly" => Ok(RowKind::Hourly),
            "daily" => Ok(RowKind::Daily),
            other => Err(ParseError::UnknownRowKind(other.to_string())),
        }
    }
}

/// One flattened observation in the warehouse schema.
///
/// Field order is the canonical column order, see [`Column::ALL`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub city: String,

    #[serde(rename = "type")]
    pub kind: RowKind,

    pub timestamp: DateTime<Utc>,

    /// The single temperature consumers should use
    pub temp_unified: f64,

    /// Scalar temperature (current/hourly only)
    pub temp_actual: Option<f64>,

    // Daily decomposition
    pub temp_day: Option<f64>,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub temp_morn: Option<f64>,
    pub temp_eve: Option<f64>,
    pub temp_night: Option<f64>,

    pub humidity: Option<f64>,
    pub weather: Option<String>,
    pub wind_speed: Option<f64>,
    pub wind_deg: Option<f64>,
    pub wind_gust: f64,

    /// Batch time the row was produced
    pub source_time: DateTime<Utc>,

    /// Mean of morn/eve/night (daily only)
    pub daily_avg: Option<f64>,
}

/// Storage type family of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Timestamp,
    Float,
}

/// Warehouse columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    City,
    Type,
    Timestamp,
    TempUnified,
    TempActual,
    TempDay,
    TempMin,
    TempMax,
    TempMorn,
    TempEve,
    TempNight,
    Humidity,
    Weather,
    WindSpeed,
    WindDeg,
    WindGust,
    SourceTime,
    DailyAvg,
}

impl Column {
    /// Canonical column order for table creation and inserts
    pub const ALL: [Column; 18] = [
        Column::City,
        Column::Type,
        Column::Timestamp,
        Column::TempUnified,
        Column::TempActual,
        Column::TempDay,
        Column::TempMin,
        Column::TempMax,
        Column::TempMorn,
        Column::TempEve,
        Column::TempNight,
        Column::Humidity,
        Column::Weather,
        Column::WindSpeed,
        Column::WindDeg,
        Column::WindGust,
        Column::SourceTime,
        Column::DailyAvg,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Column::City => "city",
            Column::Type => "type",
            Column::Timestamp => "timestamp",
            Column::TempUnified => "temp_unified",
            Column::TempActual => "temp_actual",
            Column::TempDay => "temp_day",
            Column::TempMin => "temp_min",
            Column::TempMax => "temp_max",
            Column::TempMorn => "temp_morn",
            Column::TempEve => "temp_eve",
            Column::TempNight => "temp_night",
            Column::Humidity => "humidity",
            Column::Weather => "weather",
            Column::WindSpeed => "wind_speed",
            Column::WindDeg => "wind_deg",
            Column::WindGust => "wind_gust",
            Column::SourceTime => "source_time",
            Column::DailyAvg => "daily_avg",
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::City | Column::Type | Column::Weather => ColumnKind::Text,
            Column::Timestamp | Column::SourceTime => ColumnKind::Timestamp,
            _ => ColumnKind::Float,
        }
    }

    pub fn is_nullable(&self) -> bool {
        !matches!(
            self,
            Column::City
                | Column::Type
                | Column::Timestamp
                | Column::TempUnified
                | Column::WindGust
                | Column::SourceTime
        )
    }
}

/// Destination table, optionally qualified by a schema
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    schema: Option<String>,
    name: String,
}

impl TableRef {
    pub fn new(schema: Option<&str>, name: &str) -> Result<Self, ParseError> {
        let schema = match schema {
            Some(s) => Some(validate_identifier(s)?),
            None => None,
        };
        Ok(Self {
            schema,
            name: validate_identifier(name)?,
        })
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Identifiers are interpolated into SQL, so only `[A-Za-z_][A-Za-z0-9_]*` is accepted
fn validate_identifier(ident: &str) -> Result<String, ParseError> {
    let mut chars = ident.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(ident.to_string())
    } else {
        Err(ParseError::InvalidIdentifier(ident.to_string()))
    }
}
