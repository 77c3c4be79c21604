//! Unit systems and forecast request options

use crate::types::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit system requested from the forecast API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    /// Celsius, metres per second
    #[default]
    Metric,
    /// Fahrenheit, miles per hour
    Imperial,
    /// Kelvin, metres per second
    Standard,
}

impl UnitSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "imperial",
            UnitSystem::Standard => "standard",
        }
    }

    /// Label of temperatures returned under this system
    pub fn temperature_unit(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "°C",
            UnitSystem::Imperial => "°F",
            UnitSystem::Standard => "K",
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitSystem {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "metric" => Ok(UnitSystem::Metric),
            "imperial" => Ok(UnitSystem::Imperial),
            "standard" => Ok(UnitSystem::Standard),
            other => Err(ParseError::UnknownUnitSystem(other.to_string())),
        }
    }
}

/// Options passed along with every forecast request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastOptions {
    pub units: UnitSystem,
    /// Sections the API should leave out, e.g. `minutely`, `alerts`
    pub exclude: Vec<String>,
}

impl ForecastOptions {
    pub fn exclude_param(&self) -> String {
        self.exclude.join(",")
    }
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            units: UnitSystem::Metric,
            exclude: vec!["minutely".to_string(), "alerts".to_string()],
        }
    }
}
