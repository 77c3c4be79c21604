use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use wxetl_core::{
    CollisionPolicy, ForecastOptions, LoadMode, ParseError, TableRef, UnitSystem,
};

pub const DEFAULT_GEO_URL: &str = "https://api.openweathermap.org/geo/1.0/direct";
pub const DEFAULT_ONECALL_URL: &str = "https://api.openweathermap.org/data/3.0/onecall";
pub const DEFAULT_TABLE: &str = "WeatherDataClean";
pub const DEFAULT_EXCLUDE: &str = "minutely,alerts";
pub const DEFAULT_COUNTRY: &str = "CA";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpenWeatherConfig {
    pub api_key: Option<String>,
    pub geo_url: Option<String>,
    pub onecall_url: Option<String>,
    /// Appended to geocoding queries, e.g. "CA" for `Toronto,CA`; "" disables it
    pub country: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    pub units: Option<String>,
    /// Comma separated One Call sections to leave out
    pub exclude: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WarehouseConfig {
    /// `mysql://…`, `sqlite://…` or `jsonl://<dir>`
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub schema: Option<String>,
    pub table: Option<String>,
    pub load_mode: Option<String>,
    pub on_collision: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunConfig {
    /// Repeat the batch every N seconds; unset runs a single batch
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// `json` or `pretty`
    pub format: Option<String>,
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub cities: Vec<String>,
    pub openweather: Option<OpenWeatherConfig>,
    pub api: Option<ApiConfig>,
    pub warehouse: Option<WarehouseConfig>,
    pub run: Option<RunConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid setting: {0}")]
    Invalid(#[from] ParseError),
    #[error("Missing setting: {0}")]
    Missing(&'static str),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl AppConfig {
    /// Load configuration from WXETL_CONFIG path (TOML) if present, with reasonable defaults
    pub fn load() -> ConfigResult<Self> {
        let path = std::env::var("WXETL_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from(path)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let cfg = if path.exists() {
            let s = fs::read_to_string(path)?;
            toml::from_str::<AppConfig>(&s)?
        } else {
            AppConfig::default()
        };
        Ok(cfg)
    }

    pub fn cities(&self) -> &[String] {
        &self.cities
    }

    pub fn api_key(&self) -> Option<String> {
        self.openweather
            .as_ref()
            .and_then(|o| o.api_key.clone())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn geo_url(&self) -> String {
        self.openweather
            .as_ref()
            .and_then(|o| o.geo_url.clone())
            .unwrap_or_else(|| DEFAULT_GEO_URL.to_string())
    }

    pub fn onecall_url(&self) -> String {
        self.openweather
            .as_ref()
            .and_then(|o| o.onecall_url.clone())
            .unwrap_or_else(|| DEFAULT_ONECALL_URL.to_string())
    }

    /// Geocoding country qualifier (default `CA`, blank for none)
    pub fn country(&self) -> Option<String> {
        let country = self
            .openweather
            .as_ref()
            .and_then(|o| o.country.as_deref())
            .unwrap_or(DEFAULT_COUNTRY)
            .trim();
        (!country.is_empty()).then(|| country.to_string())
    }

    /// Per-request HTTP timeout (default 30s)
    pub fn request_timeout(&self) -> Duration {
        let secs = self
            .openweather
            .as_ref()
            .and_then(|o| o.timeout_secs)
            .unwrap_or(30);
        Duration::from_secs(secs)
    }

    pub fn units(&self) -> ConfigResult<UnitSystem> {
        match self.api.as_ref().and_then(|a| a.units.as_deref()) {
            Some(units) => Ok(units.parse()?),
            None => Ok(UnitSystem::default()),
        }
    }

    pub fn exclude(&self) -> Vec<String> {
        self.api
            .as_ref()
            .and_then(|a| a.exclude.as_deref())
            .unwrap_or(DEFAULT_EXCLUDE)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn forecast_options(&self) -> ConfigResult<ForecastOptions> {
        Ok(ForecastOptions {
            units: self.units()?,
            exclude: self.exclude(),
        })
    }

    pub fn warehouse(&self) -> WarehouseConfig {
        self.warehouse.clone().unwrap_or_default()
    }

    /// Destination table (default `WeatherDataClean`, no schema)
    pub fn table(&self) -> ConfigResult<TableRef> {
        let wh = self.warehouse.as_ref();
        let schema = wh.and_then(|w| w.schema.as_deref());
        let name = wh
            .and_then(|w| w.table.as_deref())
            .unwrap_or(DEFAULT_TABLE);
        Ok(TableRef::new(schema, name)?)
    }

    pub fn load_mode(&self) -> ConfigResult<LoadMode> {
        match self.warehouse.as_ref().and_then(|w| w.load_mode.as_deref()) {
            Some(mode) => Ok(mode.parse()?),
            None => Ok(LoadMode::default()),
        }
    }

    pub fn collision_policy(&self) -> ConfigResult<CollisionPolicy> {
        match self.warehouse.as_ref().and_then(|w| w.on_collision.as_deref()) {
            Some(policy) => Ok(policy.parse()?),
            None => Ok(CollisionPolicy::default()),
        }
    }

    pub fn run_interval(&self) -> Option<Duration> {
        self.run
            .as_ref()
            .and_then(|r| r.interval_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn log_format(&self) -> String {
        self.logging
            .as_ref()
            .and_then(|l| l.format.clone())
            .unwrap_or_else(|| "pretty".to_string())
    }

    pub fn log_filter(&self) -> Option<String> {
        self.logging.as_ref().and_then(|l| l.filter.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.units().unwrap(), UnitSystem::Metric);
        assert_eq!(cfg.exclude(), vec!["minutely", "alerts"]);
        assert_eq!(cfg.table().unwrap().to_string(), "WeatherDataClean");
        assert_eq!(cfg.load_mode().unwrap(), LoadMode::Incremental);
        assert_eq!(cfg.collision_policy().unwrap(), CollisionPolicy::KeepExisting);
        assert_eq!(cfg.geo_url(), DEFAULT_GEO_URL);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.run_interval(), None);
        assert_eq!(cfg.api_key(), None);
        assert_eq!(cfg.country().as_deref(), Some("CA"));
        assert!(cfg.cities().is_empty());
    }

    #[test]
    fn country_qualifier_can_be_changed_or_disabled() {
        let us: AppConfig = toml::from_str("[openweather]\ncountry = \"US\"\n").unwrap();
        assert_eq!(us.country().as_deref(), Some("US"));

        let none: AppConfig = toml::from_str("[openweather]\ncountry = \"\"\n").unwrap();
        assert_eq!(none.country(), None);
    }

    #[test]
    fn parses_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wxetl.toml");
        std::fs::write(
            &path,
            r#"
cities = ["Toronto", "Ottawa"]

[openweather]
api_key = "abc123"
country = "CA"
timeout_secs = 10

[api]
units = "imperial"
exclude = "minutely, alerts ,current"

[warehouse]
url = "sqlite://weather.db"
schema = "main"
table = "Weather"
load_mode = "replace"
on_collision = "replace_existing"

[run]
interval_secs = 3600

[logging]
format = "json"
"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.cities(), ["Toronto", "Ottawa"]);
        assert_eq!(cfg.api_key().as_deref(), Some("abc123"));
        assert_eq!(cfg.country().as_deref(), Some("CA"));
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));

        let forecast = cfg.forecast_options().unwrap();
        assert_eq!(forecast.units, UnitSystem::Imperial);
        assert_eq!(forecast.exclude_param(), "minutely,alerts,current");

        assert_eq!(cfg.table().unwrap().to_string(), "main.Weather");
        assert_eq!(cfg.load_mode().unwrap(), LoadMode::Replace);
        assert_eq!(cfg.collision_policy().unwrap(), CollisionPolicy::ReplaceExisting);
        assert_eq!(cfg.run_interval(), Some(Duration::from_secs(3600)));
        assert_eq!(cfg.log_format(), "json");
        assert_eq!(cfg.warehouse().url.as_deref(), Some("sqlite://weather.db"));
    }

    #[test]
    fn rejects_bad_values() {
        let cfg: AppConfig = toml::from_str(
            r#"
[api]
units = "kelvin"

[warehouse]
table = "weather data"
"#,
        )
        .unwrap();
        assert!(matches!(cfg.units(), Err(ConfigError::Invalid(_))));
        assert!(matches!(cfg.table(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn blank_api_key_is_unset() {
        let cfg: AppConfig = toml::from_str("[openweather]\napi_key = \"  \"\n").unwrap();
        assert_eq!(cfg.api_key(), None);
    }
}
