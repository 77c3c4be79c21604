//! Daemon configuration: TOML file plus environment overrides

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;
use wxetl_config::{AppConfig, ConfigError};
use wxetl_core::PipelineSettings;
use wxetl_extract::OpenWeatherSettings;

/// Where the batch is loaded
#[derive(Debug, Clone, PartialEq)]
pub enum WarehouseTarget {
    /// `mysql://…`, `sqlite:…`, `jsonl://<dir>` or `memory://`
    Url(String),
    /// MySQL assembled from individual settings
    MySql {
        host: String,
        port: u16,
        database: String,
        username: Option<String>,
        password: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub openweather: OpenWeatherSettings,
    pub pipeline: PipelineSettings,
    pub target: WarehouseTarget,

    /// Batch period; `None` runs a single batch and exits
    pub interval: Option<Duration>,

    pub log_format: String,
    pub log_filter: Option<String>,
}

impl DaemonConfig {
    /// Load `$WXETL_CONFIG` and apply `OPENWEATHER_API_KEY` / `DATABASE_URL`
    pub fn from_env() -> Result<Self> {
        let app = AppConfig::load().context("Failed to load configuration file")?;
        Self::from_app(app, |name| env::var(name).ok())
    }

    /// Build from a parsed file, reading overrides through `lookup`
    pub fn from_app<F>(app: AppConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = non_blank("OPENWEATHER_API_KEY")
            .or_else(|| app.api_key())
            .ok_or(ConfigError::Missing("openweather.api_key"))?;

        if app.cities().is_empty() {
            return Err(ConfigError::Missing("cities").into());
        }

        let wh = app.warehouse();
        let target = match non_blank("DATABASE_URL").or(wh.url) {
            Some(url) => WarehouseTarget::Url(url),
            None => match wh.database {
                Some(database) => WarehouseTarget::MySql {
                    host: wh.host.unwrap_or_else(|| "localhost".to_string()),
                    port: wh.port.unwrap_or(3306),
                    database,
                    username: wh.username,
                    password: wh.password,
                },
                None => return Err(ConfigError::Missing("warehouse.url").into()),
            },
        };

        let pipeline = PipelineSettings {
            cities: app.cities().to_vec(),
            forecast: app.forecast_options()?,
            table: app.table()?,
            load_mode: app.load_mode()?,
            collision: app.collision_policy()?,
        };

        let openweather = OpenWeatherSettings {
            api_key,
            geo_url: app.geo_url(),
            onecall_url: app.onecall_url(),
            country: app.country(),
            timeout: app.request_timeout(),
        };

        Ok(Self {
            openweather,
            pipeline,
            target,
            interval: app.run_interval(),
            log_format: app.log_format(),
            log_filter: app.log_filter(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wxetl_core::{CollisionPolicy, LoadMode};

    fn app(toml: &str) -> AppConfig {
        toml::from_str(toml).unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    const BASE: &str = r#"
cities = ["Toronto", "Montreal"]

[openweather]
api_key = "from-file"
country = "CA"

[warehouse]
url = "sqlite://weather.db"
"#;

    #[test]
    fn test_config_defaults() {
        let config = DaemonConfig::from_app(app(BASE), no_env).unwrap();

        assert_eq!(config.openweather.api_key, "from-file");
        assert_eq!(config.openweather.country.as_deref(), Some("CA"));
        assert_eq!(config.pipeline.cities, vec!["Toronto", "Montreal"]);
        assert_eq!(config.pipeline.table.to_string(), "WeatherDataClean");
        assert_eq!(config.pipeline.load_mode, LoadMode::Incremental);
        assert_eq!(config.pipeline.collision, CollisionPolicy::KeepExisting);
        assert_eq!(
            config.target,
            WarehouseTarget::Url("sqlite://weather.db".to_string())
        );
        assert_eq!(config.interval, None);
        assert_eq!(config.log_format, "pretty");
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("OPENWEATHER_API_KEY", "from-env"),
            ("DATABASE_URL", "mysql://u:p@db/weather"),
        ]
        .into_iter()
        .collect();
        let config =
            DaemonConfig::from_app(app(BASE), |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.openweather.api_key, "from-env");
        assert_eq!(
            config.target,
            WarehouseTarget::Url("mysql://u:p@db/weather".to_string())
        );
    }

    #[test]
    fn test_mysql_from_parts() {
        let config = DaemonConfig::from_app(
            app(r#"
cities = ["Toronto"]

[openweather]
api_key = "k"

[warehouse]
host = "db.internal"
database = "weather"
username = "etl"
"#),
            no_env,
        )
        .unwrap();

        assert_eq!(
            config.target,
            WarehouseTarget::MySql {
                host: "db.internal".to_string(),
                port: 3306,
                database: "weather".to_string(),
                username: Some("etl".to_string()),
                password: None,
            }
        );
    }

    #[test]
    fn test_missing_settings_are_rejected() {
        let no_key = DaemonConfig::from_app(app("cities = [\"Toronto\"]"), no_env).unwrap_err();
        assert!(no_key.to_string().contains("api_key"));

        let no_cities = DaemonConfig::from_app(
            app("[openweather]\napi_key = \"k\"\n[warehouse]\nurl = \"memory://\"\n"),
            no_env,
        )
        .unwrap_err();
        assert!(no_cities.to_string().contains("cities"));

        let no_target = DaemonConfig::from_app(
            app("cities = [\"Toronto\"]\n[openweather]\napi_key = \"k\"\n"),
            no_env,
        )
        .unwrap_err();
        assert!(no_target.to_string().contains("warehouse"));
    }
}
