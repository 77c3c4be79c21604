//! wxetl - weather forecast ETL
//!
//! Pulls OpenWeather forecasts for the configured cities, flattens them into
//! one row schema and loads the rows not yet stored into the warehouse.

use anyhow::{Context, Result};
use tracing::info;

use wxetl_core::Pipeline;
use wxetl_daemon::{open_warehouse, DaemonConfig, Scheduler};
use wxetl_extract::OpenWeatherClient;
use wxetl_obs::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let config = DaemonConfig::from_env()?;

    wxetl_obs::init(
        "wxetl",
        LogFormat::parse(&config.log_format),
        config.log_filter.as_deref(),
    );

    info!(
        cities = config.pipeline.cities.len(),
        table = %config.pipeline.table,
        load_mode = ?config.pipeline.load_mode,
        "Starting wxetl"
    );

    let extractor =
        OpenWeatherClient::new(config.openweather.clone()).context("Invalid API settings")?;
    let warehouse = open_warehouse(&config.target).await?;
    let pipeline = Pipeline::new(Box::new(extractor), warehouse, config.pipeline.clone());
    let scheduler = Scheduler::new(pipeline, config.interval);

    tokio::select! {
        result = scheduler.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    info!("wxetl stopped");
    Ok(())
}
