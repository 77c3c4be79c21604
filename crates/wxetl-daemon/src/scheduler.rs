//! Batch scheduling: one shot or a batch per interval

use anyhow::{Context, Result};
use chrono::{SubsecRound, Utc};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use wxetl_core::{BatchReport, Pipeline};

pub struct Scheduler {
    pipeline: Pipeline,
    interval: Option<Duration>,
}

impl Scheduler {
    pub fn new(pipeline: Pipeline, interval: Option<Duration>) -> Self {
        Self { pipeline, interval }
    }

    /// Run one batch stamped with the current time, whole seconds
    pub async fn run_once(&self) -> Result<BatchReport> {
        let batch_time = Utc::now().trunc_subsecs(0);

        let report = self
            .pipeline
            .run_batch(batch_time)
            .await
            .context("Batch failed")?;

        let units = self.pipeline.settings().forecast.units;
        info!(
            batch_time = %batch_time,
            units = %units,
            temperature_unit = units.temperature_unit(),
            cities_loaded = report.cities_loaded,
            cities_requested = report.cities_requested,
            skipped = ?report.skipped_cities,
            extracted = report.rows_extracted,
            inserted = report.rows_inserted,
            replaced = report.rows_replaced,
            skipped_existing = report.rows_skipped_existing,
            skipped_in_batch = report.rows_skipped_in_batch,
            table_created = report.table_created,
            "Batch complete"
        );
        Ok(report)
    }

    /// Single batch without an interval; otherwise loop forever
    pub async fn run(&self) -> Result<()> {
        let Some(period) = self.interval else {
            self.run_once().await?;
            return Ok(());
        };

        info!("Scheduler started, period {}s", period.as_secs());
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once().await {
                // next tick retries
                error!("{:#}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wxetl_core::{
        CollisionPolicy, Coordinates, Extractor, ForecastOptions, LoadMode, PipelineSettings,
        RawObservation, TableRef,
    };
    use wxetl_sinks::MemoryWarehouse;

    struct OneCity;

    #[async_trait::async_trait]
    impl Extractor for OneCity {
        async fn geocode(&self, city: &str) -> Result<Option<Coordinates>> {
            Ok((city == "Toronto").then(|| Coordinates {
                city: city.to_string(),
                lat: 43.7,
                lon: -79.4,
            }))
        }

        async fn fetch_forecast(
            &self,
            _coordinates: &Coordinates,
            _options: &ForecastOptions,
        ) -> Result<RawObservation> {
            Ok(serde_json::from_str(
                r#"{"current":{"dt":1700000000,"temp":20},"hourly":[{"dt":1700003600,"temp":21}]}"#,
            )?)
        }
    }

    fn scheduler(cities: &[&str]) -> Scheduler {
        let settings = PipelineSettings {
            cities: cities.iter().map(|c| c.to_string()).collect(),
            forecast: ForecastOptions::default(),
            table: TableRef::new(None, "WeatherDataClean").unwrap(),
            load_mode: LoadMode::Incremental,
            collision: CollisionPolicy::KeepExisting,
        };
        let pipeline = Pipeline::new(Box::new(OneCity), Box::new(MemoryWarehouse::new()), settings);
        Scheduler::new(pipeline, None)
    }

    #[tokio::test]
    async fn run_once_reports_batch() {
        let scheduler = scheduler(&["Toronto"]);

        let first = scheduler.run_once().await.unwrap();
        assert_eq!(first.rows_inserted, 2);
        let second = scheduler.run_once().await.unwrap();
        assert_eq!(second.rows_inserted, 0);
        assert_eq!(second.rows_skipped_existing, 2);
    }

    #[tokio::test]
    async fn single_shot_fails_on_empty_batch() {
        let scheduler = scheduler(&["Atlantis"]);
        let err = scheduler.run().await.unwrap_err();
        assert!(format!("{:#}", err).contains("No rows extracted"));
    }
}
