//! Extract, flatten, reconcile and load one batch of cities

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

use crate::flatten::flatten;
use crate::payload::RawObservation;
use crate::reconcile::{CollisionPolicy, Reconciler, Reconciliation, RowKey};
use crate::types::{NormalizedRow, ParseError, TableRef};
use crate::units::ForecastOptions;

/// Geocoded location of a configured city
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// City label as configured
    pub city: String,
    pub lat: f64,
    pub lon: f64,
}

/// Upstream weather API
#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
    /// Look up a city; `Ok(None)` when the API knows no such place
    async fn geocode(&self, city: &str) -> Result<Option<Coordinates>>;

    async fn fetch_forecast(
        &self,
        coordinates: &Coordinates,
        options: &ForecastOptions,
    ) -> Result<RawObservation>;
}

/// Destination table store
#[async_trait::async_trait]
pub trait Warehouse: Send + Sync {
    fn name(&self) -> &str;

    async fn table_exists(&self, table: &TableRef) -> Result<bool>;

    async fn read_existing_keys(&self, table: &TableRef) -> Result<Vec<RowKey>>;

    /// Create the table and write the first rows
    async fn create_table(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()>;

    async fn append_rows(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()>;

    /// Overwrite stored rows sharing a key with `rows`
    async fn replace_rows(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()>;

    async fn drop_table(&self, table: &TableRef) -> Result<()>;

    /// Swap the table's contents for `rows`.
    ///
    /// The default drops then creates, so a failed create leaves no table.
    /// Backends that can stage the new table first override this.
    async fn recreate_table(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()> {
        self.drop_table(table).await?;
        self.create_table(table, rows).await
    }
}

/// How a batch is written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Append rows whose key is not stored yet
    #[default]
    Incremental,
    /// Drop the table and recreate it from this batch
    Replace,
}

impl FromStr for LoadMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "incremental" | "append" => Ok(LoadMode::Incremental),
            "replace" => Ok(LoadMode::Replace),
            other => Err(ParseError::UnknownLoadMode(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("No rows extracted for any of {cities} configured cities")]
    EmptyBatch { cities: usize },

    #[error("Storage unavailable while trying to {operation} {table}")]
    Storage {
        operation: &'static str,
        table: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub cities: Vec<String>,
    pub forecast: ForecastOptions,
    pub table: TableRef,
    pub load_mode: LoadMode,
    pub collision: CollisionPolicy,
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub cities_requested: usize,
    pub cities_loaded: usize,
    pub skipped_cities: Vec<String>,
    pub rows_extracted: usize,
    pub rows_inserted: usize,
    pub rows_replaced: usize,
    pub rows_skipped_existing: usize,
    pub rows_skipped_in_batch: usize,
    pub table_created: bool,
}

/// Drives one batch through extractor and warehouse
pub struct Pipeline {
    extractor: Box<dyn Extractor>,
    warehouse: Box<dyn Warehouse>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        extractor: Box<dyn Extractor>,
        warehouse: Box<dyn Warehouse>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            extractor,
            warehouse,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn warehouse(&self) -> &dyn Warehouse {
        self.warehouse.as_ref()
    }

    /// Run one batch stamped with `batch_time`
    #[instrument(skip(self), fields(table = %self.settings.table))]
    pub async fn run_batch(&self, batch_time: DateTime<Utc>) -> PipelineResult<BatchReport> {
        let mut report = BatchReport {
            cities_requested: self.settings.cities.len(),
            ..Default::default()
        };

        let rows = self.extract(batch_time, &mut report).await;
        if rows.is_empty() {
            return Err(PipelineError::EmptyBatch {
                cities: report.cities_requested,
            });
        }
        report.rows_extracted = rows.len();
        info!(
            "Extracted {} rows from {}/{} cities",
            report.rows_extracted, report.cities_loaded, report.cities_requested
        );

        match self.settings.load_mode {
            LoadMode::Incremental => self.load_incremental(rows, &mut report).await?,
            LoadMode::Replace => self.load_replace(rows, &mut report).await?,
        }

        Ok(report)
    }

    async fn extract(
        &self,
        batch_time: DateTime<Utc>,
        report: &mut BatchReport,
    ) -> Vec<NormalizedRow> {
        let mut rows = Vec::new();

        for city in &self.settings.cities {
            match self.extract_city(city).await {
                Some(payload) => {
                    let city_rows = flatten(city, &payload, batch_time);
                    debug!(city = %city, rows = city_rows.len(), "Flattened payload");
                    report.cities_loaded += 1;
                    rows.extend(city_rows);
                }
                None => report.skipped_cities.push(city.clone()),
            }
        }

        rows
    }

    /// Geocode and fetch one city; failures are logged and yield `None`
    async fn extract_city(&self, city: &str) -> Option<RawObservation> {
        let coordinates = match self.extractor.geocode(city).await {
            Ok(Some(coordinates)) => coordinates,
            Ok(None) => {
                warn!(city, "Geocoding returned no match, skipping city");
                return None;
            }
            Err(e) => {
                warn!(city, error = %e, "Geocoding failed, skipping city");
                return None;
            }
        };

        match self
            .extractor
            .fetch_forecast(&coordinates, &self.settings.forecast)
            .await
        {
            Ok(payload) => {
                if payload.is_empty() {
                    warn!(city, "Forecast payload has no current, hourly or daily section");
                }
                Some(payload)
            }
            Err(e) => {
                warn!(city, error = %e, "Forecast fetch failed, skipping city");
                None
            }
        }
    }

    async fn load_incremental(
        &self,
        rows: Vec<NormalizedRow>,
        report: &mut BatchReport,
    ) -> PipelineResult<()> {
        let table = &self.settings.table;
        let reconciler = Reconciler::new(self.settings.collision);

        let exists = self
            .warehouse
            .table_exists(table)
            .await
            .map_err(|e| self.storage_error("check existence of", e))?;

        if !exists {
            let outcome = reconciler.reconcile(rows, std::iter::empty());
            record(report, &outcome);
            self.warehouse
                .create_table(table, &outcome.inserts)
                .await
                .map_err(|e| self.storage_error("create", e))?;
            report.table_created = true;
            info!("Created {} with {} rows", table, outcome.inserts.len());
            return Ok(());
        }

        let existing = self
            .warehouse
            .read_existing_keys(table)
            .await
            .map_err(|e| self.storage_error("read keys from", e))?;
        debug!("{} keys already stored", existing.len());

        let outcome = reconciler.reconcile(rows, &existing);
        record(report, &outcome);
        if outcome.is_noop() {
            info!(
                "Nothing new for {}: {} rows already stored",
                table, report.rows_skipped_existing
            );
            return Ok(());
        }

        if !outcome.inserts.is_empty() {
            self.warehouse
                .append_rows(table, &outcome.inserts)
                .await
                .map_err(|e| self.storage_error("append to", e))?;
        }
        if !outcome.replacements.is_empty() {
            self.warehouse
                .replace_rows(table, &outcome.replacements)
                .await
                .map_err(|e| self.storage_error("replace rows in", e))?;
        }

        info!(
            "Loaded {}: {} inserted, {} replaced, {} already stored, {} duplicate in batch",
            table,
            report.rows_inserted,
            report.rows_replaced,
            report.rows_skipped_existing,
            report.rows_skipped_in_batch
        );
        Ok(())
    }

    async fn load_replace(
        &self,
        rows: Vec<NormalizedRow>,
        report: &mut BatchReport,
    ) -> PipelineResult<()> {
        let table = &self.settings.table;
        let outcome = Reconciler::default().reconcile(rows, std::iter::empty());
        record(report, &outcome);

        self.warehouse
            .recreate_table(table, &outcome.inserts)
            .await
            .map_err(|e| self.storage_error("recreate", e))?;
        report.table_created = true;

        info!("Replaced {} with {} rows", table, outcome.inserts.len());
        Ok(())
    }

    fn storage_error(&self, operation: &'static str, source: anyhow::Error) -> PipelineError {
        PipelineError::Storage {
            operation,
            table: self.settings.table.to_string(),
            source,
        }
    }
}

fn record(report: &mut BatchReport, outcome: &Reconciliation) {
    report.rows_inserted = outcome.inserts.len();
    report.rows_replaced = outcome.replacements.len();
    report.rows_skipped_existing = outcome.skipped_existing;
    report.rows_skipped_in_batch = outcome.skipped_in_batch;
}
