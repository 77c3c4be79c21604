//! SQL warehouse backends for the weather table
//!
//! MySQL and SQLite through sqlx. The table layout is generated from the
//! canonical column list in `wxetl-core`; there are no migrations beyond
//! creating the table when it is absent.

use thiserror::Error;

/// Rows per multi-row INSERT; 18 columns keeps this under SQLite's bind limit
pub const ROWS_PER_INSERT: usize = 50;

/// Bind one row's values in canonical column order
macro_rules! push_row {
    ($builder:expr, $row:expr) => {{
        let row = $row;
        $builder
            .push_bind(row.city.clone())
            .push_bind(row.kind.as_str())
            .push_bind(row.key().timestamp())
            .push_bind(row.temp_unified)
            .push_bind(row.temp_actual)
            .push_bind(row.temp_day)
            .push_bind(row.temp_min)
            .push_bind(row.temp_max)
            .push_bind(row.temp_morn)
            .push_bind(row.temp_eve)
            .push_bind(row.temp_night)
            .push_bind(row.humidity)
            .push_bind(row.weather.clone())
            .push_bind(row.wind_speed)
            .push_bind(row.wind_deg)
            .push_bind(row.wind_gust)
            .push_bind(row.source_time.naive_utc())
            .push_bind(row.daily_avg);
    }};
}

pub mod client;
pub mod queries;
pub mod schema;

pub use client::*;
pub use schema::*;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

pub type DbResult<T> = Result<T, DbError>;
