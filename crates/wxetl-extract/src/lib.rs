//! Forecast extraction from the OpenWeather APIs
//!
//! Provides the [`wxetl_core::Extractor`] used by the pipeline: city
//! geocoding and One Call forecast retrieval over HTTP.

pub mod client;

pub use client::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("API key not configured")]
    NoApiKey,

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("HTTP request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} answered with status {status}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },

    #[error("Invalid response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type ExtractResult<T> = Result<T, ExtractError>;
