//! HTTP client for OpenWeather geocoding and One Call

use crate::{ExtractError, ExtractResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;
use wxetl_core::{Coordinates, Extractor, ForecastOptions, RawObservation};

/// Connection settings for [`OpenWeatherClient`]
#[derive(Debug, Clone)]
pub struct OpenWeatherSettings {
    pub api_key: String,
    pub geo_url: String,
    pub onecall_url: String,
    /// Qualifier appended to geocoding queries (`Toronto,CA`)
    pub country: Option<String>,
    pub timeout: Duration,
}

/// One entry of the geocoding response
#[derive(Debug, Clone, Deserialize)]
struct GeoMatch {
    lat: f64,
    lon: f64,
}

pub struct OpenWeatherClient {
    client: Client,
    settings: OpenWeatherSettings,
}

impl OpenWeatherClient {
    pub fn new(settings: OpenWeatherSettings) -> ExtractResult<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(ExtractError::NoApiKey);
        }
        Url::parse(&settings.geo_url)?;
        Url::parse(&settings.onecall_url)?;

        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|source| ExtractError::Http {
                endpoint: "client builder".to_string(),
                source,
            })?;
        Ok(Self { client, settings })
    }

    pub fn geocode_url(&self, city: &str) -> ExtractResult<Url> {
        let query = match &self.settings.country {
            Some(country) => format!("{},{}", city, country),
            None => city.to_string(),
        };
        let url = Url::parse_with_params(
            &self.settings.geo_url,
            &[
                ("q", query.as_str()),
                ("limit", "1"),
                ("appid", self.settings.api_key.as_str()),
            ],
        )?;
        Ok(url)
    }

    pub fn forecast_url(
        &self,
        coordinates: &Coordinates,
        options: &ForecastOptions,
    ) -> ExtractResult<Url> {
        let url = Url::parse_with_params(
            &self.settings.onecall_url,
            &[
                ("lat", coordinates.lat.to_string()),
                ("lon", coordinates.lon.to_string()),
                ("exclude", options.exclude_param()),
                ("units", options.units.to_string()),
                ("appid", self.settings.api_key.clone()),
            ],
        )?;
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ExtractResult<T> {
        let endpoint = redact(&url);
        debug!(%endpoint, "requesting");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ExtractError::Http {
                endpoint: endpoint.clone(),
                source: source.without_url(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::Status { endpoint, status });
        }

        let body = response.text().await.map_err(|source| ExtractError::Http {
            endpoint: endpoint.clone(),
            source: source.without_url(),
        })?;
        serde_json::from_str(&body).map_err(|source| ExtractError::Decode { endpoint, source })
    }
}

#[async_trait::async_trait]
impl Extractor for OpenWeatherClient {
    #[instrument(skip(self))]
    async fn geocode(&self, city: &str) -> anyhow::Result<Option<Coordinates>> {
        let url = self.geocode_url(city)?;
        let matches: Vec<GeoMatch> = self.get_json(url).await?;

        Ok(matches.into_iter().next().map(|m| Coordinates {
            city: city.to_string(),
            lat: m.lat,
            lon: m.lon,
        }))
    }

    #[instrument(skip(self, options), fields(city = %coordinates.city))]
    async fn fetch_forecast(
        &self,
        coordinates: &Coordinates,
        options: &ForecastOptions,
    ) -> anyhow::Result<RawObservation> {
        let url = self.forecast_url(coordinates, options)?;
        Ok(self.get_json(url).await?)
    }
}

/// Endpoint description safe for logs: the API key is masked
fn redact(url: &Url) -> String {
    let mut shown = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "appid" { "***".into() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    shown.query_pairs_mut().clear().extend_pairs(pairs);
    shown.to_string()
}
