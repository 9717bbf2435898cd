use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::{convert::TryFrom, fmt::Debug, sync::Arc, time::Duration};

use crate::{
    Config, FetchError, WeatherRecord,
    coordinate::Coordinate,
    provider::{openweather::OpenWeatherProvider, weatherapi::WeatherApiProvider},
};

pub mod openweather;
pub mod weatherapi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeather,
    WeatherApi,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweather",
            ProviderId::WeatherApi => "weatherapi",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeather, ProviderId::WeatherApi]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweather" => Ok(ProviderId::OpenWeather),
            "weatherapi" => Ok(ProviderId::WeatherApi),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openweather, weatherapi."
            )),
        }
    }
}

/// Current-weather lookups against one provider. A single attempt per call.
#[async_trait]
pub trait WeatherFetcher: Send + Sync + Debug {
    async fn fetch(&self, coord: Coordinate) -> Result<WeatherRecord, FetchError>;

    async fn fetch_by_name(&self, name: &str) -> Result<WeatherRecord, FetchError>;
}

/// Default per-request timeout when the config does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Construct a fetcher from config and explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
) -> anyhow::Result<Arc<dyn WeatherFetcher>> {
    let provider_cfg = config.provider_config(id).ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured for provider '{id}'.\n\
                 Hint: run `weatherboard configure {id}` and enter your API key."
        )
    })?;

    let timeout = Duration::from_secs(config.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
    let http = Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let api_key = provider_cfg.api_key.clone();
    let base_url = provider_cfg.base_url.as_deref();

    let fetcher: Arc<dyn WeatherFetcher> = match id {
        ProviderId::OpenWeather => Arc::new(OpenWeatherProvider::with_client(
            api_key,
            http,
            base_url.unwrap_or(openweather::DEFAULT_BASE_URL),
        )),
        ProviderId::WeatherApi => Arc::new(WeatherApiProvider::with_client(
            api_key,
            http,
            base_url.unwrap_or(weatherapi::DEFAULT_BASE_URL),
        )),
    };

    Ok(fetcher)
}

/// Construct the default fetcher from config, using `default_provider` field.
pub fn default_provider_from_config(config: &Config) -> anyhow::Result<Arc<dyn WeatherFetcher>> {
    let id = config.default_provider_id()?;
    provider_from_config(id, config)
}

/// Send a prepared request and decode a JSON body, mapping each failure to its [`FetchError`].
pub(crate) async fn send_json<T: serde::de::DeserializeOwned>(
    provider: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<T, FetchError> {
    let res = request
        .send()
        .await
        .map_err(|source| FetchError::Network { provider, source })?;

    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|source| FetchError::Network { provider, source })?;

    if !status.is_success() {
        return Err(FetchError::Status {
            provider,
            status: status.as_u16(),
            body: truncate_body(&body),
        });
    }

    serde_json::from_str(&body)
        .map_err(|source| FetchError::Decoding { provider, source })
}

pub(crate) fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(ts, 0)
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
