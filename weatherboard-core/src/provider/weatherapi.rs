use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    coordinate::{Coordinate, GeoPoint},
    error::FetchError,
    model::{Measurements, WeatherRecord},
    provider::{send_json, unix_to_utc},
};

use super::WeatherFetcher;

pub const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com";

const PROVIDER: &str = "weatherapi";

#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn with_client(api_key: String, http: Client, base_url: &str) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    async fn fetch_current(&self, q: &str) -> Result<WeatherRecord, FetchError> {
        let url = format!("{}/v1/current.json", self.base_url);

        let request = self
            .http
            .get(url)
            .query(&[("key", self.api_key.as_str()), ("q", q)]);

        let parsed: WaResponse = send_json(PROVIDER, request).await?;
        Ok(parsed.into_record())
    }
}

#[derive(Debug, Deserialize)]
struct WaLocation {
    name: String,
    country: String,
    lat: f64,
    lon: f64,
    localtime_epoch: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: String,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
    feelslike_c: f64,
    humidity: u8,
    wind_kph: f64,
    condition: WaCondition,
    last_updated_epoch: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    location: WaLocation,
    current: WaCurrent,
}

impl WaResponse {
    fn into_record(self) -> WeatherRecord {
        let ts = self
            .current
            .last_updated_epoch
            .or(self.location.localtime_epoch);
        let observation_time = ts.and_then(unix_to_utc).unwrap_or_else(Utc::now);

        let place_name = if self.location.country.is_empty() {
            self.location.name
        } else {
            format!("{}, {}", self.location.name, self.location.country)
        };

        WeatherRecord {
            provider: PROVIDER.to_string(),
            place_name,
            coord: GeoPoint::new(self.location.lat, self.location.lon),
            measurements: Measurements {
                temperature_c: self.current.temp_c,
                feels_like_c: self.current.feelslike_c,
                condition: self.current.condition.text,
                humidity_pct: self.current.humidity,
                wind_speed_mps: self.current.wind_kph / 3.6,
                observation_time,
            },
        }
    }
}

#[async_trait]
impl WeatherFetcher for WeatherApiProvider {
    async fn fetch(&self, coord: Coordinate) -> Result<WeatherRecord, FetchError> {
        let query = format!("{},{}", coord.lat(), coord.lon());
        self.fetch_current(&query).await
    }

    async fn fetch_by_name(&self, name: &str) -> Result<WeatherRecord, FetchError> {
        self.fetch_current(name).await
    }
}
