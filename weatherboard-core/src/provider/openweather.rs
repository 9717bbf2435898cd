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

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

const PROVIDER: &str = "openweather";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn with_client(api_key: String, http: Client, base_url: &str) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    async fn fetch_current(&self, query: &[(&str, String)]) -> Result<WeatherRecord, FetchError> {
        let url = format!("{}/data/2.5/weather", self.base_url);

        let request = self
            .http
            .get(url)
            .query(query)
            .query(&[("appid", self.api_key.as_str()), ("units", "metric")]);

        let parsed: OwCurrentResponse = send_json(PROVIDER, request).await?;
        Ok(parsed.into_record())
    }
}

#[derive(Debug, Deserialize)]
struct OwCoord {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    coord: OwCoord,
    #[serde(default)]
    name: String,
    dt: i64,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
}

impl OwCurrentResponse {
    fn into_record(self) -> WeatherRecord {
        let coord = GeoPoint::new(self.coord.lat, self.coord.lon);

        // Open ocean and remote points come back without a name.
        let place_name = if self.name.trim().is_empty() {
            coord.rounded().to_string()
        } else {
            self.name
        };

        let condition = self
            .weather
            .into_iter()
            .next()
            .map(|w| w.description)
            .unwrap_or_else(|| "Unknown".to_string());

        WeatherRecord {
            provider: PROVIDER.to_string(),
            place_name,
            coord,
            measurements: Measurements {
                temperature_c: self.main.temp,
                feels_like_c: self.main.feels_like,
                condition,
                humidity_pct: self.main.humidity,
                wind_speed_mps: self.wind.speed,
                observation_time: unix_to_utc(self.dt).unwrap_or_else(Utc::now),
            },
        }
    }
}

#[async_trait]
impl WeatherFetcher for OpenWeatherProvider {
    async fn fetch(&self, coord: Coordinate) -> Result<WeatherRecord, FetchError> {
        self.fetch_current(&[
            ("lat", coord.lat().to_string()),
            ("lon", coord.lon().to_string()),
        ])
        .await
    }

    async fn fetch_by_name(&self, name: &str) -> Result<WeatherRecord, FetchError> {
        self.fetch_current(&[("q", name.to_string())]).await
    }
}
