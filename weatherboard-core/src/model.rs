use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coordinate::{Coordinate, GeoPoint};

/// Current conditions for one place, as decoded from a provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub provider: String,
    pub place_name: String,
    /// Provider-reported position; usually snapped to a station, not the requested point.
    pub coord: GeoPoint,
    pub measurements: Measurements,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub condition: String,
    pub humidity_pct: u8,
    pub wind_speed_mps: f64,
    pub observation_time: DateTime<Utc>,
}

/// One row of the weather list: the record plus the coordinate it was requested for.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherEntry {
    pub requested: Coordinate,
    pub record: WeatherRecord,
}

impl WeatherEntry {
    /// True if either the requested or the provider-reported position is `coord`.
    pub fn is_place(&self, coord: &Coordinate) -> bool {
        self.requested.same_place(coord) || self.record.coord.rounded().same_place(coord)
    }
}

/// Temperature unit used when rendering records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitPreference {
    #[default]
    Fahrenheit,
    Celsius,
}

impl UnitPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitPreference::Fahrenheit => "fahrenheit",
            UnitPreference::Celsius => "celsius",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            UnitPreference::Fahrenheit => "°F",
            UnitPreference::Celsius => "°C",
        }
    }

    /// Convert a Celsius reading into this unit.
    pub fn convert(&self, celsius: f64) -> f64 {
        match self {
            UnitPreference::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
            UnitPreference::Celsius => celsius,
        }
    }
}

impl std::fmt::Display for UnitPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for UnitPreference {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "f" | "fahrenheit" => Ok(UnitPreference::Fahrenheit),
            "c" | "celsius" => Ok(UnitPreference::Celsius),
            _ => Err(anyhow::anyhow!(
                "Unknown unit '{value}'. Supported units: c (celsius), f (fahrenheit)."
            )),
        }
    }
}

/// Authorization state reported by a geolocation source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationAuthorization {
    Undetermined,
    Granted,
    Denied,
}
