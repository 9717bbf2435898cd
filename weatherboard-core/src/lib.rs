//! Core library for `weatherboard`.
//!
//! This crate defines:
//! - Rounded coordinates used as "same place" identity
//! - The weather list aggregator and its insertion/deletion rules
//! - Ports for settings storage, geolocation and weather providers
//! - Provider adapters for OpenWeather and WeatherAPI.com
//!
//! It is used by `weatherboard-cli`, but any host that can drive a tokio
//! runtime and render a [`Snapshot`] can embed it.

pub mod aggregator;
pub mod config;
pub mod coordinate;
pub mod error;
pub mod events;
pub mod list;
pub mod location;
pub mod model;
pub mod provider;
pub mod settings;

#[cfg(test)]
mod test_support;

pub use aggregator::{
    AddCity, Aggregator, Batch, DeleteOutcome, FetchOutcome, NamedCity, RemoveCity, Snapshot,
};
pub use config::{Config, LocationConfig, ProviderConfig};
pub use coordinate::{Coordinate, GeoPoint, IDENTITY_PRECISION};
pub use error::{FetchError, FetchErrorKind};
pub use events::{BatchKind, BatchReport, Command, Event, FetchTarget, SessionState};
pub use list::{Insertion, WeatherList};
pub use location::{FixedLocation, LocationProvider};
pub use model::{LocationAuthorization, Measurements, UnitPreference, WeatherEntry, WeatherRecord};
pub use provider::{ProviderId, WeatherFetcher};
pub use settings::{FileSettings, MemorySettings, SettingsStore, StoredSettings};
