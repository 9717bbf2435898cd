use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode};
use weatherboard_core::{
    AddCity, Config, Coordinate, FileSettings, GeoPoint, NamedCity, ProviderId, RemoveCity,
    SettingsStore, UnitPreference,
};

use crate::{render, session::Session};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "weatherboard",
    version,
    about = "Weather for where you are and the cities you follow"
)]
pub struct Cli {
    /// Provider to use instead of the configured default.
    #[arg(long, global = true)]
    pub provider: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "openweather" or "weatherapi".
        #[arg(value_name = "PROVIDER")]
        name: String,

        /// Make this the default provider.
        #[arg(long)]
        default: bool,
    },

    /// Set the position reported as the device location.
    Locate {
        #[arg(allow_negative_numbers = true, required_unless_present = "off")]
        latitude: Option<f64>,

        #[arg(allow_negative_numbers = true, required_unless_present = "off")]
        longitude: Option<f64>,

        /// Forget the position; location access is then denied.
        #[arg(long, conflicts_with_all = ["latitude", "longitude"])]
        off: bool,
    },

    /// Show weather for the current location and every saved city.
    Show,

    /// Save a city by coordinates or by name.
    Add {
        #[arg(allow_negative_numbers = true, required_unless_present = "name")]
        latitude: Option<f64>,

        #[arg(allow_negative_numbers = true, required_unless_present = "name")]
        longitude: Option<f64>,

        /// Look the city up by name instead.
        #[arg(long, conflicts_with_all = ["latitude", "longitude"])]
        name: Option<String>,
    },

    /// Remove the saved city at INDEX, as numbered by `cities`.
    Remove { index: usize },

    /// Set the temperature unit: c or f.
    Unit { unit: String },

    /// List saved cities.
    Cities,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let provider = self.provider.as_deref();

        match self.command {
            Command::Configure { name, default } => configure(&name, default),
            Command::Locate {
                latitude,
                longitude,
                off,
            } => {
                let point = if off {
                    None
                } else {
                    Some(point_from(latitude, longitude)?)
                };
                locate(point)
            }
            Command::Show => show(provider).await,
            Command::Add {
                latitude,
                longitude,
                name,
            } => match name {
                Some(name) => add_by_name(provider, &name).await,
                None => add(provider, point_from(latitude, longitude)?).await,
            },
            Command::Remove { index } => remove(provider, index),
            Command::Unit { unit } => {
                let unit = UnitPreference::try_from(unit.as_str())?;
                FileSettings::open_default()?.set_unit_preference(unit)?;
                println!("Temperatures will be shown in {unit}.");
                Ok(())
            }
            Command::Cities => {
                let cities = FileSettings::open_default()?
                    .saved_cities()?
                    .unwrap_or_default();
                render::print_cities(&cities);
                Ok(())
            }
        }
    }
}

fn point_from(latitude: Option<f64>, longitude: Option<f64>) -> anyhow::Result<GeoPoint> {
    let (Some(lat), Some(lon)) = (latitude, longitude) else {
        bail!("Both latitude and longitude are required");
    };
    let point = GeoPoint::new(lat, lon);
    point.validate()?;
    Ok(point)
}

fn configure(provider: &str, make_default: bool) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;
    let mut config = Config::load()?;

    let api_key = Password::new(&key_prompt(&config, id))
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    if api_key.trim().is_empty() {
        bail!("API key must not be empty");
    }

    config.upsert_provider_api_key(id, api_key.trim().to_string());
    if make_default {
        config.set_default_provider(id);
    }
    config.save()?;

    let path = Config::config_file_path()?;
    println!("Saved credentials for {id} to {}", path.display());
    Ok(())
}

fn key_prompt(config: &Config, id: ProviderId) -> String {
    if config.is_provider_configured(id) {
        format!("New API key for {id} (replaces the saved one):")
    } else {
        format!("API key for {id}:")
    }
}

fn locate(point: Option<GeoPoint>) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    config.set_location(point);
    config.save()?;

    match point {
        Some(point) => println!("Current location set to {}, {}.", point.lat, point.lon),
        None => println!("Location access turned off."),
    }
    Ok(())
}

async fn show(provider: Option<&str>) -> anyhow::Result<()> {
    let config = Config::load()?;
    let mut session = Session::open(&config, provider)?;

    session.load().await;
    session.report_failures();
    render::print_list(&session.aggregator.snapshot());

    session.close();
    Ok(())
}

async fn add(provider: Option<&str>, point: GeoPoint) -> anyhow::Result<()> {
    let config = Config::load()?;
    let mut session = Session::open(&config, provider)?;

    match session.aggregator.add_city(point) {
        AddCity::Fetching(batch) => {
            let report = batch.settled().await;
            session.report_failures();
            println!("Saved {}.", point.rounded());
            if report.applied > 0 {
                render::print_list(&session.aggregator.snapshot());
            }
        }
        AddCity::AlreadySaved(coord) => println!("{coord} is already saved."),
    }

    session.close();
    Ok(())
}

async fn add_by_name(provider: Option<&str>, name: &str) -> anyhow::Result<()> {
    let config = Config::load()?;
    let session = Session::open(&config, provider)?;

    let outcome = session.aggregator.add_city_by_name(name).await;
    session.close();

    match outcome? {
        NamedCity::Added(coord) => println!("Saved {name} at {coord}."),
        NamedCity::AlreadySaved(coord) => println!("{name} ({coord}) is already saved."),
        NamedCity::Discarded => println!("Lookup for {name} was interrupted."),
    }
    Ok(())
}

fn remove(provider: Option<&str>, index: usize) -> anyhow::Result<()> {
    let config = Config::load()?;
    let session = Session::open(&config, provider)?;

    let coord = city_at(&session.aggregator.snapshot().saved_cities, index)?;
    let outcome = session.aggregator.remove_city(coord);
    session.close();

    match outcome {
        RemoveCity::Removed { .. } => println!("Removed {coord}."),
        RemoveCity::NotSaved => bail!("{coord} is no longer saved"),
    }
    Ok(())
}

fn city_at(cities: &[Coordinate], index: usize) -> anyhow::Result<Coordinate> {
    let Some(coord) = cities.get(index) else {
        bail!(
            "There is no saved city {index}.\n\
             Hint: run `weatherboard cities` to see how they are numbered."
        );
    };
    Ok(*coord)
}
