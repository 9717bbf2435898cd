//! Persistence port for the unit preference and the saved-city list.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    fs,
    path::{Path, PathBuf},
};

use crate::{config::Config, coordinate::Coordinate, model::UnitPreference};

/// Key-value store behind the aggregator. `None` means "never stored".
pub trait SettingsStore: Send + Sync + Debug {
    fn unit_preference(&self) -> Result<Option<UnitPreference>>;

    fn saved_cities(&self) -> Result<Option<Vec<Coordinate>>>;

    fn set_saved_cities(&self, cities: &[Coordinate]) -> Result<()>;

    fn set_unit_preference(&self, unit: UnitPreference) -> Result<()>;
}

/// On-disk shape:
///
/// ```toml
/// unit = "celsius"
///
/// [[cities]]
/// lat = 35.0
/// lon = 129.0
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<UnitPreference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cities: Option<Vec<Coordinate>>,
}

/// Settings kept in a TOML file next to the config.
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Settings file in the platform config directory.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Config::config_dir()?.join("settings.toml")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StoredSettings> {
        if !self.path.exists() {
            return Ok(StoredSettings::default());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings file: {}", self.path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse settings file: {}", self.path.display()))
    }

    fn update(&self, apply: impl FnOnce(&mut StoredSettings)) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut stored = self.read()?;
        apply(&mut stored);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory: {}", parent.display())
            })?;
        }

        let toml = toml::to_string_pretty(&stored)
            .context("Failed to serialize settings to TOML")?;
        fs::write(&self.path, toml)
            .with_context(|| format!("Failed to write settings file: {}", self.path.display()))
    }
}

impl SettingsStore for FileSettings {
    fn unit_preference(&self) -> Result<Option<UnitPreference>> {
        Ok(self.read()?.unit)
    }

    fn saved_cities(&self) -> Result<Option<Vec<Coordinate>>> {
        Ok(self.read()?.cities)
    }

    fn set_saved_cities(&self, cities: &[Coordinate]) -> Result<()> {
        self.update(|stored| stored.cities = Some(cities.to_vec()))
    }

    fn set_unit_preference(&self, unit: UnitPreference) -> Result<()> {
        self.update(|stored| stored.unit = Some(unit))
    }
}

/// Process-local store, used by tests and embedders without persistence.
#[derive(Debug, Default)]
pub struct MemorySettings {
    inner: Mutex<StoredSettings>,
}

impl MemorySettings {
    pub fn new(stored: StoredSettings) -> Self {
        Self {
            inner: Mutex::new(stored),
        }
    }

    pub fn with_cities(cities: Vec<Coordinate>) -> Self {
        Self::new(StoredSettings {
            unit: None,
            cities: Some(cities),
        })
    }

    pub fn snapshot(&self) -> StoredSettings {
        self.inner.lock().clone()
    }
}

impl SettingsStore for MemorySettings {
    fn unit_preference(&self) -> Result<Option<UnitPreference>> {
        Ok(self.inner.lock().unit)
    }

    fn saved_cities(&self) -> Result<Option<Vec<Coordinate>>> {
        Ok(self.inner.lock().cities.clone())
    }

    fn set_saved_cities(&self, cities: &[Coordinate]) -> Result<()> {
        self.inner.lock().cities = Some(cities.to_vec());
        Ok(())
    }

    fn set_unit_preference(&self, unit: UnitPreference) -> Result<()> {
        self.inner.lock().unit = Some(unit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> FileSettings {
        FileSettings::new(dir.path().join("settings.toml"))
    }

    #[test]
    fn empty_file_store_reports_nothing_stored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        assert_eq!(store.unit_preference().unwrap(), None);
        assert_eq!(store.saved_cities().unwrap(), None);
    }

    #[test]
    fn saved_cities_survive_a_write_read_cycle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        let cities = vec![
            Coordinate::new(35.1796, 129.0756),
            Coordinate::new(-33.8688, 151.2093),
            Coordinate::new(0.005, -0.004),
        ];

        store.set_saved_cities(&cities).unwrap();
        let first = store.saved_cities().unwrap().expect("cities stored");
        store.set_saved_cities(&first).unwrap();
        let second = store.saved_cities().unwrap().expect("cities stored");

        assert_eq!(first, cities);
        assert_eq!(second, first);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.lat().to_bits(), b.lat().to_bits());
            assert_eq!(a.lon().to_bits(), b.lon().to_bits());
        }
    }

    #[test]
    fn unit_and_cities_are_written_independently() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);

        store.set_saved_cities(&[Coordinate::new(37.5, 127.0)]).unwrap();
        store.set_unit_preference(UnitPreference::Celsius).unwrap();

        assert_eq!(
            store.unit_preference().unwrap(),
            Some(UnitPreference::Celsius)
        );
        assert_eq!(
            store.saved_cities().unwrap(),
            Some(vec![Coordinate::new(37.5, 127.0)])
        );
    }

    #[test]
    fn hand_edited_file_is_rounded_on_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        fs::write(
            store.path(),
            "unit = \"fahrenheit\"\n\n[[cities]]\nlat = 40.71277\nlon = -74.00597\n",
        )
        .unwrap();

        let cities = store.saved_cities().unwrap().expect("cities stored");
        assert_eq!(cities[0].lat(), 40.71);
        assert_eq!(cities[0].lon(), -74.01);
        assert_eq!(
            store.unit_preference().unwrap(),
            Some(UnitPreference::Fahrenheit)
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir);
        fs::write(store.path(), "cities = 3").unwrap();

        let err = store.saved_cities().unwrap_err();
        assert!(err.to_string().contains("Failed to parse settings file"));
    }
}
