use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{
    broadcast::{self, error::TryRecvError},
    mpsc,
};
use weatherboard_core::{
    Aggregator, Command, Config, Event, FileSettings, FixedLocation, GeoPoint, ProviderId,
    SettingsStore, WeatherFetcher,
    provider::{default_provider_from_config, provider_from_config},
};

/// One aggregator wired to the config file, the settings file and a fixed location.
pub struct Session {
    pub aggregator: Aggregator,
    events: broadcast::Receiver<Event>,
    commands: mpsc::Receiver<Command>,
}

impl Session {
    pub fn open(config: &Config, provider: Option<&str>) -> Result<Self> {
        let fetcher = match provider {
            Some(name) => provider_from_config(ProviderId::try_from(name)?, config)?,
            None => default_provider_from_config(config)?,
        };
        let settings = Arc::new(FileSettings::open_default()?);

        let location = config.location.map(|l| l.point());
        Ok(Self::new(fetcher, settings, location))
    }

    pub fn new(
        fetcher: Arc<dyn WeatherFetcher>,
        settings: Arc<dyn SettingsStore>,
        location: Option<GeoPoint>,
    ) -> Self {
        let (bus, commands) = mpsc::channel(16);
        let location = Arc::new(FixedLocation::new(location, bus));

        let aggregator = Aggregator::new(fetcher, settings, location);
        let events = aggregator.subscribe();

        Self {
            aggregator,
            events,
            commands,
        }
    }

    /// Start the session and wait for the saved cities and the current location to resolve.
    pub async fn load(&mut self) {
        let initial = self.aggregator.start();

        // The fixed location has already answered by the time `start` returns.
        let mut located = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::AuthorizationChanged { state, last_known } => {
                    located.extend(self.aggregator.on_authorization_changed(state, last_known));
                }
                other => self.aggregator.handle(other),
            }
        }

        let report = initial.settled().await;
        tracing::debug!(?report, "Saved cities loaded");
        for batch in located {
            let report = batch.settled().await;
            tracing::debug!(?report, "Current location loaded");
        }
    }

    /// Print any failures published since the last call.
    pub fn report_failures(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(Event::FetchFailed {
                    target,
                    kind,
                    message,
                }) => eprintln!("Could not load weather for {target} ({kind}): {message}"),
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Some failures were not shown");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    pub fn close(self) {
        self.aggregator.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;
    use weatherboard_core::{Coordinate, FetchError, Measurements, MemorySettings, WeatherRecord};

    /// Answers every lookup at once, naming the place after its coordinate.
    #[derive(Debug)]
    struct Everywhere;

    fn record(name: String, coord: Coordinate) -> WeatherRecord {
        WeatherRecord {
            provider: "everywhere".into(),
            place_name: name,
            coord: GeoPoint::new(coord.lat(), coord.lon()),
            measurements: Measurements {
                temperature_c: 12.0,
                feels_like_c: 11.0,
                condition: "clear sky".into(),
                humidity_pct: 40,
                wind_speed_mps: 2.0,
                observation_time: Utc::now(),
            },
        }
    }

    #[async_trait]
    impl WeatherFetcher for Everywhere {
        async fn fetch(&self, coord: Coordinate) -> Result<WeatherRecord, FetchError> {
            Ok(record(coord.to_string(), coord))
        }

        async fn fetch_by_name(&self, name: &str) -> Result<WeatherRecord, FetchError> {
            Ok(record(name.to_string(), Coordinate::new(0.0, 0.0)))
        }
    }

    #[tokio::test]
    async fn load_waits_for_the_location_with_many_saved_cities() {
        let cities: Vec<Coordinate> = (0..300)
            .map(|i| Coordinate::new(-60.0 + f64::from(i) * 0.25, 10.0))
            .collect();
        let settings = Arc::new(MemorySettings::with_cities(cities));
        let mut session = Session::new(
            Arc::new(Everywhere),
            settings,
            Some(GeoPoint::new(37.5, 127.0)),
        );

        tokio::time::timeout(Duration::from_secs(10), session.load())
            .await
            .expect("load should not hang");

        let snapshot = session.aggregator.snapshot();
        assert!(snapshot.has_current_entry);
        assert_eq!(snapshot.entries.len(), 301);
        assert_eq!(snapshot.entries[0].record.place_name, "37.50, 127.00");

        session.report_failures();
        session.close();
    }

    #[tokio::test]
    async fn load_without_location_only_fetches_saved_cities() {
        let cities = vec![Coordinate::new(35.0, 129.0)];
        let settings = Arc::new(MemorySettings::with_cities(cities));
        let mut session = Session::new(Arc::new(Everywhere), settings, None);

        session.load().await;

        let snapshot = session.aggregator.snapshot();
        assert!(!snapshot.has_current_entry);
        assert_eq!(snapshot.entries.len(), 1);
        session.close();
    }
}
