//! The aggregator: sole owner of the weather list, the saved cities and the unit preference.
//!
//! Fetches run concurrently on the tokio runtime; every result is applied
//! under one state lock, so completions never interleave. Operations that
//! dispatch fetches must be called from within a runtime.

use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    coordinate::{Coordinate, GeoPoint},
    error::{FetchError, FetchErrorKind},
    events::{BatchKind, BatchReport, Command, Event, FetchTarget, SessionState},
    list::{Insertion, WeatherList},
    location::LocationProvider,
    model::{LocationAuthorization, UnitPreference, WeatherEntry, WeatherRecord},
    provider::WeatherFetcher,
    settings::SettingsStore,
};

const EVENT_CAPACITY: usize = 128;

/// Result of one coordinate lookup as seen by the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied(Insertion),
    Failed(FetchErrorKind),
    /// Resolved after a refresh cleared the list it was meant for.
    Stale,
    Cancelled,
}

#[derive(Debug)]
pub enum AddCity {
    Fetching(Batch),
    AlreadySaved(Coordinate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedCity {
    Added(Coordinate),
    AlreadySaved(Coordinate),
    /// The aggregator shut down while the lookup was in flight.
    Discarded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    Removed {
        entry: WeatherEntry,
        unsaved: Option<Coordinate>,
    },
    /// Index 0 is the current-location entry.
    Refused,
    OutOfRange,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoveCity {
    /// `row` is `None` when the city had no row of its own, e.g. its fetch failed.
    Removed { row: Option<WeatherEntry> },
    NotSaved,
}

/// Point-in-time copy of the aggregator state, for rendering.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub session: SessionState,
    pub unit: UnitPreference,
    pub entries: Vec<WeatherEntry>,
    pub has_current_entry: bool,
    pub current_location: Option<Coordinate>,
    pub saved_cities: Vec<Coordinate>,
}

/// Fetches dispatched together. Dropping it does not cancel them.
#[derive(Debug)]
pub struct Batch {
    kind: BatchKind,
    handle: Option<JoinHandle<BatchReport>>,
}

impl Batch {
    fn empty(kind: BatchKind) -> Self {
        Self { kind, handle: None }
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    /// Wait until every fetch of the batch has resolved.
    pub async fn settled(self) -> BatchReport {
        let Some(handle) = self.handle else {
            return BatchReport::empty(self.kind);
        };

        match handle.await {
            Ok(report) => report,
            Err(err) => {
                warn!(kind = ?self.kind, error = %err, "Batch task did not complete");
                BatchReport::empty(self.kind)
            }
        }
    }
}

#[derive(Debug)]
struct State {
    session: SessionState,
    /// Set only while location access is granted and a position is known.
    current_location: Option<Coordinate>,
    saved: Vec<Coordinate>,
    unit: UnitPreference,
    list: WeatherList,
    /// Bumped by every refresh; results tagged with an older value are dropped.
    generation: u64,
}

#[derive(Debug)]
struct Inner {
    fetcher: Arc<dyn WeatherFetcher>,
    settings: Arc<dyn SettingsStore>,
    location: Arc<dyn LocationProvider>,
    state: Mutex<State>,
    events: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

/// Cheap to clone; all clones share one state.
#[derive(Debug, Clone)]
pub struct Aggregator {
    inner: Arc<Inner>,
}

impl Aggregator {
    /// Load the unit preference and saved cities from `settings`.
    pub fn new(
        fetcher: Arc<dyn WeatherFetcher>,
        settings: Arc<dyn SettingsStore>,
        location: Arc<dyn LocationProvider>,
    ) -> Self {
        let unit = match settings.unit_preference() {
            Ok(unit) => unit.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "Failed to load unit preference, using default");
                UnitPreference::default()
            }
        };
        let saved = load_saved_cities(settings.as_ref());
        debug!(%unit, saved_cities = saved.len(), "Loaded settings");

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                fetcher,
                settings,
                location,
                state: Mutex::new(State {
                    session: SessionState::Uninitialized,
                    current_location: None,
                    saved,
                    unit,
                    list: WeatherList::new(),
                    generation: 0,
                }),
                events,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Register a listener. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.inner.state.lock();
        Snapshot {
            session: state.session,
            unit: state.unit,
            entries: state.list.entries().to_vec(),
            has_current_entry: state.list.has_current_entry(),
            current_location: state.current_location,
            saved_cities: state.saved.clone(),
        }
    }

    pub fn unit(&self) -> UnitPreference {
        self.inner.state.lock().unit
    }

    /// Request location access and fetch every saved city.
    ///
    /// City fetches do not wait for the authorization answer.
    pub fn start(&self) -> Batch {
        let (generation, cities) = {
            let mut state = self.inner.state.lock();
            if state.session != SessionState::Uninitialized {
                warn!(session = ?state.session, "Session already started");
                return Batch::empty(BatchKind::Initial);
            }
            state.session = SessionState::AwaitingAuthorization;
            (state.generation, state.saved.clone())
        };

        info!(saved_cities = cities.len(), "Starting weather session");
        self.emit(Event::SessionChanged(SessionState::AwaitingAuthorization));
        self.inner.location.request_authorization();

        self.spawn_batch(BatchKind::Initial, generation, None, cities)
    }

    /// Apply an answer from the location source. Returns the current-location fetch, if one was issued.
    pub fn on_authorization_changed(
        &self,
        authorization: LocationAuthorization,
        last_known: Option<GeoPoint>,
    ) -> Option<Batch> {
        let (session, here, generation) = {
            let mut state = self.inner.state.lock();
            if state.session == SessionState::Denied {
                debug!(?authorization, "Location access already denied for this session");
                return None;
            }

            let (session, here) = match (authorization, last_known) {
                (LocationAuthorization::Undetermined, _) => return None,
                (LocationAuthorization::Denied, _) => {
                    state.current_location = None;
                    (SessionState::Denied, None)
                }
                (LocationAuthorization::Granted, None) => {
                    if state.current_location.is_some() {
                        return None;
                    }
                    (SessionState::AuthorizedAwaitingLocation, None)
                }
                (LocationAuthorization::Granted, Some(point)) => {
                    let here = point.rounded();
                    state.current_location = Some(here);
                    (SessionState::Ready, Some(here))
                }
            };
            state.session = session;
            (session, here, state.generation)
        };

        info!(?session, "Location authorization changed");
        self.emit(Event::SessionChanged(session));

        let here = here?;
        let batch = self.spawn_batch(BatchKind::CurrentLocation, generation, Some(here), vec![]);
        Some(batch)
    }

    /// One lookup for `coord`, applied through the insertion rule.
    ///
    /// Failures are logged and published as [`Event::FetchFailed`]; the list is left as is.
    pub async fn fetch_for_coordinate(&self, coord: Coordinate) -> FetchOutcome {
        let generation = self.generation();
        self.fetch_tagged(coord, generation).await
    }

    async fn fetch_tagged(&self, coord: Coordinate, generation: u64) -> FetchOutcome {
        let result = tokio::select! {
            _ = self.inner.cancel.cancelled() => return FetchOutcome::Cancelled,
            result = self.inner.fetcher.fetch(coord) => result,
        };

        self.deliver(coord, generation, result)
    }

    fn deliver(
        &self,
        coord: Coordinate,
        generation: u64,
        result: Result<WeatherRecord, FetchError>,
    ) -> FetchOutcome {
        if self.inner.cancel.is_cancelled() {
            return FetchOutcome::Cancelled;
        }

        let outcome = match result {
            Ok(record) => {
                let mut state = self.inner.state.lock();
                if state.generation != generation {
                    debug!(%coord, "Dropping result from before the last refresh");
                    return FetchOutcome::Stale;
                }

                let place = record.place_name.clone();
                let device = state.current_location;
                let entry = WeatherEntry {
                    requested: coord,
                    record,
                };
                let insertion = state.list.insert(entry, device);
                debug!(%coord, %place, ?insertion, "Applied weather record");
                FetchOutcome::Applied(insertion)
            }
            Err(err) => {
                if self.generation() != generation {
                    debug!(%coord, "Dropping failure from before the last refresh");
                    return FetchOutcome::Stale;
                }

                warn!(%coord, kind = %err.kind(), error = %err, "Weather fetch failed");
                self.emit(Event::FetchFailed {
                    target: FetchTarget::Coordinate(coord),
                    kind: err.kind(),
                    message: err.to_string(),
                });
                FetchOutcome::Failed(err.kind())
            }
        };

        self.emit(Event::ListChanged);
        outcome
    }

    /// Save a city and fetch it, unless a saved city already rounds to the same place.
    pub fn add_city(&self, point: GeoPoint) -> AddCity {
        let coord = point.rounded();
        let generation = {
            let mut state = self.inner.state.lock();
            if state.saved.contains(&coord) {
                debug!(%coord, "City already saved");
                return AddCity::AlreadySaved(coord);
            }
            state.saved.push(coord);
            self.persist_cities(&state.saved);
            state.generation
        };

        info!(%coord, "Saved city added");
        let batch = self.spawn_batch(BatchKind::AddCity, generation, None, vec![coord]);
        AddCity::Fetching(batch)
    }

    /// Look a city up by name and save the place the provider resolved it to.
    ///
    /// The fetched record goes straight into the list; no second lookup is made.
    pub async fn add_city_by_name(&self, name: &str) -> Result<NamedCity, FetchError> {
        let result = tokio::select! {
            _ = self.inner.cancel.cancelled() => return Ok(NamedCity::Discarded),
            result = self.inner.fetcher.fetch_by_name(name) => result,
        };

        let record = match result {
            Ok(record) => record,
            Err(err) => {
                warn!(%name, kind = %err.kind(), error = %err, "City lookup failed");
                self.emit(Event::FetchFailed {
                    target: FetchTarget::Name(name.to_string()),
                    kind: err.kind(),
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        if self.inner.cancel.is_cancelled() {
            return Ok(NamedCity::Discarded);
        }

        let coord = record.coord.rounded();
        {
            let mut state = self.inner.state.lock();
            if state.saved.contains(&coord) {
                debug!(%coord, %name, "City already saved");
                return Ok(NamedCity::AlreadySaved(coord));
            }
            state.saved.push(coord);
            self.persist_cities(&state.saved);

            let device = state.current_location;
            let entry = WeatherEntry {
                requested: coord,
                record,
            };
            state.list.insert(entry, device);
        }

        info!(%coord, %name, "Saved city added by name");
        self.emit(Event::ListChanged);
        Ok(NamedCity::Added(coord))
    }

    /// Remove a row and the saved city it was fetched for.
    pub fn delete_row(&self, index: usize) -> DeleteOutcome {
        let outcome = {
            let mut state = self.inner.state.lock();
            if index == 0 && state.list.has_current_entry() {
                debug!("Refusing to delete the current-location row");
                return DeleteOutcome::Refused;
            }

            let Some(entry) = state.list.remove(index) else {
                return DeleteOutcome::OutOfRange;
            };

            let reported = entry.record.coord.rounded();
            let position = state
                .saved
                .iter()
                .position(|c| *c == entry.requested)
                .or_else(|| state.saved.iter().position(|c| *c == reported));
            let unsaved = position.map(|pos| state.saved.remove(pos));

            if unsaved.is_some() {
                self.persist_cities(&state.saved);
            }

            info!(index, place = %entry.record.place_name, "Deleted row");
            DeleteOutcome::Removed { entry, unsaved }
        };

        self.emit(Event::ListChanged);
        outcome
    }

    /// Unsave a city and drop the row fetched for it.
    ///
    /// The pinned current-location row is never removed here, even when it was
    /// fetched for the same place.
    pub fn remove_city(&self, coord: Coordinate) -> RemoveCity {
        let row = {
            let mut state = self.inner.state.lock();
            let Some(pos) = state.saved.iter().position(|c| *c == coord) else {
                debug!(%coord, "City is not saved");
                return RemoveCity::NotSaved;
            };
            state.saved.remove(pos);
            self.persist_cities(&state.saved);

            let row = state
                .list
                .position_of_city(&coord)
                .and_then(|index| state.list.remove(index));

            info!(%coord, had_row = row.is_some(), "Saved city removed");
            row
        };

        self.emit(Event::ListChanged);
        RemoveCity::Removed { row }
    }

    /// Switch the rendering unit. Records are not refetched.
    pub fn change_unit(&self, unit: UnitPreference) {
        {
            let mut state = self.inner.state.lock();
            state.unit = unit;
            if let Err(err) = self.inner.settings.set_unit_preference(unit) {
                warn!(error = %err, "Failed to persist unit preference");
            }
        }

        info!(%unit, "Unit preference changed");
        self.emit(Event::UnitRenderingChanged(unit));
    }

    /// Clear the list and fetch the device location and every saved city again.
    pub fn refresh(&self) -> Batch {
        let (generation, here, cities) = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.list.clear();
            let cities = state.saved.clone();
            (state.generation, state.current_location, cities)
        };

        info!(
            has_location = here.is_some(),
            saved_cities = cities.len(),
            "Refreshing"
        );
        self.emit(Event::ListChanged);

        self.spawn_batch(BatchKind::Refresh, generation, here, cities)
    }

    /// Dispatch one message from the event bus. Fetches run in the background.
    pub fn handle(&self, command: Command) {
        match command {
            Command::CitySelected(point) => {
                self.add_city(point);
            }
            Command::CityNamed(name) => {
                let this = self.clone();
                tokio::spawn(async move {
                    // Failures are already logged and published.
                    let _ = this.add_city_by_name(&name).await;
                });
            }
            Command::UnitChanged(unit) => self.change_unit(unit),
            Command::DeleteRow(index) => {
                self.delete_row(index);
            }
            Command::Refresh => {
                self.refresh();
            }
            Command::AuthorizationChanged { state, last_known } => {
                self.on_authorization_changed(state, last_known);
            }
        }
    }

    /// Consume the event bus until it closes or the aggregator shuts down.
    pub async fn run(&self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                _ = self.inner.cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }
        debug!("Command loop stopped");
    }

    /// Stop applying results. In-flight fetches resolve as [`FetchOutcome::Cancelled`].
    pub fn shutdown(&self) {
        info!("Shutting down aggregator");
        self.inner.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// `generation` must be read in the same critical section that decided what to fetch.
    fn spawn_batch(
        &self,
        kind: BatchKind,
        generation: u64,
        here: Option<Coordinate>,
        cities: Vec<Coordinate>,
    ) -> Batch {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let here_fetch = async {
                let coord = here?;
                let outcome = this.fetch_tagged(coord, generation).await;
                if kind == BatchKind::Refresh {
                    this.emit(Event::RefreshFinished);
                }
                Some(outcome)
            };
            let lookups = cities.into_iter().map(|c| this.fetch_tagged(c, generation));
            let city_fetches = join_all(lookups);

            let (here_outcome, city_outcomes) = futures::join!(here_fetch, city_fetches);
            if kind == BatchKind::Refresh && here.is_none() {
                this.emit(Event::RefreshFinished);
            }

            let report = tally(kind, here_outcome.into_iter().chain(city_outcomes));
            info!(
                ?kind,
                applied = report.applied,
                dropped = report.dropped,
                failed = report.failed,
                "Batch settled"
            );
            this.emit(Event::BatchSettled(report.clone()));
            report
        });

        Batch {
            kind,
            handle: Some(handle),
        }
    }

    fn generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    fn persist_cities(&self, cities: &[Coordinate]) {
        if let Err(err) = self.inner.settings.set_saved_cities(cities) {
            warn!(error = %err, "Failed to persist saved cities");
        }
    }

    fn emit(&self, event: Event) {
        // No receivers is fine.
        let _ = self.inner.events.send(event);
    }
}

fn load_saved_cities(settings: &dyn SettingsStore) -> Vec<Coordinate> {
    let stored = match settings.saved_cities() {
        Ok(cities) => cities.unwrap_or_default(),
        Err(err) => {
            warn!(error = %err, "Failed to load saved cities");
            Vec::new()
        }
    };

    let mut saved: Vec<Coordinate> = Vec::with_capacity(stored.len());
    for coord in stored {
        if !saved.contains(&coord) {
            saved.push(coord);
        }
    }
    saved
}

fn tally(kind: BatchKind, outcomes: impl IntoIterator<Item = FetchOutcome>) -> BatchReport {
    let mut report = BatchReport::empty(kind);
    for outcome in outcomes {
        match outcome {
            FetchOutcome::Applied(Insertion::DroppedEcho)
            | FetchOutcome::Stale
            | FetchOutcome::Cancelled => report.dropped += 1,
            FetchOutcome::Applied(_) => report.applied += 1,
            FetchOutcome::Failed(_) => report.failed += 1,
        }
    }
    report
}
