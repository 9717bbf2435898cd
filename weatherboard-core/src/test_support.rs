//! Fakes shared by the unit tests.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::{broadcast, oneshot};
use tracing::{
    Metadata, Subscriber,
    field::{Field, Visit},
    span,
};

use crate::{
    aggregator::Aggregator,
    coordinate::{Coordinate, GeoPoint},
    error::FetchError,
    events::Event,
    location::LocationProvider,
    model::{Measurements, WeatherEntry, WeatherRecord},
    provider::WeatherFetcher,
    settings::MemorySettings,
};

pub fn record(name: &str, lat: f64, lon: f64) -> WeatherRecord {
    WeatherRecord {
        provider: "scripted".into(),
        place_name: name.into(),
        coord: GeoPoint::new(lat, lon),
        measurements: Measurements {
            temperature_c: 18.0,
            feels_like_c: 17.5,
            condition: "few clouds".into(),
            humidity_pct: 55,
            wind_speed_mps: 3.0,
            observation_time: Utc::now(),
        },
    }
}

pub fn entry(name: &str, lat: f64, lon: f64) -> WeatherEntry {
    WeatherEntry { requested: Coordinate::new(lat, lon), record: record(name, lat, lon) }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Record(WeatherRecord),
    NetworkFailure,
    DecodingFailure,
}

impl Reply {
    fn into_result(self) -> Result<WeatherRecord, FetchError> {
        match self {
            Reply::Record(record) => Ok(record),
            Reply::NetworkFailure => Err(unavailable()),
            Reply::DecodingFailure => Err(FetchError::Decoding {
                provider: "scripted",
                source: serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
            }),
        }
    }
}

fn unavailable() -> FetchError {
    FetchError::Status { provider: "scripted", status: 503, body: "unavailable".into() }
}

fn not_found() -> FetchError {
    FetchError::Status { provider: "scripted", status: 404, body: "city not found".into() }
}

/// Answers immediately from a fixed table.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    replies: HashMap<Coordinate, Reply>,
    names: HashMap<String, Reply>,
    calls: Mutex<Vec<Coordinate>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, lat: f64, lon: f64, name: &str) -> Self {
        let reply = Reply::Record(record(name, lat, lon));
        self.respond(lat, lon, reply)
    }

    pub fn respond(mut self, lat: f64, lon: f64, reply: Reply) -> Self {
        self.replies.insert(Coordinate::new(lat, lon), reply);
        self
    }

    pub fn named(mut self, query: &str, reply: Reply) -> Self {
        self.names.insert(query.into(), reply);
        self
    }

    pub fn calls(&self) -> Vec<Coordinate> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, lat: f64, lon: f64) -> usize {
        let coord = Coordinate::new(lat, lon);
        self.calls.lock().iter().filter(|c| **c == coord).count()
    }
}

#[async_trait]
impl WeatherFetcher for ScriptedFetcher {
    async fn fetch(&self, coord: Coordinate) -> Result<WeatherRecord, FetchError> {
        self.calls.lock().push(coord);
        self.replies
            .get(&coord)
            .cloned()
            .map_or_else(|| Err(not_found()), Reply::into_result)
    }

    async fn fetch_by_name(&self, name: &str) -> Result<WeatherRecord, FetchError> {
        self.names
            .get(name)
            .cloned()
            .map_or_else(|| Err(not_found()), Reply::into_result)
    }
}

/// Holds every lookup until the test releases it, so completion order is up to the test.
///
/// Gates for one coordinate are consumed in the order fetches start.
#[derive(Debug, Default)]
pub struct GatedFetcher {
    gates: Mutex<HashMap<Coordinate, VecDeque<oneshot::Receiver<Reply>>>>,
    calls: Mutex<Vec<Coordinate>>,
}

impl GatedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gate(&self, lat: f64, lon: f64) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.gates
            .lock()
            .entry(Coordinate::new(lat, lon))
            .or_default()
            .push_back(rx);
        tx
    }

    pub fn calls_for(&self, lat: f64, lon: f64) -> usize {
        let coord = Coordinate::new(lat, lon);
        self.calls.lock().iter().filter(|c| **c == coord).count()
    }
}

#[async_trait]
impl WeatherFetcher for GatedFetcher {
    async fn fetch(&self, coord: Coordinate) -> Result<WeatherRecord, FetchError> {
        self.calls.lock().push(coord);
        let gate = self
            .gates
            .lock()
            .get_mut(&coord)
            .and_then(VecDeque::pop_front);
        let Some(rx) = gate else {
            return Err(not_found());
        };
        match rx.await {
            Ok(reply) => reply.into_result(),
            Err(_) => Err(unavailable()),
        }
    }

    async fn fetch_by_name(&self, _name: &str) -> Result<WeatherRecord, FetchError> {
        Err(not_found())
    }
}

/// Counts authorization requests; answers are delivered by the test.
#[derive(Debug, Default)]
pub struct RecordingLocation {
    requests: AtomicUsize,
}

impl RecordingLocation {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl LocationProvider for RecordingLocation {
    fn request_authorization(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn aggregator(
    fetcher: Arc<dyn WeatherFetcher>,
    settings: Arc<MemorySettings>,
) -> (Aggregator, Arc<RecordingLocation>) {
    let location = Arc::new(RecordingLocation::default());
    let agg = Aggregator::new(fetcher, settings, location.clone());
    (agg, location)
}

/// Wait for the first event matching `pred`, skipping others.
pub async fn next_event(
    rx: &mut broadcast::Receiver<Event>,
    pred: impl Fn(&Event) -> bool,
) -> Event {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Wait until the list holds `len` entries.
pub async fn wait_for_len(aggregator: &Aggregator, len: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while aggregator.snapshot().entries.len() != len {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("timed out waiting for list length");
}

pub fn names(aggregator: &Aggregator) -> Vec<String> {
    aggregator
        .snapshot()
        .entries
        .into_iter()
        .map(|e| e.record.place_name)
        .collect()
}

/// Runs `hook` once, synchronously, when an event with `message` is logged.
pub struct OnLog {
    message: &'static str,
    hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl OnLog {
    pub fn new(message: &'static str, hook: impl FnOnce() + Send + 'static) -> Self {
        Self {
            message,
            hook: Mutex::new(Some(Box::new(hook))),
        }
    }
}

struct MessageField(Option<String>);

impl Visit for MessageField {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = Some(format!("{value:?}"));
        }
    }
}

impl Subscriber for OnLog {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        true
    }

    fn new_span(&self, _: &span::Attributes<'_>) -> span::Id {
        span::Id::from_u64(1)
    }

    fn record(&self, _: &span::Id, _: &span::Record<'_>) {}

    fn record_follows_from(&self, _: &span::Id, _: &span::Id) {}

    fn event(&self, event: &tracing::Event<'_>) {
        let mut message = MessageField(None);
        event.record(&mut message);
        if message.0.as_deref() != Some(self.message) {
            return;
        }

        let hook = self.hook.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn enter(&self, _: &span::Id) {}

    fn exit(&self, _: &span::Id) {}
}
