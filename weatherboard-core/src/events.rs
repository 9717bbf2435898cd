//! Messages crossing the aggregator boundary in both directions.

use crate::{
    coordinate::{Coordinate, GeoPoint},
    error::FetchErrorKind,
    model::{LocationAuthorization, UnitPreference},
};

/// Lifecycle of one aggregator session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    AwaitingAuthorization,
    AuthorizedAwaitingLocation,
    Denied,
    Ready,
}

/// Why a group of fetches was dispatched together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Initial,
    CurrentLocation,
    AddCity,
    Refresh,
}

/// Tally published once every fetch of a batch has resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub kind: BatchKind,
    pub applied: usize,
    pub dropped: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn empty(kind: BatchKind) -> Self {
        Self {
            kind,
            applied: 0,
            dropped: 0,
            failed: 0,
        }
    }
}

/// What a failed lookup was for.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchTarget {
    Coordinate(Coordinate),
    Name(String),
}

impl std::fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchTarget::Coordinate(coord) => write!(f, "{coord}"),
            FetchTarget::Name(name) => f.write_str(name),
        }
    }
}

/// Notifications from the aggregator to its listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ListChanged,
    UnitRenderingChanged(UnitPreference),
    FetchFailed {
        target: FetchTarget,
        kind: FetchErrorKind,
        message: String,
    },
    BatchSettled(BatchReport),
    /// The current-location fetch of a refresh resolved (or there was none).
    RefreshFinished,
    SessionChanged(SessionState),
}

/// User and platform actions delivered into the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CitySelected(GeoPoint),
    CityNamed(String),
    UnitChanged(UnitPreference),
    DeleteRow(usize),
    Refresh,
    AuthorizationChanged {
        state: LocationAuthorization,
        last_known: Option<GeoPoint>,
    },
}
