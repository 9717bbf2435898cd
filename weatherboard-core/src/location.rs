use std::fmt::Debug;
use tokio::sync::mpsc;

use crate::{coordinate::GeoPoint, events::Command, model::LocationAuthorization};

/// Geolocation source. Answers arrive later as [`Command::AuthorizationChanged`].
pub trait LocationProvider: Send + Sync + Debug {
    fn request_authorization(&self);
}

/// A location source backed by a configured position.
///
/// With a position it grants access and reports it; without one it denies.
#[derive(Debug, Clone)]
pub struct FixedLocation {
    point: Option<GeoPoint>,
    bus: mpsc::Sender<Command>,
}

impl FixedLocation {
    pub fn new(point: Option<GeoPoint>, bus: mpsc::Sender<Command>) -> Self {
        Self { point, bus }
    }
}

impl LocationProvider for FixedLocation {
    fn request_authorization(&self) {
        let command = match self.point {
            Some(point) => Command::AuthorizationChanged {
                state: LocationAuthorization::Granted,
                last_known: Some(point),
            },
            None => Command::AuthorizationChanged {
                state: LocationAuthorization::Denied,
                last_known: None,
            },
        };

        if let Err(err) = self.bus.try_send(command) {
            tracing::warn!(error = %err, "Dropped location authorization answer");
        }
    }
}
