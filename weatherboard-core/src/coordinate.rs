use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Number of decimal places kept when deciding whether two points are the same place.
///
/// Two decimals is roughly one kilometre of latitude.
pub const IDENTITY_PRECISION: u32 = 2;

const SCALE: f64 = 10u32.pow(IDENTITY_PRECISION) as f64;

/// A raw latitude/longitude pair, exactly as a geolocation source or a weather
/// provider reported it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Round to identity precision.
    pub fn rounded(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lon)
    }

    /// Reject non-finite and out-of-range values.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            anyhow::bail!("Latitude {} is out of range (-90..=90)", self.lat);
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            anyhow::bail!("Longitude {} is out of range (-180..=180)", self.lon);
        }
        Ok(())
    }
}

/// Identity key of a [`Coordinate`]: both axes scaled to integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaceKey {
    lat: i64,
    lon: i64,
}

/// A coordinate rounded to [`IDENTITY_PRECISION`] decimal places.
///
/// Equality and hashing go through [`PlaceKey`], so two coordinates compare
/// equal exactly when they denote the same place. Deserialization re-rounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(from = "GeoPoint", into = "GeoPoint")]
pub struct Coordinate {
    lat: f64,
    lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat: round_axis(lat),
            lon: round_axis(lon),
        }
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    pub fn place_key(&self) -> PlaceKey {
        PlaceKey {
            lat: scaled(self.lat),
            lon: scaled(self.lon),
        }
    }

    pub fn same_place(&self, other: &Coordinate) -> bool {
        self.place_key() == other.place_key()
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.same_place(other)
    }
}

impl Eq for Coordinate {}

impl Hash for Coordinate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.place_key().hash(state);
    }
}

impl From<GeoPoint> for Coordinate {
    fn from(point: GeoPoint) -> Self {
        point.rounded()
    }
}

impl From<Coordinate> for GeoPoint {
    fn from(coord: Coordinate) -> Self {
        GeoPoint::new(coord.lat, coord.lon)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}, {:.2}", self.lat, self.lon)
    }
}

fn scaled(value: f64) -> i64 {
    (value * SCALE).round() as i64
}

fn round_axis(value: f64) -> f64 {
    // Normalizes -0.0 to 0.0 as a side effect of going through the integer key.
    scaled(value) as f64 / SCALE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_two_decimals() {
        let coord = Coordinate::new(37.566_535, 126.977_969);
        assert_eq!(coord.lat(), 37.57);
        assert_eq!(coord.lon(), 126.98);
    }

    #[test]
    fn same_place_iff_rounded_forms_match() {
        let a = GeoPoint::new(35.001, 129.004).rounded();
        let b = GeoPoint::new(34.998, 128.996).rounded();
        let c = GeoPoint::new(35.006, 129.0).rounded();

        assert_eq!(a, b);
        assert!(a.same_place(&b));
        assert_ne!(a, c);
    }

    #[test]
    fn negative_zero_is_the_same_place_as_zero() {
        let a = Coordinate::new(-0.001, 0.0);
        let b = Coordinate::new(0.0, -0.0);
        assert_eq!(a, b);
        assert!(a.lat().is_sign_positive());
    }

    #[test]
    fn deserializing_rounds_raw_values() {
        let coord: Coordinate = serde_json::from_str(r#"{"lat":51.50735,"lon":-0.12776}"#)
            .expect("coordinate should parse");
        assert_eq!(coord.lat(), 51.51);
        assert_eq!(coord.lon(), -0.13);

        let json = serde_json::to_string(&coord).expect("coordinate should serialize");
        assert_eq!(json, r#"{"lat":51.51,"lon":-0.13}"#);
    }

    #[test]
    fn validate_rejects_out_of_range_points() {
        assert!(GeoPoint::new(91.0, 0.0).validate().is_err());
        assert!(GeoPoint::new(0.0, -180.5).validate().is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).validate().is_err());
        assert!(GeoPoint::new(-33.87, 151.21).validate().is_ok());
    }
}
