use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, ensure};
use serde::{Deserialize, Serialize};

use crate::{UtcDT, prelude::*};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawCoordinate")]
/// A point on the globe in decimal degrees, always within the valid ranges
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = anyhow::Error;

    fn try_from(raw: RawCoordinate) -> Result<Self> {
        Self::new(raw.latitude, raw.longitude)
    }
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        ensure!(
            latitude.is_finite() && (-90.0..=90.0).contains(&latitude),
            "Latitude {latitude} is outside of [-90, 90]"
        );
        ensure!(
            longitude.is_finite() && (-180.0..=180.0).contains(&longitude),
            "Longitude {longitude} is outside of [-180, 180]"
        );
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5}, {:.5}", self.latitude, self.longitude)
    }
}

impl std::str::FromStr for Coordinate {
    type Err = anyhow::Error;

    /// Parses `"lat,lon"`
    fn from_str(s: &str) -> Result<Self> {
        let (lat, lon) = s
            .split_once(',')
            .ok_or_else(|| anyhow!("Expected \"lat,lon\", got \"{s}\""))?;
        let lat = lat.trim().parse::<f64>().context("Invalid latitude")?;
        let lon = lon.trim().parse::<f64>().context("Invalid longitude")?;
        Self::new(lat, lon)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// A single fix from a [PositionProvider]
pub struct LocationReading {
    pub coordinate: Coordinate,
    /// Horizontal accuracy in meters, if the platform reports it
    pub accuracy_meters: Option<f64>,
    /// Altitude above sea level in meters
    pub altitude_meters: Option<f64>,
    /// Direction of travel in degrees, GPS can't always determine this
    pub course: Option<f64>,
    /// When the fix was captured
    pub timestamp: UtcDT,
}

impl LocationReading {
    pub fn new(coordinate: Coordinate, timestamp: UtcDT) -> Self {
        Self {
            coordinate,
            accuracy_meters: None,
            altitude_meters: None,
            course: None,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
/// How precise a fix the positioning provider should try for
pub enum Accuracy {
    Lowest,
    Low,
    #[default]
    Medium,
    High,
    Best,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PermissionStatus {
    Unknown,
    Denied,
    /// Turned off at the OS level (parental controls, location services disabled, etc.)
    Restricted,
    Granted,
}

/// Grants (or refuses) access to the device location
pub trait PermissionAuthority: Send + Sync + 'static {
    /// Check the current status without prompting the user
    fn check_status(&self) -> impl Future<Output = Result<PermissionStatus>> + Send;
    /// Prompt the user for access
    fn request(&self) -> impl Future<Output = Result<PermissionStatus>> + Send;
}

/// Platform geolocation, one fix per call
pub trait PositionProvider: Send + Sync + 'static {
    /// Get a single fix, the provider should give up after `timeout`.
    fn get_location(
        &self,
        accuracy: Accuracy,
        timeout: Duration,
    ) -> impl Future<Output = Result<LocationReading>> + Send;
}

/// Anything that can answer "where am I right now", returns [None] if no location is available
pub trait LocationService: Send + Sync {
    fn current_location(&self) -> impl Future<Output = Option<LocationReading>> + Send;
}

impl<T: LocationService> LocationService for Arc<T> {
    fn current_location(&self) -> impl Future<Output = Option<LocationReading>> + Send {
        self.as_ref().current_location()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_ranges() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
        assert!(Coordinate::new(90.1, 0.0).is_err());
        assert!(Coordinate::new(0.0, -180.5).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_coordinate_parse() {
        let coord = "50.2660, -5.0527".parse::<Coordinate>().unwrap();
        assert_eq!(coord.latitude(), 50.266);
        assert_eq!(coord.longitude(), -5.0527);

        assert!("50.2660".parse::<Coordinate>().is_err());
        assert!("north,west".parse::<Coordinate>().is_err());
        assert!("100,0".parse::<Coordinate>().is_err());
    }

    #[test]
    fn test_coordinate_deserialize_validates() {
        let valid = Coordinate::try_from(RawCoordinate {
            latitude: 51.5,
            longitude: -0.1,
        });
        assert!(valid.is_ok());

        let invalid = Coordinate::try_from(RawCoordinate {
            latitude: 123.0,
            longitude: 0.0,
        });
        assert!(invalid.is_err());
    }
}
