use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    UtcDT, geodesy,
    location::{Coordinate, LocationReading, LocationService},
    location_monitor::LocationEvent,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
/// The 16 points of the compass rose
pub enum CompassDirection {
    N,
    NNE,
    NE,
    ENE,
    E,
    ESE,
    SE,
    SSE,
    S,
    SSW,
    SW,
    WSW,
    W,
    WNW,
    NW,
    NNW,
}

impl CompassDirection {
    /// Clockwise from north
    pub const ALL: [Self; 16] = [
        Self::N,
        Self::NNE,
        Self::NE,
        Self::ENE,
        Self::E,
        Self::ESE,
        Self::SE,
        Self::SSE,
        Self::S,
        Self::SSW,
        Self::SW,
        Self::WSW,
        Self::W,
        Self::WNW,
        Self::NW,
        Self::NNW,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::N => "N",
            Self::NNE => "NNE",
            Self::NE => "NE",
            Self::ENE => "ENE",
            Self::E => "E",
            Self::ESE => "ESE",
            Self::SE => "SE",
            Self::SSE => "SSE",
            Self::S => "S",
            Self::SSW => "SSW",
            Self::SW => "SW",
            Self::WSW => "WSW",
            Self::W => "W",
            Self::WNW => "WNW",
            Self::NW => "NW",
            Self::NNW => "NNW",
        }
    }
}

impl std::fmt::Display for CompassDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Direction and distance from one point to another at a moment in time
pub struct BearingResult {
    /// 0 is north, 90 east, 180 south, 270 west
    pub bearing_degrees: f64,
    /// Signed forward azimuth, see [geodesy::Bearing::radians]
    pub bearing_radians: f64,
    pub compass_direction: CompassDirection,
    pub distance_meters: f64,
    pub from: Coordinate,
    pub to: Coordinate,
    pub calculated_at: UtcDT,
}

impl BearingResult {
    pub fn between(from: Coordinate, to: Coordinate) -> Self {
        let bearing = geodesy::bearing(from, to);
        Self {
            bearing_degrees: bearing.degrees,
            bearing_radians: bearing.radians,
            compass_direction: geodesy::compass_direction(bearing.degrees),
            distance_meters: geodesy::distance(from, to),
            from,
            to,
            calculated_at: Utc::now(),
        }
    }

    pub fn distance_kilometers(&self) -> f64 {
        self.distance_meters / 1000.0
    }

    /// Angle to turn clockwise from the way the device is facing to face the target, in `[0, 360)`.
    /// This is what a directional arrow should be rotated by.
    pub fn relative_bearing(&self, heading_degrees: f64) -> f64 {
        geodesy::normalize_degrees(self.bearing_degrees - heading_degrees)
    }
}

/// Answers "which way, and how far" from wherever [LocationService] says we are
pub struct BearingTracker<L: LocationService> {
    location: L,
}

impl<L: LocationService> BearingTracker<L> {
    pub fn new(location: L) -> Self {
        Self { location }
    }

    /// Bearing from the current location to `target`, [None] if we can't get a location
    pub async fn bearing_to_target(&self, target: Coordinate) -> Option<BearingResult> {
        let current = self.location.current_location().await?;
        Some(BearingResult::between(current.coordinate, target))
    }

    pub fn bearing_between(&self, from: Coordinate, to: Coordinate) -> BearingResult {
        BearingResult::between(from, to)
    }

    pub fn bearing_from_reading(
        &self,
        reading: &LocationReading,
        target: Coordinate,
    ) -> BearingResult {
        BearingResult::between(reading.coordinate, target)
    }

    /// Continuously recompute the bearing to `target` as location events come in.
    /// Returns once monitoring is stopped or the monitor goes away.
    pub async fn track(
        &self,
        target: Coordinate,
        events: &mut broadcast::Receiver<LocationEvent>,
        mut on_update: impl FnMut(BearingResult),
    ) {
        loop {
            match events.recv().await {
                Ok(LocationEvent::LocationChanged(reading)) => {
                    on_update(self.bearing_from_reading(&reading, target));
                }
                Ok(LocationEvent::MonitoringStatusChanged(false)) | Err(RecvError::Closed) => {
                    break;
                }
                Ok(LocationEvent::MonitoringStatusChanged(true)) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Bearing tracker fell behind, skipped {skipped} location events");
                }
            }
        }
    }
}
