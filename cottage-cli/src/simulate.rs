//! Stand-ins for the device sensors so the guidance pipeline can be run from a terminal

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::bail;
use cottage_logic::{
    Accuracy, BearingResult, BearingTracker, Coordinate, HeadingCallback, HeadingEvent,
    HeadingMonitor, HeadingReading, HeadingSensor, LocationMonitor, LocationReading,
    MonitorSettings, PermissionAuthority, PermissionStatus, PositionProvider, SensorSpeed,
    SubscriptionId, geodesy, prelude::*,
};
use log::info;
use tokio::sync::broadcast::error::TryRecvError;

/// Stop once we're this close to the cottage
const ARRIVAL_METERS: f64 = 25.0;

/// A terminal has no permission prompt
pub struct AlwaysGranted;

impl PermissionAuthority for AlwaysGranted {
    async fn check_status(&self) -> Result<PermissionStatus> {
        Ok(PermissionStatus::Granted)
    }

    async fn request(&self) -> Result<PermissionStatus> {
        Ok(PermissionStatus::Granted)
    }
}

/// Walks in a straight line towards a target, one step per fix
pub struct SimulatedWalk {
    position: Mutex<Coordinate>,
    target: Coordinate,
    step_meters: f64,
}

impl SimulatedWalk {
    pub fn new(start: Coordinate, target: Coordinate, step_meters: f64) -> Self {
        Self {
            position: Mutex::new(start),
            target,
            step_meters,
        }
    }

    fn step(&self) -> Result<Coordinate> {
        let mut position = self
            .position
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let remaining = geodesy::distance(*position, self.target);
        if remaining <= self.step_meters {
            *position = self.target;
            return Ok(self.target);
        }

        let fraction = self.step_meters / remaining;
        let lat = position.latitude() + (self.target.latitude() - position.latitude()) * fraction;
        // Take the short way across the antimeridian
        let delta_lon = geodesy::normalize_degrees(
            self.target.longitude() - position.longitude() + 180.0,
        ) - 180.0;
        let lon = position.longitude() + delta_lon * fraction;
        let lon = geodesy::normalize_degrees(lon + 180.0) - 180.0;
        *position = Coordinate::new(lat, lon)?;
        Ok(*position)
    }
}

impl PositionProvider for SimulatedWalk {
    async fn get_location(&self, _accuracy: Accuracy, _timeout: Duration) -> Result<LocationReading> {
        let coordinate = self.step()?;
        Ok(LocationReading {
            accuracy_meters: Some(5.0),
            ..LocationReading::new(coordinate, chrono::Utc::now())
        })
    }
}

/// Compass whose heading is set by hand
#[derive(Default)]
pub struct SimulatedCompass {
    monitoring: AtomicBool,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, HeadingCallback>>,
}

impl SimulatedCompass {
    pub fn set_heading(&self, degrees: f64) {
        if !self.is_monitoring() {
            return;
        }
        let subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for callback in subscribers.values() {
            callback(degrees);
        }
    }
}

impl HeadingSensor for SimulatedCompass {
    fn is_supported(&self) -> bool {
        true
    }

    fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::Acquire)
    }

    fn start(&self, _speed: SensorSpeed) -> Result {
        self.monitoring.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&self) -> Result {
        self.monitoring.store(false, Ordering::Release);
        Ok(())
    }

    fn subscribe(&self, callback: HeadingCallback) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, callback);
        SubscriptionId(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id.0);
    }
}

/// Arrow pointing the way to turn, 8 directions relative to where the device faces
fn arrow(relative_degrees: f64) -> char {
    const ARROWS: [char; 8] = ['↑', '↗', '→', '↘', '↓', '↙', '←', '↖'];
    ARROWS[((relative_degrees / 45.0).round() as usize) % ARROWS.len()]
}

fn print_step(step: usize, result: &BearingResult, heading: Option<&HeadingReading>) {
    let pointer = heading
        .map(|h| arrow(result.relative_bearing(h.heading_magnetic_north)))
        .unwrap_or('?');
    println!(
        "{step:>3}  {pointer}  {:>6.1}° {:<3}  {:>8.0} m  ({})  {}",
        result.bearing_degrees,
        result.compass_direction,
        result.distance_meters,
        result.from,
        heading.map(|h| h.label.as_str()).unwrap_or("Compass: --"),
    );
}

/// Walk from `start` to `target`, printing live guidance as the monitors report in
pub async fn run(
    start: Coordinate,
    target: Coordinate,
    step_meters: f64,
    max_steps: usize,
    settings: MonitorSettings,
) -> Result {
    let walk = SimulatedWalk::new(start, target, step_meters);
    let monitor = Arc::new(LocationMonitor::new(AlwaysGranted, walk, settings));
    let compass = Arc::new(SimulatedCompass::default());
    let heading_monitor = HeadingMonitor::new(compass.clone(), 16);
    let tracker = BearingTracker::new(monitor.clone());

    let mut heading_events = heading_monitor.subscribe();
    if !heading_monitor.start() {
        bail!("Compass is not available");
    }

    let Some(initial) = tracker.bearing_to_target(target).await else {
        bail!("Couldn't get a starting location");
    };
    info!(
        "Starting {:.0} m from target, heading {}",
        initial.distance_meters, initial.compass_direction
    );

    let mut location_events = monitor.subscribe();
    if !monitor.start_monitoring().await {
        bail!("Location monitoring could not be started");
    }

    let mut latest_heading: Option<HeadingReading> = None;
    let mut steps = 0;
    let mut finished = false;

    tracker
        .track(target, &mut location_events, |result| {
            if finished {
                return;
            }
            steps += 1;

            // Pretend the walker faces roughly the right way, drifting a little each step
            let drift = if steps % 2 == 0 { 12.0 } else { -8.0 };
            compass.set_heading(result.bearing_degrees + drift);

            loop {
                match heading_events.try_recv() {
                    Ok(HeadingEvent::HeadingChanged(reading)) => latest_heading = Some(reading),
                    Ok(HeadingEvent::MonitoringStatusChanged(_)) => {}
                    Err(TryRecvError::Lagged(_)) => {}
                    Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                }
            }

            print_step(steps, &result, latest_heading.as_ref());

            if result.distance_meters <= ARRIVAL_METERS || steps >= max_steps {
                finished = true;
                let monitor = monitor.clone();
                tokio::spawn(async move {
                    monitor.stop_monitoring().await;
                });
            }
        })
        .await;

    heading_monitor.stop();

    if steps > 0 && !finished {
        bail!("Location monitoring ended unexpectedly");
    }

    println!("Done after {steps} fixes");
    Ok(())
}
