use std::sync::{Arc, Mutex};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{geodesy::normalize_degrees, prelude::*};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
/// How often the sensor should report
pub enum SensorSpeed {
    #[default]
    Default,
    /// Rate suitable for updating the UI
    Ui,
    Game,
    Fastest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Called by the sensor with the raw heading in degrees from magnetic north
pub type HeadingCallback = Box<dyn Fn(f64) + Send + Sync>;

/// A push based compass. Implementors must not invoke a callback after
/// [HeadingSensor::unsubscribe] for it has returned.
pub trait HeadingSensor: Send + Sync {
    fn is_supported(&self) -> bool;
    fn is_monitoring(&self) -> bool;
    fn start(&self, speed: SensorSpeed) -> Result;
    fn stop(&self) -> Result;
    fn subscribe(&self, callback: HeadingCallback) -> SubscriptionId;
    fn unsubscribe(&self, id: SubscriptionId);
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeadingReading {
    /// Degrees clockwise from magnetic north, in `[0, 360)`
    pub heading_magnetic_north: f64,
    /// Display string, e.g. `Compass: 123.4°`
    pub label: String,
}

impl HeadingReading {
    pub fn new(raw_heading: f64) -> Self {
        let heading = normalize_degrees(raw_heading);
        Self {
            heading_magnetic_north: heading,
            label: format!("Compass: {heading:.1}°"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HeadingEvent {
    HeadingChanged(HeadingReading),
    /// Monitoring was started (`true`) or stopped (`false`)
    MonitoringStatusChanged(bool),
}

/// Adapts a [HeadingSensor]'s callbacks into [HeadingEvent]s.
/// Whether the sensor is running is owned by the sensor, this only forwards it.
pub struct HeadingMonitor<S: HeadingSensor> {
    sensor: Arc<S>,
    subscription: Mutex<Option<SubscriptionId>>,
    events: broadcast::Sender<HeadingEvent>,
}

impl<S: HeadingSensor> HeadingMonitor<S> {
    pub fn new(sensor: Arc<S>, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            sensor,
            subscription: Mutex::new(None),
            events,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.sensor.is_supported()
    }

    pub fn is_monitoring(&self) -> bool {
        self.sensor.is_monitoring()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HeadingEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: HeadingEvent) {
        self.events.send(event).ok();
    }

    fn lock_subscription(&self) -> std::sync::MutexGuard<'_, Option<SubscriptionId>> {
        // Nothing we do under this lock can leave it inconsistent
        self.subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start the compass, returns whether it's running
    pub fn start(&self) -> bool {
        let mut subscription = self.lock_subscription();
        self.start_locked(&mut subscription)
    }

    pub fn stop(&self) {
        let mut subscription = self.lock_subscription();
        self.stop_locked(&mut subscription);
    }

    /// Flip the compass on or off, returns the new state.
    /// Decided under the subscription lock, so concurrent toggles alternate.
    pub fn toggle(&self) -> bool {
        let mut subscription = self.lock_subscription();
        if self.is_monitoring() {
            self.stop_locked(&mut subscription);
            false
        } else {
            self.start_locked(&mut subscription)
        }
    }

    fn start_locked(&self, subscription: &mut Option<SubscriptionId>) -> bool {
        if !self.is_supported() {
            return false;
        }

        if self.is_monitoring() {
            return true;
        }

        // Clean up after the sensor being stopped behind our back
        if let Some(stale) = subscription.take() {
            self.sensor.unsubscribe(stale);
        }

        let events = self.events.clone();
        let id = self.sensor.subscribe(Box::new(move |raw| {
            events
                .send(HeadingEvent::HeadingChanged(HeadingReading::new(raw)))
                .ok();
        }));

        if let Err(why) = self.sensor.start(SensorSpeed::Ui) {
            warn!("Failed to start compass: {why:?}");
            self.sensor.unsubscribe(id);
            return false;
        }

        *subscription = Some(id);

        info!("Compass monitoring started");
        self.emit(HeadingEvent::MonitoringStatusChanged(true));
        true
    }

    fn stop_locked(&self, subscription: &mut Option<SubscriptionId>) {
        if !self.is_monitoring() {
            if let Some(stale) = subscription.take() {
                self.sensor.unsubscribe(stale);
            }
            return;
        }

        if let Err(why) = self.sensor.stop() {
            warn!("Failed to stop compass: {why:?}");
        }

        if let Some(id) = subscription.take() {
            self.sensor.unsubscribe(id);
        }

        info!("Compass monitoring stopped");
        self.emit(HeadingEvent::MonitoringStatusChanged(false));
    }
}

impl<S: HeadingSensor> Drop for HeadingMonitor<S> {
    fn drop(&mut self) {
        let subscription = self
            .subscription
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(id) = subscription {
            if self.sensor.is_monitoring() {
                self.sensor.stop().ok();
            }
            self.sensor.unsubscribe(id);
        }
    }
}
