use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

use crate::{
    location::{
        LocationReading, LocationService, PermissionAuthority, PermissionStatus,
        PositionProvider,
    },
    prelude::*,
    settings::MonitorSettings,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LocationEvent {
    /// A new fix came in while monitoring
    LocationChanged(LocationReading),
    /// Monitoring was started (`true`) or stopped (`false`)
    MonitoringStatusChanged(bool),
}

/// Permission gated location access, both one-shot ([LocationMonitor::get_current_location])
/// and continuous ([LocationMonitor::start_monitoring]).
///
/// Continuous monitoring runs as a background tokio task that polls the [PositionProvider] and
/// broadcasts [LocationEvent]s to everyone who called [LocationMonitor::subscribe].
/// Dropping the monitor stops that task.
pub struct LocationMonitor<A: PermissionAuthority, P: PositionProvider> {
    inner: Arc<MonitorInner<A, P>>,
}

struct MonitorInner<A: PermissionAuthority, P: PositionProvider> {
    permissions: A,
    provider: P,
    settings: MonitorSettings,
    /// Token for the active session, [None] when idle. Held while emitting so stopping and
    /// emitting can't interleave.
    session: Mutex<Option<CancellationToken>>,
    monitoring: AtomicBool,
    events: broadcast::Sender<LocationEvent>,
    /// Parent of every session token, cancelled when the monitor is dropped
    shutdown: CancellationToken,
}

impl<A: PermissionAuthority, P: PositionProvider> LocationMonitor<A, P> {
    pub fn new(permissions: A, provider: P, settings: MonitorSettings) -> Self {
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        Self {
            inner: Arc::new(MonitorInner {
                permissions,
                provider,
                settings,
                session: Mutex::new(None),
                monitoring: AtomicBool::new(false),
                events,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Location is available on every platform we run on
    pub fn is_supported(&self) -> bool {
        true
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.monitoring.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LocationEvent> {
        self.inner.events.subscribe()
    }

    /// Get a single fix, prompting for permission if needed.
    /// Returns [None] if permission is refused or no fix could be had in time.
    pub async fn get_current_location(&self) -> Option<LocationReading> {
        match self.inner.try_current_location().await {
            Ok(reading) => reading,
            Err(why) => {
                warn!("Failed to get location: {why:?}");
                None
            }
        }
    }

    /// Start continuous monitoring, returns whether monitoring is now active.
    pub async fn start_monitoring(&self) -> bool {
        let mut session = self.inner.session.lock().await;
        self.start_session(&mut session).await
    }

    /// Stop continuous monitoring, no [LocationEvent::LocationChanged] is sent once this returns.
    pub async fn stop_monitoring(&self) {
        let mut session = self.inner.session.lock().await;
        self.stop_session(&mut session);
    }

    /// Flip monitoring on or off, returns the new state.
    /// The current state is read under the session lock, so concurrent toggles alternate.
    pub async fn toggle_monitoring(&self) -> bool {
        let mut session = self.inner.session.lock().await;
        if session.is_some() {
            self.stop_session(&mut session);
            false
        } else {
            self.start_session(&mut session).await
        }
    }

    async fn start_session(&self, session: &mut Option<CancellationToken>) -> bool {
        if session.is_some() {
            return true;
        }

        if !self.inner.ensure_permission().await {
            return false;
        }

        let token = self.inner.shutdown.child_token();
        *session = Some(token.clone());
        self.inner.monitoring.store(true, Ordering::Release);
        self.inner.emit(LocationEvent::MonitoringStatusChanged(true));

        info!(
            "Location monitoring started, polling every {:?}",
            self.inner.settings.poll_interval()
        );

        let inner = self.inner.clone();
        tokio::spawn(async move {
            inner.monitor_loop(token).await;
        });

        true
    }

    fn stop_session(&self, session: &mut Option<CancellationToken>) {
        if let Some(token) = session.take() {
            token.cancel();
            self.inner.monitoring.store(false, Ordering::Release);
            self.inner
                .emit(LocationEvent::MonitoringStatusChanged(false));
            info!("Location monitoring stopped");
        }
    }
}

impl<A: PermissionAuthority, P: PositionProvider> MonitorInner<A, P> {
    fn emit(&self, event: LocationEvent) {
        // Err only means nobody is listening right now
        self.events.send(event).ok();
    }

    /// Make sure we're allowed to use location, only prompting the user if we aren't already.
    async fn ensure_permission(&self) -> bool {
        match self.permissions.check_status().await {
            Ok(PermissionStatus::Granted) => return true,
            Ok(_) => {}
            Err(why) => warn!("Failed to check location permission: {why:?}"),
        }

        match self.permissions.request().await {
            Ok(PermissionStatus::Granted) => true,
            Ok(status) => {
                info!("Location permission not granted ({status:?})");
                false
            }
            Err(why) => {
                warn!("Failed to request location permission: {why:?}");
                false
            }
        }
    }

    /// `Ok(None)` when permission is refused, `Err` when the provider fails or times out
    async fn try_current_location(&self) -> Result<Option<LocationReading>> {
        if !self.ensure_permission().await {
            return Ok(None);
        }

        let timeout = self.settings.fix_timeout();
        let reading = tokio::time::timeout(
            timeout,
            self.provider.get_location(self.settings.accuracy, timeout),
        )
        .await
        .with_context(|| format!("Timed out after {timeout:?} waiting for a fix"))?
        .context("Positioning provider failed")?;

        Ok(Some(reading))
    }

    async fn emit_reading(&self, token: &CancellationToken, reading: LocationReading) {
        let _session = self.session.lock().await;
        if !token.is_cancelled() {
            self.emit(LocationEvent::LocationChanged(reading));
        }
    }

    async fn monitor_loop(&self, token: CancellationToken) {
        debug!("Location monitor loop starting");

        loop {
            let delay: Duration = tokio::select! {
                biased;

                _ = token.cancelled() => {
                    break;
                }

                res = self.try_current_location() => match res {
                    Ok(Some(reading)) => {
                        self.emit_reading(&token, reading).await;
                        self.settings.poll_interval()
                    }
                    Ok(None) => self.settings.poll_interval(),
                    Err(why) => {
                        warn!("Error in location monitoring, backing off: {why:?}");
                        self.settings.error_backoff()
                    }
                }
            };

            tokio::select! {
                biased;

                _ = token.cancelled() => {
                    break;
                }

                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("Location monitor loop exited");
    }
}

impl<A: PermissionAuthority, P: PositionProvider> LocationService for LocationMonitor<A, P> {
    async fn current_location(&self) -> Option<LocationReading> {
        self.get_current_location().await
    }
}

impl<A: PermissionAuthority, P: PositionProvider> Drop for LocationMonitor<A, P> {
    fn drop(&mut self) {
        if self.is_monitoring() {
            debug!("Location monitor dropped while monitoring, cancelling");
        }
        self.inner.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        location::Coordinate,
        tests::{FailingProvider, FakePermissions, FakePosition, HangingProvider, SlowProvider},
    };
    use std::sync::atomic::AtomicUsize;
    use tokio::{sync::broadcast::error::TryRecvError, task::yield_now, test};

    type TestMonitor = LocationMonitor<FakePermissions, FakePosition>;

    fn mk_monitor(permissions: FakePermissions) -> TestMonitor {
        tokio::time::pause();
        LocationMonitor::new(
            permissions,
            FakePosition::new(Coordinate::new(50.0, -5.0).unwrap()),
            MonitorSettings::default(),
        )
    }

    fn drain(rx: &mut broadcast::Receiver<LocationEvent>) -> Vec<LocationEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(ev) => events.push(ev),
                Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        events
    }

    fn status_events(events: &[LocationEvent]) -> Vec<bool> {
        events
            .iter()
            .filter_map(|ev| match ev {
                LocationEvent::MonitoringStatusChanged(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    fn location_count(events: &[LocationEvent]) -> usize {
        events
            .iter()
            .filter(|ev| matches!(ev, LocationEvent::LocationChanged(_)))
            .count()
    }

    #[test]
    async fn test_current_location() {
        let monitor = mk_monitor(FakePermissions::granted());
        let reading = monitor
            .get_current_location()
            .await
            .expect("Expected a location");
        assert_eq!(reading.coordinate, Coordinate::new(50.0, -5.0).unwrap());
        assert!(monitor.is_supported());
    }

    #[test]
    async fn test_current_location_denied() {
        let permissions = FakePermissions::denied();
        let monitor = mk_monitor(permissions.clone());
        assert!(monitor.get_current_location().await.is_none());
        assert_eq!(permissions.requests(), 1, "Should have prompted once");
    }

    #[test]
    async fn test_no_prompt_when_already_granted() {
        let permissions = FakePermissions::granted();
        let monitor = mk_monitor(permissions.clone());
        monitor.get_current_location().await;
        assert_eq!(permissions.checks(), 1);
        assert_eq!(permissions.requests(), 0, "Prompted despite being granted");
    }

    #[test]
    async fn test_prompt_grants_access() {
        let permissions = FakePermissions::grant_on_request();
        let monitor = mk_monitor(permissions.clone());
        assert!(monitor.get_current_location().await.is_some());
        assert_eq!(permissions.requests(), 1);
    }

    #[test]
    async fn test_current_location_timeout() {
        tokio::time::pause();
        let monitor = LocationMonitor::new(
            FakePermissions::granted(),
            HangingProvider,
            MonitorSettings::default(),
        );

        let start = tokio::time::Instant::now();
        assert!(monitor.get_current_location().await.is_none());
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(11));
    }

    #[test]
    async fn test_current_location_provider_error() {
        tokio::time::pause();
        let monitor = LocationMonitor::new(
            FakePermissions::granted(),
            FailingProvider::default(),
            MonitorSettings::default(),
        );
        assert!(monitor.get_current_location().await.is_none());
    }

    #[test]
    async fn test_start_twice_single_status_event() {
        let monitor = mk_monitor(FakePermissions::granted());
        let mut rx = monitor.subscribe();

        assert!(monitor.start_monitoring().await);
        assert!(monitor.start_monitoring().await);
        assert!(monitor.is_monitoring());

        let events = drain(&mut rx);
        assert_eq!(status_events(&events), vec![true]);
    }

    #[test]
    async fn test_start_denied() {
        let monitor = mk_monitor(FakePermissions::denied());
        let mut rx = monitor.subscribe();

        assert!(!monitor.start_monitoring().await);
        assert!(!monitor.is_monitoring());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    async fn test_monitoring_emits_every_poll() {
        let monitor = mk_monitor(FakePermissions::granted());
        let mut rx = monitor.subscribe();

        monitor.start_monitoring().await;
        // Fixes at t=0, 2, 4, 6
        tokio::time::sleep(Duration::from_millis(7000)).await;

        let events = drain(&mut rx);
        assert_eq!(location_count(&events), 4);
        assert!(matches!(
            events.first(),
            Some(LocationEvent::MonitoringStatusChanged(true))
        ));
    }

    #[test]
    async fn test_no_events_after_stop() {
        let monitor = mk_monitor(FakePermissions::granted());
        let mut rx = monitor.subscribe();

        monitor.start_monitoring().await;
        tokio::time::sleep(Duration::from_millis(3000)).await;
        monitor.stop_monitoring().await;
        assert!(!monitor.is_monitoring());

        let events = drain(&mut rx);
        assert!(location_count(&events) > 0);
        assert_eq!(status_events(&events), vec![true, false]);

        tokio::time::sleep(Duration::from_secs(30)).await;
        yield_now().await;

        assert!(
            drain(&mut rx).is_empty(),
            "Received events after monitoring stopped"
        );
    }

    #[test]
    async fn test_fix_in_flight_at_stop_is_dropped() {
        tokio::time::pause();
        let provider = SlowProvider::new(
            Coordinate::new(50.0, -5.0).unwrap(),
            Duration::from_millis(1500),
        );
        let started = provider.started.clone();
        let monitor = LocationMonitor::new(
            FakePermissions::granted(),
            provider,
            MonitorSettings::default(),
        );
        let mut rx = monitor.subscribe();

        monitor.start_monitoring().await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1, "Fix should be pending");
        monitor.stop_monitoring().await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        yield_now().await;

        let events = drain(&mut rx);
        assert_eq!(location_count(&events), 0, "Reported a fix after stopping");
        assert_eq!(status_events(&events), vec![true, false]);
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[test]
    async fn test_concurrent_toggles_alternate() {
        let monitor = mk_monitor(FakePermissions::granted());
        let mut rx = monitor.subscribe();

        let (a, b) = tokio::join!(monitor.toggle_monitoring(), monitor.toggle_monitoring());
        assert_ne!(a, b, "Both toggles took the same branch");
        assert!(!monitor.is_monitoring());
        assert_eq!(status_events(&drain(&mut rx)), vec![true, false]);
    }

    #[test]
    async fn test_stop_idempotent() {
        let monitor = mk_monitor(FakePermissions::granted());
        let mut rx = monitor.subscribe();

        monitor.stop_monitoring().await;
        assert!(drain(&mut rx).is_empty());

        monitor.start_monitoring().await;
        monitor.stop_monitoring().await;
        monitor.stop_monitoring().await;
        assert_eq!(status_events(&drain(&mut rx)), vec![true, false]);
    }

    #[test]
    async fn test_toggle() {
        let monitor = mk_monitor(FakePermissions::granted());

        assert!(monitor.toggle_monitoring().await);
        assert!(monitor.is_monitoring());
        assert!(!monitor.toggle_monitoring().await);
        assert!(!monitor.is_monitoring());
        assert!(monitor.toggle_monitoring().await);
    }

    #[test]
    async fn test_toggle_denied() {
        let monitor = mk_monitor(FakePermissions::denied());
        assert!(!monitor.toggle_monitoring().await);
        assert!(!monitor.is_monitoring());
    }

    #[test]
    async fn test_backoff_after_failure() {
        tokio::time::pause();
        let provider = FailingProvider::default();
        let calls = provider.calls.clone();
        let monitor = LocationMonitor::new(
            FakePermissions::granted(),
            provider,
            MonitorSettings::default(),
        );

        monitor.start_monitoring().await;
        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "Retried before backoff");

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2, "Loop gave up after failure");
        assert!(monitor.is_monitoring());
    }

    #[test]
    async fn test_drop_stops_loop() {
        let position = FakePosition::new(Coordinate::new(1.0, 1.0).unwrap());
        let calls: Arc<AtomicUsize> = position.calls.clone();
        tokio::time::pause();
        let monitor =
            LocationMonitor::new(FakePermissions::granted(), position, MonitorSettings::default());

        monitor.start_monitoring().await;
        tokio::time::sleep(Duration::from_millis(1000)).await;
        drop(monitor);
        let after_drop = calls.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_drop);
    }

    #[test]
    async fn test_restart_after_stop() {
        let monitor = mk_monitor(FakePermissions::granted());
        let mut rx = monitor.subscribe();

        monitor.start_monitoring().await;
        monitor.stop_monitoring().await;
        assert!(monitor.start_monitoring().await);
        tokio::time::sleep(Duration::from_millis(500)).await;

        let events = drain(&mut rx);
        assert_eq!(status_events(&events), vec![true, false, true]);
        assert_eq!(location_count(&events), 1);
    }
}
