use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::location::Accuracy;

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Tuning for [crate::LocationMonitor]
pub struct MonitorSettings {
    /// Time to wait between successful fixes while monitoring
    pub poll_interval_ms: u64,
    /// Time to wait after a failed fix before trying again
    pub error_backoff_ms: u64,
    /// Hard limit on how long a single fix may take
    pub fix_timeout_ms: u64,
    /// Accuracy hint passed to the positioning provider
    pub accuracy: Accuracy,
    /// How many events a slow subscriber may fall behind before it starts missing them
    pub event_capacity: usize,
}

impl MonitorSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn fix_timeout(&self) -> Duration {
        Duration::from_millis(self.fix_timeout_ms)
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            error_backoff_ms: 5000,
            fix_timeout_ms: 10000,
            accuracy: Accuracy::Medium,
            event_capacity: 32,
        }
    }
}
