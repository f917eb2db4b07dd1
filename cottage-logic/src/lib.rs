mod bearing;
mod cottage;
pub mod geodesy;
mod heading;
mod location;
mod location_monitor;
mod settings;

pub use bearing::{BearingResult, BearingTracker, CompassDirection};
pub use cottage::{Cottage, CottageCache, DEFAULT_CACHE_EXPIRY, SearchResults};
pub use heading::{
    HeadingCallback, HeadingEvent, HeadingMonitor, HeadingReading, HeadingSensor, SensorSpeed,
    SubscriptionId,
};
pub use location::{
    Accuracy, Coordinate, LocationReading, LocationService, PermissionAuthority,
    PermissionStatus, PositionProvider,
};
pub use location_monitor::{LocationEvent, LocationMonitor};
pub use settings::MonitorSettings;

use chrono::{DateTime, Utc};

/// Convenience alias for UTC DT
pub type UtcDT = DateTime<Utc>;

pub mod prelude {
    use anyhow::Error as AnyhowError;
    use std::result::Result as StdResult;
    pub type Result<T = (), E = AnyhowError> = StdResult<T, E>;
    pub use anyhow::Context;
}
