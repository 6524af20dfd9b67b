//! Collaborator interfaces consumed by the coordinator.
//!
//! Everything here is implemented outside the core: preference storage,
//! the location database, the weather fetch service, the notification
//! renderer and the two monitored subsystems. All calls are synchronous
//! and must return quickly; refresh requests are fire-and-forget.

use crate::config::{AutoUpdatePeriod, NotificationInterval, Preferences, UpdatePeriod};
use crate::error::Result;
use crate::scheduler::binding::Subsystem;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Which periodic refresh a night-suppression flag applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateSource {
    /// Secondary locations refreshed by `RegularLocationUpdate`.
    Regular,
    /// Primary location refreshed by `AutoLocationUpdate`.
    Auto,
}

/// Read access to the user's current preferences.
pub trait ConfigProvider: Send + Sync {
    fn regular_update_period(&self) -> Result<UpdatePeriod>;
    fn auto_update_period(&self) -> Result<AutoUpdatePeriod>;
    fn notification_interval(&self) -> Result<NotificationInterval>;
    /// Whether refreshes from `source` are skipped before the night ends.
    fn night_suppression_enabled(&self, source: UpdateSource) -> Result<bool>;
    fn notifications_enabled(&self) -> Result<bool>;

    /// Every preference from a single read of the backing store.
    ///
    /// The default assembles the getters one by one. Providers whose storage
    /// can change between two getter calls override it.
    fn preferences(&self) -> Result<Preferences> {
        Ok(Preferences {
            location_update_period: self.regular_update_period()?,
            location_auto_update_period: self.auto_update_period()?,
            location_update_night: self.night_suppression_enabled(UpdateSource::Regular)?,
            location_auto_update_night: self.night_suppression_enabled(UpdateSource::Auto)?,
            notifications_enabled: self.notifications_enabled()?,
            notification_interval: self.notification_interval()?,
        })
    }
}

/// A configured weather location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Database identifier.
    pub id: i64,
    /// Display order; `0` is the primary (auto-detected) location.
    pub order_id: u32,
    /// Whether the location is active.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Location {
    /// Order id reserved for the primary location.
    pub const PRIMARY_ORDER_ID: u32 = 0;

    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.order_id == Self::PRIMARY_ORDER_ID
    }
}

/// Read access to configured locations.
pub trait LocationStore: Send + Sync {
    /// Every location, ordered by `order_id`.
    fn all_locations(&self) -> Result<Vec<Location>>;
    /// The location with order id 0, if one exists.
    fn primary_location(&self) -> Result<Option<Location>>;
}

/// Decides whether a stored forecast is stale.
pub trait ForecastDueOracle: Send + Sync {
    /// Whether the short-range forecast of `location_id` should be fetched again.
    fn should_refresh_forecast(&self, location_id: i64) -> bool;
}

/// Fire-and-forget sink for weather refresh requests.
pub trait WeatherFetchService: Send + Sync {
    /// Refresh current weather for one location.
    fn request_location_refresh(&self, location_id: i64);
    /// Resolve the device position, then refresh weather for the primary location.
    fn request_auto_location_refresh(&self, primary_location_id: i64);
    /// Refresh the forecast for one location.
    fn request_forecast_refresh(&self, location_id: i64);
}

/// Fire-and-forget sink for the user notification.
pub trait NotificationSink: Send + Sync {
    fn request_notification_refresh(&self);
    /// Remove every notification currently shown.
    fn cancel_all_notifications(&self);
}

/// Live handle to a bound subsystem.
///
/// Called while the coordinator holds its lock, so implementations must
/// not block and must not call back into the coordinator synchronously.
pub trait SubsystemHandle: Send + Sync {
    /// Begin monitoring; the sensor monitor receives the origin location index.
    fn start_updates(&self, origin_index: Option<usize>);
    fn stop_updates(&self);
}

/// Starts asynchronous connections to subsystems.
///
/// The outcome is reported back through
/// [`AlarmCoordinator::on_binding_changed`](crate::scheduler::AlarmCoordinator::on_binding_changed).
pub trait SubsystemConnector: Send + Sync {
    fn connect(&self, subsystem: Subsystem);
}

/// Time source for arming and night-hour checks.
pub trait Clock: Send + Sync {
    /// Monotonic now, used to stamp armed triggers.
    fn now(&self) -> Instant;
    /// Hour of day (0-23) in the device's local time zone.
    fn local_hour(&self) -> u32;
}

/// Wall clock backed by `chrono::Local`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn local_hour(&self) -> u32 {
        use chrono::Timelike;
        chrono::Local::now().hour()
    }
}
