//! Configuration types for the alarm scheduler.
//!
//! Preferences are persisted with the legacy string encoding used by the
//! settings screen (`"0"`, `"OFF"`, `"regular_only"`, or a number of
//! minutes) and converted into explicit enums on load, so the three auto
//! update states can never be confused with one another.

use crate::error::{Result, SchedulerError};
use crate::scheduler::ports::{ConfigProvider, Location, LocationStore, UpdateSource};
use crate::scheduler::wake_timer::ReliabilityTier;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest period accepted from storage: one leap year.
pub const MAX_PERIOD_MINUTES: u64 = 366 * 24 * 60;

fn parse_minutes(raw: &str) -> Result<u64> {
    let count = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| SchedulerError::Config(format!("invalid period {raw:?}: {e}")))?;
    if count > MAX_PERIOD_MINUTES {
        return Err(SchedulerError::Config(format!(
            "period {raw:?} exceeds {MAX_PERIOD_MINUTES} minutes"
        )));
    }
    Ok(count)
}

fn minutes(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(60))
}

/// Whole minutes, rounded up and kept within `1..=MAX_PERIOD_MINUTES` so a
/// timed period never persists as the `"0"` sentinel.
fn format_minutes(period: Duration) -> String {
    period
        .as_secs()
        .div_ceil(60)
        .clamp(1, MAX_PERIOD_MINUTES)
        .to_string()
}

/// Period of the regular (secondary location) refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum UpdatePeriod {
    /// `"0"`: no regular refresh.
    Disabled,
    /// Refresh every period.
    Every(Duration),
}

impl UpdatePeriod {
    /// Parse the persisted preference value.
    pub fn parse(raw: &str) -> Result<Self> {
        match parse_minutes(raw)? {
            0 => Ok(Self::Disabled),
            m => Ok(Self::Every(minutes(m))),
        }
    }

    #[must_use]
    pub fn period(self) -> Option<Duration> {
        match self {
            Self::Disabled => None,
            Self::Every(period) => Some(period),
        }
    }
}

impl TryFrom<String> for UpdatePeriod {
    type Error = SchedulerError;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<UpdatePeriod> for String {
    fn from(value: UpdatePeriod) -> Self {
        match value {
            UpdatePeriod::Disabled => "0".to_owned(),
            UpdatePeriod::Every(period) => format_minutes(period),
        }
    }
}

/// Period of the primary location auto refresh.
///
/// `Disabled` and `Off` both mean "no auto-update trigger", but `Disabled`
/// hands the primary location over to the sensor and screen monitors while
/// `Off` stops them as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AutoUpdatePeriod {
    /// `"0"`: sensor/screen driven updates instead of a timer.
    Disabled,
    /// Refresh every period.
    Every(Duration),
    /// `"OFF"`: no automatic updates at all.
    Off,
}

impl AutoUpdatePeriod {
    /// Parse the persisted preference value.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().eq_ignore_ascii_case("off") {
            return Ok(Self::Off);
        }
        match parse_minutes(raw)? {
            0 => Ok(Self::Disabled),
            m => Ok(Self::Every(minutes(m))),
        }
    }

    #[must_use]
    pub fn period(self) -> Option<Duration> {
        match self {
            Self::Every(period) => Some(period),
            Self::Disabled | Self::Off => None,
        }
    }
}

impl TryFrom<String> for AutoUpdatePeriod {
    type Error = SchedulerError;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<AutoUpdatePeriod> for String {
    fn from(value: AutoUpdatePeriod) -> Self {
        match value {
            AutoUpdatePeriod::Disabled => "0".to_owned(),
            AutoUpdatePeriod::Every(period) => format_minutes(period),
            AutoUpdatePeriod::Off => "OFF".to_owned(),
        }
    }
}

/// How often the notification refreshes on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NotificationInterval {
    /// `"regular_only"`: no independent trigger; refreshed with regular updates.
    RegularOnly,
    /// Refresh every interval.
    Every(Duration),
}

impl NotificationInterval {
    const REGULAR_ONLY: &'static str = "regular_only";

    /// Parse the persisted preference value.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim() == Self::REGULAR_ONLY {
            return Ok(Self::RegularOnly);
        }
        match parse_minutes(raw)? {
            0 => Err(SchedulerError::Config(
                "notification interval must be positive or \"regular_only\"".to_owned(),
            )),
            m => Ok(Self::Every(minutes(m))),
        }
    }
}

impl TryFrom<String> for NotificationInterval {
    type Error = SchedulerError;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<NotificationInterval> for String {
    fn from(value: NotificationInterval) -> Self {
        match value {
            NotificationInterval::RegularOnly => NotificationInterval::REGULAR_ONLY.to_owned(),
            NotificationInterval::Every(period) => format_minutes(period),
        }
    }
}

/// User preferences the scheduling policy reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Refresh period for secondary locations.
    pub location_update_period: UpdatePeriod,
    /// Refresh mode for the primary location.
    pub location_auto_update_period: AutoUpdatePeriod,
    /// Skip secondary refreshes before the night ends.
    pub location_update_night: bool,
    /// Skip primary refreshes before the night ends.
    pub location_auto_update_night: bool,
    /// Whether the weather notification is shown at all.
    pub notifications_enabled: bool,
    pub notification_interval: NotificationInterval,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            location_update_period: UpdatePeriod::Every(minutes(60)),
            location_auto_update_period: AutoUpdatePeriod::Every(minutes(60)),
            location_update_night: false,
            location_auto_update_night: false,
            notifications_enabled: false,
            notification_interval: NotificationInterval::RegularOnly,
        }
    }
}

impl ConfigProvider for Preferences {
    fn regular_update_period(&self) -> Result<UpdatePeriod> {
        Ok(self.location_update_period)
    }

    fn auto_update_period(&self) -> Result<AutoUpdatePeriod> {
        Ok(self.location_auto_update_period)
    }

    fn notification_interval(&self) -> Result<NotificationInterval> {
        Ok(self.notification_interval)
    }

    fn night_suppression_enabled(&self, source: UpdateSource) -> Result<bool> {
        Ok(match source {
            UpdateSource::Regular => self.location_update_night,
            UpdateSource::Auto => self.location_auto_update_night,
        })
    }

    fn notifications_enabled(&self) -> Result<bool> {
        Ok(self.notifications_enabled)
    }

    fn preferences(&self) -> Result<Preferences> {
        Ok(self.clone())
    }
}

/// Timing constants of the scheduling policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Period of the sensor/screen safety-net checks, in seconds.
    pub sensor_check_period_secs: u64,
    /// Local hour at which the night ends (refreshes before it may be suppressed).
    pub night_end_hour: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            sensor_check_period_secs: 3600,
            night_end_hour: 6,
        }
    }
}

/// In-process wake timer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Tiers the host accepts. Requests for others fall back down the ladder.
    pub supported_tiers: Vec<ReliabilityTier>,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            supported_tiers: vec![
                ReliabilityTier::BestEffort,
                ReliabilityTier::Exact,
                ReliabilityTier::ExactAllowWhileIdle,
            ],
        }
    }
}

/// Command runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Capacity of the bounded command channel.
    pub command_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_capacity: 64,
        }
    }
}

/// Log output settings for the host binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Directory for daily rotated log files. `None` logs to stderr only.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            log_dir: None,
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub preferences: Preferences,
    /// Configured locations; order id 0 is the primary.
    pub locations: Vec<Location>,
    pub policy: PolicyConfig,
    pub timer: TimerConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

impl SchedulerConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| SchedulerError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SchedulerError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/weather-alarm/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("weather-alarm")
            .join("config.toml")
    }
}

impl ConfigProvider for SchedulerConfig {
    fn regular_update_period(&self) -> Result<UpdatePeriod> {
        self.preferences.regular_update_period()
    }

    fn auto_update_period(&self) -> Result<AutoUpdatePeriod> {
        self.preferences.auto_update_period()
    }

    fn notification_interval(&self) -> Result<NotificationInterval> {
        self.preferences.notification_interval()
    }

    fn night_suppression_enabled(&self, source: UpdateSource) -> Result<bool> {
        self.preferences.night_suppression_enabled(source)
    }

    fn notifications_enabled(&self) -> Result<bool> {
        self.preferences.notifications_enabled()
    }

    fn preferences(&self) -> Result<Preferences> {
        Ok(self.preferences.clone())
    }
}

impl LocationStore for SchedulerConfig {
    fn all_locations(&self) -> Result<Vec<Location>> {
        let mut locations = self.locations.clone();
        locations.sort_by_key(|l| l.order_id);
        Ok(locations)
    }

    fn primary_location(&self) -> Result<Option<Location>> {
        Ok(self.locations.iter().find(|l| l.is_primary()).cloned())
    }
}

/// Provider that re-reads the configuration file on every call.
///
/// The coordinator never caches configuration between invocations, so
/// edits to the file take effect on the next reconciliation or fire.
/// [`ConfigProvider::preferences`] parses the file once for all values.
#[derive(Debug, Clone)]
pub struct FileConfigProvider {
    path: PathBuf,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<SchedulerConfig> {
        SchedulerConfig::from_file(&self.path).map_err(|e| {
            SchedulerError::ConfigurationAbsent(format!("{}: {e}", self.path.display()))
        })
    }
}

impl ConfigProvider for FileConfigProvider {
    fn regular_update_period(&self) -> Result<UpdatePeriod> {
        self.load()?.regular_update_period()
    }

    fn auto_update_period(&self) -> Result<AutoUpdatePeriod> {
        self.load()?.auto_update_period()
    }

    fn notification_interval(&self) -> Result<NotificationInterval> {
        self.load()?.notification_interval()
    }

    fn night_suppression_enabled(&self, source: UpdateSource) -> Result<bool> {
        self.load()?.night_suppression_enabled(source)
    }

    fn notifications_enabled(&self) -> Result<bool> {
        self.load()?.notifications_enabled()
    }

    fn preferences(&self) -> Result<Preferences> {
        Ok(self.load()?.preferences)
    }
}

impl LocationStore for FileConfigProvider {
    fn all_locations(&self) -> Result<Vec<Location>> {
        self.load()?.all_locations()
    }

    fn primary_location(&self) -> Result<Option<Location>> {
        self.load()?.primary_location()
    }
}
