//! Shared fakes for integration tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use weather_alarm::config::{AutoUpdatePeriod, NotificationInterval, SchedulerConfig, UpdatePeriod};
use weather_alarm::scheduler::ports::{
    Clock, ConfigProvider, ForecastDueOracle, Location, LocationStore, NotificationSink,
    SubsystemHandle, UpdateSource, WeatherFetchService,
};
use weather_alarm::scheduler::{
    AlarmCoordinator, ArmRequest, Collaborators, ReliabilityTier, SchedulePolicy, TriggerKind,
    WakeTimerPort, WakeToken,
};
use weather_alarm::SchedulerError;
use weather_alarm::Result;

pub(crate) fn location(id: i64, order_id: u32, enabled: bool) -> Location {
    Location {
        id,
        order_id,
        enabled,
    }
}

/// In-memory configuration that tests can edit between calls.
pub(crate) struct MemoryConfig {
    inner: Mutex<SchedulerConfig>,
}

impl MemoryConfig {
    pub(crate) fn new(config: SchedulerConfig) -> Self {
        Self {
            inner: Mutex::new(config),
        }
    }

    pub(crate) fn edit(&self, change: impl FnOnce(&mut SchedulerConfig)) {
        change(&mut self.inner.lock().unwrap());
    }
}

impl ConfigProvider for MemoryConfig {
    fn regular_update_period(&self) -> Result<UpdatePeriod> {
        self.inner.lock().unwrap().regular_update_period()
    }

    fn auto_update_period(&self) -> Result<AutoUpdatePeriod> {
        self.inner.lock().unwrap().auto_update_period()
    }

    fn notification_interval(&self) -> Result<NotificationInterval> {
        self.inner.lock().unwrap().notification_interval()
    }

    fn night_suppression_enabled(&self, source: UpdateSource) -> Result<bool> {
        self.inner.lock().unwrap().night_suppression_enabled(source)
    }

    fn notifications_enabled(&self) -> Result<bool> {
        self.inner.lock().unwrap().notifications_enabled()
    }
}

impl LocationStore for MemoryConfig {
    fn all_locations(&self) -> Result<Vec<Location>> {
        self.inner.lock().unwrap().all_locations()
    }

    fn primary_location(&self) -> Result<Option<Location>> {
        self.inner.lock().unwrap().primary_location()
    }
}

/// Outbound request observed by [`RecordingServices`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Request {
    Location(i64),
    AutoLocation(i64),
    Forecast(i64),
    NotificationRefresh,
    ClearNotifications,
}

/// Fetch service, notification sink and forecast oracle in one recorder.
/// Every location is reported as having a stale short forecast.
#[derive(Default)]
pub(crate) struct RecordingServices {
    requests: Mutex<Vec<Request>>,
}

impl RecordingServices {
    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    fn push(&self, request: Request) {
        self.requests.lock().unwrap().push(request);
    }
}

impl WeatherFetchService for RecordingServices {
    fn request_location_refresh(&self, location_id: i64) {
        self.push(Request::Location(location_id));
    }

    fn request_auto_location_refresh(&self, primary_location_id: i64) {
        self.push(Request::AutoLocation(primary_location_id));
    }

    fn request_forecast_refresh(&self, location_id: i64) {
        self.push(Request::Forecast(location_id));
    }
}

impl NotificationSink for RecordingServices {
    fn request_notification_refresh(&self) {
        self.push(Request::NotificationRefresh);
    }

    fn cancel_all_notifications(&self) {
        self.push(Request::ClearNotifications);
    }
}

impl ForecastDueOracle for RecordingServices {
    fn should_refresh_forecast(&self, _location_id: i64) -> bool {
        true
    }
}

/// Call observed by [`RecordingMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MonitorCall {
    Start(Option<usize>),
    Stop,
}

#[derive(Default)]
pub(crate) struct RecordingMonitor {
    calls: Mutex<Vec<MonitorCall>>,
}

impl RecordingMonitor {
    pub(crate) fn calls(&self) -> Vec<MonitorCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl SubsystemHandle for RecordingMonitor {
    fn start_updates(&self, origin_index: Option<usize>) {
        self.calls
            .lock()
            .unwrap()
            .push(MonitorCall::Start(origin_index));
    }

    fn stop_updates(&self) {
        self.calls.lock().unwrap().push(MonitorCall::Stop);
    }
}

/// Wake timer that accepts a fixed tier set and logs arm/cancel calls.
pub(crate) struct LoggingTimer {
    supported: Vec<ReliabilityTier>,
    log: Mutex<Vec<(TriggerKind, Option<ReliabilityTier>)>>,
}

impl LoggingTimer {
    pub(crate) fn supporting(supported: &[ReliabilityTier]) -> Self {
        Self {
            supported: supported.to_vec(),
            log: Mutex::new(Vec::new()),
        }
    }

    /// `(kind, Some(tier))` per successful arm, `(kind, None)` per cancel.
    pub(crate) fn log(&self) -> Vec<(TriggerKind, Option<ReliabilityTier>)> {
        self.log.lock().unwrap().clone()
    }
}

impl WakeTimerPort for LoggingTimer {
    fn arm(&self, request: &ArmRequest) -> Result<WakeToken> {
        if !self.supported.contains(&request.tier) {
            return Err(SchedulerError::UnsupportedTier {
                kind: request.kind,
                tier: request.tier,
            });
        }
        let mut log = self.log.lock().unwrap();
        log.push((request.kind, Some(request.tier)));
        Ok(WakeToken(log.len() as u64))
    }

    fn cancel(&self, kind: TriggerKind) {
        self.log.lock().unwrap().push((kind, None));
    }
}

/// Clock frozen at one instant with a settable local hour.
pub(crate) struct FixedClock {
    now: Instant,
    hour: AtomicU32,
}

impl FixedClock {
    pub(crate) fn at_hour(hour: u32) -> Self {
        Self {
            now: Instant::now(),
            hour: AtomicU32::new(hour),
        }
    }

    pub(crate) fn set_hour(&self, hour: u32) {
        self.hour.store(hour, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Instant {
        self.now
    }

    fn local_hour(&self) -> u32 {
        self.hour.load(Ordering::SeqCst)
    }
}

/// A coordinator wired to in-memory fakes.
pub(crate) struct Harness {
    pub(crate) config: Arc<MemoryConfig>,
    pub(crate) services: Arc<RecordingServices>,
    pub(crate) clock: Arc<FixedClock>,
    pub(crate) coordinator: Arc<AlarmCoordinator>,
}

impl Harness {
    pub(crate) fn new(config: SchedulerConfig, timer: Arc<dyn WakeTimerPort>) -> Self {
        Self::with_policy(config, timer, SchedulePolicy::default())
    }

    pub(crate) fn with_policy(
        config: SchedulerConfig,
        timer: Arc<dyn WakeTimerPort>,
        policy: SchedulePolicy,
    ) -> Self {
        let config = Arc::new(MemoryConfig::new(config));
        let services = Arc::new(RecordingServices::default());
        let clock = Arc::new(FixedClock::at_hour(12));
        let coordinator = Arc::new(
            AlarmCoordinator::new(Collaborators {
                config: config.clone(),
                locations: config.clone(),
                forecasts: services.clone(),
                fetch: services.clone(),
                notifications: services.clone(),
                timer,
            })
            .with_clock(clock.clone())
            .with_policy(policy),
        );
        Self {
            config,
            services,
            clock,
            coordinator,
        }
    }
}
