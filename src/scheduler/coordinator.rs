//! The alarm coordinator.
//!
//! [`AlarmCoordinator`] is the single entry point for reconciliation
//! requests, fired wake triggers and subsystem binding changes. One mutex
//! guards the trigger table and both bindings; refresh requests to the
//! fetch service and the notification sink are collected while the lock is
//! held and issued after it is released.

use crate::config::NotificationInterval;
use crate::error::{Result, SchedulerError};
use crate::scheduler::binding::{BindingEvent, BindingState, Subsystem, SubsystemBinding};
use crate::scheduler::policy::{NotificationPlan, ScheduleConfig, SchedulePolicy, TriggerDecision};
use crate::scheduler::ports::{
    Clock, ConfigProvider, ForecastDueOracle, Location, LocationStore, NotificationSink,
    SubsystemConnector, SystemClock, UpdateSource, WeatherFetchService,
};
use crate::scheduler::queue::QueuedAction;
use crate::scheduler::runtime::Command;
use crate::scheduler::wake_timer::{
    ReliabilityTier, TriggerKind, TriggerTable, WakeTimerPort, arm_with_fallback,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Outcome of a coordinator entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The request was applied.
    Reconciled,
    /// `start` was called while already started; nothing changed.
    AlreadyStarted,
    /// A required value could not be read; armed state is untouched.
    Aborted,
}

/// External services the coordinator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub config: Arc<dyn ConfigProvider>,
    pub locations: Arc<dyn LocationStore>,
    pub forecasts: Arc<dyn ForecastDueOracle>,
    pub fetch: Arc<dyn WeatherFetchService>,
    pub notifications: Arc<dyn NotificationSink>,
    pub timer: Arc<dyn WakeTimerPort>,
}

/// Work issued once the state lock is released.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Effect {
    AutoLocationRefresh { primary_location_id: i64 },
    SecondaryRefresh { locations: Vec<Location> },
    NotificationRefresh,
    ClearNotifications,
}

struct CoordinatorState {
    armed: TriggerTable,
    screen: SubsystemBinding,
    sensor: SubsystemBinding,
    started: bool,
}

impl CoordinatorState {
    fn new() -> Self {
        Self {
            armed: TriggerTable::default(),
            screen: SubsystemBinding::new(Subsystem::Screen),
            sensor: SubsystemBinding::new(Subsystem::Sensor),
            started: false,
        }
    }

    fn binding_mut(&mut self, subsystem: Subsystem) -> &mut SubsystemBinding {
        match subsystem {
            Subsystem::Screen => &mut self.screen,
            Subsystem::Sensor => &mut self.sensor,
        }
    }
}

/// An armed trigger as reported by [`AlarmCoordinator::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmedTriggerSnapshot {
    pub kind: TriggerKind,
    pub tier: ReliabilityTier,
    /// Milliseconds until the next fire, saturating at zero.
    pub fires_in_ms: u64,
    /// Repeat period in seconds for repeating triggers.
    pub period_secs: Option<u64>,
    pub token: u64,
}

/// Binding status as reported by [`AlarmCoordinator::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingSnapshot {
    pub state: BindingState,
    /// Actions waiting for the next `Bound` transition.
    pub pending: usize,
}

/// Point-in-time view of the coordinator, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorSnapshot {
    pub started: bool,
    pub armed: Vec<ArmedTriggerSnapshot>,
    pub screen: BindingSnapshot,
    pub sensor: BindingSnapshot,
}

impl CoordinatorSnapshot {
    #[must_use]
    pub fn is_armed(&self, kind: TriggerKind) -> bool {
        self.armed.iter().any(|t| t.kind == kind)
    }

    #[must_use]
    pub fn trigger(&self, kind: TriggerKind) -> Option<&ArmedTriggerSnapshot> {
        self.armed.iter().find(|t| t.kind == kind)
    }
}

/// Central scheduler: reconciles wake triggers with the current
/// configuration and routes commands to the monitored subsystems.
pub struct AlarmCoordinator {
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
    policy: SchedulePolicy,
    state: Mutex<CoordinatorState>,
}

impl AlarmCoordinator {
    /// Create a coordinator with the system clock and default policy.
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            clock: Arc::new(SystemClock),
            policy: SchedulePolicy::default(),
            state: Mutex::new(CoordinatorState::new()),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the policy constants.
    pub fn with_policy(mut self, policy: SchedulePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn policy(&self) -> &SchedulePolicy {
        &self.policy
    }

    /// Full reconciliation, unless a previous `start` already ran.
    pub fn start(&self) -> ReconcileOutcome {
        let mut state = self.lock();
        if state.started {
            debug!("start requested while already started");
            return ReconcileOutcome::AlreadyStarted;
        }
        let (outcome, effects) = self.reconcile_locked(&mut state);
        drop(state);
        self.run_effects(effects);
        outcome
    }

    /// Clear the started latch and reconcile from scratch.
    pub fn restart(&self) -> ReconcileOutcome {
        let mut state = self.lock();
        state.started = false;
        let (outcome, effects) = self.reconcile_locked(&mut state);
        drop(state);
        self.run_effects(effects);
        outcome
    }

    /// Re-run only the notification rule.
    pub fn restart_notifications(&self) -> ReconcileOutcome {
        let mut state = self.lock();
        let (enabled, interval) = match self.notification_settings() {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "notification restart aborted");
                return ReconcileOutcome::Aborted;
            }
        };
        let plan = self.policy.notification_plan(enabled, interval);

        let mut effects = Vec::new();
        self.apply_notification_plan(&mut state, plan, &mut effects);
        drop(state);

        info!(enabled, ?interval, "notification schedule reconciled");
        self.run_effects(effects);
        ReconcileOutcome::Reconciled
    }

    /// Handle a fired wake trigger. Safe to call repeatedly for one fire.
    ///
    /// Configuration is read under the state lock, so a fire racing a
    /// `restart` re-arms from the same settings the restart applied.
    pub fn on_trigger_fired(&self, kind: TriggerKind) -> ReconcileOutcome {
        debug!(%kind, "wake trigger fired");
        let result = match kind {
            TriggerKind::AutoLocationUpdate => self.fire_auto(),
            TriggerKind::RegularLocationUpdate => self.fire_regular(),
            TriggerKind::NotificationUpdate => self.fire_notification(),
            TriggerKind::SensorCheck => {
                self.dispatch(QueuedAction::StartSensorUpdates { origin_index: 0 });
                Ok(Vec::new())
            }
            TriggerKind::ScreenCheck => {
                self.dispatch(QueuedAction::StartScreenUpdates);
                Ok(Vec::new())
            }
        };

        match result {
            Ok(effects) => {
                self.run_effects(effects);
                ReconcileOutcome::Reconciled
            }
            Err(e) => {
                warn!(%kind, error = %e, "trigger handling aborted");
                ReconcileOutcome::Aborted
            }
        }
    }

    /// Cancel every trigger, stop both subsystems and clear the started latch.
    pub fn stop_all(&self) {
        let mut state = self.lock();
        for kind in TriggerKind::ALL {
            self.cancel_locked(&mut state, kind);
        }
        state.sensor.dispatch(QueuedAction::StopSensorUpdates);
        state.screen.dispatch(QueuedAction::StopScreenUpdates);
        state.started = false;
        info!("all wake triggers cancelled, subsystems stopped");
    }

    /// Apply a binding lifecycle signal. Returns how many deferred actions ran.
    pub fn on_binding_changed(&self, subsystem: Subsystem, event: BindingEvent) -> usize {
        debug!(%subsystem, ?event, "binding changed");
        let mut state = self.lock();
        state.binding_mut(subsystem).apply(event)
    }

    /// Start one connection attempt for each subsystem that is not bound or
    /// connecting. The connector is invoked after the lock is released, so it
    /// may report `Bound` synchronously.
    pub fn connect_subsystems(&self, connector: &dyn SubsystemConnector) {
        let mut pending = Vec::new();
        {
            let mut state = self.lock();
            for subsystem in [Subsystem::Screen, Subsystem::Sensor] {
                if state.binding_mut(subsystem).request_bind() {
                    pending.push(subsystem);
                }
            }
        }
        for subsystem in pending {
            info!(%subsystem, "connecting subsystem");
            connector.connect(subsystem);
        }
    }

    /// Drop both subsystem handles. Later commands queue until the next bind.
    pub fn release_subsystems(&self) {
        let mut state = self.lock();
        state.screen.mark_unbound();
        state.sensor.mark_unbound();
    }

    /// Route an external or internal command to its entry point.
    pub fn handle(&self, command: Command) -> ReconcileOutcome {
        match command {
            Command::Start => self.start(),
            Command::Restart => self.restart(),
            Command::RestartNotificationsOnly => self.restart_notifications(),
            Command::TriggerFired(kind) => self.on_trigger_fired(kind),
            Command::BindingChanged { subsystem, event } => {
                self.on_binding_changed(subsystem, event);
                ReconcileOutcome::Reconciled
            }
            Command::StopAll => {
                self.stop_all();
                ReconcileOutcome::Reconciled
            }
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> CoordinatorSnapshot {
        let now = self.clock.now();
        let state = self.lock();
        CoordinatorSnapshot {
            started: state.started,
            armed: state
                .armed
                .iter()
                .map(|t| ArmedTriggerSnapshot {
                    kind: t.kind,
                    tier: t.tier,
                    fires_in_ms: millis(t.fire_at.saturating_duration_since(now)),
                    period_secs: t.period.map(|p| p.as_secs()),
                    token: t.token.0,
                })
                .collect(),
            screen: BindingSnapshot {
                state: state.screen.state(),
                pending: state.screen.pending(),
            },
            sensor: BindingSnapshot {
                state: state.sensor.state(),
                pending: state.sensor.pending(),
            },
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load_config(&self) -> Result<ScheduleConfig> {
        ScheduleConfig::load(
            self.collaborators.config.as_ref(),
            self.collaborators.locations.as_ref(),
        )
    }

    fn notification_settings(&self) -> Result<(bool, NotificationInterval)> {
        let preferences = self.collaborators.config.preferences().map_err(|e| match e {
            SchedulerError::ConfigurationAbsent(_) => e,
            other => SchedulerError::ConfigurationAbsent(format!("notification settings: {other}")),
        })?;
        Ok((
            preferences.notifications_enabled,
            preferences.notification_interval,
        ))
    }

    fn reconcile_locked(&self, state: &mut CoordinatorState) -> (ReconcileOutcome, Vec<Effect>) {
        let config = match self.load_config() {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "reconciliation aborted, armed triggers left untouched");
                return (ReconcileOutcome::Aborted, Vec::new());
            }
        };
        let plan = self.policy.evaluate(&config);

        self.cancel_locked(state, TriggerKind::RegularLocationUpdate);
        self.cancel_locked(state, TriggerKind::AutoLocationUpdate);

        for (kind, decision) in &plan.triggers {
            self.apply_decision_locked(state, *kind, *decision);
        }
        for action in &plan.actions {
            state.binding_mut(action.subsystem()).dispatch(*action);
        }
        let mut effects = Vec::new();
        if let Some(notification) = plan.notification {
            self.apply_notification_plan(state, notification, &mut effects);
        }

        state.started = true;
        info!(
            armed = ?plan.armed_kinds(),
            actions = plan.actions.len(),
            locations = config.location_count,
            "schedule reconciled"
        );
        (ReconcileOutcome::Reconciled, effects)
    }

    fn apply_notification_plan(
        &self,
        state: &mut CoordinatorState,
        plan: NotificationPlan,
        effects: &mut Vec<Effect>,
    ) {
        self.apply_decision_locked(state, TriggerKind::NotificationUpdate, plan.decision);
        if plan.clear_visible {
            effects.push(Effect::ClearNotifications);
        }
    }

    /// Cancel any instance of `kind`, then arm when the decision asks for it.
    fn apply_decision_locked(
        &self,
        state: &mut CoordinatorState,
        kind: TriggerKind,
        decision: TriggerDecision,
    ) {
        self.cancel_locked(state, kind);
        let TriggerDecision::Arm(request) = decision else {
            return;
        };
        match arm_with_fallback(self.collaborators.timer.as_ref(), &request, self.clock.now()) {
            Ok(armed) => {
                debug!(
                    %kind,
                    tier = ?armed.tier,
                    delay_ms = millis(request.first_fire_delay),
                    "wake trigger armed"
                );
                state.armed.insert(armed);
            }
            Err(e) => warn!(%kind, error = %e, "failed to arm wake trigger"),
        }
    }

    fn cancel_locked(&self, state: &mut CoordinatorState, kind: TriggerKind) {
        self.collaborators.timer.cancel(kind);
        if state.armed.remove(kind).is_some() {
            debug!(%kind, "wake trigger cancelled");
        }
    }

    fn dispatch(&self, action: QueuedAction) {
        let mut state = self.lock();
        state.binding_mut(action.subsystem()).dispatch(action);
    }

    fn fire_auto(&self) -> Result<Vec<Effect>> {
        let mut state = self.lock();
        let config = self.load_config()?;
        match self.policy.auto_decision(&config) {
            Some(decision) => {
                self.apply_decision_locked(&mut state, TriggerKind::AutoLocationUpdate, decision);
            }
            None => {
                self.cancel_locked(&mut state, TriggerKind::AutoLocationUpdate);
                debug!("auto update no longer timed, trigger not re-armed");
            }
        }
        drop(state);

        let hour = self.clock.local_hour();
        if self
            .policy
            .is_night_suppressed(&config, UpdateSource::Auto, hour)
        {
            info!(hour, "auto location update suppressed at night");
            return Ok(Vec::new());
        }
        Ok(vec![Effect::AutoLocationRefresh {
            primary_location_id: config.primary_location_id,
        }])
    }

    fn fire_regular(&self) -> Result<Vec<Effect>> {
        let mut state = self.lock();
        let config = self.load_config()?;
        match self.policy.regular_decision(&config) {
            Some(decision) => self.apply_decision_locked(
                &mut state,
                TriggerKind::RegularLocationUpdate,
                decision,
            ),
            None => self.cancel_locked(&mut state, TriggerKind::RegularLocationUpdate),
        }
        drop(state);

        let hour = self.clock.local_hour();
        if self
            .policy
            .is_night_suppressed(&config, UpdateSource::Regular, hour)
        {
            info!(hour, "regular location update suppressed at night");
            return Ok(Vec::new());
        }

        let notify = config.notifications_enabled
            && config.notification_interval == NotificationInterval::RegularOnly;
        let mut effects = vec![Effect::SecondaryRefresh {
            locations: config.secondary_locations,
        }];
        if notify {
            effects.push(Effect::NotificationRefresh);
        }
        Ok(effects)
    }

    fn fire_notification(&self) -> Result<Vec<Effect>> {
        let mut state = self.lock();
        let (enabled, interval) = self.notification_settings()?;
        let plan = self.policy.notification_plan(enabled, interval);

        let mut effects = Vec::new();
        if enabled {
            effects.push(Effect::NotificationRefresh);
        }
        self.apply_notification_plan(&mut state, plan, &mut effects);
        Ok(effects)
    }

    fn run_effects(&self, effects: Vec<Effect>) {
        let fetch = &self.collaborators.fetch;
        for effect in effects {
            match effect {
                Effect::AutoLocationRefresh {
                    primary_location_id,
                } => {
                    info!(primary_location_id, "requesting auto location refresh");
                    fetch.request_auto_location_refresh(primary_location_id);
                }
                Effect::SecondaryRefresh { locations } => {
                    info!(count = locations.len(), "refreshing secondary locations");
                    for location in locations {
                        fetch.request_location_refresh(location.id);
                        if self.collaborators.forecasts.should_refresh_forecast(location.id) {
                            fetch.request_forecast_refresh(location.id);
                        }
                    }
                }
                Effect::NotificationRefresh => {
                    self.collaborators.notifications.request_notification_refresh();
                }
                Effect::ClearNotifications => {
                    self.collaborators.notifications.cancel_all_notifications();
                }
            }
        }
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl std::fmt::Debug for AlarmCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarmCoordinator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
