//! Pure scheduling policy.
//!
//! [`SchedulePolicy::evaluate`] maps a [`ScheduleConfig`] snapshot to the
//! triggers that should be armed or cancelled and the commands the two
//! monitored subsystems should receive. It performs no I/O; the
//! coordinator applies the resulting [`SchedulePlan`].

use crate::config::{AutoUpdatePeriod, NotificationInterval, PolicyConfig, UpdatePeriod};
use crate::error::{Result, SchedulerError};
use crate::scheduler::ports::{ConfigProvider, Location, LocationStore, UpdateSource};
use crate::scheduler::queue::QueuedAction;
use crate::scheduler::wake_timer::{ArmRequest, TriggerKind};
use std::time::Duration;

/// Snapshot of every input the policy reads. Built fresh per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub regular_update_period: UpdatePeriod,
    pub auto_update_period: AutoUpdatePeriod,
    pub notification_interval: NotificationInterval,
    pub suppress_regular_at_night: bool,
    pub suppress_auto_at_night: bool,
    pub notifications_enabled: bool,
    pub location_count: usize,
    pub primary_location_id: i64,
    pub primary_location_enabled: bool,
    /// Enabled non-primary locations, in display order.
    pub secondary_locations: Vec<Location>,
}

impl ScheduleConfig {
    /// Read a snapshot from the collaborators: one preference read and one
    /// location read.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ConfigurationAbsent`] when a value cannot
    /// be read or no primary location exists.
    pub fn load(config: &dyn ConfigProvider, locations: &dyn LocationStore) -> Result<Self> {
        let preferences = config.preferences().map_err(absent("preferences"))?;
        let all = locations.all_locations().map_err(absent("locations"))?;
        let primary = all
            .iter()
            .find(|l| l.is_primary())
            .cloned()
            .ok_or_else(|| SchedulerError::ConfigurationAbsent("no primary location".to_owned()))?;

        Ok(Self {
            regular_update_period: preferences.location_update_period,
            auto_update_period: preferences.location_auto_update_period,
            notification_interval: preferences.notification_interval,
            suppress_regular_at_night: preferences.location_update_night,
            suppress_auto_at_night: preferences.location_auto_update_night,
            notifications_enabled: preferences.notifications_enabled,
            location_count: all.len(),
            primary_location_id: primary.id,
            primary_location_enabled: primary.enabled,
            secondary_locations: all
                .into_iter()
                .filter(|l| !l.is_primary() && l.enabled)
                .collect(),
        })
    }

    /// Whether refreshes from `source` are skipped at `local_hour`.
    #[must_use]
    pub fn suppressed_at(
        &self,
        source: UpdateSource,
        local_hour: u32,
        night_end_hour: u32,
    ) -> bool {
        let enabled = match source {
            UpdateSource::Regular => self.suppress_regular_at_night,
            UpdateSource::Auto => self.suppress_auto_at_night,
        };
        enabled && local_hour < night_end_hour
    }
}

fn absent(what: &'static str) -> impl Fn(SchedulerError) -> SchedulerError {
    move |e| match e {
        SchedulerError::ConfigurationAbsent(_) => e,
        other => SchedulerError::ConfigurationAbsent(format!("{what}: {other}")),
    }
}

/// What should happen to one trigger kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    /// Cancel any prior instance, then arm.
    Arm(ArmRequest),
    /// Cancel any prior instance.
    Cancel,
}

/// Notification outcome of rule 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationPlan {
    pub decision: TriggerDecision,
    /// Remove every visible notification.
    pub clear_visible: bool,
}

/// Result of one policy evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulePlan {
    /// Decisions in application order. Kinds not listed are left alone.
    pub triggers: Vec<(TriggerKind, TriggerDecision)>,
    /// Subsystem commands in dispatch order.
    pub actions: Vec<QueuedAction>,
    /// Notification handling; always present after a full evaluation.
    pub notification: Option<NotificationPlan>,
}

impl SchedulePlan {
    /// Decision for `kind`, if the plan has one.
    #[must_use]
    pub fn decision(&self, kind: TriggerKind) -> Option<TriggerDecision> {
        if kind == TriggerKind::NotificationUpdate {
            return self.notification.map(|n| n.decision);
        }
        self.triggers
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, decision)| *decision)
    }

    /// Kinds the plan arms, notification included.
    #[must_use]
    pub fn armed_kinds(&self) -> Vec<TriggerKind> {
        let mut kinds: Vec<TriggerKind> = self
            .triggers
            .iter()
            .filter(|(_, d)| matches!(d, TriggerDecision::Arm(_)))
            .map(|(k, _)| *k)
            .collect();
        if let Some(NotificationPlan {
            decision: TriggerDecision::Arm(_),
            ..
        }) = self.notification
        {
            kinds.push(TriggerKind::NotificationUpdate);
        }
        kinds
    }
}

/// Decision rules mapping a [`ScheduleConfig`] to a [`SchedulePlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulePolicy {
    /// Period of the sensor/screen safety-net checks.
    pub sensor_check_period: Duration,
    /// Local hour at which night suppression ends.
    pub night_end_hour: u32,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self::from(&PolicyConfig::default())
    }
}

impl From<&PolicyConfig> for SchedulePolicy {
    fn from(config: &PolicyConfig) -> Self {
        Self {
            sensor_check_period: Duration::from_secs(config.sensor_check_period_secs.max(1)),
            night_end_hour: config.night_end_hour.min(24),
        }
    }
}

impl SchedulePolicy {
    /// Full evaluation: primary-location mode, regular updates, notifications.
    #[must_use]
    pub fn evaluate(&self, config: &ScheduleConfig) -> SchedulePlan {
        let mut plan = SchedulePlan::default();

        if config.primary_location_enabled {
            match config.auto_update_period {
                AutoUpdatePeriod::Disabled => {
                    plan.actions.push(QueuedAction::StartSensorUpdates { origin_index: 0 });
                    plan.actions.push(QueuedAction::StartScreenUpdates);
                    for kind in [TriggerKind::SensorCheck, TriggerKind::ScreenCheck] {
                        plan.triggers.push((
                            kind,
                            TriggerDecision::Arm(ArmRequest::repeating(
                                kind,
                                self.sensor_check_period,
                            )),
                        ));
                    }
                }
                AutoUpdatePeriod::Every(period) => {
                    Self::stop_monitors(&mut plan);
                    plan.triggers.push((
                        TriggerKind::AutoLocationUpdate,
                        TriggerDecision::Arm(ArmRequest::one_shot(
                            TriggerKind::AutoLocationUpdate,
                            period,
                        )),
                    ));
                }
                AutoUpdatePeriod::Off => Self::stop_monitors(&mut plan),
            }
        }

        if let Some(decision) = self.regular_decision(config) {
            plan.triggers.push((TriggerKind::RegularLocationUpdate, decision));
        }

        plan.notification = Some(self.notification_plan(
            config.notifications_enabled,
            config.notification_interval,
        ));
        plan
    }

    /// Rule 2: arm the regular trigger when a period is set and more than
    /// one location exists. `None` leaves the kind alone.
    #[must_use]
    pub fn regular_decision(&self, config: &ScheduleConfig) -> Option<TriggerDecision> {
        match config.regular_update_period {
            UpdatePeriod::Every(period) if config.location_count > 1 => {
                Some(TriggerDecision::Arm(ArmRequest::one_shot(
                    TriggerKind::RegularLocationUpdate,
                    period,
                )))
            }
            _ => None,
        }
    }

    /// Re-arm decision for the auto trigger after it fired. `None` means the
    /// primary location no longer uses timed auto updates.
    #[must_use]
    pub fn auto_decision(&self, config: &ScheduleConfig) -> Option<TriggerDecision> {
        if !config.primary_location_enabled {
            return None;
        }
        config.auto_update_period.period().map(|period| {
            TriggerDecision::Arm(ArmRequest::one_shot(TriggerKind::AutoLocationUpdate, period))
        })
    }

    /// Rule 3: notification scheduling.
    #[must_use]
    pub fn notification_plan(
        &self,
        enabled: bool,
        interval: NotificationInterval,
    ) -> NotificationPlan {
        if !enabled {
            return NotificationPlan {
                decision: TriggerDecision::Cancel,
                clear_visible: true,
            };
        }
        match interval {
            NotificationInterval::RegularOnly => NotificationPlan {
                decision: TriggerDecision::Cancel,
                clear_visible: false,
            },
            NotificationInterval::Every(period) => NotificationPlan {
                decision: TriggerDecision::Arm(ArmRequest::one_shot(
                    TriggerKind::NotificationUpdate,
                    period,
                )),
                clear_visible: false,
            },
        }
    }

    /// Whether a refresh from `source` is skipped at `local_hour`.
    #[must_use]
    pub fn is_night_suppressed(
        &self,
        config: &ScheduleConfig,
        source: UpdateSource,
        local_hour: u32,
    ) -> bool {
        config.suppressed_at(source, local_hour, self.night_end_hour)
    }

    fn stop_monitors(plan: &mut SchedulePlan) {
        plan.actions.push(QueuedAction::StopSensorUpdates);
        plan.actions.push(QueuedAction::StopScreenUpdates);
        plan.triggers
            .push((TriggerKind::SensorCheck, TriggerDecision::Cancel));
        plan.triggers
            .push((TriggerKind::ScreenCheck, TriggerDecision::Cancel));
    }
}
