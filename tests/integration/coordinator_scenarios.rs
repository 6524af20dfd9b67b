//! End-to-end coordinator behaviour against in-memory collaborators.

use crate::helpers::{Harness, LoggingTimer, MonitorCall, RecordingMonitor, Request, location};
use std::sync::Arc;
use weather_alarm::config::{AutoUpdatePeriod, NotificationInterval, SchedulerConfig, UpdatePeriod};
use weather_alarm::scheduler::{
    BindingEvent, BindingState, ReconcileOutcome, ReliabilityTier, Subsystem, TriggerKind,
};

const ALL_TIERS: [ReliabilityTier; 3] = [
    ReliabilityTier::BestEffort,
    ReliabilityTier::Exact,
    ReliabilityTier::ExactAllowWhileIdle,
];

fn config(regular: &str, auto: &str, locations: &[(i64, u32, bool)]) -> SchedulerConfig {
    let mut config = SchedulerConfig::default();
    config.preferences.location_update_period = UpdatePeriod::parse(regular).unwrap();
    config.preferences.location_auto_update_period = AutoUpdatePeriod::parse(auto).unwrap();
    config.locations = locations
        .iter()
        .map(|&(id, order, enabled)| location(id, order, enabled))
        .collect();
    config
}

fn harness(config: SchedulerConfig) -> (Harness, Arc<LoggingTimer>) {
    let timer = Arc::new(LoggingTimer::supporting(&ALL_TIERS));
    (Harness::new(config, timer.clone()), timer)
}

#[test]
fn three_locations_six_hours_primary_disabled() {
    let (h, _timer) = harness(config(
        "360",
        "60",
        &[(10, 0, false), (11, 1, true), (12, 2, true)],
    ));

    assert_eq!(h.coordinator.start(), ReconcileOutcome::Reconciled);

    let snapshot = h.coordinator.snapshot();
    assert_eq!(snapshot.armed.len(), 1);
    let regular = snapshot.trigger(TriggerKind::RegularLocationUpdate).unwrap();
    assert_eq!(regular.fires_in_ms, 6 * 60 * 60 * 1000);
    assert_eq!(regular.tier, ReliabilityTier::ExactAllowWhileIdle);
    assert_eq!(snapshot.sensor.pending, 0);
    assert_eq!(snapshot.screen.pending, 0);
    // notifications are off by default, so only the clear is issued
    assert_eq!(h.services.requests(), vec![Request::ClearNotifications]);
}

#[test]
fn sensor_mode_queues_starts_until_monitors_bind() {
    let (h, _timer) = harness(config("0", "0", &[(1, 0, true)]));

    h.coordinator.start();
    let snapshot = h.coordinator.snapshot();
    assert_eq!(snapshot.sensor.pending, 1);
    assert_eq!(snapshot.screen.pending, 1);
    assert_eq!(
        snapshot.trigger(TriggerKind::SensorCheck).unwrap().period_secs,
        Some(3600)
    );
    assert_eq!(
        snapshot.trigger(TriggerKind::ScreenCheck).unwrap().period_secs,
        Some(3600)
    );

    let sensor = Arc::new(RecordingMonitor::default());
    let screen = Arc::new(RecordingMonitor::default());
    h.coordinator
        .on_binding_changed(Subsystem::Sensor, BindingEvent::Bound(sensor.clone()));
    h.coordinator
        .on_binding_changed(Subsystem::Screen, BindingEvent::Bound(screen.clone()));

    assert_eq!(sensor.calls(), vec![MonitorCall::Start(Some(0))]);
    assert_eq!(screen.calls(), vec![MonitorCall::Start(None)]);
    assert_eq!(h.coordinator.snapshot().sensor.state, BindingState::Bound);
}

#[test]
fn auto_update_off_stops_monitors_and_arms_nothing() {
    let (h, _timer) = harness(config("0", "OFF", &[(1, 0, true)]));
    let sensor = Arc::new(RecordingMonitor::default());
    h.coordinator
        .on_binding_changed(Subsystem::Sensor, BindingEvent::Bound(sensor.clone()));

    h.coordinator.start();

    assert_eq!(sensor.calls(), vec![MonitorCall::Stop]);
    assert!(h.coordinator.snapshot().armed.is_empty());
}

#[test]
fn switching_from_sensor_mode_to_timed_cancels_checks() {
    let (h, _timer) = harness(config("0", "0", &[(1, 0, true)]));
    h.coordinator.start();
    assert!(h.coordinator.snapshot().is_armed(TriggerKind::SensorCheck));

    h.config.edit(|c| {
        c.preferences.location_auto_update_period = AutoUpdatePeriod::parse("30").unwrap();
    });
    h.coordinator.restart();

    let snapshot = h.coordinator.snapshot();
    assert!(!snapshot.is_armed(TriggerKind::SensorCheck));
    assert!(!snapshot.is_armed(TriggerKind::ScreenCheck));
    assert_eq!(
        snapshot.trigger(TriggerKind::AutoLocationUpdate).unwrap().fires_in_ms,
        30 * 60 * 1000
    );
    // start then stop, replayed literally on bind
    assert_eq!(snapshot.sensor.pending, 2);
}

#[test]
fn queued_actions_survive_a_disconnect() {
    let (h, _timer) = harness(config("0", "0", &[(1, 0, true)]));
    let first = Arc::new(RecordingMonitor::default());
    h.coordinator
        .on_binding_changed(Subsystem::Screen, BindingEvent::Bound(first.clone()));
    h.coordinator
        .on_binding_changed(Subsystem::Screen, BindingEvent::Unbound);

    h.coordinator.start();
    h.coordinator.on_trigger_fired(TriggerKind::ScreenCheck);
    assert!(first.calls().is_empty());

    h.coordinator
        .on_binding_changed(Subsystem::Screen, BindingEvent::Connecting);
    let second = Arc::new(RecordingMonitor::default());
    let drained = h
        .coordinator
        .on_binding_changed(Subsystem::Screen, BindingEvent::Bound(second.clone()));

    assert_eq!(drained, 2);
    assert_eq!(
        second.calls(),
        vec![MonitorCall::Start(None), MonitorCall::Start(None)]
    );
}

#[test]
fn regular_fire_walks_secondary_locations() {
    let (h, _timer) = harness(config(
        "120",
        "OFF",
        &[(1, 0, true), (2, 1, true), (3, 2, true)],
    ));
    h.config.edit(|c| {
        c.preferences.notifications_enabled = true;
        c.preferences.notification_interval = NotificationInterval::RegularOnly;
    });

    h.coordinator.on_trigger_fired(TriggerKind::RegularLocationUpdate);

    assert_eq!(
        h.services.requests(),
        vec![
            Request::Location(2),
            Request::Forecast(2),
            Request::Location(3),
            Request::Forecast(3),
            Request::NotificationRefresh,
        ]
    );
    assert!(h
        .coordinator
        .snapshot()
        .is_armed(TriggerKind::RegularLocationUpdate));
}

#[test]
fn auto_fire_after_switch_to_off_refreshes_once_and_stops() {
    let (h, timer) = harness(config("60", "60", &[(1, 0, true)]));
    h.coordinator.start();
    h.config.edit(|c| c.preferences.location_auto_update_period = AutoUpdatePeriod::Off);

    h.coordinator.on_trigger_fired(TriggerKind::AutoLocationUpdate);

    assert_eq!(
        h.services.requests(),
        vec![Request::ClearNotifications, Request::AutoLocation(1)]
    );
    assert!(!h.coordinator.snapshot().is_armed(TriggerKind::AutoLocationUpdate));
    assert_eq!(
        timer.log().last(),
        Some(&(TriggerKind::AutoLocationUpdate, None))
    );
}

#[test]
fn night_suppression_follows_the_local_hour() {
    let (h, _timer) = harness(config("60", "60", &[(1, 0, true), (2, 1, true)]));
    h.config.edit(|c| {
        c.preferences.location_update_night = true;
        c.preferences.location_auto_update_night = true;
    });
    h.coordinator.start();

    for hour in 0..6 {
        h.clock.set_hour(hour);
        h.coordinator.on_trigger_fired(TriggerKind::AutoLocationUpdate);
        h.coordinator.on_trigger_fired(TriggerKind::RegularLocationUpdate);
    }
    assert_eq!(h.services.requests(), vec![Request::ClearNotifications]);

    h.clock.set_hour(6);
    h.coordinator.on_trigger_fired(TriggerKind::AutoLocationUpdate);
    assert_eq!(
        h.services.requests(),
        vec![Request::ClearNotifications, Request::AutoLocation(1)]
    );

    let snapshot = h.coordinator.snapshot();
    assert!(snapshot.is_armed(TriggerKind::AutoLocationUpdate));
    assert!(snapshot.is_armed(TriggerKind::RegularLocationUpdate));
}

#[test]
fn best_effort_host_still_gets_every_trigger() {
    let timer = Arc::new(LoggingTimer::supporting(&[ReliabilityTier::BestEffort]));
    let mut cfg = config("60", "60", &[(1, 0, true), (2, 1, true)]);
    cfg.preferences.notifications_enabled = true;
    cfg.preferences.notification_interval = NotificationInterval::parse("15").unwrap();
    let h = Harness::new(cfg, timer.clone());

    h.coordinator.start();

    let snapshot = h.coordinator.snapshot();
    assert_eq!(snapshot.armed.len(), 3);
    assert!(snapshot
        .armed
        .iter()
        .all(|t| t.tier == ReliabilityTier::BestEffort));
    assert!(timer
        .log()
        .iter()
        .all(|(_, tier)| tier.is_none() || *tier == Some(ReliabilityTier::BestEffort)));
}

#[test]
fn reconcile_cancels_before_every_arm() {
    let (h, timer) = harness(config("60", "60", &[(1, 0, true), (2, 1, true)]));

    h.coordinator.start();
    h.coordinator.restart();

    let log = timer.log();
    for (index, (kind, tier)) in log.iter().enumerate() {
        if tier.is_some() {
            assert_eq!(
                log[..index].last(),
                Some(&(*kind, None)),
                "{kind} armed without an immediately preceding cancel"
            );
        }
    }
}

#[test]
fn missing_locations_abort_and_keep_triggers() {
    let (h, _timer) = harness(config("60", "60", &[(1, 0, true), (2, 1, true)]));
    h.coordinator.start();
    let before = h.coordinator.snapshot();

    h.config.edit(|c| c.locations.clear());

    assert_eq!(h.coordinator.restart(), ReconcileOutcome::Aborted);
    assert_eq!(h.coordinator.snapshot().armed, before.armed);
}
