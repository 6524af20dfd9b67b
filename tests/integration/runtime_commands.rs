//! Command runtime and in-process timer working together.

use crate::helpers::{Harness, MonitorCall, RecordingMonitor, Request, location};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use weather_alarm::config::{AutoUpdatePeriod, SchedulerConfig, UpdatePeriod};
use weather_alarm::scheduler::{
    BindingEvent, Command, CoordinatorRuntime, ReconcileOutcome, ReliabilityTier,
    SchedulePolicy, Subsystem, TokioWakeTimer, TriggerKind,
};

const ALL_TIERS: [ReliabilityTier; 3] = [
    ReliabilityTier::BestEffort,
    ReliabilityTier::Exact,
    ReliabilityTier::ExactAllowWhileIdle,
];

fn sensor_mode_config() -> SchedulerConfig {
    let mut config = SchedulerConfig::default();
    config.preferences.location_update_period = UpdatePeriod::Disabled;
    config.preferences.location_auto_update_period = AutoUpdatePeriod::Disabled;
    config.locations = vec![location(1, 0, true)];
    config
}

async fn wait_for(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    done()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn host_action_names_drive_the_coordinator() {
    let (timer, fires) = TokioWakeTimer::new(tokio::runtime::Handle::current(), &ALL_TIERS);
    let mut config = SchedulerConfig::default();
    config.locations = vec![location(1, 0, true), location(2, 1, true)];
    let h = Harness::new(config, Arc::new(timer));
    let runtime =
        CoordinatorRuntime::spawn(h.coordinator.clone(), fires, 8, CancellationToken::new());
    let client = runtime.client();

    let start = Command::from_action_name("START").unwrap();
    assert_eq!(client.request(start).await.unwrap(), ReconcileOutcome::Reconciled);
    let regular = Command::from_action_name("REGULAR_TRIGGER_FIRED").unwrap();
    client.request(regular).await.unwrap();

    let requests = h.services.requests();
    assert!(requests.contains(&Request::Location(2)));
    assert!(!requests.contains(&Request::Location(1)));

    client.request(Command::StopAll).await.unwrap();
    assert!(h.coordinator.snapshot().armed.is_empty());
    runtime.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sensor_check_fires_reassert_the_monitor() {
    let (timer, fires) = TokioWakeTimer::new(tokio::runtime::Handle::current(), &ALL_TIERS);
    let h = Harness::with_policy(
        sensor_mode_config(),
        Arc::new(timer),
        SchedulePolicy {
            sensor_check_period: Duration::from_millis(50),
            night_end_hour: 6,
        },
    );
    let coordinator = h.coordinator.clone();
    let runtime =
        CoordinatorRuntime::spawn(coordinator.clone(), fires, 8, CancellationToken::new());

    let sensor = Arc::new(RecordingMonitor::default());
    runtime
        .client()
        .request(Command::BindingChanged {
            subsystem: Subsystem::Sensor,
            event: BindingEvent::Bound(sensor.clone()),
        })
        .await
        .unwrap();
    runtime.client().request(Command::Start).await.unwrap();

    let reasserted = wait_for(|| sensor.calls().len() >= 3).await;
    assert!(reasserted, "sensor check never fired: {:?}", sensor.calls());
    assert!(sensor
        .calls()
        .iter()
        .all(|call| *call == MonitorCall::Start(Some(0))));
    assert!(coordinator.snapshot().is_armed(TriggerKind::SensorCheck));

    runtime.shutdown().await;
}

#[tokio::test]
async fn try_send_fails_once_runtime_stops() {
    let (timer, fires) = TokioWakeTimer::new(tokio::runtime::Handle::current(), &ALL_TIERS);
    let h = Harness::new(sensor_mode_config(), Arc::new(timer));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let runtime = CoordinatorRuntime::spawn(h.coordinator.clone(), fires, 1, cancel);
    let client = runtime.client();
    runtime.shutdown().await;

    assert!(client.try_send(Command::Start).is_err());
}
