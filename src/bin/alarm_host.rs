//! Headless alarm host.
//!
//! Loads the configuration file, runs the coordinator on an in-process
//! tokio wake timer and reads host action names (`START`, `RESTART`,
//! `AUTO_TRIGGER_FIRED`, ...) from stdin, one per line. `STATUS` prints a
//! JSON snapshot to stdout; `QUIT` or EOF shuts down.
//!
//! Diagnostics go to stderr and, when `logging.log_dir` is set, to a daily
//! rotated log file.

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use weather_alarm::config::{FileConfigProvider, LoggingConfig, SchedulerConfig};
use weather_alarm::scheduler::ports::{
    ForecastDueOracle, NotificationSink, SubsystemConnector, SubsystemHandle, WeatherFetchService,
};
use weather_alarm::scheduler::{
    AlarmCoordinator, BindingEvent, Collaborators, Command, CoordinatorRuntime, SchedulePolicy,
    Subsystem, TokioWakeTimer,
};

/// Fetch service and notification sink that only log requests.
struct LoggingServices;

impl WeatherFetchService for LoggingServices {
    fn request_location_refresh(&self, location_id: i64) {
        tracing::info!(location_id, "location refresh requested");
    }

    fn request_auto_location_refresh(&self, primary_location_id: i64) {
        tracing::info!(primary_location_id, "auto location refresh requested");
    }

    fn request_forecast_refresh(&self, location_id: i64) {
        tracing::info!(location_id, "forecast refresh requested");
    }
}

impl NotificationSink for LoggingServices {
    fn request_notification_refresh(&self) {
        tracing::info!("notification refresh requested");
    }

    fn cancel_all_notifications(&self) {
        tracing::info!("all notifications cleared");
    }
}

impl ForecastDueOracle for LoggingServices {
    fn should_refresh_forecast(&self, _location_id: i64) -> bool {
        true
    }
}

struct LoggingMonitor {
    subsystem: Subsystem,
}

impl SubsystemHandle for LoggingMonitor {
    fn start_updates(&self, origin_index: Option<usize>) {
        tracing::info!(subsystem = %self.subsystem, ?origin_index, "monitor started");
    }

    fn stop_updates(&self) {
        tracing::info!(subsystem = %self.subsystem, "monitor stopped");
    }
}

/// Binds each subsystem to an in-process monitor immediately.
struct SelfBinder<'a> {
    coordinator: &'a AlarmCoordinator,
}

impl SubsystemConnector for SelfBinder<'_> {
    fn connect(&self, subsystem: Subsystem) {
        self.coordinator.on_binding_changed(
            subsystem,
            BindingEvent::Bound(Arc::new(LoggingMonitor { subsystem })),
        );
    }
}

fn init_logging(config: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.filter));

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "weather-alarm.log");
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_ansi(false)
                .with_writer(std::io::stderr.and(file_writer))
                .with_env_filter(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
            None
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<SchedulerConfig> {
    if path.exists() {
        return SchedulerConfig::from_file(path)
            .with_context(|| format!("cannot load config from {}", path.display()));
    }
    let config = SchedulerConfig::default();
    config
        .save_to_file(path)
        .with_context(|| format!("cannot write default config to {}", path.display()))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(SchedulerConfig::default_config_path);
    let config = load_config(&path)?;
    let _log_guard = init_logging(&config.logging);

    tracing::info!(config = %path.display(), "weather-alarm-host starting");

    let (timer, fires) =
        TokioWakeTimer::new(tokio::runtime::Handle::current(), &config.timer.supported_tiers);
    let provider = Arc::new(FileConfigProvider::new(path.clone()));
    let services = Arc::new(LoggingServices);
    let coordinator = Arc::new(
        AlarmCoordinator::new(Collaborators {
            config: provider.clone(),
            locations: provider,
            forecasts: services.clone(),
            fetch: services.clone(),
            notifications: services,
            timer: Arc::new(timer),
        })
        .with_policy(SchedulePolicy::from(&config.policy)),
    );
    coordinator.connect_subsystems(&SelfBinder {
        coordinator: &coordinator,
    });

    let runtime = CoordinatorRuntime::spawn(
        Arc::clone(&coordinator),
        fires,
        config.runtime.command_capacity,
        CancellationToken::new(),
    );
    let client = runtime.client();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let action = line.trim();
        if action.is_empty() {
            continue;
        }
        match action.to_ascii_uppercase().as_str() {
            "QUIT" => break,
            "STATUS" => {
                let snapshot = serde_json::to_string(&coordinator.snapshot())
                    .context("cannot serialize snapshot")?;
                println!("{snapshot}");
            }
            _ => match Command::from_action_name(action) {
                Some(command) => client
                    .send(command)
                    .await
                    .context("coordinator runtime stopped")?,
                None => tracing::warn!(action, "unknown action"),
            },
        }
    }

    runtime.shutdown().await;
    coordinator.release_subsystems();
    tracing::info!("weather-alarm-host shut down cleanly");
    Ok(())
}
