//! Serial command loop in front of the coordinator.
//!
//! Commands from the host and fires from the wake timer are funnelled into
//! one task that handles them strictly in arrival order, each on the
//! blocking pool. The coordinator stays callable from other threads; the
//! loop only guarantees the host's requests never pile up as threads.

use crate::error::{Result, SchedulerError};
use crate::scheduler::binding::{BindingEvent, Subsystem};
use crate::scheduler::coordinator::{AlarmCoordinator, ReconcileOutcome};
use crate::scheduler::timer::FireReceiver;
use crate::scheduler::wake_timer::TriggerKind;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A request for the coordinator.
#[derive(Debug, Clone)]
pub enum Command {
    Start,
    Restart,
    RestartNotificationsOnly,
    TriggerFired(TriggerKind),
    BindingChanged {
        subsystem: Subsystem,
        event: BindingEvent,
    },
    StopAll,
}

impl Command {
    /// Parse a host action name such as `START` or `AUTO_TRIGGER_FIRED`.
    #[must_use]
    pub fn from_action_name(name: &str) -> Option<Self> {
        let command = match name.trim().to_ascii_uppercase().as_str() {
            "START" => Self::Start,
            "RESTART" => Self::Restart,
            "RESTART_NOTIFICATIONS_ONLY" => Self::RestartNotificationsOnly,
            "AUTO_TRIGGER_FIRED" => Self::TriggerFired(TriggerKind::AutoLocationUpdate),
            "REGULAR_TRIGGER_FIRED" => Self::TriggerFired(TriggerKind::RegularLocationUpdate),
            "NOTIFICATION_TRIGGER_FIRED" => Self::TriggerFired(TriggerKind::NotificationUpdate),
            "SENSOR_CHECK_FIRED" => Self::TriggerFired(TriggerKind::SensorCheck),
            "SCREEN_CHECK_FIRED" => Self::TriggerFired(TriggerKind::ScreenCheck),
            "STOP_ALL" => Self::StopAll,
            _ => return None,
        };
        Some(command)
    }

    /// Name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Restart => "restart",
            Self::RestartNotificationsOnly => "restart_notifications_only",
            Self::TriggerFired(_) => "trigger_fired",
            Self::BindingChanged { .. } => "binding_changed",
            Self::StopAll => "stop_all",
        }
    }
}

struct CommandRequest {
    command: Command,
    reply: Option<oneshot::Sender<ReconcileOutcome>>,
}

/// Cloneable sender half of the command channel.
#[derive(Clone)]
pub struct CommandClient {
    request_tx: mpsc::Sender<CommandRequest>,
}

impl CommandClient {
    /// Queue a command without waiting for it to run.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Channel`] when the runtime has stopped.
    pub async fn send(&self, command: Command) -> Result<()> {
        self.request_tx
            .send(CommandRequest {
                command,
                reply: None,
            })
            .await
            .map_err(|_| SchedulerError::Channel("command runtime stopped".to_owned()))
    }

    /// Queue a command from synchronous code, failing when the channel is full.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Channel`] when the channel is full or closed.
    pub fn try_send(&self, command: Command) -> Result<()> {
        self.request_tx
            .try_send(CommandRequest {
                command,
                reply: None,
            })
            .map_err(|e| SchedulerError::Channel(format!("cannot queue command: {e}")))
    }

    /// Queue a command and wait for its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Channel`] when the runtime stops before replying.
    pub async fn request(&self, command: Command) -> Result<ReconcileOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request_tx
            .send(CommandRequest {
                command,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| SchedulerError::Channel("command runtime stopped".to_owned()))?;
        reply_rx
            .await
            .map_err(|_| SchedulerError::Channel("command dropped before completion".to_owned()))
    }
}

/// Background task owning the command loop.
pub struct CoordinatorRuntime {
    client: CommandClient,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl CoordinatorRuntime {
    /// Spawn the loop on the current tokio runtime.
    ///
    /// `fires` is typically the receiver returned by
    /// [`TokioWakeTimer::new`](crate::scheduler::timer::TokioWakeTimer::new).
    pub fn spawn(
        coordinator: Arc<AlarmCoordinator>,
        fires: FireReceiver,
        capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        let (request_tx, request_rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(run_loop(coordinator, request_rx, fires, cancel.clone()));
        Self {
            client: CommandClient { request_tx },
            cancel,
            task,
        }
    }

    #[must_use]
    pub fn client(&self) -> CommandClient {
        self.client.clone()
    }

    /// Stop accepting work and wait for the in-flight command to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "coordinator runtime task failed");
        }
    }
}

async fn run_loop(
    coordinator: Arc<AlarmCoordinator>,
    mut request_rx: mpsc::Receiver<CommandRequest>,
    mut fires: FireReceiver,
    cancel: CancellationToken,
) {
    info!("coordinator runtime started");
    loop {
        let request = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(request) = request_rx.recv() => request,
            Some(kind) = fires.recv() => CommandRequest {
                command: Command::TriggerFired(kind),
                reply: None,
            },
            else => break,
        };

        let name = request.command.name();
        let worker = Arc::clone(&coordinator);
        let command = request.command;
        match tokio::task::spawn_blocking(move || worker.handle(command)).await {
            Ok(outcome) => {
                debug!(command = name, ?outcome, "command handled");
                if let Some(reply) = request.reply {
                    let _ = reply.send(outcome);
                }
            }
            Err(e) => error!(command = name, error = %e, "command worker failed"),
        }
    }
    info!("coordinator runtime stopped");
}
