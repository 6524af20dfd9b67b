//! In-process wake timer backed by tokio tasks.
//!
//! Each armed kind owns one sleeping task. When it wakes it sends the kind
//! on the fire channel, which the [`CoordinatorRuntime`] turns into a
//! trigger-fired command. Re-arming a kind aborts the previous task first.
//!
//! [`CoordinatorRuntime`]: crate::scheduler::runtime::CoordinatorRuntime

use crate::error::{Result, SchedulerError};
use crate::scheduler::wake_timer::{
    ArmRequest, ReliabilityTier, TriggerKind, WakeTimerPort, WakeToken,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Receiving half of the fire channel.
pub type FireReceiver = mpsc::UnboundedReceiver<TriggerKind>;

/// [`WakeTimerPort`] implementation running on a tokio runtime.
///
/// Safe to call from blocking threads: tasks are spawned through the
/// runtime handle captured at construction.
pub struct TokioWakeTimer {
    runtime: Handle,
    supported: Vec<ReliabilityTier>,
    fire_tx: mpsc::UnboundedSender<TriggerKind>,
    tasks: Mutex<HashMap<TriggerKind, JoinHandle<()>>>,
    next_token: AtomicU64,
}

impl TokioWakeTimer {
    /// Create a timer on `runtime` accepting only `supported` tiers.
    #[must_use]
    pub fn new(runtime: Handle, supported: &[ReliabilityTier]) -> (Self, FireReceiver) {
        let (fire_tx, fire_rx) = mpsc::unbounded_channel();
        let timer = Self {
            runtime,
            supported: supported.to_vec(),
            fire_tx,
            tasks: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        };
        (timer, fire_rx)
    }

    /// Number of kinds with a live task.
    #[must_use]
    pub fn armed_count(&self) -> usize {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.values().filter(|task| !task.is_finished()).count()
    }

    fn spawn_task(&self, request: &ArmRequest) -> JoinHandle<()> {
        let kind = request.kind;
        let delay = request.first_fire_delay;
        let period = request.period;
        let fire_tx = self.fire_tx.clone();

        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            trace!(%kind, "wake timer fired");
            if fire_tx.send(kind).is_err() {
                return;
            }
            let Some(period) = period else {
                return;
            };
            let Some(start) = tokio::time::Instant::now().checked_add(period) else {
                warn!(%kind, ?period, "repeat period out of range, not repeating");
                return;
            };
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                trace!(%kind, "repeating wake timer fired");
                if fire_tx.send(kind).is_err() {
                    break;
                }
            }
        })
    }
}

impl WakeTimerPort for TokioWakeTimer {
    fn arm(&self, request: &ArmRequest) -> Result<WakeToken> {
        if !self.supported.contains(&request.tier) {
            return Err(SchedulerError::UnsupportedTier {
                kind: request.kind,
                tier: request.tier,
            });
        }
        if request.period.is_some_and(|period| period.is_zero()) {
            return Err(SchedulerError::Config(format!(
                "repeat period of {} must be positive",
                request.kind
            )));
        }

        let task = self.spawn_task(request);
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = tasks.insert(request.kind, task) {
            previous.abort();
        }
        let token = WakeToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        debug!(
            kind = %request.kind,
            tier = ?request.tier,
            delay_ms = u64::try_from(request.first_fire_delay.as_millis()).unwrap_or(u64::MAX),
            repeating = request.period.is_some(),
            token = token.0,
            "wake timer armed"
        );
        Ok(token)
    }

    fn cancel(&self, kind: TriggerKind) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = tasks.remove(&kind) {
            task.abort();
            debug!(%kind, "wake timer cancelled");
        }
    }
}

impl Drop for TokioWakeTimer {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, task) in tasks.drain() {
            task.abort();
        }
    }
}
