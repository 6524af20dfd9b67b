//! Connection lifecycle of a dependent subsystem.
//!
//! A [`SubsystemBinding`] is `Unbound` until a bind is requested, `Connecting`
//! while the host resolves it, and `Bound` once a live handle arrives.
//! Disconnecting returns it to `Unbound`, from where it can bind again.
//! Commands dispatched while not bound wait in the binding's
//! [`DeferredActionQueue`] and are flushed on the `Bound` transition.

use crate::scheduler::ports::SubsystemHandle;
use crate::scheduler::queue::{DeferredActionQueue, QueuedAction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Dependent subsystem driven by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    /// Screen on/off monitor.
    Screen,
    /// Sensor-based location monitor.
    Sensor,
}

impl Subsystem {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Screen => "screen",
            Self::Sensor => "sensor",
        }
    }
}

impl std::fmt::Display for Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binding lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingState {
    #[default]
    Unbound,
    Connecting,
    Bound,
}

/// Lifecycle signal delivered by the host's binding mechanism.
#[derive(Clone)]
pub enum BindingEvent {
    /// A connection attempt was started.
    Connecting,
    /// The connection is established and `handle` is live.
    Bound(Arc<dyn SubsystemHandle>),
    /// The connection was lost or released.
    Unbound,
}

impl std::fmt::Debug for BindingEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => f.write_str("Connecting"),
            Self::Bound(_) => f.write_str("Bound(..)"),
            Self::Unbound => f.write_str("Unbound"),
        }
    }
}

/// How a dispatched action was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Ran synchronously against the live handle.
    Executed,
    /// Queued until the next `Bound` transition.
    Deferred,
}

/// Binding state machine for one subsystem, owning its deferred queue.
pub struct SubsystemBinding {
    subsystem: Subsystem,
    state: BindingState,
    handle: Option<Arc<dyn SubsystemHandle>>,
    queue: DeferredActionQueue,
}

impl SubsystemBinding {
    #[must_use]
    pub fn new(subsystem: Subsystem) -> Self {
        Self {
            subsystem,
            state: BindingState::Unbound,
            handle: None,
            queue: DeferredActionQueue::new(),
        }
    }

    #[must_use]
    pub fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    #[must_use]
    pub fn state(&self) -> BindingState {
        self.state
    }

    /// Number of actions waiting for the next `Bound` transition.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Move `Unbound -> Connecting`.
    ///
    /// Returns `true` when the caller must start a connection attempt, and
    /// `false` when one is already live or the subsystem is bound.
    pub fn request_bind(&mut self) -> bool {
        match self.state {
            BindingState::Unbound => {
                self.state = BindingState::Connecting;
                debug!(subsystem = %self.subsystem, "binding requested");
                true
            }
            BindingState::Connecting | BindingState::Bound => false,
        }
    }

    /// Execute `action` now when bound, otherwise defer it.
    pub fn dispatch(&mut self, action: QueuedAction) -> Dispatch {
        if action.subsystem() != self.subsystem {
            warn!(
                subsystem = %self.subsystem,
                ?action,
                "action addressed to another subsystem, routing anyway"
            );
        }
        if self.state == BindingState::Bound {
            if let Some(handle) = &self.handle {
                action.apply(handle.as_ref());
                return Dispatch::Executed;
            }
        }
        self.queue.enqueue(action);
        debug!(
            subsystem = %self.subsystem,
            ?action,
            pending = self.queue.len(),
            "subsystem not bound, action deferred"
        );
        Dispatch::Deferred
    }

    /// Apply a lifecycle event. Returns how many deferred actions were flushed.
    pub fn apply(&mut self, event: BindingEvent) -> usize {
        match event {
            BindingEvent::Connecting => {
                if self.state == BindingState::Bound {
                    debug!(subsystem = %self.subsystem, "ignoring connecting signal while bound");
                } else {
                    self.state = BindingState::Connecting;
                }
                0
            }
            BindingEvent::Bound(handle) => self.mark_bound(handle),
            BindingEvent::Unbound => {
                self.mark_unbound();
                0
            }
        }
    }

    /// Transition into `Bound` and flush the deferred queue into `handle`.
    pub fn mark_bound(&mut self, handle: Arc<dyn SubsystemHandle>) -> usize {
        if self.state == BindingState::Unbound {
            debug!(subsystem = %self.subsystem, "bound without a tracked connection attempt");
        }
        self.state = BindingState::Bound;
        let drained = self.queue.drain_into(handle.as_ref());
        self.handle = Some(handle);
        info!(subsystem = %self.subsystem, drained, "subsystem bound");
        drained
    }

    /// Drop the live handle and return to `Unbound`.
    pub fn mark_unbound(&mut self) {
        if self.handle.take().is_some() || self.state != BindingState::Unbound {
            info!(subsystem = %self.subsystem, "subsystem unbound");
        }
        self.state = BindingState::Unbound;
    }
}

impl std::fmt::Debug for SubsystemBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubsystemBinding")
            .field("subsystem", &self.subsystem)
            .field("state", &self.state)
            .field("pending", &self.queue.len())
            .finish()
    }
}
