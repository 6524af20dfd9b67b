//! Deferred commands for a dependent subsystem that is not bound yet.

use crate::scheduler::binding::Subsystem;
use crate::scheduler::ports::SubsystemHandle;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Command directed at the screen or sensor monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueuedAction {
    /// Start sensor-based location updates from the given location index.
    StartSensorUpdates {
        /// Location order index the sensor monitor tracks (0 = primary).
        origin_index: usize,
    },
    StopSensorUpdates,
    StartScreenUpdates,
    StopScreenUpdates,
}

impl QueuedAction {
    /// Subsystem this action is addressed to.
    #[must_use]
    pub fn subsystem(self) -> Subsystem {
        match self {
            Self::StartSensorUpdates { .. } | Self::StopSensorUpdates => Subsystem::Sensor,
            Self::StartScreenUpdates | Self::StopScreenUpdates => Subsystem::Screen,
        }
    }

    /// Execute against a live subsystem handle.
    pub fn apply(self, handle: &dyn SubsystemHandle) {
        match self {
            Self::StartSensorUpdates { origin_index } => handle.start_updates(Some(origin_index)),
            Self::StartScreenUpdates => handle.start_updates(None),
            Self::StopSensorUpdates | Self::StopScreenUpdates => handle.stop_updates(),
        }
    }
}

/// FIFO of actions waiting for a subsystem to bind.
///
/// Stores the raw history and replays it literally; a `Stop` queued after
/// a `Start` still runs after it.
#[derive(Debug, Default)]
pub struct DeferredActionQueue {
    pending: VecDeque<QueuedAction>,
}

impl DeferredActionQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action.
    pub fn enqueue(&mut self, action: QueuedAction) {
        self.pending.push_back(action);
    }

    /// Execute every queued action in order against `handle`, leaving the
    /// queue empty. Returns how many actions ran.
    pub fn drain_into(&mut self, handle: &dyn SubsystemHandle) -> usize {
        let mut drained = 0;
        while let Some(action) = self.pending.pop_front() {
            action.apply(handle);
            drained += 1;
        }
        drained
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending actions, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &QueuedAction> {
        self.pending.iter()
    }
}
