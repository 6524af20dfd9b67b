//! Alarm scheduling and subsystem coordination.
//!
//! Leaf-first: [`wake_timer`] defines trigger identities and the host timer
//! port, [`queue`] and [`binding`] defer subsystem commands until a
//! connection is live, [`policy`] decides what should be armed, and
//! [`coordinator`] applies those decisions under one lock. [`timer`] and
//! [`runtime`] provide an in-process tokio host for all of it.

pub mod binding;
pub mod coordinator;
pub mod policy;
pub mod ports;
pub mod queue;
pub mod runtime;
pub mod timer;
pub mod wake_timer;

pub use binding::{BindingEvent, BindingState, Subsystem, SubsystemBinding};
pub use coordinator::{AlarmCoordinator, Collaborators, CoordinatorSnapshot, ReconcileOutcome};
pub use policy::{SchedulePlan, SchedulePolicy, ScheduleConfig, TriggerDecision};
pub use queue::{DeferredActionQueue, QueuedAction};
pub use runtime::{Command, CommandClient, CoordinatorRuntime};
pub use timer::TokioWakeTimer;
pub use wake_timer::{ArmRequest, ReliabilityTier, TriggerKind, WakeTimerPort, WakeToken};
