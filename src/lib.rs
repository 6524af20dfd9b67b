//! Weather alarm: scheduling core of a periodic weather-update client.
//!
//! Decides when background work fires (regular refresh of secondary
//! locations, auto-location refresh of the primary location, notification
//! refresh, sensor and screen re-assertion checks), arms a wake trigger for
//! each, and defers commands for the screen and sensor monitors until they
//! are bound.
//!
//! # Architecture
//!
//! - **Policy**: pure rules mapping a configuration snapshot to a plan
//! - **Coordinator**: applies plans, handles fires and binding changes
//! - **Wake timer**: host port with a reliability fallback ladder
//! - **Runtime**: serial tokio command loop and an in-process timer

pub mod config;
pub mod error;
pub mod scheduler;


pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError};
pub use scheduler::{AlarmCoordinator, Command, CoordinatorRuntime, ReconcileOutcome, TriggerKind};
