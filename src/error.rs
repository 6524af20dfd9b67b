//! Error types for the alarm scheduling core.

use crate::scheduler::wake_timer::{ReliabilityTier, TriggerKind};

/// Top-level error type for the scheduling core.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A value the reconciliation depends on could not be read.
    ///
    /// The current cycle is abandoned and previously armed triggers stay
    /// untouched; the next reconciliation retries naturally.
    #[error("configuration absent: {0}")]
    ConfigurationAbsent(String),

    /// The host wake-timer mechanism rejected the requested tier.
    #[error("wake timer rejected tier {tier:?} for {kind:?}")]
    UnsupportedTier {
        /// Trigger that was being armed.
        kind: TriggerKind,
        /// Tier that was refused.
        tier: ReliabilityTier,
    },

    /// Configuration parse or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Command channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SchedulerError>;
