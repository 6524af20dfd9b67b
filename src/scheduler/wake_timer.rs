//! Wake-trigger identities, reliability tiers and the platform timer port.
//!
//! The coordinator never talks to a concrete timer. It builds an
//! [`ArmRequest`] and hands it to [`arm_with_fallback`], which walks the
//! reliability ladder against whatever [`WakeTimerPort`] the host supplies.
//! Every armed trigger is tracked in a [`TriggerTable`] owned by the
//! coordinator; the port only ever sees the opaque [`WakeToken`].

use crate::error::{Result, SchedulerError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Logical wake trigger. At most one instance of each kind is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Refresh of every secondary (non-primary) location.
    RegularLocationUpdate,
    /// Location-and-weather refresh of the primary location.
    AutoLocationUpdate,
    /// User notification refresh.
    NotificationUpdate,
    /// Periodic re-assertion of the sensor monitor.
    SensorCheck,
    /// Periodic re-assertion of the screen monitor.
    ScreenCheck,
}

impl TriggerKind {
    /// All kinds, in cancellation order used by `stop_all`.
    pub const ALL: [TriggerKind; 5] = [
        TriggerKind::RegularLocationUpdate,
        TriggerKind::AutoLocationUpdate,
        TriggerKind::NotificationUpdate,
        TriggerKind::SensorCheck,
        TriggerKind::ScreenCheck,
    ];

    /// Stable snake_case name, used in logs and the host protocol.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RegularLocationUpdate => "regular_location_update",
            Self::AutoLocationUpdate => "auto_location_update",
            Self::NotificationUpdate => "notification_update",
            Self::SensorCheck => "sensor_check",
            Self::ScreenCheck => "screen_check",
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strength of the delivery guarantee requested from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReliabilityTier {
    /// Host may batch or delay the wake-up.
    BestEffort,
    /// Fires at the requested time, may be deferred while the device idles.
    Exact,
    /// Fires at the requested time even while the device idles.
    ExactAllowWhileIdle,
}

impl ReliabilityTier {
    /// Fallback ladder starting at `self`, strongest first.
    #[must_use]
    pub fn ladder(self) -> &'static [ReliabilityTier] {
        const LADDER: [ReliabilityTier; 3] = [
            ReliabilityTier::ExactAllowWhileIdle,
            ReliabilityTier::Exact,
            ReliabilityTier::BestEffort,
        ];
        match self {
            Self::ExactAllowWhileIdle => &LADDER,
            Self::Exact => &LADDER[1..],
            Self::BestEffort => &LADDER[2..],
        }
    }
}

/// Opaque handle returned by the host timer for one armed trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WakeToken(pub u64);

/// Parameters of a single arm call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmRequest {
    /// Trigger identity.
    pub kind: TriggerKind,
    /// Delay until the first fire.
    pub first_fire_delay: Duration,
    /// Repeat period, or `None` for a one-shot trigger.
    pub period: Option<Duration>,
    /// Requested tier. Lower rungs are tried when this one is rejected.
    pub tier: ReliabilityTier,
}

impl ArmRequest {
    /// One-shot trigger firing after `delay`, requested at the strongest tier.
    #[must_use]
    pub fn one_shot(kind: TriggerKind, delay: Duration) -> Self {
        Self {
            kind,
            first_fire_delay: delay,
            period: None,
            tier: ReliabilityTier::ExactAllowWhileIdle,
        }
    }

    /// Inexact repeating trigger, first firing one period from now.
    #[must_use]
    pub fn repeating(kind: TriggerKind, period: Duration) -> Self {
        Self {
            kind,
            first_fire_delay: period,
            period: Some(period),
            tier: ReliabilityTier::BestEffort,
        }
    }
}

/// Abstraction over the platform's wake-timer primitive.
///
/// Implementations must not block: both calls are made while the
/// coordinator holds its lock.
pub trait WakeTimerPort: Send + Sync {
    /// Schedule a trigger at exactly `request.tier`.
    ///
    /// Returns [`SchedulerError::UnsupportedTier`] when the host cannot
    /// honour the tier; the caller falls back to a weaker one.
    fn arm(&self, request: &ArmRequest) -> Result<WakeToken>;

    /// Cancel the trigger of the given kind. Cancelling an unarmed kind is a no-op.
    fn cancel(&self, kind: TriggerKind);
}

/// A trigger currently armed with the host timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTrigger {
    pub kind: TriggerKind,
    pub fire_at: Instant,
    pub period: Option<Duration>,
    pub tier: ReliabilityTier,
    pub token: WakeToken,
}

/// Arm `request`, walking down the reliability ladder on rejection.
///
/// The ladder is evaluated on every call; host capability is never cached.
/// Errors other than a tier rejection are returned immediately, as is the
/// last rejection when every rung was refused. A delay that cannot be
/// added to `now` is a [`SchedulerError::Config`] and reaches no port.
pub fn arm_with_fallback(
    port: &dyn WakeTimerPort,
    request: &ArmRequest,
    now: Instant,
) -> Result<ArmedTrigger> {
    let fire_at = now.checked_add(request.first_fire_delay).ok_or_else(|| {
        SchedulerError::Config(format!(
            "delay {:?} for {} is out of range",
            request.first_fire_delay, request.kind
        ))
    })?;
    let mut last_err = None;
    for &tier in request.tier.ladder() {
        let attempt = ArmRequest { tier, ..*request };
        match port.arm(&attempt) {
            Ok(token) => {
                return Ok(ArmedTrigger {
                    kind: request.kind,
                    fire_at,
                    period: request.period,
                    tier,
                    token,
                });
            }
            Err(e @ SchedulerError::UnsupportedTier { .. }) => {
                debug!(
                    kind = %request.kind,
                    tier = ?tier,
                    "wake timer rejected tier, falling back"
                );
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or(SchedulerError::UnsupportedTier {
        kind: request.kind,
        tier: request.tier,
    }))
}

/// Armed triggers keyed by kind.
///
/// Inserting a kind that is already present replaces the earlier entry
/// (last writer wins), so two entries of one kind can never coexist.
#[derive(Debug, Default, Clone)]
pub struct TriggerTable {
    armed: BTreeMap<TriggerKind, ArmedTrigger>,
}

impl TriggerTable {
    /// Record an armed trigger, returning the entry it superseded.
    pub fn insert(&mut self, trigger: ArmedTrigger) -> Option<ArmedTrigger> {
        self.armed.insert(trigger.kind, trigger)
    }

    /// Forget a kind, returning the removed entry.
    pub fn remove(&mut self, kind: TriggerKind) -> Option<ArmedTrigger> {
        self.armed.remove(&kind)
    }

    #[must_use]
    pub fn get(&self, kind: TriggerKind) -> Option<&ArmedTrigger> {
        self.armed.get(&kind)
    }

    #[must_use]
    pub fn contains(&self, kind: TriggerKind) -> bool {
        self.armed.contains_key(&kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    /// Armed triggers in kind order.
    pub fn iter(&self) -> impl Iterator<Item = &ArmedTrigger> {
        self.armed.values()
    }
}
