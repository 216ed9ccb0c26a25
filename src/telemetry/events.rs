use std::fmt;
use std::time::Duration;

#[cfg(feature = "telemetry-json")]
use serde_json::json;

use crate::quota::Tier;
use crate::selector::Rarity;
use crate::throttle::OperationClass;

/// Governance events emitted while admitting and serving a request.
///
/// Every component reports what it decided through these events. They can be
/// collected for tests, forwarded to logs, or streamed to an external consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum GovernanceEvent {
    /// Request throttle events
    Throttle(ThrottleEvent),
    /// Quota ledger events
    Quota(QuotaEvent),
    /// Scenario selection events
    Selection(SelectionEvent),
    /// Outcome of the gated generation call
    Generation(GenerationEvent),
}

/// Events emitted by the request throttle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThrottleEvent {
    /// A request was counted against its window and allowed.
    Allowed {
        /// Caller identity
        identity: String,
        /// Operation class whose counter was charged
        operation: OperationClass,
        /// Requests left in the current window
        remaining: u32,
    },
    /// A request arrived with its window already full.
    Denied {
        /// Caller identity
        identity: String,
        /// Operation class whose counter was full
        operation: OperationClass,
        /// Time until the window resets
        retry_after: Duration,
    },
    /// The background sweep removed expired windows.
    Swept {
        /// Windows removed by this sweep
        removed: usize,
        /// Windows still live afterwards
        live: usize,
    },
}

/// Events emitted by the quota ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaEvent {
    /// A user had no generations left.
    Denied {
        /// User whose quota was checked
        user_id: String,
        /// Tier the ceiling came from
        tier: Tier,
    },
    /// Quota state could not be read; the request was refused.
    Unavailable {
        /// User whose record could not be read
        user_id: String,
    },
    /// A premium daily counter was reset for a new calendar day.
    RolledOver {
        /// User whose counter rolled over
        user_id: String,
        /// Counter value before the reset
        previous_today: u32,
    },
    /// A premium subscription ended and the user fell back to the free tier.
    Lapsed {
        /// User whose subscription lapsed
        user_id: String,
    },
    /// A successful generation was charged.
    Committed {
        /// User that was charged
        user_id: String,
        /// Tier the charge was recorded under
        tier: Tier,
        /// Lifetime generations after this charge
        total_generated: u64,
    },
    /// A user moved to the premium tier.
    Upgraded {
        /// User that upgraded
        user_id: String,
        /// Historical consumption carried over
        total_used: u32,
    },
}

/// Events emitted when a scenario is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionEvent {
    /// A disease was chosen for the scenario.
    Picked {
        /// Resolved domain
        domain: String,
        /// Chosen disease
        disease_name: String,
        /// Rarity of the chosen disease
        rarity: Rarity,
    },
}

/// Outcome of the generation call guarded by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    /// Generation returned a result and quota was charged.
    Succeeded {
        /// Requesting user
        user_id: String,
        /// Time spent in the generation call
        duration: Duration,
    },
    /// Generation returned an error; nothing was charged.
    Failed {
        /// Requesting user
        user_id: String,
        /// Time spent before the failure
        duration: Duration,
    },
    /// Generation exceeded its deadline; nothing was charged.
    TimedOut {
        /// Requesting user
        user_id: String,
        /// Configured deadline
        timeout: Duration,
    },
}

impl From<ThrottleEvent> for GovernanceEvent {
    fn from(event: ThrottleEvent) -> Self {
        GovernanceEvent::Throttle(event)
    }
}

impl From<QuotaEvent> for GovernanceEvent {
    fn from(event: QuotaEvent) -> Self {
        GovernanceEvent::Quota(event)
    }
}

impl From<SelectionEvent> for GovernanceEvent {
    fn from(event: SelectionEvent) -> Self {
        GovernanceEvent::Selection(event)
    }
}

impl From<GenerationEvent> for GovernanceEvent {
    fn from(event: GenerationEvent) -> Self {
        GovernanceEvent::Generation(event)
    }
}

impl fmt::Display for GovernanceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GovernanceEvent::Throttle(event) => write!(f, "Throttle::{}", event),
            GovernanceEvent::Quota(event) => write!(f, "Quota::{}", event),
            GovernanceEvent::Selection(event) => write!(f, "Selection::{}", event),
            GovernanceEvent::Generation(event) => write!(f, "Generation::{}", event),
        }
    }
}

impl fmt::Display for ThrottleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThrottleEvent::Allowed { identity, operation, remaining } => {
                write!(f, "Allowed({}/{}, remaining={})", identity, operation, remaining)
            }
            ThrottleEvent::Denied { identity, operation, retry_after } => {
                write!(f, "Denied({}/{}, retry_after={:?})", identity, operation, retry_after)
            }
            ThrottleEvent::Swept { removed, live } => {
                write!(f, "Swept(removed={}, live={})", removed, live)
            }
        }
    }
}

impl fmt::Display for QuotaEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaEvent::Denied { user_id, tier } => write!(f, "Denied({}, tier={})", user_id, tier),
            QuotaEvent::Unavailable { user_id } => write!(f, "Unavailable({})", user_id),
            QuotaEvent::RolledOver { user_id, previous_today } => {
                write!(f, "RolledOver({}, previous_today={})", user_id, previous_today)
            }
            QuotaEvent::Lapsed { user_id } => write!(f, "Lapsed({})", user_id),
            QuotaEvent::Committed { user_id, tier, total_generated } => {
                write!(f, "Committed({}, tier={}, total={})", user_id, tier, total_generated)
            }
            QuotaEvent::Upgraded { user_id, total_used } => {
                write!(f, "Upgraded({}, total_used={})", user_id, total_used)
            }
        }
    }
}

impl fmt::Display for SelectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionEvent::Picked { domain, disease_name, rarity } => {
                write!(f, "Picked({}: {} [{}])", domain, disease_name, rarity)
            }
        }
    }
}

impl fmt::Display for GenerationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationEvent::Succeeded { user_id, duration } => {
                write!(f, "Succeeded({}, duration={:?})", user_id, duration)
            }
            GenerationEvent::Failed { user_id, duration } => {
                write!(f, "Failed({}, duration={:?})", user_id, duration)
            }
            GenerationEvent::TimedOut { user_id, timeout } => {
                write!(f, "TimedOut({}, timeout={:?})", user_id, timeout)
            }
        }
    }
}

#[cfg_attr(not(feature = "telemetry-json"), allow(dead_code))]
#[inline]
fn clamp_u64(val: u128) -> u64 {
    val.min(u128::from(u64::MAX)) as u64
}

/// Convert a GovernanceEvent into a JSON value for sinks.
#[cfg(feature = "telemetry-json")]
pub fn event_to_json(event: &GovernanceEvent) -> serde_json::Value {
    match event {
        GovernanceEvent::Throttle(t) => match t {
            ThrottleEvent::Allowed { identity, operation, remaining } => json!({
                "kind": "throttle_allowed",
                "identity": identity,
                "operation": operation.as_str(),
                "remaining": *remaining,
            }),
            ThrottleEvent::Denied { identity, operation, retry_after } => json!({
                "kind": "throttle_denied",
                "identity": identity,
                "operation": operation.as_str(),
                "retry_after_ms": clamp_u64(retry_after.as_millis()),
            }),
            ThrottleEvent::Swept { removed, live } => {
                json!({ "kind": "throttle_swept", "removed": *removed, "live": *live })
            }
        },
        GovernanceEvent::Quota(q) => match q {
            QuotaEvent::Denied { user_id, tier } => {
                json!({ "kind": "quota_denied", "user_id": user_id, "tier": tier.as_str() })
            }
            QuotaEvent::Unavailable { user_id } => {
                json!({ "kind": "quota_unavailable", "user_id": user_id })
            }
            QuotaEvent::RolledOver { user_id, previous_today } => json!({
                "kind": "quota_rolled_over",
                "user_id": user_id,
                "previous_today": *previous_today,
            }),
            QuotaEvent::Lapsed { user_id } => json!({ "kind": "quota_lapsed", "user_id": user_id }),
            QuotaEvent::Committed { user_id, tier, total_generated } => json!({
                "kind": "quota_committed",
                "user_id": user_id,
                "tier": tier.as_str(),
                "total_generated": *total_generated,
            }),
            QuotaEvent::Upgraded { user_id, total_used } => json!({
                "kind": "quota_upgraded",
                "user_id": user_id,
                "total_used": *total_used,
            }),
        },
        GovernanceEvent::Selection(SelectionEvent::Picked { domain, disease_name, rarity }) => {
            json!({
                "kind": "selection_picked",
                "domain": domain,
                "disease": disease_name,
                "rarity": rarity.as_str(),
            })
        }
        GovernanceEvent::Generation(g) => match g {
            GenerationEvent::Succeeded { user_id, duration } => json!({
                "kind": "generation_succeeded",
                "user_id": user_id,
                "duration_ms": clamp_u64(duration.as_millis()),
            }),
            GenerationEvent::Failed { user_id, duration } => json!({
                "kind": "generation_failed",
                "user_id": user_id,
                "duration_ms": clamp_u64(duration.as_millis()),
            }),
            GenerationEvent::TimedOut { user_id, timeout } => json!({
                "kind": "generation_timed_out",
                "user_id": user_id,
                "timeout_ms": clamp_u64(timeout.as_millis()),
            }),
        },
    }
}
