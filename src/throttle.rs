//! Short-window request throttle.
//!
//! - [`RequestThrottle`]: counts requests per `(identity, operation class)` in fixed
//!   windows and answers allow/deny with the remaining budget.
//! - [`WindowStore`]: where the windows live (in-process by default).
//! - [`SweeperHandle`]: background task that deletes expired windows on a timer.
//! - [`ThrottleLayer`]: Tower middleware that enforces the throttle in front of a service.
//!
//! # Semantics
//!
//! - A missing or expired window is replaced by a fresh one (`count = 1`), so the
//!   first request in a window is always allowed.
//! - A full window denies without counting and reports the window's reset instant.
//! - Each operation class has its own counter; a burst of chat replies never eats
//!   into the generation budget.
//!
//! The throttle never fails. With the in-process store counts are exact; a shared
//! store that loses the compare-and-set race three times in a row yields a short
//! denial rather than an error.
//!
//! ```rust
//! use scenario_governor::throttle::{OperationClass, RequestThrottle};
//! use scenario_governor::config::ThrottleLimits;
//! use std::time::Duration;
//!
//! let throttle = RequestThrottle::new(ThrottleLimits::default());
//! let decision =
//!     throttle.check_limit("user-1", OperationClass::Generation, Duration::from_secs(300), 10);
//! assert!(decision.is_allowed());
//! assert_eq!(decision.remaining, 9);
//! ```

use crate::clock::{Clock, SystemClock};
use crate::config::{ThrottleLimits, WindowLimit};
use crate::telemetry::{NullSink, TelemetrySink, ThrottleEvent};
use arc_swap::ArcSwap;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub mod middleware;
pub mod store;
pub mod sweeper;

pub use middleware::{ThrottleLayer, ThrottleService, ThrottleTarget};
pub use store::{InMemoryWindowStore, RateWindow, WindowKey, WindowStore};
pub use sweeper::SweeperHandle;

const MAX_CAS_ATTEMPTS: usize = 3;
const CONTENTION_BACKOFF_MILLIS: i64 = 100;

/// Classes of gated operations; each has its own limit and counter namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationClass {
    /// Scenario generation.
    Generation,
    /// Reply in a scenario chat.
    ChatReply,
    /// Investigation report request.
    InvestigationReport,
    /// Payment order creation.
    PaymentOrder,
    /// Guidance request.
    Guidance,
}

impl OperationClass {
    pub const ALL: [OperationClass; 5] = [
        OperationClass::Generation,
        OperationClass::ChatReply,
        OperationClass::InvestigationReport,
        OperationClass::PaymentOrder,
        OperationClass::Guidance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationClass::Generation => "generation",
            OperationClass::ChatReply => "chatReply",
            OperationClass::InvestigationReport => "investigationReport",
            OperationClass::PaymentOrder => "paymentOrder",
            OperationClass::Guidance => "guidance",
        }
    }
}

impl fmt::Display for OperationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a throttle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests left in the window after this one. Useful for `X-RateLimit-Remaining`.
    pub remaining: u32,
    /// When the current window closes.
    pub reset_at: DateTime<Utc>,
}

impl ThrottleDecision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Whole seconds until the window resets, rounded up. Useful for `Retry-After`.
    pub fn retry_after(&self, now: DateTime<Utc>) -> Duration {
        let millis = (self.reset_at - now).num_milliseconds().max(0);
        let secs = (millis + 999) / 1000;
        Duration::from_secs(u64::try_from(secs).unwrap_or(0))
    }
}

/// Per-identity, per-operation request throttle.
///
/// Clones share the same windows, limits, and sink. Construct one per process
/// and hand clones to request handlers.
#[derive(Clone)]
pub struct RequestThrottle {
    store: Arc<dyn WindowStore>,
    limits: Arc<ArcSwap<ThrottleLimits>>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn TelemetrySink>,
}

impl fmt::Debug for RequestThrottle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestThrottle")
            .field("store", &self.store)
            .field("limits", &self.limits.load())
            .field("clock", &self.clock)
            .finish()
    }
}

impl RequestThrottle {
    /// Create a throttle backed by an in-process store.
    pub fn new(limits: ThrottleLimits) -> Self {
        Self {
            store: Arc::new(InMemoryWindowStore::new()),
            limits: Arc::new(ArcSwap::from_pointee(limits)),
            clock: Arc::new(SystemClock),
            sink: Arc::new(NullSink),
        }
    }

    /// Replace the window store.
    pub fn with_store<W: WindowStore + 'static>(mut self, store: W) -> Self {
        self.store = Arc::new(store);
        self
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(self, clock: C) -> Self {
        self.with_shared_clock(Arc::new(clock))
    }

    pub(crate) fn with_shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Send throttle events to `sink`.
    pub fn with_sink<S: TelemetrySink + 'static>(self, sink: S) -> Self {
        self.with_shared_sink(Arc::new(sink))
    }

    pub(crate) fn with_shared_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Limits currently in force.
    pub fn limits(&self) -> Arc<ThrottleLimits> {
        self.limits.load_full()
    }

    /// Swap in new limits. Existing windows keep their reset instants; the new
    /// `max` applies from the next check.
    pub fn update_limits(&self, limits: ThrottleLimits) {
        self.limits.store(Arc::new(limits));
    }

    /// Check against the configured limit for `operation`.
    pub fn check(&self, identity: &str, operation: OperationClass) -> ThrottleDecision {
        let WindowLimit { window_ms, max } = self.limits.load().get(operation);
        self.check_limit(identity, operation, Duration::from_millis(window_ms), max)
    }

    /// Count one request for `(identity, operation)` against an explicit limit.
    pub fn check_limit(
        &self,
        identity: &str,
        operation: OperationClass,
        window: Duration,
        max: u32,
    ) -> ThrottleDecision {
        let now = self.clock.now_millis();
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let key = WindowKey::new(identity, operation);

        // Optimistic locking loop
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.store.load(&key);
            let next = match current {
                Some(window) if window.is_active(now) => {
                    if window.count >= max {
                        return self.deny(&key, window.reset_at_millis, now);
                    }
                    RateWindow { count: window.count + 1, ..window }
                }
                _ => RateWindow { count: 1, reset_at_millis: now.saturating_add(window_ms) },
            };

            if self.store.compare_and_store(&key, current, next) {
                let remaining = max.saturating_sub(next.count);
                self.sink.record(
                    ThrottleEvent::Allowed { identity: key.identity.clone(), operation, remaining }
                        .into(),
                );
                return ThrottleDecision {
                    allowed: true,
                    remaining,
                    reset_at: millis_to_datetime(next.reset_at_millis),
                };
            }
            // Race detected, loop again
        }

        tracing::warn!(
            target: "scenario_governor::throttle",
            identity = %key.identity,
            operation = %operation,
            "window store contention; denying briefly"
        );
        self.deny(&key, now.saturating_add(CONTENTION_BACKOFF_MILLIS), now)
    }

    /// Delete expired windows now. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let removed = self.store.purge_expired(self.clock.now_millis());
        let live = self.store.len();
        if removed > 0 {
            tracing::debug!(target: "scenario_governor::throttle", removed, live, "swept expired windows");
        } else {
            tracing::trace!(target: "scenario_governor::throttle", live, "sweep found nothing to remove");
        }
        self.sink.record(ThrottleEvent::Swept { removed, live }.into());
        removed
    }

    /// Number of windows currently held.
    pub fn tracked_windows(&self) -> usize {
        self.store.len()
    }

    /// Run [`sweep`](Self::sweep) every `every` on the current Tokio runtime.
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn_sweeper(&self, every: Duration) -> SweeperHandle {
        SweeperHandle::spawn(self.clone(), every)
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn deny(&self, key: &WindowKey, reset_at_millis: i64, now: i64) -> ThrottleDecision {
        let decision = ThrottleDecision {
            allowed: false,
            remaining: 0,
            reset_at: millis_to_datetime(reset_at_millis),
        };
        let retry_after = decision.retry_after(millis_to_datetime(now));
        tracing::debug!(
            target: "scenario_governor::throttle",
            identity = %key.identity,
            operation = %key.operation,
            retry_after_secs = retry_after.as_secs(),
            "request throttled"
        );
        self.sink.record(
            ThrottleEvent::Denied {
                identity: key.identity.clone(),
                operation: key.operation,
                retry_after,
            }
            .into(),
        );
        decision
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or(DateTime::<Utc>::MAX_UTC)
}
