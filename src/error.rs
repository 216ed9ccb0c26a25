//! Error type for the admission pipeline.
//!
//! Component errors live next to their components ([`QuotaError`],
//! [`SelectionError`], [`ConfigError`](crate::config::ConfigError)); this module
//! holds the unified error returned by the gate and the throttle middleware.
use crate::quota::{QuotaError, Tier};
use crate::selector::SelectionError;
use crate::throttle::OperationClass;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Unified error for every way a gated request can be refused or fail.
///
/// `E` is the error type of the guarded operation (the generation call, or the
/// inner service behind [`ThrottleLayer`](crate::throttle::ThrottleLayer)).
#[derive(Debug, thiserror::Error)]
pub enum GateError<E> {
    /// The caller exceeded the request window for this operation class.
    #[error("{operation} throttled; retry after {}s", retry_after.as_secs())]
    Throttled { operation: OperationClass, retry_after: Duration, reset_at: DateTime<Utc> },
    /// The user has no generations left for their tier's accounting period.
    #[error("{tier} generation quota exhausted (resets at {reset_at})")]
    QuotaExhausted { tier: Tier, reset_at: DateTime<Utc> },
    /// Quota state could not be read, so the request was refused.
    #[error("quota state for user '{user_id}' is unavailable; refusing generation")]
    QuotaUnavailable { user_id: String },
    /// The catalog cannot supply a scenario (a data-loading defect).
    #[error(transparent)]
    Selection(#[from] SelectionError),
    /// The generation call exceeded its deadline; nothing was charged.
    #[error("generation timed out after {elapsed:?} (limit: {timeout:?})")]
    Timeout { elapsed: Duration, timeout: Duration },
    /// Generation succeeded but the charge could not be recorded.
    #[error("generation succeeded but could not be recorded: {0}")]
    Commit(#[source] QuotaError),
    /// The guarded operation failed.
    #[error("{0}")]
    Inner(#[source] E),
}

impl<E> GateError<E> {
    /// Check if this error is a throttle rejection
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }
    /// Check if this error is a quota rejection (exhausted or unreadable)
    pub fn is_quota_denied(&self) -> bool {
        matches!(self, Self::QuotaExhausted { .. } | Self::QuotaUnavailable { .. })
    }
    /// Check if this error is due to timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
    /// Whether the request was refused before any generation was attempted.
    pub fn is_rejection(&self) -> bool {
        self.is_throttled() || self.is_quota_denied()
    }
    /// Retry hint for throttle rejections, in whole seconds.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
    /// Borrow the inner error if present.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}
