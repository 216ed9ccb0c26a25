//! Subscription-tier usage ledger.
//!
//! Semantics:
//! - **Free** users get a lifetime ceiling; `total_used` never replenishes, so the
//!   reported reset instant is simply "now".
//! - **Premium** users get a per-calendar-day ceiling. The daily counter rolls back
//!   to zero the first time the ledger sees the user on a new calendar date (not
//!   24 hours after the last generation); the reset instant is the next midnight.
//! - `commit` charges one generation and is only called after a generation
//!   actually produced a result.
//! - `upgrade` moves a user to premium without forgiving `total_used`.
//!
//! Invariants:
//! - Quota state that cannot be read denies the request (fail-closed). A store
//!   outage never turns into unlimited generation.
//! - [`QuotaLedger::admit`] holds a per-user lock until the returned
//!   [`QuotaPermit`] is committed or dropped, so two concurrent generations for
//!   the same user cannot both take the last slot.
//! - A permit dropped without `commit` (failure, timeout, cancellation) charges
//!   nothing.

use crate::clock::{Clock, SystemClock};
use crate::config::QuotaConfig;
use crate::telemetry::{NullSink, QuotaEvent, TelemetrySink};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

pub mod record;
pub mod store;

pub use record::{RecordError, SubscriptionRecord, UsageStats, UserRecord};
pub use store::{InMemoryQuotaStore, QuotaStore};

/// Idle per-user lock slots are first pruned once the table reaches this size;
/// later prunes wait until it doubles past what was still held.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Subscription level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Premium,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters that reset with the accounting period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodCounters {
    /// Generations on the current calendar day (premium accounting).
    pub today: u32,
}

/// A user's quota state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQuota {
    pub tier: Tier,
    pub is_active: bool,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    /// Lifetime generations charged against the free ceiling.
    pub total_used: u32,
    pub ceiling: u32,
    pub last_generated_at: Option<DateTime<Utc>>,
    pub period_counters: PeriodCounters,
    /// Every committed generation, whatever the tier. Reporting only.
    pub total_generated: u64,
}

impl UserQuota {
    /// Defaults for a newly created account.
    pub fn free(ceiling: u32, now: DateTime<Utc>) -> Self {
        Self {
            tier: Tier::Free,
            is_active: false,
            start_date: now,
            end_date: None,
            total_used: 0,
            ceiling,
            last_generated_at: None,
            period_counters: PeriodCounters::default(),
            total_generated: 0,
        }
    }

    /// Generations left in the current period, as stored (no rollover applied).
    pub fn remaining(&self) -> u32 {
        let used = match self.tier {
            Tier::Free => self.total_used,
            Tier::Premium => self.period_counters.today,
        };
        self.ceiling.saturating_sub(used)
    }

    fn record_generation(&mut self, charged: Tier, now: DateTime<Utc>) {
        match charged {
            Tier::Free => self.total_used = self.total_used.saturating_add(1),
            Tier::Premium => {
                self.period_counters.today = self.period_counters.today.saturating_add(1)
            }
        }
        self.last_generated_at = Some(now);
        self.total_generated = self.total_generated.saturating_add(1);
    }
}

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Next replenishment: midnight for premium, `now` for free (never replenishes).
    pub reset_at: DateTime<Utc>,
    /// Tier the decision was computed under; `None` when state could not be read.
    pub tier: Option<Tier>,
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Whether the denial came from unreadable state rather than an exhausted ceiling.
    pub fn is_unavailable(&self) -> bool {
        self.tier.is_none()
    }

    fn unavailable(now: DateTime<Utc>) -> Self {
        Self { allowed: false, remaining: 0, reset_at: now, tier: None }
    }
}

/// Errors from ledger mutations.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// No record exists for the user.
    #[error("no quota record for user '{user_id}'")]
    UnknownUser { user_id: String },
    /// The backing store failed.
    #[error("quota store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Whether `now` falls on a different calendar date than `last` in `offset`.
pub fn is_new_day(last: DateTime<Utc>, now: DateTime<Utc>, offset: FixedOffset) -> bool {
    last.with_timezone(&offset).date_naive() != now.with_timezone(&offset).date_naive()
}

/// Start of the calendar day after `now` in `offset`.
pub fn next_midnight(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    now.with_timezone(&offset)
        .date_naive()
        .succ_opt()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .and_then(|midnight| offset.from_local_datetime(&midnight).single())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or_else(|| now + chrono::Duration::days(1))
}

#[derive(Debug, Clone, Copy)]
struct QuotaPolicy {
    free_ceiling: u32,
    premium_ceiling: u32,
    premium_term: chrono::Duration,
    offset: FixedOffset,
}

impl From<&QuotaConfig> for QuotaPolicy {
    fn from(config: &QuotaConfig) -> Self {
        Self {
            free_ceiling: config.free_ceiling,
            premium_ceiling: config.premium_ceiling,
            premium_term: config.premium_term(),
            offset: config.offset(),
        }
    }
}

#[derive(Debug)]
struct LockTable {
    slots: HashMap<String, Arc<tokio::sync::Mutex<()>>>,
    prune_at: usize,
}

impl Default for LockTable {
    fn default() -> Self {
        Self { slots: HashMap::new(), prune_at: LOCK_PRUNE_THRESHOLD }
    }
}

#[derive(Debug, Default)]
struct UserLocks {
    table: Mutex<LockTable>,
}

impl UserLocks {
    fn slot(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if table.slots.len() >= table.prune_at {
            // Held guards keep a second reference alive.
            table.slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            table.prune_at = (table.slots.len() * 2).max(LOCK_PRUNE_THRESHOLD);
        }
        table.slots.entry(user_id.to_string()).or_default().clone()
    }

    #[cfg(test)]
    fn table_len(&self) -> (usize, usize) {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        (table.slots.len(), table.prune_at)
    }

    async fn lock(&self, user_id: &str) -> OwnedMutexGuard<()> {
        self.slot(user_id).lock_owned().await
    }

    fn try_lock(&self, user_id: &str) -> Option<OwnedMutexGuard<()>> {
        self.slot(user_id).try_lock_owned().ok()
    }
}

/// Per-user, tier-aware generation accounting.
///
/// Clones share the store, the per-user locks, and the sink.
pub struct QuotaLedger<S> {
    store: Arc<S>,
    policy: QuotaPolicy,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn TelemetrySink>,
    locks: Arc<UserLocks>,
}

impl<S> Clone for QuotaLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            policy: self.policy,
            clock: self.clock.clone(),
            sink: self.sink.clone(),
            locks: self.locks.clone(),
        }
    }
}

impl<S> fmt::Debug for QuotaLedger<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotaLedger")
            .field("policy", &self.policy)
            .field("clock", &self.clock)
            .field("store", &"<store>")
            .finish()
    }
}

impl<S> QuotaLedger<S>
where
    S: QuotaStore + 'static,
{
    pub fn new(store: S, config: &QuotaConfig) -> Self {
        Self {
            store: Arc::new(store),
            policy: QuotaPolicy::from(config),
            clock: Arc::new(SystemClock),
            sink: Arc::new(NullSink),
            locks: Arc::new(UserLocks::default()),
        }
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(self, clock: C) -> Self {
        self.with_shared_clock(Arc::new(clock))
    }

    pub(crate) fn with_shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Send quota events to `sink`.
    pub fn with_sink<T: TelemetrySink + 'static>(self, sink: T) -> Self {
        self.with_shared_sink(Arc::new(sink))
    }

    pub(crate) fn with_shared_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Create the free-tier record for a new account. Existing records are
    /// returned unchanged.
    pub async fn enroll(&self, user_id: &str) -> Result<UserQuota, QuotaError> {
        let _guard = self.locks.lock(user_id).await;
        if let Some(existing) = self.store.load(user_id).await.map_err(store_error)? {
            return Ok(existing);
        }
        let quota = UserQuota::free(self.policy.free_ceiling, self.clock.now());
        self.save(user_id, &quota).await?;
        info!(target: "scenario_governor::quota", user_id, "enrolled on free tier");
        Ok(quota)
    }

    /// Current quota state with rollover and lapse applied, without persisting.
    pub async fn usage(&self, user_id: &str) -> Result<UserQuota, QuotaError> {
        let mut quota = self.load(user_id).await?;
        self.refresh(user_id, &mut quota, self.clock.now(), false);
        Ok(quota)
    }

    /// Whether `user_id` may start a generation now.
    ///
    /// Never fails: unreadable state yields a denial. A premium rollover is
    /// persisted when no generation for the user is in flight.
    pub async fn can_generate(&self, user_id: &str) -> QuotaDecision {
        let guard = self.locks.try_lock(user_id);
        let now = self.clock.now();
        let mut quota = match self.load(user_id).await {
            Ok(quota) => quota,
            Err(err) => return self.unavailable(user_id, &err, now),
        };

        if self.refresh(user_id, &mut quota, now, guard.is_some()) && guard.is_some() {
            if let Err(err) = self.save(user_id, &quota).await {
                warn!(target: "scenario_governor::quota", user_id, error = %err, "failed to persist rollover");
            }
        }

        self.decide(user_id, &quota, now)
    }

    /// Check quota and, if allowed, hold the user's slot until the returned
    /// permit is committed or dropped.
    ///
    /// Denials are returned as the `Err` decision.
    pub async fn admit(&self, user_id: &str) -> Result<QuotaPermit<S>, QuotaDecision> {
        let guard = self.locks.lock(user_id).await;
        let now = self.clock.now();
        let mut quota = match self.load(user_id).await {
            Ok(quota) => quota,
            Err(err) => return Err(self.unavailable(user_id, &err, now)),
        };

        if self.refresh(user_id, &mut quota, now, true) {
            if let Err(err) = self.save(user_id, &quota).await {
                warn!(target: "scenario_governor::quota", user_id, error = %err, "failed to persist rollover");
            }
        }

        let decision = self.decide(user_id, &quota, now);
        if !decision.allowed {
            return Err(decision);
        }
        Ok(QuotaPermit {
            ledger: self.clone(),
            user_id: user_id.to_string(),
            decision,
            _guard: guard,
        })
    }

    /// Charge one successful generation to `user_id`.
    pub async fn commit(&self, user_id: &str) -> Result<UserQuota, QuotaError> {
        let _guard = self.locks.lock(user_id).await;
        self.commit_locked(user_id, None).await
    }

    /// Move `user_id` to the premium tier for one term, keeping `total_used`.
    pub async fn upgrade(&self, user_id: &str) -> Result<UserQuota, QuotaError> {
        let _guard = self.locks.lock(user_id).await;
        let now = self.clock.now();
        let mut quota = self.load(user_id).await?;

        quota.tier = Tier::Premium;
        quota.start_date = now;
        quota.end_date = Some(now + self.policy.premium_term);
        quota.is_active = true;
        quota.ceiling = self.policy.premium_ceiling;

        self.save(user_id, &quota).await?;
        info!(
            target: "scenario_governor::quota",
            user_id,
            total_used = quota.total_used,
            end_date = ?quota.end_date,
            "upgraded to premium"
        );
        self.sink.record(
            QuotaEvent::Upgraded { user_id: user_id.to_string(), total_used: quota.total_used }
                .into(),
        );
        Ok(quota)
    }

    /// `admitted` is the tier a permit was granted under; it pays even if the
    /// subscription lapsed while the generation ran.
    async fn commit_locked(
        &self,
        user_id: &str,
        admitted: Option<Tier>,
    ) -> Result<UserQuota, QuotaError> {
        let now = self.clock.now();
        let mut quota = self.load(user_id).await?;
        self.refresh(user_id, &mut quota, now, true);
        quota.record_generation(admitted.unwrap_or(quota.tier), now);
        self.save(user_id, &quota).await?;

        debug!(
            target: "scenario_governor::quota",
            user_id,
            tier = %quota.tier,
            charged = %admitted.unwrap_or(quota.tier),
            remaining = quota.remaining(),
            "generation committed"
        );
        self.sink.record(
            QuotaEvent::Committed {
                user_id: user_id.to_string(),
                tier: quota.tier,
                total_generated: quota.total_generated,
            }
            .into(),
        );
        Ok(quota)
    }

    /// Apply subscription lapse and the premium day rollover. Returns whether
    /// anything changed. Events are only emitted for changes that will be saved.
    fn refresh(&self, user_id: &str, quota: &mut UserQuota, now: DateTime<Utc>, report: bool) -> bool {
        let mut changed = false;

        if quota.tier == Tier::Premium
            && (!quota.is_active || quota.end_date.map_or(true, |end| end <= now))
        {
            quota.tier = Tier::Free;
            quota.is_active = false;
            quota.ceiling = self.policy.free_ceiling;
            changed = true;
            if report {
                info!(target: "scenario_governor::quota", user_id, "premium subscription lapsed");
                self.sink.record(QuotaEvent::Lapsed { user_id: user_id.to_string() }.into());
            }
        }

        if quota.tier == Tier::Premium {
            let new_day = quota
                .last_generated_at
                .map_or(true, |last| is_new_day(last, now, self.policy.offset));
            if new_day && quota.period_counters.today != 0 {
                let previous_today = quota.period_counters.today;
                quota.period_counters.today = 0;
                changed = true;
                if report {
                    debug!(target: "scenario_governor::quota", user_id, previous_today, "daily counter rolled over");
                    self.sink.record(
                        QuotaEvent::RolledOver { user_id: user_id.to_string(), previous_today }
                            .into(),
                    );
                }
            }
        }

        changed
    }

    fn decide(&self, user_id: &str, quota: &UserQuota, now: DateTime<Utc>) -> QuotaDecision {
        let remaining = quota.remaining();
        let reset_at = match quota.tier {
            Tier::Free => now,
            Tier::Premium => next_midnight(now, self.policy.offset),
        };
        let decision =
            QuotaDecision { allowed: remaining > 0, remaining, reset_at, tier: Some(quota.tier) };
        if !decision.allowed {
            debug!(target: "scenario_governor::quota", user_id, tier = %quota.tier, "generation quota exhausted");
            self.sink.record(QuotaEvent::Denied { user_id: user_id.to_string(), tier: quota.tier }.into());
        }
        decision
    }

    fn unavailable(&self, user_id: &str, err: &QuotaError, now: DateTime<Utc>) -> QuotaDecision {
        warn!(target: "scenario_governor::quota", user_id, error = %err, "quota state unreadable; denying");
        self.sink.record(QuotaEvent::Unavailable { user_id: user_id.to_string() }.into());
        QuotaDecision::unavailable(now)
    }

    async fn load(&self, user_id: &str) -> Result<UserQuota, QuotaError> {
        self.store
            .load(user_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| QuotaError::UnknownUser { user_id: user_id.to_string() })
    }

    async fn save(&self, user_id: &str, quota: &UserQuota) -> Result<(), QuotaError> {
        self.store.save(user_id, quota).await.map_err(store_error)
    }
}

fn store_error<E: std::error::Error + Send + Sync + 'static>(err: E) -> QuotaError {
    QuotaError::Store(Box::new(err))
}

/// A held generation slot for one user.
///
/// While the permit lives, no other admission, commit, or upgrade for the same
/// user can proceed. Commit it after the generation succeeds; drop it otherwise.
#[must_use = "dropping a permit releases the slot without charging it"]
pub struct QuotaPermit<S> {
    ledger: QuotaLedger<S>,
    user_id: String,
    decision: QuotaDecision,
    _guard: OwnedMutexGuard<()>,
}

impl<S> fmt::Debug for QuotaPermit<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotaPermit")
            .field("user_id", &self.user_id)
            .field("decision", &self.decision)
            .finish()
    }
}

impl<S> QuotaPermit<S>
where
    S: QuotaStore + 'static,
{
    /// The admission decision this permit was granted under.
    pub fn decision(&self) -> &QuotaDecision {
        &self.decision
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Charge the generation and release the slot.
    pub async fn commit(self) -> Result<UserQuota, QuotaError> {
        self.ledger.commit_locked(&self.user_id, self.decision.tier).await
    }
}
