//! The admission pipeline around scenario generation.
//!
//! For each request [`ScenarioGate::generate`] runs, in order:
//!
//! 1. the generation throttle for the caller,
//! 2. quota admission (holding the user's slot),
//! 3. scenario selection,
//! 4. the generation call under a deadline,
//! 5. the quota charge, only if the call returned a result.
//!
//! A throttle slot is spent as soon as step 1 passes, even if quota then
//! refuses. Quota is never spent unless step 4 succeeds: failure, timeout, and
//! dropping the `generate` future all release the slot uncharged.

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, GovernorConfig};
use crate::error::GateError;
use crate::quota::{QuotaDecision, QuotaLedger, QuotaStore, UserQuota};
use crate::request::ScenarioRequest;
use crate::selector::{Catalog, RecentHistory, ScenarioSelector, Selection};
use crate::telemetry::{GenerationEvent, NullSink, SelectionEvent, TelemetrySink};
use crate::throttle::{OperationClass, RequestThrottle, SweeperHandle, ThrottleDecision};
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Result of a generation that passed every check and was charged.
#[derive(Debug, Clone)]
pub struct Generated<T> {
    pub selection: Selection,
    pub output: T,
    /// Quota state after the charge.
    pub quota: UserQuota,
}

/// Throttle, ledger and selector wired together with one clock and one sink.
///
/// Build once per process and clone into handlers.
pub struct ScenarioGate<S> {
    throttle: RequestThrottle,
    ledger: QuotaLedger<S>,
    selector: ScenarioSelector,
    generation_timeout: Duration,
    sweep_interval: Duration,
    sink: Arc<dyn TelemetrySink>,
}

impl<S> Clone for ScenarioGate<S> {
    fn clone(&self) -> Self {
        Self {
            throttle: self.throttle.clone(),
            ledger: self.ledger.clone(),
            selector: self.selector.clone(),
            generation_timeout: self.generation_timeout,
            sweep_interval: self.sweep_interval,
            sink: self.sink.clone(),
        }
    }
}

impl<S> fmt::Debug for ScenarioGate<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioGate")
            .field("throttle", &self.throttle)
            .field("ledger", &self.ledger)
            .field("domains", &self.selector.catalog().len())
            .field("generation_timeout", &self.generation_timeout)
            .finish()
    }
}

impl<S> ScenarioGate<S>
where
    S: QuotaStore + 'static,
{
    /// Validate `config` and build the pipeline.
    pub fn new(config: &GovernorConfig, store: S, catalog: Catalog) -> Result<Self, ConfigError> {
        config.validate()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let sink: Arc<dyn TelemetrySink> = Arc::new(NullSink);
        Ok(Self {
            throttle: RequestThrottle::new(config.throttle.limits.clone())
                .with_shared_clock(clock.clone())
                .with_shared_sink(sink.clone()),
            ledger: QuotaLedger::new(store, &config.quota)
                .with_shared_clock(clock)
                .with_shared_sink(sink.clone()),
            selector: ScenarioSelector::new(catalog),
            generation_timeout: config.generation_timeout(),
            sweep_interval: config.throttle.sweep_interval(),
            sink,
        })
    }

    /// Use `clock` for both throttle windows and quota calendar dates.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(clock);
        self.throttle = self.throttle.with_shared_clock(clock.clone());
        self.ledger = self.ledger.with_shared_clock(clock);
        self
    }

    /// Send every component's events to `sink`.
    pub fn with_sink<T: TelemetrySink + 'static>(mut self, sink: T) -> Self {
        let sink: Arc<dyn TelemetrySink> = Arc::new(sink);
        self.throttle = self.throttle.with_shared_sink(sink.clone());
        self.ledger = self.ledger.with_shared_sink(sink.clone());
        self.sink = sink;
        self
    }

    pub fn throttle(&self) -> &RequestThrottle {
        &self.throttle
    }

    pub fn ledger(&self) -> &QuotaLedger<S> {
        &self.ledger
    }

    pub fn catalog(&self) -> &Catalog {
        self.selector.catalog()
    }

    pub fn generation_timeout(&self) -> Duration {
        self.generation_timeout
    }

    /// Start sweeping expired throttle windows at the configured interval.
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        self.throttle.spawn_sweeper(self.sweep_interval)
    }

    /// Throttle a non-generation operation (chat reply, report, payment order,
    /// guidance) for `identity`.
    pub fn throttle_operation(
        &self,
        identity: &str,
        operation: OperationClass,
    ) -> Result<ThrottleDecision, GateError<Infallible>> {
        self.throttled(identity, operation)
    }

    /// Current quota standing for `user_id`, without reserving anything.
    pub async fn check_quota(&self, user_id: &str) -> QuotaDecision {
        self.ledger.can_generate(user_id).await
    }

    /// Run one gated generation.
    ///
    /// `generate` receives the chosen [`Selection`] and performs the expensive
    /// call. Its result is returned only after the user's quota has been charged.
    pub async fn generate<T, E, F, Fut>(
        &self,
        user_id: &str,
        request: &ScenarioRequest,
        history: &mut RecentHistory,
        generate: F,
    ) -> Result<Generated<T>, GateError<E>>
    where
        F: FnOnce(Selection) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.throttled(user_id, OperationClass::Generation)?;

        let permit = match self.ledger.admit(user_id).await {
            Ok(permit) => permit,
            Err(decision) => {
                return Err(match decision.tier {
                    Some(tier) => GateError::QuotaExhausted { tier, reset_at: decision.reset_at },
                    None => GateError::QuotaUnavailable { user_id: user_id.to_string() },
                })
            }
        };

        let selection = self.selector.pick(request.domain.as_deref(), request.rarity, history)?;
        self.sink.record(
            SelectionEvent::Picked {
                domain: selection.domain.clone(),
                disease_name: selection.disease_name.clone(),
                rarity: selection.disease_rarity,
            }
            .into(),
        );

        let start = Instant::now();
        let output = match tokio::time::timeout(self.generation_timeout, generate(selection.clone()))
            .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                let duration = start.elapsed();
                debug!(target: "scenario_governor::gate", user_id, ?duration, "generation failed; quota not charged");
                self.sink.record(
                    GenerationEvent::Failed { user_id: user_id.to_string(), duration }.into(),
                );
                return Err(GateError::Inner(err));
            }
            Err(_) => {
                let elapsed = start.elapsed();
                warn!(
                    target: "scenario_governor::gate",
                    user_id,
                    timeout = ?self.generation_timeout,
                    "generation timed out; quota not charged"
                );
                self.sink.record(
                    GenerationEvent::TimedOut {
                        user_id: user_id.to_string(),
                        timeout: self.generation_timeout,
                    }
                    .into(),
                );
                return Err(GateError::Timeout { elapsed, timeout: self.generation_timeout });
            }
        };
        let duration = start.elapsed();

        let quota = permit.commit().await.map_err(|err| {
            error!(target: "scenario_governor::gate", user_id, error = %err, "generation succeeded but charge failed");
            GateError::Commit(err)
        })?;
        self.sink.record(GenerationEvent::Succeeded { user_id: user_id.to_string(), duration }.into());

        Ok(Generated { selection, output, quota })
    }

    fn throttled<E>(
        &self,
        identity: &str,
        operation: OperationClass,
    ) -> Result<ThrottleDecision, GateError<E>> {
        let decision = self.throttle.check(identity, operation);
        if decision.is_allowed() {
            return Ok(decision);
        }
        Err(GateError::Throttled {
            operation,
            retry_after: decision.retry_after(self.throttle.now()),
            reset_at: decision.reset_at,
        })
    }
}
