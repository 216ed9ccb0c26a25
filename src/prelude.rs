//! Convenient re-exports for common Scenario Governor types.
pub use crate::{
    clock::{Clock, ManualClock, SystemClock},
    config::{ConfigError, GovernorConfig, QuotaConfig, ThrottleConfig, ThrottleLimits, WindowLimit},
    error::GateError,
    gate::{Generated, ScenarioGate},
    quota::{InMemoryQuotaStore, QuotaDecision, QuotaLedger, QuotaStore, Tier, UserQuota},
    request::ScenarioRequest,
    selector::{Catalog, DiseaseEntry, Rarity, RaritySelection, RecentHistory, Selection},
    telemetry::{GovernanceEvent, LogSink, MemorySink, NullSink, TelemetrySink},
    throttle::{OperationClass, RequestThrottle, ThrottleLayer, ThrottleTarget},
};
