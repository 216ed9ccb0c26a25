#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Scenario Governor
//!
//! Admission control and subject selection for an expensive, externally billed
//! scenario generator.
//!
//! ## Components
//!
//! - **Request throttle**: fixed windows per caller and operation class, swept
//!   in the background, with a Tower layer for services
//! - **Quota ledger**: lifetime ceiling on the free tier, per-day ceiling on
//!   premium, fail-closed when state cannot be read
//! - **Scenario selector**: weighted rarity draw with recency avoidance and
//!   widen-on-empty fallbacks
//! - **Scenario gate**: the fixed pipeline that composes all three around a
//!   generation call, charging quota only for results actually produced
//!
//! ## Quick Start
//!
//! ```rust
//! use scenario_governor::prelude::*;
//! use std::convert::Infallible;
//!
//! #[tokio::main]
//! async fn main() {
//!     let catalog = Catalog::new().with_domain(
//!         "Cardiology",
//!         [DiseaseEntry::new("Myocardial Infarction", Rarity::Common)],
//!     );
//!     let gate =
//!         ScenarioGate::new(&GovernorConfig::default(), InMemoryQuotaStore::new(), catalog)
//!             .unwrap();
//!     gate.ledger().enroll("user-1").await.unwrap();
//!
//!     let mut history = RecentHistory::new();
//!     let request = ScenarioRequest::from_json_str(r#"{"domain": "General"}"#).unwrap();
//!     let done = gate
//!         .generate("user-1", &request, &mut history, |selection| async move {
//!             Ok::<_, Infallible>(format!("A patient presents with {}", selection.disease_name))
//!         })
//!         .await
//!         .unwrap();
//!     assert_eq!(done.quota.total_used, 1);
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod prelude;
pub mod quota;
pub mod request;
pub mod selector;
pub mod telemetry;
pub mod throttle;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, GovernorConfig, QuotaConfig, ThrottleConfig, ThrottleLimits, WindowLimit};
pub use error::GateError;
pub use gate::{Generated, ScenarioGate};
pub use quota::{
    InMemoryQuotaStore, QuotaDecision, QuotaError, QuotaLedger, QuotaPermit, QuotaStore, Tier,
    UserQuota,
};
pub use request::{RequestError, ScenarioRequest};
pub use selector::{
    Catalog, DiseaseEntry, Rarity, RaritySelection, RecentHistory, ScenarioSelector, Selection,
    SelectionError,
};
pub use throttle::{
    OperationClass, RequestThrottle, SweeperHandle, ThrottleDecision, ThrottleLayer,
    ThrottleTarget,
};
