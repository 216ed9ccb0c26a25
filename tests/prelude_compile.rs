//! Compile-time prelude coverage test.
use scenario_governor::prelude::*;
use std::convert::Infallible;
use tower::service_fn;
use tower_layer::Layer;
use tower_service::Service;

struct Guidance(&'static str);

impl ThrottleTarget for Guidance {
    fn identity(&self) -> &str {
        self.0
    }
    fn operation(&self) -> OperationClass {
        OperationClass::Guidance
    }
}

#[tokio::test]
async fn prelude_reexports_core_types() {
    let config = GovernorConfig::default();
    let throttle = RequestThrottle::new(config.throttle.limits.clone()).with_sink(NullSink);
    let mut svc = ThrottleLayer::new(throttle)
        .layer(service_fn(|_req: Guidance| async { Ok::<_, Infallible>(()) }));
    svc.call(Guidance("u")).await.expect("service call failed");

    let gate = ScenarioGate::new(&config, InMemoryQuotaStore::new(), Catalog::new())
        .expect("default config is valid")
        .with_sink(MemorySink::new());
    let decision: QuotaDecision = gate.check_quota("nobody").await;
    assert!(!decision.is_allowed());
    let _: Option<Tier> = decision.tier;
}
