use scenario_governor::clock::{Clock, ManualClock};
use scenario_governor::config::{ThrottleLimits, WindowLimit};
use scenario_governor::telemetry::{GovernanceEvent, MemorySink, ThrottleEvent};
use scenario_governor::throttle::{
    OperationClass, RequestThrottle, ThrottleLayer, ThrottleTarget,
};
use std::convert::Infallible;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::{service_fn, ServiceBuilder, ServiceExt};

const FIVE_MINUTES: Duration = Duration::from_millis(300_000);

#[test]
fn generation_budget_counts_down_then_denies() {
    let throttle = RequestThrottle::new(ThrottleLimits::default()).with_clock(ManualClock::at_epoch());

    let remaining: Vec<u32> = (0..10)
        .map(|_| {
            let d = throttle.check_limit("user-1", OperationClass::Generation, FIVE_MINUTES, 10);
            assert!(d.allowed);
            d.remaining
        })
        .collect();
    assert_eq!(remaining, vec![9, 8, 7, 6, 5, 4, 3, 2, 1, 0]);

    let eleventh = throttle.check_limit("user-1", OperationClass::Generation, FIVE_MINUTES, 10);
    assert!(!eleventh.allowed);
    assert_eq!(eleventh.remaining, 0);
}

#[test]
fn next_call_after_window_elapses_starts_over() {
    let clock = ManualClock::at_epoch();
    let throttle = RequestThrottle::new(ThrottleLimits::default()).with_clock(clock.clone());
    for _ in 0..11 {
        throttle.check_limit("user-1", OperationClass::Generation, FIVE_MINUTES, 10);
    }

    clock.advance(FIVE_MINUTES);
    let d = throttle.check_limit("user-1", OperationClass::Generation, FIVE_MINUTES, 10);
    assert!(d.allowed);
    assert_eq!(d.remaining, 9);
    assert_eq!(d.reset_at, clock.now() + chrono::Duration::milliseconds(300_000));
}

#[test]
fn operation_classes_and_identities_never_share_counters() {
    let limits = OperationClass::ALL.iter().fold(ThrottleLimits::default(), |limits, op| {
        limits.with(*op, WindowLimit { window_ms: 60_000, max: 1 })
    });
    let throttle = RequestThrottle::new(limits).with_clock(ManualClock::at_epoch());

    for op in OperationClass::ALL {
        assert!(throttle.check("alice", op).allowed, "{op} should have its own budget");
    }
    for op in OperationClass::ALL {
        assert!(!throttle.check("alice", op).allowed);
        assert!(throttle.check("bob", op).allowed);
    }
    assert_eq!(throttle.tracked_windows(), 2 * OperationClass::ALL.len());
}

#[test]
fn concurrent_checks_are_exact_in_process() {
    let throttle = RequestThrottle::new(ThrottleLimits::default()).with_clock(ManualClock::at_epoch());
    let allowed = Arc::new(AtomicU32::new(0));

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let throttle = throttle.clone();
            let allowed = allowed.clone();
            scope.spawn(move || {
                for _ in 0..25 {
                    if throttle.check_limit("shared", OperationClass::ChatReply, FIVE_MINUTES, 50).allowed {
                        allowed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    assert_eq!(allowed.load(Ordering::Relaxed), 50);
}

#[test]
fn decisions_are_reported_to_the_sink() {
    let sink = MemorySink::new();
    let throttle = RequestThrottle::new(ThrottleLimits::default())
        .with_clock(ManualClock::at_epoch())
        .with_sink(sink.clone());

    throttle.check_limit("u", OperationClass::PaymentOrder, Duration::from_secs(90), 1);
    throttle.check_limit("u", OperationClass::PaymentOrder, Duration::from_secs(90), 1);

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        GovernanceEvent::Throttle(ThrottleEvent::Allowed { remaining: 0, .. })
    ));
    assert_eq!(
        events[1],
        GovernanceEvent::Throttle(ThrottleEvent::Denied {
            identity: "u".into(),
            operation: OperationClass::PaymentOrder,
            retry_after: Duration::from_secs(90),
        })
    );
}

#[tokio::test(start_paused = true)]
async fn sweeper_runs_without_traffic_and_stops_on_shutdown() {
    let clock = ManualClock::at_epoch();
    let throttle = RequestThrottle::new(ThrottleLimits::default()).with_clock(clock.clone());
    throttle.check_limit("short", OperationClass::Guidance, Duration::from_secs(5), 3);
    throttle.check_limit("long", OperationClass::Guidance, Duration::from_secs(600), 3);

    let sweeper = throttle.spawn_sweeper(Duration::from_secs(60));
    clock.advance(Duration::from_secs(10));
    assert_eq!(throttle.tracked_windows(), 2, "nothing sweeps before the first tick");

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(throttle.tracked_windows(), 1);

    sweeper.shutdown().await;
    clock.advance(Duration::from_secs(3_600));
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(throttle.tracked_windows(), 1, "stopped sweeper must not run");
}

struct ChatRequest {
    user: &'static str,
}

impl ThrottleTarget for ChatRequest {
    fn identity(&self) -> &str {
        self.user
    }
    fn operation(&self) -> OperationClass {
        OperationClass::ChatReply
    }
}

#[tokio::test]
async fn layer_composes_with_service_builder() {
    let limits = ThrottleLimits::default()
        .with(OperationClass::ChatReply, WindowLimit { window_ms: 60_000, max: 2 });
    let throttle = RequestThrottle::new(limits);
    let calls = Arc::new(AtomicU32::new(0));

    let svc = {
        let calls = calls.clone();
        ServiceBuilder::new().layer(ThrottleLayer::new(throttle.clone())).service(service_fn(
            move |req: ChatRequest| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(format!("reply for {}", req.user))
                }
            },
        ))
    };

    assert!(svc.clone().oneshot(ChatRequest { user: "u" }).await.is_ok());
    assert!(svc.clone().oneshot(ChatRequest { user: "u" }).await.is_ok());
    let err = svc.clone().oneshot(ChatRequest { user: "u" }).await.unwrap_err();
    assert!(err.is_throttled());
    assert!(err.retry_after().unwrap() <= Duration::from_secs(60));
    assert_eq!(calls.load(Ordering::SeqCst), 2, "rejected requests never reach the service");
}
