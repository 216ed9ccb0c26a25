use scenario_governor::clock::ManualClock;
use scenario_governor::config::ThrottleLimits;
use scenario_governor::telemetry::{GovernanceEvent, LogSink, StreamingSink, ThrottleEvent};
use scenario_governor::throttle::{OperationClass, RequestThrottle};
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn overdriven_stream_reports_lag_not_backpressure() {
    let sink = StreamingSink::new(8);
    let mut rx = sink.subscribe();
    let throttle = RequestThrottle::new(ThrottleLimits::default())
        .with_clock(ManualClock::at_epoch())
        .with_sink(sink.clone());

    // Recording never blocks the request path, even with a slow subscriber.
    for i in 0..64 {
        throttle.check_limit(&format!("u{i}"), OperationClass::Guidance, Duration::from_secs(60), 5);
    }

    let mut lagged = false;
    let mut received = 0;
    loop {
        match rx.try_recv() {
            Ok(event) => {
                assert!(matches!(event, GovernanceEvent::Throttle(ThrottleEvent::Allowed { .. })));
                received += 1;
            }
            Err(tokio::sync::broadcast::error::TryRecvError::Lagged(_)) => lagged = true,
            Err(_) => break,
        }
    }
    assert!(lagged);
    assert_eq!(received, 8);
    assert_eq!(sink.dropped_count(), 0, "drops only count sends with no subscriber");
}

#[test]
fn log_sink_accepts_events_without_subscriber() {
    let throttle = RequestThrottle::new(ThrottleLimits::default()).with_sink(LogSink);
    assert!(throttle.check("u", OperationClass::Generation).is_allowed());
}
