//! Metrics poller tests against a mock backend, plus the uptime formatter.

use std::sync::atomic::Ordering;
use std::time::Duration;

use httpmock::Method::GET;
use httpmock::MockServer;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::sleep;

use super::{format_uptime, Metrics, MetricsPoller, PollerConfig};

fn metrics_body(total_events: u64) -> serde_json::Value {
    json!({
        "success": true,
        "data": {
            "total_events": total_events,
            "agent_runs": 2,
            "llm_calls": 3,
            "tool_calls": 4,
            "retriever_runs": 0,
            "errors": 1,
            "subscribers": 1,
            "buffer_size": 10,
            "uptime_seconds": 3725,
        },
    })
}

#[tokio::test]
async fn poll_replaces_snapshot_wholesale() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/metrics");
            then.status(200).json_body(metrics_body(42));
        })
        .await;

    let poller = MetricsPoller::new(PollerConfig::new(server.base_url()));
    poller.start();
    sleep(Duration::from_millis(100)).await;

    let snapshot = poller.snapshot();
    assert_eq!(snapshot.total_events, 42);
    assert_eq!(snapshot.uptime_seconds, 3725);
    poller.stop();
}

#[tokio::test]
async fn failures_keep_previous_snapshot() {
    let server = MockServer::start_async().await;

    // First a good response, then the endpoint degrades.
    let ok = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/metrics");
            then.status(200).json_body(metrics_body(7));
        })
        .await;

    let mut config = PollerConfig::new(server.base_url());
    config.interval = Duration::from_millis(50);
    let poller = MetricsPoller::new(config);
    poller.start();
    sleep(Duration::from_millis(80)).await;
    assert_eq!(poller.snapshot().total_events, 7);

    ok.delete_async().await;
    for body in [
        json!({ "success": false, "error": "buffer unavailable" }),
        json!("not an envelope"),
    ] {
        let bad = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/metrics");
                then.status(200).json_body(body.clone());
            })
            .await;
        sleep(Duration::from_millis(120)).await;
        assert_eq!(poller.snapshot().total_events, 7, "snapshot must survive {body}");
        bad.delete_async().await;
    }

    let server_error = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/metrics");
            then.status(500);
        })
        .await;
    sleep(Duration::from_millis(120)).await;
    assert_eq!(poller.snapshot().total_events, 7);
    assert!(server_error.hits_async().await >= 1);

    poller.stop();
}

#[tokio::test]
async fn slow_fetches_skip_ticks_instead_of_stacking() {
    let server = MockServer::start_async().await;
    let slow = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/metrics");
            then.status(200)
                .delay(Duration::from_millis(200))
                .json_body(metrics_body(1));
        })
        .await;

    let mut config = PollerConfig::new(server.base_url());
    config.interval = Duration::from_millis(50);
    let poller = MetricsPoller::new(config);
    poller.start();

    // Four intervals elapse while each fetch takes 200ms; without the skip
    // behavior this would issue ~9 requests.
    sleep(Duration::from_millis(450)).await;
    poller.stop();

    assert!(
        slow.hits_async().await <= 3,
        "overlapping ticks must be skipped"
    );
}

#[tokio::test]
async fn response_arriving_after_teardown_is_discarded() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/metrics");
            then.status(200)
                .delay(Duration::from_millis(200))
                .json_body(metrics_body(99));
        })
        .await;

    let poller = MetricsPoller::new(PollerConfig::new(server.base_url()));
    poller.start();
    sleep(Duration::from_millis(50)).await;

    // Teardown while the first fetch is still in flight.
    poller.stop();
    sleep(Duration::from_millis(300)).await;

    assert_eq!(poller.snapshot(), Metrics::default());
}

#[tokio::test]
async fn stale_sequence_numbers_are_discarded() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/metrics");
            then.status(200).json_body(metrics_body(5));
        })
        .await;

    let poller = MetricsPoller::new(PollerConfig::new(server.base_url()));
    let issued = poller.inner.seq.fetch_add(1, Ordering::SeqCst) + 1;

    // A newer fetch gets issued while ours is in flight.
    poller.inner.seq.fetch_add(1, Ordering::SeqCst);
    poller.inner.poll_once(issued).await;
    assert_eq!(poller.snapshot(), Metrics::default());

    // With the tag still current the response applies.
    let current = poller.inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
    poller.inner.poll_once(current).await;
    assert_eq!(poller.snapshot().total_events, 5);
}

#[test]
fn uptime_formatting() {
    assert_eq!(format_uptime(3725.9), "01:02:05");
    assert_eq!(format_uptime(0.0), "00:00:00");
    assert_eq!(format_uptime(90000.0), "25:00:00");
    assert_eq!(format_uptime(59.999), "00:00:59");
    assert_eq!(format_uptime(-5.0), "00:00:00");
}
