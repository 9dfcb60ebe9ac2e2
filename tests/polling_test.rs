#![allow(clippy::unwrap_used)]
// Integration tests for `PollingFallbackClient` using wiremock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scribe_live::device::DeviceClient;
use scribe_live::dispatch::Dispatcher;
use scribe_live::event::EventTag;
use scribe_live::poll::{PollOutcome, PollingFallbackClient};
use scribe_live::sink::UpdateSink;
use scribe_live::state::ConnectionState;

const DISCOVERY: &str = "/api/printer-discovery";

// ── Helpers ─────────────────────────────────────────────────────────

struct Setup {
    server: MockServer,
    client: PollingFallbackClient,
    sink: UpdateSink,
    published: Arc<AtomicUsize>,
}

async fn setup() -> Setup {
    let server = MockServer::start().await;
    let device = DeviceClient::new(Url::parse(&server.uri()).unwrap(), Duration::from_secs(2)).unwrap();

    let dispatcher = Dispatcher::new();
    let published = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&published);
    dispatcher.subscribe(EventTag::PrintersUpdated, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let sink = UpdateSink::new(dispatcher, Arc::default());
    let client = PollingFallbackClient::new(device, sink.clone());
    Setup {
        server,
        client,
        sink,
        published,
    }
}

fn printers_body(ids: &[&str]) -> serde_json::Value {
    let printers: Vec<_> = ids
        .iter()
        .map(|id| json!({"printerId": id, "name": format!("Printer {id}"), "status": "online"}))
        .collect();
    json!({ "discovered_printers": printers, "count": ids.len() })
}

fn ids(sink: &UpdateSink) -> Vec<String> {
    sink.printers()
        .snapshot()
        .iter()
        .map(|p| p.printer_id.clone())
        .collect()
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

// ── Conditional requests ────────────────────────────────────────────

#[tokio::test]
async fn test_not_modified_preserves_validator_and_list() {
    let s = setup().await;

    Mock::given(method("GET"))
        .and(path(DISCOVERY))
        .and(header("If-None-Match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .with_priority(1)
        .expect(1)
        .mount(&s.server)
        .await;

    Mock::given(method("GET"))
        .and(path(DISCOVERY))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v1\"")
                .set_body_json(printers_body(&["local", "p2"])),
        )
        .expect(1)
        .mount(&s.server)
        .await;

    assert_eq!(s.client.validator(), None);
    assert_eq!(s.client.poll_once().await.unwrap(), PollOutcome::Updated(2));
    assert_eq!(s.client.validator().as_deref(), Some("\"v1\""));
    assert_eq!(ids(&s.sink), vec!["local", "p2"]);

    assert_eq!(s.client.poll_once().await.unwrap(), PollOutcome::NotModified);
    assert_eq!(s.client.validator().as_deref(), Some("\"v1\""));
    assert_eq!(ids(&s.sink), vec!["local", "p2"]);
    assert_eq!(s.published.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_first_request_has_no_validator() {
    let s = setup().await;

    Mock::given(method("GET"))
        .and(path(DISCOVERY))
        .respond_with(ResponseTemplate::new(200).set_body_json(printers_body(&["p1"])))
        .mount(&s.server)
        .await;

    s.client.poll_once().await.unwrap();

    let requests = s.server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("if-none-match"));
}

#[tokio::test]
async fn test_full_response_replaces_list() {
    let s = setup().await;

    Mock::given(method("GET"))
        .and(path(DISCOVERY))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v1\"")
                .set_body_json(printers_body(&["p1", "p2", "p3"])),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&s.server)
        .await;

    Mock::given(method("GET"))
        .and(path(DISCOVERY))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v2\"")
                .set_body_json(printers_body(&["p3"])),
        )
        .mount(&s.server)
        .await;

    s.client.poll_once().await.unwrap();
    assert_eq!(ids(&s.sink), vec!["p1", "p2", "p3"]);

    s.client.poll_once().await.unwrap();
    assert_eq!(ids(&s.sink), vec!["p3"]);
    assert_eq!(s.client.validator().as_deref(), Some("\"v2\""));
}

#[tokio::test]
async fn test_malformed_body_is_discarded() {
    let s = setup().await;

    Mock::given(method("GET"))
        .and(path(DISCOVERY))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v1\"")
                .set_body_json(printers_body(&["p1"])),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&s.server)
        .await;

    Mock::given(method("GET"))
        .and(path(DISCOVERY))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v2\"")
                .set_body_string("<html>oops</html>"),
        )
        .mount(&s.server)
        .await;

    s.client.poll_once().await.unwrap();
    assert_eq!(s.client.poll_once().await.unwrap(), PollOutcome::Discarded);
    assert_eq!(s.client.validator().as_deref(), Some("\"v1\""));
    assert_eq!(ids(&s.sink), vec!["p1"]);
}

#[tokio::test]
async fn test_response_without_etag_clears_validator() {
    let s = setup().await;

    Mock::given(method("GET"))
        .and(path(DISCOVERY))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"v1\"")
                .set_body_json(printers_body(&["p1"])),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&s.server)
        .await;

    Mock::given(method("GET"))
        .and(path(DISCOVERY))
        .respond_with(ResponseTemplate::new(200).set_body_json(printers_body(&["p1"])))
        .mount(&s.server)
        .await;

    s.client.poll_once().await.unwrap();
    assert!(s.client.validator().is_some());
    s.client.poll_once().await.unwrap();
    assert_eq!(s.client.validator(), None);
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let s = setup().await;

    Mock::given(method("GET"))
        .and(path(DISCOVERY))
        .respond_with(ResponseTemplate::new(500))
        .mount(&s.server)
        .await;

    let result = s.client.poll_once().await;
    assert!(
        matches!(result, Err(scribe_live::error::LiveError::UnexpectedStatus { .. })),
        "expected UnexpectedStatus, got: {result:?}"
    );
}

// ── Interval loop ───────────────────────────────────────────────────

#[tokio::test]
async fn test_interval_polls_immediately_and_repeatedly() {
    let s = setup().await;

    Mock::given(method("GET"))
        .and(path(DISCOVERY))
        .respond_with(ResponseTemplate::new(200).set_body_json(printers_body(&["p1"])))
        .mount(&s.server)
        .await;

    s.client.start(Duration::from_millis(150));
    assert_eq!(s.client.state(), ConnectionState::Open);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(request_count(&s.server).await, 1);
    assert_eq!(ids(&s.sink), vec!["p1"]);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(request_count(&s.server).await >= 3);

    s.client.stop();
}

#[tokio::test]
async fn test_failures_do_not_stop_interval() {
    let s = setup().await;

    Mock::given(method("GET"))
        .and(path(DISCOVERY))
        .respond_with(ResponseTemplate::new(503))
        .mount(&s.server)
        .await;

    s.client.start(Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(450)).await;

    assert!(request_count(&s.server).await >= 3);
    assert_eq!(s.client.state(), ConnectionState::Open);
    assert_eq!(s.published.load(Ordering::SeqCst), 0);

    s.client.stop();
}

#[tokio::test]
async fn test_stop_cancels_future_polls() {
    let s = setup().await;

    Mock::given(method("GET"))
        .and(path(DISCOVERY))
        .respond_with(ResponseTemplate::new(200).set_body_json(printers_body(&["p1"])))
        .mount(&s.server)
        .await;

    s.client.start(Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(250)).await;
    s.client.stop();
    assert_eq!(s.client.state(), ConnectionState::Closed);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let after_stop = request_count(&s.server).await;
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(request_count(&s.server).await, after_stop);
}

#[tokio::test]
async fn test_second_start_replaces_running_loop() {
    let s = setup().await;

    Mock::given(method("GET"))
        .and(path(DISCOVERY))
        .respond_with(ResponseTemplate::new(304))
        .mount(&s.server)
        .await;

    s.client.start(Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(20)).await;
    s.client.start(Duration::from_millis(100));
    tokio::time::sleep(Duration::from_millis(450)).await;
    s.client.stop();

    // One loop: the first loop's request plus ticks at 0..400ms of the second.
    let count = request_count(&s.server).await;
    assert!((4..=7).contains(&count), "expected one loop's worth of requests, got {count}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_subscriber_can_stop_polling_client() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DISCOVERY))
        .respond_with(ResponseTemplate::new(200).set_body_json(printers_body(&["p1"])))
        .mount(&server)
        .await;

    let device = DeviceClient::new(Url::parse(&server.uri()).unwrap(), Duration::from_secs(2)).unwrap();
    let dispatcher = Dispatcher::new();
    let sink = UpdateSink::new(dispatcher.clone(), Arc::default());
    let client = Arc::new(PollingFallbackClient::new(device, sink));

    let weak = Arc::downgrade(&client);
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = std::sync::Mutex::new(Some(tx));
    dispatcher.subscribe(EventTag::PrintersUpdated, move |_| {
        if let Some(client) = weak.upgrade() {
            client.stop();
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(client.state());
            }
        }
    });

    client.start(Duration::from_millis(100));
    let state = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("stop() from a subscriber must return")
        .unwrap();
    assert_eq!(state, ConnectionState::Closed);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let after_stop = request_count(&server).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(request_count(&server).await, after_stop);
    assert_eq!(client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_in_flight_response_after_stop_is_discarded() {
    let s = setup().await;

    Mock::given(method("GET"))
        .and(path(DISCOVERY))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(printers_body(&["late"]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&s.server)
        .await;

    s.client.start(Duration::from_secs(10));
    tokio::time::sleep(Duration::from_millis(100)).await;
    s.client.stop();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(s.published.load(Ordering::SeqCst), 0);
    assert!(ids(&s.sink).is_empty());
}
