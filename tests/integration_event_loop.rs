//! Event loop integration tests
//!
//! Drive a full loop against the scripted mock transport and assert on
//! the long-poll wire contract (ack cursor, timeout parameter, terminal
//! statuses) and on event dispatch.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};

use gamecloud::config::EventLoopConfig;
use gamecloud::credentials::Credentials;
use gamecloud::event_loop::{DomainEventLoop, EventLoopRegistry, LoopState};
use gamecloud::transport::MockTransport;

fn build_test_loop(
    transport: Arc<MockTransport>,
) -> (DomainEventLoop, Arc<EventLoopRegistry>) {
    let registry = Arc::new(EventLoopRegistry::new());
    let config = EventLoopConfig::with_iteration(Duration::from_secs(10))
        .with_failure_cooldown(Duration::from_millis(10))
        .with_retry_poll(Duration::from_millis(500));
    let event_loop = DomainEventLoop::new(
        Credentials::new("u1", "secret"),
        "private",
        "http://backend",
        transport,
        registry.clone(),
        config,
    );
    (event_loop, registry)
}

/// Wait until the loop reaches the expected state
async fn wait_for_state(event_loop: &DomainEventLoop, expected: LoopState) {
    for _ in 0..500 {
        if event_loop.state() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!(
        "loop never reached {:?}, still {:?}",
        expected,
        event_loop.state()
    );
}

#[tokio::test]
async fn test_second_poll_acknowledges_received_message() {
    let transport = Arc::new(MockTransport::new());
    transport.push_response(200, json!({"id": "m1", "type": "friend.add"}));
    transport.push_empty(204);

    let (event_loop, _registry) = build_test_loop(transport.clone());
    event_loop.start().unwrap();

    transport.wait_for_requests(2).await;
    let requests = transport.requests();
    assert_eq!(requests[0].query_param("ack"), None);
    assert_eq!(requests[1].query_param("ack"), Some("m1"));

    event_loop.stop();
}

#[tokio::test]
async fn test_unauthorized_poll_stops_loop_permanently() {
    let transport = Arc::new(MockTransport::new());
    transport.push_response(401, json!({"name": "Unauthorized"}));

    let (event_loop, registry) = build_test_loop(transport.clone());
    event_loop.start().unwrap();

    wait_for_state(&event_loop, LoopState::Stopped).await;
    assert!(registry.find("u1", "private").is_none());

    // No further poll is ever issued
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.request_count(), 1);

    // And the loop can never be started again
    assert!(event_loop.start().is_err());
}

#[tokio::test]
async fn test_suspend_resume_preserves_ack_cursor() {
    let transport = Arc::new(MockTransport::new());
    transport.push_response(200, json!({"id": "m1", "type": "friend.add"}));

    let (event_loop, _registry) = build_test_loop(transport.clone());
    event_loop.start().unwrap();

    // Second poll carries ack=m1 and hangs on the exhausted script
    transport.wait_for_requests(2).await;

    event_loop.suspend();
    assert_eq!(event_loop.state(), LoopState::Suspended);
    tokio::time::sleep(Duration::from_millis(20)).await;
    event_loop.resume();
    assert_eq!(event_loop.state(), LoopState::Running);

    // The poll issued after resuming still acknowledges m1: the cursor
    // is neither lost nor replaced while paused
    transport.wait_for_requests(3).await;
    let requests = transport.requests();
    assert_eq!(requests[1].query_param("ack"), Some("m1"));
    assert_eq!(requests[2].query_param("ack"), Some("m1"));

    event_loop.stop();
}

#[tokio::test]
async fn test_single_event_dispatched_and_loop_keeps_running() {
    let transport = Arc::new(MockTransport::new());
    transport.push_response(200, json!({"id": "e1", "payload": {"hello": "world"}}));
    transport.push_empty(204);

    let (event_loop, _registry) = build_test_loop(transport.clone());

    let received: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let received_clone = received.clone();
    let _subscription = event_loop.subscribe(move |message| {
        received_clone.lock().unwrap().push(message.clone());
    });
    event_loop.start().unwrap();

    // Third poll means the 200 and the 204 have both been fully handled
    transport.wait_for_requests(3).await;

    let events = received.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["payload"], json!({"hello": "world"}));
    drop(events);

    assert_eq!(event_loop.state(), LoopState::Running);
    event_loop.stop();
}

#[tokio::test]
async fn test_transient_failures_retry_with_shortened_poll() {
    let transport = Arc::new(MockTransport::new());
    transport.push_response(500, json!({"name": "InternalError"}));
    transport.push_error("connection reset");
    transport.push_empty(204);

    let (event_loop, _registry) = build_test_loop(transport.clone());
    event_loop.start().unwrap();

    // 500, then a transport error, then a clean 204; the loop survives
    // all three and keeps polling
    transport.wait_for_requests(4).await;
    let requests = transport.requests();

    // First poll uses the configured duration; the retries after the
    // failures use the shortened one, and success restores the full
    // duration
    assert_eq!(requests[0].query_param("timeout"), Some("10000"));
    assert_eq!(requests[1].query_param("timeout"), Some("500"));
    assert_eq!(requests[2].query_param("timeout"), Some("500"));
    assert_eq!(requests[3].query_param("timeout"), Some("10000"));

    assert_eq!(event_loop.state(), LoopState::Running);
    event_loop.stop();
}

#[tokio::test]
async fn test_registry_broadcast_sees_loop_messages() {
    let transport = Arc::new(MockTransport::new());
    transport.push_response(200, json!({"id": "e1", "type": "match.move"}));

    let registry = Arc::new(EventLoopRegistry::new());
    let config = EventLoopConfig::with_iteration(Duration::from_secs(10));
    let event_loop = DomainEventLoop::new(
        Credentials::new("u1", "secret"),
        "private",
        "http://backend",
        transport.clone(),
        registry.clone(),
        config,
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let _subscription = registry.subscribe_messages(move |source, message| {
        seen_clone
            .lock()
            .unwrap()
            .push((source.domain().to_string(), message.clone()));
    });

    event_loop.start().unwrap();
    transport.wait_for_requests(2).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "private");
    assert_eq!(seen[0].1["type"], "match.move");
    drop(seen);

    event_loop.stop();
}

#[tokio::test]
async fn test_panicking_listener_does_not_kill_loop() {
    let transport = Arc::new(MockTransport::new());
    transport.push_response(200, json!({"id": "e1", "type": "boom"}));
    transport.push_response(200, json!({"id": "e2", "type": "fine"}));

    let (event_loop, _registry) = build_test_loop(transport.clone());

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let _panicking = event_loop.subscribe(|message| {
        if message["type"] == "boom" {
            panic!("listener exploded");
        }
    });
    let delivered_clone = delivered.clone();
    let _recording = event_loop.subscribe(move |message| {
        delivered_clone
            .lock()
            .unwrap()
            .push(message["id"].as_str().unwrap_or_default().to_string());
    });
    event_loop.start().unwrap();

    transport.wait_for_requests(3).await;

    // Both events reached the second listener despite the first one
    // panicking on e1, and the loop is still running
    assert_eq!(*delivered.lock().unwrap(), vec!["e1", "e2"]);
    assert_eq!(event_loop.state(), LoopState::Running);
    event_loop.stop();
}
