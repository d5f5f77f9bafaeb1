// Integration tests for `SseClient` using wiremock.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use futures_util::StreamExt;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sensordeck_api::{ReconnectConfig, SseClient, StreamEvent};

fn no_retry() -> ReconnectConfig {
    ReconnectConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(10),
        max_retries: Some(0),
    }
}

async fn next_event(sub: &mut sensordeck_api::EventSubscription) -> Option<StreamEvent> {
    tokio::time::timeout(Duration::from_secs(5), sub.next())
        .await
        .expect("timed out waiting for stream event")
}

#[tokio::test]
async fn test_stream_delivers_open_messages_then_error() {
    let server = MockServer::start().await;

    let body = concat!(
        ":ka\n\n",
        "data: {\"sensorId\":\"s1\",\"deviceId\":\"11\",\"type\":\"THERMOMETER\",\"ts\":\"2026-10-19T12:00:00Z\",\"value\":21.5}\n\n",
        "data: second\n\n",
    );

    Mock::given(method("GET"))
        .and(path("/api/stream"))
        .and(query_param("devices", "10-12"))
        .and(header("accept", "text/event-stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let client = SseClient::from_reqwest(
        &format!("{}/api/stream", server.uri()),
        reqwest::Client::new(),
        no_retry(),
    )
    .unwrap();

    let mut sub = client.subscribe("10-12");

    assert_eq!(next_event(&mut sub).await, Some(StreamEvent::Opened));
    match next_event(&mut sub).await {
        Some(StreamEvent::Message(data)) => assert!(data.contains("\"deviceId\":\"11\"")),
        other => panic!("expected message, got {other:?}"),
    }
    assert_eq!(
        next_event(&mut sub).await,
        Some(StreamEvent::Message("second".into()))
    );
    assert!(matches!(
        next_event(&mut sub).await,
        Some(StreamEvent::TransportError(_))
    ));
    // Retry budget of zero: the subscription ends.
    assert_eq!(next_event(&mut sub).await, None);
}

#[tokio::test]
async fn test_failed_open_reports_transport_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/stream"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = SseClient::from_reqwest(
        &format!("{}/api/stream", server.uri()),
        reqwest::Client::new(),
        no_retry(),
    )
    .unwrap();

    let mut sub = client.subscribe("1");

    match next_event(&mut sub).await {
        Some(StreamEvent::TransportError(msg)) => assert!(msg.contains("500")),
        other => panic!("expected transport error, got {other:?}"),
    }
    assert_eq!(next_event(&mut sub).await, None);
}

#[tokio::test]
async fn test_reconnects_after_drop() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string("data: tick\n\n"),
        )
        .mount(&server)
        .await;

    let reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
        max_retries: None,
    };
    let client = SseClient::from_reqwest(
        &format!("{}/api/stream", server.uri()),
        reqwest::Client::new(),
        reconnect,
    )
    .unwrap();

    let mut sub = client.subscribe("1-3");

    let mut opened = 0;
    while opened < 2 {
        match next_event(&mut sub).await {
            Some(StreamEvent::Opened) => opened += 1,
            Some(_) => {}
            None => panic!("subscription ended while retrying forever"),
        }
    }

    sub.cancel();
    assert!(sub.is_cancelled());
    assert_eq!(sub.next().await, None);
}
