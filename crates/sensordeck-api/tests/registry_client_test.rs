// Integration tests for `RegistryClient` using wiremock.
#![allow(clippy::unwrap_used)]

use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sensordeck_api::{CreateEntityBody, Error, RegistryClient};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RegistryClient) {
    let server = MockServer::start().await;
    let base = format!("{}/iot", server.uri());
    let client = RegistryClient::from_reqwest(&base, reqwest::Client::new()).unwrap();
    (server, client)
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_list_sensors() {
    let (server, client) = setup().await;

    let body = json!([
        { "id": "s1", "name": "kitchen", "type": "THERMOMETER", "deviceId": "11", "period": "PT1S", "enabled": true },
        { "id": "s2", "name": "hall", "type": "MOTION", "deviceId": "20", "period": "PT5S", "enabled": false },
    ]);

    Mock::given(method("GET"))
        .and(path("/iot/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let sensors = client.list().await.unwrap();

    assert_eq!(sensors.len(), 2);
    assert_eq!(sensors[0].id, "s1");
    assert_eq!(sensors[0].kind, "THERMOMETER");
    assert_eq!(sensors[1].device_id, "20");
    assert!(!sensors[1].enabled);
}

#[tokio::test]
async fn test_add_sensor_posts_wire_body() {
    let (server, client) = setup().await;

    let request = CreateEntityBody {
        name: "attic".into(),
        kind: "HUMIDITY".into(),
        device_id: "12".into(),
        period: "PT3S".into(),
    };

    Mock::given(method("POST"))
        .and(path("/iot/add"))
        .and(body_json(json!({
            "name": "attic",
            "type": "HUMIDITY",
            "deviceId": "12",
            "period": "PT3S"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "s9",
            "name": "attic",
            "type": "HUMIDITY",
            "deviceId": "12",
            "period": "PT3S",
            "enabled": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = client.add(&request).await.unwrap();
    assert_eq!(created.id, "s9");
    assert_eq!(created.device_id, "12");
}

#[tokio::test]
async fn test_adjust_sends_delta_query() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/iot/s1/adjust"))
        .and(query_param("delta", "2.5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "bias": 4.0 })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client.adjust("s1", 2.5).await.unwrap();
    assert!((resp.bias - 4.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_delete_sensor() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/iot/s1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client.delete_entity("s1").await.unwrap();
}

// ── Error-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_add_conflict() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/iot/add"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({ "message": "deviceId already used" })),
        )
        .mount(&server)
        .await;

    let request = CreateEntityBody {
        name: "dup".into(),
        kind: "MOTION".into(),
        device_id: "11".into(),
        period: "PT1S".into(),
    };

    let err = client.add(&request).await.unwrap_err();
    match err {
        Error::Conflict { message } => assert_eq!(message, "deviceId already used"),
        other => panic!("expected Conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn test_delete_not_found() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/iot/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such sensor"))
        .mount(&server)
        .await;

    let err = client.delete_entity("missing").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("no such sensor"));
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/iot/list"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client.list().await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn test_malformed_body_keeps_raw_text() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/iot/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client.list().await.unwrap_err();
    match err {
        Error::Deserialization { body, .. } => assert_eq!(body, "<html>oops</html>"),
        other => panic!("expected Deserialization, got {other:?}"),
    }
}
