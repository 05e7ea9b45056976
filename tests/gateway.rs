//! Gateway transport tests against a fake APNS endpoint.

use bytes::Bytes;
use passpush::apns::{ApnsClient, FailureKind, HttpTransport, PushError, Reason};
use passpush::headers::{NotificationOptions, Priority, PushType};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DEVICE: &str = "0a1b2c3d4e5f60718293a4b5c6d7e8f9";

async fn client_for(server: &MockServer) -> ApnsClient {
    let transport = HttpTransport::new(server.uri(), None, Duration::from_secs(2)).unwrap();
    ApnsClient::new(Arc::new(transport), Duration::from_secs(2))
}

// =============================================================================
// Request Shape
// =============================================================================

#[tokio::test]
async fn test_push_sends_headers_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/3/device/{DEVICE}")))
        .and(header("apns-priority", "5"))
        .and(header("apns-push-type", "background"))
        .and(header("apns-collapse-id", "score"))
        .and(header("apns-topic", "web.com.example"))
        .and(header("apns-expiration", "1700000000"))
        .and(body_json(serde_json::json!({"aps": {"content-available": 1}})))
        .respond_with(ResponseTemplate::new(200).insert_header("apns-id", "gateway-id"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let options = NotificationOptions {
        collapse_id: "score".to_string(),
        expiration: chrono::DateTime::from_timestamp(1_700_000_000, 0),
        priority: Priority::LowPower,
        topic: "web.com.example".to_string(),
        push_type: Some(PushType::Background),
        ..Default::default()
    };

    let id = client
        .send(
            DEVICE,
            &options,
            Bytes::from_static(br#"{"aps":{"content-available":1}}"#),
        )
        .await
        .unwrap();

    assert_eq!(id, "gateway-id");
}

#[tokio::test]
async fn test_empty_options_send_no_apns_headers() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/3/device/{DEVICE}")))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    client
        .send(DEVICE, &NotificationOptions::default(), Bytes::from_static(b"{}"))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0]
        .headers
        .keys()
        .all(|name| !name.as_str().starts_with("apns-")));
}

// =============================================================================
// Response Classification
// =============================================================================

#[tokio::test]
async fn test_gone_device_is_classified() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(410).set_body_json(serde_json::json!({
            "reason": "Unregistered",
            "timestamp": 1_700_000_000_000_i64
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .send(DEVICE, &NotificationOptions::default(), Bytes::from_static(b"{}"))
        .await
        .unwrap_err();

    match err {
        PushError::DeviceGone { reason, since } => {
            assert_eq!(reason, Reason::Unregistered);
            assert!(since.is_some());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_throttling_is_retryable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(serde_json::json!({"reason": "TooManyRequests"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .send(DEVICE, &NotificationOptions::default(), Bytes::from_static(b"{}"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Throttled);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .send(DEVICE, &NotificationOptions::default(), Bytes::from_static(b"{}"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::GatewayUnavailable);
}

#[tokio::test]
async fn test_bad_certificate_is_unauthorized() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(serde_json::json!({"reason": "BadCertificate"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .send(DEVICE, &NotificationOptions::default(), Bytes::from_static(b"{}"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::Unauthorized);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_slow_gateway_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(server.uri(), None, Duration::from_secs(5)).unwrap();
    let client = ApnsClient::new(Arc::new(transport), Duration::from_millis(100));

    let err = client
        .send(DEVICE, &NotificationOptions::default(), Bytes::from_static(b"{}"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::GatewayUnavailable);
}
