//! End-to-end proxy behaviour against mock backends.

mod common;

use common::*;
use reqwest::StatusCode;
use serde_json::Value;

#[tokio::test]
async fn test_forwards_and_tags_response() {
    let backend = start_mock_backend(r#"{"items":[1,2,3]}"#).await;
    let gateway = spawn_gateway(test_config(&[("news", backend)])).await;

    let response = reqwest::Client::new()
        .get(gateway.url("/api/news/latest?page=2"))
        .bearer_auth(gateway.token(1))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["x-service-name"], "news");
    assert_eq!(headers["x-gateway-response"], "true");
    assert!(headers.get("x-internal-service").is_none());
    assert!(headers.get("x-request-id").is_some());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["items"][2], 3);
}

#[tokio::test]
async fn test_upstream_request_rewritten() {
    let backend = start_echo_backend().await;
    let gateway = spawn_gateway(test_config(&[("pulse", backend)])).await;

    let response = reqwest::Client::new()
        .get(gateway.url("/api/pulse/feed?limit=5"))
        .bearer_auth(gateway.token(77))
        .header("x-request-id", "echo-req-1")
        .header("cookie", "session=abc")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    let head = body["head"].as_str().unwrap().to_ascii_lowercase();
    assert!(head.starts_with("get /api/pulse/feed?limit=5 http/1.1"));
    assert!(head.contains("x-request-id: echo-req-1"));
    assert!(head.contains("x-user-id: 77"));
    assert!(head.contains("x-username: user77"));
    assert!(head.contains("x-gateway-request: true"));
    assert!(head.contains("x-gateway-timestamp:"));
    assert!(head.contains("x-forwarded-for: 127.0.0.1"));
    assert!(head.contains(&format!("x-original-host: {}", gateway.addr)));
    assert!(!head.contains("cookie:"));
}

#[tokio::test]
async fn test_missing_token_rejected_before_proxying() {
    let backend = start_mock_backend("{}").await;
    let gateway = spawn_gateway(test_config(&[("news", backend)])).await;

    let response = reqwest::get(gateway.url("/api/news")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["message"], "Invalid or missing credentials");
}

async fn failed_request(gateway: &TestGateway, path: &str, request_id: &str) -> (StatusCode, Value) {
    let response = reqwest::Client::new()
        .get(gateway.url(path))
        .bearer_auth(gateway.token(1))
        .header("x-request-id", request_id)
        .send()
        .await
        .unwrap();
    let status = response.status();
    assert_eq!(response.headers()["x-request-id"], request_id);
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_refused_connection_is_503() {
    let gateway = spawn_gateway(test_config(&[("news", refused_addr().await)])).await;

    let (status, body) = failed_request(&gateway, "/api/news", "req-503").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    assert_eq!(body["request_id"], "req-503");
    assert!(!body["error"]["message"].as_str().unwrap().contains("refused"));
}

#[tokio::test]
async fn test_unresolvable_host_is_503() {
    let mut config = test_config(&[("news", refused_addr().await)]);
    config.services[0].url = "http://no-such-host.invalid:8080".to_string();
    config.services[0].retry_attempts = 0;
    // Resolver latency must not turn this into a timeout.
    config.services[0].timeout_ms = 10_000;
    let gateway = spawn_gateway(config).await;

    let (status, body) = failed_request(&gateway, "/api/news", "req-dns").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    assert_eq!(body["request_id"], "req-dns");
    assert!(!body["error"]["message"].as_str().unwrap().contains("invalid"));
}

#[tokio::test]
async fn test_silent_backend_is_504() {
    let mut config = test_config(&[("news", start_silent_backend().await)]);
    config.services[0].timeout_ms = 300;
    let gateway = spawn_gateway(config).await;

    let (status, body) = failed_request(&gateway, "/api/news", "req-504").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"]["code"], "GATEWAY_TIMEOUT");
    assert_eq!(body["request_id"], "req-504");
}

#[tokio::test]
async fn test_garbage_response_is_502() {
    let gateway = spawn_gateway(test_config(&[("news", start_garbage_backend().await)])).await;

    let (status, body) = failed_request(&gateway, "/api/news", "req-502").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "BAD_GATEWAY");
    assert_eq!(body["request_id"], "req-502");
}

#[tokio::test]
async fn test_unrouted_path_is_404() {
    let backend = start_mock_backend("{}").await;
    let gateway = spawn_gateway(test_config(&[("news", backend)])).await;

    let response = reqwest::Client::new()
        .get(gateway.url("/api/unknown"))
        .bearer_auth(gateway.token(1))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
