//! Health endpoint integration tests.
//!
//! Tests the `/health` endpoint using the `TestBrokerServer` harness.

use broker_test_utils::TestBrokerServer;

/// Test that health endpoint returns 200 and connected store.
#[tokio::test]
async fn test_health_endpoint_returns_200() -> Result<(), anyhow::Error> {
    let server = TestBrokerServer::spawn().await?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "connected");

    Ok(())
}

/// Test that health endpoint returns JSON content type.
#[tokio::test]
async fn test_health_endpoint_returns_json() -> Result<(), anyhow::Error> {
    let server = TestBrokerServer::spawn().await?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", server.url()))
        .send()
        .await?;

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok());

    assert!(
        content_type.is_some_and(|ct| ct.contains("application/json")),
        "Expected application/json content type, got {:?}",
        content_type
    );

    Ok(())
}

/// Test that non-existent routes return 404.
#[tokio::test]
async fn test_unknown_route_returns_404() -> Result<(), anyhow::Error> {
    let server = TestBrokerServer::spawn().await?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/nope", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), 404);

    Ok(())
}

/// Test that health requires no client IP or token.
#[tokio::test]
async fn test_health_is_public() -> Result<(), anyhow::Error> {
    let server = TestBrokerServer::spawn().await?;
    let client = reqwest::Client::new();

    // No X-Forwarded-For, no Authorization
    let response = client
        .get(format!("{}/health", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), 200);

    Ok(())
}
