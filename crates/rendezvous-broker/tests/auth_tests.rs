//! Session endpoint integration tests.
//!
//! Exercises `GET /auth` end to end: session creation, rotation, the
//! per-IP quota, and the ban-on-misuse path. Client IPs are simulated
//! with the `X-Forwarded-For` header.

use broker_test_utils::TestBrokerServer;

async fn create_session(
    server: &TestBrokerServer,
    ip: &str,
) -> Result<serde_json::Value, anyhow::Error> {
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/auth", server.url()))
        .header("X-Forwarded-For", ip)
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    Ok(response.json().await?)
}

/// Test that a new session returns a token and a shaped endpoint code.
#[tokio::test]
async fn test_create_session_returns_token_and_endpoint() -> Result<(), anyhow::Error> {
    let server = TestBrokerServer::spawn().await?;

    let body = create_session(&server, "10.0.0.1").await?;

    assert_eq!(body["statusCode"], 200);

    let token = body["data"]["token"].as_str().unwrap_or_default();
    let endpoint = body["data"]["endpoint"].as_str().unwrap_or_default();

    assert_eq!(token.len(), 32);
    // L.LLL.LLL shape
    assert_eq!(endpoint.len(), 9);
    let lengths: Vec<usize> = endpoint.split('.').map(str::len).collect();
    assert_eq!(lengths, vec![1, 3, 3]);
    assert!(endpoint
        .chars()
        .all(|c| c == '.' || c.is_ascii_alphabetic()));

    // Token persisted under its key
    assert!(server.store().contains_key(&format!("TOKEN:{token}")));

    Ok(())
}

/// Test that presenting an existing token to /auth rotates the session.
#[tokio::test]
async fn test_auth_with_existing_token_rotates_session() -> Result<(), anyhow::Error> {
    let server = TestBrokerServer::spawn().await?;
    let client = reqwest::Client::new();

    let first = create_session(&server, "10.0.0.1").await?;
    let old_token = first["data"]["token"].as_str().unwrap_or_default().to_string();

    let response = client
        .get(format!("{}/auth", server.url()))
        .header("X-Forwarded-For", "10.0.0.1")
        .bearer_auth(&old_token)
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await?;
    let new_token = body["data"]["token"].as_str().unwrap_or_default();

    assert_ne!(new_token, old_token);
    assert!(!server.store().contains_key(&format!("TOKEN:{old_token}")));
    assert!(server.store().contains_key(&format!("TOKEN:{new_token}")));

    Ok(())
}

/// Test the per-IP quota: the request over quota is rejected, other IPs
/// are unaffected.
#[tokio::test]
async fn test_session_quota_per_ip() -> Result<(), anyhow::Error> {
    let server = TestBrokerServer::spawn_with_quota(3).await?;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        create_session(&server, "10.0.0.1").await?;
    }

    let over_quota = client
        .get(format!("{}/auth", server.url()))
        .header("X-Forwarded-For", "10.0.0.1")
        .send()
        .await?;
    assert_eq!(over_quota.status(), 400);

    let body: serde_json::Value = over_quota.json().await?;
    assert_eq!(body["statusCode"], 400);
    assert!(body["error"]
        .as_str()
        .unwrap_or_default()
        .starts_with("Max tokens reached per ip."));

    // A different IP still gets a session
    create_session(&server, "10.0.0.2").await?;

    Ok(())
}

/// Test that a token presented from a foreign IP is rejected and the
/// presenting IP is banned from then on.
#[tokio::test]
async fn test_token_from_foreign_ip_bans_presenter() -> Result<(), anyhow::Error> {
    let server = TestBrokerServer::spawn().await?;
    let client = reqwest::Client::new();

    let session = create_session(&server, "10.0.0.1").await?;
    let token = session["data"]["token"].as_str().unwrap_or_default().to_string();

    let stolen = client
        .get(format!("{}/auth", server.url()))
        .header("X-Forwarded-For", "10.0.0.66")
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(stolen.status(), 401);
    assert!(server.store().contains_key("BAN:10.0.0.66"));

    // The banned IP is rejected even with its own valid token
    let own = create_session(&server, "10.0.0.99").await;
    assert!(own.is_ok());

    let banned_session = create_session(&server, "10.0.0.50").await?;
    let banned_token = banned_session["data"]["token"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    // Ban 10.0.0.50 by presenting someone else's token from it
    client
        .get(format!("{}/auth", server.url()))
        .header("X-Forwarded-For", "10.0.0.50")
        .bearer_auth(&token)
        .send()
        .await?;

    let after_ban = client
        .get(format!("{}/auth", server.url()))
        .header("X-Forwarded-For", "10.0.0.50")
        .bearer_auth(&banned_token)
        .send()
        .await?;
    assert_eq!(after_ban.status(), 401);

    let body: serde_json::Value = after_ban.json().await?;
    assert_eq!(body["error"], "Unauthorized access.");

    Ok(())
}

/// Test that protected routes without a token return 400.
#[tokio::test]
async fn test_channels_without_token_is_rejected() -> Result<(), anyhow::Error> {
    let server = TestBrokerServer::spawn().await?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/channels/a.bcd.efg", server.url()))
        .header("X-Forwarded-For", "10.0.0.1")
        .send()
        .await?;

    assert_eq!(response.status(), 400);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"], "Invalid token supplied.");

    Ok(())
}

/// Test that an unknown token is rejected as a bad request.
#[tokio::test]
async fn test_unknown_token_is_rejected() -> Result<(), anyhow::Error> {
    let server = TestBrokerServer::spawn().await?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/channels/disconnect", server.url()))
        .header("X-Forwarded-For", "10.0.0.1")
        .bearer_auth("definitely-not-a-token")
        .send()
        .await?;

    assert_eq!(response.status(), 400);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"], "Invalid token supplied.");

    Ok(())
}
