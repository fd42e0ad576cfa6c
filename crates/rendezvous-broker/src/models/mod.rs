//! Data models for the rendezvous broker.
//!
//! Entities are persisted as flat string-keyed hashes in the store:
//!
//! - `TOKEN:<id>`       -> `{ ID, IP, endpoint, expireAt }`
//! - `BAN:<ip>`         -> `{ IP, expireAt }`
//! - `<channel-name>`   -> `{ channel, from, to, token [, tokenTo] }`
//!
//! Timestamps are RFC 3339. A record read back that fails its shape check
//! is treated as store corruption by the repositories.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Key prefix for session token records.
pub const TOKEN_KEY_PREFIX: &str = "TOKEN:";

/// Key prefix for ban records.
pub const BAN_KEY_PREFIX: &str = "BAN:";

/// Key prefix for channel records. Channel names carry their own namespace.
pub const CHANNEL_KEY_PREFIX: &str = "CHANNEL:";

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Opaque session identity bound to one client IP and one endpoint code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    /// Opaque session identifier (unique).
    pub id: String,
    /// Cleaned client IP the token was issued to.
    pub ip: String,
    /// Human-shareable endpoint code, unique among live tokens.
    pub endpoint: String,
    /// Expiry timestamp (24 h from issuance).
    pub expire_at: DateTime<Utc>,
}

impl SessionToken {
    /// Store key for a session token id.
    pub fn key(id: &str) -> String {
        format!("{TOKEN_KEY_PREFIX}{id}")
    }

    /// Whether the token is expired relative to `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expire_at
    }

    /// Flatten into hash fields for storage.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("ID".to_string(), self.id.clone()),
            ("IP".to_string(), self.ip.clone()),
            ("endpoint".to_string(), self.endpoint.clone()),
            ("expireAt".to_string(), self.expire_at.to_rfc3339()),
        ]
    }

    /// Rebuild from stored hash fields. `None` means the record fails the
    /// expected-shape check.
    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        Some(Self {
            id: fields.get("ID")?.clone(),
            ip: fields.get("IP")?.clone(),
            endpoint: fields.get("endpoint")?.clone(),
            expire_at: parse_timestamp(fields.get("expireAt")?)?,
        })
    }
}

/// Time-limited block on an IP address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ban {
    /// Banned IP (unique).
    pub ip: String,
    /// Expiry timestamp (30 days from the ban).
    pub expire_at: DateTime<Utc>,
}

impl Ban {
    /// Store key for a banned IP.
    pub fn key(ip: &str) -> String {
        format!("{BAN_KEY_PREFIX}{ip}")
    }

    /// Whether the ban is expired (inert) relative to `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expire_at
    }

    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("IP".to_string(), self.ip.clone()),
            ("expireAt".to_string(), self.expire_at.to_rfc3339()),
        ]
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        Some(Self {
            ip: fields.get("IP")?.clone(),
            expire_at: parse_timestamp(fields.get("expireAt")?)?,
        })
    }
}

/// A named pairing record linking two endpoint codes and their capability
/// tokens. The channel name itself is the store key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Channel name (unique, primary key, `CHANNEL:`-namespaced).
    pub channel: String,
    /// Endpoint code of the initiator.
    pub from: String,
    /// Endpoint code of the target.
    pub to: String,
    /// Capability token for the initiator.
    pub token: String,
    /// Capability token for the target; absent until the target joins.
    pub token_to: Option<String>,
}

impl Channel {
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("channel".to_string(), self.channel.clone()),
            ("from".to_string(), self.from.clone()),
            ("to".to_string(), self.to.clone()),
            ("token".to_string(), self.token.clone()),
        ];
        if let Some(token_to) = &self.token_to {
            fields.push(("tokenTo".to_string(), token_to.clone()));
        }
        fields
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        Some(Self {
            channel: fields.get("channel")?.clone(),
            from: fields.get("from")?.clone(),
            to: fields.get("to")?.clone(),
            token: fields.get("token")?.clone(),
            token_to: fields.get("tokenTo").cloned(),
        })
    }
}

// ============================================================================
// HTTP response payloads
// ============================================================================

/// Success envelope: `{"statusCode": N, "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiData<T: Serialize> {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub data: T,
}

impl<T: Serialize> ApiData<T> {
    /// 200-shaped success envelope.
    pub fn ok(data: T) -> Self {
        Self {
            status_code: 200,
            data,
        }
    }
}

/// Informational envelope: `{"statusCode": N, "message": "..."}`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiMessage {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub message: String,
}

impl ApiMessage {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            message: message.into(),
        }
    }
}

/// Payload for `GET /auth`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionData {
    /// The opaque session token id.
    pub token: String,
    /// The endpoint code assigned to this session.
    pub endpoint: String,
}

/// Payload for pairing and rotation responses.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelData {
    /// Capability token for the caller's side of the channel.
    pub token: String,
    /// The other participant's endpoint code.
    pub endpoint: String,
    /// The shared channel name.
    pub channel: String,
}

/// Payload for `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "ok" if the store is reachable, "degraded" otherwise.
    pub status: String,
    /// Store connectivity: "connected" or "disconnected".
    pub store: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_token_key() {
        assert_eq!(SessionToken::key("abc"), "TOKEN:abc");
    }

    #[test]
    fn test_ban_key() {
        assert_eq!(Ban::key("10.0.0.1"), "BAN:10.0.0.1");
    }

    #[test]
    fn test_session_token_round_trip() {
        let token = SessionToken {
            id: "id-1".to_string(),
            ip: "10.0.0.1".to_string(),
            endpoint: "a.bcd.efg".to_string(),
            expire_at: Utc::now() + Duration::hours(24),
        };

        let stored: HashMap<String, String> = token.to_fields().into_iter().collect();
        let restored = SessionToken::from_fields(&stored).expect("shape check should pass");

        assert_eq!(restored.id, token.id);
        assert_eq!(restored.ip, token.ip);
        assert_eq!(restored.endpoint, token.endpoint);
        // RFC 3339 round-trip preserves the instant
        assert_eq!(restored.expire_at, token.expire_at);
    }

    #[test]
    fn test_session_token_shape_check_rejects_missing_field() {
        let stored = fields(&[("ID", "id-1"), ("IP", "10.0.0.1")]);
        assert!(SessionToken::from_fields(&stored).is_none());
    }

    #[test]
    fn test_session_token_shape_check_rejects_bad_timestamp() {
        let stored = fields(&[
            ("ID", "id-1"),
            ("IP", "10.0.0.1"),
            ("endpoint", "a.bcd.efg"),
            ("expireAt", "not-a-date"),
        ]);
        assert!(SessionToken::from_fields(&stored).is_none());
    }

    #[test]
    fn test_session_token_expiry() {
        let now = Utc::now();
        let live = SessionToken {
            id: "id-1".to_string(),
            ip: "10.0.0.1".to_string(),
            endpoint: "a.bcd.efg".to_string(),
            expire_at: now + Duration::hours(1),
        };
        let stale = SessionToken {
            expire_at: now - Duration::hours(1),
            ..live.clone()
        };

        assert!(!live.is_expired(now));
        assert!(stale.is_expired(now));
    }

    #[test]
    fn test_ban_round_trip() {
        let ban = Ban {
            ip: "10.0.0.1".to_string(),
            expire_at: Utc::now() + Duration::days(30),
        };

        let stored: HashMap<String, String> = ban.to_fields().into_iter().collect();
        let restored = Ban::from_fields(&stored).expect("shape check should pass");

        assert_eq!(restored, ban);
    }

    #[test]
    fn test_channel_round_trip_without_token_to() {
        let channel = Channel {
            channel: "CHANNEL:abc123.def456.ghi789.a.bcd.efg.h.ijk.lmn".to_string(),
            from: "a.bcd.efg".to_string(),
            to: "h.ijk.lmn".to_string(),
            token: "cap-token".to_string(),
            token_to: None,
        };

        let stored: HashMap<String, String> = channel.to_fields().into_iter().collect();
        assert!(!stored.contains_key("tokenTo"));

        let restored = Channel::from_fields(&stored).expect("shape check should pass");
        assert_eq!(restored, channel);
    }

    #[test]
    fn test_channel_round_trip_with_token_to() {
        let channel = Channel {
            channel: "CHANNEL:abc123.def456.ghi789.a.bcd.efg.h.ijk.lmn".to_string(),
            from: "a.bcd.efg".to_string(),
            to: "h.ijk.lmn".to_string(),
            token: "cap-token".to_string(),
            token_to: Some("cap-token-to".to_string()),
        };

        let stored: HashMap<String, String> = channel.to_fields().into_iter().collect();
        let restored = Channel::from_fields(&stored).expect("shape check should pass");
        assert_eq!(restored, channel);
    }

    #[test]
    fn test_channel_shape_check_rejects_missing_token() {
        let stored = fields(&[
            ("channel", "CHANNEL:x"),
            ("from", "a.bcd.efg"),
            ("to", "h.ijk.lmn"),
        ]);
        assert!(Channel::from_fields(&stored).is_none());
    }

    #[test]
    fn test_api_envelopes_serialize_with_status_code() {
        let data = ApiData::ok(SessionData {
            token: "t".to_string(),
            endpoint: "a.bcd.efg".to_string(),
        });
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["data"]["token"], "t");

        let message = ApiMessage::ok("Channel was successfully disconnected.");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["message"], "Channel was successfully disconnected.");
    }
}
