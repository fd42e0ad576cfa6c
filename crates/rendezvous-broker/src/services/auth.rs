//! Session/authentication orchestration.
//!
//! Composes the token repository and ban guard to answer "is this
//! request's token valid and not from a banned or mismatched IP", to
//! enforce the per-IP session quota, and to handle session creation and
//! rotation.

use crate::errors::BrokerError;
use crate::models::{SessionData, SessionToken};
use crate::repositories::{BanRepository, TokenRepository};
use std::net::{IpAddr, SocketAddr};
use tracing::{info, instrument, warn};

/// Strip a port suffix or IPv6-mapped prefix from a client address
/// representation before comparison or storage.
pub fn clean_ip(raw: &str) -> String {
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return clean_ip(&addr.ip().to_string());
    }

    if let Ok(ip) = raw.parse::<IpAddr>() {
        if let IpAddr::V6(v6) = ip {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return v4.to_string();
            }
        }
        return ip.to_string();
    }

    // Fall back to the last colon-separated segment (handles bare
    // `::ffff:host` style strings that fail to parse above)
    match raw.rsplit(':').next() {
        Some(segment) => segment.to_string(),
        None => raw.to_string(),
    }
}

/// Strip every character outside the token id allow-list (letters, digits
/// and the id punctuation set) so supplied values are safe to use as
/// lookup keys.
pub fn sanitize_token_id(supplied: &str) -> String {
    supplied
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || ".,_-#@$%".contains(*c))
        .collect()
}

/// Session/authentication orchestrator.
#[derive(Clone)]
pub struct AuthService {
    tokens: TokenRepository,
    bans: BanRepository,
    max_tokens_per_ip: u32,
}

impl AuthService {
    pub fn new(tokens: TokenRepository, bans: BanRepository, max_tokens_per_ip: u32) -> Self {
        Self {
            tokens,
            bans,
            max_tokens_per_ip,
        }
    }

    /// Resolve the identity of an inbound request.
    ///
    /// - A bearer identifier, when present, is validated (any route).
    /// - The new-session request without a bearer gets a quota check and
    ///   proceeds unauthenticated (`None`).
    /// - Any other route without a bearer is rejected.
    #[instrument(skip_all)]
    pub async fn resolve(
        &self,
        cleaned_ip: &str,
        bearer: Option<&str>,
        wants_new_session: bool,
    ) -> Result<Option<SessionToken>, BrokerError> {
        if let Some(supplied) = bearer {
            return Ok(Some(self.validate(cleaned_ip, supplied).await?));
        }

        if wants_new_session {
            self.tokens.remove_expired().await?;

            let live = self.tokens.count_for_ip(cleaned_ip).await?;
            if live >= self.max_tokens_per_ip as usize {
                return Err(BrokerError::BadRequest(
                    "Max tokens reached per ip. Use a previous one, refresh a previous one \
                     or wait until one expires."
                        .to_string(),
                ));
            }

            return Ok(None);
        }

        Err(BrokerError::BadRequest("Invalid token supplied.".to_string()))
    }

    /// Validate a supplied bearer identifier against the request IP.
    ///
    /// A token presented from an IP other than the one it was bound to
    /// bans the presenting IP as a side effect.
    #[instrument(skip_all)]
    pub async fn validate(
        &self,
        cleaned_ip: &str,
        supplied: &str,
    ) -> Result<SessionToken, BrokerError> {
        let id = sanitize_token_id(supplied);
        if id.is_empty() {
            return Err(BrokerError::BadRequest("Invalid token supplied.".to_string()));
        }

        let token = self.tokens.get(&id).await?;

        if token.ip != cleaned_ip {
            warn!(
                target: "broker.services.auth",
                "Token presented from foreign IP, banning presenter"
            );
            self.bans.ban(cleaned_ip).await?;
            return Err(BrokerError::Unauthorized(
                "Unauthorized access, permanent block.".to_string(),
            ));
        }

        if self.bans.is_banned(cleaned_ip).await? {
            return Err(BrokerError::Unauthorized("Unauthorized access.".to_string()));
        }

        Ok(token)
    }

    /// Create a session for the caller, rotating any session it already
    /// holds: the old token is deleted first, then a brand-new token is
    /// minted and persisted.
    #[instrument(skip_all)]
    pub async fn create_session(
        &self,
        cleaned_ip: &str,
        existing: Option<&SessionToken>,
    ) -> Result<SessionData, BrokerError> {
        if let Some(previous) = existing {
            self.tokens.delete(&previous.id).await?;
        }

        let token = self.tokens.create(cleaned_ip).await?;

        info!(
            target: "broker.services.auth",
            endpoint = %token.endpoint,
            rotated = existing.is_some(),
            "Session created"
        );

        Ok(SessionData {
            token: token.id,
            endpoint: token.endpoint,
        })
    }
}
