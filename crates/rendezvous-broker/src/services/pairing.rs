//! Channel pairing engine.
//!
//! Pairs two live endpoints over a named channel record, minting one
//! capability token per participant through the configured issuer. All
//! state transitions for an endpoint are serialized through a per-endpoint
//! async lock so concurrent requests cannot interleave the read-decide-write
//! sequence.

use crate::errors::BrokerError;
use crate::idgen::{self, MAX_GENERATE_ATTEMPTS};
use crate::models::{Channel, ChannelData, SessionToken};
use crate::repositories::{ChannelRepository, TokenRepository};
use crate::services::issuer::CapabilityIssuer;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, instrument, warn};

/// Outcome of a disconnect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// A live channel was found and deleted.
    Disconnected,
    /// The endpoint had no live channel; informational, not an error.
    AlreadyDisconnected,
}

/// Registry of per-endpoint async locks.
///
/// Handles are created on demand and dropped once no request holds them,
/// so the map stays proportional to in-flight pairing traffic.
#[derive(Default)]
struct EndpointLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl EndpointLocks {
    fn handle(&self, endpoint: &str) -> Arc<AsyncMutex<()>> {
        let mut map = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        map.entry(endpoint.to_string()).or_default().clone()
    }
}

/// Channel pairing service.
#[derive(Clone)]
pub struct PairingService {
    channels: ChannelRepository,
    tokens: TokenRepository,
    issuer: Arc<dyn CapabilityIssuer>,
    locks: Arc<EndpointLocks>,
}

impl PairingService {
    pub fn new(
        channels: ChannelRepository,
        tokens: TokenRepository,
        issuer: Arc<dyn CapabilityIssuer>,
    ) -> Self {
        Self {
            channels,
            tokens,
            issuer,
            locks: Arc::new(EndpointLocks::default()),
        }
    }

    /// Pair the caller with `target`, returning the caller's capability
    /// token plus the channel name.
    ///
    /// Repeating the same request is idempotent; requesting a different
    /// target tears down the caller's previous channel first; a pending
    /// channel initiated by `target` toward the caller is joined instead
    /// of shadowed by a second record.
    #[instrument(skip_all, fields(target = %target))]
    pub async fn pair(
        &self,
        caller: &SessionToken,
        target: &str,
    ) -> Result<ChannelData, BrokerError> {
        if !idgen::is_valid_endpoint_code(target)
            || !self.tokens.endpoint_in_use(target).await?
        {
            return Err(BrokerError::BadRequest("Invalid endpoint.".to_string()));
        }

        // Take both participants' locks in sorted order so two mirrored
        // pair() calls cannot deadlock. Self-pairing takes one lock.
        let (first, second) = if caller.endpoint.as_str() <= target {
            (caller.endpoint.as_str(), target)
        } else {
            (target, caller.endpoint.as_str())
        };
        let first_lock = self.locks.handle(first);
        let _first_guard = first_lock.lock().await;
        let second_lock = (first != second).then(|| self.locks.handle(second));
        let _second_guard = match &second_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        // Caller already initiated a channel: same target is idempotent,
        // a different target replaces the old channel.
        if let Some(previous) = self.channels.find_by_initiator(&caller.endpoint).await? {
            if previous.to == target {
                return Ok(ChannelData {
                    token: previous.token,
                    endpoint: previous.to,
                    channel: previous.channel,
                });
            }

            info!(
                target: "broker.services.pairing",
                channel = %previous.channel,
                "Replacing previous channel for new target"
            );
            self.channels.delete(&previous.channel).await?;
        }

        // The target already initiated a channel toward the caller: join
        // it, minting the second-participant token lazily.
        if let Some(pending) = self.channels.find_by_initiator(target).await? {
            if pending.to == caller.endpoint {
                if let Some(token) = pending.token_to {
                    return Ok(ChannelData {
                        token,
                        endpoint: pending.from,
                        channel: pending.channel,
                    });
                }

                let minted = self
                    .issuer
                    .request_token(&caller.endpoint, &pending.channel)
                    .await?;
                if self.channels.set_token_to(&pending.channel, &minted).await? {
                    return Ok(ChannelData {
                        token: minted,
                        endpoint: pending.from,
                        channel: pending.channel,
                    });
                }

                // The pending channel vanished while the token was being
                // minted; fall through and open a fresh one.
                warn!(
                    target: "broker.services.pairing",
                    channel = %pending.channel,
                    "Pending channel disappeared before join completed"
                );
            }
        }

        self.open_channel(caller, target).await
    }

    /// Create a fresh channel record for `caller -> target`.
    ///
    /// The issuer token is requested before the record exists, so an
    /// issuer failure leaves no partial state behind. A lost creation
    /// race regenerates the name and token.
    async fn open_channel(
        &self,
        caller: &SessionToken,
        target: &str,
    ) -> Result<ChannelData, BrokerError> {
        for _ in 0..MAX_GENERATE_ATTEMPTS {
            let name = idgen::generate_channel_name(&caller.endpoint, target, |candidate| {
                let channels = self.channels.clone();
                async move { channels.exists(&candidate).await }
            })
            .await?;

            let token = self.issuer.request_token(&caller.endpoint, &name).await?;

            let channel = Channel {
                channel: name.clone(),
                from: caller.endpoint.clone(),
                to: target.to_string(),
                token: token.clone(),
                token_to: None,
            };

            if self.channels.create(&channel).await? {
                info!(
                    target: "broker.services.pairing",
                    channel = %name,
                    "Channel created"
                );
                return Ok(ChannelData {
                    token,
                    endpoint: target.to_string(),
                    channel: name,
                });
            }

            warn!(
                target: "broker.services.pairing",
                "Lost channel creation race, regenerating name"
            );
        }

        Err(BrokerError::Internal)
    }

    /// Re-mint the caller's capability token for its live channel.
    #[instrument(skip_all)]
    pub async fn refresh(&self, caller: &SessionToken) -> Result<ChannelData, BrokerError> {
        let lock = self.locks.handle(&caller.endpoint);
        let _guard = lock.lock().await;

        let Some(channel) = self.channels.find_for_endpoint(&caller.endpoint).await? else {
            return Err(BrokerError::PreconditionFailed(
                "You must create a channel connection first.".to_string(),
            ));
        };

        let token = self
            .issuer
            .request_token(&caller.endpoint, &channel.channel)
            .await?;

        let (updated, endpoint) = if channel.from == caller.endpoint {
            (
                self.channels.set_token(&channel.channel, &token).await?,
                channel.to,
            )
        } else {
            (
                self.channels.set_token_to(&channel.channel, &token).await?,
                channel.from,
            )
        };

        // The channel was torn down between the lookup and the rotation
        if !updated {
            return Err(BrokerError::PreconditionFailed(
                "You must create a channel connection first.".to_string(),
            ));
        }

        Ok(ChannelData {
            token,
            endpoint,
            channel: channel.channel,
        })
    }

    /// Tear down the caller's live channel, if any.
    #[instrument(skip_all)]
    pub async fn disconnect(
        &self,
        caller: &SessionToken,
    ) -> Result<DisconnectOutcome, BrokerError> {
        let lock = self.locks.handle(&caller.endpoint);
        let _guard = lock.lock().await;

        match self.channels.find_for_endpoint(&caller.endpoint).await? {
            Some(channel) => {
                self.channels.delete(&channel.channel).await?;
                info!(
                    target: "broker.services.pairing",
                    channel = %channel.channel,
                    "Channel disconnected"
                );
                Ok(DisconnectOutcome::Disconnected)
            }
            None => Ok(DisconnectOutcome::AlreadyDisconnected),
        }
    }
}
