//! Expiry reaper background task.
//!
//! Read paths already purge expired tokens and bans lazily when they
//! touch them; this task sweeps the whole keyspace on an interval so
//! entities nobody reads again still get reclaimed.
//!
//! # Graceful Shutdown
//!
//! The task supports graceful shutdown via a cancellation token. When the
//! token is cancelled, the task completes its current iteration and exits
//! cleanly.

use crate::repositories::{BanRepository, TokenRepository};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Start the expiry reaper background task.
///
/// Runs one sweep every `sweep_interval_seconds`, purging expired session
/// tokens and bans. Returns when the cancellation token is triggered.
#[instrument(skip_all, name = "broker.task.expiry_reaper")]
pub async fn start_expiry_reaper(
    tokens: TokenRepository,
    bans: BanRepository,
    sweep_interval_seconds: u64,
    cancel_token: CancellationToken,
) {
    info!(
        target: "broker.task.expiry_reaper",
        sweep_interval_seconds,
        "Starting expiry reaper task"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(sweep_interval_seconds));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_sweep(&tokens, &bans).await;
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "broker.task.expiry_reaper",
                    "Expiry reaper received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "broker.task.expiry_reaper", "Expiry reaper stopped");
}

/// Run a single sweep iteration.
///
/// Separated from the main loop to allow direct testing. Store errors are
/// logged and swallowed; the next tick retries.
pub(crate) async fn run_sweep(tokens: &TokenRepository, bans: &BanRepository) {
    match tokens.remove_expired().await {
        Ok(purged) if purged > 0 => {
            info!(
                target: "broker.task.expiry_reaper",
                purged,
                "Purged expired session tokens"
            );
        }
        Ok(_) => {}
        Err(err) => {
            warn!(
                target: "broker.task.expiry_reaper",
                error = %err,
                "Token sweep failed"
            );
        }
    }

    match bans.remove_expired().await {
        Ok(purged) if purged > 0 => {
            info!(
                target: "broker.task.expiry_reaper",
                purged,
                "Purged expired bans"
            );
        }
        Ok(_) => {}
        Err(err) => {
            warn!(
                target: "broker.task.expiry_reaper",
                error = %err,
                "Ban sweep failed"
            );
        }
    }
}
