//! Collision-checked random identifier generation.
//!
//! Produces session ids, endpoint codes and channel names from fixed
//! alphabets using the system CSPRNG. Every generator takes an async
//! existence predicate and retries on collision with a bounded loop;
//! exhaustion is an explicit error rather than unbounded recursion.
//!
//! Note that the existence check alone cannot exclude a concurrent claim of
//! the same candidate: the store's atomic create-if-absent is the final
//! arbiter, and callers retry generation when they lose that race.

use crate::errors::BrokerError;
use crate::models::CHANNEL_KEY_PREFIX;
use ring::rand::{SecureRandom, SystemRandom};
use std::future::Future;
use tracing::error;

/// Letters used for endpoint codes.
const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Punctuation allowed in session ids.
const SYMBOLS: &str = ".,_-#@$%";

/// Digits used in session ids and channel names.
const DIGITS: &str = "0123456789";

/// Maximum candidate draws before giving up on a saturated namespace.
pub const MAX_GENERATE_ATTEMPTS: usize = 32;

/// Raw length of an endpoint code before shaping (letters only).
const ENDPOINT_RAW_LEN: usize = 7;

/// Length of a session id.
const SESSION_ID_LEN: usize = 32;

/// Raw length of a channel name's random segment.
const CHANNEL_RAW_LEN: usize = 18;

/// Group size when shaping the channel name's random segment.
const CHANNEL_GROUP_LEN: usize = 6;

/// Draw `len` random characters from `alphabet`.
fn random_string(alphabet: &str, len: usize) -> Result<String, BrokerError> {
    let chars: Vec<char> = alphabet.chars().collect();
    if chars.is_empty() {
        return Err(BrokerError::Internal);
    }

    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes).map_err(|_| {
        error!(target: "broker.idgen", "CSPRNG failure while drawing identifier");
        BrokerError::Internal
    })?;

    Ok(bytes
        .iter()
        .filter_map(|b| chars.get(*b as usize % chars.len()))
        .collect())
}

/// Shape 7 raw letters into the `L.LLL.LLL` endpoint pattern.
fn shape_endpoint(raw: &str) -> String {
    let mut shaped = String::with_capacity(ENDPOINT_RAW_LEN + 2);
    for (i, c) in raw.chars().enumerate() {
        if i == 1 || i == 4 {
            shaped.push('.');
        }
        shaped.push(c);
    }
    shaped
}

/// Whether `code` matches the fixed 9-character, two-dot endpoint pattern.
pub fn is_valid_endpoint_code(code: &str) -> bool {
    let bytes = code.as_bytes();
    if bytes.len() != 9 {
        return false;
    }

    bytes.iter().enumerate().all(|(i, b)| match i {
        1 | 5 => *b == b'.',
        _ => b.is_ascii_alphabetic(),
    })
}

/// Generate a unique endpoint code shaped `L.LLL.LLL`.
///
/// `exists` reports whether a candidate is already in use; collisions are
/// retried up to [`MAX_GENERATE_ATTEMPTS`] times.
pub async fn generate_endpoint<F, Fut>(exists: F) -> Result<String, BrokerError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<bool, BrokerError>>,
{
    for _ in 0..MAX_GENERATE_ATTEMPTS {
        let candidate = shape_endpoint(&random_string(LETTERS, ENDPOINT_RAW_LEN)?);
        if !exists(candidate.clone()).await? {
            return Ok(candidate);
        }
    }

    exhausted("endpoint code")
}

/// Generate a unique 32-character session id.
pub async fn generate_session_id<F, Fut>(exists: F) -> Result<String, BrokerError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<bool, BrokerError>>,
{
    let alphabet = format!("{LETTERS}{SYMBOLS}{DIGITS}");

    for _ in 0..MAX_GENERATE_ATTEMPTS {
        let candidate = random_string(&alphabet, SESSION_ID_LEN)?;
        if !exists(candidate.clone()).await? {
            return Ok(candidate);
        }
    }

    exhausted("session id")
}

/// Generate a unique channel name embedding both endpoint codes.
///
/// The name is `CHANNEL:` + three dot-joined 6-character alphanumeric
/// groups + `.<from>.<to>`, so the key intrinsically records its
/// participants.
pub async fn generate_channel_name<F, Fut>(
    from: &str,
    to: &str,
    exists: F,
) -> Result<String, BrokerError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<bool, BrokerError>>,
{
    let alphabet = format!("{LETTERS}{DIGITS}");

    for _ in 0..MAX_GENERATE_ATTEMPTS {
        let raw = random_string(&alphabet, CHANNEL_RAW_LEN)?;
        let groups: Vec<String> = raw
            .as_bytes()
            .chunks(CHANNEL_GROUP_LEN)
            .map(|group| String::from_utf8_lossy(group).into_owned())
            .collect();

        let candidate = format!("{}{}.{}.{}", CHANNEL_KEY_PREFIX, groups.join("."), from, to);
        if !exists(candidate.clone()).await? {
            return Ok(candidate);
        }
    }

    exhausted("channel name")
}

fn exhausted(kind: &str) -> Result<String, BrokerError> {
    error!(
        target: "broker.idgen",
        kind = %kind,
        attempts = MAX_GENERATE_ATTEMPTS,
        "Identifier namespace exhausted"
    );
    Err(BrokerError::Internal)
}
