//! Service layer: orchestration and external collaborators.

pub mod auth;
pub mod issuer;
pub mod pairing;

pub use auth::AuthService;
pub use issuer::{AblyIssuer, CapabilityIssuer, MockIssuer};
pub use pairing::{DisconnectOutcome, PairingService};
