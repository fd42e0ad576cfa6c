//! Rendezvous Broker Library
//!
//! Core functionality for the rendezvous broker - a small control plane
//! that lets two anonymous clients find each other and obtain a private
//! messaging channel:
//!
//! - Session tokens bound to the requesting IP, with per-IP quotas
//! - Permanent-style IP bans for token misuse
//! - Channel pairing between two live endpoints, with capability tokens
//!   minted by an external messaging fabric
//!
//! # Architecture
//!
//! The broker follows the Handler -> Service -> Repository pattern:
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> repositories/*.rs -> store/
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `idgen` - Random identifier generation (endpoints, session ids, channels)
//! - `middleware` - Identity resolution for protected routes
//! - `models` - Data models and response envelopes
//! - `repositories` - Token, ban and channel persistence
//! - `routes` - Axum router setup
//! - `services` - Orchestration and the capability token issuer
//! - `store` - Hash store abstraction and Redis client
//! - `tasks` - Background expiry sweeping

pub mod config;
pub mod errors;
pub mod handlers;
pub mod idgen;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod store;
pub mod tasks;
