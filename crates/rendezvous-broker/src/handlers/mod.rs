//! HTTP handlers.

pub mod auth;
pub mod channels;
pub mod health;
