//! Background tasks.
//!
//! # Tasks
//!
//! - `expiry_reaper` - Periodically purges expired session tokens and bans

pub mod expiry_reaper;

pub use expiry_reaper::start_expiry_reaper;
