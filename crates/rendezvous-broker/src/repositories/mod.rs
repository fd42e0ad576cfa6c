//! Store-backed repositories.
//!
//! Each entity (session token, ban, channel) is owned exclusively by its
//! repository; no other component mutates store-backed state directly.

pub mod bans;
pub mod channels;
pub mod tokens;

pub use bans::BanRepository;
pub use channels::ChannelRepository;
pub use tokens::TokenRepository;
