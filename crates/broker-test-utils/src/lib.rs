//! # Broker Test Utilities
//!
//! Shared test utilities for the rendezvous broker.
//!
//! This crate provides:
//! - Server test harness (`TestBrokerServer` for E2E tests), backed by the
//!   in-memory `MemoryStore` from the broker crate
//!
//! ## Usage
//!
//! ```rust,ignore
//! use broker_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let server = TestBrokerServer::spawn().await?;
//!     let client = reqwest::Client::new();
//!
//!     let response = client
//!         .get(format!("{}/health", server.url()))
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod server_harness;

// Re-export commonly used items
pub use rendezvous_broker::store::MemoryStore;
pub use server_harness::TestBrokerServer;
