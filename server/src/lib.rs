//! # Arena Server Library
//!
//! Authoritative server for the vehicle combat arena. The server is the
//! single source of truth for health, score, and player life-cycle; it does
//! not simulate physics. Movement and hit claims are accepted as reported by
//! clients and rebroadcast, which keeps the server cheap and the trust
//! boundary explicit.
//!
//! ## Architecture
//!
//! One logical thread processes all connection and message events to
//! completion before the next is dispatched, so the player and bullet tables
//! need no locking. Around that loop sit three async tasks:
//!
//! - **Network Receiver**: decodes datagrams and forwards them to the loop
//! - **Network Sender**: drains the outgoing queue, handles broadcasts
//! - **Timeout Checker**: evicts clients that have gone silent
//!
//! The main loop additionally runs a fixed-rate tick that expires bullets
//! whose TTL has lapsed and announces each removal to every peer.
//!
//! ## Module Organization
//!
//! - [`clients`]: address/id registry, capacity limit, timeout sweep
//! - [`session`]: the combat resolution state machine and all match state,
//!   producing outbound effects instead of touching sockets
//! - [`network`]: UDP transport, task plumbing, and the main event loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(16),
//!         8,
//!     ).await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod clients;
pub mod network;
pub mod session;
