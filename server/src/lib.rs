//! # Arena Relay Server Library
//!
//! Room-scoped relay for a real-time multiplayer arena. Clients simulate their
//! own physics; the server owns no world authority. Its job is to keep every
//! connection in exactly one room and to forward each event only to the
//! connections that share that room.
//!
//! ## Architecture Overview
//!
//! ### Registry (`registry`)
//! Single owner of rooms, members and blocks:
//! - The permanent default room plus admin-created public or private rooms
//! - Join codes for private rooms, unique among active private rooms
//! - Capacity checks at join time and leave-then-join moves
//!
//! ### Router (`router`)
//! Converts an inbound packet from a connection into outbound instructions:
//! - Room broadcasts with or without the sender, and direct notices
//! - Kill confirmation delivered only to the credited killer
//! - Administrative observer snapshots after every membership or world change
//!
//! ### Connection Manager (`client_manager`)
//! Tracks UDP peers, assigns connection ids and detects silent peers.
//!
//! ### Network (`network`)
//! UDP transport and the single-threaded event loop. Snapshots go through a
//! bounded queue and are dropped under backlog; everything else is queued
//! without loss on the server side.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = ServerConfig {
//!         bind_addr: "0.0.0.0:8080".to_string(),
//!         ..ServerConfig::default()
//!     };
//!
//!     let mut server = Server::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! The server runs internal tasks for:
//! - **Network Receiver**: decodes and validates datagrams
//! - **Network Sender**: drains the reliable queue before the snapshot queue
//! - **Timeout Checker**: removes silent connections
//! - **Main Loop**: routes packets and periodically refreshes lobby room lists

pub mod client_manager;
pub mod config;
pub mod error;
pub mod network;
pub mod registry;
pub mod router;
