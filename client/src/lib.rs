//! # Arena Relay Client
//!
//! Client side of the arena relay. The relay server only forwards packets
//! between players in a room, so every gameplay rule runs here: movement,
//! abilities, hit reactions, death attribution and respawn.
//!
//! ## Modules
//!
//! - `game`: the session state machine and per-frame driver
//! - `abilities`: charged shots, bat swings, grappling hook, balls and blocks
//! - `replica`: smoothed remote players built from movement snapshots
//! - `death`: kill attribution and the respawn countdown
//! - `scheduler`: frame-clock timers used by everything above
//! - `world`: the physics/visual interface, plus a simple arena implementation
//! - `network`: UDP transport on its own thread
//! - `input` / `rendering`: macroquad keyboard sampling and a top-down view
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::game::{ClientGame, JoinRequest};
//! use client::network::{NetworkConfig, NetworkHandle};
//! use client::world::ArenaWorld;
//! use shared::SPAWN_POSITION;
//!
//! let mut network = NetworkHandle::spawn(NetworkConfig::default()).unwrap();
//! let mut game = ClientGame::new(ArenaWorld::new(SPAWN_POSITION), "alice", JoinRequest::Room(None));
//!
//! loop {
//!     while let Some(packet) = network.try_recv() {
//!         game.handle_packet(packet);
//!     }
//!     game.frame(1.0 / 60.0);
//!     for packet in game.drain_outbox() {
//!         network.send(packet);
//!     }
//! }
//! ```

pub mod abilities;
pub mod death;
pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
pub mod replica;
pub mod scheduler;
pub mod world;
