//! Types and constants shared by the arena relay and its clients

pub mod math;
pub mod model;
pub mod protocol;

pub use math::Vec3;
pub use model::{
    sanitize_username, AdminLogKind, AdminRoomView, AdminSnapshot, AnimState, Block, BlockKind,
    MovementSnapshot, PlayerState, RoomCode, RoomSummary, Visibility,
};
pub use protocol::{decode, encode, Explosion, GrenadeThrow, Packet, ProtocolError, ShotPayload};

/// Transport connection id assigned by the relay
pub type ClientId = u32;

pub const PROTOCOL_VERSION: u32 = 1;

pub const DEFAULT_ROOM_ID: &str = "default";
pub const DEFAULT_ROOM_NAME: &str = "Default Arena";
pub const DEFAULT_ROOM_CAPACITY: usize = 16;

pub const DEFAULT_USERNAME: &str = "Player";
pub const MAX_USERNAME_LEN: usize = 24;
/// Upper bound for any free-text field on the wire
pub const MAX_TEXT_LEN: usize = 64;

/// Characters used for private room join codes
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Largest payload that fits in a single UDP datagram
pub const MAX_PACKET_SIZE: usize = 65_507;

pub const SNAPSHOT_INTERVAL_MS: u64 = 33;
pub const MAX_CHARGE: f32 = 100.0;

pub const BLOCK_SIZE_MIN: f32 = 0.1;
pub const BLOCK_SIZE_MAX: f32 = 3.0;

/// Falling below this height kills the local player
pub const DEATH_HEIGHT: f32 = -15.0;
pub const SPAWN_POSITION: Vec3 = Vec3::new(0.0, 3.0, 0.0);

/// A hit older than this no longer counts toward kill attribution
pub const HIT_MEMORY_SECS: f32 = 5.0;
pub const RESPAWN_COUNTDOWN_SECS: u32 = 5;
