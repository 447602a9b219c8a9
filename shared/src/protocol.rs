//! Wire protocol shared by the relay and clients
//!
//! Every datagram carries exactly one bincode-encoded [`Packet`]. Packets are
//! validated right after decoding so malformed payloads never reach room state.

use crate::math::Vec3;
use crate::model::{
    AdminLogKind, AdminSnapshot, Block, MovementSnapshot, PlayerState, RoomSummary, Visibility,
};
use crate::{ClientId, MAX_CHARGE, MAX_PACKET_SIZE, MAX_TEXT_LEN};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f32 },
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("malformed room code {0:?}")]
    MalformedCode(String),
    #[error("datagram of {0} bytes exceeds the packet limit")]
    Oversized(usize),
    #[error("codec failure: {0}")]
    Codec(#[from] bincode::Error),
}

/// Origin and aim of a fired or swung attack
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShotPayload {
    pub position: Vec3,
    pub direction: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrenadeThrow {
    pub position: Vec3,
    pub direction: Vec3,
    /// Visual radius of the thrown grenade
    pub size: f32,
    /// Fraction of full charge at release, 0..=1
    pub charge: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Explosion {
    pub position: Vec3,
    pub size: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Connection lifecycle
    Connect {
        client_version: u32,
    },
    Connected {
        client_id: ClientId,
    },
    Disconnect,
    Disconnected {
        reason: String,
    },
    Heartbeat,

    // Lobby requests
    RegisterPlayer {
        username: String,
        room_id: Option<String>,
    },
    JoinPrivateRoom {
        code: String,
        username: String,
    },
    LeaveRoom {
        room_id: String,
    },
    GetRooms,

    // Lobby responses and membership
    AvailableRooms {
        rooms: Vec<RoomSummary>,
    },
    CurrentPlayers {
        room_id: String,
        players: Vec<PlayerState>,
    },
    CurrentBlocks {
        blocks: Vec<Block>,
    },
    PrivateRoomJoined {
        room_id: String,
        name: String,
        code: String,
    },
    JoinRoomError {
        message: String,
    },
    PrivateRoomError {
        message: String,
    },
    RoomClosed {
        room_id: String,
    },
    NewPlayer {
        player: PlayerState,
    },
    DisconnectPlayer {
        player_id: ClientId,
    },

    // Motion
    PlayerMovement(MovementSnapshot),
    PlayerMoved {
        player_id: ClientId,
        snapshot: MovementSnapshot,
    },

    // World objects; BlockHit and ClearBlocks travel in both directions
    SpawnBlock(Block),
    BlockSpawned(Block),
    BlockHit {
        block_id: String,
        impulse: Vec3,
    },
    ClearBlocks,

    // Abilities
    ShootBall(ShotPayload),
    BallShot {
        player_id: ClientId,
        shot: ShotPayload,
    },
    ShootUltimate(ShotPayload),
    UltimateShot {
        player_id: ClientId,
        shot: ShotPayload,
    },
    BatSwing(ShotPayload),
    BatSwung {
        player_id: ClientId,
        swing: ShotPayload,
    },
    ShootGrenade(GrenadeThrow),
    GrenadeShot {
        player_id: ClientId,
        throw: GrenadeThrow,
    },
    GrenadeExploded(Explosion),
    GrenadeExplosion {
        player_id: ClientId,
        explosion: Explosion,
    },
    GrappleStart {
        anchor: Vec3,
    },
    PlayerGrappleStart {
        player_id: ClientId,
        anchor: Vec3,
    },
    GrappleEnd,
    PlayerGrappleEnd {
        player_id: ClientId,
    },

    // Death and respawn
    PlayerDied {
        killer_id: Option<ClientId>,
        cause: String,
    },
    PeerDied {
        player_id: ClientId,
        killer_id: Option<ClientId>,
        killer_name: Option<String>,
        cause: String,
    },
    PlayerRespawned {
        position: Vec3,
    },
    PeerRespawned {
        player_id: ClientId,
        position: Vec3,
    },
    KillConfirmed {
        victim_id: ClientId,
        victim_name: String,
    },

    // Administrative observer channel
    AdminConnect {
        password: String,
    },
    AdminAuthSuccess,
    AdminAuthFailed {
        message: String,
    },
    AdminCreateRoom {
        name: String,
        capacity: u32,
        visibility: Visibility,
    },
    AdminDeleteRoom {
        room_id: String,
    },
    AdminKickPlayer {
        player_id: ClientId,
    },
    AdminClearAllBlocks,
    AdminData(AdminSnapshot),
    AdminLog {
        kind: AdminLogKind,
        message: String,
    },
}

impl Packet {
    /// Snapshots may be dropped or arrive out of order without consequence
    pub fn is_volatile(&self) -> bool {
        matches!(self, Packet::PlayerMovement(_) | Packet::PlayerMoved { .. })
    }

    /// Rejects payloads that must never reach shared state
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Packet::RegisterPlayer { username, room_id } => {
                check_text("username", username, MAX_TEXT_LEN)?;
                if let Some(room_id) = room_id {
                    check_text("room_id", room_id, MAX_TEXT_LEN)?;
                }
                Ok(())
            }
            Packet::JoinPrivateRoom { code, username } => {
                check_text("code", code, MAX_TEXT_LEN)?;
                check_text("username", username, MAX_TEXT_LEN)
            }
            Packet::LeaveRoom { room_id } | Packet::AdminDeleteRoom { room_id } => {
                check_text("room_id", room_id, MAX_TEXT_LEN)
            }
            Packet::PlayerMovement(snapshot) | Packet::PlayerMoved { snapshot, .. } => {
                check_snapshot(snapshot)
            }
            Packet::SpawnBlock(block) | Packet::BlockSpawned(block) => check_block(block),
            Packet::BlockHit { block_id, impulse } => {
                check_text("block_id", block_id, MAX_TEXT_LEN)?;
                check_vec("impulse", *impulse)
            }
            Packet::ShootBall(shot)
            | Packet::ShootUltimate(shot)
            | Packet::BatSwing(shot)
            | Packet::BallShot { shot, .. }
            | Packet::UltimateShot { shot, .. }
            | Packet::BatSwung { swing: shot, .. } => check_shot(shot),
            Packet::ShootGrenade(throw) | Packet::GrenadeShot { throw, .. } => {
                check_shot(&ShotPayload {
                    position: throw.position,
                    direction: throw.direction,
                })?;
                check_range("size", throw.size, 0.0, 10.0)?;
                check_range("charge", throw.charge, 0.0, 1.0)
            }
            Packet::GrenadeExploded(explosion) | Packet::GrenadeExplosion { explosion, .. } => {
                check_vec("position", explosion.position)?;
                check_range("size", explosion.size, 0.0, 10.0)
            }
            Packet::GrappleStart { anchor } | Packet::PlayerGrappleStart { anchor, .. } => {
                check_vec("anchor", *anchor)
            }
            Packet::PlayerDied { cause, .. } | Packet::PeerDied { cause, .. } => {
                check_text("cause", cause, MAX_TEXT_LEN)
            }
            Packet::PlayerRespawned { position } | Packet::PeerRespawned { position, .. } => {
                check_vec("position", *position)
            }
            Packet::AdminConnect { password } => check_text("password", password, MAX_TEXT_LEN),
            Packet::AdminCreateRoom { name, .. } => check_text("name", name, MAX_TEXT_LEN),
            _ => Ok(()),
        }
    }
}

fn check_text(field: &'static str, value: &str, max: usize) -> Result<(), ProtocolError> {
    if value.chars().count() > max {
        return Err(ProtocolError::TooLong { field, max });
    }
    Ok(())
}

fn check_vec(field: &'static str, value: Vec3) -> Result<(), ProtocolError> {
    if !value.is_finite() {
        return Err(ProtocolError::NonFinite(field));
    }
    Ok(())
}

fn check_range(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), ProtocolError> {
    if !value.is_finite() {
        return Err(ProtocolError::NonFinite(field));
    }
    if value < min || value > max {
        return Err(ProtocolError::OutOfRange { field, value });
    }
    Ok(())
}

fn check_snapshot(snapshot: &MovementSnapshot) -> Result<(), ProtocolError> {
    check_vec("position", snapshot.position)?;
    check_vec("velocity", snapshot.velocity)?;
    if !snapshot.rotation.is_finite() {
        return Err(ProtocolError::NonFinite("rotation"));
    }
    check_range("charge_level", snapshot.charge_level, 0.0, MAX_CHARGE)?;
    check_range(
        "grenade_charge_level",
        snapshot.grenade_charge_level,
        0.0,
        MAX_CHARGE,
    )
}

fn check_shot(shot: &ShotPayload) -> Result<(), ProtocolError> {
    check_vec("position", shot.position)?;
    check_vec("direction", shot.direction)
}

fn check_block(block: &Block) -> Result<(), ProtocolError> {
    check_text("block_id", &block.id, MAX_TEXT_LEN)?;
    check_vec("position", block.position)?;
    check_range(
        "size",
        block.size,
        crate::BLOCK_SIZE_MIN,
        crate::BLOCK_SIZE_MAX,
    )
}

/// Serializes a packet into a single datagram
pub fn encode(packet: &Packet) -> Result<Vec<u8>, ProtocolError> {
    let bytes = bincode::serialize(packet)?;
    if bytes.len() > MAX_PACKET_SIZE {
        return Err(ProtocolError::Oversized(bytes.len()));
    }
    Ok(bytes)
}

/// Deserializes and validates a received datagram
pub fn decode(bytes: &[u8]) -> Result<Packet, ProtocolError> {
    if bytes.len() > MAX_PACKET_SIZE {
        return Err(ProtocolError::Oversized(bytes.len()));
    }
    let packet: Packet = bincode::deserialize(bytes)?;
    packet.validate()?;
    Ok(packet)
}
