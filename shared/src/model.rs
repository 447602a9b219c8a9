//! Room-level data carried between the relay and clients

use crate::math::Vec3;
use crate::{ClientId, ProtocolError, CODE_ALPHABET, DEFAULT_USERNAME, MAX_USERNAME_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Coarse animation state replicated on every movement snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AnimState {
    #[default]
    Idle,
    Shooting,
    Building,
    Charging,
    Grappling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlockKind {
    #[default]
    Box,
    Sphere,
    Cylinder,
    Capsule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
}

/// Throttled per-player state snapshot
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MovementSnapshot {
    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: f32,
    pub anim: AnimState,
    /// Ultimate charge, 0..=100
    pub charge_level: f32,
    /// Grenade charge, 0..=100
    pub grenade_charge_level: f32,
}

/// A room member as known to the relay and mirrored by peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: ClientId,
    pub username: String,
    pub position: Vec3,
    pub rotation: f32,
    pub velocity: Vec3,
    pub anim: AnimState,
    pub charge_level: f32,
    pub grenade_charge_level: f32,
    pub room_id: String,
    /// Diagnostic only, never sent over the wire
    #[serde(skip)]
    pub addr: Option<SocketAddr>,
}

impl PlayerState {
    pub fn new(id: ClientId, username: &str, room_id: &str) -> Self {
        Self {
            id,
            username: sanitize_username(username),
            position: crate::SPAWN_POSITION,
            rotation: 0.0,
            velocity: Vec3::ZERO,
            anim: AnimState::Idle,
            charge_level: 0.0,
            grenade_charge_level: 0.0,
            room_id: room_id.to_string(),
            addr: None,
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: &MovementSnapshot) {
        self.position = snapshot.position;
        self.velocity = snapshot.velocity;
        self.rotation = snapshot.rotation;
        self.anim = snapshot.anim;
        self.charge_level = snapshot.charge_level;
        self.grenade_charge_level = snapshot.grenade_charge_level;
    }

    pub fn snapshot(&self) -> MovementSnapshot {
        MovementSnapshot {
            position: self.position,
            velocity: self.velocity,
            rotation: self.rotation,
            anim: self.anim,
            charge_level: self.charge_level,
            grenade_charge_level: self.grenade_charge_level,
        }
    }
}

/// Trims a requested display name, falling back to the default and capping its length
pub fn sanitize_username(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DEFAULT_USERNAME.to_string();
    }
    trimmed.chars().take(MAX_USERNAME_LEN).collect()
}

/// Player-built world object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub kind: BlockKind,
    pub size: f32,
    /// Packed 0xRRGGBB
    pub color: u32,
    pub position: Vec3,
    pub slimy: bool,
    /// Stamped by the relay, ignored when sent by a client
    pub room_id: String,
}

/// Lobby listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub player_count: u32,
    pub capacity: u32,
    pub visibility: Visibility,
}

/// Six-character private room join code, stored upper-case as `XXX-XXX`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomCode(String);

impl RoomCode {
    /// Normalizes user input: case-insensitive, hyphen and surrounding whitespace optional.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let chars: Vec<char> = raw
            .trim()
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        let valid = chars.len() == 6
            && chars
                .iter()
                .all(|c| c.is_ascii() && CODE_ALPHABET.contains(&(*c as u8)));
        if !valid {
            return Err(ProtocolError::MalformedCode(raw.to_string()));
        }

        let (head, tail) = chars.split_at(3);
        Ok(Self(format!(
            "{}-{}",
            head.iter().collect::<String>(),
            tail.iter().collect::<String>()
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One room as shown on the administrative dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminRoomView {
    pub summary: RoomSummary,
    pub code: Option<String>,
    pub players: Vec<PlayerState>,
    pub block_count: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdminSnapshot {
    pub rooms: Vec<AdminRoomView>,
    pub total_players: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminLogKind {
    Join,
    Leave,
    Action,
}
