//! Room registry: the single owner of rooms, their members and their blocks
//!
//! All membership and world-object mutation goes through [`Registry`]. A player
//! id is tracked in at most one room at a time; moving between rooms always
//! removes the old membership before inserting the new one.

use crate::error::RegistryError;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    AdminRoomView, AdminSnapshot, Block, ClientId, MovementSnapshot, PlayerState, RoomCode,
    RoomSummary, Visibility, CODE_ALPHABET, DEFAULT_ROOM_ID, DEFAULT_ROOM_NAME,
};
use std::collections::HashMap;
use std::net::SocketAddr;

/// What a client supplies when asking to join a room
#[derive(Debug, Clone)]
pub struct PlayerDesc {
    pub id: ClientId,
    pub username: String,
    pub addr: Option<SocketAddr>,
}

impl PlayerDesc {
    pub fn new(id: ClientId, username: &str) -> Self {
        Self {
            id,
            username: username.to_string(),
            addr: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = Some(addr);
        self
    }
}

/// A named group of players sharing one relay scope
///
/// Holds the members keyed by client id and the blocks built inside the
/// room. Private rooms also carry the join code that admits players;
/// public rooms never have one.
#[derive(Debug)]
pub struct Room {
    id: String,
    name: String,
    capacity: usize,
    visibility: Visibility,
    code: Option<RoomCode>,
    players: HashMap<ClientId, PlayerState>,
    blocks: Vec<Block>,
}

impl Room {
    fn new(id: String, name: &str, capacity: usize, visibility: Visibility) -> Self {
        Self {
            id,
            name: name.to_string(),
            capacity: capacity.max(1),
            visibility,
            code: None,
            players: HashMap::new(),
            blocks: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn code(&self) -> Option<&RoomCode> {
        self.code.as_ref()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn contains(&self, player_id: ClientId) -> bool {
        self.players.contains_key(&player_id)
    }

    pub fn member_ids(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.players.keys().copied()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            player_count: self.players.len() as u32,
            capacity: self.capacity as u32,
            visibility: self.visibility,
        }
    }

    fn sorted_players(&self, except: Option<ClientId>) -> Vec<PlayerState> {
        let mut players: Vec<PlayerState> = self
            .players
            .values()
            .filter(|p| Some(p.id) != except)
            .cloned()
            .collect();
        players.sort_by_key(|p| p.id);
        players
    }

    fn admin_view(&self) -> AdminRoomView {
        AdminRoomView {
            summary: self.summary(),
            code: self.code.as_ref().map(|c| c.to_string()),
            players: self.sorted_players(None),
            block_count: self.blocks.len() as u32,
        }
    }
}

/// Result of a successful join, carrying everything needed for initial sync
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub room_id: String,
    pub room_name: String,
    pub code: Option<RoomCode>,
    pub player: PlayerState,
    /// Members other than the joiner
    pub others: Vec<PlayerState>,
    pub blocks: Vec<Block>,
    /// Room the player was moved out of, if any
    pub left_room: Option<String>,
}

/// Owns every room and the player-to-room index
///
/// The default room is created up front and can never be deleted. Join codes
/// come from the registry's own RNG, which tests seed through
/// [`Registry::with_seed`] for repeatable codes.
pub struct Registry {
    rooms: Vec<Room>,
    player_rooms: HashMap<ClientId, String>,
    next_room_seq: u64,
    rng: StdRng,
}

impl Registry {
    /// Creates a registry holding only the permanent default room
    pub fn new(default_capacity: usize) -> Self {
        Self::with_rng(default_capacity, StdRng::from_entropy())
    }

    /// Deterministic join-code generation for tests
    pub fn with_seed(default_capacity: usize, seed: u64) -> Self {
        Self::with_rng(default_capacity, StdRng::seed_from_u64(seed))
    }

    fn with_rng(default_capacity: usize, rng: StdRng) -> Self {
        let default_room = Room::new(
            DEFAULT_ROOM_ID.to_string(),
            DEFAULT_ROOM_NAME,
            default_capacity,
            Visibility::Public,
        );

        Self {
            rooms: vec![default_room],
            player_rooms: HashMap::new(),
            next_room_seq: 1,
            rng,
        }
    }

    /// Creates an empty room and returns it
    ///
    /// Ids are sequential (`room_1`, `room_2`, ...) and never reused. A private
    /// room gets a fresh join code that no other active private room holds.
    /// Capacity is clamped to at least one seat.
    pub fn create_room(&mut self, name: &str, capacity: usize, visibility: Visibility) -> &Room {
        let id = format!("room_{}", self.next_room_seq);
        self.next_room_seq += 1;

        let mut room = Room::new(id, name, capacity, visibility);
        if visibility == Visibility::Private {
            room.code = Some(self.generate_code());
        }

        info!(
            "Created room {} ({:?}, capacity {}, code {:?})",
            room.id,
            room.visibility,
            room.capacity,
            room.code.as_ref().map(|c| c.as_str())
        );
        self.rooms.push(room);
        let last = self.rooms.len() - 1;
        &self.rooms[last]
    }

    /// Removes a room, returning it so its former members can be notified
    pub fn delete_room(&mut self, room_id: &str) -> Result<Room, RegistryError> {
        if room_id == DEFAULT_ROOM_ID {
            return Err(RegistryError::ProtectedRoom);
        }
        let index = self
            .room_index(room_id)
            .ok_or(RegistryError::RoomNotFound)?;

        let room = self.rooms.remove(index);
        for member in room.players.keys() {
            self.player_rooms.remove(member);
        }
        info!(
            "Deleted room {} ({} members orphaned)",
            room.id,
            room.players.len()
        );
        Ok(room)
    }

    /// Seats a player in a room by id
    ///
    /// A player already in another room is removed from it first, and the
    /// outcome names that room so its members can be told. Joining the room
    /// the player is already in refreshes the username and keeps the seat,
    /// even when the room is full. Fails with `RoomNotFound` or `RoomFull`
    /// without changing any membership.
    pub fn join_room(
        &mut self,
        room_id: &str,
        desc: PlayerDesc,
    ) -> Result<JoinOutcome, RegistryError> {
        let index = self
            .room_index(room_id)
            .ok_or(RegistryError::RoomNotFound)?;

        let already_here = self.player_rooms.get(&desc.id).map(String::as_str) == Some(room_id);
        if !already_here && self.rooms[index].players.len() >= self.rooms[index].capacity {
            return Err(RegistryError::RoomFull);
        }

        // Leave-then-join keeps the single-membership invariant
        let left_room = if already_here {
            None
        } else {
            self.remove_player(desc.id).map(|p| p.room_id)
        };

        let room = &mut self.rooms[index];
        let player = match room.players.get_mut(&desc.id) {
            Some(existing) => {
                existing.username = shared::sanitize_username(&desc.username);
                existing.addr = desc.addr.or(existing.addr);
                existing.clone()
            }
            None => {
                let mut player = PlayerState::new(desc.id, &desc.username, &room.id);
                player.addr = desc.addr;
                room.players.insert(desc.id, player.clone());
                player
            }
        };
        self.player_rooms.insert(desc.id, room.id.clone());

        info!(
            "Player {} ({}) joined room {} [{}/{}]",
            player.id,
            player.username,
            room.id,
            room.players.len(),
            room.capacity
        );

        Ok(JoinOutcome {
            room_id: room.id.clone(),
            room_name: room.name.clone(),
            code: room.code.clone(),
            others: room.sorted_players(Some(desc.id)),
            blocks: room.blocks.clone(),
            player,
            left_room,
        })
    }

    /// Joins the private room whose code matches, ignoring case
    ///
    /// Codes are accepted with or without the dash. Public rooms are never
    /// reachable this way. A malformed or unknown code fails with
    /// `InvalidCode`; otherwise the join behaves exactly like
    /// [`Registry::join_room`].
    ///
    /// ```rust
    /// use server::registry::{PlayerDesc, Registry};
    /// use shared::Visibility;
    ///
    /// let mut registry = Registry::with_seed(16, 42);
    /// let code = registry
    ///     .create_room("Secret", 4, Visibility::Private)
    ///     .code()
    ///     .map(|c| c.as_str().replace('-', "").to_lowercase())
    ///     .unwrap();
    ///
    /// let outcome = registry.join_by_code(&code, PlayerDesc::new(1, "rex")).unwrap();
    /// assert_eq!(outcome.room_name, "Secret");
    /// assert!(registry.join_by_code("ZZZ", PlayerDesc::new(2, "ada")).is_err());
    /// ```
    pub fn join_by_code(
        &mut self,
        code: &str,
        desc: PlayerDesc,
    ) -> Result<JoinOutcome, RegistryError> {
        let code = RoomCode::parse(code).map_err(|_| RegistryError::InvalidCode)?;
        let room_id = self
            .rooms
            .iter()
            .find(|r| r.visibility == Visibility::Private && r.code.as_ref() == Some(&code))
            .map(|r| r.id.clone())
            .ok_or(RegistryError::InvalidCode)?;

        self.join_room(&room_id, desc)
    }

    /// Removes a player from the named room; a no-op if they are not in it
    pub fn leave_room(&mut self, room_id: &str, player_id: ClientId) -> Option<PlayerState> {
        if self.player_rooms.get(&player_id).map(String::as_str) != Some(room_id) {
            return None;
        }
        self.remove_player(player_id)
    }

    /// Removes a player from whatever room they are in
    pub fn remove_player(&mut self, player_id: ClientId) -> Option<PlayerState> {
        let room_id = self.player_rooms.remove(&player_id)?;
        let index = self.room_index(&room_id)?;
        let player = self.rooms[index].players.remove(&player_id)?;
        info!("Player {} left room {}", player_id, room_id);
        Some(player)
    }

    /// Public rooms only, in creation order
    pub fn list_rooms(&self) -> impl Iterator<Item = RoomSummary> + '_ {
        self.rooms
            .iter()
            .filter(|r| r.visibility == Visibility::Public)
            .map(Room::summary)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.iter()
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.iter().find(|r| r.id == room_id)
    }

    pub fn room_of(&self, player_id: ClientId) -> Option<&str> {
        self.player_rooms.get(&player_id).map(String::as_str)
    }

    pub fn player(&self, player_id: ClientId) -> Option<&PlayerState> {
        let room = self.room(self.room_of(player_id)?)?;
        room.players.get(&player_id)
    }

    pub fn members(&self, room_id: &str) -> Vec<ClientId> {
        self.room(room_id)
            .map(|r| r.member_ids().collect())
            .unwrap_or_default()
    }

    pub fn player_count(&self) -> usize {
        self.player_rooms.len()
    }

    /// Records the latest snapshot and returns the player's room
    pub fn update_snapshot(
        &mut self,
        player_id: ClientId,
        snapshot: &MovementSnapshot,
    ) -> Option<String> {
        let room_id = self.player_rooms.get(&player_id)?.clone();
        let index = self.room_index(&room_id)?;
        let player = self.rooms[index].players.get_mut(&player_id)?;
        player.apply_snapshot(snapshot);
        Some(room_id)
    }

    /// Stores a block in the builder's room, stamping the owning room id
    pub fn add_block(&mut self, player_id: ClientId, mut block: Block) -> Option<Block> {
        let room_id = self.player_rooms.get(&player_id)?.clone();
        let index = self.room_index(&room_id)?;
        block.room_id = room_id;
        self.rooms[index].blocks.push(block.clone());
        debug!("Block {} spawned in {}", block.id, block.room_id);
        Some(block)
    }

    pub fn clear_blocks(&mut self, room_id: &str) -> usize {
        match self.room_index(room_id) {
            Some(index) => {
                let cleared = self.rooms[index].blocks.len();
                self.rooms[index].blocks.clear();
                cleared
            }
            None => 0,
        }
    }

    pub fn clear_all_blocks(&mut self) -> usize {
        self.rooms
            .iter_mut()
            .map(|room| {
                let cleared = room.blocks.len();
                room.blocks.clear();
                cleared
            })
            .sum()
    }

    pub fn admin_snapshot(&self) -> AdminSnapshot {
        AdminSnapshot {
            rooms: self.rooms.iter().map(Room::admin_view).collect(),
            total_players: self.player_rooms.len() as u32,
        }
    }

    fn room_index(&self, room_id: &str) -> Option<usize> {
        self.rooms.iter().position(|r| r.id == room_id)
    }

    fn generate_code(&mut self) -> RoomCode {
        loop {
            let raw: String = (0..6)
                .map(|_| CODE_ALPHABET[self.rng.gen_range(0..CODE_ALPHABET.len())] as char)
                .collect();

            let Ok(code) = RoomCode::parse(&raw) else {
                continue;
            };
            let taken = self
                .rooms
                .iter()
                .any(|r| r.visibility == Visibility::Private && r.code.as_ref() == Some(&code));
            if !taken {
                return code;
            }
            debug!("Join code {} collided, regenerating", code);
        }
    }
}
