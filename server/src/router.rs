//! Broadcast router: turns one inbound packet into room-scoped deliveries
//!
//! The router never touches sockets. Every handler returns a list of
//! [`Outbound`] instructions which the network layer resolves to addresses.
//! [`Router::resolve`] is the only place an audience becomes a recipient list,
//! so room scoping is enforced in one function.

use crate::error::{AdminError, RegistryError};
use crate::registry::{JoinOutcome, PlayerDesc, Registry};
use log::{debug, info, warn};
use shared::{AdminLogKind, ClientId, Packet, DEFAULT_ROOM_ID};
use std::collections::BTreeSet;
use std::net::SocketAddr;

/// Who should receive a packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every member of the room, optionally skipping one
    Room {
        room_id: String,
        exclude: Option<ClientId>,
    },
    Direct(ClientId),
    /// Authenticated dashboard observers
    Admins,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Reliable,
    /// May be dropped under congestion
    Volatile,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Deliver {
        audience: Audience,
        packet: Packet,
        delivery: Delivery,
    },
    /// Forget the connection after anything queued before it
    Drop { client_id: ClientId },
}

impl Outbound {
    fn deliver(audience: Audience, packet: Packet) -> Self {
        let delivery = if packet.is_volatile() {
            Delivery::Volatile
        } else {
            Delivery::Reliable
        };
        Outbound::Deliver {
            audience,
            packet,
            delivery,
        }
    }

    fn room(room_id: &str, exclude: Option<ClientId>, packet: Packet) -> Self {
        Self::deliver(
            Audience::Room {
                room_id: room_id.to_string(),
                exclude,
            },
            packet,
        )
    }

    fn direct(client_id: ClientId, packet: Packet) -> Self {
        Self::deliver(Audience::Direct(client_id), packet)
    }
}

/// Password-gated observer set for the dashboard
struct AdminChannel {
    password: String,
    observers: BTreeSet<ClientId>,
}

impl AdminChannel {
    fn authenticate(&mut self, client_id: ClientId, password: &str) -> Result<(), AdminError> {
        if password != self.password {
            return Err(AdminError::InvalidPassword);
        }
        self.observers.insert(client_id);
        Ok(())
    }

    fn authorize(&self, client_id: ClientId) -> Result<(), AdminError> {
        if self.observers.contains(&client_id) {
            Ok(())
        } else {
            Err(AdminError::Unauthorized)
        }
    }
}

pub struct Router {
    registry: Registry,
    admin: AdminChannel,
}

impl Router {
    pub fn new(registry: Registry, admin_password: &str) -> Self {
        Self {
            registry,
            admin: AdminChannel {
                password: admin_password.to_string(),
                observers: BTreeSet::new(),
            },
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn is_admin(&self, client_id: ClientId) -> bool {
        self.admin.observers.contains(&client_id)
    }

    /// Expands an audience into connection ids
    pub fn resolve(&self, audience: &Audience) -> Vec<ClientId> {
        match audience {
            Audience::Room { room_id, exclude } => self
                .registry
                .members(room_id)
                .into_iter()
                .filter(|id| Some(*id) != *exclude)
                .collect(),
            Audience::Direct(client_id) => vec![*client_id],
            Audience::Admins => self.admin.observers.iter().copied().collect(),
        }
    }

    /// Public listing pushed to connections that sit in the lobby
    pub fn lobby_refresh(&self, connected: &[ClientId]) -> Vec<Outbound> {
        let lobby: Vec<ClientId> = connected
            .iter()
            .copied()
            .filter(|id| self.registry.room_of(*id).is_none() && !self.is_admin(*id))
            .collect();
        if lobby.is_empty() {
            return Vec::new();
        }

        let rooms: Vec<_> = self.registry.list_rooms().collect();
        lobby
            .into_iter()
            .map(|id| {
                Outbound::direct(
                    id,
                    Packet::AvailableRooms {
                        rooms: rooms.clone(),
                    },
                )
            })
            .collect()
    }

    /// Deterministic cleanup for a vanished connection; safe with partial state
    pub fn handle_disconnect(&mut self, client_id: ClientId) -> Vec<Outbound> {
        let mut out = Vec::new();
        if self.admin.observers.remove(&client_id) {
            info!("Admin observer {} disconnected", client_id);
        }

        if let Some(player) = self.registry.remove_player(client_id) {
            out.push(Outbound::room(
                &player.room_id,
                None,
                Packet::DisconnectPlayer {
                    player_id: client_id,
                },
            ));
            self.notify_admins(
                &mut out,
                AdminLogKind::Leave,
                format!(
                    "{} disconnected from {}",
                    player.username, player.room_id
                ),
            );
        }
        out
    }

    pub fn handle_packet(
        &mut self,
        sender: ClientId,
        addr: Option<SocketAddr>,
        packet: Packet,
    ) -> Vec<Outbound> {
        let mut out = Vec::new();

        match packet {
            Packet::RegisterPlayer { username, room_id } => {
                if self.is_admin(sender) {
                    out.push(Outbound::direct(
                        sender,
                        Packet::JoinRoomError {
                            message: "Admin connections cannot join rooms".to_string(),
                        },
                    ));
                    return out;
                }
                let room_id = room_id.unwrap_or_else(|| DEFAULT_ROOM_ID.to_string());
                let desc = player_desc(sender, &username, addr);
                match self.registry.join_room(&room_id, desc) {
                    Ok(outcome) => self.announce_join(&mut out, sender, outcome, false),
                    Err(e) => {
                        debug!("Player {} failed to join {}: {}", sender, room_id, e);
                        out.push(Outbound::direct(
                            sender,
                            Packet::JoinRoomError {
                                message: e.to_string(),
                            },
                        ));
                    }
                }
            }

            Packet::JoinPrivateRoom { code, username } => {
                if self.is_admin(sender) {
                    out.push(Outbound::direct(
                        sender,
                        Packet::PrivateRoomError {
                            message: "Admin connections cannot join rooms".to_string(),
                        },
                    ));
                    return out;
                }
                let desc = player_desc(sender, &username, addr);
                match self.registry.join_by_code(&code, desc) {
                    Ok(outcome) => self.announce_join(&mut out, sender, outcome, true),
                    Err(e) => {
                        debug!("Player {} used bad code {:?}: {}", sender, code, e);
                        out.push(Outbound::direct(
                            sender,
                            Packet::PrivateRoomError {
                                message: e.to_string(),
                            },
                        ));
                    }
                }
            }

            Packet::LeaveRoom { room_id } => {
                if let Some(player) = self.registry.leave_room(&room_id, sender) {
                    out.push(Outbound::room(
                        &room_id,
                        None,
                        Packet::DisconnectPlayer { player_id: sender },
                    ));
                    out.push(self.room_listing(sender));
                    self.notify_admins(
                        &mut out,
                        AdminLogKind::Leave,
                        format!("{} left {}", player.username, room_id),
                    );
                }
            }

            Packet::GetRooms => out.push(self.room_listing(sender)),

            Packet::PlayerMovement(snapshot) => {
                if let Some(room_id) = self.registry.update_snapshot(sender, &snapshot) {
                    out.push(Outbound::room(
                        &room_id,
                        Some(sender),
                        Packet::PlayerMoved {
                            player_id: sender,
                            snapshot,
                        },
                    ));
                }
            }

            Packet::SpawnBlock(block) => {
                if let Some(block) = self.registry.add_block(sender, block) {
                    let room_id = block.room_id.clone();
                    out.push(Outbound::room(
                        &room_id,
                        Some(sender),
                        Packet::BlockSpawned(block),
                    ));
                    self.push_admin_data(&mut out);
                }
            }

            Packet::ClearBlocks => {
                if let Some(room_id) = self.sender_room(sender) {
                    let cleared = self.registry.clear_blocks(&room_id);
                    out.push(Outbound::room(&room_id, None, Packet::ClearBlocks));
                    self.notify_admins(
                        &mut out,
                        AdminLogKind::Action,
                        format!("{} cleared {} blocks in {}", sender, cleared, room_id),
                    );
                }
            }

            Packet::GrenadeExploded(explosion) => {
                // The thrower hears its own explosion too
                self.relay(&mut out, sender, false, |player_id| {
                    Packet::GrenadeExplosion {
                        player_id,
                        explosion,
                    }
                });
            }

            Packet::PlayerDied { killer_id, cause } => {
                self.relay_death(&mut out, sender, killer_id, cause)
            }

            Packet::AdminConnect { password } => {
                self.admin_connect(&mut out, sender, &password)
            }

            Packet::AdminCreateRoom { .. }
            | Packet::AdminDeleteRoom { .. }
            | Packet::AdminKickPlayer { .. }
            | Packet::AdminClearAllBlocks => {
                if let Err(e) = self.admin.authorize(sender) {
                    warn!("Rejected admin command from {}: {}", sender, e);
                    out.push(Outbound::direct(
                        sender,
                        Packet::AdminAuthFailed {
                            message: e.to_string(),
                        },
                    ));
                    return out;
                }
                self.admin_command(&mut out, sender, packet);
            }

            other => {
                if let Some(relayed) = stamp_relay(sender, &other) {
                    self.relay(&mut out, sender, true, |_| relayed);
                } else if !matches!(other, Packet::Heartbeat) {
                    warn!("Unexpected packet from client {}: {:?}", sender, other);
                }
            }
        }

        out
    }

    fn announce_join(
        &mut self,
        out: &mut Vec<Outbound>,
        sender: ClientId,
        outcome: JoinOutcome,
        private: bool,
    ) {
        if let Some(left) = &outcome.left_room {
            out.push(Outbound::room(
                left,
                None,
                Packet::DisconnectPlayer { player_id: sender },
            ));
        }

        out.push(Outbound::direct(
            sender,
            Packet::CurrentPlayers {
                room_id: outcome.room_id.clone(),
                players: outcome.others,
            },
        ));
        out.push(Outbound::direct(
            sender,
            Packet::CurrentBlocks {
                blocks: outcome.blocks,
            },
        ));
        // Arrives after the sync so the client keeps the code
        if private {
            out.push(Outbound::direct(
                sender,
                Packet::PrivateRoomJoined {
                    room_id: outcome.room_id.clone(),
                    name: outcome.room_name.clone(),
                    code: outcome
                        .code
                        .as_ref()
                        .map(|c| c.to_string())
                        .unwrap_or_default(),
                },
            ));
        }
        out.push(Outbound::room(
            &outcome.room_id,
            Some(sender),
            Packet::NewPlayer {
                player: outcome.player.clone(),
            },
        ));

        self.notify_admins(
            out,
            AdminLogKind::Join,
            format!("{} joined {}", outcome.player.username, outcome.room_id),
        );
    }

    fn relay_death(
        &mut self,
        out: &mut Vec<Outbound>,
        sender: ClientId,
        killer_id: Option<ClientId>,
        cause: String,
    ) {
        let Some(victim) = self.registry.player(sender).cloned() else {
            return;
        };

        // Only a connected killer in the victim's room is named or credited
        let killer = killer_id
            .filter(|id| *id != sender)
            .and_then(|id| self.registry.player(id))
            .filter(|k| k.room_id == victim.room_id)
            .cloned();

        out.push(Outbound::room(
            &victim.room_id,
            Some(sender),
            Packet::PeerDied {
                player_id: sender,
                killer_id,
                killer_name: killer.as_ref().map(|k| k.username.clone()),
                cause: cause.clone(),
            },
        ));

        if let Some(killer) = killer {
            out.push(Outbound::direct(
                killer.id,
                Packet::KillConfirmed {
                    victim_id: sender,
                    victim_name: victim.username.clone(),
                },
            ));
            info!("{} eliminated {} ({})", killer.username, victim.username, cause);
        } else {
            info!("{} died ({})", victim.username, cause);
        }
    }

    fn admin_connect(&mut self, out: &mut Vec<Outbound>, sender: ClientId, password: &str) {
        if let Err(e) = self.admin.authenticate(sender, password) {
            warn!("Admin authentication failed for {}", sender);
            out.push(Outbound::direct(
                sender,
                Packet::AdminAuthFailed {
                    message: e.to_string(),
                },
            ));
            return;
        }

        info!("Client {} authenticated as admin observer", sender);
        // Observers are never players
        if let Some(player) = self.registry.remove_player(sender) {
            out.push(Outbound::room(
                &player.room_id,
                None,
                Packet::DisconnectPlayer { player_id: sender },
            ));
        }
        out.push(Outbound::direct(sender, Packet::AdminAuthSuccess));
        out.push(Outbound::direct(
            sender,
            Packet::AdminData(self.registry.admin_snapshot()),
        ));
    }

    fn admin_command(&mut self, out: &mut Vec<Outbound>, sender: ClientId, packet: Packet) {
        match packet {
            Packet::AdminCreateRoom {
                name,
                capacity,
                visibility,
            } => {
                let room = self
                    .registry
                    .create_room(&name, capacity as usize, visibility);
                let message = match room.code() {
                    Some(code) => format!("Created private room {} ({})", room.name(), code),
                    None => format!("Created room {}", room.name()),
                };
                self.notify_admins(out, AdminLogKind::Action, message);
            }

            Packet::AdminDeleteRoom { room_id } => match self.registry.delete_room(&room_id) {
                Ok(room) => {
                    for member in room.member_ids() {
                        out.push(Outbound::direct(
                            member,
                            Packet::RoomClosed {
                                room_id: room_id.clone(),
                            },
                        ));
                    }
                    self.notify_admins(
                        out,
                        AdminLogKind::Action,
                        format!("Deleted room {}", room.name()),
                    );
                }
                Err(e) => out.push(admin_error(sender, &room_id, e)),
            },

            Packet::AdminKickPlayer { player_id } => {
                out.push(Outbound::direct(
                    player_id,
                    Packet::Disconnected {
                        reason: "Kicked by admin".to_string(),
                    },
                ));
                out.extend(self.handle_disconnect(player_id));
                out.push(Outbound::Drop {
                    client_id: player_id,
                });
                self.notify_admins(
                    out,
                    AdminLogKind::Action,
                    format!("Kicked player {}", player_id),
                );
            }

            Packet::AdminClearAllBlocks => {
                let cleared = self.registry.clear_all_blocks();
                let occupied: Vec<String> = self
                    .registry
                    .rooms()
                    .filter(|r| r.player_count() > 0)
                    .map(|r| r.id().to_string())
                    .collect();
                for room_id in occupied {
                    out.push(Outbound::room(&room_id, None, Packet::ClearBlocks));
                }
                self.notify_admins(
                    out,
                    AdminLogKind::Action,
                    format!("Cleared {} blocks across all rooms", cleared),
                );
            }

            _ => {}
        }
    }

    /// Relays a gameplay packet inside the sender's room; dropped if the sender has none
    fn relay<F>(&self, out: &mut Vec<Outbound>, sender: ClientId, skip_sender: bool, build: F)
    where
        F: FnOnce(ClientId) -> Packet,
    {
        match self.sender_room(sender) {
            Some(room_id) => {
                let exclude = skip_sender.then_some(sender);
                out.push(Outbound::room(&room_id, exclude, build(sender)));
            }
            None => debug!("Dropping gameplay packet from roomless client {}", sender),
        }
    }

    fn sender_room(&self, sender: ClientId) -> Option<String> {
        self.registry.room_of(sender).map(str::to_string)
    }

    fn room_listing(&self, client_id: ClientId) -> Outbound {
        Outbound::direct(
            client_id,
            Packet::AvailableRooms {
                rooms: self.registry.list_rooms().collect(),
            },
        )
    }

    fn push_admin_data(&self, out: &mut Vec<Outbound>) {
        if self.admin.observers.is_empty() {
            return;
        }
        out.push(Outbound::deliver(
            Audience::Admins,
            Packet::AdminData(self.registry.admin_snapshot()),
        ));
    }

    /// Snapshot plus log line for observers, queued after player-facing packets
    fn notify_admins(&self, out: &mut Vec<Outbound>, kind: AdminLogKind, message: String) {
        if self.admin.observers.is_empty() {
            return;
        }
        self.push_admin_data(out);
        out.push(Outbound::deliver(
            Audience::Admins,
            Packet::AdminLog { kind, message },
        ));
    }
}

fn player_desc(id: ClientId, username: &str, addr: Option<SocketAddr>) -> PlayerDesc {
    let desc = PlayerDesc::new(id, username);
    match addr {
        Some(addr) => desc.with_addr(addr),
        None => desc,
    }
}

fn admin_error(sender: ClientId, room_id: &str, error: RegistryError) -> Outbound {
    Outbound::direct(
        sender,
        Packet::AdminLog {
            kind: AdminLogKind::Action,
            message: format!("Cannot delete {}: {}", room_id, error),
        },
    )
}

/// Maps client ability and world events to their relayed form
fn stamp_relay(player_id: ClientId, packet: &Packet) -> Option<Packet> {
    let relayed = match packet {
        Packet::BlockHit { block_id, impulse } => Packet::BlockHit {
            block_id: block_id.clone(),
            impulse: *impulse,
        },
        Packet::ShootBall(shot) => Packet::BallShot {
            player_id,
            shot: *shot,
        },
        Packet::ShootUltimate(shot) => Packet::UltimateShot {
            player_id,
            shot: *shot,
        },
        Packet::BatSwing(swing) => Packet::BatSwung {
            player_id,
            swing: *swing,
        },
        Packet::ShootGrenade(throw) => Packet::GrenadeShot {
            player_id,
            throw: *throw,
        },
        Packet::GrappleStart { anchor } => Packet::PlayerGrappleStart {
            player_id,
            anchor: *anchor,
        },
        Packet::GrappleEnd => Packet::PlayerGrappleEnd { player_id },
        Packet::PlayerRespawned { position } => Packet::PeerRespawned {
            player_id,
            position: *position,
        },
        _ => return None,
    };
    Some(relayed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{
        Block, BlockKind, Explosion, MovementSnapshot, ShotPayload, Vec3, Visibility,
        DEFAULT_ROOM_CAPACITY,
    };

    const PASSWORD: &str = "hunter2";

    fn router() -> Router {
        Router::new(Registry::with_seed(DEFAULT_ROOM_CAPACITY, 11), PASSWORD)
    }

    fn join(router: &mut Router, id: ClientId, name: &str, room: Option<&str>) -> Vec<Outbound> {
        router.handle_packet(
            id,
            None,
            Packet::RegisterPlayer {
                username: name.to_string(),
                room_id: room.map(str::to_string),
            },
        )
    }

    /// Flattens outbound instructions into (recipient, packet) pairs
    fn deliveries(router: &Router, out: &[Outbound]) -> Vec<(ClientId, Packet)> {
        out.iter()
            .filter_map(|o| match o {
                Outbound::Deliver {
                    audience, packet, ..
                } => Some((audience, packet)),
                Outbound::Drop { .. } => None,
            })
            .flat_map(|(audience, packet)| {
                router
                    .resolve(audience)
                    .into_iter()
                    .map(move |id| (id, packet.clone()))
            })
            .collect()
    }

    fn shot() -> ShotPayload {
        ShotPayload {
            position: Vec3::new(0.0, 1.0, 0.0),
            direction: Vec3::new(0.0, 0.0, 1.0),
        }
    }

    fn create_room(router: &mut Router, name: &str, visibility: Visibility) -> String {
        router.handle_packet(
            99,
            None,
            Packet::AdminConnect {
                password: PASSWORD.to_string(),
            },
        );
        router.handle_packet(
            99,
            None,
            Packet::AdminCreateRoom {
                name: name.to_string(),
                capacity: 8,
                visibility,
            },
        );
        router
            .registry()
            .rooms()
            .find(|r| r.name() == name)
            .map(|r| r.id().to_string())
            .unwrap()
    }

    #[test]
    fn test_first_join_gets_empty_sync() {
        let mut router = router();
        let out = join(&mut router, 1, "Rex", None);

        let direct: Vec<Packet> = deliveries(&router, &out)
            .into_iter()
            .filter(|(id, _)| *id == 1)
            .map(|(_, p)| p)
            .collect();

        assert!(direct.contains(&Packet::CurrentPlayers {
            room_id: DEFAULT_ROOM_ID.to_string(),
            players: vec![],
        }));
        assert!(direct.contains(&Packet::CurrentBlocks { blocks: vec![] }));

        let new_player = out.iter().find_map(|o| match o {
            Outbound::Deliver {
                audience,
                packet: Packet::NewPlayer { player },
                ..
            } => Some((audience.clone(), player.username.clone())),
            _ => None,
        });
        assert_eq!(
            new_player,
            Some((
                Audience::Room {
                    room_id: DEFAULT_ROOM_ID.to_string(),
                    exclude: Some(1)
                },
                "Rex".to_string()
            ))
        );
    }

    #[test]
    fn test_second_join_notifies_first() {
        let mut router = router();
        join(&mut router, 1, "Rex", None);
        let out = join(&mut router, 2, "Ada", None);

        let sent = deliveries(&router, &out);
        assert!(sent
            .iter()
            .any(|(id, p)| *id == 1 && matches!(p, Packet::NewPlayer { player } if player.id == 2)));
        assert!(sent.iter().any(|(id, p)| *id == 2
            && matches!(p, Packet::CurrentPlayers { players, .. } if players.len() == 1)));
    }

    #[test]
    fn test_join_error_goes_to_sender_only() {
        let mut router = router();
        let out = join(&mut router, 1, "Rex", Some("room_404"));

        assert_eq!(
            out,
            vec![Outbound::Deliver {
                audience: Audience::Direct(1),
                packet: Packet::JoinRoomError {
                    message: "Room not found".to_string()
                },
                delivery: Delivery::Reliable,
            }]
        );
    }

    #[test]
    fn test_movement_never_leaks_across_rooms() {
        let mut router = router();
        let arena = create_room(&mut router, "Arena Two", Visibility::Public);
        join(&mut router, 1, "a", None);
        join(&mut router, 2, "b", None);
        join(&mut router, 3, "c", Some(&arena));

        let out = router.handle_packet(1, None, Packet::PlayerMovement(MovementSnapshot::default()));
        let recipients: Vec<ClientId> = deliveries(&router, &out).into_iter().map(|(id, _)| id).collect();

        assert_eq!(recipients, vec![2]);
        assert!(matches!(
            out[0],
            Outbound::Deliver {
                delivery: Delivery::Volatile,
                ..
            }
        ));
    }

    #[test]
    fn test_roomless_gameplay_is_dropped() {
        let mut router = router();
        join(&mut router, 2, "b", None);

        let out = router.handle_packet(1, None, Packet::ShootBall(shot()));
        assert!(out.is_empty());
        let out = router.handle_packet(1, None, Packet::PlayerMovement(MovementSnapshot::default()));
        assert!(out.is_empty());
    }

    #[test]
    fn test_ability_relay_stamps_sender() {
        let mut router = router();
        join(&mut router, 1, "a", None);
        join(&mut router, 2, "b", None);

        let out = router.handle_packet(1, None, Packet::BatSwing(shot()));
        let sent = deliveries(&router, &out);

        assert_eq!(
            sent,
            vec![(
                2,
                Packet::BatSwung {
                    player_id: 1,
                    swing: shot()
                }
            )]
        );
    }

    #[test]
    fn test_grenade_explosion_includes_thrower() {
        let mut router = router();
        join(&mut router, 1, "a", None);
        join(&mut router, 2, "b", None);

        let explosion = Explosion {
            position: Vec3::new(1.0, 0.0, 1.0),
            size: 0.5,
        };
        let out = router.handle_packet(1, None, Packet::GrenadeExploded(explosion));
        let mut recipients: Vec<ClientId> = deliveries(&router, &out).into_iter().map(|(id, _)| id).collect();
        recipients.sort();

        assert_eq!(recipients, vec![1, 2]);
    }

    #[test]
    fn test_clear_blocks_reaches_whole_room() {
        let mut router = router();
        join(&mut router, 1, "a", None);
        join(&mut router, 2, "b", None);
        router.handle_packet(
            1,
            None,
            Packet::SpawnBlock(Block {
                id: "1_0".to_string(),
                kind: BlockKind::Sphere,
                size: 1.0,
                color: 0,
                position: Vec3::ZERO,
                slimy: false,
                room_id: "spoofed".to_string(),
            }),
        );
        assert_eq!(
            router.registry().room(DEFAULT_ROOM_ID).unwrap().blocks()[0].room_id,
            DEFAULT_ROOM_ID
        );

        let out = router.handle_packet(2, None, Packet::ClearBlocks);
        let mut recipients: Vec<ClientId> = deliveries(&router, &out).into_iter().map(|(id, _)| id).collect();
        recipients.sort();

        assert_eq!(recipients, vec![1, 2]);
        assert!(router.registry().room(DEFAULT_ROOM_ID).unwrap().blocks().is_empty());
    }

    #[test]
    fn test_fall_death_sends_no_kill_confirmation() {
        let mut router = router();
        join(&mut router, 1, "a", None);
        join(&mut router, 2, "b", None);

        let out = router.handle_packet(
            1,
            None,
            Packet::PlayerDied {
                killer_id: None,
                cause: "Fell to Death".to_string(),
            },
        );
        let sent = deliveries(&router, &out);

        assert!(!sent.iter().any(|(_, p)| matches!(p, Packet::KillConfirmed { .. })));
        assert!(sent.iter().any(|(id, p)| *id == 2
            && matches!(p, Packet::PeerDied { killer_id: None, .. })));
    }

    #[test]
    fn test_kill_confirmed_directed_to_killer() {
        let mut router = router();
        join(&mut router, 1, "victim", None);
        join(&mut router, 2, "killer", None);
        join(&mut router, 3, "bystander", None);

        let out = router.handle_packet(
            1,
            None,
            Packet::PlayerDied {
                killer_id: Some(2),
                cause: "Knocked into the void by Ball".to_string(),
            },
        );
        let confirmations: Vec<(ClientId, Packet)> = deliveries(&router, &out)
            .into_iter()
            .filter(|(_, p)| matches!(p, Packet::KillConfirmed { .. }))
            .collect();

        assert_eq!(
            confirmations,
            vec![(
                2,
                Packet::KillConfirmed {
                    victim_id: 1,
                    victim_name: "victim".to_string()
                }
            )]
        );
        let peer_died = deliveries(&router, &out)
            .into_iter()
            .find(|(id, _)| *id == 3)
            .map(|(_, p)| p);
        assert!(matches!(
            peer_died,
            Some(Packet::PeerDied { killer_name: Some(name), .. }) if name == "killer"
        ));
    }

    #[test]
    fn test_kill_confirmed_skips_absent_or_self_killer() {
        let mut router = router();
        join(&mut router, 1, "victim", None);

        for killer in [Some(1), Some(42)] {
            let out = router.handle_packet(
                1,
                None,
                Packet::PlayerDied {
                    killer_id: killer,
                    cause: "Knocked into Void".to_string(),
                },
            );
            assert!(!out.iter().any(|o| matches!(
                o,
                Outbound::Deliver {
                    packet: Packet::KillConfirmed { .. },
                    ..
                }
            )));
        }
    }

    #[test]
    fn test_kill_confirmed_skips_killer_in_other_room() {
        let mut router = router();
        let other = create_room(&mut router, "Elsewhere", Visibility::Public);
        join(&mut router, 1, "victim", None);
        join(&mut router, 2, "killer", Some(&other));
        join(&mut router, 3, "witness", None);

        let out = router.handle_packet(
            1,
            None,
            Packet::PlayerDied {
                killer_id: Some(2),
                cause: "Knocked into Void".to_string(),
            },
        );
        let sent = deliveries(&router, &out);

        assert!(!sent.iter().any(|(id, _)| *id == 2));
        // The other room's player name stays out of this room
        assert!(sent.iter().any(|(id, p)| *id == 3
            && matches!(
                p,
                Packet::PeerDied {
                    player_id: 1,
                    killer_name: None,
                    ..
                }
            )));
    }

    #[test]
    fn test_leave_then_rejoin_other_room() {
        let mut router = router();
        let other = create_room(&mut router, "Other", Visibility::Public);
        join(&mut router, 1, "a", None);
        join(&mut router, 2, "b", None);

        let out = join(&mut router, 1, "a", Some(&other));
        let sent = deliveries(&router, &out);

        assert!(sent
            .iter()
            .any(|(id, p)| *id == 2 && *p == Packet::DisconnectPlayer { player_id: 1 }));
        assert_eq!(router.registry().room_of(1), Some(other.as_str()));
        assert_eq!(router.registry().members(DEFAULT_ROOM_ID), vec![2]);
    }

    #[test]
    fn test_private_join_reports_code() {
        let mut router = router();
        let id = create_room(&mut router, "Secret", Visibility::Private);
        let code = router
            .registry()
            .room(&id)
            .and_then(|r| r.code().cloned())
            .unwrap();

        let out = router.handle_packet(
            5,
            None,
            Packet::JoinPrivateRoom {
                code: code.as_str().to_lowercase(),
                username: "Rex".to_string(),
            },
        );

        assert!(deliveries(&router, &out).iter().any(|(to, p)| *to == 5
            && *p
                == Packet::PrivateRoomJoined {
                    room_id: id.clone(),
                    name: "Secret".to_string(),
                    code: code.to_string(),
                }));
    }

    #[test]
    fn test_bad_code_reports_private_room_error() {
        let mut router = router();
        let out = router.handle_packet(
            5,
            None,
            Packet::JoinPrivateRoom {
                code: "nope".to_string(),
                username: "Rex".to_string(),
            },
        );

        assert_eq!(
            deliveries(&router, &out),
            vec![(
                5,
                Packet::PrivateRoomError {
                    message: "Invalid room code".to_string()
                }
            )]
        );
    }

    #[test]
    fn test_disconnect_cleanup_notifies_room_and_admins() {
        let mut router = router();
        create_room(&mut router, "Spare", Visibility::Public);
        join(&mut router, 1, "a", None);
        join(&mut router, 2, "b", None);

        let out = router.handle_disconnect(1);
        let sent = deliveries(&router, &out);

        assert!(sent
            .iter()
            .any(|(id, p)| *id == 2 && *p == Packet::DisconnectPlayer { player_id: 1 }));
        assert!(sent
            .iter()
            .any(|(id, p)| *id == 99 && matches!(p, Packet::AdminData(_))));
        assert!(sent.iter().any(|(id, p)| *id == 99
            && matches!(p, Packet::AdminLog { kind: AdminLogKind::Leave, .. })));
        // Player-facing delivery precedes the observer snapshot
        let player_pos = sent.iter().position(|(id, _)| *id == 2).unwrap();
        let admin_pos = sent.iter().position(|(id, _)| *id == 99).unwrap();
        assert!(player_pos < admin_pos);

        // Repeating cleanup is harmless
        assert!(router.handle_disconnect(1).is_empty());
    }

    #[test]
    fn test_admin_bad_password_stays_connected() {
        let mut router = router();
        let out = router.handle_packet(
            7,
            None,
            Packet::AdminConnect {
                password: "wrong".to_string(),
            },
        );

        assert_eq!(
            deliveries(&router, &out),
            vec![(
                7,
                Packet::AdminAuthFailed {
                    message: "Invalid password".to_string()
                }
            )]
        );
        assert!(!out.iter().any(|o| matches!(o, Outbound::Drop { .. })));
        assert!(!router.is_admin(7));
    }

    #[test]
    fn test_admin_commands_require_auth() {
        let mut router = router();
        let out = router.handle_packet(7, None, Packet::AdminClearAllBlocks);

        assert_eq!(
            deliveries(&router, &out),
            vec![(
                7,
                Packet::AdminAuthFailed {
                    message: "Unauthorized".to_string()
                }
            )]
        );
    }

    #[test]
    fn test_admin_connect_removes_player_membership() {
        let mut router = router();
        join(&mut router, 1, "a", None);

        router.handle_packet(
            1,
            None,
            Packet::AdminConnect {
                password: PASSWORD.to_string(),
            },
        );

        assert!(router.is_admin(1));
        assert_eq!(router.registry().room_of(1), None);
        let out = join(&mut router, 1, "a", None);
        assert!(matches!(
            deliveries(&router, &out).as_slice(),
            [(1, Packet::JoinRoomError { .. })]
        ));
    }

    #[test]
    fn test_admin_kick_disconnects_target() {
        let mut router = router();
        create_room(&mut router, "Spare", Visibility::Public);
        join(&mut router, 1, "a", None);
        join(&mut router, 2, "b", None);

        let out = router.handle_packet(99, None, Packet::AdminKickPlayer { player_id: 1 });

        assert!(matches!(
            &out[0],
            Outbound::Deliver {
                audience: Audience::Direct(1),
                packet: Packet::Disconnected { .. },
                ..
            }
        ));
        assert!(out.contains(&Outbound::Drop { client_id: 1 }));
        assert_eq!(router.registry().room_of(1), None);
    }

    #[test]
    fn test_admin_delete_room_notifies_orphans() {
        let mut router = router();
        let doomed = create_room(&mut router, "Doomed", Visibility::Public);
        join(&mut router, 1, "a", Some(&doomed));

        let out = router.handle_packet(
            99,
            None,
            Packet::AdminDeleteRoom {
                room_id: doomed.clone(),
            },
        );

        assert!(out.contains(&Outbound::Deliver {
            audience: Audience::Direct(1),
            packet: Packet::RoomClosed { room_id: doomed },
            delivery: Delivery::Reliable,
        }));
        assert_eq!(router.registry().room_of(1), None);
    }

    #[test]
    fn test_admin_cannot_delete_default_room() {
        let mut router = router();
        create_room(&mut router, "Spare", Visibility::Public);

        let out = router.handle_packet(
            99,
            None,
            Packet::AdminDeleteRoom {
                room_id: DEFAULT_ROOM_ID.to_string(),
            },
        );

        assert!(router.registry().room(DEFAULT_ROOM_ID).is_some());
        assert!(matches!(
            deliveries(&router, &out).as_slice(),
            [(99, Packet::AdminLog { .. })]
        ));
    }

    #[test]
    fn test_admin_clear_all_blocks_broadcasts_per_room() {
        let mut router = router();
        let other = create_room(&mut router, "Other", Visibility::Public);
        join(&mut router, 1, "a", None);
        join(&mut router, 2, "b", Some(&other));

        let out = router.handle_packet(99, None, Packet::AdminClearAllBlocks);
        let mut cleared: Vec<ClientId> = deliveries(&router, &out)
            .into_iter()
            .filter(|(_, p)| *p == Packet::ClearBlocks)
            .map(|(id, _)| id)
            .collect();
        cleared.sort();

        assert_eq!(cleared, vec![1, 2]);
    }

    #[test]
    fn test_lobby_refresh_targets_lobby_only() {
        let mut router = router();
        create_room(&mut router, "Spare", Visibility::Public);
        join(&mut router, 1, "a", None);

        let out = router.lobby_refresh(&[1, 2, 99]);
        let recipients: Vec<ClientId> = deliveries(&router, &out).into_iter().map(|(id, _)| id).collect();

        assert_eq!(recipients, vec![2]);
    }
}
