//! Client-side game session
//!
//! `ClientGame` is driven from one loop: inbound packets go through
//! [`ClientGame::handle_packet`], player intent through
//! [`ClientGame::apply_command`] and time through [`ClientGame::frame`].
//! Everything destined for the relay collects in an outbox that the transport
//! drains after each frame.

use crate::abilities::{self, bat, AbilitySet, BlockTemplate};
use crate::death::{
    DeathCoordinator, DeathTrigger, CAUSE_BALL, CAUSE_BAT, CAUSE_GRENADE, CAUSE_ULTIMATE,
};
use crate::replica::ReplicaSet;
use crate::scheduler::{Scheduler, TimerId};
use crate::world::{Contact, ProjectileKind, ProjectileSpawn, VisualId, VisualKind, World};
use log::{debug, info, warn};
use shared::{
    ClientId, Explosion, MovementSnapshot, Packet, RoomSummary, Vec3, PROTOCOL_VERSION,
    SNAPSHOT_INTERVAL_MS, SPAWN_POSITION,
};

pub const MOVE_SPEED: f32 = 6.0;
pub const JUMP_IMPULSE: f32 = 10.0;
pub const JUMP_COOLDOWN_SECS: f32 = 0.5;
/// Ground probe length below the body centre for jumping
pub const GROUND_PROBE: f32 = 1.1;
pub const LOOK_PITCH_LIMIT: f32 = 1.4;

pub const BALL_KNOCKBACK: f32 = 3.0;
pub const BALL_LIFT: f32 = 0.5;
/// Blast reach per unit of grenade size
pub const BLAST_RADIUS_PER_SIZE: f32 = 8.0;
pub const BLAST_IMPULSE: f32 = 15.0;
pub const EXPLOSION_VISUAL_SECS: f32 = 0.5;
pub const KILL_BANNER_SECS: f32 = 2.0;

/// Everything the client schedules on its frame clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    BatFrame,
    BatCooldown,
    GrappleTimeout,
    GrappleCooldown,
    BallCooldown,
    BuildCooldown,
    ActionAnimEnd,
    JumpCooldown,
    RespawnTick,
    KillBannerExpired,
    VisualExpired(VisualId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Session {
    Connecting,
    Lobby,
    InRoom { room_id: String },
    Closed { reason: String },
}

/// Room to enter once the connection is up
#[derive(Debug, Clone, PartialEq)]
pub enum JoinRequest {
    /// A public room by id, or the default room
    Room(Option<String>),
    /// A private room by join code
    Code(String),
    /// Stay in the lobby
    None,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputCommand {
    /// Both axes in -1..=1
    Move { forward: f32, strafe: f32 },
    Look { yaw_delta: f32, pitch_delta: f32 },
    Jump,
    UltimatePressed,
    UltimateReleased,
    GrenadePressed,
    GrenadeReleased,
    SwingBat,
    GrapplePressed,
    GrappleReleased,
    ShootBall,
    BuildBlock,
    ClearBlocks,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KillBanner {
    pub victim_name: String,
    timer: TimerId,
}

pub struct ClientGame<W: World> {
    world: W,
    scheduler: Scheduler<TimerEvent>,
    session: Session,
    client_id: Option<ClientId>,
    username: String,
    join_request: JoinRequest,

    room_name: Option<String>,
    room_code: Option<String>,
    available_rooms: Vec<RoomSummary>,
    last_error: Option<String>,

    replicas: ReplicaSet,
    abilities: AbilitySet,
    deaths: DeathCoordinator,
    block_template: BlockTemplate,

    yaw: f32,
    pitch: f32,
    move_input: (f32, f32),
    jump_ready: bool,
    snapshot_elapsed: f32,

    kill_banner: Option<KillBanner>,
    outbox: Vec<Packet>,
}

impl<W: World> ClientGame<W> {
    /// Starts in `Connecting` with the handshake already queued
    pub fn new(world: W, username: &str, join_request: JoinRequest) -> Self {
        Self {
            world,
            scheduler: Scheduler::new(),
            session: Session::Connecting,
            client_id: None,
            username: shared::sanitize_username(username),
            join_request,
            room_name: None,
            room_code: None,
            available_rooms: Vec::new(),
            last_error: None,
            replicas: ReplicaSet::new(),
            abilities: AbilitySet::new(),
            deaths: DeathCoordinator::new(),
            block_template: BlockTemplate::default(),
            yaw: 0.0,
            pitch: 0.0,
            move_input: (0.0, 0.0),
            jump_ready: true,
            snapshot_elapsed: 0.0,
            kill_banner: None,
            outbox: vec![Packet::Connect {
                client_version: PROTOCOL_VERSION,
            }],
        }
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn room_name(&self) -> Option<&str> {
        self.room_name.as_deref()
    }

    pub fn room_code(&self) -> Option<&str> {
        self.room_code.as_deref()
    }

    pub fn available_rooms(&self) -> &[RoomSummary] {
        &self.available_rooms
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn replicas(&self) -> &ReplicaSet {
        &self.replicas
    }

    pub fn abilities(&self) -> &AbilitySet {
        &self.abilities
    }

    pub fn deaths(&self) -> &DeathCoordinator {
        &self.deaths
    }

    pub fn kill_banner(&self) -> Option<&KillBanner> {
        self.kill_banner.as_ref()
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn aim(&self) -> Vec3 {
        Vec3::from_yaw_pitch(self.yaw, self.pitch)
    }

    pub fn set_block_template(&mut self, template: BlockTemplate) {
        self.block_template = template;
    }

    pub fn in_room(&self) -> bool {
        matches!(self.session, Session::InRoom { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.session, Session::Closed { .. })
    }

    /// Packets queued for the relay since the last drain
    pub fn drain_outbox(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.outbox)
    }

    fn send(&mut self, packet: Packet) {
        self.outbox.push(packet);
    }

    fn send_all(&mut self, packets: impl IntoIterator<Item = Packet>) {
        self.outbox.extend(packets);
    }

    /// Asks to enter a room; the session changes once the relay answers
    pub fn join(&mut self, request: JoinRequest) {
        let username = self.username.clone();
        match request {
            JoinRequest::Room(room_id) => self.send(Packet::RegisterPlayer { username, room_id }),
            JoinRequest::Code(code) => self.send(Packet::JoinPrivateRoom { code, username }),
            JoinRequest::None => self.send(Packet::GetRooms),
        }
    }

    pub fn leave_room(&mut self) {
        if let Session::InRoom { room_id } = self.session.clone() {
            self.send(Packet::LeaveRoom { room_id });
            self.return_to_lobby();
        }
    }

    pub fn disconnect(&mut self) {
        self.send(Packet::Disconnect);
        self.session = Session::Closed {
            reason: "Disconnected".to_string(),
        };
    }

    fn return_to_lobby(&mut self) {
        let teardown = self.abilities.cancel_all(&mut self.scheduler, &mut self.world);
        debug!("Dropping {} ability packets on room exit", teardown.len());
        self.deaths.reset(&mut self.scheduler);
        self.replicas.clear(&mut self.world);
        self.world.clear_blocks();
        self.room_name = None;
        self.room_code = None;
        self.session = Session::Lobby;
        self.send(Packet::GetRooms);
    }

    pub fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected { client_id } => {
                info!("Connected as client {}", client_id);
                self.client_id = Some(client_id);
                self.world.set_local_id(client_id);
                self.session = Session::Lobby;
                let request = std::mem::replace(&mut self.join_request, JoinRequest::None);
                self.join(request);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.session = Session::Closed { reason };
            }

            Packet::AvailableRooms { rooms } => {
                self.available_rooms = rooms;
            }

            Packet::CurrentPlayers { room_id, players } => {
                info!("Joined room {} with {} other players", room_id, players.len());
                self.replicas.clear(&mut self.world);
                for player in players.iter().filter(|p| Some(p.id) != self.client_id) {
                    self.replicas.insert(player);
                }
                let teardown = self.abilities.cancel_all(&mut self.scheduler, &mut self.world);
                debug!("Dropping {} ability packets on room change", teardown.len());
                self.deaths.reset(&mut self.scheduler);
                self.world.teleport_body(SPAWN_POSITION);
                self.last_error = None;
                self.room_name = self
                    .available_rooms
                    .iter()
                    .find(|r| r.id == room_id)
                    .map(|r| r.name.clone())
                    .or_else(|| Some(room_id.clone()));
                self.room_code = None;
                self.session = Session::InRoom { room_id };
            }

            Packet::CurrentBlocks { blocks } => {
                self.world.clear_blocks();
                for block in &blocks {
                    self.world.spawn_block(block);
                }
            }

            Packet::PrivateRoomJoined {
                room_id,
                name,
                code,
            } => {
                info!("Joined private room {} ({}) with code {}", name, room_id, code);
                self.room_name = Some(name);
                self.room_code = Some(code);
            }

            Packet::JoinRoomError { message } | Packet::PrivateRoomError { message } => {
                warn!("Join failed: {}", message);
                self.last_error = Some(message);
                if !self.in_room() {
                    self.session = Session::Lobby;
                    self.send(Packet::GetRooms);
                }
            }

            Packet::RoomClosed { room_id } => {
                if self.session == (Session::InRoom { room_id }) {
                    info!("Room closed, back to lobby");
                    self.last_error = Some("Room closed".to_string());
                    self.return_to_lobby();
                }
            }

            Packet::NewPlayer { player } => {
                if Some(player.id) != self.client_id {
                    info!("{} joined", player.username);
                    self.replicas.insert(&player);
                }
            }

            Packet::DisconnectPlayer { player_id } => {
                if let Some(replica) = self.replicas.remove(&mut self.world, player_id) {
                    info!("{} left", replica.username);
                }
            }

            Packet::PlayerMoved {
                player_id,
                snapshot,
            } => {
                self.replicas.apply_snapshot(player_id, &snapshot);
            }

            Packet::BlockSpawned(block) => self.world.spawn_block(&block),
            Packet::BlockHit { block_id, impulse } => self.world.push_block(&block_id, impulse),
            Packet::ClearBlocks => self.world.clear_blocks(),

            Packet::BallShot { player_id, shot } => {
                self.world.spawn_projectile(ProjectileSpawn {
                    kind: ProjectileKind::Ball,
                    owner: player_id,
                    position: shot.position,
                    impulse: shot.direction * abilities::BALL_IMPULSE,
                    mass: abilities::BALL_MASS,
                    size: abilities::BALL_SIZE,
                });
            }

            Packet::UltimateShot { player_id, shot } => {
                self.world.spawn_projectile(ProjectileSpawn {
                    kind: ProjectileKind::Ultimate,
                    owner: player_id,
                    position: shot.position,
                    impulse: shot.direction * abilities::ULTIMATE_IMPULSE,
                    mass: abilities::ULTIMATE_MASS,
                    size: abilities::charge::ULTIMATE.max_size,
                });
            }

            Packet::GrenadeShot { player_id, throw } => {
                self.world.spawn_projectile(ProjectileSpawn {
                    kind: ProjectileKind::Grenade,
                    owner: player_id,
                    position: throw.position,
                    impulse: throw.direction * (abilities::GRENADE_IMPULSE * throw.charge),
                    mass: 2.0 * throw.charge,
                    size: throw.size,
                });
            }

            Packet::BatSwung { player_id, swing } => self.on_bat_swung(player_id, swing.position),

            Packet::GrenadeExplosion {
                player_id,
                explosion,
            } => self.on_explosion(player_id, explosion),

            Packet::PlayerGrappleStart { player_id, anchor } => {
                self.replicas
                    .grapple_started(&mut self.world, player_id, anchor);
            }

            Packet::PlayerGrappleEnd { player_id } => {
                self.replicas.grapple_ended(&mut self.world, player_id);
            }

            Packet::PeerDied {
                player_id,
                killer_name,
                cause,
                ..
            } => {
                match killer_name {
                    Some(killer) => info!("Player {} died: {} ({})", player_id, cause, killer),
                    None => info!("Player {} died: {}", player_id, cause),
                }
                self.replicas.hide(&mut self.world, player_id);
            }

            Packet::PeerRespawned {
                player_id,
                position,
            } => self.replicas.reveal(player_id, position),

            Packet::KillConfirmed { victim_name, .. } => {
                info!("Eliminated {}", victim_name);
                if let Some(old) = self.kill_banner.take() {
                    self.scheduler.cancel(old.timer);
                }
                let timer = self
                    .scheduler
                    .once(KILL_BANNER_SECS, TimerEvent::KillBannerExpired);
                self.kill_banner = Some(KillBanner { victim_name, timer });
            }

            Packet::AdminAuthFailed { message } => warn!("Admin channel: {}", message),

            other => warn!("Unexpected packet: {:?}", other),
        }
    }

    fn on_bat_swung(&mut self, attacker: ClientId, origin: Vec3) {
        if !self.in_room() || self.deaths.is_dead() {
            return;
        }
        if let Some(impulse) = bat::victim_impulse(origin, self.world.body_position()) {
            self.world.apply_impulse(impulse);
            self.take_hit(attacker, CAUSE_BAT);
        }
    }

    fn on_explosion(&mut self, thrower: ClientId, explosion: Explosion) {
        let visual = self
            .world
            .spawn_visual(VisualKind::Explosion, explosion.position, explosion.size);
        self.scheduler
            .once(EXPLOSION_VISUAL_SECS, TimerEvent::VisualExpired(visual));

        if !self.in_room() || self.deaths.is_dead() {
            return;
        }

        let body = self.world.body_position();
        if body.distance(explosion.position) >= explosion.size * BLAST_RADIUS_PER_SIZE {
            return;
        }

        self.world
            .apply_impulse((body - explosion.position).normalize() * BLAST_IMPULSE);
        if Some(thrower) != self.client_id {
            self.take_hit(thrower, CAUSE_GRENADE);
        }
    }

    /// Records a hit from another player; any charge in progress is lost
    fn take_hit(&mut self, attacker: ClientId, cause: &str) {
        self.deaths
            .record_hit(attacker, Some(cause), self.scheduler.now());
        self.abilities.cancel_charging(&mut self.world);
    }

    pub fn apply_command(&mut self, command: InputCommand) {
        if let InputCommand::Look {
            yaw_delta,
            pitch_delta,
        } = command
        {
            self.yaw = crate::replica::wrap_angle(self.yaw + yaw_delta);
            self.pitch = (self.pitch + pitch_delta).clamp(-LOOK_PITCH_LIMIT, LOOK_PITCH_LIMIT);
            return;
        }

        if !self.in_room() {
            return;
        }

        let dead = self.deaths.is_dead();
        let owner = self.client_id.unwrap_or_default();
        let aim = self.aim();

        let packet = match command {
            InputCommand::Move { forward, strafe } => {
                self.move_input = (forward.clamp(-1.0, 1.0), strafe.clamp(-1.0, 1.0));
                None
            }
            InputCommand::Jump => {
                self.jump(dead);
                None
            }
            InputCommand::UltimatePressed => {
                self.abilities.begin_ultimate(&mut self.world, aim, dead);
                None
            }
            InputCommand::UltimateReleased => {
                self.abilities.release_ultimate(&mut self.world, owner, aim)
            }
            InputCommand::GrenadePressed => {
                self.abilities.begin_grenade(&mut self.world, aim, dead);
                None
            }
            InputCommand::GrenadeReleased => {
                self.abilities.release_grenade(&mut self.world, owner, aim)
            }
            InputCommand::SwingBat => {
                self.abilities
                    .swing_bat(&mut self.scheduler, &mut self.world, aim, dead)
            }
            InputCommand::GrapplePressed => {
                self.abilities
                    .grapple
                    .fire(&mut self.scheduler, &mut self.world, aim, dead)
            }
            InputCommand::GrappleReleased => self
                .abilities
                .grapple
                .release(&mut self.scheduler, &mut self.world),
            InputCommand::ShootBall => {
                self.abilities
                    .shoot_ball(&mut self.scheduler, &mut self.world, owner, aim, dead)
            }
            InputCommand::BuildBlock => self.abilities.build_block(
                &mut self.scheduler,
                &mut self.world,
                owner,
                aim,
                self.block_template,
                dead,
            ),
            InputCommand::ClearBlocks => Some(Packet::ClearBlocks),
            InputCommand::Look { .. } => None,
        };

        self.send_all(packet);
    }

    fn jump(&mut self, dead: bool) {
        if dead || !self.jump_ready {
            return;
        }
        let grounded = self
            .world
            .raycast(self.world.body_position(), Vec3::new(0.0, -1.0, 0.0), GROUND_PROBE)
            .is_some();
        if grounded {
            self.world.apply_impulse(Vec3::UP * JUMP_IMPULSE);
            self.jump_ready = false;
            self.scheduler
                .once(JUMP_COOLDOWN_SECS, TimerEvent::JumpCooldown);
        }
    }

    /// Advances the session by `dt` seconds
    pub fn frame(&mut self, dt: f32) {
        self.scheduler.advance(dt);
        self.run_timers();

        let in_room = self.in_room();
        let owner = self.client_id.unwrap_or_default();
        let aim = self.aim();

        if in_room && !self.deaths.is_dead() {
            self.apply_movement();
            let packets = self
                .abilities
                .tick(&mut self.scheduler, &mut self.world, owner, aim, dt);
            self.send_all(packets);
        }

        let contacts = self.world.step(dt);
        if in_room {
            for contact in contacts {
                self.on_contact(contact);
            }

            if !self.deaths.is_dead()
                && DeathCoordinator::below_death_height(self.world.body_position())
            {
                self.kill(DeathTrigger::Fell);
            }
        }

        self.replicas.update(&mut self.world, dt);

        if in_room {
            self.snapshot_elapsed += dt;
            let interval = SNAPSHOT_INTERVAL_MS as f32 / 1000.0;
            if self.snapshot_elapsed >= interval {
                self.snapshot_elapsed = (self.snapshot_elapsed - interval).min(interval);
                if !self.deaths.is_dead() {
                    let snapshot = self.snapshot();
                    self.send(Packet::PlayerMovement(snapshot));
                }
            }
        }
    }

    /// Current local state as replicated to peers
    pub fn snapshot(&self) -> MovementSnapshot {
        let (charge_level, grenade_charge_level) = self.abilities.charge_levels();
        MovementSnapshot {
            position: self.world.body_position(),
            velocity: self.world.body_velocity(),
            rotation: self.yaw,
            anim: self.abilities.anim_state(),
            charge_level,
            grenade_charge_level,
        }
    }

    fn run_timers(&mut self) {
        while let Some(fired) = self.scheduler.pop_due() {
            match fired.event {
                TimerEvent::RespawnTick => {
                    let packet = self.deaths.on_tick(&mut self.world, fired.remaining);
                    if packet.is_some() {
                        info!("Respawned");
                    }
                    self.send_all(packet);
                }
                TimerEvent::KillBannerExpired => {
                    if self.kill_banner.as_ref().map(|b| b.timer) == Some(fired.id) {
                        self.kill_banner = None;
                    }
                }
                TimerEvent::JumpCooldown => self.jump_ready = true,
                TimerEvent::VisualExpired(visual) => self.world.despawn_visual(visual),
                event => {
                    let aim = self.aim();
                    let packets = self.abilities.on_timer(
                        event,
                        fired.remaining,
                        &mut self.scheduler,
                        &mut self.world,
                        aim,
                    );
                    self.send_all(packets);
                }
            }
        }
    }

    fn apply_movement(&mut self) {
        let (forward, strafe) = self.move_input;
        if forward == 0.0 && strafe == 0.0 {
            return;
        }

        let ahead = Vec3::from_yaw_pitch(self.yaw, 0.0);
        let right = Vec3::new(ahead.z, 0.0, -ahead.x);
        let direction = (ahead * forward + right * strafe).normalize();
        let velocity = self.world.body_velocity();
        self.world.set_body_velocity(Vec3::new(
            direction.x * MOVE_SPEED,
            velocity.y,
            direction.z * MOVE_SPEED,
        ));
    }

    fn on_contact(&mut self, contact: Contact) {
        match contact {
            Contact::LocalHit {
                owner,
                kind: ProjectileKind::Ball,
                velocity,
            } => {
                if self.deaths.is_dead() {
                    return;
                }
                let mut direction = velocity.normalize();
                direction.y += BALL_LIFT;
                self.world
                    .apply_impulse(direction.normalize() * BALL_KNOCKBACK);
                self.take_hit(owner, CAUSE_BALL);
            }
            Contact::LocalHit {
                owner,
                kind: ProjectileKind::Ultimate,
                ..
            } => self.kill(DeathTrigger::Instant {
                killer: owner,
                cause: CAUSE_ULTIMATE.to_string(),
            }),
            Contact::Landed {
                owner,
                kind: ProjectileKind::Grenade,
                position,
                size,
            } if Some(owner) == self.client_id => {
                self.send(Packet::GrenadeExploded(Explosion { position, size }));
            }
            _ => {}
        }
    }

    fn kill(&mut self, trigger: DeathTrigger) {
        if self.deaths.is_dead() {
            return;
        }
        let teardown = self.abilities.cancel_all(&mut self.scheduler, &mut self.world);
        self.send_all(teardown);
        if let Some(packet) = self.deaths.die(&mut self.scheduler, trigger) {
            info!("Died: {:?}", self.deaths.last_death());
            self.send(packet);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::death::{LifeState, CAUSE_FELL};
    use crate::world::ArenaWorld;
    use shared::{AnimState, PlayerState, ShotPayload, DEFAULT_ROOM_ID};

    fn joined_game() -> ClientGame<ArenaWorld> {
        let mut game = ClientGame::new(
            ArenaWorld::new(SPAWN_POSITION),
            "Rex",
            JoinRequest::Room(None),
        );
        game.handle_packet(Packet::Connected { client_id: 1 });
        game.handle_packet(Packet::CurrentPlayers {
            room_id: DEFAULT_ROOM_ID.to_string(),
            players: vec![PlayerState::new(2, "Bo", DEFAULT_ROOM_ID)],
        });
        game.handle_packet(Packet::CurrentBlocks { blocks: vec![] });
        game.drain_outbox();
        game
    }

    fn run(game: &mut ClientGame<ArenaWorld>, secs: f32) {
        let steps = (secs * 60.0).round() as usize;
        for _ in 0..steps {
            game.frame(1.0 / 60.0);
        }
    }

    #[test]
    fn test_handshake_then_register() {
        let mut game = ClientGame::new(
            ArenaWorld::new(SPAWN_POSITION),
            "  Rex ",
            JoinRequest::Room(None),
        );
        assert_eq!(
            game.drain_outbox(),
            vec![Packet::Connect {
                client_version: PROTOCOL_VERSION
            }]
        );

        game.handle_packet(Packet::Connected { client_id: 1 });

        assert_eq!(game.session(), &Session::Lobby);
        assert_eq!(
            game.drain_outbox(),
            vec![Packet::RegisterPlayer {
                username: "Rex".to_string(),
                room_id: None,
            }]
        );
    }

    #[test]
    fn test_join_populates_replicas() {
        let game = joined_game();
        assert!(game.in_room());
        assert_eq!(game.replicas().len(), 1);
        assert!(game.replicas().get(2).is_some());
    }

    #[test]
    fn test_snapshots_are_throttled() {
        let mut game = joined_game();
        run(&mut game, 1.0);

        let snapshots = game
            .drain_outbox()
            .into_iter()
            .filter(|p| matches!(p, Packet::PlayerMovement(_)))
            .count();
        assert!((25..=31).contains(&snapshots), "sent {}", snapshots);
    }

    #[test]
    fn test_join_error_returns_to_lobby() {
        let mut game = ClientGame::new(
            ArenaWorld::new(SPAWN_POSITION),
            "Rex",
            JoinRequest::Code("ZZZ999".to_string()),
        );
        game.handle_packet(Packet::Connected { client_id: 1 });
        game.drain_outbox();

        game.handle_packet(Packet::PrivateRoomError {
            message: "Invalid room code".to_string(),
        });

        assert_eq!(game.session(), &Session::Lobby);
        assert_eq!(game.last_error(), Some("Invalid room code"));
        assert_eq!(game.drain_outbox(), vec![Packet::GetRooms]);
    }

    #[test]
    fn test_room_closed_returns_to_lobby() {
        let mut game = joined_game();
        game.handle_packet(Packet::RoomClosed {
            room_id: "room_9".to_string(),
        });
        assert!(game.in_room());

        game.handle_packet(Packet::RoomClosed {
            room_id: DEFAULT_ROOM_ID.to_string(),
        });
        assert_eq!(game.session(), &Session::Lobby);
        assert!(game.replicas().is_empty());
    }

    #[test]
    fn test_fall_death_and_respawn() {
        let mut game = joined_game();
        game.world_mut().teleport_body(Vec3::new(40.0, 0.0, 0.0));
        run(&mut game, 2.0);

        let out = game.drain_outbox();
        assert!(out.contains(&Packet::PlayerDied {
            killer_id: None,
            cause: CAUSE_FELL.to_string(),
        }));
        assert!(game.deaths().is_dead());

        run(&mut game, 5.1);
        let out = game.drain_outbox();
        assert!(out.contains(&Packet::PlayerRespawned {
            position: SPAWN_POSITION,
        }));
        assert_eq!(game.deaths().state(), LifeState::Alive);
    }

    #[test]
    fn test_bat_hit_attributes_fall_and_cancels_charge() {
        let mut game = joined_game();
        run(&mut game, 0.5);
        game.apply_command(InputCommand::UltimatePressed);
        run(&mut game, 0.2);
        assert_eq!(game.abilities().anim_state(), AnimState::Charging);

        let body = game.world().body_position();
        game.handle_packet(Packet::BatSwung {
            player_id: 2,
            swing: ShotPayload {
                position: body - Vec3::new(1.0, 0.0, 0.0),
                direction: Vec3::new(1.0, 0.0, 0.0),
            },
        });

        assert_eq!(game.abilities().charge_levels(), (0.0, 0.0));
        assert_eq!(game.deaths().hits().last().unwrap().attacker, 2);
        assert!(game.world().body_velocity().x > 0.0);
    }

    #[test]
    fn test_ultimate_contact_kills_outright() {
        let mut game = joined_game();
        run(&mut game, 1.0);
        game.apply_command(InputCommand::GrenadePressed);
        run(&mut game, 0.2);
        assert!(game.abilities().charge_levels().1 > 0.0);
        game.drain_outbox();

        let body = game.world().body_position();
        game.handle_packet(Packet::UltimateShot {
            player_id: 2,
            shot: ShotPayload {
                // Raised so the shot clears the floor on its way in
                position: body + Vec3::new(0.0, 0.5, -3.0),
                direction: Vec3::new(0.0, 0.0, 1.0),
            },
        });
        run(&mut game, 0.5);

        let out = game.drain_outbox();
        assert!(out.contains(&Packet::PlayerDied {
            killer_id: Some(2),
            cause: CAUSE_ULTIMATE.to_string(),
        }));
        assert!(game.deaths().is_dead());
        assert_eq!(game.abilities().charge_levels(), (0.0, 0.0));
        assert_eq!(game.deaths().last_death().unwrap().killer, Some(2));
    }

    #[test]
    fn test_ball_contact_knocks_back_and_cancels_charge() {
        let mut game = joined_game();
        run(&mut game, 1.0);
        game.apply_command(InputCommand::GrenadePressed);
        run(&mut game, 0.2);
        assert_eq!(game.abilities().anim_state(), AnimState::Charging);

        let body = game.world().body_position();
        game.handle_packet(Packet::BallShot {
            player_id: 2,
            shot: ShotPayload {
                position: body - Vec3::new(2.0, 0.0, 0.0),
                direction: Vec3::new(1.0, 0.0, 0.0),
            },
        });
        run(&mut game, 0.2);

        let hit = game.deaths().hits().last().unwrap();
        assert_eq!(hit.attacker, 2);
        assert_eq!(hit.cause.as_deref(), Some(CAUSE_BALL));
        assert_eq!(game.abilities().charge_levels(), (0.0, 0.0));
        assert!(game.world().body_position().x > body.x);
        assert!(!game.deaths().is_dead());
    }

    #[test]
    fn test_peer_grenade_blast_attributes_fall() {
        let mut game = joined_game();
        run(&mut game, 1.0);
        let body = game.world().body_position();

        game.handle_packet(Packet::GrenadeExplosion {
            player_id: 2,
            explosion: Explosion {
                position: body - Vec3::new(0.0, 0.0, 1.0),
                size: 0.5,
            },
        });
        assert!(game.world().body_velocity().z > 0.0);
        assert_eq!(
            game.deaths().hits().last().unwrap().cause.as_deref(),
            Some(CAUSE_GRENADE)
        );

        game.world_mut().teleport_body(Vec3::new(40.0, -20.0, 0.0));
        game.frame(1.0 / 60.0);

        assert!(game.drain_outbox().contains(&Packet::PlayerDied {
            killer_id: Some(2),
            cause: CAUSE_GRENADE.to_string(),
        }));
    }

    #[test]
    fn test_blast_out_of_reach_is_ignored() {
        let mut game = joined_game();
        run(&mut game, 1.0);
        let body = game.world().body_position();

        game.handle_packet(Packet::GrenadeExplosion {
            player_id: 2,
            explosion: Explosion {
                position: body + Vec3::new(10.0, 0.0, 0.0),
                size: 0.5,
            },
        });

        assert!(game.deaths().hits().last().is_none());
    }

    #[test]
    fn test_own_explosion_pushes_without_attribution() {
        let mut game = joined_game();
        run(&mut game, 0.5);
        let body = game.world().body_position();

        game.handle_packet(Packet::GrenadeExplosion {
            player_id: 1,
            explosion: Explosion {
                position: body - Vec3::new(0.0, 0.0, 1.0),
                size: 0.5,
            },
        });

        assert!(game.world().body_velocity().z > 0.0);
        assert!(game.deaths().hits().last().is_none());
    }

    #[test]
    fn test_kill_banner_expires() {
        let mut game = joined_game();
        game.handle_packet(Packet::KillConfirmed {
            victim_id: 2,
            victim_name: "Bo".to_string(),
        });
        assert_eq!(game.kill_banner().unwrap().victim_name, "Bo");

        run(&mut game, 2.1);
        assert!(game.kill_banner().is_none());
    }

    #[test]
    fn test_peer_death_hides_replica() {
        let mut game = joined_game();
        game.handle_packet(Packet::PeerDied {
            player_id: 2,
            killer_id: None,
            killer_name: None,
            cause: CAUSE_FELL.to_string(),
        });
        assert!(!game.replicas().get(2).unwrap().visible);

        game.handle_packet(Packet::PeerRespawned {
            player_id: 2,
            position: SPAWN_POSITION,
        });
        assert!(game.replicas().get(2).unwrap().visible);
    }

    #[test]
    fn test_commands_ignored_in_lobby() {
        let mut game = ClientGame::new(ArenaWorld::new(SPAWN_POSITION), "Rex", JoinRequest::None);
        game.handle_packet(Packet::Connected { client_id: 1 });
        game.drain_outbox();

        game.apply_command(InputCommand::ShootBall);
        game.apply_command(InputCommand::ClearBlocks);

        assert!(game.drain_outbox().is_empty());
    }
}
