//! Local player abilities
//!
//! Each ability owns its state machine and registers its durations on the
//! shared [`Scheduler`]. The set turns releases into projectiles on the
//! [`World`] and into the packets the room needs to mirror them.

pub mod bat;
pub mod charge;
pub mod grapple;

use crate::game::TimerEvent;
use crate::scheduler::{Scheduler, TimerId};
use crate::world::{ProjectileKind, ProjectileSpawn, World};
use charge::{size_for, ChargeAbility, GRENADE, ULTIMATE};
use shared::{
    AnimState, Block, BlockKind, ClientId, GrenadeThrow, Packet, ShotPayload, Vec3,
    BLOCK_SIZE_MAX, BLOCK_SIZE_MIN, MAX_CHARGE,
};

pub use bat::BatSwing;
pub use grapple::Grapple;

pub const ULTIMATE_IMPULSE: f32 = 225.0;
pub const ULTIMATE_MASS: f32 = 2.0;
pub const ULTIMATE_RECOIL: f32 = 25.0;

pub const GRENADE_IMPULSE: f32 = 150.0;

pub const BALL_COOLDOWN_SECS: f32 = 0.15;
pub const BALL_SPAWN_DISTANCE: f32 = 1.5;
pub const BALL_IMPULSE: f32 = 15.0;
pub const BALL_MASS: f32 = 0.5;
pub const BALL_RECOIL: f32 = 3.0;
pub const BALL_SIZE: f32 = 0.15;

pub const BUILD_COOLDOWN_SECS: f32 = 0.2;
pub const BUILD_DISTANCE: f32 = 5.0;

/// How long shooting/building shows in the replicated animation state
pub const ACTION_ANIM_SECS: f32 = 0.3;

/// Shape and colour for the next block the player builds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockTemplate {
    pub kind: BlockKind,
    pub size: f32,
    pub color: u32,
    pub slimy: bool,
}

impl Default for BlockTemplate {
    fn default() -> Self {
        Self {
            kind: BlockKind::Box,
            size: 1.0,
            color: 0x8844cc,
            slimy: false,
        }
    }
}

#[derive(Debug)]
pub struct AbilitySet {
    pub ultimate: ChargeAbility,
    pub grenade: ChargeAbility,
    pub bat: BatSwing,
    pub grapple: Grapple,
    ball_cooldown: Option<TimerId>,
    build_cooldown: Option<TimerId>,
    action_anim: Option<(AnimState, TimerId)>,
    blocks_built: u32,
}

impl AbilitySet {
    pub fn new() -> Self {
        Self {
            ultimate: ChargeAbility::new(ULTIMATE),
            grenade: ChargeAbility::new(GRENADE),
            bat: BatSwing::new(),
            grapple: Grapple::new(),
            ball_cooldown: None,
            build_cooldown: None,
            action_anim: None,
            blocks_built: 0,
        }
    }

    /// Animation state replicated on the next snapshot
    pub fn anim_state(&self) -> AnimState {
        if self.ultimate.is_charging() || self.grenade.is_charging() {
            AnimState::Charging
        } else if self.grapple.is_attached() {
            AnimState::Grappling
        } else if let Some((anim, _)) = self.action_anim {
            anim
        } else {
            AnimState::Idle
        }
    }

    /// Ultimate and grenade charge, both 0..=100
    pub fn charge_levels(&self) -> (f32, f32) {
        (self.ultimate.charge(), self.grenade.charge())
    }

    pub fn begin_ultimate<W: World>(&mut self, world: &mut W, aim: Vec3, dead: bool) -> bool {
        let anchor = world.body_position() + aim * ULTIMATE.spawn_distance;
        self.ultimate.begin(world, anchor, dead)
    }

    pub fn release_ultimate<W: World>(
        &mut self,
        world: &mut W,
        owner: ClientId,
        aim: Vec3,
    ) -> Option<Packet> {
        self.ultimate.release(world)?;
        Some(fire_ultimate(world, owner, aim))
    }

    pub fn begin_grenade<W: World>(&mut self, world: &mut W, aim: Vec3, dead: bool) -> bool {
        let anchor = world.body_position() + aim * GRENADE.spawn_distance;
        self.grenade.begin(world, anchor, dead)
    }

    pub fn release_grenade<W: World>(
        &mut self,
        world: &mut W,
        owner: ClientId,
        aim: Vec3,
    ) -> Option<Packet> {
        let charge = self.grenade.release(world)?;
        Some(fire_grenade(world, owner, aim, charge))
    }

    /// Per-frame work: charge accumulation with auto-release, grapple pull
    pub fn tick<W: World>(
        &mut self,
        scheduler: &mut Scheduler<TimerEvent>,
        world: &mut W,
        owner: ClientId,
        aim: Vec3,
        dt: f32,
    ) -> Vec<Packet> {
        let mut out = Vec::new();
        let body = world.body_position();

        let anchor = body + aim * ULTIMATE.spawn_distance;
        if self.ultimate.tick(world, anchor, dt).is_some() {
            out.push(fire_ultimate(world, owner, aim));
        }

        let anchor = body + aim * GRENADE.spawn_distance;
        if let Some(charge) = self.grenade.tick(world, anchor, dt) {
            out.push(fire_grenade(world, owner, aim, charge));
        }

        out.extend(self.grapple.tick(scheduler, world, dt));
        out
    }

    pub fn shoot_ball<W: World>(
        &mut self,
        scheduler: &mut Scheduler<TimerEvent>,
        world: &mut W,
        owner: ClientId,
        aim: Vec3,
        dead: bool,
    ) -> Option<Packet> {
        if dead || self.ball_cooldown.is_some() {
            return None;
        }
        self.ball_cooldown = Some(scheduler.once(BALL_COOLDOWN_SECS, TimerEvent::BallCooldown));
        self.show_action(scheduler, AnimState::Shooting);

        let position = world.body_position() + aim * BALL_SPAWN_DISTANCE;
        world.spawn_projectile(ProjectileSpawn {
            kind: ProjectileKind::Ball,
            owner,
            position,
            impulse: aim * BALL_IMPULSE,
            mass: BALL_MASS,
            size: BALL_SIZE,
        });
        world.apply_impulse(aim * -BALL_RECOIL);

        Some(Packet::ShootBall(ShotPayload {
            position,
            direction: aim,
        }))
    }

    /// Places a block along the aim and returns the request to share it
    pub fn build_block<W: World>(
        &mut self,
        scheduler: &mut Scheduler<TimerEvent>,
        world: &mut W,
        owner: ClientId,
        aim: Vec3,
        template: BlockTemplate,
        dead: bool,
    ) -> Option<Packet> {
        if dead || self.build_cooldown.is_some() {
            return None;
        }
        self.build_cooldown = Some(scheduler.once(BUILD_COOLDOWN_SECS, TimerEvent::BuildCooldown));
        self.show_action(scheduler, AnimState::Building);

        let block = Block {
            id: format!("{}_{}", owner, self.blocks_built),
            kind: template.kind,
            size: template.size.clamp(BLOCK_SIZE_MIN, BLOCK_SIZE_MAX),
            color: template.color,
            position: world.body_position() + aim * BUILD_DISTANCE,
            slimy: template.slimy,
            room_id: String::new(),
        };
        self.blocks_built += 1;
        world.spawn_block(&block);

        Some(Packet::SpawnBlock(block))
    }

    pub fn swing_bat<W: World>(
        &mut self,
        scheduler: &mut Scheduler<TimerEvent>,
        world: &mut W,
        aim: Vec3,
        dead: bool,
    ) -> Option<Packet> {
        let origin = world.body_position();
        self.bat.start(scheduler, world, origin, aim, dead)
    }

    /// Drops both charges without firing
    pub fn cancel_charging<W: World>(&mut self, world: &mut W) {
        self.ultimate.cancel(world);
        self.grenade.cancel(world);
    }

    /// Tears down every ability in flight, e.g. on death
    pub fn cancel_all<W: World>(
        &mut self,
        scheduler: &mut Scheduler<TimerEvent>,
        world: &mut W,
    ) -> Vec<Packet> {
        self.cancel_charging(world);
        self.bat.cancel(scheduler, world);
        self.grapple.release(scheduler, world).into_iter().collect()
    }

    /// Dispatches an ability timer; unrelated events are ignored
    pub fn on_timer<W: World>(
        &mut self,
        event: TimerEvent,
        remaining: u32,
        scheduler: &mut Scheduler<TimerEvent>,
        world: &mut W,
        aim: Vec3,
    ) -> Vec<Packet> {
        match event {
            TimerEvent::BatFrame => {
                let origin = world.body_position();
                self.bat.on_frame(world, origin, aim, remaining)
            }
            TimerEvent::BatCooldown => {
                self.bat.on_cooldown_over();
                Vec::new()
            }
            TimerEvent::GrappleTimeout => self
                .grapple
                .on_timeout(scheduler, world)
                .into_iter()
                .collect(),
            TimerEvent::GrappleCooldown => {
                self.grapple.on_cooldown_over();
                Vec::new()
            }
            TimerEvent::BallCooldown => {
                self.ball_cooldown = None;
                Vec::new()
            }
            TimerEvent::BuildCooldown => {
                self.build_cooldown = None;
                Vec::new()
            }
            TimerEvent::ActionAnimEnd => {
                self.action_anim = None;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn show_action(&mut self, scheduler: &mut Scheduler<TimerEvent>, anim: AnimState) {
        if let Some((_, id)) = self.action_anim.take() {
            scheduler.cancel(id);
        }
        let id = scheduler.once(ACTION_ANIM_SECS, TimerEvent::ActionAnimEnd);
        self.action_anim = Some((anim, id));
    }
}

impl Default for AbilitySet {
    fn default() -> Self {
        Self::new()
    }
}

/// Launches the ultimate projectile and kicks the shooter backwards
fn fire_ultimate<W: World>(world: &mut W, owner: ClientId, aim: Vec3) -> Packet {
    let position = world.body_position() + aim * ULTIMATE.spawn_distance;
    world.spawn_projectile(ProjectileSpawn {
        kind: ProjectileKind::Ultimate,
        owner,
        position,
        impulse: aim * ULTIMATE_IMPULSE,
        mass: ULTIMATE_MASS,
        size: ULTIMATE.max_size,
    });
    world.apply_impulse(aim * -ULTIMATE_RECOIL);

    Packet::ShootUltimate(ShotPayload {
        position,
        direction: aim,
    })
}

fn fire_grenade<W: World>(world: &mut W, owner: ClientId, aim: Vec3, charge: f32) -> Packet {
    let fraction = (charge / MAX_CHARGE).clamp(0.0, 1.0);
    let size = size_for(&GRENADE, charge);
    let position = world.body_position() + aim * GRENADE.spawn_distance;

    world.spawn_projectile(ProjectileSpawn {
        kind: ProjectileKind::Grenade,
        owner,
        position,
        impulse: aim * (GRENADE_IMPULSE * fraction),
        mass: 2.0 * fraction,
        size,
    });

    Packet::ShootGrenade(GrenadeThrow {
        position,
        direction: aim,
        size,
        charge: fraction,
    })
}
