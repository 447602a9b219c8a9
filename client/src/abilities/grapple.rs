//! Grappling hook: raycast anchor, pull impulses, timeout and cooldown

use crate::abilities::charge::FRAME_SECS;
use crate::game::TimerEvent;
use crate::scheduler::{Scheduler, TimerId};
use crate::world::{VisualId, VisualKind, World};
use shared::{Packet, Vec3};

pub const RANGE: f32 = 50.0;
pub const INITIAL_IMPULSE: f32 = 25.0;
pub const PULL_PER_FRAME: f32 = 2.5;
pub const RELEASE_DISTANCE: f32 = 1.5;
pub const MAX_SPEED: f32 = 30.0;
pub const TIMEOUT_SECS: f32 = 1.5;
pub const COOLDOWN_SECS: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GrapplePhase {
    Idle,
    Attached { anchor: Vec3 },
}

#[derive(Debug)]
pub struct Grapple {
    phase: GrapplePhase,
    timeout: Option<TimerId>,
    cooldown: Option<TimerId>,
    hook: Option<VisualId>,
}

impl Grapple {
    pub fn new() -> Self {
        Self {
            phase: GrapplePhase::Idle,
            timeout: None,
            cooldown: None,
            hook: None,
        }
    }

    pub fn phase(&self) -> GrapplePhase {
        self.phase
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.phase, GrapplePhase::Attached { .. })
    }

    pub fn on_cooldown(&self) -> bool {
        self.cooldown.is_some()
    }

    /// Fires the hook along `aim`. Nothing happens unless the ray hits geometry.
    pub fn fire<W: World>(
        &mut self,
        scheduler: &mut Scheduler<TimerEvent>,
        world: &mut W,
        aim: Vec3,
        dead: bool,
    ) -> Option<Packet> {
        if dead || self.is_attached() || self.on_cooldown() {
            return None;
        }

        let origin = world.body_position();
        let hit = world.raycast(origin, aim, RANGE)?;
        let anchor = hit.point;

        world.apply_impulse((anchor - origin).normalize() * INITIAL_IMPULSE);
        self.phase = GrapplePhase::Attached { anchor };
        self.timeout = Some(scheduler.once(TIMEOUT_SECS, TimerEvent::GrappleTimeout));
        self.hook = Some(world.spawn_visual(VisualKind::GrappleHook, anchor, 1.0));

        Some(Packet::GrappleStart { anchor })
    }

    /// Per-frame pull toward the anchor. Returns `GrappleEnd` when the body
    /// arrives close enough to auto-release.
    pub fn tick<W: World>(
        &mut self,
        scheduler: &mut Scheduler<TimerEvent>,
        world: &mut W,
        dt: f32,
    ) -> Option<Packet> {
        let GrapplePhase::Attached { anchor } = self.phase else {
            return None;
        };

        let offset = anchor - world.body_position();
        if offset.length() <= RELEASE_DISTANCE {
            return self.release(scheduler, world);
        }

        world.apply_impulse(offset.normalize() * (PULL_PER_FRAME * dt / FRAME_SECS));
        let capped = world.body_velocity().clamp_length(MAX_SPEED);
        world.set_body_velocity(capped);
        None
    }

    /// Detaches and starts the cooldown
    pub fn release<W: World>(
        &mut self,
        scheduler: &mut Scheduler<TimerEvent>,
        world: &mut W,
    ) -> Option<Packet> {
        if !self.is_attached() {
            return None;
        }

        if let Some(id) = self.timeout.take() {
            scheduler.cancel(id);
        }
        if let Some(id) = self.hook.take() {
            world.despawn_visual(id);
        }
        self.phase = GrapplePhase::Idle;
        self.cooldown = Some(scheduler.once(COOLDOWN_SECS, TimerEvent::GrappleCooldown));

        Some(Packet::GrappleEnd)
    }

    pub fn on_timeout<W: World>(
        &mut self,
        scheduler: &mut Scheduler<TimerEvent>,
        world: &mut W,
    ) -> Option<Packet> {
        self.timeout = None;
        self.release(scheduler, world)
    }

    pub fn on_cooldown_over(&mut self) {
        self.cooldown = None;
    }
}

impl Default for Grapple {
    fn default() -> Self {
        Self::new()
    }
}
