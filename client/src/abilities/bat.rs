//! Knockback stick: a timed swing gated by its own cooldown

use crate::game::TimerEvent;
use crate::scheduler::{Scheduler, TimerId};
use crate::world::{VisualId, VisualKind, World};
use shared::{Packet, ShotPayload, Vec3};
use std::collections::HashSet;

pub const SWING_SECS: f32 = 0.3;
pub const SWING_FRAMES: u32 = 25;
pub const COOLDOWN_SECS: f32 = 1.5;
pub const BAT_RANGE: f32 = 3.0;
/// Contact distance between the bat and a target
pub const HIT_RANGE: f32 = BAT_RANGE + 1.0;
pub const KNOCKBACK: f32 = 18.0;
pub const BLOCK_KNOCKBACK_SCALE: f32 = 2.0;
/// A remote swing this close to the local player knocks it back
pub const VICTIM_RANGE: f32 = 5.0;

/// Held at arm's length from the body
const HOLD_DISTANCE: f32 = 1.0;
/// Total yaw sweep of one swing, in radians
const SWEEP: f32 = 2.0;

#[derive(Debug, Default)]
pub struct BatSwing {
    swinging: bool,
    frame: u32,
    frame_timer: Option<TimerId>,
    cooldown: Option<TimerId>,
    visual: Option<VisualId>,
    in_range: HashSet<String>,
}

impl BatSwing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_swinging(&self) -> bool {
        self.swinging
    }

    pub fn on_cooldown(&self) -> bool {
        self.cooldown.is_some()
    }

    pub fn start<W: World>(
        &mut self,
        scheduler: &mut Scheduler<TimerEvent>,
        world: &mut W,
        origin: Vec3,
        aim: Vec3,
        dead: bool,
    ) -> Option<Packet> {
        if dead || self.swinging || self.on_cooldown() {
            return None;
        }

        self.swinging = true;
        self.frame = 0;
        self.in_range.clear();
        self.frame_timer = Some(scheduler.repeat(
            SWING_SECS / SWING_FRAMES as f32,
            SWING_FRAMES,
            TimerEvent::BatFrame,
        ));
        self.cooldown = Some(scheduler.once(COOLDOWN_SECS, TimerEvent::BatCooldown));
        self.visual = Some(world.spawn_visual(VisualKind::Bat, self.bat_position(origin, aim), 1.0));

        Some(Packet::BatSwing(ShotPayload {
            position: origin,
            direction: aim,
        }))
    }

    /// Bat position for the current frame, sweeping across the aim direction
    pub fn bat_position(&self, origin: Vec3, aim: Vec3) -> Vec3 {
        let progress = self.frame as f32 / SWING_FRAMES as f32;
        let yaw = aim.x.atan2(aim.z) + SWEEP * (0.5 - progress);
        origin + Vec3::from_yaw_pitch(yaw, 0.0) * HOLD_DISTANCE
    }

    /// One swing frame. Blocks entering range are knocked away and reported
    /// as `BlockHit`; a block that leaves and re-enters range is hit again.
    pub fn on_frame<W: World>(
        &mut self,
        world: &mut W,
        origin: Vec3,
        aim: Vec3,
        remaining: u32,
    ) -> Vec<Packet> {
        if !self.swinging {
            return Vec::new();
        }

        self.frame += 1;
        let bat = self.bat_position(origin, aim);
        if let Some(id) = self.visual {
            world.move_visual(id, bat, 1.0);
        }

        let mut hits = Vec::new();
        for (block_id, position) in world.block_positions() {
            if bat.distance(position) < HIT_RANGE {
                if self.in_range.insert(block_id.clone()) {
                    let impulse = (position - bat).normalize() * (KNOCKBACK * BLOCK_KNOCKBACK_SCALE);
                    world.push_block(&block_id, impulse);
                    hits.push(Packet::BlockHit { block_id, impulse });
                }
            } else {
                self.in_range.remove(&block_id);
            }
        }

        if remaining == 0 {
            self.finish(world);
        }
        hits
    }

    pub fn on_cooldown_over(&mut self) {
        self.cooldown = None;
    }

    /// Stops a swing in flight; the cooldown keeps running
    pub fn cancel<W: World>(&mut self, scheduler: &mut Scheduler<TimerEvent>, world: &mut W) {
        if let Some(id) = self.frame_timer.take() {
            scheduler.cancel(id);
        }
        self.finish(world);
    }

    fn finish<W: World>(&mut self, world: &mut W) {
        if let Some(id) = self.visual.take() {
            world.despawn_visual(id);
        }
        self.frame_timer = None;
        self.swinging = false;
        self.frame = 0;
        self.in_range.clear();
    }
}

/// Knockback for the local player from a peer's swing, if it is close enough
pub fn victim_impulse(swing_origin: Vec3, victim: Vec3) -> Option<Vec3> {
    if swing_origin.distance(victim) >= VICTIM_RANGE {
        return None;
    }
    let mut direction = (victim - swing_origin).normalize();
    direction.y = direction.y.max(0.0) + 0.3;
    Some(direction.normalize() * KNOCKBACK)
}
