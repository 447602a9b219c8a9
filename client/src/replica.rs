//! Remote player replicas
//!
//! Peers never run each other's simulation. A replica keeps the last
//! snapshot as an extrapolation base and eases the rendered pose toward it,
//! mirroring charge indicators and grapple lines from snapshot fields alone.

use crate::abilities::charge::{size_for, GRENADE, ULTIMATE};
use crate::world::{VisualId, VisualKind, World, BODY_RADIUS, GRAVITY};
use shared::{AnimState, ClientId, MovementSnapshot, PlayerState, Vec3};
use std::collections::HashMap;
use std::f32::consts::{PI, TAU};

pub const MAX_EXTRAPOLATION_STEP: f32 = 0.1;
pub const FAST_SPEED: f32 = 0.5;
pub const FAST_RATE: f32 = 0.4;
pub const SLOW_RATE: f32 = 0.25;
pub const ROTATION_RATE: f32 = 0.35;

/// Resting height of a body on the arena floor
const GROUND_Y: f32 = BODY_RADIUS;

/// Normalizes an angle into (-π, π]
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI {
        wrapped - TAU
    } else {
        wrapped
    }
}

#[derive(Debug)]
pub struct RemoteReplica {
    pub id: ClientId,
    pub username: String,
    /// Rendered pose
    pub position: Vec3,
    pub rotation: f32,
    pub anim: AnimState,
    pub charge_level: f32,
    pub grenade_charge_level: f32,
    pub visible: bool,
    pub grapple_anchor: Option<Vec3>,

    target: Vec3,
    target_rotation: f32,
    velocity: Vec3,
    floor: f32,

    ultimate_indicator: Option<VisualId>,
    grenade_indicator: Option<VisualId>,
    hook: Option<VisualId>,
}

impl RemoteReplica {
    pub fn new(player: &PlayerState) -> Self {
        Self {
            id: player.id,
            username: player.username.clone(),
            position: player.position,
            rotation: player.rotation,
            anim: player.anim,
            charge_level: player.charge_level,
            grenade_charge_level: player.grenade_charge_level,
            visible: true,
            grapple_anchor: None,
            target: player.position,
            target_rotation: player.rotation,
            velocity: player.velocity,
            floor: GROUND_Y.min(player.position.y),
            ultimate_indicator: None,
            grenade_indicator: None,
            hook: None,
        }
    }

    /// Extrapolation target the rendered pose is easing toward
    pub fn target(&self) -> Vec3 {
        self.target
    }

    /// A fresh snapshot replaces the extrapolation base outright
    pub fn apply_snapshot(&mut self, snapshot: &MovementSnapshot) {
        self.target = snapshot.position;
        self.target_rotation = snapshot.rotation;
        self.velocity = snapshot.velocity;
        self.floor = GROUND_Y.min(snapshot.position.y);
        self.anim = snapshot.anim;
        self.charge_level = snapshot.charge_level;
        self.grenade_charge_level = snapshot.grenade_charge_level;
    }

    /// Advances the extrapolated target and eases the rendered pose toward it
    pub fn update(&mut self, dt: f32) {
        let dt = dt.clamp(0.0, MAX_EXTRAPOLATION_STEP);

        self.target += self.velocity * dt;
        self.velocity.y -= GRAVITY * dt;
        if self.target.y < self.floor {
            self.target.y = self.floor;
            self.velocity.y = self.velocity.y.max(0.0);
        }

        let rate = if self.velocity.horizontal_length() > FAST_SPEED {
            FAST_RATE
        } else {
            SLOW_RATE
        };
        self.position = self.position.lerp(self.target, rate);
        self.rotation = wrap_angle(
            self.rotation + wrap_angle(self.target_rotation - self.rotation) * ROTATION_RATE,
        );
    }

    fn forward(&self) -> Vec3 {
        Vec3::from_yaw_pitch(self.rotation, 0.0)
    }

    /// Keeps mirrored visuals in step with the replicated state
    fn sync_visuals<W: World>(&mut self, world: &mut W) {
        let charging = self.visible && self.anim == AnimState::Charging;

        let anchor = self.position + self.forward() * ULTIMATE.spawn_distance;
        sync_indicator(
            world,
            &mut self.ultimate_indicator,
            charging && self.charge_level > 0.0,
            VisualKind::UltimateCharge,
            anchor,
            size_for(&ULTIMATE, self.charge_level),
        );

        let anchor = self.position + self.forward() * GRENADE.spawn_distance;
        sync_indicator(
            world,
            &mut self.grenade_indicator,
            charging && self.grenade_charge_level > 0.0,
            VisualKind::GrenadeCharge,
            anchor,
            size_for(&GRENADE, self.grenade_charge_level),
        );
    }

    fn despawn_visuals<W: World>(&mut self, world: &mut W) {
        for id in [
            self.ultimate_indicator.take(),
            self.grenade_indicator.take(),
            self.hook.take(),
        ]
        .into_iter()
        .flatten()
        {
            world.despawn_visual(id);
        }
        self.grapple_anchor = None;
    }
}

fn sync_indicator<W: World>(
    world: &mut W,
    slot: &mut Option<VisualId>,
    active: bool,
    kind: VisualKind,
    position: Vec3,
    scale: f32,
) {
    match (active, *slot) {
        (true, Some(id)) => world.move_visual(id, position, scale),
        (true, None) => *slot = Some(world.spawn_visual(kind, position, scale)),
        (false, Some(id)) => {
            world.despawn_visual(id);
            *slot = None;
        }
        (false, None) => {}
    }
}

/// All peers visible in the current room
#[derive(Debug, Default)]
pub struct ReplicaSet {
    replicas: HashMap<ClientId, RemoteReplica>,
}

impl ReplicaSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, player: &PlayerState) {
        self.replicas.insert(player.id, RemoteReplica::new(player));
    }

    pub fn remove<W: World>(&mut self, world: &mut W, id: ClientId) -> Option<RemoteReplica> {
        let mut replica = self.replicas.remove(&id)?;
        replica.despawn_visuals(world);
        Some(replica)
    }

    pub fn clear<W: World>(&mut self, world: &mut W) {
        for (_, mut replica) in self.replicas.drain() {
            replica.despawn_visuals(world);
        }
    }

    pub fn get(&self, id: ClientId) -> Option<&RemoteReplica> {
        self.replicas.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteReplica> {
        self.replicas.values()
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Snapshots for peers we have not been introduced to are ignored
    pub fn apply_snapshot(&mut self, id: ClientId, snapshot: &MovementSnapshot) -> bool {
        match self.replicas.get_mut(&id) {
            Some(replica) => {
                replica.apply_snapshot(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn update<W: World>(&mut self, world: &mut W, dt: f32) {
        for replica in self.replicas.values_mut() {
            replica.update(dt);
            replica.sync_visuals(world);
        }
    }

    pub fn grapple_started<W: World>(&mut self, world: &mut W, id: ClientId, anchor: Vec3) {
        if let Some(replica) = self.replicas.get_mut(&id) {
            if let Some(old) = replica.hook.take() {
                world.despawn_visual(old);
            }
            replica.grapple_anchor = Some(anchor);
            replica.hook = Some(world.spawn_visual(VisualKind::GrappleHook, anchor, 1.0));
        }
    }

    pub fn grapple_ended<W: World>(&mut self, world: &mut W, id: ClientId) {
        if let Some(replica) = self.replicas.get_mut(&id) {
            if let Some(hook) = replica.hook.take() {
                world.despawn_visual(hook);
            }
            replica.grapple_anchor = None;
        }
    }

    /// Hides a dead peer along with everything mirrored from it
    pub fn hide<W: World>(&mut self, world: &mut W, id: ClientId) {
        if let Some(replica) = self.replicas.get_mut(&id) {
            replica.visible = false;
            replica.anim = AnimState::Idle;
            replica.charge_level = 0.0;
            replica.grenade_charge_level = 0.0;
            replica.despawn_visuals(world);
        }
    }

    /// Shows a respawned peer at its spawn point without easing there
    pub fn reveal(&mut self, id: ClientId, position: Vec3) {
        if let Some(replica) = self.replicas.get_mut(&id) {
            replica.visible = true;
            replica.position = position;
            replica.target = position;
            replica.velocity = Vec3::ZERO;
            replica.floor = GROUND_Y.min(position.y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::ArenaWorld;
    use assert_approx_eq::assert_approx_eq;

    fn peer(id: ClientId, position: Vec3) -> PlayerState {
        let mut player = PlayerState::new(id, "peer", "default");
        player.position = position;
        player
    }

    fn snapshot(position: Vec3, velocity: Vec3) -> MovementSnapshot {
        MovementSnapshot {
            position,
            velocity,
            ..MovementSnapshot::default()
        }
    }

    #[test]
    fn test_wrap_angle() {
        assert_approx_eq!(wrap_angle(0.0), 0.0);
        assert_approx_eq!(wrap_angle(PI), PI);
        assert_approx_eq!(wrap_angle(-PI), PI);
        assert_approx_eq!(wrap_angle(3.0 * PI / 2.0), -PI / 2.0, 1e-5);
        assert_approx_eq!(wrap_angle(-3.0 * PI / 2.0), PI / 2.0, 1e-5);
    }

    #[test]
    fn test_converges_toward_new_snapshot() {
        let mut replica = RemoteReplica::new(&peer(2, Vec3::new(0.0, 0.5, 0.0)));
        replica.apply_snapshot(&snapshot(Vec3::new(0.0, 0.5, 0.0), Vec3::new(3.0, 0.0, 0.0)));
        for _ in 0..10 {
            replica.update(1.0 / 60.0);
        }

        let s2 = Vec3::new(2.0, 0.5, 4.0);
        replica.apply_snapshot(&snapshot(s2, Vec3::ZERO));

        let mut last = replica.position.distance(s2);
        for _ in 0..30 {
            replica.update(1.0 / 60.0);
            let now = replica.position.distance(s2);
            assert!(now < last, "moved away from the snapshot: {} >= {}", now, last);
            last = now;
        }
    }

    #[test]
    fn test_snapshot_resets_extrapolation_base() {
        let mut replica = RemoteReplica::new(&peer(2, Vec3::new(0.0, 0.5, 0.0)));
        replica.apply_snapshot(&snapshot(Vec3::new(0.0, 0.5, 0.0), Vec3::new(10.0, 0.0, 0.0)));
        replica.update(0.05);
        assert!(replica.target().x > 0.0);

        replica.apply_snapshot(&snapshot(Vec3::new(-1.0, 0.5, 0.0), Vec3::ZERO));
        assert_eq!(replica.target(), Vec3::new(-1.0, 0.5, 0.0));
    }

    #[test]
    fn test_extrapolation_step_is_capped() {
        let mut replica = RemoteReplica::new(&peer(2, Vec3::new(0.0, 0.5, 0.0)));
        replica.apply_snapshot(&snapshot(Vec3::new(0.0, 0.5, 0.0), Vec3::new(10.0, 0.0, 0.0)));

        replica.update(5.0);

        assert_approx_eq!(replica.target().x, 1.0);
    }

    #[test]
    fn test_gravity_does_not_sink_below_floor() {
        let mut replica = RemoteReplica::new(&peer(2, Vec3::new(0.0, 0.5, 0.0)));
        replica.apply_snapshot(&snapshot(Vec3::new(0.0, 0.5, 0.0), Vec3::new(0.0, -2.0, 0.0)));
        for _ in 0..60 {
            replica.update(1.0 / 60.0);
        }
        assert_approx_eq!(replica.target().y, 0.5);

        // A peer already below the floor keeps falling from its own height
        replica.apply_snapshot(&snapshot(Vec3::new(30.0, -5.0, 0.0), Vec3::ZERO));
        replica.update(0.05);
        assert_approx_eq!(replica.target().y, -5.0);
    }

    #[test]
    fn test_rotation_takes_short_path() {
        let mut player = peer(2, Vec3::ZERO);
        player.rotation = PI - 0.1;
        let mut replica = RemoteReplica::new(&player);
        replica.apply_snapshot(&MovementSnapshot {
            rotation: -PI + 0.1,
            ..MovementSnapshot::default()
        });

        replica.update(1.0 / 60.0);

        // Crossing the seam instead of sweeping back through zero
        assert!(replica.rotation.abs() > PI - 0.1);
    }

    #[test]
    fn test_charge_indicator_mirrored_and_hidden() {
        let mut world = ArenaWorld::new(Vec3::ZERO);
        let mut replicas = ReplicaSet::new();
        replicas.insert(&peer(2, Vec3::new(0.0, 0.5, 0.0)));

        replicas.apply_snapshot(
            2,
            &MovementSnapshot {
                position: Vec3::new(0.0, 0.5, 0.0),
                anim: AnimState::Charging,
                charge_level: 50.0,
                ..MovementSnapshot::default()
            },
        );
        replicas.update(&mut world, 1.0 / 60.0);
        assert_eq!(world.visuals().count(), 1);
        assert_approx_eq!(world.visuals().next().unwrap().scale, 0.35);

        replicas.grapple_started(&mut world, 2, Vec3::new(0.0, 5.0, 10.0));
        assert_eq!(world.visuals().count(), 2);

        replicas.hide(&mut world, 2);
        replicas.update(&mut world, 1.0 / 60.0);
        assert_eq!(world.visuals().count(), 0);
        assert!(!replicas.get(2).unwrap().visible);

        replicas.reveal(2, Vec3::new(0.0, 3.0, 0.0));
        let replica = replicas.get(2).unwrap();
        assert!(replica.visible);
        assert_eq!(replica.position, Vec3::new(0.0, 3.0, 0.0));
    }

    #[test]
    fn test_unknown_peer_snapshot_ignored() {
        let mut replicas = ReplicaSet::new();
        assert!(!replicas.apply_snapshot(9, &MovementSnapshot::default()));
        assert!(replicas.is_empty());
    }
}
