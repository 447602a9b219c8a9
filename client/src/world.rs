//! Narrow interface to the physics and rendering collaborator
//!
//! Gameplay code only spawns visuals at a pose, applies impulses to the local
//! body, raycasts against world geometry and reads back contacts. [`ArenaWorld`]
//! is a small kinematic stand-in used by the debug client and tests; it is not
//! a general physics engine.

use shared::{Block, ClientId, Vec3, DEATH_HEIGHT};
use std::collections::HashMap;

pub type VisualId = u64;
pub type ProjectileId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualKind {
    UltimateCharge,
    GrenadeCharge,
    Bat,
    GrappleHook,
    Explosion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectileKind {
    Ball,
    Ultimate,
    Grenade,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectileSpawn {
    pub kind: ProjectileKind,
    pub owner: ClientId,
    pub position: Vec3,
    pub impulse: Vec3,
    pub mass: f32,
    /// Collision radius
    pub size: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Vec3,
    pub distance: f32,
}

/// Collision results reported back to gameplay code after a step
#[derive(Debug, Clone, PartialEq)]
pub enum Contact {
    /// Someone else's projectile touched the local body
    LocalHit {
        owner: ClientId,
        kind: ProjectileKind,
        velocity: Vec3,
    },
    /// A projectile touched the ground or a block and was removed
    Landed {
        owner: ClientId,
        kind: ProjectileKind,
        position: Vec3,
        size: f32,
    },
}

pub trait World {
    /// Projectiles owned by this id never report a hit on the local body
    fn set_local_id(&mut self, id: ClientId);

    fn body_position(&self) -> Vec3;
    fn body_velocity(&self) -> Vec3;
    fn set_body_velocity(&mut self, velocity: Vec3);
    /// Moves the body and zeroes its velocity
    fn teleport_body(&mut self, position: Vec3);
    fn apply_impulse(&mut self, impulse: Vec3);
    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RayHit>;

    fn spawn_visual(&mut self, kind: VisualKind, position: Vec3, scale: f32) -> VisualId;
    fn move_visual(&mut self, id: VisualId, position: Vec3, scale: f32);
    fn despawn_visual(&mut self, id: VisualId);

    fn spawn_projectile(&mut self, spawn: ProjectileSpawn) -> ProjectileId;

    fn spawn_block(&mut self, block: &Block);
    fn push_block(&mut self, block_id: &str, impulse: Vec3);
    fn clear_blocks(&mut self);
    fn block_positions(&self) -> Vec<(String, Vec3)>;

    fn step(&mut self, dt: f32) -> Vec<Contact>;
}

pub const ARENA_RADIUS: f32 = 25.0;
pub const BODY_RADIUS: f32 = 0.5;
pub const GRAVITY: f32 = 9.81;
const PROJECTILE_LIFETIME: f32 = 10.0;
const BLOCK_DAMPING: f32 = 0.9;
/// Horizontal slowdown per second while standing on the floor
const GROUND_FRICTION: f32 = 4.0;

#[derive(Debug, Clone)]
pub struct Visual {
    pub kind: VisualKind,
    pub position: Vec3,
    pub scale: f32,
}

#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: ProjectileId,
    pub kind: ProjectileKind,
    pub owner: ClientId,
    pub position: Vec3,
    pub velocity: Vec3,
    pub size: f32,
    age: f32,
}

#[derive(Debug, Clone)]
pub struct BlockBody {
    pub id: String,
    pub position: Vec3,
    pub half_extent: f32,
    pub color: u32,
    velocity: Vec3,
}

impl BlockBody {
    fn contains(&self, point: Vec3, margin: f32) -> bool {
        let reach = self.half_extent + margin;
        (point.x - self.position.x).abs() <= reach
            && (point.y - self.position.y).abs() <= reach
            && (point.z - self.position.z).abs() <= reach
    }

    /// Slab intersection against the block's bounding box
    fn ray_distance(&self, origin: Vec3, direction: Vec3) -> Option<f32> {
        let min = self.position - Vec3::new(self.half_extent, self.half_extent, self.half_extent);
        let max = self.position + Vec3::new(self.half_extent, self.half_extent, self.half_extent);
        let mut t_min = 0.0f32;
        let mut t_max = f32::MAX;

        for (o, d, lo, hi) in [
            (origin.x, direction.x, min.x, max.x),
            (origin.y, direction.y, min.y, max.y),
            (origin.z, direction.z, min.z, max.z),
        ] {
            if d.abs() < 1e-6 {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let (t0, t1) = {
                let a = (lo - o) / d;
                let b = (hi - o) / d;
                if a < b {
                    (a, b)
                } else {
                    (b, a)
                }
            };
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

/// Disc-shaped floor at y = 0 with sphere body, ballistic projectiles and box blocks
pub struct ArenaWorld {
    local_id: ClientId,
    body_position: Vec3,
    body_velocity: Vec3,
    visuals: HashMap<VisualId, Visual>,
    projectiles: Vec<Projectile>,
    blocks: Vec<BlockBody>,
    next_id: u64,
}

impl ArenaWorld {
    pub fn new(spawn: Vec3) -> Self {
        Self {
            local_id: 0,
            body_position: spawn,
            body_velocity: Vec3::ZERO,
            visuals: HashMap::new(),
            projectiles: Vec::new(),
            blocks: Vec::new(),
            next_id: 1,
        }
    }

    pub fn visuals(&self) -> impl Iterator<Item = &Visual> {
        self.visuals.values()
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    pub fn blocks(&self) -> &[BlockBody] {
        &self.blocks
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn on_floor(point: Vec3) -> bool {
        point.horizontal_length() <= ARENA_RADIUS
    }

    fn step_body(&mut self, dt: f32) {
        let was_above_floor = self.body_position.y >= BODY_RADIUS - 0.25;
        self.body_velocity.y -= GRAVITY * dt;
        self.body_position += self.body_velocity * dt;

        if was_above_floor
            && Self::on_floor(self.body_position)
            && self.body_position.y < BODY_RADIUS
        {
            self.body_position.y = BODY_RADIUS;
            self.body_velocity.y = self.body_velocity.y.max(0.0);

            let keep = (1.0 - GROUND_FRICTION * dt).max(0.0);
            self.body_velocity.x *= keep;
            self.body_velocity.z *= keep;
        }

        // Stand on top of blocks
        for block in &self.blocks {
            let top = block.position.y + block.half_extent + BODY_RADIUS;
            let over = (self.body_position.x - block.position.x).abs() <= block.half_extent
                && (self.body_position.z - block.position.z).abs() <= block.half_extent;
            if over && self.body_position.y < top && self.body_position.y > top - 0.5 {
                self.body_position.y = top;
                self.body_velocity.y = self.body_velocity.y.max(0.0);
            }
        }
    }

    fn step_projectiles(&mut self, dt: f32, contacts: &mut Vec<Contact>) {
        let body = self.body_position;
        let local_id = self.local_id;
        let blocks = &self.blocks;

        self.projectiles.retain_mut(|p| {
            if p.kind != ProjectileKind::Ultimate {
                p.velocity.y -= GRAVITY * dt;
            }
            p.position += p.velocity * dt;
            p.age += dt;

            if p.owner != local_id && p.position.distance(body) < BODY_RADIUS + p.size {
                contacts.push(Contact::LocalHit {
                    owner: p.owner,
                    kind: p.kind,
                    velocity: p.velocity,
                });
                return false;
            }

            let grounded = Self::on_floor(p.position) && p.position.y - p.size <= 0.0;
            let blocked = blocks.iter().any(|b| b.contains(p.position, p.size));
            if grounded || blocked {
                contacts.push(Contact::Landed {
                    owner: p.owner,
                    kind: p.kind,
                    position: p.position,
                    size: p.size,
                });
                return false;
            }

            p.age < PROJECTILE_LIFETIME && p.position.y > DEATH_HEIGHT
        });
    }
}

impl World for ArenaWorld {
    fn set_local_id(&mut self, id: ClientId) {
        self.local_id = id;
    }

    fn body_position(&self) -> Vec3 {
        self.body_position
    }

    fn body_velocity(&self) -> Vec3 {
        self.body_velocity
    }

    fn set_body_velocity(&mut self, velocity: Vec3) {
        self.body_velocity = velocity;
    }

    fn teleport_body(&mut self, position: Vec3) {
        self.body_position = position;
        self.body_velocity = Vec3::ZERO;
    }

    fn apply_impulse(&mut self, impulse: Vec3) {
        self.body_velocity += impulse;
    }

    fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RayHit> {
        let direction = direction.normalize();
        if direction == Vec3::ZERO {
            return None;
        }

        let mut best: Option<f32> = None;
        if direction.y < -1e-6 && origin.y > 0.0 {
            let t = -origin.y / direction.y;
            if Self::on_floor(origin + direction * t) {
                best = Some(t);
            }
        }
        for block in &self.blocks {
            if let Some(t) = block.ray_distance(origin, direction) {
                best = Some(best.map_or(t, |b| b.min(t)));
            }
        }

        best.filter(|t| *t <= max_distance).map(|t| RayHit {
            point: origin + direction * t,
            distance: t,
        })
    }

    fn spawn_visual(&mut self, kind: VisualKind, position: Vec3, scale: f32) -> VisualId {
        let id = self.next_id();
        self.visuals.insert(
            id,
            Visual {
                kind,
                position,
                scale,
            },
        );
        id
    }

    fn move_visual(&mut self, id: VisualId, position: Vec3, scale: f32) {
        if let Some(visual) = self.visuals.get_mut(&id) {
            visual.position = position;
            visual.scale = scale;
        }
    }

    fn despawn_visual(&mut self, id: VisualId) {
        self.visuals.remove(&id);
    }

    fn spawn_projectile(&mut self, spawn: ProjectileSpawn) -> ProjectileId {
        let id = self.next_id();
        let mass = spawn.mass.max(0.01);
        self.projectiles.push(Projectile {
            id,
            kind: spawn.kind,
            owner: spawn.owner,
            position: spawn.position,
            velocity: spawn.impulse * (1.0 / mass),
            size: spawn.size,
            age: 0.0,
        });
        id
    }

    fn spawn_block(&mut self, block: &Block) {
        self.blocks.retain(|b| b.id != block.id);
        self.blocks.push(BlockBody {
            id: block.id.clone(),
            position: block.position,
            half_extent: block.size / 2.0,
            color: block.color,
            velocity: Vec3::ZERO,
        });
    }

    fn push_block(&mut self, block_id: &str, impulse: Vec3) {
        if let Some(block) = self.blocks.iter_mut().find(|b| b.id == block_id) {
            block.velocity += impulse;
        }
    }

    fn clear_blocks(&mut self) {
        self.blocks.clear();
    }

    fn block_positions(&self) -> Vec<(String, Vec3)> {
        self.blocks
            .iter()
            .map(|b| (b.id.clone(), b.position))
            .collect()
    }

    fn step(&mut self, dt: f32) -> Vec<Contact> {
        let mut contacts = Vec::new();
        self.step_body(dt);
        self.step_projectiles(dt, &mut contacts);
        for block in &mut self.blocks {
            block.position += block.velocity * dt;
            block.velocity = block.velocity * BLOCK_DAMPING;
        }
        contacts
    }
}
