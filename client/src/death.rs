//! Local death detection, kill attribution and the respawn countdown

use crate::game::TimerEvent;
use crate::scheduler::{Scheduler, TimerId};
use crate::world::World;
use shared::{
    ClientId, Packet, Vec3, DEATH_HEIGHT, HIT_MEMORY_SECS, RESPAWN_COUNTDOWN_SECS, SPAWN_POSITION,
};

pub const CAUSE_FELL: &str = "Fell to Death";
pub const CAUSE_KNOCKED: &str = "Knocked into Void";
pub const CAUSE_BALL: &str = "Knocked into the void by Ball";
pub const CAUSE_BAT: &str = "Knocked into the void with Knockback Stick";
pub const CAUSE_GRENADE: &str = "Blown into the void by Grenade";
pub const CAUSE_ULTIMATE: &str = "Obliterated by Ultimate";

#[derive(Debug, Clone, PartialEq)]
pub struct HitRecord {
    pub attacker: ClientId,
    pub cause: Option<String>,
    /// Scheduler clock at the time of the hit
    pub at: f64,
}

/// Remembers the most recent hit taken from another player
#[derive(Debug, Default)]
pub struct HitTracker {
    last: Option<HitRecord>,
}

impl HitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, attacker: ClientId, cause: Option<&str>, now: f64) {
        self.last = Some(HitRecord {
            attacker,
            cause: cause.map(str::to_string),
            at: now,
        });
    }

    pub fn last(&self) -> Option<&HitRecord> {
        self.last.as_ref()
    }

    /// Killer and cause for a death at `now`; hits older than the memory
    /// window no longer count
    pub fn attribute(&self, now: f64) -> (Option<ClientId>, String) {
        match &self.last {
            Some(hit) if now - hit.at <= f64::from(HIT_MEMORY_SECS) => (
                Some(hit.attacker),
                hit.cause.clone().unwrap_or_else(|| CAUSE_KNOCKED.to_string()),
            ),
            _ => (None, CAUSE_FELL.to_string()),
        }
    }

    pub fn clear(&mut self) {
        self.last = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeState {
    Alive,
    Dead { seconds_left: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeathTrigger {
    /// Dropped below the death height; attribution comes from recent hits
    Fell,
    /// Killed outright by another player's attack
    Instant { killer: ClientId, cause: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeathRecord {
    pub killer: Option<ClientId>,
    pub cause: String,
}

#[derive(Debug)]
pub struct DeathCoordinator {
    state: LifeState,
    countdown: Option<TimerId>,
    hits: HitTracker,
    last_death: Option<DeathRecord>,
}

impl DeathCoordinator {
    pub fn new() -> Self {
        Self {
            state: LifeState::Alive,
            countdown: None,
            hits: HitTracker::new(),
            last_death: None,
        }
    }

    pub fn state(&self) -> LifeState {
        self.state
    }

    pub fn is_dead(&self) -> bool {
        matches!(self.state, LifeState::Dead { .. })
    }

    pub fn hits(&self) -> &HitTracker {
        &self.hits
    }

    /// How the most recent death was attributed locally
    pub fn last_death(&self) -> Option<&DeathRecord> {
        self.last_death.as_ref()
    }

    pub fn record_hit(&mut self, attacker: ClientId, cause: Option<&str>, now: f64) {
        if !self.is_dead() {
            self.hits.record(attacker, cause, now);
        }
    }

    pub fn below_death_height(position: Vec3) -> bool {
        position.y < DEATH_HEIGHT
    }

    /// Enters `Dead` and starts the respawn countdown. Returns the death
    /// notice for the room, or `None` when already dead.
    pub fn die(
        &mut self,
        scheduler: &mut Scheduler<TimerEvent>,
        trigger: DeathTrigger,
    ) -> Option<Packet> {
        if self.is_dead() {
            return None;
        }

        let (killer, cause) = match trigger {
            DeathTrigger::Fell => self.hits.attribute(scheduler.now()),
            DeathTrigger::Instant { killer, cause } => (Some(killer), cause),
        };

        self.state = LifeState::Dead {
            seconds_left: RESPAWN_COUNTDOWN_SECS,
        };
        self.countdown = Some(scheduler.repeat(
            1.0,
            RESPAWN_COUNTDOWN_SECS,
            TimerEvent::RespawnTick,
        ));
        self.hits.clear();
        self.last_death = Some(DeathRecord {
            killer,
            cause: cause.clone(),
        });

        Some(Packet::PlayerDied {
            killer_id: killer,
            cause,
        })
    }

    /// One countdown second. The last tick puts the body back at the spawn
    /// point and returns the respawn notice.
    pub fn on_tick<W: World>(&mut self, world: &mut W, remaining: u32) -> Option<Packet> {
        if !self.is_dead() {
            return None;
        }

        if remaining > 0 {
            self.state = LifeState::Dead {
                seconds_left: remaining,
            };
            return None;
        }

        world.teleport_body(SPAWN_POSITION);
        self.state = LifeState::Alive;
        self.countdown = None;
        Some(Packet::PlayerRespawned {
            position: SPAWN_POSITION,
        })
    }

    /// Forgets any death in progress, e.g. when leaving the room
    pub fn reset(&mut self, scheduler: &mut Scheduler<TimerEvent>) {
        if let Some(id) = self.countdown.take() {
            scheduler.cancel(id);
        }
        self.state = LifeState::Alive;
        self.hits.clear();
    }
}

impl Default for DeathCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
