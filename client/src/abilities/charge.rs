//! Hold-to-charge abilities: the ultimate and the grenade share one state machine

use crate::world::{VisualId, VisualKind, World};
use shared::{Vec3, MAX_CHARGE};

/// Charge rates are expressed per simulated frame of this length
pub const FRAME_SECS: f32 = 0.016_67;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseRule {
    /// Fires only at full charge; releasing early cancels
    FullChargeOnly,
    /// Fires at whatever charge was reached
    AnyCharge,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargeProfile {
    pub rate_per_frame: f32,
    pub min_size: f32,
    pub max_size: f32,
    pub release: ReleaseRule,
    pub visual: VisualKind,
    /// Distance along the aim where the indicator and projectile appear
    pub spawn_distance: f32,
}

pub const ULTIMATE: ChargeProfile = ChargeProfile {
    rate_per_frame: MAX_CHARGE / (3000.0 / 16.67),
    min_size: 0.1,
    max_size: 0.6,
    release: ReleaseRule::FullChargeOnly,
    visual: VisualKind::UltimateCharge,
    spawn_distance: 2.0,
};

pub const GRENADE: ChargeProfile = ChargeProfile {
    rate_per_frame: MAX_CHARGE / (3000.0 / 16.67),
    min_size: 0.2,
    max_size: 0.8,
    release: ReleaseRule::AnyCharge,
    visual: VisualKind::GrenadeCharge,
    spawn_distance: 1.5,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargePhase {
    Idle,
    Charging,
}

#[derive(Debug)]
pub struct ChargeAbility {
    profile: ChargeProfile,
    phase: ChargePhase,
    charge: f32,
    indicator: Option<VisualId>,
}

impl ChargeAbility {
    pub fn new(profile: ChargeProfile) -> Self {
        Self {
            profile,
            phase: ChargePhase::Idle,
            charge: 0.0,
            indicator: None,
        }
    }

    pub fn profile(&self) -> &ChargeProfile {
        &self.profile
    }

    pub fn phase(&self) -> ChargePhase {
        self.phase
    }

    pub fn is_charging(&self) -> bool {
        self.phase == ChargePhase::Charging
    }

    /// Current charge, 0..=100
    pub fn charge(&self) -> f32 {
        self.charge
    }

    pub fn fraction(&self) -> f32 {
        self.charge / MAX_CHARGE
    }

    pub fn indicator_size(&self) -> f32 {
        size_for(&self.profile, self.charge)
    }

    pub fn indicator(&self) -> Option<VisualId> {
        self.indicator
    }

    /// Starts charging; refused while already charging or dead
    pub fn begin<W: World>(&mut self, world: &mut W, anchor: Vec3, dead: bool) -> bool {
        if dead || self.is_charging() {
            return false;
        }

        self.phase = ChargePhase::Charging;
        self.charge = 0.0;
        self.indicator = Some(world.spawn_visual(self.profile.visual, anchor, self.profile.min_size));
        true
    }

    /// Accumulates charge for `dt` seconds. Returns the released charge when
    /// it reaches full.
    pub fn tick<W: World>(&mut self, world: &mut W, anchor: Vec3, dt: f32) -> Option<f32> {
        if !self.is_charging() {
            return None;
        }

        let gained = self.profile.rate_per_frame * (dt / FRAME_SECS);
        self.charge = (self.charge + gained).clamp(0.0, MAX_CHARGE);

        if let Some(id) = self.indicator {
            world.move_visual(id, anchor, self.indicator_size());
        }

        if self.charge >= MAX_CHARGE {
            return self.finish(world);
        }
        None
    }

    /// Hold-input released. Returns the charge to fire with, or `None` when
    /// the release rule turned it into a cancellation.
    pub fn release<W: World>(&mut self, world: &mut W) -> Option<f32> {
        if !self.is_charging() {
            return None;
        }

        let fires = match self.profile.release {
            ReleaseRule::FullChargeOnly => self.charge >= MAX_CHARGE,
            ReleaseRule::AnyCharge => self.charge > 0.0,
        };

        if fires {
            self.finish(world)
        } else {
            self.cancel(world);
            None
        }
    }

    /// Back to idle with zero charge and no indicator
    pub fn cancel<W: World>(&mut self, world: &mut W) {
        if let Some(id) = self.indicator.take() {
            world.despawn_visual(id);
        }
        self.phase = ChargePhase::Idle;
        self.charge = 0.0;
    }

    fn finish<W: World>(&mut self, world: &mut W) -> Option<f32> {
        let charge = self.charge;
        self.cancel(world);
        Some(charge)
    }
}

/// Indicator size for a charge level, shared with replicas mirroring a peer's charge
pub fn size_for(profile: &ChargeProfile, charge: f32) -> f32 {
    let fraction = (charge / MAX_CHARGE).clamp(0.0, 1.0);
    profile.min_size + (profile.max_size - profile.min_size) * fraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::ArenaWorld;
    use assert_approx_eq::assert_approx_eq;

    fn world() -> ArenaWorld {
        ArenaWorld::new(Vec3::new(0.0, 0.5, 0.0))
    }

    #[test]
    fn test_begin_guards() {
        let mut world = world();
        let mut ultimate = ChargeAbility::new(ULTIMATE);

        assert!(!ultimate.begin(&mut world, Vec3::ZERO, true));
        assert_eq!(ultimate.phase(), ChargePhase::Idle);

        assert!(ultimate.begin(&mut world, Vec3::ZERO, false));
        assert!(!ultimate.begin(&mut world, Vec3::ZERO, false));
        assert_eq!(world.visuals().count(), 1);
    }

    #[test]
    fn test_charge_rate_per_frame() {
        let mut world = world();
        let mut ultimate = ChargeAbility::new(ULTIMATE);
        ultimate.begin(&mut world, Vec3::ZERO, false);

        ultimate.tick(&mut world, Vec3::ZERO, FRAME_SECS);
        assert_approx_eq!(ultimate.charge(), 0.5557, 0.001);
        assert_approx_eq!(
            ultimate.indicator_size(),
            0.1 + 0.5 * ultimate.fraction(),
            1e-5
        );
    }

    #[test]
    fn test_ultimate_auto_releases_at_full() {
        let mut world = world();
        let mut ultimate = ChargeAbility::new(ULTIMATE);
        ultimate.begin(&mut world, Vec3::ZERO, false);

        let mut released = None;
        for _ in 0..400 {
            assert!(ultimate.charge() <= MAX_CHARGE);
            if let Some(charge) = ultimate.tick(&mut world, Vec3::ZERO, FRAME_SECS) {
                released = Some(charge);
                break;
            }
        }

        assert_eq!(released, Some(MAX_CHARGE));
        assert_eq!(ultimate.phase(), ChargePhase::Idle);
        assert_eq!(world.visuals().count(), 0);
    }

    #[test]
    fn test_ultimate_early_release_cancels() {
        let mut world = world();
        let mut ultimate = ChargeAbility::new(ULTIMATE);
        ultimate.begin(&mut world, Vec3::ZERO, false);
        for _ in 0..60 {
            ultimate.tick(&mut world, Vec3::ZERO, FRAME_SECS);
        }

        assert_eq!(ultimate.release(&mut world), None);
        assert_eq!(ultimate.charge(), 0.0);
        assert_eq!(world.visuals().count(), 0);
    }

    #[test]
    fn test_grenade_releases_partial_charge() {
        let mut world = world();
        let mut grenade = ChargeAbility::new(GRENADE);
        grenade.begin(&mut world, Vec3::ZERO, false);
        for _ in 0..90 {
            grenade.tick(&mut world, Vec3::ZERO, FRAME_SECS);
        }

        let charge = grenade.release(&mut world).unwrap();
        assert!(charge > 40.0 && charge < 60.0);
        assert!(!grenade.is_charging());
    }

    #[test]
    fn test_grenade_zero_charge_release_cancels() {
        let mut world = world();
        let mut grenade = ChargeAbility::new(GRENADE);
        grenade.begin(&mut world, Vec3::ZERO, false);

        assert_eq!(grenade.release(&mut world), None);
        assert_eq!(world.visuals().count(), 0);
    }

    #[test]
    fn test_cancel_resets_everything() {
        let mut world = world();
        let mut grenade = ChargeAbility::new(GRENADE);
        grenade.begin(&mut world, Vec3::ZERO, false);
        grenade.tick(&mut world, Vec3::ZERO, 0.5);

        grenade.cancel(&mut world);

        assert_eq!(grenade.charge(), 0.0);
        assert_eq!(grenade.phase(), ChargePhase::Idle);
        assert!(grenade.indicator().is_none());
        assert_eq!(world.visuals().count(), 0);
    }

    #[test]
    fn test_size_for_clamps() {
        assert_approx_eq!(size_for(&GRENADE, -5.0), 0.2);
        assert_approx_eq!(size_for(&GRENADE, 500.0), 0.8);
    }
}
