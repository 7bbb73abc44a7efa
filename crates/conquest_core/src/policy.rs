//! AI collaborator contract.
//!
//! Policies are external to the simulator: they read a [`WorldView`]
//! and may emit the same dispatch action a human click would. The
//! simulator never calls a policy itself; the driver (headless runner,
//! or a lobby hosting AI seats) owns that loop.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::faction::FactionId;
use crate::rng::SimRng;
use crate::simulation::WorldView;

/// Per-tick decision scale: a profile's `decision_chance` is measured
/// out of this many.
pub const DECISION_SCALE: u32 = 10_000;

/// Decision maker for one faction.
pub trait ConquestPolicy {
    /// Consider the world and optionally issue one dispatch.
    fn decide(&mut self, view: &WorldView<'_>, faction: FactionId) -> Option<Action>;
}

/// Tuning knobs for how aggressively a policy plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyProfile {
    /// Chance per tick (out of [`DECISION_SCALE`]) that the faction
    /// considers acting at all.
    pub decision_chance: u32,
    /// Never dispatch from a stronghold holding fewer units than this.
    pub min_garrison: u32,
    /// Garrison percentage committed per dispatch.
    pub attack_percentage: u8,
    /// Minimum wait between two decisions.
    pub cooldown_ms: u64,
}

impl PolicyProfile {
    /// Cautious: rare decisions, deep reserves, small commitments.
    pub const EASY: Self = Self {
        decision_chance: 50,
        min_garrison: 15,
        attack_percentage: 40,
        cooldown_ms: 5_000,
    };

    /// Balanced default.
    pub const NORMAL: Self = Self {
        decision_chance: 80,
        min_garrison: 10,
        attack_percentage: 50,
        cooldown_ms: 3_000,
    };

    /// Aggressive: frequent decisions, thin reserves, heavy commitments.
    pub const HARD: Self = Self {
        decision_chance: 120,
        min_garrison: 8,
        attack_percentage: 60,
        cooldown_ms: 1_500,
    };
}

impl Default for PolicyProfile {
    fn default() -> Self {
        Self::NORMAL
    }
}

/// Rate limiter in front of a policy: a low per-tick probability gated
/// by a per-faction cooldown, driven by its own deterministic stream.
#[derive(Debug, Clone)]
pub struct PolicyGate {
    profile: PolicyProfile,
    rng: SimRng,
    next_decision_at: u64,
}

impl PolicyGate {
    /// Create a gate with its own decision stream.
    #[must_use]
    pub const fn new(profile: PolicyProfile, seed: u64) -> Self {
        Self {
            profile,
            rng: SimRng::new(seed),
            next_decision_at: 0,
        }
    }

    /// The profile this gate enforces.
    #[must_use]
    pub const fn profile(&self) -> &PolicyProfile {
        &self.profile
    }

    /// Roll the per-tick gate. A pass arms the cooldown.
    pub fn ready(&mut self, now_ms: u64) -> bool {
        if now_ms < self.next_decision_at {
            return false;
        }
        if !self.rng.chance(self.profile.decision_chance, DECISION_SCALE) {
            return false;
        }
        self.next_decision_at = now_ms + self.profile.cooldown_ms;
        true
    }

    /// Seed for the action this decision is about to emit.
    pub fn action_seed(&mut self) -> u64 {
        self.rng.next_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn always_fires() -> PolicyProfile {
        PolicyProfile {
            decision_chance: DECISION_SCALE,
            cooldown_ms: 3_000,
            ..PolicyProfile::NORMAL
        }
    }

    #[test]
    fn test_gate_arms_cooldown() {
        let mut gate = PolicyGate::new(always_fires(), 11);
        assert!(gate.ready(0));
        assert!(!gate.ready(1_000));
        assert!(!gate.ready(2_999));
        assert!(gate.ready(3_000));
    }

    #[test]
    fn test_zero_chance_never_fires() {
        let mut gate = PolicyGate::new(
            PolicyProfile {
                decision_chance: 0,
                ..PolicyProfile::NORMAL
            },
            11,
        );
        for tick in 0..100u64 {
            assert!(!gate.ready(tick * 50));
        }
    }

    #[test]
    fn test_gate_is_deterministic() {
        let mut a = PolicyGate::new(PolicyProfile::NORMAL, 7);
        let mut b = PolicyGate::new(PolicyProfile::NORMAL, 7);
        for tick in 0..2_000u64 {
            let now = tick * 50;
            assert_eq!(a.ready(now), b.ready(now));
        }
    }

    #[test]
    fn test_profiles_scale_with_difficulty() {
        assert!(PolicyProfile::HARD.decision_chance > PolicyProfile::EASY.decision_chance);
        assert!(PolicyProfile::HARD.cooldown_ms < PolicyProfile::EASY.cooldown_ms);
        assert!(PolicyProfile::HARD.min_garrison < PolicyProfile::EASY.min_garrison);
    }
}
