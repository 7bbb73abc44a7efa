//! Scripted baseline opponent.
//!
//! [`BaselinePolicy`] plays the greedy strategy the difficulty profiles
//! in the core crate are tuned for: once the gate opens, march from the
//! strongest owned stronghold to the cheapest hostile target. Everything
//! random flows through the gate's seeded stream, so a seed pins the
//! whole match.

use conquest_core::action::Action;
use conquest_core::faction::FactionId;
use conquest_core::policy::{ConquestPolicy, PolicyGate, PolicyProfile};
use conquest_core::rng::SimRng;
use conquest_core::simulation::{ConquestSim, TickEvents, WorldView};

use crate::scenario::{Controller, Seat};

/// One garrison unit weighs as much as this many world units of distance
/// when ranking targets.
const GARRISON_WEIGHT: i64 = 32;

/// Greedy scripted policy driven by a [`PolicyGate`].
#[derive(Debug, Clone)]
pub struct BaselinePolicy {
    gate: PolicyGate,
}

impl BaselinePolicy {
    /// Create a policy with the given tuning and seed.
    #[must_use]
    pub const fn new(profile: PolicyProfile, seed: u64) -> Self {
        Self {
            gate: PolicyGate::new(profile, seed),
        }
    }

    /// The tuning this policy plays with.
    #[must_use]
    pub const fn profile(&self) -> &PolicyProfile {
        self.gate.profile()
    }
}

impl ConquestPolicy for BaselinePolicy {
    fn decide(&mut self, view: &WorldView<'_>, faction: FactionId) -> Option<Action> {
        if !self.gate.ready(view.now_ms) {
            return None;
        }
        let profile = *self.gate.profile();

        // Strongest stronghold that can spare units marches.
        let (source, origin) = view
            .strongholds
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                s.owner().faction() == Some(faction) && s.garrison() >= profile.min_garrison
            })
            .max_by_key(|(_, s)| s.garrison())
            .map(|(i, s)| (i, s.position()))?;

        // Cheapest hostile target: weak and close beats strong and far.
        // Ground already being marched on is skipped so the policy fans
        // out instead of stacking dispatches.
        let target = view
            .strongholds
            .iter()
            .enumerate()
            .filter(|(i, s)| {
                s.owner().hostile_to(faction)
                    && !view
                        .detachments
                        .iter()
                        .any(|d| d.faction() == faction && d.target() == *i)
            })
            .min_by_key(|(_, s)| {
                i64::from(s.garrison()) * GARRISON_WEIGHT
                    + origin.distance(s.position()).to_num::<i64>()
            })
            .map(|(i, _)| i)?;

        Some(Action::SendUnits {
            source,
            target,
            percentage: profile.attack_percentage,
            seed: self.gate.action_seed(),
        })
    }
}

/// Advance one tick with every scripted seat acting first.
///
/// Decisions are taken against the pre-tick view and queued, then the
/// world steps once.
pub fn drive_tick(
    sim: &mut ConquestSim,
    policies: &mut [(FactionId, BaselinePolicy)],
) -> TickEvents {
    let decisions: Vec<(FactionId, Action)> = {
        let view = sim.view();
        policies
            .iter_mut()
            .filter_map(|(faction, policy)| {
                policy.decide(&view, *faction).map(|a| (*faction, a))
            })
            .collect()
    };
    for (faction, action) in decisions {
        sim.queue_action(faction, action);
    }
    sim.tick()
}

/// Build the scripted roster for a match: one policy per baseline seat.
///
/// Every seat consumes one draw from the seeder whether or not it gets a
/// policy, so adding an external seat never shifts the streams of the
/// seats after it. The seeder is derived rather than seeded directly to
/// keep it clear of the layout stream keyed on the same value.
#[must_use]
pub fn roster(seats: &[Seat], match_seed: u64) -> Vec<(FactionId, BaselinePolicy)> {
    let mut seeder = SimRng::new(match_seed).derive();
    seats
        .iter()
        .filter_map(|seat| {
            let gate_seed = seeder.next_u64();
            match seat.controller {
                Controller::Baseline(difficulty) => Some((
                    FactionId(seat.faction),
                    BaselinePolicy::new(difficulty.profile(), gate_seed),
                )),
                Controller::External | Controller::Idle => None,
            }
        })
        .collect()
}
