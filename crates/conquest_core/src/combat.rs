//! Dice-driven engagements between an attacking pool and a garrison.
//!
//! An engagement binds one attacker pool to the target stronghold's
//! garrison. Rounds fire on a fixed cadence; each round both sides roll
//! and exactly one unit is removed. The garrison itself is the defender
//! pool, so sieges starve production and friendly arrivals reinforce
//! the defence directly.
//!
//! All dice come from a [`SimRng`] seeded by the detachment that opened
//! the engagement, which keeps outcomes identical across every peer
//! replaying the same actions.

use serde::{Deserialize, Serialize};

use crate::detachment::{Detachment, DetachmentId};
use crate::faction::FactionId;
use crate::rng::SimRng;
use crate::stronghold::Stronghold;

/// Milliseconds between combat rounds.
pub const ROUND_INTERVAL_MS: u64 = 500;

/// Engagements never run shorter than this.
pub const MIN_DURATION_MS: u64 = 2_000;

/// Duration contributed per unit present when the engagement opens.
pub const DURATION_PER_UNIT_MS: u64 = 500;

/// Clock extension per attacker unit that joins mid-fight.
pub const REINFORCE_EXTENSION_MS: u64 = 300;

/// How an engagement ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Garrison wiped out; survivors become the new garrison.
    AttackerWins { survivors: u32 },
    /// Attacker pool wiped out; the stronghold stands.
    DefenderHolds,
    /// Clock ran out with both sides alive; the attackers disband and
    /// the garrison keeps whatever units it still has.
    Standoff,
}

/// One resolved combat round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundOutcome {
    /// Highest die the attacker kept.
    pub attacker_roll: u8,
    /// Highest die the defender kept.
    pub defender_roll: u8,
    /// True if the defender lost the unit this round. Ties go to the
    /// defender.
    pub attacker_won: bool,
}

/// What happened to an engagement during one tick.
#[derive(Debug, Clone, Default)]
pub struct EngagementStep {
    /// Rounds fought this tick, in order.
    pub rounds: Vec<RoundOutcome>,
    /// Set once the engagement is over.
    pub resolution: Option<Resolution>,
}

/// An active fight over a stronghold.
///
/// The attacker pool lives here; the defender pool is the stronghold's
/// garrison, mutated in place as rounds resolve.
#[derive(Debug, Clone, Hash, Serialize, Deserialize)]
pub struct Engagement {
    attacker: DetachmentId,
    faction: FactionId,
    units: u32,
    rng: SimRng,
    opened_at: u64,
    duration_ms: u64,
    next_round_at: u64,
}

/// Defender dice scale with how outnumbered the attacker is: three dice
/// at two-to-one or worse, two when merely matched, one otherwise.
#[must_use]
pub(crate) const fn defender_dice_count(defenders: u32, attackers: u32) -> u32 {
    if defenders >= attackers.saturating_mul(2) {
        3
    } else if defenders >= attackers {
        2
    } else {
        1
    }
}

impl Engagement {
    /// Open an engagement for an arriving detachment. The clock scales
    /// with the total units present, floored at [`MIN_DURATION_MS`].
    #[must_use]
    pub fn open(attacker: &Detachment, defender_garrison: u32, now_ms: u64) -> Self {
        let total = u64::from(attacker.units()) + u64::from(defender_garrison);
        let duration_ms = (total * DURATION_PER_UNIT_MS).max(MIN_DURATION_MS);
        Self {
            attacker: attacker.id(),
            faction: attacker.faction(),
            units: attacker.units(),
            rng: SimRng::new(attacker.seed()),
            opened_at: now_ms,
            duration_ms,
            next_round_at: now_ms + ROUND_INTERVAL_MS,
        }
    }

    /// Detachment fighting as the attacker.
    #[must_use]
    pub const fn attacker(&self) -> DetachmentId {
        self.attacker
    }

    /// Attacking faction.
    #[must_use]
    pub const fn faction(&self) -> FactionId {
        self.faction
    }

    /// Attacking units still standing.
    #[must_use]
    pub const fn units(&self) -> u32 {
        self.units
    }

    /// Timestamp (ms) at which the engagement opened.
    #[must_use]
    pub const fn opened_at(&self) -> u64 {
        self.opened_at
    }

    /// Current engagement duration, including reinforcement extensions.
    #[must_use]
    pub const fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Timestamp at which the engagement times out.
    #[must_use]
    pub const fn deadline(&self) -> u64 {
        self.opened_at + self.duration_ms
    }

    /// Roll `dice` d6 and keep the highest face.
    fn roll_keep_highest(&mut self, dice: u32) -> u8 {
        let mut best = 0;
        for _ in 0..dice {
            best = best.max(self.rng.roll_d6());
        }
        best
    }

    /// One round: attacker rolls two dice, defender rolls by ratio, both
    /// keep their highest. Strictly higher attacker roll removes a
    /// defender; anything else removes an attacker.
    fn fight_round(&mut self, defender: &mut Stronghold) -> RoundOutcome {
        let attacker_roll = self.roll_keep_highest(2);
        let dice = defender_dice_count(defender.garrison(), self.units);
        let defender_roll = self.roll_keep_highest(dice);
        let attacker_won = attacker_roll > defender_roll;
        if attacker_won {
            defender.remove_one();
        } else {
            self.units -= 1;
        }
        RoundOutcome {
            attacker_roll,
            defender_roll,
            attacker_won,
        }
    }

    /// Advance the engagement to `now_ms`, running any due rounds, and
    /// report the resolution if one was reached.
    ///
    /// A wiped side resolves the fight in the same tick it empties; the
    /// clock only matters while both sides are alive.
    pub fn step(&mut self, defender: &mut Stronghold, now_ms: u64) -> EngagementStep {
        let mut rounds = Vec::new();
        while now_ms >= self.next_round_at {
            if self.units == 0 || defender.garrison() == 0 {
                break;
            }
            rounds.push(self.fight_round(defender));
            self.next_round_at += ROUND_INTERVAL_MS;
        }

        let resolution = if self.units == 0 {
            Some(Resolution::DefenderHolds)
        } else if defender.garrison() == 0 {
            Some(Resolution::AttackerWins {
                survivors: self.units,
            })
        } else if now_ms.saturating_sub(self.opened_at) >= self.duration_ms {
            Some(Resolution::Standoff)
        } else {
            None
        };

        EngagementStep { rounds, resolution }
    }

    /// Fold a same-faction arrival into the attacker pool.
    ///
    /// Late joiners contribute less: the effective addition scales with
    /// the time remaining on the clock, and the shortfall is lost. Every
    /// joining unit still extends the clock. Returns the units actually
    /// added.
    pub fn reinforce(&mut self, joining: u32, now_ms: u64) -> u32 {
        let elapsed = now_ms.saturating_sub(self.opened_at).min(self.duration_ms);
        let remaining = self.duration_ms - elapsed;
        let effective = (u64::from(joining) * remaining / self.duration_ms) as u32;
        self.units += effective;
        self.duration_ms = (self.duration_ms + REINFORCE_EXTENSION_MS * u64::from(joining))
            .max(MIN_DURATION_MS);
        effective
    }
}
