//! Test fixtures and helpers.
//!
//! Hand-built boards for scenario tests. Layout generation is the normal
//! way to start a match; these builders exist so tests can pin exact
//! garrisons and distances instead of working around the generator.

use conquest_core::faction::{FactionId, Owner};
use conquest_core::math::{Fixed, Vec2Fixed};
use conquest_core::snapshot::{DetachmentState, MatchSnapshot, StrongholdState};
use conquest_core::stronghold::{Tier, GARRISON_CAPACITY};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> Fixed {
    Fixed::from_num(n)
}

/// Create a board position from integer coordinates.
#[must_use]
pub fn point(x: i64, y: i64) -> Vec2Fixed {
    Vec2Fixed::from_ints(x, y)
}

/// A stronghold held by a faction.
#[must_use]
pub fn faction_stronghold(x: i64, y: i64, faction: u8, garrison: u32) -> StrongholdState {
    StrongholdState {
        position: point(x, y),
        owner: Owner::Faction(FactionId(faction)),
        garrison,
        capacity: GARRISON_CAPACITY,
        tier: Tier::for_garrison(garrison),
    }
}

/// An unclaimed stronghold.
#[must_use]
pub fn neutral_stronghold(x: i64, y: i64, garrison: u32) -> StrongholdState {
    StrongholdState {
        position: point(x, y),
        owner: Owner::Neutral,
        garrison,
        capacity: GARRISON_CAPACITY,
        tier: Tier::for_garrison(garrison),
    }
}

/// A detachment that just departed `source` for `target`.
#[must_use]
pub fn departing_detachment(
    source: &StrongholdState,
    target: &StrongholdState,
    owner: u8,
    units: u32,
    seed: u64,
) -> DetachmentState {
    DetachmentState {
        source_pos: source.position,
        target_pos: target.position,
        position: source.position,
        units,
        owner: FactionId(owner),
        progress: Fixed::ZERO,
        seed,
    }
}

/// Assemble a snapshot from hand-placed strongholds.
///
/// The receiving peer is assigned faction 0; snapshot-level tests that
/// care about the assignment can overwrite it.
#[must_use]
pub fn board(strongholds: Vec<StrongholdState>, total_factions: u8) -> MatchSnapshot {
    MatchSnapshot {
        strongholds,
        detachments: Vec::new(),
        assigned_faction: 0,
        total_factions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conquest_core::simulation::ConquestSim;

    #[test]
    fn test_builders_produce_restorable_board() {
        let snapshot = board(
            vec![
                faction_stronghold(100, 100, 0, 20),
                neutral_stronghold(100, 300, 8),
            ],
            2,
        );
        let sim = ConquestSim::from_snapshot(&snapshot);
        assert_eq!(sim.strongholds().len(), 2);
        assert_eq!(sim.strongholds()[0].garrison(), 20);
        assert!(sim.strongholds()[1].owner().is_neutral());
    }

    #[test]
    fn test_tier_follows_garrison() {
        assert_eq!(faction_stronghold(0, 0, 0, 20).tier, Tier::Citadel);
        assert_eq!(neutral_stronghold(0, 0, 8).tier, Tier::Outpost);
    }
}
