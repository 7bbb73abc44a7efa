//! Match layout generation.
//!
//! Each faction starts with a citadel in its own corner; a band of
//! neutral strongholds fills the middle ground. Placement is driven
//! entirely by the layout seed, so every peer given the same config
//! builds an identical stronghold array with identical indices.

use serde::{Deserialize, Serialize};

use crate::faction::{FactionId, Owner, MAX_FACTIONS};
use crate::math::{Fixed, Vec2Fixed};
use crate::rng::SimRng;
use crate::stronghold::Stronghold;

/// Distance kept between map edge and any stronghold.
pub const MAP_MARGIN: i64 = 80;

/// Minimum distance between any two strongholds.
pub const MIN_SPACING: i64 = 120;

/// Fewest neutral strongholds a layout aims for.
pub const NEUTRAL_COUNT_MIN: u32 = 6;

/// Most neutral strongholds a layout places.
pub const NEUTRAL_COUNT_MAX: u32 = 10;

/// Starting garrison for each faction's corner citadel.
pub const STARTING_GARRISON: u32 = 20;

const NEUTRAL_GARRISON_MIN: u32 = 5;
const NEUTRAL_GARRISON_MAX: u32 = 15;

/// Placement attempts per neutral stronghold before giving up on it.
const PLACEMENT_ATTEMPTS: u32 = 64;

/// Parameters for building a match layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Board width in world units.
    pub width: i64,
    /// Board height in world units.
    pub height: i64,
    /// Number of competing factions, clamped to 2..=4.
    pub factions: u8,
    /// Seed for neutral placement and garrison rolls.
    pub seed: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            factions: 2,
            seed: 42,
        }
    }
}

impl LayoutConfig {
    /// Faction count clamped to the supported range.
    #[must_use]
    pub fn faction_count(&self) -> u8 {
        self.factions.clamp(2, MAX_FACTIONS as u8)
    }

    /// Corner starting positions, opposite corners first so two-faction
    /// matches start diagonal from each other.
    fn corners(&self) -> [Vec2Fixed; MAX_FACTIONS] {
        let left = MAP_MARGIN;
        let right = self.width - MAP_MARGIN;
        let top = MAP_MARGIN;
        let bottom = self.height - MAP_MARGIN;
        [
            Vec2Fixed::from_ints(left, top),
            Vec2Fixed::from_ints(right, bottom),
            Vec2Fixed::from_ints(right, top),
            Vec2Fixed::from_ints(left, bottom),
        ]
    }
}

/// Build the stronghold array for a match.
///
/// Faction citadels occupy the first `factions` indices in faction
/// order; neutrals follow, their count drawn from the layout seed.
/// Neutral placement uses rejection sampling against [`MIN_SPACING`],
/// dropping a site after too many collisions rather than failing the
/// whole layout.
#[must_use]
pub fn generate_layout(config: &LayoutConfig, now_ms: u64) -> Vec<Stronghold> {
    let mut rng = SimRng::new(config.seed);
    let mut strongholds = Vec::with_capacity(MAX_FACTIONS + NEUTRAL_COUNT_MAX as usize);

    let corners = config.corners();
    for faction in 0..config.faction_count() {
        strongholds.push(Stronghold::new(
            corners[faction as usize],
            Owner::Faction(FactionId(faction)),
            STARTING_GARRISON,
            now_ms,
        ));
    }

    let neutral_count = rng.next_range(NEUTRAL_COUNT_MIN, NEUTRAL_COUNT_MAX + 1);

    let x_min = MAP_MARGIN;
    let x_max = axis_range_end(config.width);
    let y_min = MAP_MARGIN;
    let y_max = axis_range_end(config.height);
    let spacing_sq = Fixed::from_num(MIN_SPACING * MIN_SPACING);

    for _ in 0..neutral_count {
        for _ in 0..PLACEMENT_ATTEMPTS {
            let x = i64::from(rng.next_range(x_min as u32, x_max as u32));
            let y = i64::from(rng.next_range(y_min as u32, y_max as u32));
            let candidate = Vec2Fixed::from_ints(x, y);
            let clear = strongholds
                .iter()
                .all(|s| s.position().distance_squared(candidate) >= spacing_sq);
            if clear {
                let garrison = rng.next_range(NEUTRAL_GARRISON_MIN, NEUTRAL_GARRISON_MAX + 1);
                strongholds.push(Stronghold::new(candidate, Owner::Neutral, garrison, now_ms));
                break;
            }
        }
    }

    strongholds
}

/// Exclusive upper bound for a placement axis.
const fn axis_range_end(extent: i64) -> i64 {
    extent - MAP_MARGIN + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_layout() {
        let config = LayoutConfig::default();
        let a = generate_layout(&config, 0);
        let b = generate_layout(&config, 0);
        assert_eq!(a.len(), b.len());
        for (lhs, rhs) in a.iter().zip(b.iter()) {
            assert_eq!(lhs.position(), rhs.position());
            assert_eq!(lhs.owner(), rhs.owner());
            assert_eq!(lhs.garrison(), rhs.garrison());
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = generate_layout(&LayoutConfig::default(), 0);
        let b = generate_layout(
            &LayoutConfig {
                seed: 43,
                ..LayoutConfig::default()
            },
            0,
        );
        let same = a.len() == b.len()
            && a.iter()
                .zip(b.iter())
                .all(|(lhs, rhs)| lhs.position() == rhs.position());
        assert!(!same);
    }

    #[test]
    fn test_faction_citadels_come_first() {
        let config = LayoutConfig {
            factions: 3,
            ..LayoutConfig::default()
        };
        let layout = generate_layout(&config, 0);
        for faction in 0..3u8 {
            assert_eq!(
                layout[faction as usize].owner(),
                Owner::Faction(FactionId(faction))
            );
            assert_eq!(layout[faction as usize].garrison(), STARTING_GARRISON);
        }
        for stronghold in &layout[3..] {
            assert_eq!(stronghold.owner(), Owner::Neutral);
        }
    }

    #[test]
    fn test_neutral_garrisons_in_band() {
        let layout = generate_layout(&LayoutConfig::default(), 0);
        for stronghold in layout.iter().filter(|s| s.owner().is_neutral()) {
            assert!(stronghold.garrison() >= NEUTRAL_GARRISON_MIN);
            assert!(stronghold.garrison() <= NEUTRAL_GARRISON_MAX);
        }
    }

    #[test]
    fn test_neutral_count_in_band() {
        // Default board is roomy enough that no candidate site is ever
        // dropped, so the count drawn from the seed survives placement.
        for seed in 0..20 {
            let layout = generate_layout(
                &LayoutConfig {
                    seed,
                    ..LayoutConfig::default()
                },
                0,
            );
            let neutrals = layout.iter().filter(|s| s.owner().is_neutral()).count() as u32;
            assert!(
                (NEUTRAL_COUNT_MIN..=NEUTRAL_COUNT_MAX).contains(&neutrals),
                "seed {seed} produced {neutrals} neutrals"
            );
        }
    }

    #[test]
    fn test_minimum_spacing_holds() {
        let layout = generate_layout(&LayoutConfig::default(), 0);
        let spacing_sq = Fixed::from_num(MIN_SPACING * MIN_SPACING);
        for (i, a) in layout.iter().enumerate() {
            for b in layout.iter().skip(i + 1) {
                assert!(a.position().distance_squared(b.position()) >= spacing_sq);
            }
        }
    }

    #[test]
    fn test_positions_inside_margins() {
        let config = LayoutConfig::default();
        let layout = generate_layout(&config, 0);
        for stronghold in &layout {
            let p = stronghold.position();
            assert!(p.x >= Fixed::from_num(MAP_MARGIN));
            assert!(p.x <= Fixed::from_num(config.width - MAP_MARGIN));
            assert!(p.y >= Fixed::from_num(MAP_MARGIN));
            assert!(p.y <= Fixed::from_num(config.height - MAP_MARGIN));
        }
    }

    #[test]
    fn test_faction_count_clamped() {
        let config = LayoutConfig {
            factions: 9,
            ..LayoutConfig::default()
        };
        assert_eq!(config.faction_count(), 4);
        let layout = generate_layout(&config, 0);
        let owned = layout.iter().filter(|s| !s.owner().is_neutral()).count();
        assert_eq!(owned, 4);
    }
}
