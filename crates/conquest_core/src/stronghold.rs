//! Strongholds: the fixed sites factions fight over.
//!
//! A stronghold holds a garrison of whole units, produces one unit at a
//! fixed cadence while below capacity, and changes hands only through
//! combat resolution. The garrison field is private so every mutation
//! goes through an operation the simulation can account for.

use serde::{Deserialize, Serialize};

use crate::faction::Owner;
use crate::math::Vec2Fixed;

/// Hard cap on garrison size; production pauses and arriving friendly
/// units in excess of the cap are lost.
pub const GARRISON_CAPACITY: u32 = 80;

/// Base production cadence in milliseconds.
pub const PRODUCTION_INTERVAL_MS: u64 = 1_000;

/// Citadel production cadence in milliseconds.
pub const CITADEL_PRODUCTION_INTERVAL_MS: u64 = 500;

/// Garrison size at which an outpost becomes a watchtower.
pub const WATCHTOWER_THRESHOLD: u32 = 10;

/// Garrison size at which a watchtower becomes a citadel.
pub const CITADEL_THRESHOLD: u32 = 20;

/// Visual tier derived from garrison size. Citadels also produce faster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    /// Garrison below 10.
    Outpost,
    /// Garrison 10 to 19.
    Watchtower,
    /// Garrison 20 or more.
    Citadel,
}

impl Tier {
    /// Tier for a given garrison size.
    #[must_use]
    pub const fn for_garrison(garrison: u32) -> Self {
        if garrison >= CITADEL_THRESHOLD {
            Self::Citadel
        } else if garrison >= WATCHTOWER_THRESHOLD {
            Self::Watchtower
        } else {
            Self::Outpost
        }
    }
}

/// A fixed site holding a garrison of whole units.
#[derive(Debug, Clone, Hash, Serialize, Deserialize)]
pub struct Stronghold {
    position: Vec2Fixed,
    owner: Owner,
    garrison: u32,
    /// Timestamp (ms) at which the next unit is produced. Not advanced
    /// while besieged, so a lifted siege produces immediately.
    next_production_at: u64,
}

impl Stronghold {
    /// Create a stronghold and schedule its first production from `now_ms`.
    #[must_use]
    pub fn new(position: Vec2Fixed, owner: Owner, garrison: u32, now_ms: u64) -> Self {
        let mut stronghold = Self {
            position,
            owner,
            garrison: garrison.min(GARRISON_CAPACITY),
            next_production_at: 0,
        };
        stronghold.schedule_production(now_ms);
        stronghold
    }

    /// Fixed map position.
    #[must_use]
    pub const fn position(&self) -> Vec2Fixed {
        self.position
    }

    /// Current holder.
    #[must_use]
    pub const fn owner(&self) -> Owner {
        self.owner
    }

    /// Units currently garrisoned.
    #[must_use]
    pub const fn garrison(&self) -> u32 {
        self.garrison
    }

    /// Visual tier for the current garrison.
    #[must_use]
    pub const fn tier(&self) -> Tier {
        Tier::for_garrison(self.garrison)
    }

    /// Whether the garrison is at capacity.
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.garrison >= GARRISON_CAPACITY
    }

    /// Production cadence for the current tier.
    #[must_use]
    pub const fn production_interval_ms(&self) -> u64 {
        match self.tier() {
            Tier::Citadel => CITADEL_PRODUCTION_INTERVAL_MS,
            _ => PRODUCTION_INTERVAL_MS,
        }
    }

    fn schedule_production(&mut self, now_ms: u64) {
        self.next_production_at = now_ms + self.production_interval_ms();
    }

    /// Advance production. Returns true if a unit was produced this tick.
    ///
    /// Neutral strongholds produce nothing. Besieged strongholds skip the
    /// check entirely, leaving the deadline stale so production resumes
    /// on the first free tick after the siege lifts. A full garrison
    /// reschedules without producing.
    pub fn produce(&mut self, now_ms: u64, besieged: bool) -> bool {
        if besieged || self.owner.is_neutral() {
            return false;
        }
        if now_ms < self.next_production_at {
            return false;
        }
        let produced = if self.garrison < GARRISON_CAPACITY {
            self.garrison += 1;
            true
        } else {
            false
        };
        self.schedule_production(now_ms);
        produced
    }

    /// Split off `percentage` percent of the garrison for a detachment,
    /// rounding down. The split units leave the garrison immediately.
    pub fn split_for_dispatch(&mut self, percentage: u8) -> u32 {
        let pct = u32::from(percentage.min(100));
        let count = self.garrison * pct / 100;
        self.garrison -= count;
        count
    }

    /// Absorb arriving friendly units, capped at capacity. Returns how
    /// many were actually absorbed; the remainder is lost.
    pub fn absorb(&mut self, units: u32) -> u32 {
        let space = GARRISON_CAPACITY - self.garrison;
        let absorbed = units.min(space);
        self.garrison += absorbed;
        absorbed
    }

    /// Remove one defending unit during a combat round. Returns false if
    /// the garrison was already empty.
    pub fn remove_one(&mut self) -> bool {
        if self.garrison == 0 {
            return false;
        }
        self.garrison -= 1;
        true
    }

    /// Hand the stronghold to a conqueror. The surviving attackers become
    /// the new garrison and production restarts from `now_ms`.
    pub fn capture(&mut self, new_owner: Owner, survivors: u32, now_ms: u64) {
        self.owner = new_owner;
        self.garrison = survivors.min(GARRISON_CAPACITY);
        self.schedule_production(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faction::FactionId;

    fn held(garrison: u32) -> Stronghold {
        Stronghold::new(
            Vec2Fixed::from_ints(100, 100),
            Owner::Faction(FactionId(0)),
            garrison,
            0,
        )
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(Tier::for_garrison(0), Tier::Outpost);
        assert_eq!(Tier::for_garrison(9), Tier::Outpost);
        assert_eq!(Tier::for_garrison(10), Tier::Watchtower);
        assert_eq!(Tier::for_garrison(19), Tier::Watchtower);
        assert_eq!(Tier::for_garrison(20), Tier::Citadel);
        assert_eq!(Tier::for_garrison(80), Tier::Citadel);
    }

    #[test]
    fn test_production_cadence() {
        let mut s = held(5);
        assert!(!s.produce(999, false));
        assert!(s.produce(1000, false));
        assert_eq!(s.garrison(), 6);
        // Next deadline scheduled from the producing tick.
        assert!(!s.produce(1999, false));
        assert!(s.produce(2000, false));
        assert_eq!(s.garrison(), 7);
    }

    #[test]
    fn test_citadel_produces_faster() {
        let mut s = held(25);
        assert_eq!(s.production_interval_ms(), CITADEL_PRODUCTION_INTERVAL_MS);
        assert!(s.produce(500, false));
        assert!(s.produce(1000, false));
        assert_eq!(s.garrison(), 27);
    }

    #[test]
    fn test_neutral_never_produces() {
        let mut s = Stronghold::new(Vec2Fixed::from_ints(0, 0), Owner::Neutral, 10, 0);
        assert!(!s.produce(10_000, false));
        assert_eq!(s.garrison(), 10);
    }

    #[test]
    fn test_besieged_pauses_then_produces_immediately() {
        let mut s = held(5);
        // Siege spans several deadlines; nothing happens.
        for now in [1000, 2000, 3000] {
            assert!(!s.produce(now, true));
        }
        assert_eq!(s.garrison(), 5);
        // First free tick after the siege fires the stale deadline.
        assert!(s.produce(3050, false));
        assert_eq!(s.garrison(), 6);
    }

    #[test]
    fn test_full_garrison_reschedules_without_producing() {
        let mut s = held(GARRISON_CAPACITY);
        assert!(!s.produce(1000, false));
        assert_eq!(s.garrison(), GARRISON_CAPACITY);
        // Deadline moved on, so freeing a slot does not backfill instantly.
        s.remove_one();
        assert!(!s.produce(1001, false));
        assert!(s.produce(2000, false));
    }

    #[test]
    fn test_split_rounds_down() {
        let mut s = held(15);
        assert_eq!(s.split_for_dispatch(50), 7);
        assert_eq!(s.garrison(), 8);
    }

    #[test]
    fn test_split_full_percentage_empties() {
        let mut s = held(12);
        assert_eq!(s.split_for_dispatch(100), 12);
        assert_eq!(s.garrison(), 0);
    }

    #[test]
    fn test_absorb_caps_at_capacity() {
        let mut s = held(75);
        assert_eq!(s.absorb(10), 5);
        assert_eq!(s.garrison(), GARRISON_CAPACITY);
        assert!(s.is_full());
    }

    #[test]
    fn test_remove_one_stops_at_zero() {
        let mut s = held(1);
        assert!(s.remove_one());
        assert!(!s.remove_one());
        assert_eq!(s.garrison(), 0);
    }

    #[test]
    fn test_capture_caps_at_capacity() {
        let mut s = Stronghold::new(Vec2Fixed::from_ints(0, 0), Owner::Neutral, 10, 0);
        s.capture(Owner::Faction(FactionId(1)), 200, 5000);
        assert_eq!(s.owner(), Owner::Faction(FactionId(1)));
        assert_eq!(s.garrison(), GARRISON_CAPACITY);
    }

    #[test]
    fn test_capture_restarts_production() {
        let mut s = Stronghold::new(Vec2Fixed::from_ints(0, 0), Owner::Neutral, 12, 0);
        s.capture(Owner::Faction(FactionId(1)), 3, 5000);
        // Outpost cadence counted from the capture timestamp.
        assert!(!s.produce(5999, false));
        assert!(s.produce(6000, false));
        assert_eq!(s.garrison(), 4);
    }
}
