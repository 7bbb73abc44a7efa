//! Faction identity and stronghold ownership.
//!
//! Ownership is a closed enum rather than a string tag: renderer colour
//! and banner lookups become match tables the compiler checks, and
//! hostility tests are cheap comparisons.

use serde::{Deserialize, Serialize};

/// Maximum number of competing factions in a match.
pub const MAX_FACTIONS: usize = 4;

/// Identifier for a competing faction (0-based index into the match roster).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactionId(pub u8);

impl FactionId {
    /// Create a new faction ID.
    #[must_use]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// The raw roster index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for FactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "faction {}", self.0)
    }
}

/// Who holds a stronghold.
///
/// Detachments always belong to a faction; only strongholds can be neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Owner {
    /// Unclaimed stronghold; produces nothing and dispatches nothing.
    #[default]
    Neutral,
    /// Held by a competing faction.
    Faction(FactionId),
}

impl Owner {
    /// Whether this is the neutral owner.
    #[must_use]
    pub const fn is_neutral(self) -> bool {
        matches!(self, Self::Neutral)
    }

    /// The owning faction, if any.
    #[must_use]
    pub const fn faction(self) -> Option<FactionId> {
        match self {
            Self::Neutral => None,
            Self::Faction(id) => Some(id),
        }
    }

    /// Whether a detachment of `faction` treats this owner as hostile.
    ///
    /// Neutral strongholds are hostile ground: reaching one opens an
    /// engagement rather than a reinforcement.
    #[must_use]
    pub const fn hostile_to(self, faction: FactionId) -> bool {
        match self {
            Self::Neutral => true,
            Self::Faction(id) => id.0 != faction.0,
        }
    }

    /// Banner displayed for this owner.
    #[must_use]
    pub const fn banner(self) -> Banner {
        match self {
            Self::Neutral => Banner::Slate,
            Self::Faction(FactionId(0)) => Banner::Azure,
            Self::Faction(FactionId(1)) => Banner::Crimson,
            Self::Faction(FactionId(2)) => Banner::Violet,
            Self::Faction(FactionId(_)) => Banner::Amber,
        }
    }
}

impl From<FactionId> for Owner {
    fn from(id: FactionId) -> Self {
        Self::Faction(id)
    }
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Neutral => write!(f, "neutral"),
            Self::Faction(id) => write!(f, "{id}"),
        }
    }
}

/// Banner colour shown by renderer collaborators.
///
/// The table is closed: four faction banners plus slate for neutral ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Banner {
    /// Neutral grey.
    Slate,
    /// Faction 0.
    Azure,
    /// Faction 1.
    Crimson,
    /// Faction 2.
    Violet,
    /// Faction 3.
    Amber,
}

impl Banner {
    /// RGB colour for this banner.
    #[must_use]
    pub const fn rgb(self) -> (u8, u8, u8) {
        match self {
            Self::Slate => (120, 120, 128),
            Self::Azure => (64, 118, 222),
            Self::Crimson => (204, 52, 52),
            Self::Violet => (150, 74, 196),
            Self::Amber => (222, 170, 44),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_is_hostile_to_everyone() {
        for i in 0..4 {
            assert!(Owner::Neutral.hostile_to(FactionId(i)));
        }
    }

    #[test]
    fn test_own_faction_not_hostile() {
        let owner = Owner::Faction(FactionId(2));
        assert!(!owner.hostile_to(FactionId(2)));
        assert!(owner.hostile_to(FactionId(0)));
        assert!(owner.hostile_to(FactionId(3)));
    }

    #[test]
    fn test_banner_table_distinct() {
        let banners = [
            Owner::Neutral.banner(),
            Owner::Faction(FactionId(0)).banner(),
            Owner::Faction(FactionId(1)).banner(),
            Owner::Faction(FactionId(2)).banner(),
            Owner::Faction(FactionId(3)).banner(),
        ];
        for (i, a) in banners.iter().enumerate() {
            for b in banners.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_owner_display() {
        assert_eq!(Owner::Neutral.to_string(), "neutral");
        assert_eq!(Owner::Faction(FactionId(1)).to_string(), "faction 1");
    }
}
