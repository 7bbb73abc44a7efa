//! Scenario loading and configuration.
//!
//! Scenarios define the starting state for headless matches: either a
//! seeded corner-citadel layout or explicit stronghold placements, plus
//! one seat per faction saying who controls it. A tick limit turns
//! stalemates into draws instead of unbounded runs.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use conquest_core::faction::{FactionId, Owner, MAX_FACTIONS};
use conquest_core::map::{LayoutConfig, MAP_MARGIN, MIN_SPACING};
use conquest_core::math::Vec2Fixed;
use conquest_core::policy::PolicyProfile;
use conquest_core::simulation::ConquestSim;
use conquest_core::snapshot::{MatchSnapshot, StrongholdState};
use conquest_core::stronghold::{Tier, GARRISON_CAPACITY};

/// Smallest board edge a generated layout can be asked for; anything
/// tighter leaves no room between the margins.
pub const MIN_BOARD_EXTENT: i64 = 2 * MAP_MARGIN + MIN_SPACING;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read the file.
    #[error("failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// Parsed fine but describes an unplayable match.
    #[error("invalid scenario: {0}")]
    Invalid(String),
}

/// Where the strongholds come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Board {
    /// Seeded corner-citadel layout on a board of this size.
    Generated {
        /// Board width in world units.
        width: i64,
        /// Board height in world units.
        height: i64,
    },
    /// Explicit stronghold placements.
    Placed(Vec<Placement>),
}

/// One explicitly placed stronghold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Board position.
    pub x: i64,
    /// Board position.
    pub y: i64,
    /// Owning seat; `None` places a neutral stronghold.
    pub owner: Option<u8>,
    /// Starting garrison.
    pub garrison: u32,
}

/// How a faction seat is controlled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Controller {
    /// Driven by the baseline policy at a difficulty.
    Baseline(Difficulty),
    /// Driven over the JSON protocol; issues nothing on its own.
    External,
    /// No control at all, for punching-bag setups.
    Idle,
}

/// Difficulty presets for the baseline policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Difficulty {
    /// Slow to act, cautious commitments.
    Easy,
    /// The default tuning.
    #[default]
    Normal,
    /// Frequent, heavy dispatches.
    Hard,
}

impl Difficulty {
    /// The policy tuning this difficulty maps to.
    #[must_use]
    pub const fn profile(self) -> PolicyProfile {
        match self {
            Self::Easy => PolicyProfile::EASY,
            Self::Normal => PolicyProfile::NORMAL,
            Self::Hard => PolicyProfile::HARD,
        }
    }
}

/// One faction seat in the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    /// Faction index this seat plays.
    pub faction: u8,
    /// Who drives it.
    pub controller: Controller,
}

/// A complete scenario configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Seed for layout generation and policy streams.
    #[serde(default)]
    pub seed: u64,
    /// Where the strongholds come from.
    pub board: Board,
    /// One seat per competing faction.
    pub seats: Vec<Seat>,
    /// Tick at which an undecided match is called a draw.
    #[serde(default)]
    pub tick_limit: Option<u64>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "Open Field".to_string(),
            description: "Two corner citadels and a band of neutrals".to_string(),
            seed: 42,
            board: Board::Generated {
                width: 1024,
                height: 768,
            },
            seats: vec![
                Seat {
                    faction: 0,
                    controller: Controller::Baseline(Difficulty::Normal),
                },
                Seat {
                    faction: 1,
                    controller: Controller::Baseline(Difficulty::Normal),
                },
            ],
            tick_limit: None,
        }
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable, unparsable,
    /// or describes an unplayable match.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is unparsable or the parsed
    /// scenario fails validation.
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Self = ron::from_str(ron)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Look up a named built-in scenario.
    #[must_use]
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "skirmish_1v1" => Some(Self::skirmish_1v1()),
            "three_way" => Some(Self::three_way()),
            "citadel_assault" => Some(Self::citadel_assault()),
            _ => None,
        }
    }

    /// Resolve a scenario reference: tried as a built-in name first,
    /// otherwise as a RON file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the name matches no built-in and no loadable
    /// scenario file.
    pub fn resolve(name_or_path: &str) -> Result<Self, ScenarioError> {
        if let Some(builtin) = Self::builtin(name_or_path) {
            return Ok(builtin);
        }
        Self::load(name_or_path)
    }

    /// Standard two-faction skirmish on a generated board.
    #[must_use]
    pub fn skirmish_1v1() -> Self {
        Self {
            name: "Standard 1v1 Skirmish".to_string(),
            description: "Balanced corner starts for baseline matchup testing".to_string(),
            tick_limit: Some(24_000),
            ..Self::default()
        }
    }

    /// Three factions on a wider generated board.
    #[must_use]
    pub fn three_way() -> Self {
        Self {
            name: "Contested Three-Way".to_string(),
            description: "Three corners occupied, the fourth left to the neutrals".to_string(),
            seed: 42,
            board: Board::Generated {
                width: 1280,
                height: 960,
            },
            seats: vec![
                Seat {
                    faction: 0,
                    controller: Controller::Baseline(Difficulty::Hard),
                },
                Seat {
                    faction: 1,
                    controller: Controller::Baseline(Difficulty::Normal),
                },
                Seat {
                    faction: 2,
                    controller: Controller::Baseline(Difficulty::Easy),
                },
            ],
            tick_limit: Some(36_000),
        }
    }

    /// Citadel-versus-neutrals assault on a hand-placed board.
    #[must_use]
    pub fn citadel_assault() -> Self {
        Self {
            name: "Citadel Assault".to_string(),
            description: "A citadel grinds through neutral ground toward a lone outpost"
                .to_string(),
            seed: 42,
            board: Board::Placed(vec![
                Placement {
                    x: 100,
                    y: 300,
                    owner: Some(0),
                    garrison: 20,
                },
                Placement {
                    x: 900,
                    y: 300,
                    owner: Some(1),
                    garrison: 8,
                },
                Placement {
                    x: 350,
                    y: 150,
                    owner: None,
                    garrison: 10,
                },
                Placement {
                    x: 350,
                    y: 450,
                    owner: None,
                    garrison: 6,
                },
                Placement {
                    x: 500,
                    y: 300,
                    owner: None,
                    garrison: 12,
                },
                Placement {
                    x: 650,
                    y: 150,
                    owner: None,
                    garrison: 5,
                },
                Placement {
                    x: 650,
                    y: 450,
                    owner: None,
                    garrison: 9,
                },
            ]),
            seats: vec![
                Seat {
                    faction: 0,
                    controller: Controller::Baseline(Difficulty::Normal),
                },
                Seat {
                    faction: 1,
                    controller: Controller::Baseline(Difficulty::Easy),
                },
            ],
            tick_limit: Some(24_000),
        }
    }

    /// Number of faction seats, clamped to the supported range.
    #[must_use]
    pub fn faction_count(&self) -> u8 {
        u8::try_from(self.seats.len())
            .unwrap_or(u8::MAX)
            .clamp(2, MAX_FACTIONS as u8)
    }

    /// Re-key the scenario for another match of a batch. Generated
    /// layouts and policy streams both follow the new seed; placed
    /// boards stay pinned while the policies vary.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check that the scenario describes a playable match.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::Invalid`] naming the first problem found.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let seat_count = self.seats.len();
        if seat_count < 2 || seat_count > MAX_FACTIONS {
            return Err(ScenarioError::Invalid(format!(
                "need 2 to {MAX_FACTIONS} seats, got {seat_count}"
            )));
        }
        for (i, seat) in self.seats.iter().enumerate() {
            if usize::from(seat.faction) >= seat_count {
                return Err(ScenarioError::Invalid(format!(
                    "seat {i} plays faction {} but only {seat_count} seats exist",
                    seat.faction
                )));
            }
            if self.seats[..i].iter().any(|s| s.faction == seat.faction) {
                return Err(ScenarioError::Invalid(format!(
                    "faction {} is seated twice",
                    seat.faction
                )));
            }
        }

        match &self.board {
            Board::Generated { width, height } => {
                if *width < MIN_BOARD_EXTENT || *height < MIN_BOARD_EXTENT {
                    return Err(ScenarioError::Invalid(format!(
                        "generated board must be at least {MIN_BOARD_EXTENT} on each edge"
                    )));
                }
            }
            Board::Placed(sites) => {
                if sites.is_empty() {
                    return Err(ScenarioError::Invalid(
                        "placed board has no strongholds".to_string(),
                    ));
                }
                for (i, site) in sites.iter().enumerate() {
                    if let Some(owner) = site.owner {
                        if usize::from(owner) >= seat_count {
                            return Err(ScenarioError::Invalid(format!(
                                "stronghold {i} is owned by unseated faction {owner}"
                            )));
                        }
                    }
                    if site.garrison > GARRISON_CAPACITY {
                        return Err(ScenarioError::Invalid(format!(
                            "stronghold {i} garrison {} exceeds capacity {GARRISON_CAPACITY}",
                            site.garrison
                        )));
                    }
                    if sites[..i].iter().any(|s| s.x == site.x && s.y == site.y) {
                        return Err(ScenarioError::Invalid(format!(
                            "two strongholds share position ({}, {})",
                            site.x, site.y
                        )));
                    }
                }
                for seat in &self.seats {
                    if !sites.iter().any(|s| s.owner == Some(seat.faction)) {
                        return Err(ScenarioError::Invalid(format!(
                            "faction {} is seated but owns no stronghold",
                            seat.faction
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    /// Build the simulation this scenario describes.
    ///
    /// # Errors
    ///
    /// Returns an error if the scenario fails validation.
    pub fn build_sim(&self) -> Result<ConquestSim, ScenarioError> {
        self.validate()?;
        match &self.board {
            Board::Generated { width, height } => {
                let config = LayoutConfig {
                    width: *width,
                    height: *height,
                    factions: self.faction_count(),
                    seed: self.seed,
                };
                Ok(ConquestSim::new(&config))
            }
            Board::Placed(sites) => {
                let strongholds = sites
                    .iter()
                    .map(|site| StrongholdState {
                        position: Vec2Fixed::from_ints(site.x, site.y),
                        owner: site
                            .owner
                            .map_or(Owner::Neutral, |f| Owner::Faction(FactionId(f))),
                        garrison: site.garrison,
                        capacity: GARRISON_CAPACITY,
                        tier: Tier::for_garrison(site.garrison),
                    })
                    .collect();
                let snapshot = MatchSnapshot {
                    strongholds,
                    detachments: Vec::new(),
                    assigned_faction: 0,
                    total_factions: self.faction_count(),
                };
                Ok(ConquestSim::from_snapshot(&snapshot))
            }
        }
    }
}
