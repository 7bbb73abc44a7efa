//! Detachments: unit groups marching between strongholds.
//!
//! A detachment is created by a dispatch action, marches in a straight
//! line toward its target stronghold, and ceases to exist on arrival
//! (absorbed, merged, engaged, or queued). Marching groups never
//! interact with each other mid-flight.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::faction::FactionId;
use crate::math::{Fixed, Vec2Fixed};

/// March speed in tenths of a unit per second.
pub const MARCH_SPEED_TENTHS: i64 = 345;

/// A detachment arrives when within this many units of the target.
pub const ARRIVAL_RADIUS: i64 = 5;
const ARRIVAL_RADIUS_SQ: i64 = ARRIVAL_RADIUS * ARRIVAL_RADIUS;

/// Cap on soldiers drawn for one detachment, however large the group.
pub const MAX_VISIBLE_SOLDIERS: usize = 10;

/// Distance covered per simulation tick.
#[must_use]
pub fn march_step_per_tick() -> Fixed {
    let tick_ms = crate::simulation::TICK_MS as i64;
    Fixed::from_num(MARCH_SPEED_TENTHS * tick_ms) / Fixed::from_num(10_000)
}

/// Identifier for a detachment, unique for the lifetime of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DetachmentId(pub u64);

impl std::fmt::Display for DetachmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "detachment {}", self.0)
    }
}

/// What a detachment is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Phase {
    /// Marching toward the target stronghold.
    #[default]
    Marching,
    /// Arrived at a contested stronghold with both slots taken; waiting
    /// in the attacker queue.
    Waiting,
}

/// A unit group in transit between strongholds.
#[derive(Debug, Clone, Hash, Serialize, Deserialize)]
pub struct Detachment {
    id: DetachmentId,
    faction: FactionId,
    units: u32,
    origin: Vec2Fixed,
    position: Vec2Fixed,
    source: usize,
    target: usize,
    /// Seed carried from the dispatch action; feeds the engagement dice
    /// if this detachment ends up opening one.
    seed: u64,
    phase: Phase,
}

impl Detachment {
    /// Unique ID within this simulation.
    #[must_use]
    pub const fn id(&self) -> DetachmentId {
        self.id
    }

    /// Owning faction.
    #[must_use]
    pub const fn faction(&self) -> FactionId {
        self.faction
    }

    /// Units marching in this group.
    #[must_use]
    pub const fn units(&self) -> u32 {
        self.units
    }

    /// Current map position.
    #[must_use]
    pub const fn position(&self) -> Vec2Fixed {
        self.position
    }

    /// Position of the dispatching stronghold.
    #[must_use]
    pub const fn origin(&self) -> Vec2Fixed {
        self.origin
    }

    /// Index of the dispatching stronghold.
    #[must_use]
    pub const fn source(&self) -> usize {
        self.source
    }

    /// Index of the destination stronghold.
    #[must_use]
    pub const fn target(&self) -> usize {
        self.target
    }

    /// Dice seed carried from the dispatch action.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Current movement phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Switch movement phase.
    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Place a restored detachment mid-march. Snapshot restore only.
    pub(crate) fn set_position(&mut self, position: Vec2Fixed) {
        self.position = position;
    }

    /// Fold another group of the same faction into this one.
    pub fn merge_units(&mut self, units: u32) {
        self.units = self.units.saturating_add(units);
    }

    /// Step toward `target_pos` and report whether the detachment has
    /// arrived (entered the arrival radius).
    pub fn advance(&mut self, target_pos: Vec2Fixed) -> bool {
        self.position = self.position.step_toward(target_pos, march_step_per_tick());
        self.position.distance_squared(target_pos) <= Fixed::from_num(ARRIVAL_RADIUS_SQ)
    }

    /// Fraction of the march completed, for display interpolation.
    #[must_use]
    pub fn progress(&self, target_pos: Vec2Fixed) -> Fixed {
        let total = self.origin.distance(target_pos);
        if total == Fixed::ZERO {
            return Fixed::from_num(1);
        }
        self.origin.distance(self.position) / total
    }

    /// Whether sprites should face left, from the march direction.
    ///
    /// Display only; has no effect on unit count or outcome.
    #[must_use]
    pub fn facing_left(&self, target_pos: Vec2Fixed) -> bool {
        target_pos.x < self.position.x
    }

    /// Per-soldier display offsets around the group position.
    ///
    /// At most [`MAX_VISIBLE_SOLDIERS`] entries: a single line up to 3,
    /// a double line up to 6, a widening triangle beyond that. Display
    /// only; has no effect on unit count or outcome.
    #[must_use]
    pub fn formation_offsets(&self) -> Vec<Vec2Fixed> {
        let visible = (self.units as usize).min(MAX_VISIBLE_SOLDIERS);
        let mut offsets = Vec::with_capacity(visible);
        for i in 0..visible {
            let (x, y) = if visible <= 3 {
                // Centred line: slots 20 apart.
                ((i as i64 * 2 - (visible as i64 - 1)) * 10, 0)
            } else if visible <= 6 {
                let row = (i / 3) as i64;
                let col = (i % 3) as i64;
                ((col - 1) * 20, row * 18)
            } else {
                // Triangle: row r holds slots r*r .. (r+1)*(r+1).
                let mut row = 0usize;
                while (row + 1) * (row + 1) <= i {
                    row += 1;
                }
                let pos_in_row = (i - row * row) as i64;
                ((pos_in_row - row as i64) * 16, row as i64 * 18)
            };
            offsets.push(Vec2Fixed::from_ints(x, y));
        }
        offsets
    }
}

/// Storage for live detachments with deterministic iteration order.
///
/// IDs start at 1 and never recycle within a match, so replays produce
/// identical ID sequences on every peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetachmentStore {
    detachments: HashMap<u64, Detachment>,
    next_id: u64,
}

impl DetachmentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            detachments: HashMap::new(),
            next_id: 1,
        }
    }

    /// Spawn a new marching detachment at `origin` bound for `target`.
    pub fn spawn(
        &mut self,
        faction: FactionId,
        units: u32,
        origin: Vec2Fixed,
        source: usize,
        target: usize,
        seed: u64,
    ) -> DetachmentId {
        let id = DetachmentId(self.next_id);
        self.next_id += 1;
        self.detachments.insert(
            id.0,
            Detachment {
                id,
                faction,
                units,
                origin,
                position: origin,
                source,
                target,
                seed,
                phase: Phase::Marching,
            },
        );
        id
    }

    /// Get a detachment by ID.
    #[must_use]
    pub fn get(&self, id: DetachmentId) -> Option<&Detachment> {
        self.detachments.get(&id.0)
    }

    /// Get a mutable detachment by ID.
    #[must_use]
    pub fn get_mut(&mut self, id: DetachmentId) -> Option<&mut Detachment> {
        self.detachments.get_mut(&id.0)
    }

    /// Remove a detachment, returning it if it existed.
    pub fn remove(&mut self, id: DetachmentId) -> Option<Detachment> {
        self.detachments.remove(&id.0)
    }

    /// Number of live detachments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.detachments.len()
    }

    /// Whether no detachments are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detachments.is_empty()
    }

    /// IDs in ascending order. All per-tick iteration goes through this
    /// so hash-map ordering never leaks into simulation results.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<DetachmentId> {
        let mut ids: Vec<u64> = self.detachments.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter().map(DetachmentId).collect()
    }

    /// Iterate over live detachments in storage order.
    ///
    /// Order is not deterministic; use [`Self::sorted_ids`] wherever the
    /// result feeds simulation state or serialized output.
    pub fn iter(&self) -> impl Iterator<Item = &Detachment> {
        self.detachments.values()
    }
}

impl Default for DetachmentStore {
    fn default() -> Self {
        Self::new()
    }
}
