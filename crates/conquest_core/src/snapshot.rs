//! Match-start snapshot: the one full-state transfer of a session.
//!
//! The host sends each joining peer a snapshot of every stronghold and
//! in-flight detachment exactly once, at match start; after that only
//! actions flow. Positions travel as raw fixed-point bits so the
//! restored entities are bit-identical to the host's.
//!
//! Detachments reference their endpoints by position rather than index
//! and are re-bound on restore by exact position match. A detachment
//! whose endpoints cannot be matched is dropped rather than guessed at.

use serde::{Deserialize, Serialize};

use crate::detachment::DetachmentStore;
use crate::error::GameError;
use crate::faction::{FactionId, Owner};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::stronghold::{Stronghold, Tier, GARRISON_CAPACITY};

/// Wire form of one stronghold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrongholdState {
    /// Board position.
    pub position: Vec2Fixed,
    /// Controlling side.
    pub owner: Owner,
    /// Stationed units.
    pub garrison: u32,
    /// Garrison cap.
    pub capacity: u32,
    /// Size class at capture time.
    pub tier: Tier,
}

/// Wire form of one in-flight detachment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetachmentState {
    /// Where the march started.
    pub source_pos: Vec2Fixed,
    /// Where the march is headed.
    pub target_pos: Vec2Fixed,
    /// Current board position.
    pub position: Vec2Fixed,
    /// Units in the group.
    pub units: u32,
    /// Owning faction.
    pub owner: FactionId,
    /// March completion fraction, for display only.
    #[serde(with = "fixed_serde")]
    pub progress: Fixed,
    /// Carried dice seed, preserved so the receiving peer resolves any
    /// engagement this detachment opens with the same rolls.
    pub seed: u64,
}

/// Everything a peer needs to start simulating a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    /// All strongholds, in layout order.
    pub strongholds: Vec<StrongholdState>,
    /// All in-flight detachments, in ID order.
    pub detachments: Vec<DetachmentState>,
    /// Faction index the receiving peer plays.
    pub assigned_faction: u8,
    /// How many factions this match was laid out for.
    pub total_factions: u8,
}

/// Capture the current entity state for one peer.
#[must_use]
pub fn capture(
    strongholds: &[Stronghold],
    store: &DetachmentStore,
    assigned_faction: u8,
    total_factions: u8,
) -> MatchSnapshot {
    let stronghold_states = strongholds
        .iter()
        .map(|s| StrongholdState {
            position: s.position(),
            owner: s.owner(),
            garrison: s.garrison(),
            capacity: GARRISON_CAPACITY,
            tier: s.tier(),
        })
        .collect();

    let mut detachment_states = Vec::with_capacity(store.len());
    for id in store.sorted_ids() {
        if let Some(d) = store.get(id) {
            let target_pos = strongholds
                .get(d.target())
                .map_or(d.position(), |s| s.position());
            detachment_states.push(DetachmentState {
                source_pos: d.origin(),
                target_pos,
                position: d.position(),
                units: d.units(),
                owner: d.faction(),
                progress: d.progress(target_pos),
                seed: d.seed(),
            });
        }
    }

    MatchSnapshot {
        strongholds: stronghold_states,
        detachments: detachment_states,
        assigned_faction,
        total_factions,
    }
}

/// Rebuild entity state from a snapshot.
///
/// Strongholds restore in array order, so indices match the sender's.
/// Detachment endpoints re-bind by exact position; an unmatched
/// detachment is logged and skipped, never invented.
#[must_use]
pub fn restore(snapshot: &MatchSnapshot, now_ms: u64) -> (Vec<Stronghold>, DetachmentStore) {
    let strongholds: Vec<Stronghold> = snapshot
        .strongholds
        .iter()
        .map(|s| Stronghold::new(s.position, s.owner, s.garrison, now_ms))
        .collect();

    let index_of = |position: Vec2Fixed| {
        strongholds
            .iter()
            .position(|s| s.position() == position)
    };

    let mut store = DetachmentStore::new();
    for d in &snapshot.detachments {
        let (Some(source), Some(target)) = (index_of(d.source_pos), index_of(d.target_pos))
        else {
            let err = GameError::UnknownPosition {
                x: d.target_pos.x.to_bits(),
                y: d.target_pos.y.to_bits(),
            };
            tracing::warn!(units = d.units, %err, "snapshot detachment dropped");
            continue;
        };
        let id = store.spawn(d.owner, d.units, d.source_pos, source, target, d.seed);
        if let Some(restored) = store.get_mut(id) {
            restored.set_position(d.position);
        }
    }

    (strongholds, store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{generate_layout, LayoutConfig};

    fn sample_state() -> (Vec<Stronghold>, DetachmentStore) {
        let strongholds = generate_layout(&LayoutConfig::default(), 0);
        let mut store = DetachmentStore::new();
        store.spawn(
            FactionId(0),
            7,
            strongholds[0].position(),
            0,
            2,
            0xABCD,
        );
        store.spawn(
            FactionId(1),
            12,
            strongholds[1].position(),
            1,
            3,
            0x1234,
        );
        (strongholds, store)
    }

    #[test]
    fn test_round_trip_preserves_strongholds_exactly() {
        let (strongholds, store) = sample_state();
        let snapshot = capture(&strongholds, &store, 1, 2);

        let bytes = bincode::serialize(&snapshot).unwrap();
        let decoded: MatchSnapshot = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, snapshot);

        let (restored, _) = restore(&decoded, 0);
        assert_eq!(restored.len(), strongholds.len());
        for (a, b) in strongholds.iter().zip(restored.iter()) {
            assert_eq!(a.position(), b.position());
            assert_eq!(a.owner(), b.owner());
            assert_eq!(a.garrison(), b.garrison());
        }
    }

    #[test]
    fn test_round_trip_survives_json() {
        let (strongholds, store) = sample_state();
        let snapshot = capture(&strongholds, &store, 0, 2);
        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: MatchSnapshot = serde_json::from_str(&json).unwrap();
        // Positions travel as bits, so even JSON keeps them exact.
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn test_detachments_rebind_by_position() {
        let (strongholds, store) = sample_state();
        let snapshot = capture(&strongholds, &store, 0, 2);
        let (_, restored) = restore(&snapshot, 0);

        assert_eq!(restored.len(), 2);
        let ids = restored.sorted_ids();
        let first = restored.get(ids[0]).unwrap();
        assert_eq!(first.source(), 0);
        assert_eq!(first.target(), 2);
        assert_eq!(first.units(), 7);
        assert_eq!(first.seed(), 0xABCD);
    }

    #[test]
    fn test_unmatched_detachment_is_dropped() {
        let (strongholds, store) = sample_state();
        let mut snapshot = capture(&strongholds, &store, 0, 2);
        snapshot.detachments[0].target_pos = Vec2Fixed::from_ints(-999, -999);

        let (_, restored) = restore(&snapshot, 0);
        assert_eq!(restored.len(), 1);
    }

    #[test]
    fn test_snapshot_reports_capacity_and_tier() {
        let (strongholds, store) = sample_state();
        let snapshot = capture(&strongholds, &store, 0, 2);
        assert_eq!(snapshot.strongholds[0].capacity, GARRISON_CAPACITY);
        assert_eq!(snapshot.strongholds[0].tier, Tier::Citadel);
        assert_eq!(snapshot.assigned_faction, 0);
        assert_eq!(snapshot.total_factions, 2);
    }
}
