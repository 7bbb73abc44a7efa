//! Engagement coordination: slots, wait queues, and promotion.
//!
//! Each contested stronghold gets a site record holding up to two
//! concurrent engagements plus a FIFO queue of waiting detachments. The
//! coordinator owns all arrival branching: friendly absorption,
//! same-faction merging, slot assignment, and queueing. It also applies
//! engagement resolutions and promotes waiters when a slot frees up.
//!
//! The rules it enforces:
//! - at most one active engagement per attacking faction per stronghold;
//!   same-faction arrivals always merge into the existing pool or
//!   waiting group, never take a second slot
//! - a second concurrent engagement opens only when the stronghold
//!   belongs to neither attacker (contested ground)
//! - ownership changes only when a resolution says so

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::combat::{Engagement, Resolution, RoundOutcome};
use crate::detachment::{DetachmentId, DetachmentStore, Phase};
use crate::faction::{FactionId, Owner};
use crate::stronghold::Stronghold;

/// Concurrent engagement limit per stronghold.
pub const MAX_ENGAGEMENT_SLOTS: usize = 2;

/// How an arrival at its target was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalOutcome {
    /// Friendly stronghold: units joined the garrison (capped).
    Absorbed { faction: FactionId, added: u32 },
    /// Same faction already fighting here: units joined that pool.
    Reinforced { faction: FactionId, added: u32 },
    /// Same faction already waiting here: units joined the waiting group.
    MergedWithWaiting { faction: FactionId },
    /// Took an engagement slot and started fighting.
    Opened { faction: FactionId },
    /// Both slots taken by other factions; waiting in line.
    Queued { faction: FactionId },
}

/// One combat round that happened this tick, tagged with its site.
#[derive(Debug, Clone, Copy)]
pub struct RoundEvent {
    /// Stronghold the round was fought at.
    pub stronghold: usize,
    /// Faction on the attacking side.
    pub attacker: FactionId,
    /// The dice and who lost a unit.
    pub outcome: RoundOutcome,
}

/// An engagement that resolved this tick.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionEvent {
    /// Stronghold the engagement was fought at.
    pub stronghold: usize,
    /// Faction on the attacking side.
    pub attacker: FactionId,
    /// How the fight ended.
    pub resolution: Resolution,
}

/// Queue movement caused by a resolution freeing a slot.
#[derive(Debug, Clone, Copy)]
pub enum PromotionEvent {
    /// A waiter whose faction now owns the stronghold joined the garrison.
    AbsorbedFromQueue {
        stronghold: usize,
        faction: FactionId,
        added: u32,
    },
    /// A waiter merged into a still-active same-faction engagement.
    MergedFromQueue {
        stronghold: usize,
        faction: FactionId,
        added: u32,
    },
    /// A waiter took the freed slot and opened a fresh engagement.
    PromotedToEngagement { stronghold: usize, faction: FactionId },
}

/// Everything the combat phase did in one tick.
#[derive(Debug, Clone, Default)]
pub struct CombatReport {
    /// Every round fought, across all sites.
    pub rounds: Vec<RoundEvent>,
    /// Engagements that ended this tick.
    pub resolutions: Vec<ResolutionEvent>,
    /// Queue movement triggered by those resolutions.
    pub promotions: Vec<PromotionEvent>,
}

/// Live combat state for one stronghold.
#[derive(Debug, Clone, Default, Hash, Serialize, Deserialize)]
struct Site {
    /// Active engagements, oldest first. Never more than
    /// [`MAX_ENGAGEMENT_SLOTS`].
    slots: Vec<Engagement>,
    /// Waiting detachments in arrival order. They stay in the store with
    /// [`Phase::Waiting`] until promoted.
    queue: VecDeque<DetachmentId>,
}

impl Site {
    fn is_empty(&self) -> bool {
        self.slots.is_empty() && self.queue.is_empty()
    }
}

/// Tracks every contested stronghold's slots and queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngagementCoordinator {
    sites: HashMap<usize, Site>,
}

impl EngagementCoordinator {
    /// Create a coordinator with no contested sites.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a stronghold currently has hostile forces fighting at it.
    /// Besieged strongholds do not produce.
    #[must_use]
    pub fn is_besieged(&self, stronghold: usize) -> bool {
        self.sites
            .get(&stronghold)
            .is_some_and(|site| !site.slots.is_empty())
    }

    /// Number of detachments waiting in line at a stronghold.
    #[must_use]
    pub fn queued_count(&self, stronghold: usize) -> usize {
        self.sites.get(&stronghold).map_or(0, |s| s.queue.len())
    }

    /// Active engagements at a stronghold, oldest first.
    #[must_use]
    pub fn engagements_at(&self, stronghold: usize) -> &[Engagement] {
        self.sites
            .get(&stronghold)
            .map_or(&[], |site| site.slots.as_slice())
    }

    /// All active engagements in deterministic site order.
    #[must_use]
    pub fn engagements(&self) -> Vec<(usize, &Engagement)> {
        let mut keys: Vec<usize> = self.sites.keys().copied().collect();
        keys.sort_unstable();
        let mut out = Vec::new();
        for key in keys {
            if let Some(site) = self.sites.get(&key) {
                for engagement in &site.slots {
                    out.push((key, engagement));
                }
            }
        }
        out
    }

    /// Feed all site state into a hasher in deterministic order.
    pub fn hash_state<H: std::hash::Hasher>(&self, hasher: &mut H) {
        use std::hash::Hash;

        let mut keys: Vec<usize> = self.sites.keys().copied().collect();
        keys.sort_unstable();
        keys.len().hash(hasher);
        for key in keys {
            key.hash(hasher);
            if let Some(site) = self.sites.get(&key) {
                site.hash(hasher);
            }
        }
    }

    /// Settle a detachment that reached its target this tick.
    ///
    /// Consumes the detachment from the store in every branch except
    /// queueing, where it stays put with [`Phase::Waiting`].
    pub fn handle_arrival(
        &mut self,
        id: DetachmentId,
        target: usize,
        stronghold: &mut Stronghold,
        store: &mut DetachmentStore,
        now_ms: u64,
    ) -> Option<ArrivalOutcome> {
        let faction = store.get(id)?.faction();

        // Reinforcement always lands inside the walls, siege or not.
        if stronghold.owner() == Owner::Faction(faction) {
            let detachment = store.remove(id)?;
            let added = stronghold.absorb(detachment.units());
            return Some(ArrivalOutcome::Absorbed { faction, added });
        }

        let site = self.sites.entry(target).or_default();

        // Same faction already fighting: one pool, never a second slot.
        if let Some(slot) = site.slots.iter_mut().find(|e| e.faction() == faction) {
            let detachment = store.remove(id)?;
            let added = slot.reinforce(detachment.units(), now_ms);
            return Some(ArrivalOutcome::Reinforced { faction, added });
        }

        // Same faction already waiting: grow the waiting group instead.
        let waiting = site
            .queue
            .iter()
            .copied()
            .find(|qid| store.get(*qid).is_some_and(|w| w.faction() == faction));
        if let Some(waiting_id) = waiting {
            let detachment = store.remove(id)?;
            if let Some(waiter) = store.get_mut(waiting_id) {
                waiter.merge_units(detachment.units());
            }
            return Some(ArrivalOutcome::MergedWithWaiting { faction });
        }

        if Self::slot_available(site, stronghold.owner(), faction) {
            let detachment = store.remove(id)?;
            site.slots
                .push(Engagement::open(&detachment, stronghold.garrison(), now_ms));
            return Some(ArrivalOutcome::Opened { faction });
        }

        if let Some(waiter) = store.get_mut(id) {
            waiter.set_phase(Phase::Waiting);
        }
        site.queue.push_back(id);
        Some(ArrivalOutcome::Queued { faction })
    }

    /// A faction may open an engagement if no slot is taken, or as the
    /// second slot when the ground belongs to neither attacker.
    fn slot_available(site: &Site, owner: Owner, faction: FactionId) -> bool {
        if site.slots.is_empty() {
            return true;
        }
        if site.slots.len() >= MAX_ENGAGEMENT_SLOTS {
            return false;
        }
        owner.faction() != Some(faction)
            && site.slots.iter().all(|e| owner.faction() != Some(e.faction()))
    }

    /// Run combat for every contested site and apply resolutions.
    ///
    /// Sites advance in ascending stronghold order and slots oldest
    /// first, so concurrent engagements resolve identically on every
    /// peer. A conquest takes effect immediately: the next slot at the
    /// same site already fights the new garrison this tick.
    pub fn step_combat(
        &mut self,
        strongholds: &mut [Stronghold],
        store: &mut DetachmentStore,
        now_ms: u64,
    ) -> CombatReport {
        let mut report = CombatReport::default();

        let mut keys: Vec<usize> = self.sites.keys().copied().collect();
        keys.sort_unstable();

        for key in keys {
            let Some(site) = self.sites.get_mut(&key) else {
                continue;
            };
            let Some(stronghold) = strongholds.get_mut(key) else {
                // Degenerate state: the target is gone. Abort every
                // engagement and waiter at this site.
                tracing::warn!(stronghold = key, "combat site lost its stronghold, aborting");
                for qid in site.queue.drain(..) {
                    store.remove(qid);
                }
                site.slots.clear();
                continue;
            };

            let mut resolved = Vec::new();
            for i in 0..site.slots.len() {
                let attacker = site.slots[i].faction();
                let step = site.slots[i].step(stronghold, now_ms);
                for outcome in step.rounds {
                    report.rounds.push(RoundEvent {
                        stronghold: key,
                        attacker,
                        outcome,
                    });
                }
                if let Some(resolution) = step.resolution {
                    if let Resolution::AttackerWins { survivors } = resolution {
                        stronghold.capture(Owner::Faction(attacker), survivors, now_ms);
                    }
                    report.resolutions.push(ResolutionEvent {
                        stronghold: key,
                        attacker,
                        resolution,
                    });
                    resolved.push(i);
                }
            }

            for &i in resolved.iter().rev() {
                site.slots.remove(i);
            }

            if !resolved.is_empty() {
                Self::promote_waiters(site, key, stronghold, store, now_ms, &mut report);
            }
        }

        self.sites.retain(|_, site| !site.is_empty());
        report
    }

    /// Move waiters out of the queue while slots are free. A waiter
    /// whose faction now owns the ground joins the garrison; one whose
    /// faction is still fighting merges into that pool; otherwise it
    /// opens a fresh engagement if the slot rules allow, or keeps
    /// waiting.
    fn promote_waiters(
        site: &mut Site,
        key: usize,
        stronghold: &mut Stronghold,
        store: &mut DetachmentStore,
        now_ms: u64,
        report: &mut CombatReport,
    ) {
        while site.slots.len() < MAX_ENGAGEMENT_SLOTS {
            let Some(&front) = site.queue.front() else {
                break;
            };
            let Some(faction) = store.get(front).map(|d| d.faction()) else {
                site.queue.pop_front();
                continue;
            };

            if stronghold.owner() == Owner::Faction(faction) {
                site.queue.pop_front();
                if let Some(detachment) = store.remove(front) {
                    let added = stronghold.absorb(detachment.units());
                    report.promotions.push(PromotionEvent::AbsorbedFromQueue {
                        stronghold: key,
                        faction,
                        added,
                    });
                }
                continue;
            }

            if let Some(slot) = site.slots.iter_mut().find(|e| e.faction() == faction) {
                site.queue.pop_front();
                if let Some(detachment) = store.remove(front) {
                    let added = slot.reinforce(detachment.units(), now_ms);
                    report.promotions.push(PromotionEvent::MergedFromQueue {
                        stronghold: key,
                        faction,
                        added,
                    });
                }
                continue;
            }

            if !Self::slot_available(site, stronghold.owner(), faction) {
                break;
            }
            site.queue.pop_front();
            if let Some(detachment) = store.remove(front) {
                site.slots
                    .push(Engagement::open(&detachment, stronghold.garrison(), now_ms));
                report.promotions.push(PromotionEvent::PromotedToEngagement {
                    stronghold: key,
                    faction,
                });
            }
        }
    }
}
