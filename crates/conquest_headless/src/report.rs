//! Match reports and batch summaries for balance analysis.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use conquest_core::faction::FactionId;
use conquest_core::simulation::ConquestSim;

use crate::protocol::MatchResult;

/// Final record of a single match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    /// Unique match identifier within a batch.
    pub match_id: String,
    /// Scenario name.
    pub scenario: String,
    /// Seed the match ran under.
    pub seed: u64,
    /// Ticks elapsed when the match ended.
    pub duration_ticks: u64,
    /// How it ended.
    pub outcome: MatchResult,
    /// Winning faction, `None` on a draw.
    pub winner: Option<u8>,
    /// Final simulation state hash, for determinism validation.
    pub final_state_hash: u64,
    /// Per-faction holdings at the end.
    pub standings: Vec<FactionStanding>,
}

impl MatchReport {
    /// Capture a report from a finished (or tick-limited) simulation.
    #[must_use]
    pub fn from_match(
        match_id: impl Into<String>,
        scenario: impl Into<String>,
        seed: u64,
        sim: &ConquestSim,
    ) -> Self {
        let winner = sim.winner();
        Self {
            match_id: match_id.into(),
            scenario: scenario.into(),
            seed,
            duration_ticks: sim.get_tick(),
            outcome: if winner.is_some() {
                MatchResult::Decided
            } else {
                MatchResult::Draw
            },
            winner: winner.map(|f| f.0),
            final_state_hash: sim.state_hash(),
            standings: FactionStanding::collect(sim),
        }
    }
}

/// One faction's holdings at the end of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionStanding {
    /// Faction index.
    pub faction: u8,
    /// Strongholds held.
    pub strongholds: u32,
    /// Units garrisoned across them.
    pub garrison: u32,
    /// Units still marching or waiting in the field.
    pub fielded: u32,
}

impl FactionStanding {
    /// Tally holdings for every faction in the match.
    #[must_use]
    pub fn collect(sim: &ConquestSim) -> Vec<Self> {
        (0..sim.total_factions())
            .map(|f| {
                let faction = FactionId(f);
                let mut strongholds = 0u32;
                let mut garrison = 0u32;
                for s in sim.strongholds() {
                    if s.owner().faction() == Some(faction) {
                        strongholds += 1;
                        garrison += s.garrison();
                    }
                }
                let fielded = sim
                    .detachments()
                    .iter()
                    .filter(|d| d.faction() == faction)
                    .map(|d| d.units())
                    .sum();
                Self {
                    faction: f,
                    strongholds,
                    garrison,
                    fielded,
                }
            })
            .collect()
    }
}

/// Summary statistics across a batch of matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Total matches played.
    pub total_matches: u32,
    /// Matches won by each faction. Every seated faction gets an entry,
    /// so a faction that never won still shows up with zero.
    pub wins_by_faction: HashMap<String, u32>,
    /// Win rates by faction.
    pub win_rates: HashMap<String, f64>,
    /// Matches that hit the tick limit undecided.
    pub draws: u32,
    /// Average match duration in ticks.
    pub avg_duration_ticks: f64,
    /// Shortest match.
    pub min_duration_ticks: u64,
    /// Longest match.
    pub max_duration_ticks: u64,
}

impl BatchSummary {
    /// Calculate a summary from a list of match reports.
    #[must_use]
    pub fn from_reports(reports: &[MatchReport]) -> Self {
        if reports.is_empty() {
            return Self::default();
        }

        let mut summary = Self {
            total_matches: reports.len() as u32,
            ..Default::default()
        };

        let mut duration_sum = 0u64;
        let mut min_duration = u64::MAX;
        let mut max_duration = 0u64;

        for report in reports {
            duration_sum += report.duration_ticks;
            min_duration = min_duration.min(report.duration_ticks);
            max_duration = max_duration.max(report.duration_ticks);

            // Seed zero entries so absent winners still appear
            for standing in &report.standings {
                summary
                    .wins_by_faction
                    .entry(FactionId(standing.faction).to_string())
                    .or_default();
            }
            if let Some(winner) = report.winner {
                *summary
                    .wins_by_faction
                    .entry(FactionId(winner).to_string())
                    .or_default() += 1;
            } else {
                summary.draws += 1;
            }
        }

        summary.avg_duration_ticks = duration_sum as f64 / reports.len() as f64;
        summary.min_duration_ticks = min_duration;
        summary.max_duration_ticks = max_duration;

        for (faction, wins) in &summary.wins_by_faction {
            summary
                .win_rates
                .insert(faction.clone(), f64::from(*wins) / f64::from(summary.total_matches));
        }

        summary
    }

    /// Even share of wins given how many factions played.
    fn expected_rate(&self) -> f64 {
        1.0 / self.win_rates.len().max(1) as f64
    }

    /// Check whether every faction's win rate sits within `threshold`
    /// of an even share.
    #[must_use]
    pub fn is_balanced(&self, threshold: f64) -> bool {
        let expected = self.expected_rate();
        self.win_rates
            .values()
            .all(|rate| (rate - expected).abs() <= threshold)
    }

    /// The faction winning more than its share plus `threshold`, if any.
    #[must_use]
    pub fn dominant_faction(&self, threshold: f64) -> Option<&String> {
        let expected = self.expected_rate();
        self.win_rates
            .iter()
            .find(|(_, rate)| **rate > expected + threshold)
            .map(|(faction, _)| faction)
    }
}
