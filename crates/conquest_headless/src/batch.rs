//! Batch self-play runner for balance testing.
//!
//! Runs many matches of one scenario in parallel over rayon, each with
//! its own seed, and aggregates the reports into a summary. Matches are
//! fully deterministic per seed, so a batch is reproducible from its
//! configuration alone.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::policy::{drive_tick, roster};
use crate::report::{BatchSummary, MatchReport};
use crate::scenario::{Scenario, ScenarioError};

/// Fallback tick limit for scenarios that do not set their own.
pub const DEFAULT_MAX_TICKS: u64 = 24_000;

/// Configuration for a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Scenario to run: a built-in name or a RON file path.
    pub scenario: String,
    /// Number of matches to run.
    pub match_count: u32,
    /// Maximum parallel matches (0 = rayon default).
    pub parallel: u32,
    /// Output directory for results.
    pub output_dir: PathBuf,
    /// Seed for the first match; match `i` runs under `seed_start + i`.
    pub seed_start: u64,
    /// Hard cap on ticks per match. A scenario's own tick limit can
    /// shorten a match but never extend it past this.
    pub max_ticks: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scenario: "skirmish_1v1".to_string(),
            match_count: 100,
            parallel: 0,
            output_dir: PathBuf::from("reports"),
            seed_start: 0,
            max_ticks: DEFAULT_MAX_TICKS,
        }
    }
}

impl BatchConfig {
    /// Config for a specific scenario.
    #[must_use]
    pub fn new(scenario: &str, match_count: u32) -> Self {
        Self {
            scenario: scenario.to_string(),
            match_count,
            ..Default::default()
        }
    }

    /// Set the output directory.
    #[must_use]
    pub fn with_output(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    /// Set the starting seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Set the per-match tick cap.
    #[must_use]
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }
}

/// Results from a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Configuration used.
    pub config: BatchConfig,
    /// Individual match reports.
    pub reports: Vec<MatchReport>,
    /// Aggregate summary.
    pub summary: BatchSummary,
    /// Total runtime in seconds.
    pub duration_seconds: f64,
    /// Matches that failed to run.
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results as pretty-printed JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load previously saved results.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or not valid results JSON.
    pub fn load(path: &std::path::Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(std::io::Error::other)
    }
}

/// A match that failed during a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    /// Index of the match within the batch.
    pub match_index: u32,
    /// Seed it ran under.
    pub seed: u64,
    /// What went wrong.
    pub message: String,
}

/// Shared progress counter for a running batch.
#[derive(Debug)]
pub struct BatchProgress {
    total: u32,
    completed: AtomicU32,
    started: Instant,
}

impl BatchProgress {
    /// Track a batch of `total` matches starting now.
    #[must_use]
    pub fn new(total: u32) -> Self {
        Self {
            total,
            completed: AtomicU32::new(0),
            started: Instant::now(),
        }
    }

    /// Record one finished match and return the new completion count.
    pub fn record_completion(&self) -> u32 {
        self.completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Matches completed so far.
    #[must_use]
    pub fn current(&self) -> u32 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Completion percentage.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        f64::from(self.current()) / f64::from(self.total.max(1)) * 100.0
    }

    /// Estimated time remaining, from the average pace so far.
    #[must_use]
    pub fn eta(&self) -> Duration {
        let completed = self.current();
        if completed == 0 {
            return Duration::from_secs(0);
        }
        let per_match = self.started.elapsed().as_secs_f64() / f64::from(completed);
        let remaining = self.total.saturating_sub(completed);
        Duration::from_secs_f64(per_match * f64::from(remaining))
    }
}

/// Play one match to completion under a fixed seed.
fn run_single_match(
    scenario: &Scenario,
    seed: u64,
    max_ticks: u64,
) -> Result<MatchReport, String> {
    let keyed = scenario.clone().with_seed(seed);
    let mut sim = keyed.build_sim().map_err(|e| e.to_string())?;
    let mut policies = roster(&keyed.seats, seed);
    let limit = keyed.tick_limit.map_or(max_ticks, |l| l.min(max_ticks));

    while sim.winner().is_none() && sim.get_tick() < limit {
        drive_tick(&mut sim, &mut policies);
    }

    Ok(MatchReport::from_match(
        format!("match_{seed}"),
        keyed.name.clone(),
        seed,
        &sim,
    ))
}

/// Run a batch of matches and aggregate the reports.
///
/// # Errors
///
/// Returns an error if the configured scenario cannot be resolved;
/// failures of individual matches land in [`BatchResults::errors`]
/// instead.
pub fn run_batch(config: BatchConfig) -> Result<BatchResults, ScenarioError> {
    let start = Instant::now();
    let scenario = Scenario::resolve(&config.scenario)?;
    let progress = Arc::new(BatchProgress::new(config.match_count));

    info!(
        scenario = %config.scenario,
        matches = config.match_count,
        seed_start = config.seed_start,
        "starting batch"
    );

    if config.parallel > 0 {
        // Ignored if a global pool already exists
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel as usize)
            .build_global()
            .ok();
    }

    let results: Vec<Result<MatchReport, BatchError>> = (0..config.match_count)
        .into_par_iter()
        .map(|i| {
            let seed = config.seed_start.wrapping_add(u64::from(i));
            match run_single_match(&scenario, seed, config.max_ticks) {
                Ok(report) => {
                    let completed = progress.record_completion();
                    if completed % 10 == 0 {
                        debug!(completed, total = config.match_count, "progress");
                    }
                    if completed % 100 == 0 {
                        info!(
                            completed,
                            total = config.match_count,
                            eta_secs = progress.eta().as_secs(),
                            "batch progress"
                        );
                    }
                    Ok(report)
                }
                Err(message) => {
                    warn!(match_index = i, seed, %message, "match failed");
                    Err(BatchError {
                        match_index: i,
                        seed,
                        message,
                    })
                }
            }
        })
        .collect();

    let (reports, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    let reports: Vec<MatchReport> = reports.into_iter().filter_map(Result::ok).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(Result::err).collect();

    let summary = BatchSummary::from_reports(&reports);
    let duration_seconds = start.elapsed().as_secs_f64();

    info!(
        matches = reports.len(),
        failed = errors.len(),
        seconds = duration_seconds,
        "batch complete"
    );

    Ok(BatchResults {
        config,
        reports,
        summary,
        duration_seconds,
        errors,
    })
}

/// Run the same seed repeatedly and check every run lands on the same
/// winner, duration, and state hash.
#[must_use]
pub fn verify_determinism(scenario: &Scenario, seed: u64, runs: u32) -> bool {
    let mut first: Option<MatchReport> = None;
    for run in 0..runs {
        match run_single_match(scenario, seed, DEFAULT_MAX_TICKS) {
            Ok(report) => {
                if let Some(first) = &first {
                    if report.winner != first.winner
                        || report.duration_ticks != first.duration_ticks
                        || report.final_state_hash != first.final_state_hash
                    {
                        warn!(run, seed, "runs diverged");
                        return false;
                    }
                } else {
                    first = Some(report);
                }
            }
            Err(message) => {
                warn!(run, seed, %message, "verification run failed");
                return false;
            }
        }
    }
    true
}
