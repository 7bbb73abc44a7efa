//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Host-relay replication never ships entity state during a match; every
//! peer replays the same action stream, so the simulation must be 100%
//! deterministic. Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`conquest_core::math::Fixed`]
//!   throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   We always iterate in sorted entity ID or site order.
//!
//! - **System randomness**: No ambient `rand()` calls. Dice seeds travel
//!   inside actions and feed seeded PRNGs.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual system determinism (production, marching, dice)
//! 2. **Property tests**: Random inputs must still produce deterministic outputs
//! 3. **Integration tests**: Full match scenarios are reproducible
//! 4. **Parallel tests**: Running N simulations in parallel all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use conquest_core::simulation::ConquestSim;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Result of parallel simulation runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each simulation.
    pub hashes: Vec<u64>,
    /// Number of ticks each simulation ran.
    pub ticks: u64,
    /// Number of simulations run.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all simulations produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all simulations matched.
    ///
    /// # Panics
    ///
    /// Panics if simulations produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel simulations diverged!\n\
                 Simulations: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_sims,
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial simulation state
/// * `step` - Function to advance simulation by one tick
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```ignore
/// use conquest_test_utils::determinism::verify_determinism;
///
/// let result = verify_determinism(
///     5,   // Run 5 times
///     100, // 100 ticks each
///     || setup_siege_scenario(),
///     |sim| { sim.tick(); },
///     |sim| sim.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Simplified determinism verification for [`ConquestSim`].
///
/// Runs the simulation twice with identical setup and verifies the final
/// state hashes match exactly.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> ConquestSim,
{
    let result = verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |sim| {
            sim.tick();
        },
        ConquestSim::state_hash,
    );
    result.is_deterministic
}

/// Run N simulations in parallel and collect final hashes.
///
/// This is useful for catching non-determinism that only manifests
/// under thread scheduling variations or memory layout differences.
pub fn run_parallel_simulations<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> ParallelSimResult
where
    F: Fn() -> ConquestSim + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    for _ in 0..num_ticks {
                        sim.tick();
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect()
    });

    ParallelSimResult {
        hashes,
        ticks: num_ticks,
        num_sims,
    }
}

/// Compare two simulation runs tick-by-tick, finding the first divergence.
///
/// Useful for debugging non-determinism by finding exactly when
/// simulations start to differ.
///
/// # Returns
///
/// `None` if simulations are deterministic, `Some(tick)` if they diverge
/// at that tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> ConquestSim,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    // Check initial state
    if sim1.state_hash() != sim2.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        sim1.tick();
        sim2.tick();

        if sim1.state_hash() != sim2.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Verify that a serialization round-trip preserves simulation state exactly.
///
/// This is critical for saves and divergence dumps.
pub fn verify_serialization_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> ConquestSim,
{
    let mut sim = setup_fn();

    for _ in 0..num_ticks {
        sim.tick();
    }

    let hash_before = sim.state_hash();

    let Ok(bytes) = sim.serialize() else {
        return false;
    };
    let Ok(restored) = ConquestSim::deserialize(&bytes) else {
        return false;
    };

    hash_before == restored.state_hash()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for determinism testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of simulation determinism.
pub mod strategies {
    use conquest_core::action::Action;
    use conquest_core::map::LayoutConfig;
    use proptest::prelude::*;

    /// Generate a layout config with a random board, faction count, and seed.
    pub fn arb_layout_config() -> impl Strategy<Value = LayoutConfig> {
        (600i64..2000, 600i64..2000, 2u8..=4, any::<u64>()).prop_map(
            |(width, height, factions, seed)| LayoutConfig {
                width,
                height,
                factions,
                seed,
            },
        )
    }

    /// Generate a dispatch percentage in the valid 1..=100 range.
    pub fn arb_percentage() -> impl Strategy<Value = u8> {
        1u8..=100
    }

    /// Generate a dispatch action with distinct indices below `stronghold_count`.
    pub fn arb_send_units(stronghold_count: usize) -> impl Strategy<Value = Action> {
        (
            0..stronghold_count,
            1..stronghold_count,
            arb_percentage(),
            any::<u64>(),
        )
            .prop_map(move |(source, offset, percentage, seed)| Action::SendUnits {
                source,
                target: (source + offset) % stronghold_count,
                percentage,
                seed,
            })
    }

    /// A dispatch attempt attributed to an issuing faction.
    ///
    /// Invalid attempts (wrong owner, empty garrison) are part of the
    /// input space on purpose: peers drop them without mutating state,
    /// and the remaining valid stream must still replay identically.
    #[derive(Debug, Clone)]
    pub struct DispatchPlan {
        /// Issuing faction index.
        pub faction: u8,
        /// The action it attempts.
        pub action: Action,
    }

    /// Generate one dispatch attempt.
    pub fn arb_dispatch_plan(
        factions: u8,
        stronghold_count: usize,
    ) -> impl Strategy<Value = DispatchPlan> {
        (0..factions, arb_send_units(stronghold_count))
            .prop_map(|(faction, action)| DispatchPlan { faction, action })
    }

    /// Generate a sequence of dispatch attempts.
    pub fn arb_dispatch_sequence(
        factions: u8,
        stronghold_count: usize,
        max_len: usize,
    ) -> impl Strategy<Value = Vec<DispatchPlan>> {
        proptest::collection::vec(arb_dispatch_plan(factions, stronghold_count), 0..max_len)
    }
}
