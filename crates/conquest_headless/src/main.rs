//! Headless conquest match runner.
//!
//! This binary runs matches without graphics, controlled via JSON on
//! stdin/stdout. Designed for scripted self-play, CI testing, and
//! agents that drive a faction externally.
//!
//! # Usage
//!
//! ```bash
//! # Interactive mode - read commands from stdin
//! cargo run -p conquest_headless
//!
//! # Run a single match with a scenario
//! cargo run -p conquest_headless -- run --scenario citadel_assault
//!
//! # Batch balance test
//! cargo run -p conquest_headless -- batch --scenario skirmish_1v1 --count 1000 --output reports/
//!
//! # Verify determinism
//! cargo run -p conquest_headless -- verify --seed 12345 --runs 5
//! ```
//!
//! Input (stdin): JSON commands, one per line.
//! Output (stdout): JSON responses, one per line.
//! Logs (stderr): human-readable diagnostics.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use conquest_headless::{
    batch::{run_batch, verify_determinism, BatchConfig},
    policy::{drive_tick, roster},
    runner::{MatchRunner, RunnerConfig},
    scenario::Scenario,
};

#[derive(Parser)]
#[command(name = "conquest_headless")]
#[command(about = "Headless conquest match runner for self-play and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single interactive match
    Run {
        /// Built-in scenario name or RON file to load
        #[arg(short, long)]
        scenario: Option<String>,

        /// Output full state after every tick command
        #[arg(long)]
        auto_state: bool,
    },

    /// Run a batch of self-play matches for balance testing
    Batch {
        /// Scenario to run
        #[arg(short, long, default_value = "skirmish_1v1")]
        scenario: String,

        /// Number of matches to run
        #[arg(short, long, default_value = "100")]
        count: u32,

        /// Maximum parallel matches (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Output directory for results
        #[arg(short, long, default_value = "reports")]
        output: PathBuf,

        /// Starting random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Hard cap on ticks per match
        #[arg(long, default_value = "24000")]
        max_ticks: u64,
    },

    /// Verify determinism by running the same seed multiple times
    Verify {
        /// Scenario to test
        #[arg(short, long, default_value = "skirmish_1v1")]
        scenario: String,

        /// Seed to verify
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,
    },

    /// Run N ticks for benchmarking
    Benchmark {
        /// Number of ticks to run
        #[arg(short, long, default_value = "24000")]
        ticks: u64,

        /// Scenario to benchmark
        #[arg(short, long)]
        scenario: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logging goes to stderr; stdout is reserved for the protocol
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    match cli.command {
        Some(Commands::Run {
            scenario,
            auto_state,
        }) => {
            cmd_run(scenario, auto_state);
        }
        Some(Commands::Batch {
            scenario,
            count,
            parallel,
            output,
            seed,
            max_ticks,
        }) => {
            cmd_batch(scenario, count, parallel, output, seed, max_ticks);
        }
        Some(Commands::Verify {
            scenario,
            seed,
            runs,
        }) => {
            cmd_verify(&scenario, seed, runs);
        }
        Some(Commands::Benchmark { ticks, scenario }) => {
            cmd_benchmark(ticks, scenario);
        }
        None => {
            // Default: interactive mode
            cmd_run(None, false);
        }
    }
}

fn resolve_or_exit(name_or_path: &str) -> Scenario {
    match Scenario::resolve(name_or_path) {
        Ok(scenario) => scenario,
        Err(e) => {
            eprintln!("FATAL: cannot load scenario '{name_or_path}': {e}");
            std::process::exit(1);
        }
    }
}

/// Run a single interactive match over stdin/stdout.
fn cmd_run(scenario: Option<String>, auto_state: bool) {
    tracing::info!("starting interactive session");

    let scenario = scenario.map_or_else(Scenario::default, |name| resolve_or_exit(&name));
    let runner = match MatchRunner::new(RunnerConfig {
        scenario,
        auto_state,
    }) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    if let Err(e) = runner.run(stdin.lock(), &mut stdout) {
        eprintln!("FATAL: session IO failed: {e}");
        std::process::exit(1);
    }
}

/// Run a batch of matches and print the summary.
fn cmd_batch(
    scenario: String,
    count: u32,
    parallel: u32,
    output: PathBuf,
    seed: u64,
    max_ticks: u64,
) {
    let num_cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);

    tracing::info!(
        scenario = %scenario,
        count,
        parallel,
        seed,
        max_ticks,
        output = %output.display(),
        cpus_available = num_cpus,
        "batch configuration"
    );

    if let Err(e) = std::fs::create_dir_all(&output) {
        tracing::error!(error = %e, path = %output.display(), "cannot create output directory");
        eprintln!(
            "FATAL: cannot create output directory '{}': {e}",
            output.display()
        );
        std::process::exit(1);
    }

    let config = BatchConfig {
        scenario,
        match_count: count,
        parallel,
        output_dir: output.clone(),
        seed_start: seed,
        max_ticks,
    };

    let results = match run_batch(config) {
        Ok(results) => results,
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };

    let results_path = output.join("batch_results.json");
    if let Err(e) = results.save(&results_path) {
        tracing::error!(error = %e, path = %results_path.display(), "failed to save results");
        eprintln!("FATAL: failed to save results: {e}");
        std::process::exit(1);
    }

    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATCH COMPLETE");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Matches played: {}", results.reports.len());
    if !results.errors.is_empty() {
        eprintln!("Matches FAILED: {}", results.errors.len());
    }
    eprintln!("Draws: {}", results.summary.draws);
    eprintln!("Duration: {:.1}s", results.duration_seconds);
    eprintln!(
        "Throughput: {:.1} matches/sec",
        results.reports.len() as f64 / results.duration_seconds.max(0.001)
    );

    eprintln!("\nWin rates:");
    let mut rates: Vec<_> = results.summary.win_rates.iter().collect();
    rates.sort_by(|a, b| a.0.cmp(b.0));
    for (faction, rate) in rates {
        eprintln!("  {}: {:.1}%", faction, rate * 100.0);
    }

    if !results.errors.is_empty() {
        eprintln!("\nFailures:");
        for error in results.errors.iter().take(10) {
            eprintln!(
                "  match {} (seed {}): {}",
                error.match_index, error.seed, error.message
            );
        }
        if results.errors.len() > 10 {
            eprintln!("  ... and {} more", results.errors.len() - 10);
        }
    }

    eprintln!("\nResults saved to: {}", results_path.display());
}

/// Verify determinism for one seed.
fn cmd_verify(scenario: &str, seed: u64, runs: u32) {
    tracing::info!(scenario = %scenario, seed, runs, "verifying determinism");

    let resolved = resolve_or_exit(scenario);
    if verify_determinism(&resolved, seed, runs) {
        eprintln!("PASS: all {runs} runs produced identical results");
    } else {
        eprintln!("FAIL: non-determinism detected");
        std::process::exit(1);
    }
}

/// Measure raw simulation throughput.
fn cmd_benchmark(ticks: u64, scenario: Option<String>) {
    use std::time::Instant;

    tracing::info!(ticks, "running benchmark");

    let resolved = scenario.map_or_else(Scenario::skirmish_1v1, |name| resolve_or_exit(&name));
    let mut sim = match resolved.build_sim() {
        Ok(sim) => sim,
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };
    let mut policies = roster(&resolved.seats, resolved.seed);

    eprintln!(
        "Benchmarking '{}': {} strongholds, {} seats",
        resolved.name,
        sim.strongholds().len(),
        resolved.seats.len()
    );
    eprintln!("Running {ticks} ticks...");

    // Warmup
    for _ in 0..100 {
        drive_tick(&mut sim, &mut policies);
    }

    let start = Instant::now();
    for _ in 0..ticks {
        drive_tick(&mut sim, &mut policies);
    }
    let elapsed = start.elapsed();

    let tps = ticks as f64 / elapsed.as_secs_f64();

    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BENCHMARK RESULTS");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Ticks: {ticks}");
    eprintln!("Duration: {:.3}s", elapsed.as_secs_f64());
    eprintln!("Ticks/second: {tps:.1}");
    eprintln!("ms/tick: {:.4}", elapsed.as_millis() as f64 / ticks as f64);
    eprintln!("Detachments live: {}", sim.detachments().len());
    eprintln!("State hash: {:016x}", sim.state_hash());
}
