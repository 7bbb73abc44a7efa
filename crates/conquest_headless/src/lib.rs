//! Headless match driver for policy self-play and CI verification.
//!
//! Runs conquest matches without a renderer, controlled via JSON
//! commands on stdin with state output on stdout. This enables:
//!
//! - **Policy matches**: scripted baselines play full matches unattended
//! - **CI verification**: determinism checks and balance batches in automation
//! - **External control**: an agent drives a faction over the line protocol
//!
//! # Protocol
//!
//! Communication uses JSON lines (one JSON object per line):
//!
//! - **stdin**: commands (`tick`, `query`, `send`, `hash`, `load_scenario`, `quit`)
//! - **stdout**: responses (`ready`, `ack`, `error`, `state`, `state_hash`,
//!   `game_over`, `bye`)
//! - **stderr**: human-readable logs
//!
//! See the [`protocol`] module for the full command and response set.
//!
//! # Example
//!
//! ```bash
//! # Interactive session
//! echo '{"cmd":"tick","count":60}' | cargo run -p conquest_headless
//!
//! # Batch self-play for balance numbers
//! cargo run -p conquest_headless -- batch --scenario skirmish_1v1 --count 200
//!
//! # Determinism gate for CI
//! cargo run -p conquest_headless -- verify --seed 12345 --runs 5
//! ```

pub mod batch;
pub mod policy;
pub mod protocol;
pub mod report;
pub mod runner;
pub mod scenario;

pub use batch::{run_batch, verify_determinism, BatchConfig, BatchResults};
pub use policy::BaselinePolicy;
pub use protocol::{Command, Response};
pub use report::{BatchSummary, MatchReport};
pub use runner::{MatchRunner, RunnerConfig};
pub use scenario::{Difficulty, Scenario, ScenarioError};
