//! # Conquest Net
//!
//! Host-relay replication for multiplayer matches.
//!
//! One peer hosts; up to three others join. The host owns the lobby,
//! sends each joiner the match-start snapshot, and relays every dispatch
//! action to every other peer. After the start message no full state
//! crosses the wire again: each peer runs its own
//! [`ConquestSim`](conquest_core::simulation::ConquestSim) over the
//! shared action stream.
//!
//! ## Crate Structure
//!
//! - [`wire`] - length-prefixed bincode frames and the peer message set
//! - [`lobby`] - roster bookkeeping and capacity refusals on the host
//! - [`host`] - accept loop, action validation, fan-out
//! - [`client`] - join handshake, reconnect backoff, status reporting
//! - [`backoff`] - bounded exponential retry schedule

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod backoff;
pub mod client;
pub mod error;
pub mod host;
pub mod lobby;
pub mod wire;

pub use error::NetError;

/// Session configuration shared by host and joining peers.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Port the host listens on.
    pub port: u16,
    /// Maximum non-host peers per match.
    pub max_clients: u8,
    /// Tick rate (must match the simulation).
    pub tick_rate: u32,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            port: 7777,
            max_clients: 3,
            tick_rate: conquest_core::simulation::TICK_RATE,
        }
    }
}
