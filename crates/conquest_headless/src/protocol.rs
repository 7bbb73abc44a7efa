//! JSON-lines control protocol.
//!
//! One JSON object per line in each direction: commands arrive on
//! stdin, responses leave on stdout. Logs go to stderr only, so a
//! driving process can parse stdout without filtering.
//!
//! # Commands
//!
//! ```json
//! {"cmd":"tick","count":20}
//! {"cmd":"query"}
//! {"cmd":"send","faction":0,"source":0,"target":3,"percentage":50,"seed":7}
//! {"cmd":"hash"}
//! {"cmd":"load_scenario","path":"scenarios/skirmish.ron"}
//! {"cmd":"quit"}
//! ```
//!
//! # Responses
//!
//! ```json
//! {"type":"ready","version":1,"tick":0}
//! {"type":"ack","cmd":"send"}
//! {"type":"error","message":"percentage 0 out of range","cmd":"send"}
//! {"type":"state","tick":40,"status":"in_progress",...}
//! {"type":"state_hash","tick":40,"hash":1234567890}
//! {"type":"game_over","result":"decided","winner":1,"ticks":4031}
//! {"type":"bye"}
//! ```

use serde::{Deserialize, Serialize};

use conquest_core::detachment::Phase;
use conquest_core::stronghold::Tier;

/// Protocol version reported in the ready response.
pub const PROTOCOL_VERSION: u32 = 1;

fn default_tick_count() -> u32 {
    1
}

/// Commands accepted on stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Advance the match by `count` ticks.
    Tick {
        /// Number of ticks to advance (default 1).
        #[serde(default = "default_tick_count")]
        count: u32,
    },
    /// Report the full match state.
    Query,
    /// Dispatch garrison units between strongholds.
    Send {
        /// Issuing faction index (default 0).
        #[serde(default)]
        faction: u8,
        /// Source stronghold index.
        source: usize,
        /// Target stronghold index.
        target: usize,
        /// Percentage of the garrison to send.
        percentage: u8,
        /// Dice seed carried by the dispatch (default 0).
        #[serde(default)]
        seed: u64,
    },
    /// Report the state hash without the full state.
    Hash,
    /// Replace the running match with a scenario file.
    LoadScenario {
        /// Path to a RON scenario file.
        path: String,
    },
    /// End the session.
    Quit,
}

impl Command {
    /// Parse a command from a JSON line.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is not a valid command object.
    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// The wire name of this command, for error attribution.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Tick { .. } => "tick",
            Self::Query => "query",
            Self::Send { .. } => "send",
            Self::Hash => "hash",
            Self::LoadScenario { .. } => "load_scenario",
            Self::Quit => "quit",
        }
    }
}

/// Stronghold tier names on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierName {
    /// Garrison below 10.
    Outpost,
    /// Garrison 10 to 19.
    Watchtower,
    /// Garrison 20 and up.
    Citadel,
}

impl From<Tier> for TierName {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Outpost => Self::Outpost,
            Tier::Watchtower => Self::Watchtower,
            Tier::Citadel => Self::Citadel,
        }
    }
}

/// Detachment phase names on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    /// Moving toward its target.
    Marching,
    /// Queued behind a full engagement.
    Waiting,
}

impl From<Phase> for PhaseName {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Marching => Self::Marching,
            Phase::Waiting => Self::Waiting,
        }
    }
}

/// One stronghold in a state response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrongholdRow {
    /// Layout index, stable for the whole match.
    pub index: usize,
    /// Board position.
    pub x: f64,
    /// Board position.
    pub y: f64,
    /// Owning faction index; absent for neutral ground.
    pub owner: Option<u8>,
    /// Stationed units.
    pub garrison: u32,
    /// Size class.
    pub tier: TierName,
    /// Whether an engagement is active here.
    pub besieged: bool,
}

/// One detachment in a state response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetachmentRow {
    /// Detachment identifier.
    pub id: u64,
    /// Owning faction index.
    pub faction: u8,
    /// Units in the group.
    pub units: u32,
    /// Board position.
    pub x: f64,
    /// Board position.
    pub y: f64,
    /// Source stronghold index.
    pub source: usize,
    /// Target stronghold index.
    pub target: usize,
    /// What the detachment is doing.
    pub phase: PhaseName,
}

/// Where the match stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Still being fought.
    InProgress,
    /// One faction holds everything that matters.
    Decided,
    /// Tick limit reached with more than one contender left.
    Draw,
}

/// How a finished match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchResult {
    /// A single faction survived.
    Decided,
    /// Tick limit reached without a decision.
    Draw,
}

/// Responses written to stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Sent once when the runner is listening.
    Ready {
        /// Protocol version.
        version: u32,
        /// Current tick.
        tick: u64,
    },
    /// Command applied.
    Ack {
        /// The command that was applied.
        cmd: String,
    },
    /// Command failed; the match state is unchanged.
    Error {
        /// What went wrong.
        message: String,
        /// The command that failed, when attributable.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cmd: Option<String>,
    },
    /// Full match state.
    State {
        /// Current tick.
        tick: u64,
        /// Where the match stands.
        status: MatchStatus,
        /// Winning faction, once decided.
        winner: Option<u8>,
        /// All strongholds, in layout order.
        strongholds: Vec<StrongholdRow>,
        /// All marching and waiting detachments.
        detachments: Vec<DetachmentRow>,
        /// State hash at this tick.
        hash: u64,
    },
    /// State hash alone, for cheap divergence checks.
    StateHash {
        /// Current tick.
        tick: u64,
        /// State hash at this tick.
        hash: u64,
    },
    /// The match has ended. Sent once, the tick it happens.
    GameOver {
        /// How the match ended.
        result: MatchResult,
        /// Winning faction, if any.
        winner: Option<u8>,
        /// Tick at which the match ended.
        ticks: u64,
    },
    /// Session closing after a quit command.
    Bye,
}

impl Response {
    /// The ready response sent on startup.
    #[must_use]
    pub const fn ready(tick: u64) -> Self {
        Self::Ready {
            version: PROTOCOL_VERSION,
            tick,
        }
    }

    /// Acknowledge a command by name.
    pub fn ack(cmd: impl Into<String>) -> Self {
        Self::Ack { cmd: cmd.into() }
    }

    /// Report a failed command.
    pub fn error(message: impl Into<String>, cmd: Option<&str>) -> Self {
        Self::Error {
            message: message.into(),
            cmd: cmd.map(String::from),
        }
    }

    /// Serialize to a newline-terminated JSON string.
    #[must_use]
    pub fn to_json_line(&self) -> String {
        let mut json = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"serialization failed: {e}"}}"#)
        });
        json.push('\n');
        json
    }
}
