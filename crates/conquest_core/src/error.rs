//! Error types for the conquest simulation.

use thiserror::Error;

/// Errors that can occur at the simulation's public boundary.
///
/// Entity operations inside a tick are total (no-ops replace exceptions);
/// these errors cover action validation, snapshot transfer, and state
/// serialization, the places a caller can actually react.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    /// A stronghold index was out of range for the current board.
    #[error("Stronghold {0} not found")]
    StrongholdNotFound(usize),

    /// An action failed validation and was dropped.
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// An action was issued for a stronghold the faction does not control.
    #[error("Faction {faction} does not control stronghold {stronghold}")]
    NotYourStronghold {
        /// The faction that issued the action.
        faction: u8,
        /// The stronghold index the action named.
        stronghold: usize,
    },

    /// The simulation state is invalid or could not be encoded/decoded.
    #[error("Invalid simulation state: {0}")]
    InvalidState(String),

    /// A snapshot referenced a position no stronghold occupies.
    #[error("Snapshot references unknown stronghold position ({x}, {y})")]
    UnknownPosition {
        /// X coordinate from the snapshot (fixed-point bits).
        x: i64,
        /// Y coordinate from the snapshot (fixed-point bits).
        y: i64,
    },
}

/// Result type alias for simulation operations.
pub type Result<T> = std::result::Result<T, GameError>;
