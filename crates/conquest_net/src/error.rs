//! Error types for the replication layer.

use thiserror::Error;

/// Errors crossing the network boundary.
///
/// Most are recoverable at the session layer: a dropped frame or a dead
/// connection never reaches the simulation, which keeps ticking on
/// whatever actions were already applied.
#[derive(Error, Debug)]
pub enum NetError {
    /// Underlying socket read or write failed.
    #[error("Connection error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame exceeded the maximum allowed size.
    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Declared payload length.
        len: u32,
        /// Maximum permitted payload length.
        max: u32,
    },

    /// A frame's payload failed to decode.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The peer closed the connection.
    #[error("Peer disconnected")]
    Disconnected,

    /// The host refused the join request.
    #[error("Join refused: {0}")]
    Refused(String),

    /// The peer sent a message that is invalid in the current session
    /// phase, such as an action before the match started.
    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    /// All retry attempts were exhausted.
    #[error("Gave up after {attempts} attempts: {reason}")]
    RetriesExhausted {
        /// How many attempts were made.
        attempts: u32,
        /// Why the last attempt failed.
        reason: String,
    },
}

/// Result type alias for network operations.
pub type Result<T> = std::result::Result<T, NetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetError::FrameTooLarge {
            len: 500_000,
            max: 262_144,
        };
        assert!(err.to_string().contains("500000"));

        let err = NetError::Refused("lobby is full".to_string());
        assert_eq!(err.to_string(), "Join refused: lobby is full");
    }
}
