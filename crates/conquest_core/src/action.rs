//! Actions: the only way anything outside the simulator mutates a match.
//!
//! A human click, an AI policy, and a remote peer all funnel through the
//! same primitive. Actions carry everything a receiving peer needs to
//! reproduce the dispatch exactly, including the seed that will drive
//! the dice if the detachment ends up opening an engagement.

use serde::{Deserialize, Serialize};

/// A command issued by one faction against the shared entity model.
///
/// Kept externally tagged so it survives bincode on the relay wire;
/// the headless protocol wraps it in its own JSON envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Dispatch a percentage of a stronghold's garrison at a target.
    ///
    /// `source` and `target` are indices into the match's stronghold
    /// array, which is identical on every peer. The seed travels with
    /// the action so every peer resolves the resulting engagement with
    /// the same dice.
    SendUnits {
        source: usize,
        target: usize,
        percentage: u8,
        seed: u64,
    },
}

impl Action {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SendUnits { .. } => "send_units",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_wire_round_trip() {
        let action = Action::SendUnits {
            source: 0,
            target: 3,
            percentage: 50,
            seed: 12345,
        };
        let bytes = bincode::serialize(&action).unwrap();
        let back: Action = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn test_json_round_trip() {
        let action = Action::SendUnits {
            source: 0,
            target: 3,
            percentage: 50,
            seed: 12345,
        };
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"percentage\":50"));
        let back: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn test_name() {
        let action = Action::SendUnits {
            source: 1,
            target: 2,
            percentage: 100,
            seed: 0,
        };
        assert_eq!(action.name(), "send_units");
    }
}
