//! Host-side lobby bookkeeping.
//!
//! The lobby tracks who is connected before the match starts. Faction
//! indices are not handed out at join time: they are assigned in join
//! order when the host starts the match, so departures never leave a
//! hole in the faction numbering. The host itself is always faction 0.

use crate::wire::PeerProfile;

/// Host-local identifier for one connected peer.
///
/// Unrelated to faction indices; assigned per connection and never
/// reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

/// Pre-match membership for one session.
#[derive(Debug, Clone)]
pub struct Lobby {
    host: PeerProfile,
    capacity: usize,
    peers: Vec<(PeerId, PeerProfile)>,
}

impl Lobby {
    /// Create a lobby hosted by `host` with room for `max_clients`
    /// non-host peers.
    #[must_use]
    pub fn new(host: PeerProfile, max_clients: u8) -> Self {
        Self {
            host,
            capacity: max_clients as usize,
            peers: Vec::new(),
        }
    }

    /// Admit a peer, or explain the refusal.
    ///
    /// A peer that joins again under the same id has its profile
    /// replaced rather than occupying a second seat.
    ///
    /// # Errors
    ///
    /// Returns the refusal reason when the lobby is at capacity.
    pub fn join(&mut self, id: PeerId, profile: PeerProfile) -> Result<(), String> {
        if let Some(seat) = self.peers.iter_mut().find(|(pid, _)| *pid == id) {
            seat.1 = profile;
            return Ok(());
        }
        if self.peers.len() >= self.capacity {
            return Err(format!(
                "lobby is full ({} players maximum)",
                self.capacity + 1
            ));
        }
        self.peers.push((id, profile));
        Ok(())
    }

    /// Remove a peer. No-op for unknown ids.
    pub fn leave(&mut self, id: PeerId) {
        self.peers.retain(|(pid, _)| *pid != id);
    }

    /// Whether this peer currently holds a seat.
    #[must_use]
    pub fn contains(&self, id: PeerId) -> bool {
        self.peers.iter().any(|(pid, _)| *pid == id)
    }

    /// Connected peers including the host.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.peers.len() + 1
    }

    /// Membership list for roster broadcasts, host first.
    #[must_use]
    pub fn roster(&self) -> Vec<PeerProfile> {
        let mut peers = Vec::with_capacity(self.player_count());
        peers.push(self.host.clone());
        peers.extend(self.peers.iter().map(|(_, p)| p.clone()));
        peers
    }

    /// Faction assignments for match start, in join order.
    ///
    /// The host is faction 0 and is not listed; the first joiner gets
    /// faction 1, and so on with no gaps.
    #[must_use]
    pub fn assignments(&self) -> Vec<(PeerId, u8)> {
        self.peers
            .iter()
            .zip(1u8..)
            .map(|((id, _), faction)| (*id, faction))
            .collect()
    }

    /// Display name for a seated peer.
    #[must_use]
    pub fn display_name(&self, id: PeerId) -> Option<&str> {
        self.peers
            .iter()
            .find(|(pid, _)| *pid == id)
            .map(|(_, p)| p.display_name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lobby_for_three() -> Lobby {
        Lobby::new(PeerProfile::new("Host", "👑"), 3)
    }

    #[test]
    fn test_join_until_full_then_refuse() {
        let mut lobby = lobby_for_three();
        for i in 0..3u64 {
            lobby
                .join(PeerId(i), PeerProfile::new(format!("p{i}"), "x"))
                .unwrap();
        }
        let reason = lobby
            .join(PeerId(9), PeerProfile::new("late", "x"))
            .unwrap_err();
        assert!(reason.contains("full"));
        assert_eq!(lobby.player_count(), 4);
    }

    #[test]
    fn test_leave_frees_a_seat() {
        let mut lobby = lobby_for_three();
        for i in 0..3u64 {
            lobby
                .join(PeerId(i), PeerProfile::new(format!("p{i}"), "x"))
                .unwrap();
        }
        lobby.leave(PeerId(1));
        assert!(!lobby.contains(PeerId(1)));
        assert!(lobby.join(PeerId(9), PeerProfile::new("late", "x")).is_ok());
    }

    #[test]
    fn test_roster_is_host_first() {
        let mut lobby = lobby_for_three();
        lobby
            .join(PeerId(7), PeerProfile::new("Wren", "🐦"))
            .unwrap();
        let roster = lobby.roster();
        assert_eq!(roster[0].display_name, "Host");
        assert_eq!(roster[1].display_name, "Wren");
    }

    #[test]
    fn test_assignments_compact_after_departure() {
        let mut lobby = lobby_for_three();
        for i in 0..3u64 {
            lobby
                .join(PeerId(i), PeerProfile::new(format!("p{i}"), "x"))
                .unwrap();
        }
        lobby.leave(PeerId(0));

        let assignments = lobby.assignments();
        let factions: Vec<u8> = assignments.iter().map(|(_, f)| *f).collect();
        assert_eq!(factions, vec![1, 2]);
    }

    #[test]
    fn test_rejoin_replaces_profile() {
        let mut lobby = lobby_for_three();
        lobby.join(PeerId(1), PeerProfile::new("Old", "a")).unwrap();
        lobby.join(PeerId(1), PeerProfile::new("New", "b")).unwrap();
        assert_eq!(lobby.player_count(), 2);
        assert_eq!(lobby.display_name(PeerId(1)), Some("New"));
    }
}
