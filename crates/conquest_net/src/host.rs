//! Host hub: accept loop, lobby phase, action validation and fan-out.
//!
//! The host is the only peer with a listening socket. Every client
//! talks to it alone; the hub applies each valid action to its own
//! simulation and re-broadcasts the frame verbatim to every other
//! client. Outbound traffic goes through per-peer queues with
//! `try_send`, so a slow or dead connection can never stall the
//! simulation tick.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use conquest_core::action::Action;
use conquest_core::faction::FactionId;
use conquest_core::map::LayoutConfig;
use conquest_core::simulation::{ConquestSim, TICK_MS};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::error::{NetError, Result};
use crate::lobby::{Lobby, PeerId};
use crate::wire::{self, PeerMessage, PeerProfile};
use crate::NetConfig;

/// Outbound frames buffered per peer before the hub starts dropping.
const OUTBOUND_QUEUE: usize = 64;

/// Commands the hosting player's front end issues to the hub.
#[derive(Debug)]
pub enum HostCommand {
    /// Lock the roster, deal faction assignments, send snapshots.
    StartMatch,
    /// Say something to everyone in the lobby.
    Chat(String),
    /// Dispatch an action as the host's own faction (faction 0).
    Dispatch(Action),
    /// Close the session.
    Shutdown,
}

/// Handle the hosting player's front end keeps while the hub runs.
#[derive(Debug, Clone)]
pub struct HostHandle {
    commands: mpsc::Sender<HostCommand>,
}

impl HostHandle {
    /// Send one command to the hub.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Disconnected`] if the hub has shut down.
    pub async fn command(&self, command: HostCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| NetError::Disconnected)
    }
}

enum HubEvent {
    Inbound(PeerId, PeerMessage),
    Closed(PeerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionPhase {
    Lobby,
    Playing,
    Finished,
}

struct PeerHandle {
    outbound: mpsc::Sender<PeerMessage>,
    joined: bool,
}

/// Hub state, separate from the sockets so the message handling can be
/// exercised without a network.
struct Hub {
    layout: LayoutConfig,
    host_profile: PeerProfile,
    lobby: Lobby,
    phase: SessionPhase,
    sim: Option<ConquestSim>,
    peers: HashMap<PeerId, PeerHandle>,
    factions: HashMap<PeerId, u8>,
}

impl Hub {
    fn new(config: &NetConfig, host_profile: PeerProfile, layout: LayoutConfig) -> Self {
        Self {
            layout,
            lobby: Lobby::new(host_profile.clone(), config.max_clients),
            host_profile,
            phase: SessionPhase::Lobby,
            sim: None,
            peers: HashMap::new(),
            factions: HashMap::new(),
        }
    }

    fn register_peer(&mut self, id: PeerId, outbound: mpsc::Sender<PeerMessage>) {
        self.peers.insert(
            id,
            PeerHandle {
                outbound,
                joined: false,
            },
        );
    }

    fn send_to(&self, id: PeerId, message: PeerMessage) {
        let Some(handle) = self.peers.get(&id) else {
            return;
        };
        if let Err(err) = handle.outbound.try_send(message) {
            warn!(peer = id.0, %err, "outbound queue unavailable, dropping frame");
        }
    }

    /// Fan a message out to every joined peer except `exclude`.
    fn broadcast(&self, message: &PeerMessage, exclude: Option<PeerId>) {
        for (&id, handle) in &self.peers {
            if !handle.joined || Some(id) == exclude {
                continue;
            }
            if let Err(err) = handle.outbound.try_send(message.clone()) {
                warn!(peer = id.0, %err, "outbound queue unavailable, dropping frame");
            }
        }
    }

    fn broadcast_roster(&self) {
        let roster = PeerMessage::Roster {
            peers: self.lobby.roster(),
        };
        self.broadcast(&roster, None);
    }

    /// Refuse a peer and schedule its disconnect. Queued frames still
    /// flush before the writer closes the socket.
    fn refuse(&mut self, id: PeerId, reason: String) {
        warn!(peer = id.0, %reason, "join refused");
        self.send_to(id, PeerMessage::Refusal { reason });
        self.peers.remove(&id);
    }

    fn drop_peer(&mut self, id: PeerId) {
        self.peers.remove(&id);
        if self.lobby.contains(id) {
            self.lobby.leave(id);
            if self.phase == SessionPhase::Lobby {
                self.broadcast_roster();
            }
        }
    }

    fn handle_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::Inbound(id, message) => self.handle_message(id, message),
            HubEvent::Closed(id) => {
                info!(peer = id.0, "peer disconnected");
                self.drop_peer(id);
            }
        }
    }

    fn handle_message(&mut self, id: PeerId, message: PeerMessage) {
        match message {
            PeerMessage::Join { profile } => self.handle_join(id, profile),
            PeerMessage::Chat { from, text } => {
                if !self.lobby.contains(id) {
                    warn!(peer = id.0, "chat from unseated peer dropped");
                    return;
                }
                info!(%from, %text, "chat");
                self.broadcast(&PeerMessage::Chat { from, text }, Some(id));
            }
            PeerMessage::Action { faction, action } => self.handle_action(id, faction, &action),
            PeerMessage::Leave => {
                info!(peer = id.0, "peer left");
                self.drop_peer(id);
            }
            other => {
                warn!(peer = id.0, message = other.name(), "unexpected message dropped");
            }
        }
    }

    fn handle_join(&mut self, id: PeerId, profile: PeerProfile) {
        if self.phase != SessionPhase::Lobby {
            self.refuse(id, "match already started".to_string());
            return;
        }
        match self.lobby.join(id, profile) {
            Ok(()) => {
                if let Some(handle) = self.peers.get_mut(&id) {
                    handle.joined = true;
                }
                info!(
                    peer = id.0,
                    players = self.lobby.player_count(),
                    "peer joined lobby"
                );
                self.broadcast_roster();
            }
            Err(reason) => self.refuse(id, reason),
        }
    }

    /// Apply a remote action, then relay it verbatim to everyone but
    /// the origin. Anything invalid is logged and dropped; the match
    /// never stops for a bad frame.
    fn handle_action(&mut self, id: PeerId, faction: u8, action: &Action) {
        if self.phase != SessionPhase::Playing {
            warn!(peer = id.0, "action outside match dropped");
            return;
        }
        if self.factions.get(&id) != Some(&faction) {
            warn!(
                peer = id.0,
                faction, "action for an unassigned faction dropped"
            );
            return;
        }
        let Some(sim) = self.sim.as_mut() else {
            return;
        };
        match sim.apply_action(FactionId(faction), action) {
            Ok(_) => {
                debug!(peer = id.0, faction, action = action.name(), "action relayed");
                self.broadcast(
                    &PeerMessage::Action {
                        faction,
                        action: *action,
                    },
                    Some(id),
                );
            }
            Err(err) => {
                warn!(peer = id.0, faction, %err, "invalid remote action dropped");
            }
        }
    }

    fn handle_command(&mut self, command: HostCommand) {
        match command {
            HostCommand::StartMatch => self.start_match(),
            HostCommand::Chat(text) => {
                let message = PeerMessage::Chat {
                    from: self.host_profile.display_name.clone(),
                    text,
                };
                self.broadcast(&message, None);
            }
            HostCommand::Dispatch(action) => self.dispatch_local(&action),
            HostCommand::Shutdown => {}
        }
    }

    fn start_match(&mut self) {
        if self.phase != SessionPhase::Lobby {
            warn!("start ignored: match already started");
            return;
        }
        if self.lobby.player_count() < 2 {
            warn!("start ignored: nobody has joined");
            return;
        }

        let mut layout = self.layout;
        layout.factions = u8::try_from(self.lobby.player_count()).unwrap_or(u8::MAX);
        let sim = ConquestSim::new(&layout);

        for (peer, faction) in self.lobby.assignments() {
            self.factions.insert(peer, faction);
            self.send_to(
                peer,
                PeerMessage::Start {
                    snapshot: sim.snapshot_for(faction),
                },
            );
        }

        info!(
            players = self.lobby.player_count(),
            strongholds = sim.strongholds().len(),
            "match started"
        );
        self.sim = Some(sim);
        self.phase = SessionPhase::Playing;
    }

    /// The host's own dispatches take the same relay path, minus the
    /// faction check: the host is always faction 0.
    fn dispatch_local(&mut self, action: &Action) {
        if self.phase != SessionPhase::Playing {
            warn!("host action outside match dropped");
            return;
        }
        let Some(sim) = self.sim.as_mut() else {
            return;
        };
        match sim.apply_action(FactionId(0), action) {
            Ok(_) => {
                self.broadcast(
                    &PeerMessage::Action {
                        faction: 0,
                        action: *action,
                    },
                    None,
                );
            }
            Err(err) => warn!(%err, "host action rejected"),
        }
    }

    fn on_tick(&mut self) {
        if self.phase != SessionPhase::Playing {
            return;
        }
        let Some(sim) = self.sim.as_mut() else {
            return;
        };
        let events = sim.tick();
        if let Some(winner) = events.winner {
            info!(%winner, tick = sim.view().tick, "match decided");
            self.phase = SessionPhase::Finished;
        }
    }
}

/// A hosted session bound to a listening socket.
pub struct HostSession {
    listener: TcpListener,
    hub: Hub,
    events_tx: mpsc::Sender<HubEvent>,
    events_rx: mpsc::Receiver<HubEvent>,
    commands_rx: mpsc::Receiver<HostCommand>,
    next_peer: u64,
}

impl HostSession {
    /// Bind the host socket and prepare a lobby.
    ///
    /// Pass port 0 in `config` to let the OS pick a free port; read it
    /// back with [`local_addr`](Self::local_addr).
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub async fn bind(
        config: NetConfig,
        host_profile: PeerProfile,
        layout: LayoutConfig,
    ) -> Result<(Self, HostHandle)> {
        let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
        let (events_tx, events_rx) = mpsc::channel(256);
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let session = Self {
            listener,
            hub: Hub::new(&config, host_profile, layout),
            events_tx,
            events_rx,
            commands_rx,
            next_peer: 1,
        };
        let handle = HostHandle {
            commands: commands_tx,
        };
        Ok((session, handle))
    }

    /// The address the host is listening on.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the session until shutdown.
    ///
    /// Accepts connections, pumps peer frames through the hub, and
    /// advances the simulation at the fixed tick rate once the match
    /// starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the accept loop fails irrecoverably.
    pub async fn run(self) -> Result<()> {
        let Self {
            listener,
            mut hub,
            events_tx,
            mut events_rx,
            mut commands_rx,
            mut next_peer,
        } = self;

        let mut ticker = tokio::time::interval(Duration::from_millis(TICK_MS));
        info!(addr = %listener.local_addr()?, "hosting session");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let id = PeerId(next_peer);
                            next_peer += 1;
                            info!(peer = id.0, %addr, "peer connected");
                            let outbound = spawn_peer_tasks(id, stream, events_tx.clone());
                            hub.register_peer(id, outbound);
                        }
                        Err(err) => warn!(%err, "accept failed"),
                    }
                }
                Some(event) = events_rx.recv() => hub.handle_event(event),
                command = commands_rx.recv() => {
                    match command {
                        Some(HostCommand::Shutdown) | None => {
                            info!("host shutting down");
                            return Ok(());
                        }
                        Some(command) => hub.handle_command(command),
                    }
                }
                _ = ticker.tick() => hub.on_tick(),
            }
        }
    }
}

/// Spawn the reader and writer tasks for one connection and hand back
/// the outbound queue.
fn spawn_peer_tasks(
    id: PeerId,
    stream: TcpStream,
    events: mpsc::Sender<HubEvent>,
) -> mpsc::Sender<PeerMessage> {
    let (reader, writer) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
    tokio::spawn(read_peer(id, reader, events));
    tokio::spawn(write_peer(id, writer, outbound_rx));
    outbound_tx
}

/// Pump inbound frames into the hub until the connection dies.
///
/// A malformed payload inside a well-formed frame is dropped and the
/// stream continues; a broken frame boundary cannot be resynchronized,
/// so those close the connection.
async fn read_peer(id: PeerId, mut reader: OwnedReadHalf, events: mpsc::Sender<HubEvent>) {
    loop {
        match wire::read_frame(&mut reader).await {
            Ok(message) => {
                if events.send(HubEvent::Inbound(id, message)).await.is_err() {
                    return;
                }
            }
            Err(NetError::MalformedFrame(err)) => {
                warn!(peer = id.0, %err, "malformed frame dropped");
            }
            Err(err) => {
                if !matches!(err, NetError::Disconnected) {
                    warn!(peer = id.0, %err, "connection error");
                }
                let _ = events.send(HubEvent::Closed(id)).await;
                return;
            }
        }
    }
}

/// Drain a peer's outbound queue, retrying failed sends on a bounded
/// backoff before giving up on the connection.
async fn write_peer(id: PeerId, mut writer: OwnedWriteHalf, mut outbound: mpsc::Receiver<PeerMessage>) {
    let mut backoff = Backoff::default();
    while let Some(message) = outbound.recv().await {
        loop {
            match wire::write_frame(&mut writer, &message).await {
                Ok(()) => {
                    backoff.reset();
                    break;
                }
                Err(err) => match backoff.next_delay() {
                    Some(delay) => {
                        warn!(peer = id.0, %err, "send failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        warn!(peer = id.0, %err, "send retries exhausted, closing");
                        return;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_hub(max_clients: u8) -> Hub {
        let config = NetConfig {
            max_clients,
            ..NetConfig::default()
        };
        Hub::new(
            &config,
            PeerProfile::new("Host", "👑"),
            LayoutConfig::default(),
        )
    }

    /// Register a fake peer and keep the receiving end to observe what
    /// the hub sends it.
    fn attach_peer(hub: &mut Hub, id: u64) -> mpsc::Receiver<PeerMessage> {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        hub.register_peer(PeerId(id), tx);
        rx
    }

    fn join(hub: &mut Hub, id: u64, name: &str) {
        hub.handle_message(
            PeerId(id),
            PeerMessage::Join {
                profile: PeerProfile::new(name, "x"),
            },
        );
    }

    fn drain(rx: &mut mpsc::Receiver<PeerMessage>) -> Vec<PeerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[test]
    fn test_join_broadcasts_roster() {
        let mut hub = test_hub(3);
        let mut rx = attach_peer(&mut hub, 1);
        join(&mut hub, 1, "Wren");

        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        let PeerMessage::Roster { peers } = &messages[0] else {
            panic!("expected roster, got {}", messages[0].name());
        };
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].display_name, "Host");
        assert_eq!(peers[1].display_name, "Wren");
    }

    #[test]
    fn test_capacity_refusal_is_explicit_and_final() {
        let mut hub = test_hub(1);
        let _first = attach_peer(&mut hub, 1);
        join(&mut hub, 1, "first");

        let mut late = attach_peer(&mut hub, 2);
        join(&mut hub, 2, "late");

        let messages = drain(&mut late);
        assert_eq!(messages.len(), 1);
        assert!(matches!(&messages[0], PeerMessage::Refusal { reason } if reason.contains("full")));
        // The refused peer no longer holds a connection handle.
        assert!(!hub.peers.contains_key(&PeerId(2)));
    }

    #[test]
    fn test_start_deals_snapshots_with_distinct_factions() {
        let mut hub = test_hub(3);
        let mut rx_a = attach_peer(&mut hub, 1);
        let mut rx_b = attach_peer(&mut hub, 2);
        join(&mut hub, 1, "a");
        join(&mut hub, 2, "b");
        hub.handle_command(HostCommand::StartMatch);

        let start_a = drain(&mut rx_a)
            .into_iter()
            .find_map(|m| match m {
                PeerMessage::Start { snapshot } => Some(snapshot),
                _ => None,
            })
            .expect("peer a should receive a snapshot");
        let start_b = drain(&mut rx_b)
            .into_iter()
            .find_map(|m| match m {
                PeerMessage::Start { snapshot } => Some(snapshot),
                _ => None,
            })
            .expect("peer b should receive a snapshot");

        assert_eq!(start_a.total_factions, 3);
        assert_eq!(start_b.total_factions, 3);
        assert_eq!(start_a.assigned_faction, 1);
        assert_eq!(start_b.assigned_faction, 2);
        assert_eq!(start_a.strongholds, start_b.strongholds);
        assert_eq!(hub.phase, SessionPhase::Playing);
    }

    #[test]
    fn test_start_without_peers_is_ignored() {
        let mut hub = test_hub(3);
        hub.handle_command(HostCommand::StartMatch);
        assert_eq!(hub.phase, SessionPhase::Lobby);
        assert!(hub.sim.is_none());
    }

    #[test]
    fn test_valid_action_applies_and_relays_excluding_origin() {
        let mut hub = test_hub(3);
        let mut rx_a = attach_peer(&mut hub, 1);
        let mut rx_b = attach_peer(&mut hub, 2);
        join(&mut hub, 1, "a");
        join(&mut hub, 2, "b");
        hub.handle_command(HostCommand::StartMatch);
        drain(&mut rx_a);
        drain(&mut rx_b);

        let action = Action::SendUnits {
            source: 1,
            target: 0,
            percentage: 50,
            seed: 7,
        };
        hub.handle_message(PeerId(1), PeerMessage::Action { faction: 1, action });

        assert_eq!(hub.sim.as_ref().unwrap().view().detachments.len(), 1);
        assert!(drain(&mut rx_a).is_empty(), "origin must not get an echo");
        let relayed = drain(&mut rx_b);
        assert_eq!(relayed.len(), 1);
        assert_eq!(
            relayed[0],
            PeerMessage::Action { faction: 1, action }
        );
    }

    #[test]
    fn test_action_for_unassigned_faction_dropped() {
        let mut hub = test_hub(3);
        let mut rx_a = attach_peer(&mut hub, 1);
        let mut rx_b = attach_peer(&mut hub, 2);
        join(&mut hub, 1, "a");
        join(&mut hub, 2, "b");
        hub.handle_command(HostCommand::StartMatch);
        drain(&mut rx_a);
        drain(&mut rx_b);

        // Peer 1 is faction 1 but claims to be faction 2.
        let action = Action::SendUnits {
            source: 2,
            target: 0,
            percentage: 50,
            seed: 7,
        };
        hub.handle_message(PeerId(1), PeerMessage::Action { faction: 2, action });

        assert!(hub.sim.as_ref().unwrap().view().detachments.is_empty());
        assert!(drain(&mut rx_b).is_empty());
    }

    #[test]
    fn test_out_of_range_action_dropped_not_relayed() {
        let mut hub = test_hub(3);
        let _rx_a = attach_peer(&mut hub, 1);
        let mut rx_b = attach_peer(&mut hub, 2);
        join(&mut hub, 1, "a");
        join(&mut hub, 2, "b");
        hub.handle_command(HostCommand::StartMatch);
        drain(&mut rx_b);

        let action = Action::SendUnits {
            source: 999,
            target: 0,
            percentage: 50,
            seed: 7,
        };
        hub.handle_message(PeerId(1), PeerMessage::Action { faction: 1, action });

        assert!(hub.sim.as_ref().unwrap().view().detachments.is_empty());
        assert!(drain(&mut rx_b).is_empty());
    }

    #[test]
    fn test_host_dispatch_relays_to_everyone() {
        let mut hub = test_hub(3);
        let mut rx_a = attach_peer(&mut hub, 1);
        join(&mut hub, 1, "a");
        hub.handle_command(HostCommand::StartMatch);
        drain(&mut rx_a);

        let action = Action::SendUnits {
            source: 0,
            target: 1,
            percentage: 40,
            seed: 3,
        };
        hub.handle_command(HostCommand::Dispatch(action));

        let messages = drain(&mut rx_a);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0], PeerMessage::Action { faction: 0, action });
    }

    #[test]
    fn test_leave_in_lobby_updates_roster() {
        let mut hub = test_hub(3);
        let _rx_a = attach_peer(&mut hub, 1);
        let mut rx_b = attach_peer(&mut hub, 2);
        join(&mut hub, 1, "a");
        join(&mut hub, 2, "b");
        drain(&mut rx_b);

        hub.handle_message(PeerId(1), PeerMessage::Leave);

        let messages = drain(&mut rx_b);
        assert_eq!(messages.len(), 1);
        let PeerMessage::Roster { peers } = &messages[0] else {
            panic!("expected roster");
        };
        assert_eq!(peers.len(), 2);
    }

    #[test]
    fn test_join_after_start_refused() {
        let mut hub = test_hub(3);
        let _rx_a = attach_peer(&mut hub, 1);
        join(&mut hub, 1, "a");
        hub.handle_command(HostCommand::StartMatch);

        let mut late = attach_peer(&mut hub, 9);
        join(&mut hub, 9, "late");
        let messages = drain(&mut late);
        assert!(
            matches!(&messages[0], PeerMessage::Refusal { reason } if reason.contains("started"))
        );
    }

    #[test]
    fn test_action_before_start_dropped() {
        let mut hub = test_hub(3);
        let mut rx_a = attach_peer(&mut hub, 1);
        join(&mut hub, 1, "a");
        drain(&mut rx_a);

        let action = Action::SendUnits {
            source: 0,
            target: 1,
            percentage: 10,
            seed: 1,
        };
        hub.handle_message(PeerId(1), PeerMessage::Action { faction: 1, action });
        assert!(hub.sim.is_none());
        assert!(drain(&mut rx_a).is_empty());
    }
}
