//! Client side of a hosted session.
//!
//! A client dials the host, sends one join request, and is either
//! seated (first reply is a roster) or refused (first reply is a
//! refusal, which is final). After that the stream carries roster
//! updates and chat until the start message arrives with the match
//! snapshot, and only relayed actions after it.
//!
//! Connection failures never panic the session layer: dials retry on a
//! bounded backoff, and a dead stream surfaces as a status the front
//! end can print.

use std::fmt;

use conquest_core::action::Action;
use conquest_core::snapshot::MatchSnapshot;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{info, warn};

use crate::backoff::Backoff;
use crate::error::{NetError, Result};
use crate::wire::{self, PeerMessage, PeerProfile};

/// Where the connection currently stands, as shown to the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Dialing the host.
    Connecting,
    /// Seated in the lobby, waiting for the host to start.
    InLobby,
    /// The match is running.
    Playing,
    /// The host refused the join. Final; no retry.
    Refused(String),
    /// The connection died after it was established.
    Lost(String),
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::InLobby => write!(f, "in lobby"),
            Self::Playing => write!(f, "in match"),
            Self::Refused(reason) => write!(f, "refused: {reason}"),
            Self::Lost(reason) => write!(f, "connection lost: {reason}"),
        }
    }
}

/// Something the host sent that the session layer should act on.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Lobby membership changed. Host first.
    Roster(Vec<PeerProfile>),
    /// Somebody said something.
    Chat {
        /// Display name of the sender.
        from: String,
        /// What they said.
        text: String,
    },
    /// The match started; build a simulation from this snapshot.
    Start(MatchSnapshot),
    /// A relayed action from another peer. Apply it verbatim.
    Action {
        /// Issuing faction.
        faction: u8,
        /// The dispatch itself.
        action: Action,
    },
}

/// A connected, seated client.
#[derive(Debug)]
pub struct ClientSession {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    profile: PeerProfile,
    status: ConnectionStatus,
}

impl ClientSession {
    /// Dial the host and join its lobby.
    ///
    /// Dial failures retry on a bounded backoff before giving up. A
    /// refusal from the host does not retry; the lobby said no.
    ///
    /// Returns the session and the roster at the moment of joining.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::RetriesExhausted`] when the host cannot be
    /// reached, [`NetError::Refused`] when it can but says no.
    pub async fn connect<A>(addr: A, profile: PeerProfile) -> Result<(Self, Vec<PeerProfile>)>
    where
        A: ToSocketAddrs + Clone + Send,
    {
        let stream = connect_with_retry(addr).await?;
        let (reader, writer) = stream.into_split();
        let mut session = Self {
            reader,
            writer,
            profile: profile.clone(),
            status: ConnectionStatus::Connecting,
        };
        session.send(&PeerMessage::Join { profile }).await?;

        // The first reply decides: seated or refused.
        match wire::read_frame(&mut session.reader).await? {
            PeerMessage::Roster { peers } => {
                info!(players = peers.len(), "joined lobby");
                session.status = ConnectionStatus::InLobby;
                Ok((session, peers))
            }
            PeerMessage::Refusal { reason } => Err(NetError::Refused(reason)),
            other => Err(NetError::UnexpectedMessage(other.name().to_string())),
        }
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    /// Wait for the next event from the host.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Disconnected`] when the stream closes; the
    /// status switches to [`ConnectionStatus::Lost`].
    pub async fn next_event(&mut self) -> Result<ClientEvent> {
        let event = read_event(&mut self.reader).await;
        match &event {
            Ok(ClientEvent::Start(_)) => self.status = ConnectionStatus::Playing,
            Err(NetError::Refused(reason)) => {
                self.status = ConnectionStatus::Refused(reason.clone());
            }
            Err(err) => self.status = ConnectionStatus::Lost(err.to_string()),
            Ok(_) => {}
        }
        event
    }

    /// Send one of our own dispatches to the host for relay.
    ///
    /// # Errors
    ///
    /// Returns an error when the send fails after bounded retries.
    pub async fn send_action(&mut self, faction: u8, action: Action) -> Result<()> {
        self.send(&PeerMessage::Action { faction, action }).await
    }

    /// Say something to the lobby.
    ///
    /// # Errors
    ///
    /// Returns an error when the send fails after bounded retries.
    pub async fn send_chat(&mut self, text: impl Into<String>) -> Result<()> {
        let message = PeerMessage::Chat {
            from: self.profile.display_name.clone(),
            text: text.into(),
        };
        self.send(&message).await
    }

    /// Tell the host we are leaving, then drop the connection.
    ///
    /// # Errors
    ///
    /// Returns an error when the farewell cannot be sent; the
    /// connection closes either way.
    pub async fn leave(mut self) -> Result<()> {
        self.send(&PeerMessage::Leave).await
    }

    /// Split into independent read and write halves so a driver can
    /// pump inbound events and outbound actions concurrently.
    #[must_use]
    pub fn split(self) -> (ClientReader, ClientWriter) {
        (
            ClientReader {
                reader: self.reader,
            },
            ClientWriter {
                writer: self.writer,
                name: self.profile.display_name,
            },
        )
    }

    async fn send(&mut self, message: &PeerMessage) -> Result<()> {
        send_with_retry(&mut self.writer, message).await
    }
}

/// Inbound half of a split session.
pub struct ClientReader {
    reader: OwnedReadHalf,
}

impl ClientReader {
    /// Wait for the next event from the host.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Disconnected`] when the stream closes.
    pub async fn next_event(&mut self) -> Result<ClientEvent> {
        read_event(&mut self.reader).await
    }
}

/// Outbound half of a split session.
pub struct ClientWriter {
    writer: OwnedWriteHalf,
    name: String,
}

impl ClientWriter {
    /// Send one of our own dispatches to the host for relay.
    ///
    /// # Errors
    ///
    /// Returns an error when the send fails after bounded retries.
    pub async fn send_action(&mut self, faction: u8, action: Action) -> Result<()> {
        send_with_retry(&mut self.writer, &PeerMessage::Action { faction, action }).await
    }

    /// Say something to the lobby.
    ///
    /// # Errors
    ///
    /// Returns an error when the send fails after bounded retries.
    pub async fn send_chat(&mut self, text: impl Into<String>) -> Result<()> {
        let message = PeerMessage::Chat {
            from: self.name.clone(),
            text: text.into(),
        };
        send_with_retry(&mut self.writer, &message).await
    }

    /// Tell the host we are leaving, then drop the connection.
    ///
    /// # Errors
    ///
    /// Returns an error when the farewell cannot be sent; the
    /// connection closes either way.
    pub async fn leave(mut self) -> Result<()> {
        send_with_retry(&mut self.writer, &PeerMessage::Leave).await
    }
}

async fn connect_with_retry<A>(addr: A) -> Result<TcpStream>
where
    A: ToSocketAddrs + Clone + Send,
{
    let mut backoff = Backoff::default();
    loop {
        match TcpStream::connect(addr.clone()).await {
            Ok(stream) => return Ok(stream),
            Err(err) => match backoff.next_delay() {
                Some(delay) => {
                    warn!(%err, attempt = backoff.attempts(), "dial failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(NetError::RetriesExhausted {
                        attempts: backoff.attempts(),
                        reason: err.to_string(),
                    });
                }
            },
        }
    }
}

/// Read frames until one maps to a [`ClientEvent`].
///
/// Malformed payloads inside well-formed frames are dropped; messages
/// a host never legitimately sends are logged and skipped.
async fn read_event<R>(reader: &mut R) -> Result<ClientEvent>
where
    R: AsyncRead + Unpin,
{
    loop {
        match wire::read_frame(reader).await {
            Ok(PeerMessage::Roster { peers }) => return Ok(ClientEvent::Roster(peers)),
            Ok(PeerMessage::Chat { from, text }) => return Ok(ClientEvent::Chat { from, text }),
            Ok(PeerMessage::Start { snapshot }) => return Ok(ClientEvent::Start(snapshot)),
            Ok(PeerMessage::Action { faction, action }) => {
                return Ok(ClientEvent::Action { faction, action })
            }
            Ok(PeerMessage::Refusal { reason }) => return Err(NetError::Refused(reason)),
            Ok(other) => warn!(message = other.name(), "unexpected message ignored"),
            Err(NetError::MalformedFrame(err)) => warn!(%err, "malformed frame dropped"),
            Err(err) => return Err(err),
        }
    }
}

async fn send_with_retry<W>(writer: &mut W, message: &PeerMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut backoff = Backoff::default();
    loop {
        match wire::write_frame(writer, message).await {
            Ok(()) => return Ok(()),
            Err(err) => match backoff.next_delay() {
                Some(delay) => {
                    warn!(%err, "send failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(NetError::RetriesExhausted {
                        attempts: backoff.attempts(),
                        reason: err.to_string(),
                    });
                }
            },
        }
    }
}
