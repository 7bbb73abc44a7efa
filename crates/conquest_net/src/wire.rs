//! Framed wire protocol.
//!
//! Every message travels as one frame: a little-endian `u32` payload
//! length followed by that many bytes of bincode. Frames above
//! [`MAX_FRAME_BYTES`] are rejected on both ends, so a corrupt length
//! header cannot make a peer allocate unbounded memory.

use conquest_core::action::Action;
use conquest_core::snapshot::MatchSnapshot;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{NetError, Result};

/// Maximum payload size of a single frame.
///
/// A match-start snapshot for a full board is a few kilobytes; this
/// leaves two orders of magnitude of headroom.
pub const MAX_FRAME_BYTES: u32 = 256 * 1024;

/// Identity a peer presents when joining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerProfile {
    /// Name shown in the lobby roster.
    pub display_name: String,
    /// Single-glyph avatar shown beside the name.
    pub avatar_glyph: String,
}

impl PeerProfile {
    /// Build a profile from name and glyph.
    #[must_use]
    pub fn new(display_name: impl Into<String>, avatar_glyph: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            avatar_glyph: avatar_glyph.into(),
        }
    }
}

/// Everything that crosses the wire between peers.
///
/// The host fan-outs `Roster`, `Chat`, `Start`, and `Action`; clients
/// send `Join`, `Chat`, `Action`, and `Leave`. After `Start`, the only
/// recurring traffic is `Action` frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PeerMessage {
    /// A peer asks to join the lobby.
    Join {
        /// The joiner's identity.
        profile: PeerProfile,
    },
    /// The host turned the join down. Final; the peer should not retry.
    Refusal {
        /// Human-readable reason, e.g. the lobby is full.
        reason: String,
    },
    /// Current lobby membership, host first.
    Roster {
        /// All connected peers in seat order.
        peers: Vec<PeerProfile>,
    },
    /// Lobby chat line.
    Chat {
        /// Display name of the sender.
        from: String,
        /// Message body.
        text: String,
    },
    /// Match start: the one full-state transfer of the session.
    Start {
        /// Complete board state plus the recipient's faction assignment.
        snapshot: MatchSnapshot,
    },
    /// A dispatch command from one peer, relayed to all others.
    Action {
        /// Faction that issued the action.
        faction: u8,
        /// The action itself, applied verbatim by every receiver.
        action: Action,
    },
    /// The peer is leaving the session.
    Leave,
}

impl PeerMessage {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Refusal { .. } => "refusal",
            Self::Roster { .. } => "roster",
            Self::Chat { .. } => "chat",
            Self::Start { .. } => "start",
            Self::Action { .. } => "action",
            Self::Leave => "leave",
        }
    }
}

/// Encode a message into a frame payload (length prefix not included).
///
/// # Errors
///
/// Returns an error if the message does not fit in one frame.
pub fn encode(message: &PeerMessage) -> Result<Vec<u8>> {
    let payload = bincode::serialize(message)
        .map_err(|e| NetError::MalformedFrame(format!("encode failed: {e}")))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| NetError::FrameTooLarge {
            len: u32::MAX,
            max: MAX_FRAME_BYTES,
        })?;
    if len > MAX_FRAME_BYTES {
        return Err(NetError::FrameTooLarge {
            len,
            max: MAX_FRAME_BYTES,
        });
    }
    Ok(payload)
}

/// Decode one frame payload.
///
/// # Errors
///
/// Returns an error if the payload is not a valid message.
pub fn decode(payload: &[u8]) -> Result<PeerMessage> {
    bincode::deserialize(payload).map_err(|e| NetError::MalformedFrame(format!("decode failed: {e}")))
}

/// Write one framed message.
///
/// # Errors
///
/// Returns an error if the message is oversized or the write fails.
pub async fn write_frame<W>(writer: &mut W, message: &PeerMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = encode(message)?;
    // encode bounds the length at MAX_FRAME_BYTES
    #[allow(clippy::cast_possible_truncation)]
    let len = payload.len() as u32;
    writer.write_u32_le(len).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message.
///
/// # Errors
///
/// Returns [`NetError::Disconnected`] on a clean close at a frame
/// boundary, and decoding or size errors for bad frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<PeerMessage>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32_le().await {
        Ok(len) => len,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(NetError::Disconnected);
        }
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_BYTES {
        return Err(NetError::FrameTooLarge {
            len,
            max: MAX_FRAME_BYTES,
        });
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    decode(&payload)
}
