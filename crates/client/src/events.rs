//! Connection state and the events surfaced to listeners.

use std::fmt;

use roomlink_core::room::RoomId;
use roomlink_core::types::Generation;

/// Lifecycle state of a [`RoomConnectionManager`](crate::manager::RoomConnectionManager).
///
/// `Closed` is transient: it is published when a channel ends and is
/// immediately followed by `Idle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel and no current room.
    Idle,
    /// A channel to the current room is being opened.
    Connecting,
    /// The channel is open; `send` is accepted.
    Open,
    /// A requested close is in progress.
    Closing,
    /// The channel ended.
    Closed(CloseReason),
}

impl ConnectionState {
    /// Whether a current room is associated with this state.
    pub fn has_room(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open | Self::Closing)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connecting => f.write_str("connecting"),
            Self::Open => f.write_str("open"),
            Self::Closing => f.write_str("closing"),
            Self::Closed(reason) => write!(f, "closed ({reason})"),
        }
    }
}

/// Why a channel ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The caller asked for the close via `disconnect`.
    Requested,
    /// The remote peer closed the channel.
    Remote,
    /// The transport failed.
    Error(String),
}

impl CloseReason {
    /// Closes the caller did not ask for. Retry policies key off this.
    pub fn is_unexpected(&self) -> bool {
        !matches!(self, Self::Requested)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("requested"),
            Self::Remote => f.write_str("closed by peer"),
            Self::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

/// Asynchronous failures delivered through the `on_error` listener.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    /// Channel-level failure (refused, reset, network loss). Always
    /// followed by a close.
    #[error("Transport error: {0}")]
    Transport(String),

    /// An inbound frame could not be parsed. The channel stays open.
    #[error("Failed to parse inbound payload: {error}")]
    PayloadParse { error: String, raw: String },
}

/// Snapshot of a manager's observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: ConnectionState,
    pub room: Option<RoomId>,
    pub generation: Generation,
}
