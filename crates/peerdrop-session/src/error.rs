use std::time::Duration;

use peerdrop_relay::{PollError, RelayError};
use peerdrop_shared::{ProtocolError, RoomId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("Data channel is not open")]
    NotOpen,

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Transport closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("Room {room} timed out after {attempts} attempts")]
    RoomTimedOut { room: RoomId, attempts: u32 },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Channel closed by peer")]
    ChannelClosed,

    #[error("Channel closed in the middle of '{name}' ({received}/{expected} bytes)")]
    Truncated {
        name: String,
        received: u64,
        expected: u64,
    },

    #[error("No ACK from receiver within {0:?}")]
    AckTimeout(Duration),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Session cancelled")]
    Cancelled,

    #[error("File read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PollError> for SessionError {
    fn from(e: PollError) -> Self {
        match e {
            PollError::TimedOut { room, attempts } => SessionError::RoomTimedOut { room, attempts },
            PollError::Cancelled => SessionError::Cancelled,
        }
    }
}

impl SessionError {
    pub fn reason(&self) -> FailureReason {
        match self {
            SessionError::Relay(e) => FailureReason::RelayError(e.to_string()),
            SessionError::RoomTimedOut { .. } => FailureReason::RoomTimedOut,
            SessionError::Transport(_)
            | SessionError::ChannelClosed
            | SessionError::Truncated { .. }
            | SessionError::AckTimeout(_) => FailureReason::ChannelError(self.to_string()),
            SessionError::Protocol(e) => FailureReason::ProtocolError(e.to_string()),
            SessionError::Cancelled => FailureReason::Cancelled,
            SessionError::Io(e) => FailureReason::Io(e.to_string()),
        }
    }
}

/// Why a session ended in `Failed`. Every variant reads as a message a user
/// can act on; none of them is retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    #[error("Relay error: {0}")]
    RelayError(String),

    #[error("Room timed out (receiver didn't join). Please try again.")]
    RoomTimedOut,

    #[error("Connection error: {0}")]
    ChannelError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Session cancelled")]
    Cancelled,

    #[error("Could not read file: {0}")]
    Io(String),
}
