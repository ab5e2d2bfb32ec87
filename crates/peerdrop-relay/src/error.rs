use peerdrop_shared::RoomId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Room {0} not found at relay")]
    NotFound(RoomId),

    #[error("Relay answered HTTP {status} for room {room}")]
    Status { room: RoomId, status: u16 },

    #[error("Relay request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Could not decode relay response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("No free room found after {0} attempts")]
    RoomsExhausted(u32),
}

impl RelayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RelayError::NotFound(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("Room {room} timed out after {attempts} attempts")]
    TimedOut { room: RoomId, attempts: u32 },

    #[error("Polling cancelled")]
    Cancelled,
}
