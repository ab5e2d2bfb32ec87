use thiserror::Error;

/// A frame on the data channel that does not fit the transfer protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed file metadata: {0}")]
    MalformedMeta(String),

    #[error("Malformed ICE candidate: {0}")]
    MalformedCandidate(String),

    #[error("Chunk of {0} bytes arrived before any file metadata")]
    ChunkWithoutMeta(usize),

    #[error("File '{name}' overflows: {received} bytes received, {expected} expected")]
    Overflow {
        name: String,
        received: u64,
        expected: u64,
    },

    #[error("Metadata for '{next}' arrived while '{current}' was incomplete ({received}/{expected} bytes)")]
    InterruptedFile {
        current: String,
        next: String,
        received: u64,
        expected: u64,
    },

    #[error("Unexpected ACK: no chunk awaiting acknowledgment")]
    UnexpectedAck,

    #[error("Unexpected {0} frame")]
    UnexpectedMessage(&'static str),

    #[error("Invalid room id: {0}")]
    InvalidRoom(String),

    #[error("Unexpected session description: expected {expected}, got {got}")]
    UnexpectedDescription { expected: String, got: String },
}
