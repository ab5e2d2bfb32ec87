use bytes::Bytes;
use peerdrop_shared::{FileMeta, RoomId};

/// A file fully reassembled by the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub meta: FileMeta,
    pub data: Bytes,
}

/// Progress notifications a session pushes to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Sender: the offer is stored under this room
    RoomAllocated(RoomId),
    /// The data channel is open
    Connected,
    FileStarted { index: usize, meta: FileMeta },
    /// Bytes queued (sender) or received (receiver) for the current file
    Progress { index: usize, bytes: u64, total: u64 },
    FileSent { index: usize, meta: FileMeta },
    FileReceived { index: usize, file: ReceivedFile },
}
