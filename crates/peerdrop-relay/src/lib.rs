// Rendezvous through the room-keyed relay store.

pub mod cancel;
pub mod client;
pub mod error;
pub mod memory;
pub mod poll;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use client::{decode_description, HttpRelayClient, RelayClient};
pub use error::{PollError, RelayError};
pub use memory::MemoryRelay;
pub use poll::{allocate_room, poll_until, PollPolicy};
