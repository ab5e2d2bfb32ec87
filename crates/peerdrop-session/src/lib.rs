//! # peerdrop-session
//!
//! Sender and receiver state machines of a peer-to-peer file drop.
//!
//! A session rendezvous through the relay (offer, then answer, keyed by a
//! room id), waits for the data channel to open, then streams files as one
//! JSON metadata frame followed by binary chunks. The channel itself is
//! abstracted by [`PeerTransport`]; [`WebRtcTransport`] drives a real
//! WebRTC data channel and [`LoopbackTransport`] links two sessions in
//! memory.

pub mod accumulator;
pub mod config;
pub mod error;
pub mod events;
pub mod loopback;
pub mod receiver;
pub mod rtc;
pub mod sender;
pub mod source;
pub mod transport;

mod flow;

pub use accumulator::TransferAccumulator;
pub use config::{FlowControl, SessionConfig};
pub use error::{FailureReason, SessionError, TransportError};
pub use events::{ReceivedFile, SessionEvent};
pub use loopback::LoopbackTransport;
pub use receiver::{ReceiverHandle, ReceiverSession, ReceiverState};
pub use rtc::{WebRtcConfig, WebRtcTransport};
pub use sender::{SenderHandle, SenderSession, SenderState};
pub use source::{FileSource, OutgoingFile};
pub use transport::{PeerTransport, TransportEvent};
