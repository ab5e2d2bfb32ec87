// Shared vocabulary of the rendezvous handshake and the transfer protocol.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use protocol::{
    classify, decode_meta, encode_candidate, encode_meta, split_chunks, ChannelMessage, Frame,
};
pub use types::{FileMeta, IceCandidate, RoomId, SdpType, SessionDescription};
