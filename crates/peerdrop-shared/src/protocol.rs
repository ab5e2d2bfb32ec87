//! In-band framing shared by the sender and receiver state machines.
//!
//! The data channel carries two kinds of frames: text and binary. Text frames
//! are the literal `ACK`, an ICE candidate wrapped as `{"ice": {...}}`, or a
//! JSON [`FileMeta`]. Binary frames are raw chunk bytes with no header; the
//! preceding `FileMeta.size` is the only completion signal.

use bytes::Bytes;
use serde::Serialize;

use crate::constants::ACK;
use crate::error::ProtocolError;
use crate::types::{FileMeta, IceCandidate};

/// A single message as the channel transport sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A classified channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    /// Late ICE candidate trickled over the open channel
    Candidate(IceCandidate),
    /// Preamble of the next file
    Meta(FileMeta),
    /// Slice of the current file
    Chunk(Bytes),
    /// Receiver acknowledged one chunk
    Ack,
}

impl ChannelMessage {
    pub fn into_frame(self) -> Frame {
        match self {
            ChannelMessage::Candidate(ice) => Frame::Text(encode_candidate(&ice)),
            ChannelMessage::Meta(meta) => Frame::Text(encode_meta(&meta)),
            ChannelMessage::Chunk(data) => Frame::Binary(data),
            ChannelMessage::Ack => Frame::Text(ACK.to_string()),
        }
    }
}

#[derive(Serialize)]
struct CandidateEnvelope<'a> {
    ice: &'a IceCandidate,
}

pub fn encode_meta(meta: &FileMeta) -> String {
    // Serializing a struct of strings and integers cannot fail
    serde_json::to_string(meta).unwrap_or_default()
}

pub fn decode_meta(text: &str) -> Result<FileMeta, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::MalformedMeta(e.to_string()))
}

pub fn encode_candidate(candidate: &IceCandidate) -> String {
    serde_json::to_string(&CandidateEnvelope { ice: candidate }).unwrap_or_default()
}

/// Decide what a frame is.
///
/// Binary frames are always chunks. Text frames are checked for the ACK
/// literal, then for a candidate (either the `ice` wrapper or a top-level
/// `candidate` string), and only then parsed as file metadata, so a
/// candidate can never be taken for a `FileMeta`.
pub fn classify(frame: Frame) -> Result<ChannelMessage, ProtocolError> {
    let text = match frame {
        Frame::Binary(data) => return Ok(ChannelMessage::Chunk(data)),
        Frame::Text(text) => text,
    };

    if text.trim() == ACK {
        return Ok(ChannelMessage::Ack);
    }

    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| ProtocolError::MalformedMeta(e.to_string()))?;

    let serde_json::Value::Object(mut fields) = value else {
        return Err(ProtocolError::MalformedMeta(format!(
            "expected a JSON object, got '{}'",
            truncate(&text)
        )));
    };

    if let Some(ice) = fields.remove("ice") {
        return serde_json::from_value(ice)
            .map(ChannelMessage::Candidate)
            .map_err(|e| ProtocolError::MalformedCandidate(e.to_string()));
    }

    if matches!(fields.get("candidate"), Some(serde_json::Value::String(_))) {
        return serde_json::from_value(serde_json::Value::Object(fields))
            .map(ChannelMessage::Candidate)
            .map_err(|e| ProtocolError::MalformedCandidate(e.to_string()));
    }

    serde_json::from_value(serde_json::Value::Object(fields))
        .map(ChannelMessage::Meta)
        .map_err(|e| ProtocolError::MalformedMeta(e.to_string()))
}

/// `(offset, len)` of every chunk of a file of `len` bytes.
///
/// All chunks are `chunk_size` long except possibly the last one. An empty
/// file has no chunks.
pub fn split_chunks(len: u64, chunk_size: usize) -> impl Iterator<Item = (u64, usize)> {
    let step = chunk_size.max(1) as u64;
    (0..len).step_by(step as usize).map(move |offset| {
        let remaining = len - offset;
        (offset, remaining.min(step) as usize)
    })
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(32) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
