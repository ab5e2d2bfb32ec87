use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{ROOM_ID_MAX, ROOM_ID_MIN};
use crate::error::ProtocolError;

// Rendezvous key at the relay: a 9 or 10 digit positive integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct RoomId(u64);

impl RoomId {
    pub fn new(value: u64) -> Result<Self, ProtocolError> {
        if (ROOM_ID_MIN..=ROOM_ID_MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ProtocolError::InvalidRoom(value.to_string()))
        }
    }

    /// Pick a pseudo-random id. Uniqueness is not guaranteed; callers that
    /// care check the relay first.
    pub fn random() -> Self {
        Self(rand::thread_rng().gen_range(ROOM_ID_MIN..=ROOM_ID_MAX))
    }

    /// Accept either a bare id or an invitation link whose last path
    /// segment is the id (`https://host/receive/1234567890`).
    pub fn from_link(input: &str) -> Result<Self, ProtocolError> {
        let trimmed = input.trim().trim_end_matches('/');
        if let Ok(room) = trimmed.parse() {
            return Ok(room);
        }
        trimmed
            .rsplit('/')
            .next()
            .ok_or_else(|| ProtocolError::InvalidRoom(input.to_string()))?
            .parse()
            .map_err(|_| ProtocolError::InvalidRoom(input.to_string()))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RoomId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<u64>()
            .map_err(|_| ProtocolError::InvalidRoom(s.to_string()))?;
        Self::new(value)
    }
}

impl TryFrom<u64> for RoomId {
    type Error = ProtocolError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoomId> for u64 {
    fn from(room: RoomId) -> Self {
        room.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
            SdpType::Pranswer => "pranswer",
            SdpType::Rollback => "rollback",
        };
        f.write_str(s)
    }
}

/// Offer or answer exchanged through the relay.
///
/// Only the `type` tag is interpreted here; the SDP body belongs to the
/// transport. Extra fields some relays merge into the stored value are kept
/// so a description survives a publish/fetch cycle unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    #[serde(default)]
    pub sdp: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn is_offer(&self) -> bool {
        self.kind == SdpType::Offer
    }

    pub fn is_answer(&self) -> bool {
        self.kind == SdpType::Answer
    }
}

/// Preamble describing the file whose bytes follow on the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub name: String,
    pub size: u64,
    /// Milliseconds since the Unix epoch
    #[serde(default, alias = "lastModified")]
    pub last_modified: i64,
}

impl FileMeta {
    pub fn new(name: impl Into<String>, size: u64, last_modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            size,
            last_modified: last_modified.timestamp_millis(),
        }
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.last_modified)
    }
}

/// ICE candidate in the browser's JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment", default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_bounds() {
        assert!(RoomId::new(99_999_999).is_err());
        assert!(RoomId::new(100_000_000).is_ok());
        assert!(RoomId::new(9_999_999_999).is_ok());
        assert!(RoomId::new(10_000_000_000).is_err());
    }

    #[test]
    fn test_random_room_in_range() {
        for _ in 0..100 {
            let room = RoomId::random();
            assert!((ROOM_ID_MIN..=ROOM_ID_MAX).contains(&room.value()));
        }
    }

    #[test]
    fn test_room_from_link() {
        let room = RoomId::from_link("https://example.com/receive/1234567890").unwrap();
        assert_eq!(room.value(), 1_234_567_890);
        assert_eq!(RoomId::from_link(" 123456789 ").unwrap().value(), 123_456_789);
        assert!(RoomId::from_link("https://example.com/receive/").is_err());
        assert!(RoomId::from_link("not-a-room").is_err());
    }

    #[test]
    fn test_description_keeps_extra_fields() {
        let json = r#"{"type":"offer","sdp":"v=0","name":"a.txt","size":10}"#;
        let desc: SessionDescription = serde_json::from_str(json).unwrap();
        assert!(desc.is_offer());
        assert_eq!(desc.extra.get("size"), Some(&serde_json::json!(10)));

        let back: serde_json::Value = serde_json::to_value(&desc).unwrap();
        assert_eq!(back["name"], "a.txt");
        assert_eq!(back["type"], "offer");
    }

    #[test]
    fn test_file_meta_accepts_camel_case_timestamp() {
        let meta: FileMeta =
            serde_json::from_str(r#"{"name":"a","size":3,"lastModified":1700000000000}"#).unwrap();
        assert_eq!(meta.last_modified, 1_700_000_000_000);
        assert!(meta.modified_at().is_some());
    }

    #[test]
    fn test_candidate_field_names() {
        let cand = IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        };
        let json = serde_json::to_value(&cand).unwrap();
        assert_eq!(json["sdpMLineIndex"], 0);
        assert_eq!(json["sdpMid"], "0");
        assert!(json.get("usernameFragment").is_none());
    }
}
