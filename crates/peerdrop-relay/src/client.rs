//! Relay client: one slot per room, written with PUT and read with GET.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use peerdrop_shared::constants::RELAY_API_PREFIX;
use peerdrop_shared::{RoomId, SessionDescription};
use reqwest::StatusCode;
use tracing::debug;

use crate::error::RelayError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Room-keyed description store as seen by a peer.
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Store (or overwrite) the room slot. No retry at this layer.
    async fn publish(&self, room: RoomId, description: &SessionDescription)
        -> Result<(), RelayError>;

    /// Read the room slot.
    async fn fetch(&self, room: RoomId) -> Result<SessionDescription, RelayError>;
}

#[async_trait]
impl<T: RelayClient + ?Sized> RelayClient for Arc<T> {
    async fn publish(
        &self,
        room: RoomId,
        description: &SessionDescription,
    ) -> Result<(), RelayError> {
        (**self).publish(room, description).await
    }

    async fn fetch(&self, room: RoomId) -> Result<SessionDescription, RelayError> {
        (**self).fetch(room).await
    }
}

/// Talks to a relay over HTTP at `{base}/api/{room}`.
#[derive(Debug, Clone)]
pub struct HttpRelayClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRelayClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn room_url(&self, room: RoomId) -> String {
        format!(
            "{}{}/{}",
            self.base_url.trim_end_matches('/'),
            RELAY_API_PREFIX,
            room
        )
    }
}

#[async_trait]
impl RelayClient for HttpRelayClient {
    async fn publish(
        &self,
        room: RoomId,
        description: &SessionDescription,
    ) -> Result<(), RelayError> {
        let url = self.room_url(room);
        debug!(room = %room, kind = %description.kind, "PUT session description");

        let response = self.http.put(&url).json(description).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Status {
                room,
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    async fn fetch(&self, room: RoomId) -> Result<SessionDescription, RelayError> {
        let url = self.room_url(room);
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RelayError::NotFound(room));
        }
        if !status.is_success() {
            return Err(RelayError::Status {
                room,
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        decode_description(&body)
    }
}

/// Decode a GET body.
///
/// The relay answers with a JSON string whose content is the stored JSON
/// description. A plain object body is accepted as well.
pub fn decode_description(body: &str) -> Result<SessionDescription, RelayError> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    let description = match value {
        serde_json::Value::String(inner) => serde_json::from_str(&inner)?,
        other => serde_json::from_value(other)?,
    };
    Ok(description)
}
