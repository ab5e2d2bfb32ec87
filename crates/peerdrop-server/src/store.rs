//! In-memory room slots with expiry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use peerdrop_shared::RoomId;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::ServerError;

#[derive(Debug)]
struct Slot {
    body: String,
    written_at: Instant,
}

/// One JSON document per room. A write replaces the document and restarts
/// its time-to-live; expired slots read as missing even before a purge.
#[derive(Debug)]
pub struct RoomStore {
    rooms: RwLock<HashMap<RoomId, Slot>>,
    ttl: Duration,
    max_rooms: usize,
}

impl RoomStore {
    pub fn new(ttl: Duration, max_rooms: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            ttl,
            max_rooms,
        }
    }

    /// Store `body` verbatim. It must be a JSON document.
    pub async fn put(&self, room: RoomId, body: String) -> Result<(), ServerError> {
        serde_json::from_str::<serde_json::Value>(&body)
            .map_err(|e| ServerError::InvalidBody(e.to_string()))?;

        let mut rooms = self.rooms.write().await;
        if !rooms.contains_key(&room) && rooms.len() >= self.max_rooms {
            let now = Instant::now();
            rooms.retain(|_, slot| now.duration_since(slot.written_at) < self.ttl);
            if rooms.len() >= self.max_rooms {
                return Err(ServerError::RoomsFull(rooms.len()));
            }
        }

        debug!(room = %room, size = body.len(), "Room written");
        rooms.insert(
            room,
            Slot {
                body,
                written_at: Instant::now(),
            },
        );
        Ok(())
    }

    pub async fn get(&self, room: RoomId) -> Result<String, ServerError> {
        let rooms = self.rooms.read().await;
        match rooms.get(&room) {
            Some(slot) if slot.written_at.elapsed() < self.ttl => Ok(slot.body.clone()),
            _ => Err(ServerError::RoomNotFound(room)),
        }
    }

    /// Drop expired rooms, returning how many went away.
    pub async fn purge_expired(&self) -> usize {
        let mut rooms = self.rooms.write().await;
        let before = rooms.len();
        let now = Instant::now();
        rooms.retain(|_, slot| now.duration_since(slot.written_at) < self.ttl);
        let purged = before - rooms.len();
        if purged > 0 {
            info!(purged, remaining = rooms.len(), "Purged expired rooms");
        }
        purged
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(n: u64) -> RoomId {
        RoomId::new(100_000_000 + n).unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = RoomStore::new(Duration::from_secs(60), 10);
        store.put(room(1), r#"{"type":"offer","sdp":"x"}"#.into()).await.unwrap();
        assert_eq!(store.get(room(1)).await.unwrap(), r#"{"type":"offer","sdp":"x"}"#);
        assert!(matches!(
            store.get(room(2)).await,
            Err(ServerError::RoomNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_non_json() {
        let store = RoomStore::new(Duration::from_secs(60), 10);
        assert!(matches!(
            store.put(room(1), "not json".into()).await,
            Err(ServerError::InvalidBody(_))
        ));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_expired_room_reads_as_missing() {
        let store = RoomStore::new(Duration::ZERO, 10);
        store.put(room(1), "{}".into()).await.unwrap();
        assert!(store.get(room(1)).await.is_err());
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_capacity() {
        let store = RoomStore::new(Duration::from_secs(60), 2);
        store.put(room(1), "{}".into()).await.unwrap();
        store.put(room(2), "{}".into()).await.unwrap();
        assert!(matches!(
            store.put(room(3), "{}".into()).await,
            Err(ServerError::RoomsFull(2))
        ));
        // Overwriting an existing room is always allowed.
        store.put(room(2), "[]".into()).await.unwrap();
    }
}
