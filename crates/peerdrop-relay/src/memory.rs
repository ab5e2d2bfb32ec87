//! In-process relay used by tests and local loopback runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use peerdrop_shared::{RoomId, SessionDescription};

use crate::client::RelayClient;
use crate::error::RelayError;

#[derive(Default)]
struct MemoryState {
    rooms: HashMap<RoomId, SessionDescription>,
    fetches: usize,
    publishes: usize,
    failing_fetches: u32,
    saturated: bool,
}

/// A relay kept in memory. Every call is counted so tests can assert on
/// the exact number of round-trips.
#[derive(Default)]
pub struct MemoryRelay {
    state: Mutex<MemoryState>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, room: RoomId) -> Option<SessionDescription> {
        self.lock().rooms.get(&room).cloned()
    }

    pub fn rooms(&self) -> Vec<RoomId> {
        self.lock().rooms.keys().copied().collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }

    pub fn publish_count(&self) -> usize {
        self.lock().publishes
    }

    /// The next `n` fetches fail with HTTP 503.
    pub fn fail_next_fetches(&self, n: u32) {
        self.lock().failing_fetches = n;
    }

    /// Every room reads as occupied, whatever was published.
    pub fn set_saturated(&self, saturated: bool) {
        self.lock().saturated = saturated;
    }
}

#[async_trait]
impl RelayClient for MemoryRelay {
    async fn publish(
        &self,
        room: RoomId,
        description: &SessionDescription,
    ) -> Result<(), RelayError> {
        let mut state = self.lock();
        state.publishes += 1;
        state.rooms.insert(room, description.clone());
        Ok(())
    }

    async fn fetch(&self, room: RoomId) -> Result<SessionDescription, RelayError> {
        let mut state = self.lock();
        state.fetches += 1;

        if state.failing_fetches > 0 {
            state.failing_fetches -= 1;
            return Err(RelayError::Status { room, status: 503 });
        }
        if state.saturated {
            return Ok(state
                .rooms
                .get(&room)
                .cloned()
                .unwrap_or_else(|| SessionDescription::offer("occupied")));
        }
        state
            .rooms
            .get(&room)
            .cloned()
            .ok_or(RelayError::NotFound(room))
    }
}
