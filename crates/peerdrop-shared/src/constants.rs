use std::time::Duration;

/// Nominal size of one binary chunk on the data channel
pub const CHUNK_SIZE: usize = 256_000;

/// Text frame the receiver sends back for every chunk
pub const ACK: &str = "ACK";

/// Smallest and largest room identifiers (9 to 10 decimal digits)
pub const ROOM_ID_MIN: u64 = 100_000_000;
pub const ROOM_ID_MAX: u64 = 9_999_999_999;

/// Sender: wait between two polls for the answer
pub const ANSWER_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Sender: polls before the room is declared timed out (about 50 minutes)
pub const ANSWER_POLL_ATTEMPTS: u32 = 1000;

/// Receiver: wait between two attempts at fetching the offer
pub const OFFER_FETCH_INTERVAL: Duration = Duration::from_secs(1);

/// Receiver: attempts at fetching the offer before giving up
pub const OFFER_FETCH_ATTEMPTS: u32 = 600;

/// Fixed inter-chunk delay of the paced flow control
pub const PACING_DELAY: Duration = Duration::from_millis(100);

/// Unacknowledged chunks allowed in flight by the ACK window
pub const ACK_WINDOW: usize = 16;

/// Longest wait for a single ACK before the channel is considered dead
pub const ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Fresh room ids tried before allocation gives up
pub const ROOM_ALLOCATION_TRIES: u32 = 8;

/// Relay path prefix for room slots
pub const RELAY_API_PREFIX: &str = "/api";

/// Default relay HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 8080;
