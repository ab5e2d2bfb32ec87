use std::time::Duration;

use peerdrop_relay::PollPolicy;
use peerdrop_shared::constants::{
    ACK_TIMEOUT, ACK_WINDOW, ANSWER_POLL_ATTEMPTS, ANSWER_POLL_INTERVAL, CHUNK_SIZE,
    OFFER_FETCH_ATTEMPTS, OFFER_FETCH_INTERVAL, PACING_DELAY, ROOM_ALLOCATION_TRIES,
};

/// How the sender spaces out chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    /// Fixed delay before every chunk. ACKs are counted but never awaited.
    Paced { delay: Duration },
    /// At most `window` chunks without an ACK. The window is drained before
    /// a file counts as sent.
    AckWindow { window: usize, ack_timeout: Duration },
}

impl FlowControl {
    pub fn paced() -> Self {
        FlowControl::Paced {
            delay: PACING_DELAY,
        }
    }
}

impl Default for FlowControl {
    fn default() -> Self {
        FlowControl::AckWindow {
            window: ACK_WINDOW,
            ack_timeout: ACK_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Nominal chunk size in bytes
    pub chunk_size: usize,
    /// Sender: waiting for the answer
    pub answer_poll: PollPolicy,
    /// Receiver: waiting for the offer
    pub offer_fetch: PollPolicy,
    /// Sender: fresh room ids tried before giving up
    pub room_allocation_tries: u32,
    pub flow_control: FlowControl,
    /// Receiver: finish after this many files instead of waiting for the
    /// channel to close
    pub expected_files: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            answer_poll: PollPolicy::new(ANSWER_POLL_INTERVAL, ANSWER_POLL_ATTEMPTS),
            offer_fetch: PollPolicy::new(OFFER_FETCH_INTERVAL, OFFER_FETCH_ATTEMPTS),
            room_allocation_tries: ROOM_ALLOCATION_TRIES,
            flow_control: FlowControl::default(),
            expected_files: None,
        }
    }
}
