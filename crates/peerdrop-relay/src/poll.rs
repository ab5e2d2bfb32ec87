//! Bounded polling and room allocation on top of [`RelayClient`].

use std::time::Duration;

use peerdrop_shared::{RoomId, SessionDescription};
use tracing::{debug, trace, warn};

use crate::cancel::CancelToken;
use crate::client::RelayClient;
use crate::error::{PollError, RelayError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

/// Fetch `room` until `accept` returns true.
///
/// Makes at most `policy.max_attempts` fetches, sleeping `policy.interval`
/// between two of them (never after the last). Fetch errors, including
/// `NotFound`, count as rejected attempts. Every await is raced against
/// `cancel`.
pub async fn poll_until<R, P>(
    relay: &R,
    room: RoomId,
    mut accept: P,
    policy: PollPolicy,
    cancel: &CancelToken,
) -> Result<SessionDescription, PollError>
where
    R: RelayClient + ?Sized,
    P: FnMut(&SessionDescription) -> bool,
{
    for attempt in 1..=policy.max_attempts {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            outcome = relay.fetch(room) => outcome,
        };

        match outcome {
            Ok(description) if accept(&description) => {
                debug!(room = %room, attempt, kind = %description.kind, "Poll matched");
                return Ok(description);
            }
            Ok(description) => {
                trace!(room = %room, attempt, kind = %description.kind, "Poll: not yet");
            }
            Err(e) => {
                debug!(room = %room, attempt, error = %e, "Poll: fetch failed");
            }
        }

        if attempt < policy.max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                _ = tokio::time::sleep(policy.interval) => {}
            }
        }
    }

    Err(PollError::TimedOut {
        room,
        attempts: policy.max_attempts,
    })
}

/// Pause after a failed room check before drawing the next id.
const CHECK_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Pick a random room whose slot is currently empty.
///
/// Each candidate is checked with a fetch; an occupied slot means another
/// session owns it, so a new id is drawn. A failed check uses up a try as
/// well. When every try failed the last relay error is returned, otherwise
/// `RoomsExhausted`.
pub async fn allocate_room<R>(relay: &R, max_tries: u32) -> Result<RoomId, RelayError>
where
    R: RelayClient + ?Sized,
{
    let mut last_error = None;
    for attempt in 1..=max_tries {
        let room = RoomId::random();
        match relay.fetch(room).await {
            Err(RelayError::NotFound(_)) => {
                debug!(room = %room, "Allocated room");
                return Ok(room);
            }
            Ok(_) => {
                warn!(room = %room, "Room id already in use, drawing another");
                last_error = None;
            }
            Err(e) => {
                warn!(room = %room, attempt, error = %e, "Room check failed");
                last_error = Some(e);
                if attempt < max_tries {
                    tokio::time::sleep(CHECK_RETRY_DELAY).await;
                }
            }
        }
    }
    Err(last_error.unwrap_or(RelayError::RoomsExhausted(max_tries)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::cancel::cancel_pair;
    use crate::memory::MemoryRelay;

    fn room() -> RoomId {
        RoomId::new(987_654_321).unwrap()
    }

    fn fast(max_attempts: u32) -> PollPolicy {
        PollPolicy::new(Duration::ZERO, max_attempts)
    }

    #[tokio::test]
    async fn test_times_out_after_exactly_n_fetches() {
        let relay = MemoryRelay::new();
        relay
            .publish(room(), &SessionDescription::offer("o"))
            .await
            .unwrap();
        let before = relay.fetch_count();

        let res = poll_until(&relay, room(), |d| d.is_answer(), fast(7), &CancelToken::never()).await;

        assert_eq!(
            res,
            Err(PollError::TimedOut {
                room: room(),
                attempts: 7
            })
        );
        assert_eq!(relay.fetch_count() - before, 7);
    }

    #[tokio::test]
    async fn test_not_found_is_retried() {
        let relay = MemoryRelay::new();
        let res = poll_until(&relay, room(), |_| true, fast(3), &CancelToken::never()).await;
        assert!(matches!(res, Err(PollError::TimedOut { attempts: 3, .. })));
        assert_eq!(relay.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_relay_errors_are_retried() {
        let relay = MemoryRelay::new();
        relay
            .publish(room(), &SessionDescription::answer("a"))
            .await
            .unwrap();
        relay.fail_next_fetches(4);

        let desc = poll_until(&relay, room(), |d| d.is_answer(), fast(5), &CancelToken::never())
            .await
            .unwrap();
        assert!(desc.is_answer());
        assert_eq!(relay.fetch_count(), 5);
    }

    #[tokio::test]
    async fn test_returns_once_answer_lands() {
        let relay = Arc::new(MemoryRelay::new());
        relay
            .publish(room(), &SessionDescription::offer("o"))
            .await
            .unwrap();

        let poller = tokio::spawn({
            let relay = relay.clone();
            async move {
                let policy = PollPolicy::new(Duration::from_millis(5), 1000);
                poll_until(&relay, room(), |d| d.is_answer(), policy, &CancelToken::never()).await
            }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        relay
            .publish(room(), &SessionDescription::answer("a"))
            .await
            .unwrap();

        let desc = poller.await.unwrap().unwrap();
        assert_eq!(desc.sdp, "a");
        assert!(relay.fetch_count() < 1000);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_sleep() {
        let relay = MemoryRelay::new();
        let (handle, token) = cancel_pair();
        let policy = PollPolicy::new(Duration::from_secs(3600), 10);

        let poller = tokio::spawn(async move { poll_until(&relay, room(), |_| true, policy, &token).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let res = tokio::time::timeout(Duration::from_secs(1), poller)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(res, Err(PollError::Cancelled));
    }

    #[tokio::test]
    async fn test_allocate_room_on_empty_relay() {
        let relay = MemoryRelay::new();
        let room = allocate_room(&relay, 3).await.unwrap();
        assert!(relay.get(room).is_none());
        assert_eq!(relay.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_allocate_room_gives_up_when_saturated() {
        let relay = MemoryRelay::new();
        relay.set_saturated(true);
        let err = allocate_room(&relay, 4).await.unwrap_err();
        assert!(matches!(err, RelayError::RoomsExhausted(4)));
        assert_eq!(relay.fetch_count(), 4);
    }

    #[tokio::test]
    async fn test_allocate_room_survives_transient_errors() {
        let relay = MemoryRelay::new();
        relay.fail_next_fetches(2);
        let room = allocate_room(&relay, 4).await.unwrap();
        assert!(relay.get(room).is_none());
        assert_eq!(relay.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_allocate_room_reports_relay_error() {
        let relay = MemoryRelay::new();
        relay.fail_next_fetches(10);
        let err = allocate_room(&relay, 3).await.unwrap_err();
        assert!(matches!(err, RelayError::Status { status: 503, .. }));
        assert_eq!(relay.fetch_count(), 3);
    }
}
