use async_trait::async_trait;
use peerdrop_shared::{Frame, IceCandidate, SessionDescription};

use crate::error::TransportError;

/// What the channel reports back to its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The data channel is open and `send` may be used
    Open,
    /// An incoming text or binary message
    Frame(Frame),
    /// The channel or the underlying connection went away
    Closed,
}

/// A reliable, ordered duplex channel to one remote peer.
///
/// Descriptions returned by `create_offer` and `accept_offer` are final:
/// implementations wait for candidate gathering to complete before
/// returning them. `next_event` must be cancel-safe, sessions race it
/// against other futures.
#[async_trait]
pub trait PeerTransport: Send {
    async fn create_offer(&mut self) -> Result<SessionDescription, TransportError>;

    /// Apply a remote offer and produce the local answer.
    async fn accept_offer(
        &mut self,
        offer: &SessionDescription,
    ) -> Result<SessionDescription, TransportError>;

    async fn accept_answer(&mut self, answer: &SessionDescription) -> Result<(), TransportError>;

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), TransportError>;

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Largest binary message `send` accepts, if the channel caps it.
    fn max_message_size(&self) -> Option<usize> {
        None
    }

    /// Wait until everything handed to `send` has reached the peer.
    async fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Close channel and connection. Best effort, buffered data is not
    /// drained.
    async fn close(&mut self);
}

/// Await `fut` unless the session is cancelled first.
pub(crate) async fn with_cancel<F>(
    cancel: &peerdrop_relay::CancelToken,
    fut: F,
) -> Result<F::Output, crate::error::SessionError>
where
    F: std::future::Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(crate::error::SessionError::Cancelled),
        out = fut => Ok(out),
    }
}
