//! Two transports linked in memory. Used by tests and by local demos where
//! both sessions run in one process.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use peerdrop_shared::{Frame, IceCandidate, SessionDescription};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TransportError;
use crate::transport::{PeerTransport, TransportEvent};

const UNLIMITED: usize = usize::MAX;

pub struct LoopbackTransport {
    role: &'static str,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    peer: mpsc::UnboundedSender<TransportEvent>,
    connected: Arc<AtomicBool>,
    send_budget: AtomicUsize,
    message_limit: AtomicUsize,
    candidates: Arc<Mutex<Vec<IceCandidate>>>,
}

impl LoopbackTransport {
    /// `(offerer, answerer)`. The channel opens on both ends when the
    /// offerer accepts the answer.
    pub fn pair() -> (Self, Self) {
        let (offerer_tx, offerer_rx) = mpsc::unbounded_channel();
        let (answerer_tx, answerer_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));

        let offerer = Self {
            role: "offerer",
            events_tx: offerer_tx.clone(),
            events_rx: offerer_rx,
            peer: answerer_tx.clone(),
            connected: connected.clone(),
            send_budget: AtomicUsize::new(UNLIMITED),
            message_limit: AtomicUsize::new(UNLIMITED),
            candidates: Arc::default(),
        };
        let answerer = Self {
            role: "answerer",
            events_tx: answerer_tx,
            events_rx: answerer_rx,
            peer: offerer_tx,
            connected,
            send_budget: AtomicUsize::new(UNLIMITED),
            message_limit: AtomicUsize::new(UNLIMITED),
            candidates: Arc::default(),
        };
        (offerer, answerer)
    }

    /// Let `n` more sends through, then fail every following one.
    pub fn fail_sends_after(&self, n: usize) {
        self.send_budget.store(n, Ordering::SeqCst);
    }

    /// Reject binary messages longer than `n` bytes, like an SCTP
    /// association does.
    pub fn limit_message_size(&self, n: usize) {
        self.message_limit.store(n, Ordering::SeqCst);
    }

    /// Open the channel on both ends now, before any answer is accepted.
    pub fn open_early(&self) {
        if !self.connected.swap(true, Ordering::SeqCst) {
            debug!(role = self.role, "Loopback channel opened early");
            let _ = self.events_tx.send(TransportEvent::Open);
            let _ = self.peer.send(TransportEvent::Open);
        }
    }

    /// Candidates handed to `add_ice_candidate` so far.
    pub fn remote_candidates(&self) -> Arc<Mutex<Vec<IceCandidate>>> {
        self.candidates.clone()
    }

    fn take_send_slot(&self) -> bool {
        self.send_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |budget| match budget {
                UNLIMITED => Some(UNLIMITED),
                0 => None,
                n => Some(n - 1),
            })
            .is_ok()
    }
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn create_offer(&mut self) -> Result<SessionDescription, TransportError> {
        Ok(SessionDescription::offer(format!("loopback {}", self.role)))
    }

    async fn accept_offer(
        &mut self,
        offer: &SessionDescription,
    ) -> Result<SessionDescription, TransportError> {
        if !offer.is_offer() {
            return Err(TransportError::Negotiation(format!(
                "expected an offer, got {}",
                offer.kind
            )));
        }
        Ok(SessionDescription::answer(format!("loopback {}", self.role)))
    }

    async fn accept_answer(&mut self, answer: &SessionDescription) -> Result<(), TransportError> {
        if !answer.is_answer() {
            return Err(TransportError::Negotiation(format!(
                "expected an answer, got {}",
                answer.kind
            )));
        }
        if !self.connected.swap(true, Ordering::SeqCst) {
            debug!("Loopback channel open");
            let _ = self.events_tx.send(TransportEvent::Open);
            let _ = self.peer.send(TransportEvent::Open);
        }
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), TransportError> {
        self.candidates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(candidate);
        Ok(())
    }

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotOpen);
        }
        if let Frame::Binary(data) = &frame {
            let limit = self.message_limit.load(Ordering::SeqCst);
            if data.len() > limit {
                return Err(TransportError::Send(format!(
                    "message of {} bytes exceeds {limit}",
                    data.len()
                )));
            }
        }
        if !self.take_send_slot() {
            return Err(TransportError::Send("injected failure".into()));
        }
        self.peer
            .send(TransportEvent::Frame(frame))
            .map_err(|_| TransportError::Closed)
    }

    fn max_message_size(&self) -> Option<usize> {
        match self.message_limit.load(Ordering::SeqCst) {
            UNLIMITED => None,
            n => Some(n),
        }
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events_rx.recv().await
    }

    async fn close(&mut self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.peer.send(TransportEvent::Closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_opens_on_answer() {
        let (mut offerer, mut answerer) = LoopbackTransport::pair();
        assert_eq!(
            offerer.send(Frame::Text("early".into())).await,
            Err(TransportError::NotOpen)
        );

        let offer = offerer.create_offer().await.unwrap();
        let answer = answerer.accept_offer(&offer).await.unwrap();
        offerer.accept_answer(&answer).await.unwrap();

        assert_eq!(offerer.next_event().await, Some(TransportEvent::Open));
        assert_eq!(answerer.next_event().await, Some(TransportEvent::Open));

        offerer.send(Frame::Text("hi".into())).await.unwrap();
        assert_eq!(
            answerer.next_event().await,
            Some(TransportEvent::Frame(Frame::Text("hi".into())))
        );

        answerer.close().await;
        assert_eq!(offerer.next_event().await, Some(TransportEvent::Closed));
        assert_eq!(
            offerer.send(Frame::Text("late".into())).await,
            Err(TransportError::NotOpen)
        );
    }

    #[tokio::test]
    async fn test_rejects_swapped_descriptions() {
        let (mut offerer, mut answerer) = LoopbackTransport::pair();
        let offer = offerer.create_offer().await.unwrap();
        assert!(offerer.accept_answer(&offer).await.is_err());
        assert!(answerer
            .accept_offer(&SessionDescription::answer("x"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_open_early_is_not_repeated() {
        let (mut offerer, mut answerer) = LoopbackTransport::pair();
        answerer.open_early();
        assert_eq!(offerer.next_event().await, Some(TransportEvent::Open));
        assert_eq!(answerer.next_event().await, Some(TransportEvent::Open));

        let answer = answerer.accept_offer(&SessionDescription::offer("o")).await.unwrap();
        offerer.accept_answer(&answer).await.unwrap();
        offerer.send(Frame::Text("hi".into())).await.unwrap();
        assert_eq!(
            answerer.next_event().await,
            Some(TransportEvent::Frame(Frame::Text("hi".into())))
        );
    }

    #[tokio::test]
    async fn test_message_limit() {
        let (mut offerer, mut answerer) = LoopbackTransport::pair();
        assert_eq!(offerer.max_message_size(), None);
        let answer = answerer.accept_offer(&SessionDescription::offer("o")).await.unwrap();
        offerer.accept_answer(&answer).await.unwrap();

        offerer.limit_message_size(4);
        assert_eq!(offerer.max_message_size(), Some(4));
        assert!(offerer.send(Frame::Binary(vec![0u8; 4].into())).await.is_ok());
        assert!(matches!(
            offerer.send(Frame::Binary(vec![0u8; 5].into())).await,
            Err(TransportError::Send(_))
        ));
    }

    #[tokio::test]
    async fn test_send_budget() {
        let (mut offerer, mut answerer) = LoopbackTransport::pair();
        let answer = answerer.accept_offer(&SessionDescription::offer("o")).await.unwrap();
        offerer.accept_answer(&answer).await.unwrap();

        offerer.fail_sends_after(1);
        assert!(offerer.send(Frame::Text("one".into())).await.is_ok());
        assert!(matches!(
            offerer.send(Frame::Text("two".into())).await,
            Err(TransportError::Send(_))
        ));
    }
}
