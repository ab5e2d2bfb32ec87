//! [`PeerTransport`] over a WebRTC data channel.
//!
//! Candidates are not trickled through the relay: offer and answer are
//! published only once gathering completes, so they carry every local
//! candidate. Late candidates the remote end sends in-band are still
//! applied through `add_ice_candidate`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use peerdrop_shared::{Frame, IceCandidate, SdpType, SessionDescription};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use crate::error::TransportError;
use crate::transport::{PeerTransport, TransportEvent};

pub const DATA_CHANNEL_LABEL: &str = "sendChannel";
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// SCTP message cap of the association (webrtc-sctp default).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Above this many queued bytes `send` waits for the channel to drain.
const MAX_BUFFERED_AMOUNT: usize = 8 * 1024 * 1024;
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct WebRtcConfig {
    /// STUN/TURN urls
    pub ice_servers: Vec<String>,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![DEFAULT_STUN_URL.to_string()],
        }
    }
}

type ChannelSlot = Arc<Mutex<Option<Arc<RTCDataChannel>>>>;

pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
    channel: ChannelSlot,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl WebRtcTransport {
    pub async fn new(config: &WebRtcConfig) -> Result<Self, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(negotiation)?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(negotiation)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if config.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: config.ice_servers.clone(),
                ..Default::default()
            }]
        };
        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };
        let pc = Arc::new(api.new_peer_connection(rtc_config).await.map_err(negotiation)?);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let channel: ChannelSlot = Arc::default();

        // Answerer: adopt the channel the offerer created.
        let tx = events_tx.clone();
        let slot = channel.clone();
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            debug!(label = dc.label(), "Remote data channel announced");
            wire_channel(&dc, tx.clone());
            store_channel(&slot, dc);
            Box::pin(async {})
        }));

        let tx = events_tx.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            debug!(?state, "Peer connection state");
            if matches!(
                state,
                RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed
            ) {
                let _ = tx.send(TransportEvent::Closed);
            }
            Box::pin(async {})
        }));

        Ok(Self {
            pc,
            channel,
            events_tx,
            events_rx,
        })
    }

    fn current_channel(&self) -> Option<Arc<RTCDataChannel>> {
        self.channel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn create_offer(&mut self) -> Result<SessionDescription, TransportError> {
        let dc = self
            .pc
            .create_data_channel(
                DATA_CHANNEL_LABEL,
                Some(RTCDataChannelInit {
                    ordered: Some(true),
                    ..Default::default()
                }),
            )
            .await
            .map_err(negotiation)?;
        wire_channel(&dc, self.events_tx.clone());
        store_channel(&self.channel, dc);

        let offer = self.pc.create_offer(None).await.map_err(negotiation)?;
        let offer = finish_local(&self.pc, offer).await?;
        info!(bytes = offer.sdp.len(), "Local offer ready");
        Ok(offer)
    }

    async fn accept_offer(
        &mut self,
        offer: &SessionDescription,
    ) -> Result<SessionDescription, TransportError> {
        self.pc
            .set_remote_description(to_rtc(offer)?)
            .await
            .map_err(negotiation)?;
        let answer = self.pc.create_answer(None).await.map_err(negotiation)?;
        let answer = finish_local(&self.pc, answer).await?;
        info!(bytes = answer.sdp.len(), "Local answer ready");
        Ok(answer)
    }

    async fn accept_answer(&mut self, answer: &SessionDescription) -> Result<(), TransportError> {
        self.pc
            .set_remote_description(to_rtc(answer)?)
            .await
            .map_err(negotiation)
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), TransportError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.pc.add_ice_candidate(init).await.map_err(negotiation)
    }

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let dc = self.current_channel().ok_or(TransportError::NotOpen)?;
        if dc.ready_state() != RTCDataChannelState::Open {
            return Err(TransportError::NotOpen);
        }

        let sent = match frame {
            Frame::Text(text) => dc.send_text(text).await,
            Frame::Binary(data) => {
                wait_for_drain(&dc).await;
                dc.send(&data).await
            }
        };
        sent.map(|_| ()).map_err(|e| TransportError::Send(e.to_string()))
    }

    fn max_message_size(&self) -> Option<usize> {
        Some(MAX_MESSAGE_SIZE)
    }

    /// Buffered bytes are only released once the peer acknowledged them.
    async fn flush(&mut self) -> Result<(), TransportError> {
        let Some(dc) = self.current_channel() else {
            return Ok(());
        };
        loop {
            let buffered = dc.buffered_amount().await;
            if buffered == 0 {
                return Ok(());
            }
            if dc.ready_state() != RTCDataChannelState::Open {
                return Err(TransportError::Closed);
            }
            trace!(buffered, "Waiting for the channel to flush");
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events_rx.recv().await
    }

    async fn close(&mut self) {
        if let Some(dc) = self.current_channel() {
            if let Err(e) = dc.close().await {
                debug!(error = %e, "Data channel close failed");
            }
        }
        if let Err(e) = self.pc.close().await {
            debug!(error = %e, "Peer connection close failed");
        }
    }
}

/// Apply `description` locally and return it once ICE gathering is done.
async fn finish_local(
    pc: &RTCPeerConnection,
    description: RTCSessionDescription,
) -> Result<SessionDescription, TransportError> {
    let mut gathered = pc.gathering_complete_promise().await;
    pc.set_local_description(description)
        .await
        .map_err(negotiation)?;
    let _ = gathered.recv().await;

    let local = pc
        .local_description()
        .await
        .ok_or_else(|| TransportError::Negotiation("no local description".into()))?;
    from_rtc(&local)
}

fn negotiation(e: webrtc::Error) -> TransportError {
    TransportError::Negotiation(e.to_string())
}

fn store_channel(slot: &ChannelSlot, dc: Arc<RTCDataChannel>) {
    *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(dc);
}

/// Forward open, message and close callbacks into the event queue.
fn wire_channel(dc: &Arc<RTCDataChannel>, tx: mpsc::UnboundedSender<TransportEvent>) {
    let open_tx = tx.clone();
    dc.on_open(Box::new(move || {
        let _ = open_tx.send(TransportEvent::Open);
        Box::pin(async {})
    }));

    let message_tx = tx.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let frame = if msg.is_string {
            Frame::Text(String::from_utf8_lossy(&msg.data).into_owned())
        } else {
            Frame::Binary(msg.data)
        };
        let _ = message_tx.send(TransportEvent::Frame(frame));
        Box::pin(async {})
    }));

    dc.on_close(Box::new(move || {
        let _ = tx.send(TransportEvent::Closed);
        Box::pin(async {})
    }));
}

async fn wait_for_drain(dc: &RTCDataChannel) {
    while dc.ready_state() == RTCDataChannelState::Open
        && dc.buffered_amount().await > MAX_BUFFERED_AMOUNT
    {
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
}

fn to_rtc(description: &SessionDescription) -> Result<RTCSessionDescription, TransportError> {
    let sdp = description.sdp.clone();
    let converted = match description.kind {
        SdpType::Offer => RTCSessionDescription::offer(sdp),
        SdpType::Answer => RTCSessionDescription::answer(sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(sdp),
        SdpType::Rollback => {
            return Err(TransportError::Negotiation(
                "rollback descriptions are not supported".into(),
            ))
        }
    };
    converted.map_err(negotiation)
}

fn from_rtc(description: &RTCSessionDescription) -> Result<SessionDescription, TransportError> {
    match description.sdp_type {
        RTCSdpType::Offer => Ok(SessionDescription::offer(description.sdp.clone())),
        RTCSdpType::Answer => Ok(SessionDescription::answer(description.sdp.clone())),
        other => Err(TransportError::Negotiation(format!(
            "unexpected local description type {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use peerdrop_relay::{MemoryRelay, PollPolicy};

    use crate::config::{FlowControl, SessionConfig};
    use crate::events::SessionEvent;
    use crate::receiver::ReceiverSession;
    use crate::sender::SenderSession;
    use crate::source::OutgoingFile;

    fn local_only() -> WebRtcConfig {
        WebRtcConfig {
            ice_servers: Vec::new(),
        }
    }

    #[test]
    fn test_default_stun_server() {
        assert_eq!(
            WebRtcConfig::default().ice_servers,
            vec!["stun:stun.l.google.com:19302".to_string()]
        );
    }

    #[test]
    fn test_rollback_is_rejected() {
        let rollback = SessionDescription {
            kind: SdpType::Rollback,
            sdp: String::new(),
            extra: Default::default(),
        };
        assert!(matches!(
            to_rtc(&rollback),
            Err(TransportError::Negotiation(_))
        ));
    }

    #[tokio::test]
    async fn test_send_before_negotiation() {
        let mut transport = WebRtcTransport::new(&local_only()).await.unwrap();
        assert_eq!(
            transport.send(Frame::Text("early".into())).await,
            Err(TransportError::NotOpen)
        );
        transport.close().await;
    }

    #[tokio::test]
    async fn test_offer_carries_data_channel() {
        let mut transport = WebRtcTransport::new(&local_only()).await.unwrap();
        let offer = tokio::time::timeout(Duration::from_secs(10), transport.create_offer())
            .await
            .unwrap()
            .unwrap();
        assert!(offer.is_offer());
        assert!(offer.sdp.contains("m=application"));
        transport.close().await;
    }

    /// Drop one file between two real peer connections on this host and
    /// return the chunk sizes the sender reported.
    async fn drop_file(flow_control: FlowControl, chunk_size: usize, len: usize) -> Vec<u64> {
        let relay = Arc::new(MemoryRelay::new());
        let data: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();

        let sender_config = SessionConfig {
            chunk_size,
            answer_poll: PollPolicy::new(Duration::from_millis(20), 1000),
            flow_control,
            ..Default::default()
        };
        let transport = WebRtcTransport::new(&local_only()).await.unwrap();
        let (sender, mut sender_handle) = SenderSession::new(relay.clone(), transport, sender_config);
        sender_handle.queue(OutgoingFile::from_bytes("big.bin", data.clone()));
        sender_handle.close_queue();
        let sender_task = tokio::spawn(sender.run());

        let room = match sender_handle.next_event().await {
            Some(SessionEvent::RoomAllocated(room)) => room,
            other => panic!("expected RoomAllocated, got {other:?}"),
        };

        let receiver_config = SessionConfig {
            offer_fetch: PollPolicy::new(Duration::from_millis(20), 500),
            ..Default::default()
        };
        let transport = WebRtcTransport::new(&local_only()).await.unwrap();
        let (receiver, mut receiver_handle) =
            ReceiverSession::new(relay.clone(), transport, receiver_config, room);
        let receiver_task = tokio::spawn(receiver.run());

        let limit = Duration::from_secs(60);
        let sent = tokio::time::timeout(limit, sender_task).await.unwrap().unwrap();
        let received = tokio::time::timeout(limit, receiver_task).await.unwrap().unwrap();
        assert!(sent.is_ok(), "sender: {sent:?}");
        assert!(received.is_ok(), "receiver: {received:?}");

        let mut files = Vec::new();
        while let Some(event) = receiver_handle.next_event().await {
            if let SessionEvent::FileReceived { file, .. } = event {
                files.push(file);
            }
        }
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].meta.name, "big.bin");
        assert!(files[0].data.as_ref() == data.as_slice());

        let mut chunks = Vec::new();
        let mut last = 0;
        while let Some(event) = sender_handle.next_event().await {
            if let SessionEvent::Progress { bytes, .. } = event {
                chunks.push(bytes - last);
                last = bytes;
            }
        }
        chunks
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_default_chunks_are_capped_to_sctp_limit() {
        let chunks = drop_file(FlowControl::default(), 256_000, 3_000_000).await;
        assert!(chunks.iter().all(|&c| c <= MAX_MESSAGE_SIZE as u64));
        assert_eq!(chunks[0], MAX_MESSAGE_SIZE as u64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_paced_sender_flushes_before_close() {
        let paced = FlowControl::Paced {
            delay: Duration::from_millis(1),
        };
        let chunks = drop_file(paced, 60_000, 3_000_000).await;
        assert_eq!(chunks.len(), 50);
    }
}
