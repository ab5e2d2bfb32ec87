//! Receiving side of a drop: fetch the offer for a known room, publish the
//! answer, then reassemble files from the data channel.

use peerdrop_relay::{cancel_pair, poll_until, CancelHandle, CancelToken, RelayClient};
use peerdrop_shared::{classify, ChannelMessage, FileMeta, ProtocolError, RoomId};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::accumulator::TransferAccumulator;
use crate::config::SessionConfig;
use crate::error::{FailureReason, SessionError};
use crate::events::{ReceivedFile, SessionEvent};
use crate::transport::{with_cancel, PeerTransport, TransportEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    FetchingOffer,
    Answering,
    Connected,
    Receiving { file_index: usize, bytes_received: u64 },
    Done,
    Failed(FailureReason),
}

impl ReceiverState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReceiverState::Done | ReceiverState::Failed(_))
    }
}

/// Owner's side of a running [`ReceiverSession`].
pub struct ReceiverHandle {
    state: watch::Receiver<ReceiverState>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    cancel: CancelHandle,
}

impl ReceiverHandle {
    pub fn state(&self) -> ReceiverState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ReceiverState> {
        self.state.clone()
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Abort the session at its next suspension point, including while the
    /// offer is still being fetched.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn wait_finished(&mut self) -> ReceiverState {
        loop {
            {
                let state = self.state.borrow_and_update();
                if state.is_terminal() {
                    return state.clone();
                }
            }
            if self.state.changed().await.is_err() {
                return self.state.borrow().clone();
            }
        }
    }
}

pub struct ReceiverSession<R, T> {
    relay: R,
    transport: T,
    config: SessionConfig,
    room: RoomId,
    state: watch::Sender<ReceiverState>,
    events: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancelToken,
    accumulator: TransferAccumulator,
    files_started: usize,
    files_received: usize,
}

impl<R, T> ReceiverSession<R, T>
where
    R: RelayClient,
    T: PeerTransport,
{
    pub fn new(relay: R, transport: T, config: SessionConfig, room: RoomId) -> (Self, ReceiverHandle) {
        let (state_tx, state_rx) = watch::channel(ReceiverState::Idle);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cancel_handle, cancel) = cancel_pair();

        let session = Self {
            relay,
            transport,
            config,
            room,
            state: state_tx,
            events: events_tx,
            cancel,
            accumulator: TransferAccumulator::new(),
            files_started: 0,
            files_received: 0,
        };
        let handle = ReceiverHandle {
            state: state_rx,
            events: events_rx,
            cancel: cancel_handle,
        };
        (session, handle)
    }

    /// Run to completion. Finished files are delivered as
    /// [`SessionEvent::FileReceived`] as soon as their last byte lands.
    pub async fn run(mut self) -> Result<(), SessionError> {
        let result = self.drive().await;
        match &result {
            Ok(()) => {
                info!(room = %self.room, files = self.files_received, "Receiver finished");
                self.set_state(ReceiverState::Done);
            }
            Err(e) => {
                warn!(room = %self.room, error = %e, "Receiver failed");
                self.set_state(ReceiverState::Failed(e.reason()));
            }
        }
        self.transport.close().await;
        result
    }

    async fn drive(&mut self) -> Result<(), SessionError> {
        let room = self.room;
        self.set_state(ReceiverState::FetchingOffer);
        info!(room = %room, "Fetching offer");
        let offer = poll_until(&self.relay, room, |_| true, self.config.offer_fetch, &self.cancel).await?;
        if !offer.is_offer() {
            return Err(ProtocolError::UnexpectedDescription {
                expected: "offer".into(),
                got: offer.kind.to_string(),
            }
            .into());
        }

        self.set_state(ReceiverState::Answering);
        let answer = with_cancel(&self.cancel, self.transport.accept_offer(&offer)).await??;
        with_cancel(&self.cancel, self.relay.publish(room, &answer)).await??;
        debug!(room = %room, "Answer published");

        self.wait_open().await?;
        self.set_state(ReceiverState::Connected);
        self.emit(SessionEvent::Connected);
        info!(room = %room, "Data channel open");

        loop {
            if self
                .config
                .expected_files
                .is_some_and(|n| self.files_received >= n)
            {
                return Ok(());
            }

            let event = with_cancel(&self.cancel, self.transport.next_event()).await?;
            match event {
                Some(TransportEvent::Frame(frame)) => self.on_message(classify(frame)?).await?,
                Some(TransportEvent::Open) => {}
                Some(TransportEvent::Closed) | None => return self.on_closed(),
            }
        }
    }

    async fn wait_open(&mut self) -> Result<(), SessionError> {
        loop {
            match with_cancel(&self.cancel, self.transport.next_event()).await? {
                Some(TransportEvent::Open) => return Ok(()),
                Some(TransportEvent::Frame(_)) => debug!("Frame before channel open, ignored"),
                Some(TransportEvent::Closed) | None => return Err(SessionError::ChannelClosed),
            }
        }
    }

    async fn on_message(&mut self, message: ChannelMessage) -> Result<(), SessionError> {
        match message {
            ChannelMessage::Candidate(candidate) => {
                if let Err(e) = self.transport.add_ice_candidate(candidate).await {
                    warn!(error = %e, "Failed to add remote candidate");
                }
            }
            ChannelMessage::Ack => trace!("Stray ACK ignored"),
            ChannelMessage::Meta(meta) => self.on_meta(meta)?,
            ChannelMessage::Chunk(chunk) => {
                let len = chunk.len();
                let finished = self.accumulator.push(chunk)?;
                let index = self.files_started.saturating_sub(1);

                // Advisory only: the sender may already be closing.
                if let Err(e) = self.transport.send(ChannelMessage::Ack.into_frame()).await {
                    debug!(error = %e, "ACK not sent");
                }

                match finished {
                    Some(file) => self.finish(index, file),
                    None => {
                        let bytes = self.accumulator.received();
                        let total = self.accumulator.current().map_or(0, |m| m.size);
                        trace!(index, len, bytes, "Chunk received");
                        self.set_state(ReceiverState::Receiving {
                            file_index: index,
                            bytes_received: bytes,
                        });
                        self.emit(SessionEvent::Progress { index, bytes, total });
                    }
                }
            }
        }
        Ok(())
    }

    fn on_meta(&mut self, meta: FileMeta) -> Result<(), SessionError> {
        // Metadata replacing an untouched file takes over its index.
        let replaces = self.accumulator.is_active();
        let finished = self.accumulator.begin(meta.clone())?;
        let index = if replaces {
            self.files_started.saturating_sub(1)
        } else {
            self.files_started += 1;
            self.files_started - 1
        };

        info!(index, name = %meta.name, size = meta.size, "Receiving file");
        self.set_state(ReceiverState::Receiving {
            file_index: index,
            bytes_received: 0,
        });
        self.emit(SessionEvent::FileStarted { index, meta });

        if let Some(file) = finished {
            self.finish(index, file);
        }
        Ok(())
    }

    fn finish(&mut self, index: usize, file: ReceivedFile) {
        info!(index, name = %file.meta.name, size = file.data.len(), "File received");
        self.set_state(ReceiverState::Receiving {
            file_index: index,
            bytes_received: file.meta.size,
        });
        self.emit(SessionEvent::Progress {
            index,
            bytes: file.meta.size,
            total: file.meta.size,
        });
        self.emit(SessionEvent::FileReceived { index, file });
        self.files_received += 1;
    }

    /// The sender went away: fine between files, a failure inside one.
    fn on_closed(&self) -> Result<(), SessionError> {
        match self.accumulator.current() {
            Some(meta) => Err(SessionError::Truncated {
                name: meta.name.clone(),
                received: self.accumulator.received(),
                expected: meta.size,
            }),
            None => {
                debug!(files = self.files_received, "Channel closed between files");
                Ok(())
            }
        }
    }

    fn set_state(&self, state: ReceiverState) {
        if !matches!(state, ReceiverState::Receiving { .. }) {
            debug!(state = ?state, "Receiver state");
        }
        self.state.send_replace(state);
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
