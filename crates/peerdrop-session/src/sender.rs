//! Sending side of a drop: allocate a room, publish the offer, wait for the
//! answer, then stream every queued file over the data channel.

use std::time::Duration;

use peerdrop_relay::{allocate_room, cancel_pair, poll_until, CancelHandle, CancelToken, RelayClient};
use peerdrop_shared::{classify, ChannelMessage, Frame, ProtocolError, RoomId};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::config::SessionConfig;
use crate::error::{FailureReason, SessionError};
use crate::events::SessionEvent;
use crate::flow::FlowState;
use crate::source::{ChunkReader, OutgoingFile};
use crate::transport::{with_cancel, PeerTransport, TransportEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    Offering { room: RoomId },
    AwaitingAnswer { room: RoomId },
    Connected,
    Sending { file_index: usize, chunk_offset: u64 },
    Done,
    Failed(FailureReason),
}

impl SenderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SenderState::Done | SenderState::Failed(_))
    }
}

/// Owner's side of a running [`SenderSession`].
pub struct SenderHandle {
    files: Option<mpsc::UnboundedSender<OutgoingFile>>,
    state: watch::Receiver<SenderState>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    cancel: CancelHandle,
}

impl SenderHandle {
    /// Append a file to the queue. Files queued after the channel opened are
    /// sent after the ones already in flight. Returns false once the queue
    /// is closed or the session has ended.
    pub fn queue(&self, file: OutgoingFile) -> bool {
        match &self.files {
            Some(tx) => tx.send(file).is_ok(),
            None => false,
        }
    }

    /// No more files: the session finishes once the queue is drained.
    pub fn close_queue(&mut self) {
        self.files = None;
    }

    pub fn state(&self) -> SenderState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<SenderState> {
        self.state.clone()
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Abort the session at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for `Done` or `Failed`.
    pub async fn wait_finished(&mut self) -> SenderState {
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

pub struct SenderSession<R, T> {
    relay: R,
    transport: T,
    config: SessionConfig,
    files: mpsc::UnboundedReceiver<OutgoingFile>,
    state: watch::Sender<SenderState>,
    events: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancelToken,
    flow: FlowState,
}

impl<R, T> SenderSession<R, T>
where
    R: RelayClient,
    T: PeerTransport,
{
    pub fn new(relay: R, transport: T, config: SessionConfig) -> (Self, SenderHandle) {
        let (files_tx, files_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SenderState::Idle);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cancel_handle, cancel) = cancel_pair();
        let flow = FlowState::new(config.flow_control);

        let session = Self {
            relay,
            transport,
            config,
            files: files_rx,
            state: state_tx,
            events: events_tx,
            cancel,
            flow,
        };
        let handle = SenderHandle {
            files: Some(files_tx),
            state: state_rx,
            events: events_rx,
            cancel: cancel_handle,
        };
        (session, handle)
    }

    /// Run to completion. The final state is `Done` or `Failed`, and the
    /// transport is closed either way.
    pub async fn run(mut self) -> Result<(), SessionError> {
        let result = self.drive().await;
        match &result {
            Ok(()) => {
                info!(acked = self.flow.acked(), "Sender finished");
                self.set_state(SenderState::Done);
            }
            Err(e) => {
                warn!(error = %e, "Sender failed");
                self.set_state(SenderState::Failed(e.reason()));
            }
        }
        self.transport.close().await;
        result
    }

    async fn drive(&mut self) -> Result<(), SessionError> {
        let offer = with_cancel(&self.cancel, self.transport.create_offer()).await??;

        let room = with_cancel(
            &self.cancel,
            allocate_room(&self.relay, self.config.room_allocation_tries),
        )
        .await??;
        self.set_state(SenderState::Offering { room });
        with_cancel(&self.cancel, self.relay.publish(room, &offer)).await??;
        self.emit(SessionEvent::RoomAllocated(room));
        info!(room = %room, "Offer published, waiting for the receiver");

        self.set_state(SenderState::AwaitingAnswer { room });
        let mut channel_open = false;
        let answer = {
            let poll = poll_until(
                &self.relay,
                room,
                |d| d.is_answer(),
                self.config.answer_poll,
                &self.cancel,
            );
            tokio::pin!(poll);
            loop {
                tokio::select! {
                    res = &mut poll => break res?,
                    event = self.transport.next_event() => match event {
                        Some(TransportEvent::Open) => channel_open = true,
                        Some(TransportEvent::Frame(_)) => debug!("Frame before answer, ignored"),
                        Some(TransportEvent::Closed) | None => return Err(SessionError::ChannelClosed),
                    },
                }
            }
        };

        debug!(room = %room, "Answer received");
        with_cancel(&self.cancel, self.transport.accept_answer(&answer)).await??;
        if !channel_open {
            self.wait_open().await?;
        }
        self.set_state(SenderState::Connected);
        self.emit(SessionEvent::Connected);
        info!(room = %room, "Data channel open");

        let mut index = 0;
        while let Some(file) = self.next_file().await? {
            self.send_file(index, file).await?;
            index += 1;
        }

        // Closing with data still buffered would cut off the last chunks.
        with_cancel(&self.cancel, self.transport.flush()).await??;
        debug!(files = index, "Channel flushed");
        Ok(())
    }

    /// Configured chunk size, capped to what the transport can carry.
    fn chunk_size(&self) -> usize {
        match self.transport.max_message_size() {
            Some(limit) if limit < self.config.chunk_size => limit.max(1),
            _ => self.config.chunk_size,
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

    /// Next queued file, `None` once the queue is closed and empty.
    async fn next_file(&mut self) -> Result<Option<OutgoingFile>, SessionError> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SessionError::Cancelled),
                file = self.files.recv() => return Ok(file),
                event = self.transport.next_event() => self.on_event(event).await?,
            }
        }
    }

    async fn send_file(&mut self, index: usize, file: OutgoingFile) -> Result<(), SessionError> {
        let meta = file.meta.clone();
        info!(index, name = %meta.name, size = meta.size, "Sending file");
        let chunk_size = self.chunk_size();
        if chunk_size < self.config.chunk_size {
            debug!(configured = self.config.chunk_size, chunk_size, "Chunk size capped by transport");
        }
        let mut reader = ChunkReader::open(&file, chunk_size).await?;

        self.set_state(SenderState::Sending {
            file_index: index,
            chunk_offset: 0,
        });
        self.emit(SessionEvent::FileStarted {
            index,
            meta: meta.clone(),
        });
        self.transport
            .send(ChannelMessage::Meta(meta.clone()).into_frame())
            .await?;

        let mut sent = 0u64;
        while let Some(chunk) = reader.next_chunk().await? {
            self.make_room().await?;
            let len = chunk.len() as u64;
            self.transport.send(Frame::Binary(chunk)).await?;
            self.flow.on_sent();
            sent += len;
            trace!(index, sent, "Chunk sent");

            self.set_state(SenderState::Sending {
                file_index: index,
                chunk_offset: sent,
            });
            self.emit(SessionEvent::Progress {
                index,
                bytes: sent,
                total: meta.size,
            });
        }

        while self.flow.must_drain() {
            self.await_ack().await?;
        }
        info!(index, name = %meta.name, "File sent");
        self.emit(SessionEvent::FileSent { index, meta });
        Ok(())
    }

    /// Block until the flow control lets the next chunk go.
    async fn make_room(&mut self) -> Result<(), SessionError> {
        if let Some(delay) = self.flow.pacing_delay() {
            return self.pace(delay).await;
        }
        while self.flow.window_full() {
            self.await_ack().await?;
        }
        Ok(())
    }

    async fn pace(&mut self, delay: Duration) -> Result<(), SessionError> {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SessionError::Cancelled),
                event = self.transport.next_event() => self.on_event(event).await?,
                _ = &mut sleep => return Ok(()),
            }
        }
    }

    /// Wait until at least one more chunk is acknowledged.
    async fn await_ack(&mut self) -> Result<(), SessionError> {
        let timeout = self.flow.ack_timeout();
        let pending = self.flow.in_flight();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        while self.flow.in_flight() >= pending {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SessionError::Cancelled),
                event = self.transport.next_event() => self.on_event(event).await?,
                _ = &mut deadline => return Err(SessionError::AckTimeout(timeout)),
            }
        }
        Ok(())
    }

    async fn on_event(&mut self, event: Option<TransportEvent>) -> Result<(), SessionError> {
        let frame = match event {
            Some(TransportEvent::Frame(frame)) => frame,
            Some(TransportEvent::Open) => return Ok(()),
            Some(TransportEvent::Closed) | None => return Err(SessionError::ChannelClosed),
        };

        match classify(frame)? {
            ChannelMessage::Ack => self.flow.on_ack()?,
            ChannelMessage::Candidate(candidate) => {
                if let Err(e) = self.transport.add_ice_candidate(candidate).await {
                    warn!(error = %e, "Failed to add remote candidate");
                }
            }
            ChannelMessage::Meta(_) => {
                return Err(ProtocolError::UnexpectedMessage("file metadata").into())
            }
            ChannelMessage::Chunk(_) => {
                return Err(ProtocolError::UnexpectedMessage("binary chunk").into())
            }
        }
        Ok(())
    }

    fn set_state(&self, state: SenderState) {
        if !matches!(state, SenderState::Sending { .. }) {
            debug!(state = ?state, "Sender state");
        }
        self.state.send_replace(state);
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
