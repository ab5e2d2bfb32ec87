use std::time::Duration;

use peerdrop_shared::ProtocolError;

use crate::config::FlowControl;

/// Bookkeeping of chunks sent versus ACKs observed.
#[derive(Debug)]
pub(crate) struct FlowState {
    mode: FlowControl,
    in_flight: usize,
    acked: u64,
}

impl FlowState {
    pub(crate) fn new(mode: FlowControl) -> Self {
        Self {
            mode,
            in_flight: 0,
            acked: 0,
        }
    }

    pub(crate) fn on_sent(&mut self) {
        self.in_flight += 1;
    }

    /// Paced mode tolerates stray ACKs, the window does not.
    pub(crate) fn on_ack(&mut self) -> Result<(), ProtocolError> {
        if self.in_flight == 0 {
            return match self.mode {
                FlowControl::Paced { .. } => Ok(()),
                FlowControl::AckWindow { .. } => Err(ProtocolError::UnexpectedAck),
            };
        }
        self.in_flight -= 1;
        self.acked += 1;
        Ok(())
    }

    /// The next chunk has to wait for an ACK first.
    pub(crate) fn window_full(&self) -> bool {
        match self.mode {
            FlowControl::Paced { .. } => false,
            FlowControl::AckWindow { window, .. } => self.in_flight >= window.max(1),
        }
    }

    /// Outstanding ACKs that must arrive before a file counts as sent.
    pub(crate) fn must_drain(&self) -> bool {
        matches!(self.mode, FlowControl::AckWindow { .. }) && self.in_flight > 0
    }

    pub(crate) fn pacing_delay(&self) -> Option<Duration> {
        match self.mode {
            FlowControl::Paced { delay } => Some(delay),
            FlowControl::AckWindow { .. } => None,
        }
    }

    pub(crate) fn ack_timeout(&self) -> Duration {
        match self.mode {
            FlowControl::AckWindow { ack_timeout, .. } => ack_timeout,
            FlowControl::Paced { .. } => Duration::MAX,
        }
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub(crate) fn acked(&self) -> u64 {
        self.acked
    }
}
