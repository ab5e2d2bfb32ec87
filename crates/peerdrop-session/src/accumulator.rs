//! Receiver-side reassembly of one file at a time.

use bytes::{Bytes, BytesMut};
use peerdrop_shared::{FileMeta, ProtocolError};
use tracing::debug;

use crate::events::ReceivedFile;

/// Ordered chunk buffers of the file announced by the last `FileMeta`.
///
/// The running total never exceeds the announced size. When it reaches it
/// the buffers are concatenated, handed out exactly once, and the
/// accumulator goes back to waiting for the next `FileMeta`.
#[derive(Debug, Default)]
pub struct TransferAccumulator {
    meta: Option<FileMeta>,
    chunks: Vec<Bytes>,
    received: u64,
}

impl TransferAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the file described by `meta`.
    ///
    /// Metadata replacing a file that already received bytes is an
    /// out-of-sequence error. A zero-length file is complete right away.
    pub fn begin(&mut self, meta: FileMeta) -> Result<Option<ReceivedFile>, ProtocolError> {
        if let Some(current) = &self.meta {
            if self.received > 0 {
                return Err(ProtocolError::InterruptedFile {
                    current: current.name.clone(),
                    next: meta.name,
                    received: self.received,
                    expected: current.size,
                });
            }
            debug!(previous = %current.name, next = %meta.name, "Metadata replaced before any chunk");
        }

        self.reset();
        if meta.size == 0 {
            return Ok(Some(ReceivedFile {
                meta,
                data: Bytes::new(),
            }));
        }
        self.meta = Some(meta);
        Ok(None)
    }

    /// Append one chunk. Returns the finished file when the announced size
    /// is reached.
    pub fn push(&mut self, chunk: Bytes) -> Result<Option<ReceivedFile>, ProtocolError> {
        let meta = self
            .meta
            .as_ref()
            .ok_or(ProtocolError::ChunkWithoutMeta(chunk.len()))?;

        let received = self.received + chunk.len() as u64;
        if received > meta.size {
            return Err(ProtocolError::Overflow {
                name: meta.name.clone(),
                received,
                expected: meta.size,
            });
        }

        let complete = received == meta.size;
        self.chunks.push(chunk);
        self.received = received;

        Ok(complete.then(|| self.flush()))
    }

    pub fn current(&self) -> Option<&FileMeta> {
        self.meta.as_ref()
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    /// A file was announced and is not complete yet.
    pub fn is_active(&self) -> bool {
        self.meta.is_some()
    }

    fn flush(&mut self) -> ReceivedFile {
        let chunks = std::mem::take(&mut self.chunks);
        let data = if chunks.len() == 1 {
            chunks.into_iter().next().unwrap_or_default()
        } else {
            let mut buf = BytesMut::with_capacity(self.received as usize);
            for chunk in &chunks {
                buf.extend_from_slice(chunk);
            }
            buf.freeze()
        };
        let meta = self.meta.take().unwrap_or_else(|| FileMeta {
            name: String::new(),
            size: data.len() as u64,
            last_modified: 0,
        });
        self.received = 0;
        ReceivedFile { meta, data }
    }

    fn reset(&mut self) {
        self.meta = None;
        self.chunks.clear();
        self.received = 0;
    }
}
