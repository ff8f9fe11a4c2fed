use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::codec::{decode_frame, FrameConfig, FrameHeader};
use crate::error::{FrameError, Result};

/// Bytes requested from the stream per read while no header is known.
const READ_CHUNK: usize = 8 * 1024;

/// Turns a byte stream back into payloads.
///
/// Received bytes collect in a FIFO. Each [`next_payload`](Self::next_payload)
/// call hands out exactly one payload; bytes already received for later
/// frames stay queued for the next call.
pub struct FrameReader<T> {
    inner: T,
    fifo: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            fifo: BytesMut::with_capacity(READ_CHUNK),
            config,
        }
    }

    /// Block until one complete frame is buffered and return its payload.
    ///
    /// EOF before that yields [`FrameError::ConnectionClosed`]. A bad marker
    /// stays at the head of the FIFO, so every later call fails the same way.
    pub fn next_payload(&mut self) -> Result<Bytes> {
        loop {
            if let Some(payload) = decode_frame(&mut self.fifo, &self.config)? {
                trace!(len = payload.len(), queued = self.fifo.len(), "frame received");
                return Ok(payload);
            }
            // Once the header is in, make room for the whole frame at once.
            let want = match FrameHeader::peek(&self.fifo)? {
                Some(header) => header.frame_len() - self.fifo.len(),
                None => READ_CHUNK,
            };
            if self.fill(want)? == 0 {
                return Err(FrameError::ConnectionClosed);
            }
        }
    }

    /// Read up to `want` bytes straight into the FIFO's spare capacity.
    fn fill(&mut self, want: usize) -> Result<usize> {
        let start = self.fifo.len();
        self.fifo.resize(start + want, 0);
        let result = loop {
            match self.inner.read(&mut self.fifo[start..]) {
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                other => break other,
            }
        };
        let read = *result.as_ref().unwrap_or(&0);
        self.fifo.truncate(start + read);
        Ok(result?)
    }

    /// Bytes received but not yet handed out.
    pub fn buffered(&self) -> usize {
        self.fifo.len()
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}
