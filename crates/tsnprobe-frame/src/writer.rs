use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{check_outgoing, encode_frame, FrameConfig};
use crate::error::{FrameError, Result};

/// Frames payloads onto a byte stream.
///
/// Each frame is encoded into one contiguous scratch buffer and handed to
/// the stream as a single write; short writes are completed before
/// returning.
pub struct FrameWriter<T> {
    inner: T,
    scratch: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            scratch: BytesMut::new(),
            config,
        }
    }

    /// Frame and send `payload`. Returns the payload bytes accepted; the
    /// header is never counted.
    ///
    /// Oversized payloads are refused before anything reaches the stream.
    pub fn send(&mut self, payload: &[u8]) -> Result<usize> {
        check_outgoing(payload, &self.config)?;

        self.scratch.clear();
        encode_frame(payload, &mut self.scratch)?;
        self.inner
            .write_all(&self.scratch)
            .and_then(|()| self.inner.flush())
            .map_err(|err| match err.kind() {
                ErrorKind::WriteZero => FrameError::ConnectionClosed,
                _ => FrameError::Io(err),
            })?;
        trace!(len = payload.len(), "frame sent");
        Ok(payload.len())
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}
