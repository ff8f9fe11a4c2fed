use tsnprobe_transport::TransportError;

/// How many bytes of a corrupted buffer the error message shows.
const PREVIEW_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The first byte of a frame is not the SOH marker.
    ///
    /// Carries everything buffered at that point. The channel is unusable
    /// afterwards; there is no resynchronization.
    #[error(
        "invalid frame marker 0x{found:02x} (expected 0x01); buffer holds {} bytes: {}",
        .buffer.len(),
        preview(.buffer)
    )]
    InvalidMarker { found: u8, buffer: Vec<u8> },

    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// EOF before a complete frame, or the peer stopped accepting bytes.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl From<TransportError> for FrameError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(io) | TransportError::Accept(io) => Self::Io(io),
            TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
                Self::Io(source)
            }
        }
    }
}

fn preview(buffer: &[u8]) -> String {
    let shown = &buffer[..buffer.len().min(PREVIEW_LEN)];
    let mut out = format!("{shown:02x?}");
    if buffer.len() > PREVIEW_LEN {
        out.push_str(" ...");
    }
    out
}

pub type Result<T> = std::result::Result<T, FrameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_marker_message_previews_buffer() {
        let err = FrameError::InvalidMarker {
            found: b'a',
            buffer: b"abc".to_vec(),
        };
        let msg = err.to_string();
        assert!(msg.contains("0x61"));
        assert!(msg.contains("3 bytes"));
        assert!(msg.contains("[61, 62, 63]"));
    }

    #[test]
    fn long_buffers_are_truncated_in_message() {
        let err = FrameError::InvalidMarker {
            found: 0xff,
            buffer: vec![0xff; 1024],
        };
        let msg = err.to_string();
        assert!(msg.contains("1024 bytes"));
        assert!(msg.ends_with(" ..."));
    }

    #[test]
    fn transport_io_keeps_its_kind() {
        let err: FrameError =
            TransportError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).into();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == std::io::ErrorKind::BrokenPipe));
    }
}
