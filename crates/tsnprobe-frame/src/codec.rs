use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Start marker: ASCII SOH.
pub const MARKER: u8 = 0x01;

/// Marker byte plus the 4-byte length.
pub const HEADER_SIZE: usize = 1 + 4;

/// Default cap on a single payload: 256 MiB.
///
/// Serialized intermediate traces for long runs reach tens of megabytes.
pub const DEFAULT_MAX_PAYLOAD: usize = 256 * 1024 * 1024;

/// Codec limits shared by the reading and writing halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Largest payload accepted in either direction.
    pub max_payload: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl FrameConfig {
    fn check(&self, len: usize) -> Result<()> {
        if len > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: self.max_payload,
            });
        }
        Ok(())
    }
}

/// The five bytes in front of every payload.
///
/// ```text
/// +------+----------------+------------------+
/// | 0x01 | length (u32 BE)| payload          |
/// +------+----------------+------------------+
/// ```
///
/// `length` counts payload bytes only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub payload_len: u32,
}

impl FrameHeader {
    pub fn for_payload(payload: &[u8]) -> Result<Self> {
        let payload_len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        })?;
        Ok(Self { payload_len })
    }

    /// Parse a header from the front of `buf` without consuming it.
    ///
    /// The marker is checked as soon as one byte is present, so corruption is
    /// reported before the rest of the header arrives. `Ok(None)` means more
    /// bytes are needed.
    pub fn peek(buf: &[u8]) -> Result<Option<Self>> {
        match buf {
            [] => Ok(None),
            [found, ..] if *found != MARKER => Err(FrameError::InvalidMarker {
                found: *found,
                buffer: buf.to_vec(),
            }),
            [_, a, b, c, d, ..] => Ok(Some(Self {
                payload_len: u32::from_be_bytes([*a, *b, *c, *d]),
            })),
            _ => Ok(None),
        }
    }

    pub fn payload_len(&self) -> usize {
        self.payload_len as usize
    }

    /// Header plus payload.
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len()
    }

    pub fn put(&self, dst: &mut BytesMut) {
        dst.put_u8(MARKER);
        dst.put_u32(self.payload_len);
    }
}

/// Append one framed payload to `dst`.
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let header = FrameHeader::for_payload(payload)?;
    dst.reserve(header.frame_len());
    header.put(dst);
    dst.put_slice(payload);
    Ok(())
}

/// Take one complete frame off the front of `src` and return its payload.
///
/// Bytes of later frames stay in `src`. `Ok(None)` when the first frame is
/// still incomplete; nothing is consumed in that case.
pub fn decode_frame(src: &mut BytesMut, config: &FrameConfig) -> Result<Option<Bytes>> {
    let Some(header) = FrameHeader::peek(src)? else {
        return Ok(None);
    };
    config.check(header.payload_len())?;
    if src.len() < header.frame_len() {
        return Ok(None);
    }
    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(header.payload_len()).freeze()))
}

/// Reject a payload the peer would refuse.
pub(crate) fn check_outgoing(payload: &[u8], config: &FrameConfig) -> Result<()> {
    config.check(payload.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(buf: &mut BytesMut) -> Result<Option<Bytes>> {
        decode_frame(buf, &FrameConfig::default())
    }

    #[test]
    fn hello_on_the_wire() {
        let mut buf = BytesMut::new();
        encode_frame(b"Hello", &mut buf).unwrap();
        assert_eq!(&buf[..], &[0x01, 0x00, 0x00, 0x00, 0x05, b'H', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn length_counts_payload_only() {
        let mut buf = BytesMut::new();
        encode_frame(&[0xaa; 300], &mut buf).unwrap();
        assert_eq!(FrameHeader::peek(&buf).unwrap().unwrap().payload_len, 300);
        assert_eq!(buf.len(), HEADER_SIZE + 300);
    }

    #[test]
    fn partial_frames_are_left_alone() {
        let mut whole = BytesMut::new();
        encode_frame(b"STOP_LISTENER", &mut whole).unwrap();

        for cut in 0..whole.len() {
            let mut buf = BytesMut::from(&whole[..cut]);
            assert_eq!(decode(&mut buf).unwrap(), None, "cut at {cut}");
            assert_eq!(buf.len(), cut);
        }
    }

    #[test]
    fn one_frame_per_decode() {
        let mut buf = BytesMut::new();
        encode_frame(b"Hello", &mut buf).unwrap();
        encode_frame(b"Goodbye", &mut buf).unwrap();

        assert_eq!(decode(&mut buf).unwrap().unwrap().as_ref(), b"Hello");
        assert_eq!(buf.len(), HEADER_SIZE + b"Goodbye".len());
        assert_eq!(decode(&mut buf).unwrap().unwrap().as_ref(), b"Goodbye");
        assert!(buf.is_empty());
    }

    #[test]
    fn empty_payload() {
        let mut buf = BytesMut::new();
        encode_frame(b"", &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);
        assert!(decode(&mut buf).unwrap().unwrap().is_empty());
    }

    #[test]
    fn bad_marker_reports_whole_buffer() {
        let mut buf = BytesMut::from(&b"abcdefghijklmnop"[..]);
        match decode(&mut buf) {
            Err(FrameError::InvalidMarker { found, buffer }) => {
                assert_eq!(found, b'a');
                assert_eq!(buffer, b"abcdefghijklmnop");
            }
            other => panic!("expected InvalidMarker, got {other:?}"),
        }
        assert_eq!(buf.len(), 16, "nothing consumed");
    }

    #[test]
    fn bad_marker_caught_on_first_byte() {
        let mut buf = BytesMut::from(&[0x02][..]);
        assert!(matches!(
            decode(&mut buf),
            Err(FrameError::InvalidMarker { found: 0x02, .. })
        ));
    }

    #[test]
    fn declared_length_over_limit() {
        let mut buf = BytesMut::new();
        FrameHeader { payload_len: 32 << 20 }.put(&mut buf);
        let config = FrameConfig { max_payload: 1 << 20 };
        assert!(matches!(
            decode_frame(&mut buf, &config),
            Err(FrameError::PayloadTooLarge { size, max }) if size == 32 << 20 && max == 1 << 20
        ));
    }
}
