//! Length-prefixed message framing for the tsnprobe control channel.
//!
//! Every message is framed with:
//! - A 1-byte start marker (`0x01`, ASCII SOH)
//! - A 4-byte big-endian payload length (payload only, never the header)
//!
//! Readers reassemble frames from arbitrary stream chunking and hand out
//! exactly one payload per call. A bad marker is fatal: there is no attempt
//! to resynchronize the stream.

pub mod channel;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use channel::FramedChannel;
pub use codec::{decode_frame, encode_frame, FrameConfig, FrameHeader, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MARKER};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
