use std::io::{Read, Write};

use bytes::Bytes;
use tsnprobe_transport::ControlStream;

use crate::codec::FrameConfig;
use crate::error::Result;
use crate::reader::FrameReader;
use crate::writer::FrameWriter;

/// Both directions of one framed connection.
///
/// No internal locking: one sender and one receiver per direction.
pub struct FramedChannel<R, W> {
    rx: FrameReader<R>,
    tx: FrameWriter<W>,
}

impl<R: Read, W: Write> FramedChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_config(reader, writer, FrameConfig::default())
    }

    pub fn with_config(reader: R, writer: W, config: FrameConfig) -> Self {
        Self {
            rx: FrameReader::with_config(reader, config),
            tx: FrameWriter::with_config(writer, config),
        }
    }

    /// Frame and send one payload; returns the payload bytes accepted.
    pub fn send(&mut self, payload: &[u8]) -> Result<usize> {
        self.tx.send(payload)
    }

    /// Block until one complete payload has arrived.
    pub fn receive(&mut self) -> Result<Bytes> {
        self.rx.next_payload()
    }
}

impl FramedChannel<ControlStream, ControlStream> {
    /// Frame a connected control stream.
    pub fn from_stream(stream: ControlStream, config: FrameConfig) -> Result<Self> {
        let reading = stream.try_clone()?;
        Ok(Self::with_config(reading, stream, config))
    }

    /// Shut the connection down in both directions.
    pub fn close(self) -> Result<()> {
        Ok(self.tx.get_ref().shutdown()?)
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};
    use std::os::unix::net::UnixStream;

    use tsnprobe_transport::ControlSocket;

    use super::*;
    use crate::error::FrameError;

    fn pair() -> (FramedChannel<UnixStream, UnixStream>, FramedChannel<UnixStream, UnixStream>) {
        let (left, right) = UnixStream::pair().unwrap();
        let talker = FramedChannel::new(left.try_clone().unwrap(), left);
        let listener = FramedChannel::new(right.try_clone().unwrap(), right);
        (talker, listener)
    }

    #[test]
    fn message_is_received_if_buffer_is_big_enough() {
        let (mut talker, mut listener) = pair();

        talker.send(b"Hello").unwrap();
        assert_eq!(listener.receive().unwrap().as_ref(), b"Hello");
        talker.send(b"Goodbye").unwrap();
        assert_eq!(listener.receive().unwrap().as_ref(), b"Goodbye");
        talker.send(b"Hello").unwrap();
        assert_eq!(listener.receive().unwrap().as_ref(), b"Hello");
    }

    #[test]
    fn only_one_message_is_received_if_more_available() {
        let (mut talker, mut listener) = pair();

        talker.send(b"Hello").unwrap();
        talker.send(b"Goodbye").unwrap();
        assert_eq!(listener.receive().unwrap().as_ref(), b"Hello");
        assert_eq!(listener.receive().unwrap().as_ref(), b"Goodbye");
    }

    #[test]
    fn both_directions_are_independent() {
        let (mut talker, mut listener) = pair();

        talker.send(b"params").unwrap();
        listener.send(b"START_TALKER").unwrap();
        assert_eq!(talker.receive().unwrap().as_ref(), b"START_TALKER");
        assert_eq!(listener.receive().unwrap().as_ref(), b"params");
    }

    #[test]
    fn multi_megabyte_payload_over_socket() {
        let (mut talker, mut listener) = pair();
        let payload: Vec<u8> = (0..6 * 1024 * 1024).map(|i| (i % 251) as u8).collect();

        let expected = payload.clone();
        let sender = std::thread::spawn(move || talker.send(&payload).unwrap());

        let received = listener.receive().unwrap();
        assert_eq!(sender.join().unwrap(), expected.len());
        assert_eq!(received.as_ref(), expected.as_slice());
    }

    #[test]
    fn raw_garbage_is_fatal_for_receiver() {
        use std::io::Write;

        let (mut raw, other) = UnixStream::pair().unwrap();
        raw.write_all(b"abcdefghijklmnop").unwrap();
        let mut listener = FramedChannel::new(other.try_clone().unwrap(), other);

        let err = listener.receive().unwrap_err();
        assert!(matches!(err, FrameError::InvalidMarker { found: b'a', .. }));
    }

    #[test]
    fn tcp_control_stream_roundtrip() {
        let socket = ControlSocket::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).unwrap();
        let addr = socket.local_addr();

        let client = std::thread::spawn(move || {
            let stream = tsnprobe_transport::connect(addr).unwrap();
            let mut channel = FramedChannel::from_stream(stream, FrameConfig::default()).unwrap();
            channel.send(b"LISTENER_END").unwrap();
            channel.receive().unwrap()
        });

        let stream = socket.accept().unwrap();
        let mut channel = FramedChannel::from_stream(stream, FrameConfig::default()).unwrap();
        assert_eq!(channel.receive().unwrap().as_ref(), b"LISTENER_END");
        channel.send(b"ack").unwrap();

        assert_eq!(client.join().unwrap().as_ref(), b"ack");
        channel.close().unwrap();
    }
}
