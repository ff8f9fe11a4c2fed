use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

use crate::error::Result;

/// One end of the established control connection.
///
/// Blocking reads and writes with no timeout: the control protocol waits as
/// long as the other role needs. [`try_clone`](Self::try_clone) yields a
/// second handle, so reading and writing can be owned separately.
pub struct ControlStream {
    tcp: TcpStream,
    peer: SocketAddr,
}

impl ControlStream {
    pub(crate) fn new(tcp: TcpStream, peer: SocketAddr) -> Self {
        Self { tcp, peer }
    }

    /// Another handle on the same connection.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self::new(self.tcp.try_clone()?, self.peer))
    }

    /// The other role's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Close both directions. The peer sees EOF on its next read.
    pub fn shutdown(&self) -> Result<()> {
        match self.tcp.shutdown(Shutdown::Both) {
            // Already torn down by the peer.
            Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => Ok(other?),
        }
    }
}

impl Read for ControlStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.tcp.read(buf)
    }
}

impl Write for ControlStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tcp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.tcp.flush()
    }
}

impl std::fmt::Debug for ControlStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlStream").field("peer", &self.peer).finish()
    }
}
