use std::net::SocketAddr;

use tsnprobe_frame::{FrameConfig, FramedChannel};
use tsnprobe_transport::ControlSocket;

use crate::channel::{ControlChannel, TcpControlChannel};
use crate::error::Result;

/// Listener side of the control connection.
///
/// An experiment has exactly one talker, so the driver accepts once and
/// drops the listener afterwards.
pub struct ControlListener {
    socket: ControlSocket,
}

impl ControlListener {
    /// Bind the control address with address reuse.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        Ok(Self {
            socket: ControlSocket::bind(addr)?,
        })
    }

    /// Block until the talker connects.
    pub fn accept(&self) -> Result<TcpControlChannel> {
        let stream = self.socket.accept()?;
        let framed = FramedChannel::from_stream(stream, FrameConfig::default())?;
        Ok(ControlChannel::new(framed))
    }

    /// Bound address; resolves port 0 to the assigned port.
    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::thread;

    use tsnprobe_transport::RetryPolicy;

    use super::*;
    use crate::connector::connect;

    #[test]
    fn rebinding_same_port_after_close_succeeds() {
        let first = ControlListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).unwrap();
        let addr = first.local_addr();

        let client = thread::spawn(move || connect(addr, RetryPolicy::default()).unwrap());
        let server_side = first.accept().unwrap();
        let client_side = client.join().unwrap();
        drop(server_side);
        drop(client_side);
        drop(first);

        let second = ControlListener::bind(addr).unwrap();
        assert_eq!(second.local_addr(), addr);
    }
}
