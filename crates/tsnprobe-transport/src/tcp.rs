use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::stream::ControlStream;

/// Fixed pause between connection attempts while the listener is not up.
pub const DEFAULT_CONNECT_BACKOFF: Duration = Duration::from_secs(3);

/// How the talker retries a refused or unreachable control connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between attempts.
    pub backoff: Duration,
    /// Give up after this many attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: DEFAULT_CONNECT_BACKOFF,
            max_attempts: None,
        }
    }
}

/// Listening side of the control connection.
pub struct ControlSocket {
    listener: TcpListener,
    addr: SocketAddr,
}

impl ControlSocket {
    /// Bind and listen on the control address.
    ///
    /// `SO_REUSEADDR` is set by the standard library on Unix, so a listener
    /// restarted right after a previous run does not trip over `TIME_WAIT`.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|e| TransportError::Bind { addr, source: e })?;
        let addr = listener
            .local_addr()
            .map_err(|e| TransportError::Bind { addr, source: e })?;

        info!(%addr, "listening for control connection");
        Ok(Self { listener, addr })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<ControlStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        info!(%peer, "accepted control connection");
        Ok(ControlStream::new(stream, peer))
    }

    /// The address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Connect once to a listening control socket (blocking).
pub fn connect(addr: SocketAddr) -> Result<ControlStream> {
    let stream = TcpStream::connect(addr).map_err(|e| TransportError::Connect { addr, source: e })?;
    stream.set_nodelay(true)?;
    debug!(%addr, "connected to control socket");
    Ok(ControlStream::new(stream, addr))
}

/// Connect to the listener, retrying refused/unreachable attempts.
///
/// Any other connect error is returned immediately.
pub fn connect_with_retry(addr: SocketAddr, policy: RetryPolicy) -> Result<ControlStream> {
    let mut attempts = 0u32;
    loop {
        attempts = attempts.saturating_add(1);
        match connect(addr) {
            Ok(stream) => {
                info!(%addr, attempts, "connected to listener");
                return Ok(stream);
            }
            Err(err) if err.is_retryable() => {
                if policy.max_attempts.is_some_and(|max| attempts >= max) {
                    return Err(err);
                }
                warn!(%addr, error = %err, "connection refused - is listener running? retrying");
                std::thread::sleep(policy.backoff);
            }
            Err(err) => return Err(err),
        }
    }
}
