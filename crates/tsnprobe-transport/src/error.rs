use std::net::SocketAddr;

/// Errors that can occur while establishing or using the control connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether this is a connect failure that the talker should retry.
    ///
    /// Only "listener not there yet" conditions qualify: refused and
    /// host/network unreachable.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connect { source, .. } => is_retryable_connect_error(source),
            _ => false,
        }
    }
}

pub(crate) fn is_retryable_connect_error(err: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        if let Some(code) = err.raw_os_error() {
            return code == libc::ECONNREFUSED
                || code == libc::EHOSTUNREACH
                || code == libc::ENETUNREACH;
        }
    }

    matches!(
        err.kind(),
        std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::HostUnreachable
            | std::io::ErrorKind::NetworkUnreachable
    )
}

pub type Result<T> = std::result::Result<T, TransportError>;
