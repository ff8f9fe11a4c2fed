use std::net::SocketAddr;

use tsnprobe_frame::{FrameConfig, FramedChannel};
use tsnprobe_transport::{connect_with_retry, RetryPolicy};

use crate::channel::{ControlChannel, TcpControlChannel};
use crate::error::Result;

/// Connect to the listener's control address as the talker.
///
/// Refused or unreachable attempts are retried according to `policy`; the
/// default policy retries every 3 seconds without limit.
pub fn connect(addr: SocketAddr, policy: RetryPolicy) -> Result<TcpControlChannel> {
    let stream = connect_with_retry(addr, policy)?;
    let framed = FramedChannel::from_stream(stream, FrameConfig::default())?;
    Ok(ControlChannel::new(framed))
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, TcpListener};
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::error::ControlError;
    use crate::listener::ControlListener;
    use crate::token::ControlToken;

    #[test]
    fn connect_and_exchange_token() {
        let listener = ControlListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).unwrap();
        let addr = listener.local_addr();

        let server = thread::spawn(move || {
            let mut channel = listener.accept().unwrap();
            channel.send_token(ControlToken::ListenerEnd).unwrap();
        });

        let mut channel = connect(addr, RetryPolicy::default()).unwrap();
        channel.expect(ControlToken::ListenerEnd).unwrap();
        server.join().unwrap();
    }

    #[test]
    fn bounded_policy_gives_up() {
        let probe = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        let policy = RetryPolicy {
            backoff: Duration::from_millis(5),
            max_attempts: Some(2),
        };
        let Err(err) = connect(addr, policy) else {
            panic!("connected to a closed port");
        };
        assert!(matches!(err, ControlError::Transport(_)));
    }
}
