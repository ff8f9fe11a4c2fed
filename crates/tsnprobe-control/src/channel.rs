use std::io::{Read, Write};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use tsnprobe_frame::{FrameError, FramedChannel};
use tsnprobe_transport::ControlStream;

use crate::error::{ControlError, Result};
use crate::token::ControlToken;

const PREVIEW_LIMIT: usize = 48;

/// Control channel over a live TCP connection.
pub type TcpControlChannel = ControlChannel<ControlStream, ControlStream>;

/// Sends control tokens and payload messages, and strictly expects them.
///
/// Every receive blocks without a timeout. Anything other than the expected
/// message is a [`ControlError::ProtocolViolation`]; there is no skipping
/// ahead and no resynchronization.
pub struct ControlChannel<R, W> {
    inner: FramedChannel<R, W>,
}

impl<R: Read, W: Write> ControlChannel<R, W> {
    /// Wrap an already-framed channel.
    pub fn new(inner: FramedChannel<R, W>) -> Self {
        Self { inner }
    }

    /// Send one control token.
    pub fn send_token(&mut self, token: ControlToken) -> Result<()> {
        debug!(%token, "send token");
        self.inner.send(token.as_bytes())?;
        Ok(())
    }

    /// Receive one message and require it to be `expected`.
    pub fn expect(&mut self, expected: ControlToken) -> Result<()> {
        let payload = self.receive(expected.as_str())?;
        match ControlToken::from_bytes(&payload) {
            Some(token) if token == expected => {
                debug!(%token, "received token");
                Ok(())
            }
            _ => Err(ControlError::violation(expected.as_str(), preview(&payload))),
        }
    }

    /// Receive one message and require it to be one of `allowed`.
    pub fn expect_one_of(&mut self, allowed: &[ControlToken]) -> Result<ControlToken> {
        let expected = allowed
            .iter()
            .map(|token| token.as_str())
            .collect::<Vec<_>>()
            .join(" or ");
        let payload = self.receive(&expected)?;
        match ControlToken::from_bytes(&payload) {
            Some(token) if allowed.contains(&token) => {
                debug!(%token, "received token");
                Ok(token)
            }
            _ => Err(ControlError::violation(expected, preview(&payload))),
        }
    }

    /// Serialize `value` as JSON and send it as one frame.
    pub fn send_json<T: Serialize>(&mut self, value: &T) -> Result<usize> {
        let payload = serde_json::to_vec(value)?;
        Ok(self.inner.send(&payload)?)
    }

    /// Receive one frame and deserialize it from JSON.
    pub fn recv_json<T: DeserializeOwned>(&mut self, what: &str) -> Result<T> {
        let payload = self.receive(what)?;
        serde_json::from_slice(&payload).map_err(|err| {
            ControlError::violation(format!("{what} (JSON)"), format!("{}: {err}", preview(&payload)))
        })
    }

    /// Send a UTF-8 text payload.
    pub fn send_text(&mut self, text: &str) -> Result<()> {
        self.inner.send(text.as_bytes())?;
        Ok(())
    }

    /// Receive one frame as UTF-8 text.
    pub fn recv_text(&mut self, what: &str) -> Result<String> {
        let payload = self.receive(what)?;
        Ok(std::str::from_utf8(&payload)?.to_string())
    }

    /// Unwrap the framed channel.
    pub fn into_inner(self) -> FramedChannel<R, W> {
        self.inner
    }

    fn receive(&mut self, expected: &str) -> Result<Bytes> {
        match self.inner.receive() {
            Ok(payload) => Ok(payload),
            Err(FrameError::ConnectionClosed) => Err(ControlError::Disconnected(format!(
                "connection closed while waiting for {expected}"
            ))),
            Err(err) => Err(err.into()),
        }
    }
}

impl TcpControlChannel {
    /// Close the connection in both directions.
    pub fn close(self) -> Result<()> {
        Ok(self.inner.close()?)
    }
}

/// Printable summary of an unexpected payload.
fn preview(payload: &[u8]) -> String {
    let head = &payload[..payload.len().min(PREVIEW_LIMIT)];
    let mut text = format!("'{}'", String::from_utf8_lossy(head));
    if payload.len() > PREVIEW_LIMIT {
        text.push_str(&format!(" ({} bytes)", payload.len()));
    }
    text
}
