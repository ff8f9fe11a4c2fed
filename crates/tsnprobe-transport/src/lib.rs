//! Control-connection transport for tsnprobe.
//!
//! The talker and listener run on separate machines and coordinate over a
//! single TCP stream. This crate owns establishing that stream:
//! - the listener binds the control address and accepts exactly one peer
//! - the talker connects, retrying while the listener is not up yet
//!
//! Everything else builds on top of the [`ControlStream`] type provided here.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::ControlStream;
pub use tcp::{connect, connect_with_retry, ControlSocket, RetryPolicy, DEFAULT_CONNECT_BACKOFF};
