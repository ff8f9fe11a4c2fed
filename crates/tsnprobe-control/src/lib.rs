//! Control plane shared by the talker and listener roles.
//!
//! Built on the framed channel, this crate provides:
//! - the closed [`ControlToken`] vocabulary exchanged during an experiment
//! - the payload messages ([`ExperimentParameters`], [`IntermediateTrace`])
//! - [`ControlChannel`], which sends and strictly expects those messages
//! - the one-time setup exchange and connection establishment per role

pub mod channel;
pub mod connector;
pub mod error;
pub mod listener;
pub mod message;
pub mod setup;
pub mod token;

pub use channel::{ControlChannel, TcpControlChannel};
pub use connector::connect;
pub use error::{ControlError, Result};
pub use listener::ControlListener;
pub use message::{ExperimentParameters, Factors, IntermediateTrace};
pub use setup::{receive_setup, send_setup, Setup};
pub use token::ControlToken;
