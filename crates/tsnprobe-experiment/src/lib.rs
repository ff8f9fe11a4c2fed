//! Experiment orchestration for tsnprobe.
//!
//! A run pairs two machines. The talker transmits timestamped frames through
//! the `tsn-talker` data-plane tool; the listener receives them with
//! `tsn-listener`. This crate drives one side of that pair:
//!
//! - [`config`] turns the JSON configuration into typed settings
//! - [`platform`] prepares the NIC, VLAN, qdiscs and PTP, and undoes it all
//! - [`runner`] builds and supervises the data-plane processes per iteration
//! - [`protocol`] keeps both roles in lock-step over the control channel
//! - [`dataset`] stitches raw and intermediate timestamps into one CSV
//! - [`driver`] sequences all of the above for one experiment

pub mod clock;
pub mod config;
pub mod csv;
pub mod dataset;
pub mod driver;
pub mod error;
pub mod platform;
pub mod process;
pub mod protocol;
pub mod runner;
pub mod template;
pub mod trace;

pub use config::{ConfigDocument, ExperimentConfig, Iterations, PlatformKind, Role};
pub use driver::{Driver, DriverState, RunSummary};
pub use error::{ConfigError, ExperimentError, ExternalToolError, Result, TemplateError};
pub use platform::{LinuxPlatform, Platform, PlatformAddresses};
pub use process::{Invocation, SystemRunner, ToolRunner};
pub use protocol::{IterationOutcome, IterationReport, ListenerStage, TalkerStage};
pub use runner::SocketFamily;
