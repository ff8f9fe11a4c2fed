//! Two-host latency experiments for Time-Sensitive Networking.
//!
//! One machine runs as the talker and transmits timestamped frames; the
//! other runs as the listener and records when they arrive. The two stay in
//! lock-step over a TCP control channel while the data plane runs.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP control connection with connect retry
//! - [`frame`]: marker and length-prefixed framing
//! - [`control`]: control tokens, setup exchange and payload messages
//! - [`experiment`]: configuration, platform preparation, runners, datasets

/// Re-export transport types.
pub mod transport {
    pub use tsnprobe_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use tsnprobe_frame::*;
}

/// Re-export control-plane types.
pub mod control {
    pub use tsnprobe_control::*;
}

/// Re-export experiment orchestration.
pub mod experiment {
    pub use tsnprobe_experiment::*;
}
