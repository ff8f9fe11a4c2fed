use std::fmt;
use std::io;

use tsnprobe_control::ControlError;
use tsnprobe_experiment::{ConfigError, ExperimentError};
use tsnprobe_frame::FrameError;
use tsnprobe_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const HEALTH_CHECK_FAILED: i32 = 30;
pub const PERMISSION_DENIED: i32 = 50;
/// Invalid configuration, profile or dataset, and control protocol
/// violations.
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { ref source, .. } | TransportError::Connect { ref source, .. }
            if source.kind() == io::ErrorKind::PermissionDenied =>
        {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        FrameError::InvalidMarker { .. } | FrameError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}

pub fn control_error(context: &str, err: ControlError) -> CliError {
    match err {
        ControlError::Transport(err) => transport_error(context, err),
        ControlError::Frame(err) => frame_error(context, err),
        ControlError::Disconnected(_) => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        ControlError::ProtocolViolation { .. }
        | ControlError::InvalidText(_)
        | ControlError::Factor { .. }
        | ControlError::RaggedTrace { .. }
        | ControlError::Json(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
    }
}

pub fn config_error(context: &str, err: ConfigError) -> CliError {
    match err {
        ConfigError::Read { ref source, .. } if source.kind() == io::ErrorKind::PermissionDenied => {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn experiment_error(context: &str, err: ExperimentError) -> CliError {
    match err {
        ExperimentError::Config(err) => config_error(context, err),
        ExperimentError::Control(err) => control_error(context, err),
        ExperimentError::Io { source, .. } if source.kind() == io::ErrorKind::PermissionDenied => {
            CliError::new(PERMISSION_DENIED, format!("{context}: {source}"))
        }
        ExperimentError::Template(_) | ExperimentError::Dataset { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        ExperimentError::Tool(_) | ExperimentError::Clock(_) | ExperimentError::Platform(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_violation_is_data_invalid() {
        let err = ControlError::ProtocolViolation {
            expected: "STOP_LISTENER".into(),
            got: "START_TALKER".into(),
        };
        assert_eq!(experiment_error("run", err.into()).code, DATA_INVALID);
    }

    #[test]
    fn refused_connection_is_transport() {
        let err = TransportError::Connect {
            addr: "127.0.0.1:2000".parse().unwrap(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(control_error("connect", err.into()).code, TRANSPORT_ERROR);
    }

    #[test]
    fn missing_key_is_data_invalid() {
        let err = ConfigError::Missing {
            path: vec!["General Setup".into(), "Mode".into()],
        };
        let cli = experiment_error("config", err.into());
        assert_eq!(cli.code, DATA_INVALID);
        assert!(cli.message.contains("Mode"));
    }

    #[test]
    fn tool_failure_is_generic_failure() {
        let err = tsnprobe_experiment::ExternalToolError::Failed {
            command: "ethtool -K enp1s0 tso off".into(),
            stderr: "no such device".into(),
            hint: None,
        };
        assert_eq!(experiment_error("setup", err.into()).code, FAILURE);
    }

    #[test]
    fn permission_denied_io() {
        let err = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(io_error("results", err).code, PERMISSION_DENIED);
    }
}
