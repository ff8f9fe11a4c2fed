/// Errors that can occur on the control plane.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] tsnprobe_transport::TransportError),

    /// Frame-level error, including a corrupted frame marker.
    #[error("frame error: {0}")]
    Frame(#[from] tsnprobe_frame::FrameError),

    /// A message arrived outside its expected position or value.
    #[error("protocol violation: expected {expected}, got {got}")]
    ProtocolViolation { expected: String, got: String },

    /// Peer disconnected.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// A text payload was not valid UTF-8.
    #[error("invalid text payload: {0}")]
    InvalidText(#[from] std::str::Utf8Error),

    /// A factor is missing from a parameter row or does not parse.
    #[error("factor '{name}': {reason}")]
    Factor { name: String, reason: String },

    /// A trace row does not have one value per header column.
    #[error("trace row {row} has {found} values for {expected} columns")]
    RaggedTrace {
        row: usize,
        found: usize,
        expected: usize,
    },

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ControlError>;

impl ControlError {
    pub(crate) fn violation(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            expected: expected.into(),
            got: got.into(),
        }
    }
}
