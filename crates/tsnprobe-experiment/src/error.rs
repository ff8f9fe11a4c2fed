use std::path::PathBuf;

/// Errors raised while running one side of an experiment.
#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    /// Configuration is missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Control channel failure, including protocol violations.
    #[error("control channel: {0}")]
    Control(#[from] tsnprobe_control::ControlError),

    /// An external tool failed.
    #[error(transparent)]
    Tool(#[from] ExternalToolError),

    /// A command template could not be parsed or rendered.
    #[error("template: {0}")]
    Template(#[from] TemplateError),

    /// A dataset file is malformed.
    #[error("dataset {}: {reason}", .path.display())]
    Dataset { path: PathBuf, reason: String },

    /// The CLOCK_TAI offset could not be read.
    #[error("clock offset: {0}")]
    Clock(String),

    /// Platform state does not match what setup expects.
    #[error("platform: {0}")]
    Platform(String),

    /// Filesystem or process I/O failure.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ExperimentError>;

impl ExperimentError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<tsnprobe_transport::TransportError> for ExperimentError {
    fn from(err: tsnprobe_transport::TransportError) -> Self {
        Self::Control(err.into())
    }
}

/// Configuration errors. All of them surface before any network activity.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required key is absent.
    #[error("the parameter\n{}is missing from the configuration file", render_key_path(.path))]
    Missing { path: Vec<String> },

    /// A value is outside its accepted set or has the wrong type.
    #[error("invalid value {value} for\n{}expected {expected}", render_key_path(.path))]
    Invalid {
        path: Vec<String>,
        value: String,
        expected: String,
    },

    /// A valid combination of settings this tool does not support.
    #[error("unsupported configuration: {0}")]
    Unsupported(String),

    /// The configuration file could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON.
    #[error("cannot parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An experiment profile CSV is unusable.
    #[error("experiment profile {}: {reason}", .path.display())]
    Profile { path: PathBuf, reason: String },
}

impl ConfigError {
    pub(crate) fn missing(path: &[&str]) -> Self {
        Self::Missing {
            path: path.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub(crate) fn invalid(path: &[&str], value: impl ToString, expected: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.iter().map(|s| s.to_string()).collect(),
            value: value.to_string(),
            expected: expected.into(),
        }
    }
}

/// One key per line, indented two spaces per nesting level.
pub fn render_key_path(path: &[String]) -> String {
    let mut out = String::new();
    for (depth, key) in path.iter().enumerate() {
        out.push_str(&" ".repeat(depth * 2));
        out.push_str(key);
        out.push_str(":\n");
    }
    out
}

/// An external command failed or misbehaved.
#[derive(Debug, thiserror::Error)]
pub enum ExternalToolError {
    /// The command ran and exited unsuccessfully.
    #[error("command `{command}` failed: {}{}", .stderr.trim(), render_hint(.hint))]
    Failed {
        command: String,
        stderr: String,
        hint: Option<String>,
    },

    /// The command could not be started.
    #[error("cannot start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command succeeded but its output could not be interpreted.
    #[error("unexpected output from `{command}`: {reason}")]
    UnexpectedOutput { command: String, reason: String },
}

impl ExternalToolError {
    /// Attach the most likely cause of a failure.
    pub fn with_hint(self, hint: impl Into<String>) -> Self {
        match self {
            ExternalToolError::Failed {
                command, stderr, ..
            } => ExternalToolError::Failed {
                command,
                stderr,
                hint: Some(hint.into()),
            },
            other => other,
        }
    }

    /// Whether the tool failed with `needle` in its stderr.
    pub fn stderr_contains(&self, needle: &str) -> bool {
        matches!(self, ExternalToolError::Failed { stderr, .. } if stderr.contains(needle))
    }
}

fn render_hint(hint: &Option<String>) -> String {
    match hint {
        Some(hint) => format!("\nmost likely cause: {hint}"),
        None => String::new(),
    }
}

/// Template parse and render errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    /// `$name` does not name a known placeholder.
    #[error("unknown placeholder ${name} in '{template}'")]
    UnknownPlaceholder { name: String, template: String },

    /// A known placeholder has no value bound for rendering.
    #[error("no value for ${name} in '{template}'")]
    Unbound { name: String, template: String },
}
