//! External tool execution.
//!
//! Everything this crate does to the host goes through [`ToolRunner`]:
//! `ethtool`, `ip`, `tc`, `pmc`, `perf`, the data-plane tools and their
//! helpers. Tests substitute a recording fake.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::error::ExternalToolError;

type ToolResult<T> = std::result::Result<T, ExternalToolError>;

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build from a full argument vector. `None` if it is empty.
    pub fn from_argv(argv: Vec<String>) -> Option<Self> {
        let mut iter = argv.into_iter();
        let program = iter.next()?;
        Some(Self {
            program,
            args: iter.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured output of a completed command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Where a background process writes one of its output streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    Null,
    /// Append to a file, creating it if needed.
    Append(PathBuf),
    /// Truncate or create a file.
    Truncate(PathBuf),
}

impl OutputSink {
    fn open(&self) -> std::io::Result<Stdio> {
        Ok(match self {
            OutputSink::Null => Stdio::null(),
            OutputSink::Append(path) => Stdio::from(
                OpenOptions::new().create(true).append(true).open(path)?,
            ),
            OutputSink::Truncate(path) => Stdio::from(File::create(path)?),
        })
    }

    /// The file written, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            OutputSink::Append(path) | OutputSink::Truncate(path) => Some(path),
            OutputSink::Null => None,
        }
    }
}

/// Output routing for a background process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnIo {
    pub stdout: OutputSink,
    pub stderr: OutputSink,
}

impl SpawnIo {
    pub fn null() -> Self {
        Self {
            stdout: OutputSink::Null,
            stderr: OutputSink::Null,
        }
    }
}

/// Signals used to stop background processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// `SIGINT`; the listener data-plane tool flushes its output on it.
    Interrupt,
    /// `SIGTERM`.
    Terminate,
}

impl StopSignal {
    fn as_nix(self) -> Signal {
        match self {
            StopSignal::Interrupt => Signal::SIGINT,
            StopSignal::Terminate => Signal::SIGTERM,
        }
    }
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_nix().as_str())
    }
}

/// How a background process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exit {
    /// Exit code; `None` when killed by a signal.
    pub code: Option<i32>,
}

impl Exit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A child process running alongside the control logic.
pub trait BackgroundProcess: Send {
    /// Command line, for diagnostics.
    fn command(&self) -> &str;
    fn signal(&mut self, signal: StopSignal) -> ToolResult<()>;
    /// Block until the process exits.
    fn wait(&mut self) -> ToolResult<Exit>;
}

/// Send `signal`, then wait for the process to exit.
pub fn stop(process: &mut dyn BackgroundProcess, signal: StopSignal) -> ToolResult<Exit> {
    debug!(command = process.command(), %signal, "stopping background process");
    process.signal(signal)?;
    process.wait()
}

/// Runs external tools.
pub trait ToolRunner: Send + Sync {
    /// Run to completion, capturing output. A non-zero exit is an error.
    fn run(&self, invocation: &Invocation) -> ToolResult<ToolOutput>;

    /// Start in the background.
    fn spawn(&self, invocation: &Invocation, io: SpawnIo) -> ToolResult<Box<dyn BackgroundProcess>>;
}

/// Runs tools on the host with `std::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    fn command(invocation: &Invocation) -> Command {
        let mut command = Command::new(invocation.program());
        command.args(invocation.arguments()).stdin(Stdio::null());
        command
    }

    fn spawn_error(invocation: &Invocation, err: std::io::Error) -> ExternalToolError {
        let source = if err.kind() == ErrorKind::NotFound {
            std::io::Error::new(
                ErrorKind::NotFound,
                format!(
                    "{} not found; ensure it is installed and on PATH",
                    invocation.program()
                ),
            )
        } else {
            err
        };
        ExternalToolError::Spawn {
            command: invocation.to_string(),
            source,
        }
    }
}

impl ToolRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> ToolResult<ToolOutput> {
        debug!(command = %invocation, "run");
        let output = Self::command(invocation)
            .output()
            .map_err(|e| Self::spawn_error(invocation, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(ExternalToolError::Failed {
                command: invocation.to_string(),
                stderr,
                hint: None,
            });
        }
        Ok(ToolOutput { stdout, stderr })
    }

    fn spawn(&self, invocation: &Invocation, io: SpawnIo) -> ToolResult<Box<dyn BackgroundProcess>> {
        debug!(command = %invocation, "spawn");
        let open_error = |e| ExternalToolError::Spawn {
            command: invocation.to_string(),
            source: e,
        };
        let child = Self::command(invocation)
            .stdout(io.stdout.open().map_err(open_error)?)
            .stderr(io.stderr.open().map_err(open_error)?)
            .spawn()
            .map_err(|e| Self::spawn_error(invocation, e))?;

        Ok(Box::new(SystemProcess {
            child,
            command: invocation.to_string(),
            reaped: false,
        }))
    }
}

/// A child spawned by [`SystemRunner`]. Killed and reaped on drop if still
/// running.
pub struct SystemProcess {
    child: Child,
    command: String,
    reaped: bool,
}

impl BackgroundProcess for SystemProcess {
    fn command(&self) -> &str {
        &self.command
    }

    fn signal(&mut self, signal: StopSignal) -> ToolResult<()> {
        if self.reaped {
            return Ok(());
        }
        let pid = Pid::from_raw(self.child.id() as i32);
        match kill(pid, signal.as_nix()) {
            // Already exited, not yet reaped.
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(errno) => Err(ExternalToolError::Spawn {
                command: self.command.clone(),
                source: std::io::Error::from(errno),
            }),
        }
    }

    fn wait(&mut self) -> ToolResult<Exit> {
        let status = self.child.wait().map_err(|e| ExternalToolError::Spawn {
            command: self.command.clone(),
            source: e,
        })?;
        self.reaped = true;
        Ok(Exit {
            code: status.code(),
        })
    }
}

impl Drop for SystemProcess {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        warn!(command = %self.command, "killing leftover background process");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Locate `program` on `PATH`.
pub fn find_on_path(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        return path.is_file().then_some(path);
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
