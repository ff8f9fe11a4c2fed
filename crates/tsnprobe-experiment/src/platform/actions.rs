use std::fmt;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::process::{stop, BackgroundProcess, Invocation, StopSignal, ToolRunner};

/// How to reverse one setup step.
pub enum Undo {
    /// Run a command.
    Command(Invocation),
    /// Restore a file's previous contents.
    WriteFile { path: PathBuf, contents: String },
    /// Terminate a daemon started during setup.
    Stop(Box<dyn BackgroundProcess>),
}

impl fmt::Debug for Undo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Undo::Command(inv) => f.debug_tuple("Command").field(&inv.to_string()).finish(),
            Undo::WriteFile { path, contents } => f
                .debug_struct("WriteFile")
                .field("path", path)
                .field("contents", contents)
                .finish(),
            Undo::Stop(process) => f.debug_tuple("Stop").field(&process.command()).finish(),
        }
    }
}

/// A completed setup step and its reversal.
#[derive(Debug)]
pub struct ReversibleAction {
    pub description: String,
    pub undo: Undo,
}

/// Setup steps recorded in acquisition order, released in reverse.
#[derive(Debug, Default)]
pub struct ActionStack {
    actions: Vec<ReversibleAction>,
}

impl ActionStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step that has already taken effect.
    pub fn push(&mut self, description: impl Into<String>, undo: Undo) {
        let description = description.into();
        debug!(%description, "recorded reversible action");
        self.actions.push(ReversibleAction { description, undo });
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Descriptions in acquisition order.
    pub fn descriptions(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.description.as_str()).collect()
    }

    /// Release every recorded step, newest first.
    ///
    /// Failures are logged and skipped. The stack is empty afterwards, so a
    /// second call is a no-op. Returns how many steps were attempted.
    pub fn unwind(&mut self, runner: &dyn ToolRunner) -> usize {
        let mut released = 0;
        while let Some(action) = self.actions.pop() {
            released += 1;
            debug!(description = %action.description, "undoing");
            let outcome = match action.undo {
                Undo::Command(invocation) => runner.run(&invocation).map(|_| ()).map_err(|e| e.to_string()),
                Undo::WriteFile { path, contents } => {
                    std::fs::write(&path, contents).map_err(|e| format!("{}: {e}", path.display()))
                }
                Undo::Stop(mut process) => stop(process.as_mut(), StopSignal::Terminate)
                    .map(|_| ())
                    .map_err(|e| e.to_string()),
            };
            if let Err(error) = outcome {
                warn!(description = %action.description, %error, "teardown step failed");
            }
        }
        released
    }
}
