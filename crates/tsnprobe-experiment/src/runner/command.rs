use std::fmt;

use crate::process::Invocation;

/// Real-time priority for the data-plane tools.
pub const FIFO_PRIORITY: u32 = 98;

/// A data-plane command line, built from the inside out.
///
/// ```text
/// [perf record ...] [taskset -c <core>] chrt --fifo 98 <binary> <args>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    argv: Vec<String>,
}

impl CommandLine {
    /// `binary` under `SCHED_FIFO`.
    pub fn realtime<I, S>(binary: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv: Vec<String> = vec![
            "chrt".into(),
            "--fifo".into(),
            FIFO_PRIORITY.to_string(),
            binary.into(),
        ];
        argv.extend(args.into_iter().map(Into::into));
        Self { argv }
    }

    /// Append arguments to the innermost command.
    pub fn push_args<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
    }

    /// Put `prefix` in front of everything built so far.
    pub fn prefix(mut self, prefix: Vec<String>) -> Self {
        let mut argv = prefix;
        argv.append(&mut self.argv);
        self.argv = argv;
        self
    }

    /// Pin to one CPU with `taskset` when `core` is set.
    pub fn pin(self, core: Option<u32>) -> Self {
        match core {
            Some(core) => self.prefix(vec!["taskset".into(), "-c".into(), core.to_string()]),
            None => self,
        }
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn into_invocation(self) -> Invocation {
        let mut argv = self.argv.into_iter();
        let program = argv.next().unwrap_or_default();
        Invocation::new(program).args(argv)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))
    }
}
