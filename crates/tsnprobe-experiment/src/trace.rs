//! Intermediate timestamp capture with `perf`.
//!
//! The data-plane command is wrapped in `perf record` with a role-specific
//! event list. After the run, `perf script` with a helper script turns the
//! capture into one CSV row of sub-event timestamps per packet.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use tsnprobe_control::IntermediateTrace;

use crate::error::{ExperimentError, Result, TemplateError};
use crate::platform::tools::physical_interface;
use crate::platform::VLAN_ID;
use crate::process::{Invocation, ToolRunner};
use crate::template::{Bindings, Placeholder, Template};

/// Ethernet plus VLAN header bytes on top of the payload.
pub const FRAME_OVERHEAD: u32 = 18;

/// A tracepoint with an optional filter template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerfEvent {
    name: String,
    filter: Option<Template>,
}

impl PerfEvent {
    pub fn filtered(name: &str, filter: Template) -> Self {
        Self {
            name: name.to_string(),
            filter: Some(filter),
        }
    }

    pub fn unfiltered(name: &str) -> Self {
        Self {
            name: name.to_string(),
            filter: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filter(&self) -> Option<&Template> {
        self.filter.as_ref()
    }
}

/// VLAN TCI carried by frames sent with socket priority `so_priority`.
pub fn vlan_tci(so_priority: u32) -> u32 {
    ((so_priority & 0x3) << 13) | u32::from(VLAN_ID)
}

/// Values for perf filter placeholders.
pub fn filter_bindings(payload_size: u32, so_priority: u32, phy_name: &str) -> Bindings {
    Bindings::new()
        .with(Placeholder::PayloadLen, payload_size.saturating_add(FRAME_OVERHEAD))
        .with(Placeholder::PhyName, phy_name)
        .with(Placeholder::VlanTci, vlan_tci(so_priority))
}

/// `perf record` arguments placed in front of the traced command.
///
/// `--mmap-pages 128M` keeps perf from dropping events at high packet rates.
pub fn perf_record_prefix(
    capture: &Path,
    events: &[PerfEvent],
    bindings: &Bindings,
) -> std::result::Result<Vec<String>, TemplateError> {
    let mut argv: Vec<String> = [
        "perf",
        "record",
        "-a",
        "--mmap-pages",
        "128M",
        "-k",
        "CLOCK_MONOTONIC",
        "-o",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    argv.push(capture.display().to_string());

    for event in events {
        argv.push("-e".to_string());
        argv.push(event.name.clone());
        if let Some(filter) = &event.filter {
            argv.push("--filter".to_string());
            argv.push(filter.render(bindings)?);
        }
    }
    Ok(argv)
}

/// Turns a capture into an [`IntermediateTrace`].
pub trait TraceExtractor: Send {
    /// `interface` is the data-plane interface; `offset` the TAI-monotonic
    /// offset sampled at iteration start.
    fn extract(&self, interface: &str, offset: i64, capture: &Path) -> Result<IntermediateTrace>;
}

/// Runs `perf script -s <script>` and reads back its CSV.
///
/// Unless a scratch path is given, the script writes into a fresh private
/// temporary directory per extraction.
pub struct PerfScriptExtractor {
    runner: Arc<dyn ToolRunner>,
    script: PathBuf,
    scratch: Option<PathBuf>,
}

impl PerfScriptExtractor {
    pub fn new(runner: Arc<dyn ToolRunner>, script: PathBuf) -> Self {
        Self {
            runner,
            script,
            scratch: None,
        }
    }

    /// Use an explicit scratch file for the script output.
    pub fn with_scratch(runner: Arc<dyn ToolRunner>, script: PathBuf, scratch: PathBuf) -> Self {
        Self {
            runner,
            script,
            scratch: Some(scratch),
        }
    }

    fn run_script(&self, phy: &str, offset: i64, capture: &Path, output: &Path) -> Result<IntermediateTrace> {
        let invocation = Invocation::new("perf")
            .args(["script", "-i"])
            .arg(capture.display().to_string())
            .arg("-s")
            .arg(self.script.display().to_string())
            .arg(output.display().to_string())
            .arg(phy)
            .arg(offset.to_string());
        debug!(command = %invocation, "extracting intermediate timestamps");
        self.runner.run(&invocation)?;
        read_trace(output)
    }
}

impl TraceExtractor for PerfScriptExtractor {
    fn extract(&self, interface: &str, offset: i64, capture: &Path) -> Result<IntermediateTrace> {
        let phy = physical_interface(self.runner.as_ref(), interface)?;
        let trace = match &self.scratch {
            Some(scratch) => {
                let trace = self.run_script(&phy, offset, capture, scratch);
                if let Err(err) = std::fs::remove_file(scratch) {
                    warn!(path = %scratch.display(), error = %err, "could not remove trace output");
                }
                trace?
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("tsnprobe-trace-")
                    .tempdir()
                    .map_err(|e| ExperimentError::io("creating trace scratch directory", e))?;
                let trace = self.run_script(&phy, offset, capture, &dir.path().join("trace.csv"));
                let path = dir.path().to_path_buf();
                if let Err(err) = dir.close() {
                    warn!(path = %path.display(), error = %err, "could not remove trace output");
                }
                trace?
            }
        };
        info!(
            columns = trace.width(),
            rows = trace.len(),
            "intermediate timestamps extracted"
        );
        Ok(trace)
    }
}

/// Read a perf script CSV: header row, then one row per packet.
pub fn read_trace(path: &Path) -> Result<IntermediateTrace> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ExperimentError::io(format!("reading {}", path.display()), e))?;
    let invalid = |reason: String| ExperimentError::Dataset {
        path: path.to_path_buf(),
        reason,
    };
    let mut records = crate::csv::parse(&text).map_err(invalid)?.into_iter();
    let header = records.next().unwrap_or_default();
    IntermediateTrace::new(header, records.collect()).map_err(|err| invalid(err.to_string()))
}
