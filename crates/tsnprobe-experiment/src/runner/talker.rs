use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use tsnprobe_control::{Factors, IntermediateTrace};

use super::{
    interference_server, stress_invocation, xdp_args, CommandLine, Helper, RunnerSettings, SocketFamily,
    ERRORS_FILE, OUTPUT_FILE, TALKER_BINARY,
};
use crate::clock::{drifted, OffsetClock};
use crate::config::Iterations;
use crate::error::{ExperimentError, Result};
use crate::process::{BackgroundProcess, OutputSink, SpawnIo, ToolRunner};
use crate::protocol::TalkerStage;
use crate::trace::TraceExtractor;

/// State of the iteration in flight.
struct Transmission {
    offset: i64,
    transmitter: Box<dyn BackgroundProcess>,
    capture: Option<PathBuf>,
}

/// Runs `tsn-talker` once per parameter row.
pub struct TalkerRunner {
    runner: Arc<dyn ToolRunner>,
    clock: Box<dyn OffsetClock>,
    extractor: Box<dyn TraceExtractor>,
    settings: RunnerSettings,
    destination: String,
    iterations: Iterations,
    network_interference: bool,
    stress: Helper,
    interference: Helper,
    current: Option<Transmission>,
    pending_trace: Option<(i64, PathBuf)>,
}

impl TalkerRunner {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        clock: Box<dyn OffsetClock>,
        extractor: Box<dyn TraceExtractor>,
        settings: RunnerSettings,
        destination: impl Into<String>,
        iterations: Iterations,
        network_interference: bool,
    ) -> Self {
        Self {
            runner,
            clock,
            extractor,
            settings,
            destination: destination.into(),
            iterations,
            network_interference,
            stress: Helper::default(),
            interference: Helper::default(),
            current: None,
            pending_trace: None,
        }
    }

    /// Command line for one row, before pinning and tracing.
    fn command(&self, factors: &Factors, packets: u64) -> Result<CommandLine> {
        let mut command = CommandLine::realtime(
            TALKER_BINARY,
            [
                "-i".to_string(),
                self.settings.interface.clone(),
                "-d".into(),
                self.destination.clone(),
                "-n".into(),
                packets.to_string(),
                "-p".into(),
                factors.require(tsnprobe_control::message::SO_PRIORITY)?.to_string(),
                "-s".into(),
                factors.require(tsnprobe_control::message::PAYLOAD_SIZE)?.to_string(),
                "-D".into(),
                factors
                    .require(tsnprobe_control::message::TRANSMISSION_INTERVAL)?
                    .to_string(),
            ],
        );
        if self.settings.socket_family == SocketFamily::AfXdp {
            command.push_args(xdp_args(&self.settings, true)?);
        }
        Ok(command)
    }

    fn phy_name(&self) -> Result<String> {
        crate::platform::tools::physical_interface(self.runner.as_ref(), &self.settings.interface)
    }
}

impl TalkerStage for TalkerRunner {
    fn start(&mut self, factors: &Factors) -> Result<bool> {
        let offset = self.clock.tai_offset()?;

        if self.settings.stress_cpus {
            self.stress.start(self.runner.as_ref(), &stress_invocation())?;
        }
        if self.network_interference {
            self.interference.start(self.runner.as_ref(), &interference_server())?;
        }

        let packets = self.iterations.packets(factors.transmission_interval()?);
        let command = self.command(factors, packets)?;
        let events = self.settings.socket_family.talker_events()?;
        let phy = if self.settings.intermediate_latency {
            self.phy_name()?
        } else {
            self.settings.interface.clone()
        };
        let (invocation, capture) = self.settings.wrap(command, factors, &events, &phy)?;

        info!(
            packets,
            payload_size = factors.get(tsnprobe_control::message::PAYLOAD_SIZE),
            interval = factors.get(tsnprobe_control::message::TRANSMISSION_INTERVAL),
            tai_offset = offset,
            "commencing talker run"
        );
        let io = SpawnIo {
            stdout: OutputSink::Append(self.settings.results_file(OUTPUT_FILE)),
            stderr: OutputSink::Append(self.settings.results_file(ERRORS_FILE)),
        };
        let transmitter = self.runner.spawn(&invocation, io)?;
        self.current = Some(Transmission {
            offset,
            transmitter,
            capture,
        });
        Ok(self.interference.is_running())
    }

    fn wait(&mut self) -> Result<bool> {
        let mut run = self
            .current
            .take()
            .ok_or_else(|| ExperimentError::Platform("no transmitter running".to_string()))?;
        let exit = run.transmitter.wait()?;
        if !exit.success() {
            warn!(code = ?exit.code, command = run.transmitter.command(), "transmitter exited unsuccessfully");
        }
        info!("talker run complete");

        self.interference.stop()?;
        self.stress.stop()?;
        let suspect = drifted(self.clock.as_ref(), run.offset)?;
        self.pending_trace = run.capture.take().map(|capture| (run.offset, capture));
        Ok(suspect)
    }

    fn trace(&mut self) -> Result<Option<IntermediateTrace>> {
        let Some((offset, capture)) = self.pending_trace.take() else {
            return Ok(None);
        };
        let trace = self.extractor.extract(&self.settings.interface, offset, &capture);
        self.settings.discard_capture(&capture);
        trace.map(Some)
    }
}
