use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use tsnprobe_control::message::{PAYLOAD_SIZE, TRANSMISSION_INTERVAL};
use tsnprobe_control::{Factors, IntermediateTrace};

use super::{
    interference_client, stress_invocation, xdp_args, CommandLine, Helper, RunnerSettings, SocketFamily,
    ERRORS_FILE, LISTENER_BINARY, RAW_OUTPUT_FILE,
};
use crate::clock::{drifted, OffsetClock};
use crate::dataset;
use crate::error::{ExperimentError, Result};
use crate::process::{stop, BackgroundProcess, OutputSink, SpawnIo, StopSignal, ToolRunner};
use crate::protocol::{IterationOutcome, ListenerStage};
use crate::trace::TraceExtractor;

/// State of the iteration in flight.
struct Reception {
    offset: i64,
    receiver: Option<Box<dyn BackgroundProcess>>,
    capture: Option<PathBuf>,
}

/// Runs `tsn-listener` once per parameter row and writes its results file.
pub struct ListenerRunner {
    runner: Arc<dyn ToolRunner>,
    clock: Box<dyn OffsetClock>,
    extractor: Box<dyn TraceExtractor>,
    settings: RunnerSettings,
    talker_address: IpAddr,
    irq_name: String,
    settle: Duration,
    stress: Helper,
    interference: Helper,
    current: Option<Reception>,
}

impl ListenerRunner {
    /// `irq_name` is the receive interrupt name prefix used by the perf
    /// filters; `settle` the wait after launching the receiver.
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        clock: Box<dyn OffsetClock>,
        extractor: Box<dyn TraceExtractor>,
        settings: RunnerSettings,
        talker_address: IpAddr,
        irq_name: impl Into<String>,
        settle: Duration,
    ) -> Self {
        Self {
            runner,
            clock,
            extractor,
            settings,
            talker_address,
            irq_name: irq_name.into(),
            settle,
            stress: Helper::default(),
            interference: Helper::default(),
            current: None,
        }
    }

    fn command(&self, factors: &Factors) -> Result<CommandLine> {
        let mut command = CommandLine::realtime(
            LISTENER_BINARY,
            [
                "-i".to_string(),
                self.settings.interface.clone(),
                "-s".into(),
                factors.require(PAYLOAD_SIZE)?.to_string(),
            ],
        );
        if self.settings.socket_family == SocketFamily::AfXdp {
            command.push_args(xdp_args(&self.settings, false)?);
        }
        Ok(command)
    }

    fn raw_output(&self) -> PathBuf {
        self.settings.results_file(RAW_OUTPUT_FILE)
    }

    fn in_flight(&mut self) -> Result<&mut Reception> {
        self.current
            .as_mut()
            .ok_or_else(|| ExperimentError::Platform("no receiver running".to_string()))
    }
}

impl ListenerStage for ListenerRunner {
    fn prepare(&mut self, factors: &Factors) -> Result<()> {
        if self.settings.stress_cpus {
            self.stress.start(self.runner.as_ref(), &stress_invocation())?;
        }

        let command = self.command(factors)?;
        let events = self.settings.socket_family.listener_events(&self.irq_name)?;
        let phy = if self.settings.intermediate_latency {
            crate::platform::tools::physical_interface(self.runner.as_ref(), &self.settings.interface)?
        } else {
            self.settings.interface.clone()
        };
        let (invocation, capture) = self.settings.wrap(command, factors, &events, &phy)?;

        let io = SpawnIo {
            stdout: OutputSink::Truncate(self.raw_output()),
            stderr: OutputSink::Append(self.settings.results_file(ERRORS_FILE)),
        };
        let receiver = self.runner.spawn(&invocation, io)?;

        // Enabling receive timestamping resets the NIC and disrupts ptp4l.
        debug!(settle = ?self.settle, "waiting for ptp4l to recover");
        std::thread::sleep(self.settle);

        let offset = self.clock.tai_offset()?;
        info!(
            payload_size = factors.get(PAYLOAD_SIZE),
            interval = factors.get(TRANSMISSION_INTERVAL),
            tai_offset = offset,
            "commencing listener run"
        );
        self.current = Some(Reception {
            offset,
            receiver: Some(receiver),
            capture,
        });
        Ok(())
    }

    fn start_interference(&mut self) -> Result<()> {
        self.interference
            .start(self.runner.as_ref(), &interference_client(self.talker_address))
    }

    fn stop(&mut self) -> Result<()> {
        self.interference.stop()?;
        self.stress.stop()?;

        let reception = self.in_flight()?;
        if let Some(mut receiver) = reception.receiver.take() {
            let exit = stop(receiver.as_mut(), StopSignal::Interrupt)?;
            debug!(code = ?exit.code, "receiver stopped");
        }
        info!("listener run complete");
        Ok(())
    }

    fn finish(&mut self, factors: &Factors, talker_trace: Option<IntermediateTrace>) -> Result<IterationOutcome> {
        let reception = self
            .current
            .take()
            .ok_or_else(|| ExperimentError::Platform("no receiver running".to_string()))?;
        if reception.receiver.is_some() {
            warn!("finishing an iteration whose receiver was never stopped");
        }

        let mut suspect = false;
        let mut listener_trace = None;
        if let Some(capture) = &reception.capture {
            suspect = drifted(self.clock.as_ref(), reception.offset)?;
            let trace = self
                .extractor
                .extract(&self.settings.interface, reception.offset, capture);
            self.settings.discard_capture(capture);
            listener_trace = Some(trace?);
        }

        let results = dataset::persist(
            &self.raw_output(),
            &self.settings.results_dir,
            factors,
            talker_trace.as_ref(),
            listener_trace.as_ref(),
        )?;
        Ok(IterationOutcome {
            suspect,
            results_file: Some(results),
        })
    }
}
