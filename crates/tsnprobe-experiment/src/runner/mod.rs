//! Data-plane process supervision for one iteration.
//!
//! A runner builds the `tsn-talker`/`tsn-listener` command line for a
//! parameter row, wraps it for real-time scheduling, CPU pinning and
//! optional `perf` capture, and manages the helper processes around it
//! (CPU stress and `iperf3` interference traffic).

mod command;
mod family;
mod listener;
mod talker;

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use tsnprobe_control::message::{PAYLOAD_SIZE, TRANSMISSION_INTERVAL};
use tsnprobe_control::Factors;

use crate::config::ExperimentConfig;
use crate::error::Result;
use crate::process::{stop, BackgroundProcess, Invocation, SpawnIo, StopSignal, ToolRunner};
use crate::trace::{filter_bindings, perf_record_prefix, PerfEvent};

pub use self::command::{CommandLine, FIFO_PRIORITY};
pub use self::family::{
    SocketFamily, XdpCopyMode, XdpMode, XdpSetup, LISTENER_BINARY, LISTENER_PERF_SCRIPT, TALKER_BINARY,
    TALKER_PERF_SCRIPT,
};
pub use self::listener::ListenerRunner;
pub use self::talker::TalkerRunner;

/// Appended talker stdout across iterations.
pub const OUTPUT_FILE: &str = "output_file.txt";
/// Appended data-plane stderr across iterations, both roles.
pub const ERRORS_FILE: &str = "errors_file.txt";
/// Listener receiver stdout for the current iteration.
pub const RAW_OUTPUT_FILE: &str = ".out_file";

/// Settings shared by both runners.
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerSettings {
    pub results_dir: PathBuf,
    /// Interface the data-plane tool binds to.
    pub interface: String,
    pub socket_family: SocketFamily,
    pub xdp: XdpSetup,
    /// Hardware queue for AF_XDP sockets.
    pub xdp_queue: Option<u32>,
    pub vlan_priority: Option<u32>,
    pub stress_cpus: bool,
    pub isolate_cpu: Option<u32>,
    pub intermediate_latency: bool,
    pub keep_perf_data: bool,
}

impl RunnerSettings {
    /// Settings for the role in `config`, writing into `results_dir`.
    pub fn from_config(config: &ExperimentConfig, interface: &str, results_dir: &Path) -> Self {
        let xdp_queue = match &config.talker {
            Some(talker) => talker.xdp_hw_queue,
            None => config.listener.tsn_hw_queue,
        };
        Self {
            results_dir: results_dir.to_path_buf(),
            interface: interface.to_string(),
            socket_family: config.socket_family,
            xdp: config.xdp,
            xdp_queue,
            vlan_priority: config.vlan_priority,
            stress_cpus: config.stress_cpus,
            isolate_cpu: config.isolate_cpu,
            intermediate_latency: config.intermediate_latency,
            keep_perf_data: config.keep_perf_data,
        }
    }

    fn results_file(&self, name: &str) -> PathBuf {
        self.results_dir.join(name)
    }

    /// `perf-<PayloadSize>-<TransmissionInterval>.data` in the results
    /// directory.
    fn capture_path(&self, factors: &Factors) -> Result<PathBuf> {
        Ok(self.results_dir.join(format!(
            "perf-{}-{}.data",
            factors.require(PAYLOAD_SIZE)?,
            factors.require(TRANSMISSION_INTERVAL)?
        )))
    }

    /// Pin and, with intermediate latency on, wrap in `perf record`.
    ///
    /// Returns the final invocation and the capture file, if any.
    fn wrap(
        &self,
        command: CommandLine,
        factors: &Factors,
        events: &[PerfEvent],
        phy_name: &str,
    ) -> Result<(Invocation, Option<PathBuf>)> {
        let command = command.pin(self.isolate_cpu);
        if !self.intermediate_latency || events.is_empty() {
            return Ok((command.into_invocation(), None));
        }
        let capture = self.capture_path(factors)?;
        let bindings = filter_bindings(factors.payload_size()?, factors.so_priority()?, phy_name);
        let prefix = perf_record_prefix(&capture, events, &bindings)?;
        Ok((command.prefix(prefix).into_invocation(), Some(capture)))
    }

    /// Delete a capture unless it is kept for inspection.
    fn discard_capture(&self, capture: &Path) {
        if self.keep_perf_data {
            return;
        }
        if let Err(err) = std::fs::remove_file(capture) {
            warn!(path = %capture.display(), error = %err, "could not remove perf capture");
        }
    }
}

/// `stress-ng` loading every CPU.
pub fn stress_invocation() -> Invocation {
    let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
    Invocation::new("stress-ng").args(["--cpu".to_string(), cpus.to_string(), "--cpu-method".into(), "loop".into()])
}

/// A helper process that may or may not be running.
#[derive(Default)]
struct Helper {
    process: Option<Box<dyn BackgroundProcess>>,
}

impl Helper {
    fn start(&mut self, runner: &dyn ToolRunner, invocation: &Invocation) -> Result<()> {
        debug!(command = %invocation, "starting helper");
        self.process = Some(runner.spawn(invocation, SpawnIo::null())?);
        Ok(())
    }

    /// SIGTERM and wait. No-op when nothing runs.
    fn stop(&mut self) -> Result<()> {
        if let Some(mut process) = self.process.take() {
            stop(process.as_mut(), StopSignal::Terminate)?;
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.process.is_some()
    }
}

/// Data-plane arguments for the AF_XDP socket family.
fn xdp_args(settings: &RunnerSettings, with_priority: bool) -> Result<Vec<String>> {
    let queue = settings.xdp_queue.ok_or_else(|| {
        crate::error::ConfigError::Unsupported("AF_XDP needs a hardware queue".to_string())
    })?;
    let mut args = vec!["-X".to_string(), queue.to_string()];
    if with_priority {
        let priority = settings.vlan_priority.ok_or_else(|| {
            crate::error::ConfigError::Unsupported("AF_XDP talker needs a VLAN priority".to_string())
        })?;
        args.extend(["-V".to_string(), priority.to_string()]);
    }
    args.extend(settings.xdp.flags());
    Ok(args)
}

/// Talker address used by the listener's `iperf3` client.
pub fn interference_client(talker: IpAddr) -> Invocation {
    Invocation::new("iperf3").args(["-c".to_string(), talker.to_string(), "-t".into(), "0".into(), "-R".into()])
}

/// `iperf3` server on the talker.
pub fn interference_server() -> Invocation {
    Invocation::new("iperf3").arg("-s")
}


#[cfg(test)]
mod tests {
    use super::testing::{factors, settings};
    use super::*;

    #[test]
    fn wrap_without_tracing_only_pins() {
        let mut s = settings(Path::new("/r"));
        s.isolate_cpu = Some(2);
        let cmd = CommandLine::realtime(LISTENER_BINARY, ["-i", "tsn_vlan"]);
        let (inv, capture) = s
            .wrap(cmd, &factors("64", "1000"), &SocketFamily::AfPacket.talker_events().unwrap(), "enp1s0")
            .unwrap();
        assert_eq!(inv.to_string(), "taskset -c 2 chrt --fifo 98 tsn-listener -i tsn_vlan");
        assert!(capture.is_none());
    }

    #[test]
    fn wrap_with_tracing_prefixes_perf() {
        let mut s = settings(Path::new("/r"));
        s.intermediate_latency = true;
        let cmd = CommandLine::realtime(TALKER_BINARY, ["-i", "tsn_vlan"]);
        let (inv, capture) = s
            .wrap(cmd, &factors("64", "1000"), &SocketFamily::AfPacket.talker_events().unwrap(), "enp1s0")
            .unwrap();
        assert_eq!(capture, Some(PathBuf::from("/r/perf-64-1000.data")));
        assert_eq!(inv.program(), "perf");
        assert!(inv.to_string().ends_with("chrt --fifo 98 tsn-talker -i tsn_vlan"));
    }

    #[test]
    fn xdp_talker_args() {
        let mut s = settings(Path::new("/r"));
        s.xdp_queue = Some(2);
        assert_eq!(xdp_args(&s, true).unwrap(), ["-X", "2", "-V", "3", "-w", "-N", "-Z"]);
        assert_eq!(xdp_args(&s, false).unwrap(), ["-X", "2", "-w", "-N", "-Z"]);
        s.xdp_queue = None;
        assert!(xdp_args(&s, false).is_err());
    }

    #[test]
    fn helper_commands() {
        assert_eq!(
            interference_client("169.254.10.10".parse().unwrap()).to_string(),
            "iperf3 -c 169.254.10.10 -t 0 -R"
        );
        assert!(stress_invocation().to_string().starts_with("stress-ng --cpu "));
        assert!(stress_invocation().to_string().ends_with(" --cpu-method loop"));
    }
}
