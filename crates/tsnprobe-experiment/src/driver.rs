//! One experiment, start to finish, for one role.
//!
//! ```text
//! Uninitialized -> PlatformReady -> ChannelConnected -> IterationsRunning
//!               -> ChannelDisconnected -> PlatformReleased
//! ```
//!
//! Platform release runs on every exit path, including setup and
//! connection failures.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, warn};
use tsnprobe_control::{
    connect, receive_setup, send_setup, ControlListener, ExperimentParameters, TcpControlChannel,
};
use tsnprobe_transport::RetryPolicy;

use crate::clock::TimerListClock;
use crate::config::{ExperimentConfig, Role, TalkerSettings};
use crate::error::{ExperimentError, Result};
use crate::platform::Platform;
use crate::process::{Invocation, ToolRunner};
use crate::protocol::{self, IterationReport};
use crate::runner::{
    ListenerRunner, RunnerSettings, TalkerRunner, LISTENER_PERF_SCRIPT, TALKER_PERF_SCRIPT,
};
use crate::trace::PerfScriptExtractor;

/// Written into the results directory when system log collection is on.
pub const SYSTEM_LOG_FILE: &str = "system_log.txt";

const DEFAULT_TIMER_LIST: &str = "/proc/timer_list";

/// Where a [`Driver`] is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Uninitialized,
    PlatformReady,
    ChannelConnected,
    IterationsRunning,
    ChannelDisconnected,
    PlatformReleased,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DriverState::Uninitialized => "uninitialized",
            DriverState::PlatformReady => "platform-ready",
            DriverState::ChannelConnected => "channel-connected",
            DriverState::IterationsRunning => "iterations-running",
            DriverState::ChannelDisconnected => "channel-disconnected",
            DriverState::PlatformReleased => "platform-released",
        })
    }
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub role: Role,
    pub iterations: Vec<IterationReport>,
    pub results_dir: PathBuf,
    /// `system_log.txt`, when collected.
    pub system_log: Option<PathBuf>,
}

impl RunSummary {
    /// Iterations whose clock offset moved.
    pub fn suspect(&self) -> usize {
        self.iterations.iter().filter(|r| r.outcome.suspect).count()
    }
}

/// Runs one experiment for the role in its configuration.
///
/// Single-shot: [`run`](Driver::run) consumes the driver.
pub struct Driver<P: Platform> {
    config: ExperimentConfig,
    platform: P,
    runner: Arc<dyn ToolRunner>,
    results_dir: PathBuf,
    retry: RetryPolicy,
    perf_scripts: PathBuf,
    timer_list: PathBuf,
    state: DriverState,
}

impl<P: Platform> Driver<P> {
    pub fn new(config: ExperimentConfig, platform: P, runner: Arc<dyn ToolRunner>, results_dir: &Path) -> Self {
        Self {
            config,
            platform,
            runner,
            results_dir: results_dir.to_path_buf(),
            retry: RetryPolicy::default(),
            perf_scripts: PathBuf::from("."),
            timer_list: PathBuf::from(DEFAULT_TIMER_LIST),
            state: DriverState::Uninitialized,
        }
    }

    /// Control connection retry policy for the talker.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Directory holding the perf post-processing scripts.
    pub fn with_perf_scripts(mut self, dir: impl Into<PathBuf>) -> Self {
        self.perf_scripts = dir.into();
        self
    }

    /// Source of the TAI-monotonic clock offset.
    pub fn with_timer_list(mut self, path: impl Into<PathBuf>) -> Self {
        self.timer_list = path.into();
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Run every iteration, then release the platform whatever happened.
    pub fn run(mut self) -> Result<RunSummary> {
        let started = SystemTime::now();
        info!(role = %self.config.role, results = %self.results_dir.display(), "starting experiment");

        let outcome = self.execute();
        if let Err(err) = &outcome {
            error!(state = %self.state, error = %err, "experiment aborted");
        }

        self.platform.teardown();
        self.advance(DriverState::PlatformReleased);

        let system_log = if self.config.collect_system_log {
            self.collect_system_log(started)
        } else {
            None
        };

        let iterations = outcome?;
        let summary = RunSummary {
            role: self.config.role,
            iterations,
            results_dir: self.results_dir.clone(),
            system_log,
        };
        info!(
            iterations = summary.iterations.len(),
            suspect = summary.suspect(),
            "experiment complete"
        );
        Ok(summary)
    }

    fn execute(&mut self) -> Result<Vec<IterationReport>> {
        // The profile is read before touching the host so a bad profile
        // leaves nothing to undo.
        let talker = match self.config.role {
            Role::Talker => {
                let settings = self.config.talker.clone().ok_or_else(|| {
                    ExperimentError::Platform("talker role without talker settings".to_string())
                })?;
                Some((settings, self.config.load_parameters()?))
            }
            Role::Listener => None,
        };

        self.platform.setup()?;
        self.advance(DriverState::PlatformReady);

        match talker {
            Some((settings, parameters)) => self.run_talker(&settings, &parameters),
            None => self.run_listener(),
        }
    }

    fn run_talker(&mut self, settings: &TalkerSettings, parameters: &ExperimentParameters) -> Result<Vec<IterationReport>> {
        let addr = SocketAddr::new(self.platform.listener_address(), self.platform.control_port());
        info!(%addr, "connecting to listener");
        let mut channel = connect(addr, self.retry)?;
        self.advance(DriverState::ChannelConnected);

        send_setup(&mut channel, parameters, &self.config.destination)?;

        let mut stage = TalkerRunner::new(
            self.runner.clone(),
            Box::new(TimerListClock::with_path(&self.timer_list)),
            Box::new(PerfScriptExtractor::new(
                self.runner.clone(),
                self.perf_scripts.join(TALKER_PERF_SCRIPT),
            )),
            self.runner_settings(),
            self.config.destination.clone(),
            settings.iterations,
            settings.network_interference,
        );

        self.advance(DriverState::IterationsRunning);
        let reports = protocol::run_talker(&mut channel, parameters, &mut stage)?;
        protocol::finish_talker(&mut channel)?;
        self.disconnect(channel)?;
        Ok(reports)
    }

    fn run_listener(&mut self) -> Result<Vec<IterationReport>> {
        let addr = SocketAddr::new(self.platform.listener_address(), self.platform.control_port());
        let listener = ControlListener::bind(addr)?;
        info!(addr = %listener.local_addr(), "waiting for talker");
        let mut channel = listener.accept()?;
        self.advance(DriverState::ChannelConnected);

        let setup = receive_setup(&mut channel)?;
        if !setup.destination.eq_ignore_ascii_case(&self.config.destination) {
            warn!(
                talker = %setup.destination,
                configured = %self.config.destination,
                "talker sends to a different destination than the one configured here"
            );
        }

        let mut stage = ListenerRunner::new(
            self.runner.clone(),
            Box::new(TimerListClock::with_path(&self.timer_list)),
            Box::new(PerfScriptExtractor::new(
                self.runner.clone(),
                self.perf_scripts.join(LISTENER_PERF_SCRIPT),
            )),
            self.runner_settings(),
            self.platform.talker_address(),
            self.platform.irq_name(),
            self.config.listener.settle,
        );

        self.advance(DriverState::IterationsRunning);
        let reports = protocol::run_listener(&mut channel, &setup.parameters, &mut stage)?;
        protocol::finish_listener(&mut channel)?;
        self.disconnect(channel)?;
        Ok(reports)
    }

    fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings::from_config(&self.config, self.platform.interface_name(), &self.results_dir)
    }

    fn disconnect(&mut self, channel: TcpControlChannel) -> Result<()> {
        channel.close()?;
        self.advance(DriverState::ChannelDisconnected);
        Ok(())
    }

    fn advance(&mut self, state: DriverState) {
        debug!(from = %self.state, to = %state, "driver state");
        self.state = state;
    }

    /// Kernel and daemon log since the run started. Failures only warn.
    fn collect_system_log(&self, started: SystemTime) -> Option<PathBuf> {
        let since = started.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
        let invocation = Invocation::new("journalctl").args([
            "--since".to_string(),
            format!("@{since}"),
            "--output=short-iso-precise".into(),
        ]);
        let path = self.results_dir.join(SYSTEM_LOG_FILE);
        let written = self
            .runner
            .run(&invocation)
            .map_err(ExperimentError::from)
            .and_then(|output| {
                std::fs::write(&path, output.stdout)
                    .map_err(|e| ExperimentError::io(format!("writing {}", path.display()), e))
            });
        match written {
            Ok(()) => {
                info!(path = %path.display(), "system log collected");
                Some(path)
            }
            Err(err) => {
                warn!(error = %err, "could not collect system log");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, TcpListener};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    use serde_json::{json, Value};

    use super::*;
    use crate::config::testing::talker_json;
    use crate::config::{ConfigDocument, GENERAL, LISTENER, PROFILES};
    use crate::process::testing::FakeRunner;

    const TIMER_LIST: &str = "clock 3:\n  .base:       0000000000000000\n  .get_time:   ktime_get_clocktai\n  .offset:     37000000000 nsecs\n";
    const RAW: &str = "sw_tx,hw_rx,sw_rx\n1,2,3\n";

    /// Records setup and teardown calls.
    struct StubPlatform {
        events: Arc<Mutex<Vec<&'static str>>>,
        fail_setup: bool,
        port: u16,
    }

    impl StubPlatform {
        fn new(port: u16) -> (Self, Arc<Mutex<Vec<&'static str>>>) {
            let events = Arc::new(Mutex::new(Vec::new()));
            let platform = Self {
                events: events.clone(),
                fail_setup: false,
                port,
            };
            (platform, events)
        }
    }

    impl Platform for StubPlatform {
        fn setup(&mut self) -> Result<()> {
            self.events.lock().unwrap().push("setup");
            if self.fail_setup {
                return Err(ExperimentError::Platform("interface missing".to_string()));
            }
            Ok(())
        }

        fn teardown(&mut self) {
            self.events.lock().unwrap().push("teardown");
        }

        fn listener_address(&self) -> IpAddr {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }

        fn talker_address(&self) -> IpAddr {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }

        fn control_port(&self) -> u16 {
            self.port
        }

        fn interface_name(&self) -> &str {
            "tsn_vlan"
        }

        fn irq_name(&self) -> String {
            "enp1s0-TxRx-".to_string()
        }
    }

    fn config(dir: &Path, patch: &[(&[&str], Value)]) -> ExperimentConfig {
        let profile = dir.join("basic.csv");
        std::fs::write(&profile, "PayloadSize,TransmissionInterval,SO_PRIORITY\n64,1000000,3\n128,1000000,3\n")
            .unwrap();
        let mut doc = ConfigDocument::from_value(talker_json());
        doc.set(&[PROFILES, "basic"], json!(profile.display().to_string()));
        doc.set(&[LISTENER, "Settle Seconds"], json!(0));
        for (path, value) in patch {
            doc.set(path, value.clone());
        }
        doc.experiment().unwrap()
    }

    fn closed_port() -> u16 {
        let probe = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        probe.local_addr().unwrap().port()
    }

    #[test]
    fn setup_failure_still_releases_platform() {
        let dir = tempfile::tempdir().unwrap();
        let (mut platform, events) = StubPlatform::new(closed_port());
        platform.fail_setup = true;

        let driver = Driver::new(
            config(dir.path(), &[]),
            platform,
            Arc::new(FakeRunner::new()),
            dir.path(),
        );
        let err = driver.run().unwrap_err();
        assert!(matches!(err, ExperimentError::Platform(_)));
        assert_eq!(*events.lock().unwrap(), ["setup", "teardown"]);
    }

    #[test]
    fn connect_failure_still_releases_platform() {
        let dir = tempfile::tempdir().unwrap();
        let (platform, events) = StubPlatform::new(closed_port());
        let driver = Driver::new(
            config(dir.path(), &[]),
            platform,
            Arc::new(FakeRunner::new()),
            dir.path(),
        )
        .with_retry(RetryPolicy {
            backoff: Duration::from_millis(5),
            max_attempts: Some(2),
        });

        let err = driver.run().unwrap_err();
        assert!(matches!(err, ExperimentError::Control(_)), "{err}");
        assert_eq!(*events.lock().unwrap(), ["setup", "teardown"]);
    }

    #[test]
    fn missing_profile_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (platform, events) = StubPlatform::new(closed_port());
        let config = config(
            dir.path(),
            &[(&[PROFILES, "basic"][..], json!(dir.path().join("absent.csv").display().to_string()))],
        );
        let driver = Driver::new(config, platform, Arc::new(FakeRunner::new()), dir.path());
        assert!(matches!(driver.run().unwrap_err(), ExperimentError::Config(_)));
        assert_eq!(*events.lock().unwrap(), ["teardown"]);
    }

    #[test]
    fn system_log_collected_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (mut platform, _) = StubPlatform::new(closed_port());
        platform.fail_setup = true;
        let runner = FakeRunner::new();
        runner.reply("journalctl", "Oct 19 kernel: igc link up\n");

        let config = config(dir.path(), &[(&[GENERAL, "Collect system log"][..], json!(true))]);
        let driver = Driver::new(config, platform, Arc::new(runner.clone()), dir.path());
        assert!(driver.run().is_err());

        let journal = runner.calls("run");
        assert!(journal[0].starts_with("journalctl --since @"));
        assert!(journal[0].ends_with("--output=short-iso-precise"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join(SYSTEM_LOG_FILE)).unwrap(),
            "Oct 19 kernel: igc link up\n"
        );
    }

    #[test]
    fn talker_and_listener_complete_a_sweep() {
        let port = closed_port();
        let talker_dir = tempfile::tempdir().unwrap();
        let listener_dir = tempfile::tempdir().unwrap();
        let timer_list = talker_dir.path().join("timer_list");
        std::fs::write(&timer_list, TIMER_LIST).unwrap();

        let listener_config = config(listener_dir.path(), &[(&[GENERAL, "Mode"][..], json!("listener"))]);
        let listener_results = listener_dir.path().to_path_buf();
        let listener_timer = timer_list.clone();
        let listener = thread::spawn(move || {
            let runner = FakeRunner::new();
            runner.spawn_writes("chrt --fifo 98 tsn-listener", RAW);
            let (platform, events) = StubPlatform::new(port);
            let summary = Driver::new(listener_config, platform, Arc::new(runner), &listener_results)
                .with_timer_list(listener_timer)
                .run()
                .unwrap();
            (summary, events)
        });

        let (platform, talker_events) = StubPlatform::new(port);
        let talker = Driver::new(
            config(talker_dir.path(), &[]),
            platform,
            Arc::new(FakeRunner::new()),
            talker_dir.path(),
        )
        .with_retry(RetryPolicy {
            backoff: Duration::from_millis(20),
            max_attempts: Some(250),
        })
        .with_timer_list(&timer_list)
        .run()
        .unwrap();

        let (listener, listener_events) = listener.join().unwrap();
        assert_eq!(talker.iterations.len(), 2);
        assert_eq!(listener.iterations.len(), 2);
        assert_eq!(listener.suspect(), 0);
        for name in ["results-64-1000000.csv", "results-128-1000000.csv"] {
            assert_eq!(
                std::fs::read_to_string(listener_dir.path().join(name)).unwrap(),
                RAW
            );
        }
        assert_eq!(*talker_events.lock().unwrap(), ["setup", "teardown"]);
        assert_eq!(*listener_events.lock().unwrap(), ["setup", "teardown"]);
    }
}
