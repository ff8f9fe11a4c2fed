//! Host preparation for one side of an experiment.
//!
//! [`LinuxPlatform::setup`] tunes the NIC, creates the experiment VLAN,
//! installs queuing disciplines and starts PTP synchronisation. Every step
//! that changes host state records its reversal on an [`ActionStack`];
//! [`Platform::teardown`] replays them newest first and never fails, so it is
//! safe after a setup that stopped halfway.

pub mod actions;
pub mod i210;
pub mod stmmac;
pub mod tools;

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{ExperimentConfig, PlatformKind, QdiscProfile, Role};
use crate::error::{ExperimentError, Result};
use crate::process::{Invocation, SpawnIo, ToolRunner};
use crate::runner::SocketFamily;
use crate::template::{Bindings, Placeholder, Template};

use self::actions::{ActionStack, Undo};
use self::tools::{EthTool, IpLink, IrqAffinity};

pub use self::i210::I210;
pub use self::stmmac::Stmmac;

/// VLAN id of the experiment network.
pub const VLAN_ID: u16 = 5;

/// Name of the VLAN interface created on top of the interface under test.
pub const VLAN_INTERFACE: &str = "tsn_vlan";

const PMC_PORT_DATA_SET: &str = "GET PORT_DATA_SET";
const PMC_GRANDMASTER_SETTINGS: &str = "SET GRANDMASTER_SETTINGS_NP clockClass 248 \
clockAccuracy 0xfe offsetScaledLogVariance 0xffff currentUtcOffset 37 leap61 0 leap59 0 \
currentUtcOffsetValid 1 ptpTimescale 1 timeTraceable 1 frequencyTraceable 0 timeSource 0xa0";

/// Addresses of the control network on the experiment VLAN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformAddresses {
    pub talker: IpAddr,
    pub listener: IpAddr,
    pub control_port: u16,
}

impl Default for PlatformAddresses {
    fn default() -> Self {
        Self {
            talker: IpAddr::V4(Ipv4Addr::new(169, 254, 10, 10)),
            listener: IpAddr::V4(Ipv4Addr::new(169, 254, 10, 11)),
            control_port: 2000,
        }
    }
}

/// Host preparation as seen by the experiment driver.
pub trait Platform {
    /// Prepare the host. On error, the steps already taken stay recorded for
    /// [`teardown`](Platform::teardown).
    fn setup(&mut self) -> Result<()>;

    /// Undo everything setup did, newest first. Failures are logged. Calling
    /// it again is a no-op.
    fn teardown(&mut self);

    fn listener_address(&self) -> IpAddr;

    fn talker_address(&self) -> IpAddr;

    fn control_port(&self) -> u16;

    /// Interface the data-plane tools bind to.
    fn interface_name(&self) -> &str;

    /// Prefix of the receive queue interrupt names.
    fn irq_name(&self) -> String;
}

/// Everything setup needs, resolved from the experiment configuration.
#[derive(Debug, Clone)]
pub struct PlatformSettings {
    pub role: Role,
    pub interface: String,
    pub socket_family: SocketFamily,
    pub vlan_priority: Option<u32>,
    pub tsn_hw_queue: Option<u32>,
    pub other_hw_queue: Option<u32>,
    pub rx_irq_affinity: Option<String>,
    pub qdisc: Option<QdiscProfile>,
    /// Destination MAC address the talker sends to.
    pub multicast_address: String,
    pub ptp_conf: PathBuf,
    pub addresses: PlatformAddresses,
    /// Root of procfs; tests point this at a temporary directory.
    pub proc_root: PathBuf,
    /// Delay between `pmc` polls while waiting for ptp4l.
    pub ptp_poll_interval: Duration,
}

impl PlatformSettings {
    pub fn from_config(config: &ExperimentConfig) -> Self {
        Self {
            role: config.role,
            interface: config.interface.clone(),
            socket_family: config.socket_family,
            vlan_priority: config.vlan_priority,
            tsn_hw_queue: config.listener.tsn_hw_queue,
            other_hw_queue: config.listener.other_hw_queue,
            rx_irq_affinity: config.listener.rx_irq_affinity.clone(),
            qdisc: config.qdisc.clone(),
            multicast_address: config.destination.clone(),
            ptp_conf: config.ptp_conf.clone(),
            addresses: PlatformAddresses::default(),
            proc_root: PathBuf::from("/proc"),
            ptp_poll_interval: Duration::from_secs(1),
        }
    }

    fn is_listener(&self) -> bool {
        self.role == Role::Listener
    }

    fn role_address(&self) -> IpAddr {
        match self.role {
            Role::Talker => self.addresses.talker,
            Role::Listener => self.addresses.listener,
        }
    }

    fn qdisc_bindings(&self) -> Bindings {
        let mut bindings = Bindings::new().with(Placeholder::Iface, &self.interface);
        if let Some(queue) = self.tsn_hw_queue {
            bindings.set(Placeholder::TsnHwQueue, queue);
        }
        if let Some(prio) = self.vlan_priority {
            bindings.set(Placeholder::TsnVlanPrio, prio);
        }
        if let Some(queue) = self.other_hw_queue {
            bindings.set(Placeholder::OtherHwQueue, queue);
        }
        bindings
    }
}

/// What a NIC profile may touch while it runs its steps.
pub struct SetupContext<'a> {
    pub runner: &'a dyn ToolRunner,
    pub settings: &'a PlatformSettings,
    pub actions: &'a mut ActionStack,
}

impl<'a> SetupContext<'a> {
    pub fn ethtool(&self) -> EthTool<'a> {
        let settings = self.settings;
        EthTool::new(self.runner, &settings.interface)
    }

    pub fn ip(&self) -> IpLink<'a> {
        let settings = self.settings;
        IpLink::new(self.runner, &settings.interface)
    }
}

/// NIC-family specific steps of platform setup.
pub trait NicProfile: Send {
    fn name(&self) -> &'static str;

    /// Prefix of receive queue interrupt names; the queue index follows.
    fn irq_name(&self, interface: &str) -> String;

    /// Offload, coalescing and power settings for low latency.
    fn enable_optimisations(&self, ctx: &mut SetupContext<'_>) -> Result<()>;

    /// Steer experiment and background traffic to their receive queues.
    fn setup_rx_filters(&self, ctx: &mut SetupContext<'_>) -> Result<()>;
}

/// The profile for a configured NIC family.
pub fn nic_profile(kind: PlatformKind) -> Box<dyn NicProfile> {
    match kind {
        PlatformKind::I210 => Box::new(I210),
        PlatformKind::Stmmac => Box::new(Stmmac),
    }
}

/// [`Platform`] for Linux hosts driven through iproute2, ethtool and
/// linuxptp.
pub struct LinuxPlatform {
    runner: Arc<dyn ToolRunner>,
    nic: Box<dyn NicProfile>,
    settings: PlatformSettings,
    actions: ActionStack,
    data_interface: String,
}

impl LinuxPlatform {
    pub fn new(runner: Arc<dyn ToolRunner>, nic: Box<dyn NicProfile>, settings: PlatformSettings) -> Self {
        let data_interface = match settings.socket_family {
            SocketFamily::AfPacket => VLAN_INTERFACE.to_string(),
            SocketFamily::AfXdp => settings.interface.clone(),
        };
        Self {
            runner,
            nic,
            settings,
            actions: ActionStack::new(),
            data_interface,
        }
    }

    /// Platform for `config` using its NIC profile.
    pub fn from_config(runner: Arc<dyn ToolRunner>, config: &ExperimentConfig) -> Self {
        Self::new(runner, nic_profile(config.platform), PlatformSettings::from_config(config))
    }

    pub fn settings(&self) -> &PlatformSettings {
        &self.settings
    }

    /// Descriptions of the steps currently held for teardown, oldest first.
    pub fn acquired(&self) -> Vec<&str> {
        self.actions.descriptions()
    }

    fn run(&self, invocation: Invocation) -> Result<String> {
        Ok(self.runner.run(&invocation)?.stdout)
    }

    fn log_platform(&self) -> Result<()> {
        let iface = &self.settings.interface;
        let driver = EthTool::new(self.runner.as_ref(), iface).driver_info()?;
        if let Some(bus) = driver.get("bus-info") {
            let controller = self.run(Invocation::new("lspci").args(["-s", bus]))?;
            info!(nic = %controller.trim(), driver = ?driver.get("driver"), "NIC under test");
        }

        let kernel = self.run(Invocation::new("uname").arg("-a"))?;
        let cmdline_path = self.settings.proc_root.join("cmdline");
        let cmdline = std::fs::read_to_string(&cmdline_path)
            .map_err(|e| ExperimentError::io(format!("reading {}", cmdline_path.display()), e))?;
        info!(kernel = %kernel.trim(), cmdline = %cmdline.trim(), "kernel under test");

        let ptp = self.runner.run(&Invocation::new("ptp4l").arg("-v"))?;
        let version = if ptp.stdout.trim().is_empty() { ptp.stderr } else { ptp.stdout };
        info!(version = %version.trim(), "linuxptp");
        Ok(())
    }

    fn enable_interface(&mut self) -> Result<()> {
        let ip = IpLink::new(self.runner.as_ref(), &self.settings.interface);
        let link = ip.info()?;
        debug!(mac = %link.mac, state = %link.state, "interface under test");
        if link.state == "DOWN" {
            ip.set_up(&mut self.actions)?;
        }
        Ok(())
    }

    fn set_rx_irq_affinity(&mut self) -> Result<()> {
        if !self.settings.is_listener() {
            return Ok(());
        }
        let (Some(mask), Some(queue)) = (&self.settings.rx_irq_affinity, self.settings.tsn_hw_queue) else {
            return Ok(());
        };
        let name = format!("{}{queue}", self.irq_name());
        IrqAffinity::new(&self.settings.proc_root).pin(&name, mask, &mut self.actions)
    }

    fn enable_vlan(&mut self) -> Result<()> {
        IpLink::new(self.runner.as_ref(), &self.settings.interface).add_vlan(
            VLAN_INTERFACE,
            VLAN_ID,
            &mut self.actions,
        )?;
        let vlan = IpLink::new(self.runner.as_ref(), VLAN_INTERFACE);
        vlan.add_address(&self.settings.role_address().to_string())?;
        vlan.set_up(&mut self.actions)
    }

    fn set_queuing_discipline(&self) -> Result<()> {
        let Some(profile) = &self.settings.qdisc else {
            info!("no qdisc profile configured");
            return Ok(());
        };

        let clear = Invocation::new("tc")
            .args(["qdisc", "delete", "dev"])
            .arg(self.settings.interface.as_str())
            .args(["parent", "root"]);
        if let Err(err) = self.runner.run(&clear) {
            warn!(error = %err, "could not clear root qdisc");
        }

        let bindings = self.settings.qdisc_bindings();
        for line in &profile.lines {
            let rendered = Template::parse(line)?.render(&bindings)?;
            let argv = std::iter::once("tc".to_string())
                .chain(rendered.split_whitespace().map(str::to_string))
                .collect();
            if let Some(invocation) = Invocation::from_argv(argv) {
                self.runner.run(&invocation)?;
            }
        }
        info!(profile = %profile.name, "qdisc profile applied");
        Ok(())
    }

    fn accept_multicast_address(&mut self) -> Result<()> {
        IpLink::new(self.runner.as_ref(), &self.settings.interface)
            .add_multicast(&self.settings.multicast_address, &mut self.actions)
    }

    fn start_ptp4l(&mut self) -> Result<()> {
        let invocation = Invocation::new("ptp4l")
            .args(["-i", self.settings.interface.as_str(), "-f"])
            .arg(self.settings.ptp_conf.display().to_string())
            .args(["--step_threshold=1", "-l", "6", "--hwts_filter", "full"]);
        let daemon = self.runner.spawn(&invocation, SpawnIo::null())?;
        self.actions.push("ptp4l", Undo::Stop(daemon));
        Ok(())
    }

    fn pmc(message: &str) -> Invocation {
        Invocation::new("pmc").args(["-u", "-b", "0", "-t", "1", message])
    }

    /// Poll ptp4l until its port is SLAVE or MASTER.
    fn wait_ptp4l_stabilise(&self) -> Result<()> {
        info!("waiting for ptp4l to stabilise");
        loop {
            std::thread::sleep(self.settings.ptp_poll_interval);
            let output = self.run(Self::pmc(PMC_PORT_DATA_SET))?;
            let state = output
                .lines()
                .find(|line| line.contains("portState"))
                .and_then(|line| line.split_whitespace().nth(1))
                .map(str::to_ascii_uppercase);
            debug!(state = ?state, "ptp4l port state");
            if matches!(state.as_deref(), Some("SLAVE" | "MASTER")) {
                return Ok(());
            }
        }
    }

    fn configure_utc_offset(&self) -> Result<()> {
        self.run(Self::pmc(PMC_GRANDMASTER_SETTINGS))?;
        Ok(())
    }

    fn start_phc2sys(&mut self) -> Result<()> {
        let invocation = Invocation::new("phc2sys")
            .args(["-s", self.settings.interface.as_str()])
            .args(["-c", "CLOCK_REALTIME", "--step_threshold=1", "--transportSpecific=1", "-w"]);
        let daemon = self.runner.spawn(&invocation, SpawnIo::null())?;
        self.actions.push("phc2sys", Undo::Stop(daemon));
        Ok(())
    }
}

impl Platform for LinuxPlatform {
    fn setup(&mut self) -> Result<()> {
        info!(
            nic = self.nic.name(),
            interface = %self.settings.interface,
            role = %self.settings.role,
            "setting up platform"
        );
        self.log_platform()?;
        self.enable_interface()?;
        {
            let nic = &self.nic;
            let mut ctx = SetupContext {
                runner: self.runner.as_ref(),
                settings: &self.settings,
                actions: &mut self.actions,
            };
            nic.enable_optimisations(&mut ctx)?;
        }
        self.set_rx_irq_affinity()?;
        self.enable_vlan()?;
        self.set_queuing_discipline()?;
        self.accept_multicast_address()?;
        {
            let nic = &self.nic;
            let mut ctx = SetupContext {
                runner: self.runner.as_ref(),
                settings: &self.settings,
                actions: &mut self.actions,
            };
            nic.setup_rx_filters(&mut ctx)?;
        }
        self.start_ptp4l()?;
        self.wait_ptp4l_stabilise()?;
        self.configure_utc_offset()?;
        self.start_phc2sys()?;
        info!(steps = self.actions.len(), "platform ready");
        Ok(())
    }

    fn teardown(&mut self) {
        if self.actions.is_empty() {
            return;
        }
        info!(steps = self.actions.len(), "releasing platform");
        self.actions.unwind(self.runner.as_ref());
    }

    fn listener_address(&self) -> IpAddr {
        self.settings.addresses.listener
    }

    fn talker_address(&self) -> IpAddr {
        self.settings.addresses.talker
    }

    fn control_port(&self) -> u16 {
        self.settings.addresses.control_port
    }

    fn interface_name(&self) -> &str {
        &self.data_interface
    }

    fn irq_name(&self) -> String {
        self.nic.irq_name(&self.settings.interface)
    }
}

impl Drop for LinuxPlatform {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Canned tool output for platform tests.

    use super::*;
    use crate::process::testing::FakeRunner;

    pub const DRIVER_INFO: &str = "driver: igb\nversion: 5.15.0\nbus-info: 0000:01:00.0\n";
    pub const IP_ADDR_DOWN: &str = "2: enp1s0: <BROADCAST,MULTICAST> mtu 1500 qdisc mq state DOWN group default qlen 1000\n    link/ether 00:1b:21:aa:bb:cc brd ff:ff:ff:ff:ff:ff\n";
    pub const FEATURES: &str = "Features for enp1s0:\ntcp-segmentation-offload: on\ngeneric-segmentation-offload: on\nrx-vlan-offload: off\n";
    pub const COALESCE: &str = "Coalesce parameters for enp1s0:\nrx-usecs: 3\ntx-usecs: 0\ntx-frames: 0\n";
    pub const EEE: &str = "EEE settings for enp1s0:\n\tEEE status: enabled - active\n";
    pub const PORT_DATA_SET: &str = "sending: GET PORT_DATA_SET\n\t\tportState               SLAVE\n";

    /// A runner that answers every query platform setup makes.
    pub fn host() -> FakeRunner {
        let runner = FakeRunner::new();
        runner
            .reply("ethtool -i", DRIVER_INFO)
            .reply("lspci", "01:00.0 Ethernet controller: Intel Corporation I210 Gigabit\n")
            .reply("uname", "Linux rig 5.15.0 x86_64 GNU/Linux\n")
            .reply("ptp4l -v", "3.1.1\n")
            .reply("ip addr show enp1s0", IP_ADDR_DOWN)
            .reply("ethtool -k", FEATURES)
            .reply("ethtool -c", COALESCE)
            .reply("ethtool --show-eee", EEE)
            .reply("ethtool -N", "Added rule with ID 1023\n")
            .reply("pmc -u -b 0 -t 1 GET", PORT_DATA_SET);
        runner
    }

    /// Settings for `role` with procfs rooted at `proc_root`.
    pub fn settings(role: Role, proc_root: &std::path::Path) -> PlatformSettings {
        PlatformSettings {
            role,
            interface: "enp1s0".into(),
            socket_family: SocketFamily::AfPacket,
            vlan_priority: Some(3),
            tsn_hw_queue: Some(0),
            other_hw_queue: Some(1),
            rx_irq_affinity: None,
            qdisc: None,
            multicast_address: "01:80:C2:00:00:0E".into(),
            ptp_conf: PathBuf::from("/etc/gPTP.cfg"),
            addresses: PlatformAddresses::default(),
            proc_root: proc_root.to_path_buf(),
            ptp_poll_interval: Duration::ZERO,
        }
    }

    /// A procfs stand-in with a kernel command line.
    pub fn proc_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cmdline"), "BOOT_IMAGE=/vmlinuz isolcpus=3\n").unwrap();
        dir
    }
}
