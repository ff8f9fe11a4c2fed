//! Experiment configuration.
//!
//! The file is JSON with a fixed set of sections. Keys are looked up by path
//! and a missing key is reported with that full path. Keys present with a
//! `null` value are valid and mean "not set".
//!
//! ```json
//! {
//!   "General Setup": { "Mode": "talker", "Platform": "i210", ... },
//!   "System Setup": { "TSN Interface": "enp1s0", "PTP Conf": "~/gPTP.cfg" },
//!   "Talker Setup": { "Iterations": "10s", ... },
//!   "Listener Setup": { "TSN Hardware Queue": 0, ... },
//!   "Experiment Profiles": { "sweep": "profiles/sweep.csv" },
//!   "Qdiscs profiles": { "mqprio": ["qdisc add dev $iface ..."] }
//! }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde_json::{Map, Value};
use tsnprobe_control::ExperimentParameters;

use crate::error::ConfigError;
use crate::runner::{SocketFamily, XdpCopyMode, XdpMode, XdpSetup};

type ConfigResult<T> = std::result::Result<T, ConfigError>;

pub const GENERAL: &str = "General Setup";
pub const SYSTEM: &str = "System Setup";
pub const TALKER: &str = "Talker Setup";
pub const LISTENER: &str = "Listener Setup";
pub const PROFILES: &str = "Experiment Profiles";
pub const QDISCS: &str = "Qdiscs profiles";

/// Default listener settle time after launching the receiver.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(60);

/// Raw configuration tree with key-path access.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    root: Value,
}

impl ConfigDocument {
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Read and parse a JSON configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let root = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Value at `path`. Any absent segment is [`ConfigError::Missing`] for
    /// the whole path.
    pub fn get(&self, path: &[&str]) -> ConfigResult<&Value> {
        self.lookup(path).ok_or_else(|| ConfigError::missing(path))
    }

    /// Value at `path`, or `None` when absent.
    pub fn lookup(&self, path: &[&str]) -> Option<&Value> {
        path.iter()
            .try_fold(&self.root, |node, key| node.as_object()?.get(*key))
    }

    /// Set `path` to `value`, creating intermediate sections.
    ///
    /// A non-object value in the way is replaced by a section.
    pub fn set(&mut self, path: &[&str], value: Value) {
        let Some((last, parents)) = path.split_last() else {
            self.root = value;
            return;
        };
        let mut node = &mut self.root;
        for key in parents {
            node = ensure_object(node)
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        ensure_object(node).insert(last.to_string(), value);
    }

    pub fn string(&self, path: &[&str]) -> ConfigResult<String> {
        self.optional_string(path)?
            .ok_or_else(|| ConfigError::invalid(path, "null", "a string"))
    }

    pub fn optional_string(&self, path: &[&str]) -> ConfigResult<Option<String>> {
        match self.get(path)? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s.clone())),
            Value::Number(n) => Ok(Some(n.to_string())),
            other => Err(ConfigError::invalid(path, other, "a string")),
        }
    }

    /// Booleans also accept `"yes"`/`"no"` and `"true"`/`"false"`.
    pub fn flag(&self, path: &[&str]) -> ConfigResult<bool> {
        match self.get(path)? {
            Value::Bool(b) => Ok(*b),
            Value::Null => Ok(false),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "yes" | "true" | "on" => Ok(true),
                "no" | "false" | "off" => Ok(false),
                _ => Err(ConfigError::invalid(path, format!("{s:?}"), "a boolean")),
            },
            other => Err(ConfigError::invalid(path, other, "a boolean")),
        }
    }

    /// Unsigned integer; numeric strings are accepted.
    pub fn optional_u32(&self, path: &[&str]) -> ConfigResult<Option<u32>> {
        let value = self.get(path)?;
        let number = match value {
            Value::Null => return Ok(None),
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        number
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| ConfigError::invalid(path, value, "a non-negative integer"))
    }

    /// Parse the whole tree into typed settings.
    pub fn experiment(&self) -> ConfigResult<ExperimentConfig> {
        ExperimentConfig::from_document(self)
    }
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just made an object"),
    }
}

fn parse_enum<T: FromStr>(doc: &ConfigDocument, path: &[&str], expected: &str) -> ConfigResult<T> {
    let raw = doc.string(path)?;
    raw.parse()
        .map_err(|_| ConfigError::invalid(path, format!("{raw:?}"), expected))
}

/// Which side of the experiment this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Talker,
    Listener,
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "talker" => Ok(Role::Talker),
            "listener" => Ok(Role::Listener),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Talker => "talker",
            Role::Listener => "listener",
        })
    }
}

/// Supported NIC families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    I210,
    Stmmac,
}

impl FromStr for PlatformKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "i210" => Ok(PlatformKind::I210),
            "stmmac" => Ok(PlatformKind::Stmmac),
            _ => Err(()),
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlatformKind::I210 => "i210",
            PlatformKind::Stmmac => "stmmac",
        })
    }
}

/// Packets per iteration for the talker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iterations {
    /// Fixed packet count.
    Count(u64),
    /// Transmit for this many seconds at each row's interval.
    Seconds(u64),
}

impl Iterations {
    /// Packet count for a row transmitting every `interval_ns` nanoseconds.
    pub fn packets(&self, interval_ns: u64) -> u64 {
        match *self {
            Iterations::Count(n) => n,
            Iterations::Seconds(s) => {
                let total = u128::from(s) * 1_000_000_000 / u128::from(interval_ns.max(1));
                u64::try_from(total).unwrap_or(u64::MAX)
            }
        }
    }
}

impl FromStr for Iterations {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(secs) = s.strip_suffix('s') {
            return secs.trim().parse().map(Iterations::Seconds).map_err(|_| ());
        }
        s.parse().map(Iterations::Count).map_err(|_| ())
    }
}

impl fmt::Display for Iterations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Iterations::Count(n) => write!(f, "{n}"),
            Iterations::Seconds(s) => write!(f, "{s}s"),
        }
    }
}

/// A named list of `tc` argument lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QdiscProfile {
    pub name: String,
    pub lines: Vec<String>,
}

/// Settings only the talker reads.
#[derive(Debug, Clone, PartialEq)]
pub struct TalkerSettings {
    pub iterations: Iterations,
    pub network_interference: bool,
    pub profile_name: String,
    pub profile_path: PathBuf,
    pub xdp_hw_queue: Option<u32>,
}

/// Listener hardware queue routing and receive tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerSettings {
    pub tsn_hw_queue: Option<u32>,
    pub other_hw_queue: Option<u32>,
    pub rx_irq_affinity: Option<String>,
    /// Wait after launching the receiver before letting the talker start.
    pub settle: Duration,
}

/// Typed view of the configuration for one role.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentConfig {
    pub role: Role,
    pub platform: PlatformKind,
    pub socket_family: SocketFamily,
    pub stress_cpus: bool,
    pub isolate_cpu: Option<u32>,
    pub intermediate_latency: bool,
    pub keep_perf_data: bool,
    pub collect_system_log: bool,
    pub vlan_priority: Option<u32>,
    pub qdisc: Option<QdiscProfile>,
    pub xdp: XdpSetup,
    pub interface: String,
    pub ptp_conf: PathBuf,
    pub destination: String,
    pub talker: Option<TalkerSettings>,
    pub listener: ListenerSettings,
}

impl ExperimentConfig {
    pub fn from_document(doc: &ConfigDocument) -> ConfigResult<Self> {
        let role: Role = parse_enum(doc, &[GENERAL, "Mode"], "\"talker\" or \"listener\"")?;
        let platform: PlatformKind =
            parse_enum(doc, &[GENERAL, "Platform"], "\"i210\" or \"stmmac\"")?;
        let socket_family: SocketFamily =
            parse_enum(doc, &[GENERAL, "Socket Type"], "\"AF_PACKET\" or \"AF_XDP\"")?;

        let xdp = XdpSetup {
            needs_wakeup: doc.flag(&[GENERAL, "XDP Setup", "Needs Wakeup"])?,
            mode: parse_enum::<XdpMode>(doc, &[GENERAL, "XDP Setup", "Mode"], "\"SKB\" or \"Native\"")?,
            copy_mode: parse_enum::<XdpCopyMode>(
                doc,
                &[GENERAL, "XDP Setup", "Copy Mode"],
                "\"Copy\" or \"Zero-Copy\"",
            )?,
        };

        let intermediate_latency = doc.flag(&[GENERAL, "Intermediate latency"])?;
        if intermediate_latency && socket_family == SocketFamily::AfXdp {
            return Err(ConfigError::Unsupported(
                "intermediate latency capture is only available with AF_PACKET sockets".to_string(),
            ));
        }

        let qdisc = match doc.optional_string(&[GENERAL, "Qdisc profile"])? {
            Some(name) => Some(qdisc_profile(doc, name)?),
            None => None,
        };

        let talker = match role {
            Role::Talker => Some(talker_settings(doc, socket_family)?),
            Role::Listener => None,
        };
        let listener = listener_settings(doc, role)?;

        let config = Self {
            role,
            platform,
            socket_family,
            stress_cpus: doc.flag(&[GENERAL, "Stress CPUs"])?,
            isolate_cpu: doc.optional_u32(&[GENERAL, "Isolate CPU"])?,
            intermediate_latency,
            keep_perf_data: doc.flag(&[GENERAL, "Keep perf data"])?,
            collect_system_log: doc.flag(&[GENERAL, "Collect system log"])?,
            vlan_priority: doc.optional_u32(&[GENERAL, "VLAN Priority"])?,
            qdisc,
            xdp,
            interface: doc.string(&[SYSTEM, "TSN Interface"])?,
            ptp_conf: expand_home(&doc.string(&[SYSTEM, "PTP Conf"])?),
            destination: doc.string(&[TALKER, "Destination MAC Address"])?,
            talker,
            listener,
        };
        config.validate_queues()?;
        Ok(config)
    }

    /// Queue routing needed by AF_XDP or IRQ pinning on the listener.
    fn validate_queues(&self) -> ConfigResult<()> {
        if self.role != Role::Listener {
            return Ok(());
        }
        if self.socket_family != SocketFamily::AfXdp && self.listener.rx_irq_affinity.is_none() {
            return Ok(());
        }
        if self.listener.tsn_hw_queue.is_none() {
            return Err(ConfigError::invalid(
                &[LISTENER, "TSN Hardware Queue"],
                "null",
                "a queue index (required for AF_XDP or Rx IRQ SMP affinity)",
            ));
        }
        if self.listener.other_hw_queue.is_none() {
            return Err(ConfigError::invalid(
                &[LISTENER, "Other Hardware Queue"],
                "null",
                "a queue index (required for AF_XDP or Rx IRQ SMP affinity)",
            ));
        }
        if self.vlan_priority.is_none() {
            return Err(ConfigError::invalid(
                &[GENERAL, "VLAN Priority"],
                "null",
                "a priority (required for AF_XDP or Rx IRQ SMP affinity)",
            ));
        }
        Ok(())
    }

    /// Read the talker's experiment profile into the parameter sweep.
    pub fn load_parameters(&self) -> ConfigResult<ExperimentParameters> {
        let talker = self
            .talker
            .as_ref()
            .ok_or_else(|| ConfigError::Unsupported("only the talker reads experiment profiles".into()))?;
        load_profile(&talker.profile_path)
    }
}

fn talker_settings(doc: &ConfigDocument, family: SocketFamily) -> ConfigResult<TalkerSettings> {
    let iterations_path = [TALKER, "Iterations"];
    let raw = doc.string(&iterations_path)?;
    let iterations: Iterations = raw.parse().map_err(|_| {
        ConfigError::invalid(&iterations_path, format!("{raw:?}"), "a packet count or \"<N>s\"")
    })?;

    let profile_name = doc.string(&[TALKER, "Experiment profile"])?;
    let profile_path = PathBuf::from(doc.string(&[PROFILES, profile_name.as_str()])?);

    let xdp_hw_queue = doc.optional_u32(&[TALKER, "XDP Hardware Queue"])?;
    if family == SocketFamily::AfXdp && xdp_hw_queue.is_none() {
        return Err(ConfigError::invalid(
            &[TALKER, "XDP Hardware Queue"],
            "null",
            "a queue index (required for AF_XDP)",
        ));
    }

    Ok(TalkerSettings {
        iterations,
        network_interference: doc.flag(&[TALKER, "Network interference"])?,
        profile_name,
        profile_path,
        xdp_hw_queue,
    })
}

fn listener_settings(doc: &ConfigDocument, role: Role) -> ConfigResult<ListenerSettings> {
    let queue = |key: &str| -> ConfigResult<Option<u32>> {
        let path = [LISTENER, key];
        match role {
            Role::Listener => doc.optional_u32(&path),
            // The talker only needs these to render qdisc profiles.
            Role::Talker if doc.lookup(&path).is_none() => Ok(None),
            Role::Talker => doc.optional_u32(&path),
        }
    };

    let rx_irq_affinity = match role {
        Role::Listener => doc.optional_string(&[LISTENER, "Rx IRQ SMP Affinity Mask"])?,
        Role::Talker => None,
    };

    let settle_path = [LISTENER, "Settle Seconds"];
    let settle = match doc.lookup(&settle_path) {
        None | Some(Value::Null) => DEFAULT_SETTLE,
        Some(_) => Duration::from_secs(u64::from(doc.optional_u32(&settle_path)?.unwrap_or(0))),
    };

    Ok(ListenerSettings {
        tsn_hw_queue: queue("TSN Hardware Queue")?,
        other_hw_queue: queue("Other Hardware Queue")?,
        rx_irq_affinity,
        settle,
    })
}

fn qdisc_profile(doc: &ConfigDocument, name: String) -> ConfigResult<QdiscProfile> {
    let path = [QDISCS, name.as_str()];
    let lines = match doc.get(&path)? {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(ConfigError::invalid(&path, other, "a list of strings")),
            })
            .collect::<ConfigResult<Vec<_>>>()?,
        other => return Err(ConfigError::invalid(&path, other, "a list of strings")),
    };
    Ok(QdiscProfile { name, lines })
}

/// Load an experiment profile CSV: a header of factor names, one row per
/// iteration.
pub fn load_profile(path: &Path) -> ConfigResult<ExperimentParameters> {
    let profile_error = |reason: String| ConfigError::Profile {
        path: path.to_path_buf(),
        reason,
    };
    let text = std::fs::read_to_string(path).map_err(|e| profile_error(e.to_string()))?;
    let mut records = crate::csv::parse(&text).map_err(profile_error)?.into_iter();
    let header = records
        .next()
        .ok_or_else(|| profile_error("empty profile".to_string()))?;
    ExperimentParameters::new(header, records.collect()).map_err(|e| profile_error(e.to_string()))
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::testing::talker_json;
    use super::*;

    fn doc() -> ConfigDocument {
        ConfigDocument::from_value(talker_json())
    }

    #[test]
    fn talker_config_parses() {
        let cfg = doc().experiment().unwrap();
        assert_eq!(cfg.role, Role::Talker);
        assert_eq!(cfg.platform, PlatformKind::I210);
        assert_eq!(cfg.socket_family, SocketFamily::AfPacket);
        assert_eq!(cfg.vlan_priority, Some(3));
        assert_eq!(cfg.listener.settle, DEFAULT_SETTLE);

        let talker = cfg.talker.unwrap();
        assert_eq!(talker.iterations, Iterations::Count(1000));
        assert_eq!(talker.profile_path, PathBuf::from("profiles/basic.csv"));
    }

    #[test]
    fn missing_key_reports_full_path() {
        let mut value = talker_json();
        value["General Setup"]["XDP Setup"]
            .as_object_mut()
            .unwrap()
            .remove("Copy Mode");

        let err = ConfigDocument::from_value(value).experiment().unwrap_err();
        match err {
            ConfigError::Missing { path } => {
                assert_eq!(path, ["General Setup", "XDP Setup", "Copy Mode"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_section_reports_full_path() {
        let mut value = talker_json();
        value.as_object_mut().unwrap().remove("System Setup");
        let err = ConfigDocument::from_value(value).experiment().unwrap_err();
        assert!(err
            .to_string()
            .contains("System Setup:\n  TSN Interface:\n"));
    }

    #[test]
    fn invalid_mode_rejected() {
        let mut d = doc();
        d.set(&[GENERAL, "Mode"], json!("both"));
        let err = d.experiment().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn invalid_xdp_mode_rejected() {
        let mut d = doc();
        d.set(&[GENERAL, "XDP Setup", "Mode"], json!("Turbo"));
        assert!(d.experiment().is_err());
    }

    #[test]
    fn xdp_with_intermediate_latency_unsupported() {
        let mut d = doc();
        d.set(&[GENERAL, "Socket Type"], json!("AF_XDP"));
        d.set(&[GENERAL, "Intermediate latency"], json!(true));
        assert!(matches!(d.experiment(), Err(ConfigError::Unsupported(_))));
    }

    #[test]
    fn xdp_talker_requires_queue() {
        let mut d = doc();
        d.set(&[GENERAL, "Socket Type"], json!("AF_XDP"));
        assert!(d.experiment().is_err());

        d.set(&[TALKER, "XDP Hardware Queue"], json!("2"));
        let cfg = d.experiment().unwrap();
        assert_eq!(cfg.talker.unwrap().xdp_hw_queue, Some(2));
    }

    #[test]
    fn listener_with_irq_affinity_requires_queues() {
        let mut d = doc();
        d.set(&[GENERAL, "Mode"], json!("listener"));
        d.set(&[LISTENER, "Rx IRQ SMP Affinity Mask"], json!("2"));
        d.set(&[LISTENER, "Other Hardware Queue"], Value::Null);

        let err = d.experiment().unwrap_err();
        assert!(err.to_string().contains("Other Hardware Queue"));
    }

    #[test]
    fn listener_ignores_talker_only_keys() {
        let mut value = talker_json();
        let talker = value["Talker Setup"].as_object_mut().unwrap();
        talker.remove("Iterations");
        talker.remove("Experiment profile");
        let mut d = ConfigDocument::from_value(value);
        d.set(&[GENERAL, "Mode"], json!("Listener"));
        d.set(&[LISTENER, "Settle Seconds"], json!(5));

        let cfg = d.experiment().unwrap();
        assert_eq!(cfg.role, Role::Listener);
        assert!(cfg.talker.is_none());
        assert_eq!(cfg.listener.settle, Duration::from_secs(5));
    }

    #[test]
    fn set_creates_sections() {
        let mut d = ConfigDocument::from_value(json!({}));
        d.set(&["General Setup", "XDP Setup", "Mode"], json!("SKB"));
        assert_eq!(
            d.get(&["General Setup", "XDP Setup", "Mode"]).unwrap(),
            &json!("SKB")
        );
    }

    #[test]
    fn flags_accept_yes_no() {
        let mut d = doc();
        d.set(&[TALKER, "Network interference"], json!("yes"));
        assert!(d.flag(&[TALKER, "Network interference"]).unwrap());
        d.set(&[TALKER, "Network interference"], json!("maybe"));
        assert!(d.flag(&[TALKER, "Network interference"]).is_err());
    }

    #[test]
    fn iterations_by_time() {
        let it: Iterations = "10s".parse().unwrap();
        assert_eq!(it, Iterations::Seconds(10));
        assert_eq!(it.packets(1_000_000), 10_000);
        assert_eq!(it.packets(3_000_000_000), 3);
        assert_eq!(Iterations::Count(7).packets(1), 7);
        assert!("ten".parse::<Iterations>().is_err());
        assert_eq!(Iterations::Seconds(10).to_string(), "10s");
    }

    #[test]
    fn iterations_string_from_cli() {
        let mut d = doc();
        d.set(&[TALKER, "Iterations"], json!("25s"));
        let talker = d.experiment().unwrap().talker.unwrap();
        assert_eq!(talker.iterations, Iterations::Seconds(25));
    }

    #[test]
    fn qdisc_profile_resolved() {
        let mut d = doc();
        d.set(&[GENERAL, "Qdisc profile"], json!("mqprio"));
        let cfg = d.experiment().unwrap();
        let qdisc = cfg.qdisc.unwrap();
        assert_eq!(qdisc.name, "mqprio");
        assert_eq!(qdisc.lines.len(), 1);

        d.set(&[GENERAL, "Qdisc profile"], json!("taprio"));
        assert!(matches!(d.experiment(), Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn profile_csv_loads_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("basic.csv");
        std::fs::write(
            &path,
            "PayloadSize,TransmissionInterval,SO_PRIORITY\n64,1000000,3\n1500,500000,3\n",
        )
        .unwrap();

        let params = load_profile(&path).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params.rows()[1].payload_size().unwrap(), 1500);
    }

    #[test]
    fn ragged_profile_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "PayloadSize,SO_PRIORITY\n64\n").unwrap();
        assert!(matches!(load_profile(&path), Err(ConfigError::Profile { .. })));
    }

    #[test]
    fn home_expansion() {
        assert_eq!(expand_home("/etc/ptp.cfg"), PathBuf::from("/etc/ptp.cfg"));
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(expand_home("~/ptp.cfg"), PathBuf::from(home).join("ptp.cfg"));
        }
    }
}
