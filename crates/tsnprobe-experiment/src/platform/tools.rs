//! Thin wrappers over `ethtool`, `ip` and procfs IRQ settings.
//!
//! Each setter applies a change and records how to undo it on the
//! [`ActionStack`]; a setter that finds the value already in place records
//! nothing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::info;

use super::actions::{ActionStack, Undo};
use crate::error::{ExperimentError, ExternalToolError, Result};
use crate::process::{Invocation, ToolOutput, ToolRunner};

/// Parse `key: value` lines as printed by `ethtool`.
pub fn parse_colon_pairs(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let (key, value) = line.trim().split_once(':')?;
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Token right after `keyword` in whitespace-split output.
fn token_after<'a>(output: &'a str, keyword: &str) -> Option<&'a str> {
    let mut tokens = output.split_whitespace();
    tokens.by_ref().find(|t| *t == keyword)?;
    tokens.next()
}

fn unexpected(invocation: &Invocation, reason: impl Into<String>) -> ExternalToolError {
    ExternalToolError::UnexpectedOutput {
        command: invocation.to_string(),
        reason: reason.into(),
    }
}

/// `ethtool` operations on one interface.
pub struct EthTool<'a> {
    runner: &'a dyn ToolRunner,
    iface: &'a str,
}

impl<'a> EthTool<'a> {
    pub fn new(runner: &'a dyn ToolRunner, iface: &'a str) -> Self {
        Self { runner, iface }
    }

    fn cmd(&self, args: &[&str]) -> Invocation {
        Invocation::new("ethtool")
            .arg(args[0])
            .arg(self.iface)
            .args(args[1..].iter().copied())
    }

    fn query(&self, flag: &str) -> Result<(Invocation, BTreeMap<String, String>)> {
        let invocation = self.cmd(&[flag]);
        let output = self.runner.run(&invocation).map_err(|e| {
            e.with_hint(format!(
                "the interface {}, specified in the configuration file, is invalid",
                self.iface
            ))
        })?;
        Ok((invocation, parse_colon_pairs(&output.stdout)))
    }

    /// Driver information (`ethtool -i`).
    pub fn driver_info(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.query("-i")?.1)
    }

    /// Toggle an offload feature (`ethtool -K`), remembering its state.
    ///
    /// `feature` is the short name (`gso`), `long_name` the key printed by
    /// `ethtool -k` (`generic-segmentation-offload`).
    pub fn set_feature(
        &self,
        feature: &str,
        long_name: &str,
        state: &str,
        actions: &mut ActionStack,
    ) -> Result<()> {
        let (query, features) = self.query("-k")?;
        let old = features
            .get(long_name)
            .and_then(|v| v.split_whitespace().next())
            .ok_or_else(|| unexpected(&query, format!("no '{long_name}' feature")))?
            .to_string();

        self.runner.run(&self.cmd(&["-K", feature, state]))?;
        actions.push(
            format!("{} {feature} {state}", self.iface),
            Undo::Command(self.cmd(&["-K", feature, &old])),
        );
        Ok(())
    }

    pub fn set_gso(&self, state: &str, actions: &mut ActionStack) -> Result<()> {
        self.set_feature("gso", "generic-segmentation-offload", state, actions)
    }

    pub fn set_tso(&self, state: &str, actions: &mut ActionStack) -> Result<()> {
        self.set_feature("tso", "tcp-segmentation-offload", state, actions)
    }

    /// Hardware VLAN tag stripping on receive.
    pub fn set_rxvlan(&self, state: &str, actions: &mut ActionStack) -> Result<()> {
        self.set_feature("rxvlan", "rx-vlan-offload", state, actions)
    }

    /// Set an interrupt coalescing option (`ethtool -C`) if it differs.
    pub fn set_coalescing(&self, option: &str, value: u32, actions: &mut ActionStack) -> Result<()> {
        let (query, options) = self.query("-c")?;
        let current = options
            .get(option)
            .ok_or_else(|| unexpected(&query, format!("no '{option}' coalescing option")))?
            .clone();
        let value = value.to_string();
        if current == value {
            return Ok(());
        }

        self.runner.run(&self.cmd(&["-C", option, &value]))?;
        actions.push(
            format!("{} {option} {value}", self.iface),
            Undo::Command(self.cmd(&["-C", option, &current])),
        );
        Ok(())
    }

    /// Switch Energy Efficient Ethernet on or off.
    pub fn set_eee(&self, state: &str, actions: &mut ActionStack) -> Result<()> {
        let (_, eee) = self.query("--show-eee")?;
        let old = match eee.get("EEE status").map(String::as_str) {
            Some("disabled") => "off",
            _ => "on",
        };
        self.runner.run(&self.cmd(&["--set-eee", "eee", state]))?;
        actions.push(
            format!("{} eee {state}", self.iface),
            Undo::Command(self.cmd(&["--set-eee", "eee", old])),
        );
        Ok(())
    }

    /// Add an ntuple rule (`ethtool -N ... action <queue>`) and record its
    /// deletion by the id ethtool reports.
    pub fn add_rx_rule(&self, rule: &[String], queue: u32, actions: &mut ActionStack) -> Result<()> {
        let mut args: Vec<&str> = vec!["-N", "flow-type", "ether"];
        args.extend(rule.iter().map(String::as_str));
        let queue = queue.to_string();
        args.extend(["action", queue.as_str()]);

        let invocation = self.cmd(&args);
        let output = self.runner.run(&invocation)?;
        if !output.stderr.trim().is_empty() {
            return Err(ExternalToolError::Failed {
                command: invocation.to_string(),
                stderr: output.stderr,
                hint: None,
            }
            .into());
        }
        let id = output
            .stdout
            .split_whitespace()
            .last()
            .ok_or_else(|| unexpected(&invocation, "no rule id in output"))?;
        actions.push(
            format!("{} rx rule {id} -> queue {queue}", self.iface),
            Undo::Command(self.cmd(&["-N", "delete", id])),
        );
        Ok(())
    }
}

/// Link state reported by `ip addr show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub state: String,
    pub mac: String,
    pub mtu: String,
}

/// `ip` operations on one interface.
pub struct IpLink<'a> {
    runner: &'a dyn ToolRunner,
    iface: &'a str,
}

impl<'a> IpLink<'a> {
    pub fn new(runner: &'a dyn ToolRunner, iface: &'a str) -> Self {
        Self { runner, iface }
    }

    fn run(&self, invocation: Invocation) -> Result<ToolOutput> {
        Ok(self.runner.run(&invocation)?)
    }

    pub fn info(&self) -> Result<LinkInfo> {
        let invocation = Invocation::new("ip").args(["addr", "show", self.iface]);
        let output = self.run(invocation.clone())?;
        let field = |keyword: &str| {
            token_after(&output.stdout, keyword)
                .map(str::to_string)
                .ok_or_else(|| unexpected(&invocation, format!("no '{keyword}' field")))
        };
        Ok(LinkInfo {
            state: field("state")?,
            mac: field("link/ether")?,
            mtu: field("mtu")?,
        })
    }

    fn link_set(&self, args: &[&str]) -> Invocation {
        Invocation::new("ip")
            .args(["link", "set", "dev", self.iface])
            .args(args.iter().copied())
    }

    /// Bring the link up, recording `down` as its undo.
    pub fn set_up(&self, actions: &mut ActionStack) -> Result<()> {
        self.run(self.link_set(&["up"]))?;
        actions.push(format!("{} up", self.iface), Undo::Command(self.link_set(&["down"])));
        Ok(())
    }

    pub fn set_mtu(&self, mtu: u32, actions: &mut ActionStack) -> Result<()> {
        let old = self.info()?.mtu;
        let mtu = mtu.to_string();
        self.run(self.link_set(&["mtu", &mtu]))?;
        actions.push(
            format!("{} mtu {mtu}", self.iface),
            Undo::Command(self.link_set(&["mtu", &old])),
        );
        Ok(())
    }

    /// Create VLAN `name` with `id` on this link, mapping socket priorities
    /// 2 and 3 to the same PCP.
    pub fn add_vlan(&self, name: &str, id: u16, actions: &mut ActionStack) -> Result<()> {
        self.run(
            Invocation::new("ip")
                .args(["link", "add", "link", self.iface, "name", name])
                .args(["type", "vlan", "id"])
                .arg(id.to_string())
                .args(["egress-qos-map", "2:2", "3:3"]),
        )?;
        actions.push(
            format!("vlan {name}"),
            Undo::Command(Invocation::new("ip").args(["link", "del", name])),
        );
        Ok(())
    }

    /// Assign `address/24`. Removed together with the interface.
    pub fn add_address(&self, address: &str) -> Result<()> {
        self.run(
            Invocation::new("ip")
                .args(["addr", "add"])
                .arg(format!("{address}/24"))
                .args(["dev", self.iface]),
        )?;
        Ok(())
    }

    /// Accept a multicast MAC address on this link.
    pub fn add_multicast(&self, mac: &str, actions: &mut ActionStack) -> Result<()> {
        let maddr = |verb: &str| {
            Invocation::new("ip")
                .args(["maddr", verb, mac, "dev", self.iface])
        };
        self.run(maddr("add"))?;
        actions.push(format!("{} maddr {mac}", self.iface), Undo::Command(maddr("del")));
        Ok(())
    }
}

/// Physical link beneath a VLAN interface, from `ip link show`
/// (`7: tsn_vlan@enp1s0: <...>`). Non-VLAN interfaces map to themselves.
pub fn physical_interface(runner: &dyn ToolRunner, iface: &str) -> Result<String> {
    let invocation = Invocation::new("ip").args(["link", "show", iface]);
    let output = runner.run(&invocation)?;
    let first = output.stdout.lines().next().unwrap_or_default();
    match first.split_once('@') {
        Some((_, rest)) => rest
            .split(':')
            .next()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| unexpected(&invocation, "no parent link name").into()),
        None => Ok(iface.to_string()),
    }
}

/// Interrupt affinity through procfs.
pub struct IrqAffinity {
    proc_root: PathBuf,
}

impl IrqAffinity {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    /// IRQ number whose action name (last column of `/proc/interrupts`) is
    /// exactly `name`.
    pub fn irq_number(&self, name: &str) -> Result<String> {
        let path = self.proc_root.join("interrupts");
        let text = std::fs::read_to_string(&path)
            .map_err(|e| ExperimentError::io(format!("reading {}", path.display()), e))?;
        text.lines()
            .filter_map(|line| {
                let mut cols = line.split_whitespace();
                let first = cols.next()?;
                (cols.last()? == name).then(|| first.trim_end_matches(':').to_string())
            })
            .next()
            .ok_or_else(|| {
                ExperimentError::Platform(format!("IRQ not found. Does the interrupt ({name}) exist?"))
            })
    }

    fn affinity_path(&self, irq: &str) -> PathBuf {
        self.proc_root.join("irq").join(irq).join("smp_affinity")
    }

    /// Pin interrupt `name` to `mask`, recording the previous mask.
    pub fn pin(&self, name: &str, mask: &str, actions: &mut ActionStack) -> Result<()> {
        let irq = self.irq_number(name)?;
        let path = self.affinity_path(&irq);
        let previous = read(&path)?;
        write(&path, mask)?;
        info!(irq = %irq, name, mask, "pinned rx interrupt");
        actions.push(
            format!("irq {irq} smp_affinity {mask}"),
            Undo::WriteFile {
                path,
                contents: previous,
            },
        );
        Ok(())
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| ExperimentError::io(format!("reading {}", path.display()), e))
}

fn write(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents)
        .map_err(|e| ExperimentError::io(format!("writing {}", path.display()), e))
}
