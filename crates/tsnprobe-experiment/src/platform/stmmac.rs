//! Synopsys DesignWare (stmmac) profile.

use super::actions::Undo;
use super::{NicProfile, SetupContext};
use crate::config::Role;
use crate::error::Result;
use crate::process::Invocation;
use crate::runner::SocketFamily;

/// Synopsys DesignWare MAC (stmmac driver).
#[derive(Debug, Clone, Copy, Default)]
pub struct Stmmac;

impl NicProfile for Stmmac {
    fn name(&self) -> &'static str {
        "stmmac"
    }

    fn irq_name(&self, interface: &str) -> String {
        format!("{interface}:rx-")
    }

    fn enable_optimisations(&self, ctx: &mut SetupContext<'_>) -> Result<()> {
        let ethtool = ctx.ethtool();
        ethtool.set_tso("off", ctx.actions)?;
        if ctx.settings.role == Role::Listener {
            let rxvlan = match ctx.settings.socket_family {
                SocketFamily::AfXdp => "off",
                SocketFamily::AfPacket => "on",
            };
            ethtool.set_rxvlan(rxvlan, ctx.actions)?;
        }
        ethtool.set_coalescing("rx-usecs", 5, ctx.actions)?;
        ethtool.set_coalescing("tx-usecs", 1000, ctx.actions)?;
        ethtool.set_coalescing("tx-frames", 1, ctx.actions)
    }

    /// The driver installs an ingress qdisc while receive timestamping is
    /// on; the listener removes it on teardown.
    fn setup_rx_filters(&self, ctx: &mut SetupContext<'_>) -> Result<()> {
        if ctx.settings.role == Role::Listener {
            let iface = ctx.settings.interface.as_str();
            ctx.actions.push(
                format!("{iface} ingress qdisc"),
                Undo::Command(
                    Invocation::new("tc").args(["qdisc", "del", "dev", iface, "parent", "ffff:"]),
                ),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::actions::ActionStack;
    use super::super::testing::{host, settings};
    use super::*;

    #[test]
    fn listener_tuning_and_cleanup() {
        let runner = host();
        let settings = settings(Role::Listener, std::path::Path::new("/proc"));
        let mut actions = ActionStack::new();
        let mut ctx = SetupContext {
            runner: &runner,
            settings: &settings,
            actions: &mut actions,
        };
        Stmmac.enable_optimisations(&mut ctx).unwrap();
        Stmmac.setup_rx_filters(&mut ctx).unwrap();

        let sets: Vec<String> = runner
            .calls("run")
            .into_iter()
            .filter(|r| r.starts_with("ethtool -K") || r.starts_with("ethtool -C"))
            .collect();
        assert_eq!(
            sets,
            [
                "ethtool -K enp1s0 tso off",
                "ethtool -K enp1s0 rxvlan on",
                "ethtool -C enp1s0 rx-usecs 5",
                "ethtool -C enp1s0 tx-usecs 1000",
                "ethtool -C enp1s0 tx-frames 1"
            ]
        );
        assert_eq!(actions.descriptions().last().copied(), Some("enp1s0 ingress qdisc"));

        actions.unwind(&runner);
        assert_eq!(
            runner.calls("run").last().map(String::as_str),
            Some("ethtool -K enp1s0 tso on")
        );
        assert!(runner
            .calls("run")
            .contains(&"tc qdisc del dev enp1s0 parent ffff:".to_string()));
    }

    #[test]
    fn talker_keeps_vlan_stripping() {
        let runner = host();
        let settings = settings(Role::Talker, std::path::Path::new("/proc"));
        let mut actions = ActionStack::new();
        let mut ctx = SetupContext {
            runner: &runner,
            settings: &settings,
            actions: &mut actions,
        };
        Stmmac.enable_optimisations(&mut ctx).unwrap();
        Stmmac.setup_rx_filters(&mut ctx).unwrap();
        assert!(!runner.calls("run").iter().any(|r| r.contains("rxvlan")));
        assert!(!actions.descriptions().iter().any(|d| d.contains("ingress")));
    }
}
