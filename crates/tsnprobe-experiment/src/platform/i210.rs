//! Intel I210 profile.

use tracing::{info, warn};

use super::{NicProfile, SetupContext};
use crate::config::Role;
use crate::error::{ExperimentError, Result};
use crate::runner::SocketFamily;

/// EtherType of PTP frames, steered with background traffic.
const PTP_ETHERTYPE: u16 = 0x88F7;

/// Intel I210 (igb driver).
#[derive(Debug, Clone, Copy, Default)]
pub struct I210;

impl NicProfile for I210 {
    fn name(&self) -> &'static str {
        "i210"
    }

    fn irq_name(&self, interface: &str) -> String {
        format!("{interface}-TxRx-")
    }

    fn enable_optimisations(&self, ctx: &mut SetupContext<'_>) -> Result<()> {
        ctx.ip().set_mtu(1514, ctx.actions)?;

        let ethtool = ctx.ethtool();
        ethtool.set_gso("off", ctx.actions)?;
        ethtool.set_tso("off", ctx.actions)?;
        ethtool.set_coalescing("rx-usecs", 0, ctx.actions)?;

        // AF_XDP needs the tag in the frame to match on VLAN priority.
        let rxvlan = match ctx.settings.socket_family {
            SocketFamily::AfXdp => "off",
            SocketFamily::AfPacket => "on",
        };
        ethtool.set_rxvlan(rxvlan, ctx.actions)?;

        match ethtool.set_eee("off", ctx.actions) {
            Err(ExperimentError::Tool(err)) if err.stderr_contains("Operation not supported") => {
                warn!("Energy Efficient Ethernet not supported on NIC");
                Ok(())
            }
            other => other,
        }
    }

    fn setup_rx_filters(&self, ctx: &mut SetupContext<'_>) -> Result<()> {
        let settings = ctx.settings;
        if settings.role != Role::Listener || settings.rx_irq_affinity.is_none() {
            return Ok(());
        }
        let missing = |what: &str| ExperimentError::Platform(format!("rx filters need the {what}"));
        let tsn_queue = settings.tsn_hw_queue.ok_or_else(|| missing("TSN hardware queue"))?;
        let other_queue = settings.other_hw_queue.ok_or_else(|| missing("other hardware queue"))?;
        let priority = settings.vlan_priority.ok_or_else(|| missing("VLAN priority"))?;

        let vlan_rule = |prio: u32| {
            vec![
                "vlan".to_string(),
                (prio << 13).to_string(),
                "vlan-mask".to_string(),
                "0x1FFF".to_string(),
            ]
        };
        let ethtool = ctx.ethtool();
        ethtool.add_rx_rule(&vlan_rule(priority), tsn_queue, ctx.actions)?;
        // Priority 0 is best effort.
        ethtool.add_rx_rule(&vlan_rule(0), other_queue, ctx.actions)?;
        ethtool.add_rx_rule(
            &["proto".to_string(), PTP_ETHERTYPE.to_string()],
            other_queue,
            ctx.actions,
        )?;
        info!(tsn_queue, other_queue, priority, "rx queue steering installed");
        Ok(())
    }
}
