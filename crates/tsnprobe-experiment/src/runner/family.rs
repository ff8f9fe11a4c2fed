use std::fmt;
use std::str::FromStr;

use crate::error::TemplateError;
use crate::template::Template;
use crate::trace::PerfEvent;

/// Data-plane socket family of the talker and listener tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketFamily {
    AfPacket,
    AfXdp,
}

impl FromStr for SocketFamily {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AF_PACKET" => Ok(SocketFamily::AfPacket),
            "AF_XDP" => Ok(SocketFamily::AfXdp),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SocketFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SocketFamily::AfPacket => "AF_PACKET",
            SocketFamily::AfXdp => "AF_XDP",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XdpMode {
    Skb,
    Native,
}

impl FromStr for XdpMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SKB" => Ok(XdpMode::Skb),
            "Native" => Ok(XdpMode::Native),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XdpCopyMode {
    Copy,
    ZeroCopy,
}

impl FromStr for XdpCopyMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Copy" => Ok(XdpCopyMode::Copy),
            "Zero-Copy" => Ok(XdpCopyMode::ZeroCopy),
            _ => Err(()),
        }
    }
}

/// AF_XDP socket options shared by both roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XdpSetup {
    pub needs_wakeup: bool,
    pub mode: XdpMode,
    pub copy_mode: XdpCopyMode,
}

impl XdpSetup {
    /// Flags for `tsn-talker`/`tsn-listener`, after the queue arguments.
    pub fn flags(&self) -> Vec<String> {
        let mut flags = Vec::with_capacity(3);
        if self.needs_wakeup {
            flags.push("-w".to_string());
        }
        flags.push(
            match self.mode {
                XdpMode::Native => "-N",
                XdpMode::Skb => "-S",
            }
            .to_string(),
        );
        flags.push(
            match self.copy_mode {
                XdpCopyMode::Copy => "-C",
                XdpCopyMode::ZeroCopy => "-Z",
            }
            .to_string(),
        );
        flags
    }
}

/// Talker data-plane binary.
pub const TALKER_BINARY: &str = "tsn-talker";
/// Listener data-plane binary.
pub const LISTENER_BINARY: &str = "tsn-listener";

/// perf script turning a talker capture into per-packet transmit sub-events.
pub const TALKER_PERF_SCRIPT: &str = "tx-intermediate-perf-script.py";
/// perf script turning a listener capture into per-packet receive sub-events.
pub const LISTENER_PERF_SCRIPT: &str = "rx-intermediate-perf-script.py";

/// EtherType of the experiment frames.
const TSN_ETHERTYPE_FILTER: &str = "protocol == 0x22f0";

impl SocketFamily {
    /// Events traced on the talker. Empty for families without tracing.
    pub fn talker_events(self) -> Result<Vec<PerfEvent>, TemplateError> {
        match self {
            SocketFamily::AfXdp => Ok(Vec::new()),
            SocketFamily::AfPacket => Ok(vec![
                PerfEvent::filtered(
                    "syscalls:sys_enter_sendto",
                    Template::parse(&format!("comm == '{TALKER_BINARY}'"))?,
                ),
                PerfEvent::filtered("net:net_dev_queue", Template::parse("len <= $payload_len")?),
                PerfEvent::filtered(
                    "net:net_dev_start_xmit",
                    Template::parse(&format!("{TSN_ETHERTYPE_FILTER} || vlan_tci == $vlan_tci"))?,
                ),
                PerfEvent::filtered("net:net_dev_xmit", Template::parse("len <= $payload_len")?),
            ]),
        }
    }

    /// Events traced on the listener. `irq_name` is the receive queue IRQ
    /// name prefix.
    pub fn listener_events(self, irq_name: &str) -> Result<Vec<PerfEvent>, TemplateError> {
        match self {
            SocketFamily::AfXdp => Ok(Vec::new()),
            SocketFamily::AfPacket => Ok(vec![
                PerfEvent::filtered(
                    "irq:irq_handler_entry",
                    Template::parse(&format!("name ~ '{irq_name}*'"))?,
                ),
                PerfEvent::filtered("net:napi_gro_receive_entry", Template::parse(TSN_ETHERTYPE_FILTER)?),
                PerfEvent::filtered(
                    "net:netif_receive_skb",
                    Template::parse("name ~ '$phy_name*' && len <= $payload_len")?,
                ),
                PerfEvent::filtered(
                    "syscalls:sys_exit_recvmsg",
                    Template::parse(&format!("comm == '{LISTENER_BINARY}'"))?,
                ),
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Placeholder;

    #[test]
    fn parses_config_names() {
        assert_eq!("AF_XDP".parse::<SocketFamily>(), Ok(SocketFamily::AfXdp));
        assert!("af_packet".parse::<SocketFamily>().is_err());
        assert_eq!("Zero-Copy".parse::<XdpCopyMode>(), Ok(XdpCopyMode::ZeroCopy));
        assert_eq!("SKB".parse::<XdpMode>(), Ok(XdpMode::Skb));
    }

    #[test]
    fn xdp_flags() {
        let setup = XdpSetup {
            needs_wakeup: true,
            mode: XdpMode::Native,
            copy_mode: XdpCopyMode::Copy,
        };
        assert_eq!(setup.flags(), ["-w", "-N", "-C"]);

        let setup = XdpSetup {
            needs_wakeup: false,
            mode: XdpMode::Skb,
            copy_mode: XdpCopyMode::ZeroCopy,
        };
        assert_eq!(setup.flags(), ["-S", "-Z"]);
    }

    #[test]
    fn af_packet_talker_events() {
        let events = SocketFamily::AfPacket.talker_events().unwrap();
        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            [
                "syscalls:sys_enter_sendto",
                "net:net_dev_queue",
                "net:net_dev_start_xmit",
                "net:net_dev_xmit"
            ]
        );
        let start_xmit = events[2].filter().unwrap();
        assert_eq!(start_xmit.placeholders().collect::<Vec<_>>(), [Placeholder::VlanTci]);
    }

    #[test]
    fn listener_irq_filter_uses_prefix() {
        let events = SocketFamily::AfPacket.listener_events("enp1s0-TxRx-").unwrap();
        assert_eq!(events[0].filter().unwrap().as_str(), "name ~ 'enp1s0-TxRx-*'");
    }

    #[test]
    fn xdp_has_no_events() {
        assert!(SocketFamily::AfXdp.talker_events().unwrap().is_empty());
        assert!(SocketFamily::AfXdp.listener_events("x").unwrap().is_empty());
    }
}
