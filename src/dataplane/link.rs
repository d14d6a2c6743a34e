//! Link-layer collaborator and local interface identity

use crate::protocol::ipv4::same_network;
use crate::protocol::MacAddr;
use crate::Result;
use serde::Deserialize;
use std::net::Ipv4Addr;

/// Receive filter the NIC is running with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RxMode {
    #[default]
    Normal,
    AllMulticast,
    Promiscuous,
}

impl RxMode {
    /// Modes in which we may see unicast frames not addressed to us.
    ///
    /// Answering a non-broadcast ARP request in these modes would reveal the
    /// NIC is sniffing.
    pub fn is_restricted(&self) -> bool {
        !matches!(self, RxMode::Normal)
    }
}

/// Identity of the single interface the resolver serves
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub mac: MacAddr,
    /// False for point-to-point links (PPP, SLIP) where ARP is meaningless
    pub broadcast: bool,
    pub rx_mode: RxMode,
}

impl InterfaceInfo {
    pub fn new(ip: Ipv4Addr, netmask: Ipv4Addr, mac: MacAddr) -> Self {
        Self {
            ip,
            netmask,
            mac,
            broadcast: true,
            rx_mode: RxMode::Normal,
        }
    }

    /// `(dest ^ local_ip) & netmask == 0`
    pub fn is_on_link(&self, dest: Ipv4Addr) -> bool {
        same_network(dest, self.ip, self.netmask)
    }

    /// Subnet-directed broadcast address
    pub fn broadcast_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.ip) | !u32::from(self.netmask))
    }

    pub fn is_local(&self, addr: Ipv4Addr) -> bool {
        addr == self.ip
    }

    /// Local, and an address we would answer ARP for
    pub fn owns(&self, addr: Ipv4Addr) -> bool {
        self.is_local(addr) && !addr.is_multicast() && !addr.is_loopback()
    }
}

/// Packet I/O supplied by the surrounding stack.
pub trait Link {
    /// Transmit a complete Ethernet frame.
    fn transmit(&mut self, frame: &[u8]) -> Result<()>;

    /// Next received Ethernet frame, if one is waiting.
    fn receive(&mut self) -> Option<Vec<u8>>;

    /// Send an ICMP message to `dst` with the given IP TTL.
    fn send_icmp(&mut self, dst: Ipv4Addr, ttl: u8, message: &[u8]) -> Result<()>;

    /// Cooperative yield between polls of a blocking resolve.
    fn relax(&mut self) {}
}
