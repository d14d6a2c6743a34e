//! Simulated Ethernet segment
//!
//! Stations on the segment answer ARP requests for their address and, if
//! they are routers, echo requests sent to them. Everything the resolver
//! transmits is recorded.

use ruster_resolver::dataplane::{InterfaceInfo, Link};
use ruster_resolver::protocol::arp::{ArpOp, ArpPacket};
use ruster_resolver::protocol::ethernet::{Frame, FrameBuilder};
use ruster_resolver::protocol::icmp::{IcmpPacket, IcmpType};
use ruster_resolver::protocol::{EtherType, MacAddr};
use ruster_resolver::Result;
use std::collections::VecDeque;
use std::net::Ipv4Addr;

#[derive(Debug, Clone)]
struct Station {
    ip: Ipv4Addr,
    mac: MacAddr,
    answers_arp: bool,
    answers_echo: bool,
}

#[derive(Debug)]
pub struct Lan {
    us: InterfaceInfo,
    stations: Vec<Station>,
    inbox: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
    pub probes: Vec<Ipv4Addr>,
}

impl Lan {
    pub fn new(us: &InterfaceInfo) -> Self {
        Self {
            us: us.clone(),
            stations: Vec::new(),
            inbox: VecDeque::new(),
            sent: Vec::new(),
            probes: Vec::new(),
        }
    }

    /// A host that answers ARP
    pub fn host(mut self, ip: Ipv4Addr, mac: MacAddr) -> Self {
        self.stations.push(Station {
            ip,
            mac,
            answers_arp: true,
            answers_echo: false,
        });
        self
    }

    /// A router that answers ARP and echo requests
    pub fn router(mut self, ip: Ipv4Addr, mac: MacAddr) -> Self {
        self.stations.push(Station {
            ip,
            mac,
            answers_arp: true,
            answers_echo: true,
        });
        self
    }

    /// A router that answers ARP but ignores echo requests
    pub fn mute_router(mut self, ip: Ipv4Addr, mac: MacAddr) -> Self {
        self.stations.push(Station {
            ip,
            mac,
            answers_arp: true,
            answers_echo: false,
        });
        self
    }

    /// Queue a frame as if it arrived from the wire
    pub fn inject(&mut self, frame: Vec<u8>) {
        self.inbox.push_back(frame);
    }

    pub fn arp_sent(&self) -> Vec<ArpPacket> {
        self.sent
            .iter()
            .filter_map(|f| {
                let frame = Frame::parse(f).ok()?;
                if frame.ethertype() != EtherType::Arp as u16 {
                    return None;
                }
                ArpPacket::parse(frame.payload()).ok()
            })
            .collect()
    }

    /// Number of who-has requests we sent for `ip`
    pub fn requests_for(&self, ip: Ipv4Addr) -> usize {
        self.arp_sent()
            .iter()
            .filter(|p| p.operation == ArpOp::Request && p.target_ip == ip)
            .count()
    }

    /// An IPv4 frame carrying `message` from station `from` to us
    pub fn icmp_frame(&self, from: Ipv4Addr, message: &[u8]) -> Vec<u8> {
        let from_mac = self
            .stations
            .iter()
            .find(|s| s.ip == from)
            .map_or(MacAddr([0x02, 0, 0, 0, 0xff, 0xff]), |s| s.mac);

        let mut packet = vec![0u8; 20];
        packet[0] = 0x45;
        packet[8] = 64;
        packet[9] = 1;
        packet[12..16].copy_from_slice(&from.octets());
        packet[16..20].copy_from_slice(&self.us.ip.octets());
        packet.extend_from_slice(message);

        FrameBuilder::new()
            .dst_mac(self.us.mac)
            .src_mac(from_mac)
            .ethertype(EtherType::Ipv4 as u16)
            .payload(&packet)
            .build()
    }

    fn echo_reply(&self, from: &Station, request: &[u8]) -> Vec<u8> {
        let mut message = request.to_vec();
        message[0] = IcmpType::EchoReply as u8;
        self.icmp_frame(from.ip, &message)
    }
}

impl Link for Lan {
    fn transmit(&mut self, frame: &[u8]) -> Result<()> {
        self.sent.push(frame.to_vec());

        let parsed = Frame::parse(frame)?;
        if parsed.ethertype() != EtherType::Arp as u16 {
            return Ok(());
        }
        let packet = ArpPacket::parse(parsed.payload())?;
        if packet.operation != ArpOp::Request {
            return Ok(());
        }
        if let Some(station) = self
            .stations
            .iter()
            .find(|s| s.answers_arp && s.ip == packet.target_ip)
        {
            let reply = ArpPacket::reply(station.mac, station.ip, packet.sender_mac, packet.sender_ip);
            self.inbox.push_back(reply.to_frame(packet.sender_mac));
        }
        Ok(())
    }

    fn receive(&mut self) -> Option<Vec<u8>> {
        self.inbox.pop_front()
    }

    fn send_icmp(&mut self, dst: Ipv4Addr, _ttl: u8, message: &[u8]) -> Result<()> {
        self.probes.push(dst);
        let is_echo = IcmpPacket::parse(message)
            .map(|m| m.message_type() == Some(IcmpType::EchoRequest))
            .unwrap_or(false);
        if let Some(station) = self.stations.iter().find(|s| s.ip == dst && s.answers_echo) {
            if is_echo {
                let reply = self.echo_reply(station, message);
                self.inbox.push_back(reply);
            }
        }
        Ok(())
    }
}
