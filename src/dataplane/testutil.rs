//! Shared fixtures for dataplane unit tests

use super::link::{InterfaceInfo, Link};
use crate::protocol::arp::{ArpOp, ArpPacket};
use crate::protocol::ethernet::Frame;
use crate::protocol::{EtherType, MacAddr};
use crate::{Error, Result};
use std::collections::VecDeque;
use std::net::Ipv4Addr;

pub fn iface() -> InterfaceInfo {
    InterfaceInfo::new(
        Ipv4Addr::new(192, 168, 1, 10),
        Ipv4Addr::new(255, 255, 255, 0),
        MacAddr([0x02, 0, 0, 0, 0, 0x10]),
    )
}

/// An address on the interface's subnet
pub fn host(n: u8) -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 1, n)
}

#[derive(Debug, Default)]
pub struct RecordingLink {
    pub sent: Vec<Vec<u8>>,
    pub icmp: Vec<(Ipv4Addr, u8, Vec<u8>)>,
    pub inbox: VecDeque<Vec<u8>>,
    fail: bool,
}

impl RecordingLink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn arp_packets(&self) -> Vec<ArpPacket> {
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

    pub fn arp_requests(&self) -> Vec<ArpPacket> {
        self.arp_packets()
            .into_iter()
            .filter(|p| p.operation == ArpOp::Request)
            .collect()
    }

    pub fn arp_replies(&self) -> Vec<ArpPacket> {
        self.arp_packets()
            .into_iter()
            .filter(|p| p.operation == ArpOp::Reply)
            .collect()
    }
}

impl Link for RecordingLink {
    fn transmit(&mut self, frame: &[u8]) -> Result<()> {
        if self.fail {
            return Err(Error::Transmit("link down".into()));
        }
        self.sent.push(frame.to_vec());
        Ok(())
    }

    fn receive(&mut self) -> Option<Vec<u8>> {
        self.inbox.pop_front()
    }

    fn send_icmp(&mut self, dst: Ipv4Addr, ttl: u8, message: &[u8]) -> Result<()> {
        self.icmp.push((dst, ttl, message.to_vec()));
        Ok(())
    }
}
