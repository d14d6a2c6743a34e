//! ARP (Address Resolution Protocol) - RFC 826, Ethernet/IPv4 only

use super::ethernet::FrameBuilder;
use super::{EtherType, MacAddr};
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// ARP payload size for Ethernet/IPv4
pub const ARP_PACKET_SIZE: usize = 28;

/// Hardware type: Ethernet
pub const HTYPE_ETHERNET: u16 = 1;
/// Protocol type: IPv4
pub const PTYPE_IPV4: u16 = EtherType::Ipv4 as u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ArpOp {
    Request = 1,
    Reply = 2,
}

impl ArpOp {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(ArpOp::Request),
            2 => Some(ArpOp::Reply),
            _ => None,
        }
    }
}

/// ARP packet (Ethernet/IPv4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub operation: ArpOp,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

fn read_mac(buf: &[u8], at: usize) -> MacAddr {
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&buf[at..at + 6]);
    MacAddr(mac)
}

fn read_ip(buf: &[u8], at: usize) -> Ipv4Addr {
    Ipv4Addr::new(buf[at], buf[at + 1], buf[at + 2], buf[at + 3])
}

impl ArpPacket {
    /// Parse and validate an ARP payload.
    ///
    /// Anything other than Ethernet/IPv4 with 6/4 byte addresses is rejected
    /// as malformed; the caller drops and counts it.
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < ARP_PACKET_SIZE {
            return Err(Error::Malformed("ARP packet too short"));
        }
        if read_u16(buffer, 0) != HTYPE_ETHERNET {
            return Err(Error::Malformed("unsupported ARP hardware type"));
        }
        if read_u16(buffer, 2) != PTYPE_IPV4 {
            return Err(Error::Malformed("unsupported ARP protocol type"));
        }
        if buffer[4] != 6 || buffer[5] != 4 {
            return Err(Error::Malformed("invalid ARP address length"));
        }
        let operation = ArpOp::from_u16(read_u16(buffer, 6))
            .ok_or(Error::Malformed("unknown ARP operation"))?;

        Ok(Self {
            operation,
            sender_mac: read_mac(buffer, 8),
            sender_ip: read_ip(buffer, 14),
            target_mac: read_mac(buffer, 18),
            target_ip: read_ip(buffer, 24),
        })
    }

    pub fn to_bytes(&self) -> [u8; ARP_PACKET_SIZE] {
        let mut buf = [0u8; ARP_PACKET_SIZE];
        buf[0..2].copy_from_slice(&HTYPE_ETHERNET.to_be_bytes());
        buf[2..4].copy_from_slice(&PTYPE_IPV4.to_be_bytes());
        buf[4] = 6;
        buf[5] = 4;
        buf[6..8].copy_from_slice(&(self.operation as u16).to_be_bytes());
        buf[8..14].copy_from_slice(&self.sender_mac.0);
        buf[14..18].copy_from_slice(&self.sender_ip.octets());
        buf[18..24].copy_from_slice(&self.target_mac.0);
        buf[24..28].copy_from_slice(&self.target_ip.octets());
        buf
    }

    /// Wrap the packet in an Ethernet II frame from `sender_mac` to `dst`.
    pub fn to_frame(&self, dst: MacAddr) -> Vec<u8> {
        FrameBuilder::new()
            .dst_mac(dst)
            .src_mac(self.sender_mac)
            .ethertype(EtherType::Arp as u16)
            .payload(&self.to_bytes())
            .build()
    }

    pub fn request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self {
            operation: ArpOp::Request,
            sender_mac,
            sender_ip,
            target_mac: MacAddr::ZERO,
            target_ip,
        }
    }

    pub fn reply(
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            operation: ArpOp::Reply,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    /// Announcement of our own binding (sender IP == target IP)
    pub fn gratuitous(mac: MacAddr, ip: Ipv4Addr) -> Self {
        Self::request(mac, ip, ip)
    }

    pub fn is_gratuitous(&self) -> bool {
        self.sender_ip == self.target_ip
    }
}
