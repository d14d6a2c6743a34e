//! ICMP (Internet Control Message Protocol) - RFC 792
//!
//! Echo requests for gateway probing and Redirect parsing.

use super::ipv4::Ipv4Header;
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// ICMP header size (minimum)
pub const ICMP_HEADER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IcmpType {
    EchoReply = 0,
    DestinationUnreachable = 3,
    Redirect = 5,
    EchoRequest = 8,
    TimeExceeded = 11,
}

impl IcmpType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(IcmpType::EchoReply),
            3 => Some(IcmpType::DestinationUnreachable),
            5 => Some(IcmpType::Redirect),
            8 => Some(IcmpType::EchoRequest),
            11 => Some(IcmpType::TimeExceeded),
            _ => None,
        }
    }
}

/// Redirect codes (RFC 792)
pub mod redirect {
    pub const NETWORK: u8 = 0;
    pub const HOST: u8 = 1;
    pub const TOS_NETWORK: u8 = 2;
    pub const TOS_HOST: u8 = 3;
}

/// Parsed ICMP message
#[derive(Debug)]
pub struct IcmpPacket<'a> {
    buffer: &'a [u8],
}

impl<'a> IcmpPacket<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < ICMP_HEADER_SIZE {
            return Err(Error::Parse("ICMP packet too short".into()));
        }
        Ok(Self { buffer })
    }

    pub fn icmp_type(&self) -> u8 {
        self.buffer[0]
    }

    pub fn code(&self) -> u8 {
        self.buffer[1]
    }

    pub fn message_type(&self) -> Option<IcmpType> {
        IcmpType::from_u8(self.icmp_type())
    }

    pub fn identifier(&self) -> u16 {
        u16::from_be_bytes([self.buffer[4], self.buffer[5]])
    }

    pub fn sequence(&self) -> u16 {
        u16::from_be_bytes([self.buffer[6], self.buffer[7]])
    }

    pub fn validate_checksum(&self) -> bool {
        icmp_checksum(self.buffer) == 0
    }

    /// Redirect: the suggested gateway carried in the second header word
    pub fn redirect_gateway(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[4],
            self.buffer[5],
            self.buffer[6],
            self.buffer[7],
        )
    }

    /// Error messages quote the original IP header plus 8 bytes
    pub fn original_datagram(&self) -> &[u8] {
        &self.buffer[ICMP_HEADER_SIZE..]
    }
}

/// A decoded Redirect: traffic for `target` should go through `gateway`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redirect {
    pub code: u8,
    pub gateway: Ipv4Addr,
    pub target: Ipv4Addr,
}

impl Redirect {
    pub fn parse(message: &[u8]) -> Result<Self> {
        let packet = IcmpPacket::parse(message)?;
        if packet.message_type() != Some(IcmpType::Redirect) {
            return Err(Error::Parse("not an ICMP redirect".into()));
        }
        if packet.code() > redirect::TOS_HOST {
            return Err(Error::Parse("unknown ICMP redirect code".into()));
        }
        if !packet.validate_checksum() {
            return Err(Error::Parse("ICMP checksum mismatch".into()));
        }
        let original = Ipv4Header::parse(packet.original_datagram())?;
        Ok(Self {
            code: packet.code(),
            gateway: packet.redirect_gateway(),
            target: original.dst_addr(),
        })
    }
}

/// Build an Echo Request with the given identifier, sequence and payload
pub fn build_echo_request(identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0u8; ICMP_HEADER_SIZE + payload.len()];
    packet[0] = IcmpType::EchoRequest as u8;
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());
    packet[ICMP_HEADER_SIZE..].copy_from_slice(payload);

    let checksum = icmp_checksum(&packet);
    packet[2..4].copy_from_slice(&checksum.to_be_bytes());
    packet
}

/// Build a Redirect message quoting `original` (IP header + 8 bytes)
pub fn build_redirect(code: u8, gateway: Ipv4Addr, original: &[u8]) -> Vec<u8> {
    let mut packet = vec![0u8; ICMP_HEADER_SIZE + original.len()];
    packet[0] = IcmpType::Redirect as u8;
    packet[1] = code;
    packet[4..8].copy_from_slice(&gateway.octets());
    packet[ICMP_HEADER_SIZE..].copy_from_slice(original);

    let checksum = icmp_checksum(&packet);
    packet[2..4].copy_from_slice(&checksum.to_be_bytes());
    packet
}

/// Internet checksum over the whole message
pub fn icmp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for chunk in data.chunks(2) {
        let word = match chunk {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [hi] => u16::from_be_bytes([*hi, 0]),
            _ => 0,
        };
        sum = sum.wrapping_add(word as u32);
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}
