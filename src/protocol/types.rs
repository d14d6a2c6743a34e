//! Common link-layer types

use std::fmt;
use std::str::FromStr;

/// Ethernet hardware address
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);
    /// All-zero address, used for unresolved entries and point-to-point links
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_unicast(&self) -> bool {
        !self.is_multicast()
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Error returned when a MAC address string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseMacAddrError {
    Length,
    Format,
    Hex,
}

impl fmt::Display for ParseMacAddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseMacAddrError::Length => write!(f, "invalid MAC address length"),
            ParseMacAddrError::Format => write!(f, "invalid MAC address format"),
            ParseMacAddrError::Hex => write!(f, "invalid hex digit in MAC address"),
        }
    }
}

impl std::error::Error for ParseMacAddrError {}

impl FromStr for MacAddr {
    type Err = ParseMacAddrError;

    /// Accepts `00:11:22:33:44:55`, `00-11-22-33-44-55` and `001122334455`.
    /// Single-digit groups (`0:1:2:a:b:c`) are accepted as written by ethers files.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let groups: Vec<&str> = if s.contains(':') {
            s.split(':').collect()
        } else if s.contains('-') {
            s.split('-').collect()
        } else if s.len() == 12 && s.is_ascii() {
            (0..6).map(|i| &s[i * 2..i * 2 + 2]).collect()
        } else {
            return Err(ParseMacAddrError::Format);
        };

        if groups.len() != 6 {
            return Err(ParseMacAddrError::Length);
        }

        let mut mac = [0u8; 6];
        for (byte, group) in mac.iter_mut().zip(&groups) {
            if group.is_empty() || group.len() > 2 {
                return Err(ParseMacAddrError::Format);
            }
            *byte = u8::from_str_radix(group, 16).map_err(|_| ParseMacAddrError::Hex)?;
        }

        Ok(MacAddr(mac))
    }
}

/// EtherType values this crate sends or inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EtherType {
    Ipv4 = 0x0800,
    Arp = 0x0806,
}

impl EtherType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0800 => Some(EtherType::Ipv4),
            0x0806 => Some(EtherType::Arp),
            _ => None,
        }
    }
}
