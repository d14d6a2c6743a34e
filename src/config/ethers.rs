//! ethers(5) style static table
//!
//! One `mac address` pair per line, `#` starts a comment. Only numeric IPv4
//! addresses are accepted; there is no name service to look hostnames up in.

use crate::protocol::MacAddr;
use crate::{Error, Result};
use std::net::Ipv4Addr;
use std::path::Path;

pub fn parse(text: &str) -> Result<Vec<(Ipv4Addr, MacAddr)>> {
    let mut entries = Vec::new();

    for (n, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split_whitespace();
        let (Some(mac), Some(addr), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(Error::Parse(format!("ethers line {}: expected 'mac address'", n + 1)));
        };
        let mac: MacAddr = mac
            .parse()
            .map_err(|e| Error::Parse(format!("ethers line {}: {}", n + 1, e)))?;
        let ip: Ipv4Addr = addr.parse().map_err(|_| {
            Error::Parse(format!("ethers line {}: '{}' is not an IPv4 address", n + 1, addr))
        })?;
        entries.push((ip, mac));
    }

    Ok(entries)
}

pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<(Ipv4Addr, MacAddr)>> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}
