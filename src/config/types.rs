//! Configuration types

use crate::dataplane::{ArpTimers, InterfaceInfo, RxMode};
use crate::protocol::MacAddr;
use crate::telemetry::LogConfig;
use crate::{Error, Result};
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;

/// User-defined configuration (resolver.toml)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub interface: InterfaceConfig,
    #[serde(default)]
    pub arp: ArpConfig,
    #[serde(default)]
    pub gateways: Vec<GatewayConfig>,
    #[serde(default)]
    pub static_arp: Vec<StaticArpConfig>,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceConfig {
    pub address: String,
    pub netmask: String,
    pub mac: String,
    /// PPP/SLIP style link without ARP
    #[serde(default)]
    pub point_to_point: bool,
    #[serde(default)]
    pub rx_mode: RxMode,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArpConfig {
    pub timeout_ms: u64,
    pub alive_secs: u64,
    pub retransmit_ms: u64,
    pub spoof_grace_ms: u64,
    /// Announce our address once the link is up
    pub gratuitous: bool,
    /// Probe gateways with echo requests and skip the silent ones
    pub dead_gateway_detect: bool,
}

impl Default for ArpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            alive_secs: 300,
            retransmit_ms: 250,
            spoof_grace_ms: 500,
            gratuitous: false,
            dead_gateway_detect: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub address: String,
    /// Absent: default gateway
    #[serde(default)]
    pub subnet: Option<String>,
    /// Absent: classful mask of `subnet`
    #[serde(default)]
    pub mask: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaticArpConfig {
    pub address: String,
    pub mac: String,
}

pub(crate) fn parse_ip(field: &str, value: &str) -> Result<Ipv4Addr> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{field}: invalid IPv4 address '{value}'")))
}

pub(crate) fn parse_mac(field: &str, value: &str) -> Result<MacAddr> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{field}: invalid MAC address '{value}': {e}")))
}

impl InterfaceConfig {
    pub fn to_info(&self) -> Result<InterfaceInfo> {
        let mut info = InterfaceInfo::new(
            parse_ip("interface.address", &self.address)?,
            parse_ip("interface.netmask", &self.netmask)?,
            parse_mac("interface.mac", &self.mac)?,
        );
        info.broadcast = !self.point_to_point;
        info.rx_mode = self.rx_mode;
        Ok(info)
    }
}

impl ArpConfig {
    pub fn timers(&self) -> ArpTimers {
        ArpTimers {
            timeout: Duration::from_millis(self.timeout_ms),
            alive: Duration::from_secs(self.alive_secs),
            retransmit: Duration::from_millis(self.retransmit_ms),
            spoof_grace: Duration::from_millis(self.spoof_grace_ms),
        }
    }
}

impl GatewayConfig {
    /// `(gateway, subnet, mask)`
    pub fn parse(&self) -> Result<(Ipv4Addr, Option<Ipv4Addr>, Option<Ipv4Addr>)> {
        let gateway = parse_ip("gateways.address", &self.address)?;
        let subnet = self
            .subnet
            .as_deref()
            .map(|s| parse_ip("gateways.subnet", s))
            .transpose()?;
        let mask = self
            .mask
            .as_deref()
            .map(|s| parse_ip("gateways.mask", s))
            .transpose()?;
        Ok((gateway, subnet, mask))
    }
}

impl StaticArpConfig {
    pub fn parse(&self) -> Result<(Ipv4Addr, MacAddr)> {
        Ok((
            parse_ip("static_arp.address", &self.address)?,
            parse_mac("static_arp.mac", &self.mac)?,
        ))
    }
}
