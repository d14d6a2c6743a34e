//! Configuration validation

use super::types::{parse_ip, parse_mac};
use super::Config;
use crate::dataplane::{ARP_CACHE_SIZE, GATEWAY_TABLE_SIZE};
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    let subnet = validate_interface(config, &mut result);
    validate_arp(config, &mut result);
    validate_gateways(config, subnet, &mut result);
    validate_static_arp(config, subnet, &mut result);

    result
}

fn on_link(subnet: (Ipv4Addr, Ipv4Addr), addr: Ipv4Addr) -> bool {
    let (ip, mask) = subnet;
    (u32::from(addr) ^ u32::from(ip)) & u32::from(mask) == 0
}

/// Returns (address, netmask) when both parse
fn validate_interface(config: &Config, result: &mut ValidationResult) -> Option<(Ipv4Addr, Ipv4Addr)> {
    let iface = &config.interface;
    let ip = parse_ip("interface.address", &iface.address)
        .map_err(|e| result.error(e.to_string()))
        .ok();
    let mask = parse_ip("interface.netmask", &iface.netmask)
        .map_err(|e| result.error(e.to_string()))
        .ok();
    if let Err(e) = parse_mac("interface.mac", &iface.mac) {
        result.error(e.to_string());
    }

    if let Some(mask) = mask {
        let bits = u32::from(mask);
        if bits.leading_ones() + bits.trailing_zeros() != 32 {
            result.error(format!("interface.netmask: {} is not contiguous", mask));
        }
    }
    if let Some(ip) = ip {
        if ip.is_unspecified() || ip.is_multicast() || ip.is_broadcast() {
            result.error(format!("interface.address: {} is not a host address", ip));
        }
    }

    if iface.point_to_point && !config.static_arp.is_empty() {
        result.warn("static_arp: entries are unused on a point-to-point interface");
    }

    ip.zip(mask)
}

fn validate_arp(config: &Config, result: &mut ValidationResult) {
    let arp = &config.arp;
    for (name, value) in [
        ("timeout_ms", arp.timeout_ms),
        ("alive_secs", arp.alive_secs),
        ("retransmit_ms", arp.retransmit_ms),
    ] {
        if value == 0 {
            result.error(format!("arp.{}: must be greater than zero", name));
        }
    }
    if arp.spoof_grace_ms == 0 {
        result.warn("arp.spoof_grace_ms: 0 drops contradicted entries immediately");
    }
    if arp.retransmit_ms >= arp.timeout_ms && arp.timeout_ms > 0 {
        result.warn(format!(
            "arp.retransmit_ms: {} >= timeout_ms {}, requests are never repeated",
            arp.retransmit_ms, arp.timeout_ms
        ));
    }
}

fn validate_gateways(
    config: &Config,
    subnet: Option<(Ipv4Addr, Ipv4Addr)>,
    result: &mut ValidationResult,
) {
    if config.gateways.len() > GATEWAY_TABLE_SIZE {
        result.error(format!(
            "gateways: {} entries, at most {} supported",
            config.gateways.len(),
            GATEWAY_TABLE_SIZE
        ));
    }

    let mut defaults = 0;
    for (i, gw) in config.gateways.iter().enumerate() {
        let (address, net, _) = match gw.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                result.error(format!("gateways[{}]: {}", i, e));
                continue;
            }
        };
        if net.is_none() {
            defaults += 1;
        }
        if gw.mask.is_some() && net.is_none() {
            result.warn(format!("gateways[{}]: mask without subnet is ignored", i));
        }
        if let Some(subnet) = subnet {
            if !on_link(subnet, address) {
                result.warn(format!(
                    "gateways[{}]: {} is not on-link and will never be used",
                    i, address
                ));
            }
        }
    }

    if config.arp.dead_gateway_detect && defaults < 2 {
        result.warn("arp.dead_gateway_detect: needs at least two default gateways");
    }
}

fn validate_static_arp(
    config: &Config,
    subnet: Option<(Ipv4Addr, Ipv4Addr)>,
    result: &mut ValidationResult,
) {
    if config.static_arp.len() > ARP_CACHE_SIZE {
        result.error(format!(
            "static_arp: {} entries, at most {} supported",
            config.static_arp.len(),
            ARP_CACHE_SIZE
        ));
    }

    for (i, entry) in config.static_arp.iter().enumerate() {
        let (address, mac) = match entry.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                result.error(format!("static_arp[{}]: {}", i, e));
                continue;
            }
        };
        if !mac.is_unicast() || mac.is_zero() {
            result.error(format!("static_arp[{}]: {} is not a unicast MAC", i, mac));
        }
        if let Some(subnet) = subnet {
            if !on_link(subnet, address) {
                result.warn(format!("static_arp[{}]: {} is not on-link", i, address));
            }
        }
    }
}
