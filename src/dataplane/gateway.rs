//! Gateway table
//!
//! Candidate next hops for off-link destinations, searched in insertion
//! order. An entry with subnet 0 / mask 0 is a default gateway.

use super::link::InterfaceInfo;
use crate::protocol::ipv4::classful_mask;
use crate::{Error, Result};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const GATEWAY_TABLE_SIZE: usize = 8;

/// Time between two dead-gateway probes
pub const DEAD_GATEWAY_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEntry {
    pub gateway: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub mask: Ipv4Addr,
    /// Last probe went unanswered
    pub dead: bool,
    /// A probe is outstanding
    pub echo_pending: bool,
    pub next_check: Option<Instant>,
}

impl GatewayEntry {
    pub fn is_default(&self) -> bool {
        self.subnet.is_unspecified()
    }

    /// `(mask & host) == subnet`
    pub fn serves(&self, host: Ipv4Addr) -> bool {
        u32::from(host) & u32::from(self.mask) == u32::from(self.subnet)
    }

    fn usable_for(&self, host: Ipv4Addr, iface: &InterfaceInfo) -> bool {
        !self.dead && iface.is_on_link(self.gateway) && self.serves(host)
    }
}

#[derive(Debug, Default)]
pub struct GatewayTable {
    entries: Vec<GatewayEntry>,
    probe_cursor: usize,
    next_probe: Option<Instant>,
}

impl GatewayTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(GATEWAY_TABLE_SIZE),
            probe_cursor: 0,
            next_probe: None,
        }
    }

    /// Add a gateway, or update the mask of an existing `(gateway, subnet)`.
    ///
    /// No subnet means a default gateway. A subnet without a mask gets the
    /// classful mask of the subnet.
    pub fn add(&mut self, gateway: Ipv4Addr, subnet: Option<Ipv4Addr>, mask: Option<Ipv4Addr>) -> Result<()> {
        if gateway.is_unspecified() {
            return Err(Error::InvalidAddress("gateway 0.0.0.0".into()));
        }
        let (subnet, mask) = match subnet {
            None => (Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED),
            Some(net) => (net, mask.unwrap_or_else(|| classful_mask(net))),
        };

        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.gateway == gateway && e.subnet == subnet)
        {
            entry.mask = mask;
            debug!("gateway {} for {}/{} updated", gateway, subnet, mask);
            return Ok(());
        }

        if self.entries.len() >= GATEWAY_TABLE_SIZE {
            warn!("gateway table full, {} not added", gateway);
            return Err(Error::TableFull { table: "gateway" });
        }

        self.entries.push(GatewayEntry {
            gateway,
            subnet,
            mask,
            dead: false,
            echo_pending: false,
            next_check: None,
        });
        info!("gateway {} added for {}/{}", gateway, subnet, mask);
        Ok(())
    }

    /// Drop every entry for `gateway`
    pub fn remove(&mut self, gateway: Ipv4Addr) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.gateway != gateway);
        self.probe_cursor = 0;
        self.entries.len() != before
    }

    pub fn remove_all(&mut self) {
        self.entries.clear();
        self.probe_cursor = 0;
    }

    pub fn has_default(&self) -> bool {
        self.entries.iter().any(GatewayEntry::is_default)
    }

    pub fn list(&self) -> &[GatewayEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First live, on-link gateway serving `host`, in table order.
    pub fn select(&self, host: Ipv4Addr, iface: &InterfaceInfo) -> Option<Ipv4Addr> {
        self.select_at(host, iface).map(|(_, gateway)| gateway)
    }

    /// Like [`select`](Self::select), also returning the table position.
    pub fn select_at(&self, host: Ipv4Addr, iface: &InterfaceInfo) -> Option<(usize, Ipv4Addr)> {
        self.entries
            .iter()
            .enumerate()
            .find(|(_, e)| e.usable_for(host, iface))
            .map(|(i, e)| (i, e.gateway))
    }

    /// Fail-over candidates for `host` once `failed` stopped answering.
    ///
    /// `position` is where `failed` was chosen from. Candidates come from
    /// later positions only and never repeat the failed address, so walking
    /// a route through them always ends. Removals only shift rows down, so
    /// the failed row is looked for at or below `position`; if it is gone
    /// there are no candidates. `None` (a gateway learned from a redirect)
    /// searches the whole table.
    pub fn candidates_after<'a>(
        &'a self,
        host: Ipv4Addr,
        failed: Ipv4Addr,
        position: Option<usize>,
        iface: &'a InterfaceInfo,
    ) -> impl Iterator<Item = (usize, Ipv4Addr)> + 'a {
        let from = match position {
            None => 0,
            Some(pos) => self
                .entries
                .iter()
                .take(pos + 1)
                .rposition(|e| e.gateway == failed && e.serves(host))
                .map_or(self.entries.len(), |p| p + 1),
        };
        self.entries
            .iter()
            .enumerate()
            .skip(from)
            .filter(move |(_, e)| e.gateway != failed && e.usable_for(host, iface))
            .map(|(i, e)| (i, e.gateway))
    }

    /// An echo reply came back from `from`
    pub fn echo_reply(&mut self, from: Ipv4Addr) -> bool {
        let mut matched = false;
        for entry in self.entries.iter_mut().filter(|e| e.gateway == from) {
            if entry.dead {
                info!("gateway {} is alive again", from);
            }
            entry.echo_pending = false;
            entry.dead = false;
            matched = true;
        }
        matched
    }

    fn default_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_default()).count()
    }

    /// Dead-gateway detection step.
    ///
    /// At most once per [`DEAD_GATEWAY_INTERVAL`], pick the next gateway
    /// round-robin; if its previous probe is still unanswered mark it dead.
    /// Returns the gateway to probe now. With fewer than two default
    /// gateways detection is off and every gateway is considered alive.
    pub fn probe(&mut self, now: Instant) -> Option<Ipv4Addr> {
        if self.default_count() < 2 {
            for entry in &mut self.entries {
                entry.dead = false;
                entry.echo_pending = false;
            }
            return None;
        }
        if self.next_probe.is_some_and(|t| now < t) {
            return None;
        }
        self.next_probe = Some(now + DEAD_GATEWAY_INTERVAL);

        let idx = self.probe_cursor % self.entries.len();
        self.probe_cursor = idx + 1;
        let entry = &mut self.entries[idx];
        if entry.echo_pending && !entry.dead {
            warn!("gateway {} did not answer, marking dead", entry.gateway);
            entry.dead = true;
        }
        entry.echo_pending = true;
        entry.next_check = Some(now + DEAD_GATEWAY_INTERVAL);
        Some(entry.gateway)
    }
}
