//! Route cache (off-link IPv4 to gateway)
//!
//! Same zoned layout as the ARP cache without a Fixed zone. A route carries
//! no timers; it follows the ARP entry of its gateway: Pending until the
//! gateway resolves, Dynamic while the gateway stays resolved, gone when the
//! gateway's entry goes.

use super::arp_cache::ArpCache;
use super::gateway::GatewayTable;
use super::link::{InterfaceInfo, Link};
use super::zone::{Zone, ZonedStore};
use crate::protocol::MacAddr;
use crate::{Error, Result};
use std::net::Ipv4Addr;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const ROUTE_CACHE_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Pending,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub host: Ipv4Addr,
    pub gateway: Ipv4Addr,
}

impl Default for RouteEntry {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
        }
    }
}

/// A route plus the gateway table position its gateway was chosen from.
/// Routes installed by a redirect have no position.
#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    entry: RouteEntry,
    position: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteSweep {
    pub promoted: usize,
    pub failed_over: usize,
    pub unreachable: usize,
    /// Dropped because no candidate gateway could get an ARP slot.
    pub starved: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RouteCache {
    store: ZonedStore<Slot, ROUTE_CACHE_SIZE>,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, state: RouteState) -> usize {
        match state {
            RouteState::Pending => self.store.len(Zone::Pending),
            RouteState::Dynamic => self.store.len(Zone::Dynamic),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.store.is_consistent() && self.store.len(Zone::Fixed) == 0
    }

    fn find(&self, host: Ipv4Addr) -> Option<usize> {
        self.store.position_occupied(|s| s.entry.host == host)
    }

    fn find_in(&self, zone: Zone, host: Ipv4Addr) -> Option<usize> {
        self.store.position(self.store.range(zone), |s| s.entry.host == host)
    }

    /// Route `host` through the first usable gateway and start resolving
    /// that gateway. A host already in the cache is left alone.
    pub fn start_lookup(
        &mut self,
        host: Ipv4Addr,
        gateways: &GatewayTable,
        arp: &mut ArpCache,
        iface: &InterfaceInfo,
        link: &mut dyn Link,
        now: Instant,
    ) -> Result<()> {
        if self.find(host).is_some() {
            return Ok(());
        }

        let Some((position, gateway)) = gateways.select_at(host, iface) else {
            warn!("no gateway for {}", host);
            return Err(Error::NoGateway(host));
        };
        if !self.store.has_free() {
            warn!("route cache full, cannot route {}", host);
            return Err(Error::TableFull { table: "route" });
        }

        arp.start_lookup(gateway, iface, link, now)?;
        self.push(host, gateway, Some(position))?;
        debug!("routing {} via {}", host, gateway);
        Ok(())
    }

    /// Add a Pending route through a gateway that is not taken from the
    /// gateway table.
    pub(crate) fn push_pending(&mut self, host: Ipv4Addr, gateway: Ipv4Addr) -> Result<()> {
        self.push(host, gateway, None)
    }

    fn push(&mut self, host: Ipv4Addr, gateway: Ipv4Addr, position: Option<usize>) -> Result<()> {
        let slot = Slot {
            entry: RouteEntry { host, gateway },
            position,
        };
        self.store
            .push(Zone::Pending, slot)
            .map(|_| ())
            .ok_or(Error::TableFull { table: "route" })
    }

    /// Gateway MAC for a Dynamic route.
    pub fn lookup(&self, host: Ipv4Addr, arp: &ArpCache) -> Option<MacAddr> {
        let idx = self.find_in(Zone::Dynamic, host)?;
        arp.lookup(self.store.get(idx).entry.gateway)
    }

    pub fn lookup_pending(&self, host: Ipv4Addr) -> bool {
        self.find_in(Zone::Pending, host).is_some()
    }

    pub fn route(&self, host: Ipv4Addr) -> Option<(RouteState, RouteEntry)> {
        let idx = self.find(host)?;
        let state = match self.store.zone_of(idx) {
            Zone::Pending => RouteState::Pending,
            _ => RouteState::Dynamic,
        };
        Some((state, self.store.get(idx).entry))
    }

    pub fn delete(&mut self, host: Ipv4Addr) -> bool {
        match self.find(host) {
            Some(idx) => {
                self.store.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Drive routes from their gateways' ARP state.
    ///
    /// Pending: promote once the gateway resolved, wait while its lookup is
    /// in flight, otherwise fail over to the next gateway in table order or
    /// give up. A candidate whose lookup cannot start is skipped. Dynamic:
    /// drop when the gateway's ARP entry is gone.
    pub fn check_timeouts(
        &mut self,
        gateways: &GatewayTable,
        arp: &mut ArpCache,
        iface: &InterfaceInfo,
        link: &mut dyn Link,
        now: Instant,
    ) -> RouteSweep {
        let mut sweep = RouteSweep::default();

        let mut i = ROUTE_CACHE_SIZE;
        while i > self.store.range(Zone::Pending).start {
            i -= 1;
            let Slot { entry, position } = *self.store.get(i);

            if arp.lookup(entry.gateway).is_some() {
                debug!("route {} via {} resolved", entry.host, entry.gateway);
                self.store.promote(i);
                sweep.promoted += 1;
                i += 1;
                continue;
            }
            if arp.lookup_pending(entry.gateway) {
                continue;
            }

            let mut next = None;
            let mut starved = false;
            for (pos, gw) in gateways.candidates_after(entry.host, entry.gateway, position, iface) {
                match arp.start_lookup(gw, iface, link, now) {
                    Ok(()) => {
                        next = Some((pos, gw));
                        break;
                    }
                    Err(e) => {
                        debug!("cannot try gateway {} for {}: {}", gw, entry.host, e);
                        starved |= matches!(e, Error::TableFull { .. });
                    }
                }
            }
            match next {
                Some((pos, gw)) => {
                    info!(
                        "gateway {} for {} failed, trying {}",
                        entry.gateway, entry.host, gw
                    );
                    *self.store.get_mut(i) = Slot {
                        entry: RouteEntry { gateway: gw, ..entry },
                        position: Some(pos),
                    };
                    sweep.failed_over += 1;
                }
                None => {
                    if starved {
                        warn!("{} dropped: ARP cache full of pending lookups", entry.host);
                        sweep.starved += 1;
                    } else {
                        warn!("{} unreachable: no gateway answered", entry.host);
                        sweep.unreachable += 1;
                    }
                    self.store.remove(i);
                    i += 1;
                }
            }
        }

        let mut i = self.store.range(Zone::Dynamic).start;
        while i < self.store.range(Zone::Dynamic).end {
            let entry = self.store.get(i).entry;
            if arp.lookup(entry.gateway).is_none() {
                debug!("route {} dropped, gateway {} gone", entry.host, entry.gateway);
                self.store.remove(i);
                sweep.evicted += 1;
            } else {
                i += 1;
            }
        }

        sweep
    }

    /// Dynamic routes first, then Pending
    pub fn entries(&self) -> impl Iterator<Item = (RouteState, &RouteEntry)> {
        self.store
            .iter(Zone::Dynamic)
            .map(|s| (RouteState::Dynamic, &s.entry))
            .chain(self.store.iter(Zone::Pending).map(|s| (RouteState::Pending, &s.entry)))
    }
}
