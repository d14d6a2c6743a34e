//! ARP cache (on-link IPv4 to MAC)
//!
//! A [`ZonedStore`] of 64 slots. Fixed entries come from configuration and
//! never expire, Dynamic entries were learned from the wire and expire after
//! `alive`, Pending entries are outstanding requests.

use super::link::{InterfaceInfo, Link};
use super::zone::{Zone, ZonedStore};
use crate::protocol::arp::ArpPacket;
use crate::protocol::MacAddr;
use crate::{Error, Result};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const ARP_CACHE_SIZE: usize = 64;

/// ARP entry state, derived from the zone the entry sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpState {
    Fixed,
    Dynamic,
    Pending,
}

impl ArpState {
    fn zone(self) -> Zone {
        match self {
            ArpState::Fixed => Zone::Fixed,
            ArpState::Dynamic => Zone::Dynamic,
            ArpState::Pending => Zone::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
    /// Pending: give-up deadline. Dynamic: end of life. Fixed: none.
    pub expiry: Option<Instant>,
    /// Pending only: when to send the next request
    pub retransmit_at: Option<Instant>,
}

impl Default for ArpEntry {
    fn default() -> Self {
        Self {
            ip: Ipv4Addr::UNSPECIFIED,
            mac: MacAddr::ZERO,
            expiry: None,
            retransmit_at: None,
        }
    }
}

/// Protocol timers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpTimers {
    /// How long a lookup stays Pending before it fails
    pub timeout: Duration,
    /// Lifetime of a Dynamic entry
    pub alive: Duration,
    /// Interval between requests for a Pending entry
    pub retransmit: Duration,
    /// Remaining lifetime of an entry whose MAC was contradicted
    pub spoof_grace: Duration,
}

impl Default for ArpTimers {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            alive: Duration::from_secs(300),
            retransmit: Duration::from_millis(250),
            spoof_grace: Duration::from_millis(500),
        }
    }
}

/// Result of matching sender information against Dynamic entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Same MAC: lifetime restarted
    Refreshed,
    /// Different MAC: lifetime cut to the grace window, MAC kept
    Contradicted { cached: MacAddr },
    /// No Dynamic entry for the address
    Unknown,
}

/// What one pass over the timed zones did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArpSweep {
    pub timed_out: usize,
    pub retransmitted: usize,
    pub expired: usize,
}

#[derive(Debug, Clone)]
pub struct ArpCache {
    store: ZonedStore<ArpEntry, ARP_CACHE_SIZE>,
    timers: ArpTimers,
}

/// Broadcast a who-has for `target`
pub(crate) fn send_request(iface: &InterfaceInfo, link: &mut dyn Link, target: Ipv4Addr) -> Result<()> {
    let request = ArpPacket::request(iface.mac, iface.ip, target);
    link.transmit(&request.to_frame(MacAddr::BROADCAST))
}

impl ArpCache {
    pub fn new(timers: ArpTimers) -> Self {
        Self {
            store: ZonedStore::new(),
            timers,
        }
    }

    pub fn timers(&self) -> &ArpTimers {
        &self.timers
    }

    pub fn len(&self, state: ArpState) -> usize {
        self.store.len(state.zone())
    }

    pub fn free_slots(&self) -> usize {
        self.store.len(Zone::Free)
    }

    pub fn is_consistent(&self) -> bool {
        self.store.is_consistent()
    }

    fn find(&self, ip: Ipv4Addr) -> Option<usize> {
        self.store.position_occupied(|e| e.ip == ip)
    }

    /// Start resolving `ip` unless it is already known or in progress.
    ///
    /// Takes a Free slot, or sacrifices the newest Dynamic entry when the
    /// cache is full. The first request goes out immediately.
    pub fn start_lookup(
        &mut self,
        ip: Ipv4Addr,
        iface: &InterfaceInfo,
        link: &mut dyn Link,
        now: Instant,
    ) -> Result<()> {
        if self.find(ip).is_some() {
            return Ok(());
        }

        if !self.store.has_free() {
            match self.store.evict_newest_dynamic() {
                Some(victim) => warn!(
                    "ARP cache overflow: dropping {} to resolve {}",
                    victim.ip, ip
                ),
                None => {
                    warn!("ARP cache full, cannot resolve {}", ip);
                    return Err(Error::TableFull { table: "ARP" });
                }
            }
        }

        let mut rexmit = self.timers.retransmit;
        if let Err(e) = send_request(iface, link, ip) {
            debug!("ARP request for {} not sent: {}", ip, e);
            rexmit /= 4;
        } else {
            debug!("ARP request for {}", ip);
        }

        let entry = ArpEntry {
            ip,
            mac: MacAddr::ZERO,
            expiry: Some(now + self.timers.timeout),
            retransmit_at: Some(now + rexmit),
        };
        self.store
            .push(Zone::Pending, entry)
            .ok_or(Error::TableFull { table: "ARP" })?;
        Ok(())
    }

    /// MAC of a Fixed or Dynamic entry
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.store
            .position(self.store.resolved_range(), |e| e.ip == ip)
            .map(|i| self.store.get(i).mac)
    }

    pub fn lookup_pending(&self, ip: Ipv4Addr) -> bool {
        self.store
            .position(self.store.range(Zone::Pending), |e| e.ip == ip)
            .is_some()
    }

    pub fn state(&self, ip: Ipv4Addr) -> Option<ArpState> {
        self.find(ip).map(|i| match self.store.zone_of(i) {
            Zone::Fixed => ArpState::Fixed,
            Zone::Pending => ArpState::Pending,
            _ => ArpState::Dynamic,
        })
    }

    pub fn get(&self, ip: Ipv4Addr) -> Option<&ArpEntry> {
        self.find(ip).map(|i| self.store.get(i))
    }

    /// Insert a resolved binding, replacing whatever was there for `ip`.
    ///
    /// A Fixed insert may sacrifice the newest Dynamic entry for room.
    pub fn add_cache(&mut self, ip: Ipv4Addr, mac: MacAddr, dynamic: bool, now: Instant) -> Result<()> {
        if ip.is_unspecified() {
            return Err(Error::InvalidAddress(ip.to_string()));
        }
        self.delete_cache(ip);

        let (zone, expiry) = if dynamic {
            (Zone::Dynamic, Some(now + self.timers.alive))
        } else {
            if !self.store.has_free() {
                if let Some(victim) = self.store.evict_newest_dynamic() {
                    warn!("ARP cache overflow: dropping {} for fixed {}", victim.ip, ip);
                }
            }
            (Zone::Fixed, None)
        };

        let entry = ArpEntry {
            ip,
            mac,
            expiry,
            retransmit_at: None,
        };
        match self.store.push(zone, entry) {
            Some(_) => {
                debug!("ARP cache add {} -> {} ({:?})", ip, mac, zone);
                Ok(())
            }
            None => {
                warn!("ARP cache full, cannot add {}", ip);
                Err(Error::TableFull { table: "ARP" })
            }
        }
    }

    /// Remove `ip` from whichever zone holds it
    pub fn delete_cache(&mut self, ip: Ipv4Addr) -> bool {
        match self.find(ip) {
            Some(idx) => {
                self.store.remove(idx);
                true
            }
            None => false,
        }
    }

    /// A reply arrived for a Pending entry: record the MAC and move it to
    /// Dynamic with a full lifetime. Returns false when nothing was pending.
    pub fn resolve_pending(&mut self, ip: Ipv4Addr, mac: MacAddr, now: Instant) -> bool {
        let Some(idx) = self
            .store
            .position(self.store.range(Zone::Pending), |e| e.ip == ip)
        else {
            return false;
        };
        let entry = self.store.get_mut(idx);
        entry.mac = mac;
        entry.expiry = Some(now + self.timers.alive);
        entry.retransmit_at = None;
        self.store.promote(idx);
        true
    }

    /// Check sender information against a Dynamic entry.
    ///
    /// A changed MAC is not trusted: the entry keeps its old MAC and only
    /// lives for the grace window, after which it has to be resolved again.
    pub fn confirm_dynamic(&mut self, ip: Ipv4Addr, mac: MacAddr, now: Instant) -> Confirmation {
        let Some(idx) = self
            .store
            .position(self.store.range(Zone::Dynamic), |e| e.ip == ip)
        else {
            return Confirmation::Unknown;
        };
        let grace = now + self.timers.spoof_grace;
        let alive = now + self.timers.alive;
        let entry = self.store.get_mut(idx);
        if entry.mac == mac {
            entry.expiry = Some(alive);
            Confirmation::Refreshed
        } else {
            let cached = entry.mac;
            entry.expiry = Some(match entry.expiry {
                Some(t) if t < grace => t,
                _ => grace,
            });
            Confirmation::Contradicted { cached }
        }
    }

    /// Drop timed-out Pending entries and retransmit the rest when due.
    /// With `check_dynamic`, also drop expired Dynamic entries.
    pub fn check_timeouts(
        &mut self,
        now: Instant,
        check_dynamic: bool,
        iface: &InterfaceInfo,
        link: &mut dyn Link,
    ) -> ArpSweep {
        let mut sweep = ArpSweep::default();

        // Walk Pending top-down: a removal pulls the lowest (not yet seen)
        // entry into the hole, so the same index is looked at again.
        let mut i = ARP_CACHE_SIZE;
        while i > self.store.range(Zone::Pending).start {
            i -= 1;
            let entry = *self.store.get(i);
            if entry.expiry.is_some_and(|t| now >= t) {
                debug!("ARP lookup for {} timed out", entry.ip);
                self.store.remove(i);
                sweep.timed_out += 1;
                i += 1;
                continue;
            }
            if entry.retransmit_at.is_some_and(|t| now >= t) {
                if let Err(e) = send_request(iface, link, entry.ip) {
                    debug!("ARP retransmit for {} failed: {}", entry.ip, e);
                }
                self.store.get_mut(i).retransmit_at = Some(now + self.timers.retransmit);
                sweep.retransmitted += 1;
            }
        }

        if check_dynamic {
            let mut i = self.store.range(Zone::Dynamic).start;
            while i < self.store.range(Zone::Dynamic).end {
                let entry = *self.store.get(i);
                if entry.expiry.is_some_and(|t| now >= t) {
                    debug!("ARP entry {} -> {} expired", entry.ip, entry.mac);
                    self.store.remove(i);
                    sweep.expired += 1;
                } else {
                    i += 1;
                }
            }
        }

        sweep
    }

    /// All occupied entries, Fixed first, then Dynamic, then Pending
    pub fn entries(&self) -> impl Iterator<Item = (ArpState, &ArpEntry)> {
        self.store
            .iter(Zone::Fixed)
            .map(|e| (ArpState::Fixed, e))
            .chain(self.store.iter(Zone::Dynamic).map(|e| (ArpState::Dynamic, e)))
            .chain(self.store.iter(Zone::Pending).map(|e| (ArpState::Pending, e)))
    }
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new(ArpTimers::default())
    }
}
