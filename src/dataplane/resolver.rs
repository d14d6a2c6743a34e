//! Address resolution engine
//!
//! Owns the caches and the gateway table for one interface and exposes the
//! resolution API on top of them. Nothing runs on its own: the surrounding
//! stack calls [`Resolver::tick`] periodically and feeds received frames to
//! [`Resolver::handle_frame`].
//!
//! Destinations are classified on every call. Our own address, broadcast and
//! multicast groups, and anything behind a point-to-point link are answered
//! immediately. On-link addresses go to the ARP cache, the rest to the route
//! cache.

use super::arp_cache::{ArpCache, ArpEntry, ArpState, ArpTimers, ARP_CACHE_SIZE};
use super::arp_processor::{process_arp, ArpAction, Learned};
use super::gateway::{GatewayEntry, GatewayTable, GATEWAY_TABLE_SIZE};
use super::link::{InterfaceInfo, Link};
use super::redirect;
use super::route_cache::{RouteCache, RouteEntry, RouteState, ROUTE_CACHE_SIZE};
use crate::config::Config;
use crate::protocol::arp::{ArpOp, ArpPacket};
use crate::protocol::ethernet::Frame;
use crate::protocol::icmp::{build_echo_request, IcmpPacket, IcmpType};
use crate::protocol::ipv4::Ipv4Header;
use crate::protocol::{EtherType, MacAddr};
use crate::telemetry::ResolverStats;
use crate::{Error, Result};
use std::fmt::{self, Write as _};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Identifier carried by dead-gateway echo probes
pub const PROBE_IDENT: u16 = 0x4152;

/// Dynamic ARP entries are aged at most this often
const DYNAMIC_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

const IPPROTO_ICMP: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    pub timers: ArpTimers,
    pub dead_gateway_detect: bool,
    /// Announce our address from [`Resolver::link_up`]
    pub gratuitous: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            timers: ArpTimers::default(),
            dead_gateway_detect: false,
            gratuitous: false,
        }
    }
}

/// How a destination gets its link-layer address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Path {
    /// Known without asking anyone
    Immediate(MacAddr),
    /// On-link: ARP for the destination itself
    Direct,
    /// Off-link: ARP for a gateway
    Routed,
}

/// Map an IPv4 multicast group to its Ethernet group address (RFC 1112)
fn multicast_mac(group: Ipv4Addr) -> MacAddr {
    let o = group.octets();
    MacAddr([0x01, 0x00, 0x5e, o[1] & 0x7f, o[2], o[3]])
}

pub fn classify(iface: &InterfaceInfo, ip: Ipv4Addr) -> Path {
    if iface.is_local(ip) {
        Path::Immediate(iface.mac)
    } else if !iface.broadcast {
        Path::Immediate(MacAddr::ZERO)
    } else if ip.is_broadcast() || ip == iface.broadcast_addr() {
        Path::Immediate(MacAddr::BROADCAST)
    } else if ip.is_multicast() {
        Path::Immediate(multicast_mac(ip))
    } else if iface.is_on_link(ip) {
        Path::Direct
    } else {
        Path::Routed
    }
}

/// Handle for polling one resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    ip: Ipv4Addr,
    started: bool,
}

impl Resolution {
    pub fn new(ip: Ipv4Addr) -> Self {
        Self { ip, started: false }
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveState {
    NotStarted,
    Pending,
    Resolved(MacAddr),
    /// Started, no longer pending and still unresolved
    Failed,
}

/// Stops a blocking [`Resolver::resolve`] from another thread or a signal
/// handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct Resolver {
    iface: InterfaceInfo,
    arp: ArpCache,
    routes: RouteCache,
    gateways: GatewayTable,
    options: ResolverOptions,
    stats: ResolverStats,
    next_dynamic_sweep: Option<Instant>,
    echo_seq: u16,
}

impl Resolver {
    pub fn new(iface: InterfaceInfo, options: ResolverOptions) -> Self {
        Self {
            iface,
            arp: ArpCache::new(options.timers),
            routes: RouteCache::new(),
            gateways: GatewayTable::new(),
            options,
            stats: ResolverStats::new(),
            next_dynamic_sweep: None,
            echo_seq: 0,
        }
    }

    /// Build a resolver with the configured gateways and static entries
    pub fn from_config(config: &Config, now: Instant) -> Result<Self> {
        let iface = config.interface.to_info()?;
        let options = ResolverOptions {
            timers: config.arp.timers(),
            dead_gateway_detect: config.arp.dead_gateway_detect,
            gratuitous: config.arp.gratuitous,
        };
        let mut resolver = Self::new(iface, options);

        for gw in &config.gateways {
            let (gateway, subnet, mask) = gw.parse()?;
            resolver.add_gateway(gateway, subnet, mask)?;
        }
        for entry in &config.static_arp {
            let (ip, mac) = entry.parse()?;
            resolver.add_cache(ip, mac, false, now)?;
        }

        info!(
            "resolver for {}/{} ({}) ready: {} gateways, {} static entries",
            resolver.iface.ip,
            resolver.iface.netmask,
            resolver.iface.mac,
            resolver.gateways.len(),
            resolver.arp.len(ArpState::Fixed)
        );
        Ok(resolver)
    }

    pub fn iface(&self) -> &InterfaceInfo {
        &self.iface
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    pub fn stats(&self) -> &ResolverStats {
        &self.stats
    }

    /// Count the request sent and the entry sacrificed, if any, by an
    /// operation that may start an ARP lookup.
    fn record_lookup(&self, pending_before: usize, dynamic_before: usize) {
        if self.arp.len(ArpState::Pending) > pending_before {
            self.stats.requests_sent.inc();
        }
        if self.arp.len(ArpState::Dynamic) < dynamic_before {
            self.stats.overflow_evictions.inc();
        }
    }

    fn arp_counts(&self) -> (usize, usize) {
        (self.arp.len(ArpState::Pending), self.arp.len(ArpState::Dynamic))
    }

    // ------------------------------------------------------------------
    // Resolution API
    // ------------------------------------------------------------------

    /// Begin resolving `ip`. Succeeds immediately for addresses that need no
    /// lookup and for lookups already in progress.
    pub fn start(&mut self, ip: Ipv4Addr, link: &mut dyn Link, now: Instant) -> Result<()> {
        let (pending, dynamic) = self.arp_counts();
        let result = match classify(&self.iface, ip) {
            Path::Immediate(_) => return Ok(()),
            Path::Direct => self.arp.start_lookup(ip, &self.iface, link, now),
            Path::Routed => self.routes.start_lookup(
                ip,
                &self.gateways,
                &mut self.arp,
                &self.iface,
                link,
                now,
            ),
        };
        self.record_lookup(pending, dynamic);
        result
    }

    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        match classify(&self.iface, ip) {
            Path::Immediate(mac) => Some(mac),
            Path::Direct => self.arp.lookup(ip),
            Path::Routed => self.routes.lookup(ip, &self.arp),
        }
    }

    pub fn is_pending(&self, ip: Ipv4Addr) -> bool {
        match classify(&self.iface, ip) {
            Path::Immediate(_) => false,
            Path::Direct => self.arp.lookup_pending(ip),
            Path::Routed => self.routes.lookup_pending(ip),
        }
    }

    /// Start `resolution`; afterwards [`Resolver::poll`] reports it as
    /// Pending, Resolved or Failed.
    pub fn begin(&mut self, resolution: &mut Resolution, link: &mut dyn Link, now: Instant) -> Result<()> {
        resolution.started = true;
        self.start(resolution.ip, link, now)
    }

    pub fn poll(&self, resolution: &Resolution) -> ResolveState {
        if let Some(mac) = self.lookup(resolution.ip) {
            ResolveState::Resolved(mac)
        } else if self.is_pending(resolution.ip) {
            ResolveState::Pending
        } else if resolution.started {
            ResolveState::Failed
        } else {
            ResolveState::NotStarted
        }
    }

    /// Resolve `ip`, driving the resolver from `link` until it is answered,
    /// given up on, or `cancel` fires.
    ///
    /// A cancelled lookup stays Pending and runs its course on later ticks.
    pub fn resolve(&mut self, ip: Ipv4Addr, link: &mut dyn Link, cancel: &CancelToken) -> Result<MacAddr> {
        let mut resolution = Resolution::new(ip);
        self.begin(&mut resolution, link, Instant::now())?;

        loop {
            while let Some(frame) = link.receive() {
                self.handle_frame(&frame, link, Instant::now());
            }
            self.tick(Instant::now(), link);

            match self.poll(&resolution) {
                ResolveState::Resolved(mac) => return Ok(mac),
                ResolveState::Failed => {
                    debug!("resolution of {} failed", ip);
                    return Err(Error::Timeout(ip));
                }
                ResolveState::Pending | ResolveState::NotStarted => {}
            }

            if cancel.is_cancelled() {
                debug!("resolution of {} cancelled", ip);
                return Err(Error::Cancelled(ip));
            }
            link.relax();
        }
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// Periodic maintenance: ARP timeouts and retransmissions, Dynamic entry
    /// aging (at most once a second), route promotion and fail-over, and the
    /// dead-gateway probe when enabled.
    pub fn tick(&mut self, now: Instant, link: &mut dyn Link) {
        let check_dynamic = self.next_dynamic_sweep.is_none_or(|t| now >= t);
        if check_dynamic {
            self.next_dynamic_sweep = Some(now + DYNAMIC_SWEEP_INTERVAL);
        }

        let arp = self.arp.check_timeouts(now, check_dynamic, &self.iface, link);
        self.stats.retransmits.add(arp.retransmitted as u64);
        self.stats.lookup_timeouts.add(arp.timed_out as u64);

        let routes = self
            .routes
            .check_timeouts(&self.gateways, &mut self.arp, &self.iface, link, now);
        self.stats.failovers.add(routes.failed_over as u64);
        self.stats.unreachable.add(routes.unreachable as u64);
        self.stats.starved.add(routes.starved as u64);
        if routes != Default::default() {
            trace!("route sweep: {:?}", routes);
        }

        if self.options.dead_gateway_detect {
            if let Some(gateway) = self.gateways.probe(now) {
                self.send_probe(gateway, link);
            }
        }
    }

    fn send_probe(&mut self, gateway: Ipv4Addr, link: &mut dyn Link) {
        let message = build_echo_request(PROBE_IDENT, self.echo_seq, &[]);
        self.echo_seq = self.echo_seq.wrapping_add(1);
        match link.send_icmp(gateway, 1, &message) {
            Ok(()) => {
                debug!("probing gateway {}", gateway);
                self.stats.probes_sent.inc();
            }
            Err(e) => debug!("probe to {} not sent: {}", gateway, e),
        }
    }

    // ------------------------------------------------------------------
    // Ingress
    // ------------------------------------------------------------------

    /// Process one received Ethernet frame. ARP goes to the ARP handler;
    /// ICMP echo replies to our probes and ICMP redirects addressed to us
    /// are picked out of IPv4 traffic. Everything else is ignored.
    pub fn handle_frame(&mut self, frame: &[u8], link: &mut dyn Link, now: Instant) {
        let frame = match Frame::parse(frame) {
            Ok(f) => f,
            Err(e) => {
                trace!("dropping frame: {}", e);
                self.stats.malformed_dropped.inc();
                return;
            }
        };

        match EtherType::from_u16(frame.ethertype()) {
            Some(EtherType::Arp) => {
                if let Err(e) = self.handle_arp(frame.payload(), frame.is_broadcast(), link, now) {
                    trace!("ARP frame ignored: {}", e);
                }
            }
            Some(EtherType::Ipv4) => self.handle_ipv4(frame.payload(), link, now),
            None => trace!("ignoring EtherType 0x{:04x}", frame.ethertype()),
        }
    }

    /// Process an ARP packet (the frame payload). A due reply is sent
    /// straight back to the requester.
    pub fn handle_arp(
        &mut self,
        payload: &[u8],
        broadcast: bool,
        link: &mut dyn Link,
        now: Instant,
    ) -> Result<ArpAction> {
        let packet = match ArpPacket::parse(payload) {
            Ok(p) => p,
            Err(e) => {
                debug!("dropping ARP packet: {}", e);
                self.stats.malformed_dropped.inc();
                return Err(e);
            }
        };
        if packet.operation == ArpOp::Reply {
            self.stats.replies_received.inc();
        }

        let action = process_arp(&packet, broadcast, &mut self.arp, &self.iface, now);
        if action.conflict {
            self.stats.conflicts.inc();
        }
        if matches!(action.learned, Learned::Suspect { .. }) {
            self.stats.spoof_suspicions.inc();
        }

        if let Some(reply) = &action.reply {
            match link.transmit(&reply.to_frame(reply.target_mac)) {
                Ok(()) => {
                    debug!("ARP reply to {} ({})", reply.target_ip, reply.target_mac);
                    self.stats.replies_sent.inc();
                }
                Err(e) => warn!("ARP reply to {} failed: {}", reply.target_ip, e),
            }
        }
        Ok(action)
    }

    fn handle_ipv4(&mut self, packet: &[u8], link: &mut dyn Link, now: Instant) {
        let Ok(header) = Ipv4Header::parse(packet) else {
            return;
        };
        if header.protocol() != IPPROTO_ICMP || header.dst_addr() != self.iface.ip {
            return;
        }
        let message = &packet[header.header_len()..];
        let Ok(icmp) = IcmpPacket::parse(message) else {
            return;
        };

        match icmp.message_type() {
            Some(IcmpType::EchoReply) if icmp.identifier() == PROBE_IDENT => {
                self.handle_echo_reply(header.src_addr());
            }
            Some(IcmpType::Redirect) => {
                if let Err(e) = self.handle_icmp_redirect(header.src_addr(), message, link, now) {
                    debug!("redirect from {} not applied: {}", header.src_addr(), e);
                }
            }
            _ => {}
        }
    }

    /// A gateway answered a probe
    pub fn handle_echo_reply(&mut self, from: Ipv4Addr) -> bool {
        self.gateways.echo_reply(from)
    }

    // ------------------------------------------------------------------
    // Cache and gateway management
    // ------------------------------------------------------------------

    pub fn add_cache(&mut self, ip: Ipv4Addr, mac: MacAddr, dynamic: bool, now: Instant) -> Result<()> {
        let evicts = !dynamic
            && self.arp.free_slots() == 0
            && self.arp.state(ip).is_none()
            && self.arp.len(ArpState::Dynamic) > 0;
        self.arp.add_cache(ip, mac, dynamic, now)?;
        if evicts {
            self.stats.overflow_evictions.inc();
        }
        Ok(())
    }

    pub fn delete_cache(&mut self, ip: Ipv4Addr) -> bool {
        self.arp.delete_cache(ip)
    }

    pub fn add_gateway(&mut self, gateway: Ipv4Addr, subnet: Option<Ipv4Addr>, mask: Option<Ipv4Addr>) -> Result<()> {
        self.gateways.add(gateway, subnet, mask)
    }

    pub fn remove_gateway(&mut self, gateway: Ipv4Addr) -> bool {
        self.gateways.remove(gateway)
    }

    pub fn remove_all_gateways(&mut self) {
        self.gateways.remove_all();
    }

    pub fn has_default_gateway(&self) -> bool {
        self.gateways.has_default()
    }

    pub fn gateways(&self) -> &[GatewayEntry] {
        self.gateways.list()
    }

    // ------------------------------------------------------------------
    // Redirects
    // ------------------------------------------------------------------

    /// Route `target` through `new_gateway`. `Ok(false)` when nothing changed.
    pub fn register_redirect(
        &mut self,
        new_gateway: Ipv4Addr,
        target: Ipv4Addr,
        link: &mut dyn Link,
        now: Instant,
    ) -> Result<bool> {
        let (pending, dynamic) = self.arp_counts();
        let changed = redirect::register(
            new_gateway,
            target,
            &mut self.arp,
            &mut self.routes,
            &self.iface,
            link,
            now,
        )?;
        self.record_lookup(pending, dynamic);
        if changed {
            self.stats.redirects.inc();
        }
        Ok(changed)
    }

    /// Apply an ICMP Redirect message (ICMP header onwards) sent by `source`.
    /// Only the current gateway of the redirected destination is listened to.
    pub fn handle_icmp_redirect(
        &mut self,
        source: Ipv4Addr,
        message: &[u8],
        link: &mut dyn Link,
        now: Instant,
    ) -> Result<bool> {
        let (pending, dynamic) = self.arp_counts();
        let changed = redirect::handle_icmp_redirect(
            source,
            message,
            &mut self.arp,
            &mut self.routes,
            &self.iface,
            link,
            now,
        )?;
        self.record_lookup(pending, dynamic);
        if changed {
            self.stats.redirects.inc();
        }
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Announcements
    // ------------------------------------------------------------------

    /// Broadcast a gratuitous ARP for our address
    pub fn announce(&mut self, link: &mut dyn Link) -> Result<()> {
        if !self.iface.broadcast {
            return Ok(());
        }
        let garp = ArpPacket::gratuitous(self.iface.mac, self.iface.ip);
        link.transmit(&garp.to_frame(MacAddr::BROADCAST))?;
        info!("announced {} at {}", self.iface.ip, self.iface.mac);
        Ok(())
    }

    /// Call once the interface is up
    pub fn link_up(&mut self, link: &mut dyn Link) -> Result<()> {
        if self.options.gratuitous {
            self.announce(link)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    pub fn arp_entries(&self) -> Vec<(ArpState, ArpEntry)> {
        self.arp.entries().map(|(state, e)| (state, *e)).collect()
    }

    pub fn route_entries(&self) -> Vec<(RouteState, RouteEntry)> {
        self.routes.entries().map(|(state, e)| (state, *e)).collect()
    }

    pub fn arp_state(&self, ip: Ipv4Addr) -> Option<ArpState> {
        self.arp.state(ip)
    }

    pub fn route(&self, host: Ipv4Addr) -> Option<(RouteState, RouteEntry)> {
        self.routes.route(host)
    }

    /// Human-readable snapshot of every table
    pub fn dump(&self, now: Instant) -> String {
        let mut out = String::new();
        // Formatting into a String cannot fail.
        let _ = self.write_dump(&mut out, now);
        out
    }

    fn write_dump(&self, out: &mut String, now: Instant) -> fmt::Result {
        writeln!(
            out,
            "Interface {}/{} {}{}",
            self.iface.ip,
            self.iface.netmask,
            self.iface.mac,
            if self.iface.broadcast { "" } else { " point-to-point" }
        )?;

        let entries = self.arp_entries();
        writeln!(out, "ARP cache ({}/{})", entries.len(), ARP_CACHE_SIZE)?;
        for (state, entry) in &entries {
            let remaining = entry
                .expiry
                .map(|t| format!("{}ms", t.saturating_duration_since(now).as_millis()))
                .unwrap_or_else(|| "-".into());
            let mac = match state {
                ArpState::Pending => "(incomplete)".to_string(),
                _ => entry.mac.to_string(),
            };
            writeln!(out, "  {:<15} {:<17} {:<8} {}", entry.ip, mac, format!("{:?}", state), remaining)?;
        }

        let routes = self.route_entries();
        writeln!(out, "Route cache ({}/{})", routes.len(), ROUTE_CACHE_SIZE)?;
        for (state, entry) in &routes {
            writeln!(out, "  {:<15} via {:<15} {:?}", entry.host, entry.gateway, state)?;
        }

        writeln!(out, "Gateways ({}/{})", self.gateways.len(), GATEWAY_TABLE_SIZE)?;
        for gw in self.gateways.list() {
            writeln!(
                out,
                "  {:<15} {}/{}{}",
                gw.gateway,
                gw.subnet,
                gw.mask,
                if gw.dead { " dead" } else { "" }
            )?;
        }
        Ok(())
    }
}
