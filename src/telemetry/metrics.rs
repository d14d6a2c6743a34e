//! Resolver statistics.
//!
//! Plain relaxed counters. The resolver is single-threaded, but the counters
//! stay atomic so a snapshot can be read through a shared reference while
//! the owner keeps ticking.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic event counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Event counters for one resolver instance.
#[derive(Debug, Default)]
pub struct ResolverStats {
    // ARP traffic
    /// New lookups that put a request on the wire.
    pub requests_sent: Counter,
    /// Requests repeated for a lookup still Pending.
    pub retransmits: Counter,
    /// Replies we sent for our own address.
    pub replies_sent: Counter,
    /// Replies received, solicited or not.
    pub replies_received: Counter,
    /// ARP frames dropped by the parser.
    pub malformed_dropped: Counter,

    // Cache events
    /// Another station claimed our address.
    pub conflicts: Counter,
    /// A cached binding was contradicted by a different MAC.
    pub spoof_suspicions: Counter,
    /// Dynamic entries sacrificed to make room.
    pub overflow_evictions: Counter,
    /// Pending lookups that were never answered.
    pub lookup_timeouts: Counter,

    // Routing events
    /// Routes moved to the next gateway.
    pub failovers: Counter,
    /// Routed destinations given up on.
    pub unreachable: Counter,
    /// Routed destinations dropped because no gateway lookup could start.
    pub starved: Counter,
    /// Redirects that changed a route.
    pub redirects: Counter,
    /// Dead-gateway echo probes sent.
    pub probes_sent: Counter,
}

impl ResolverStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// All counters as name/value pairs, in declaration order.
    pub fn export(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("arp_requests_sent", self.requests_sent.get()),
            ("arp_retransmits", self.retransmits.get()),
            ("arp_replies_sent", self.replies_sent.get()),
            ("arp_replies_received", self.replies_received.get()),
            ("arp_malformed_dropped", self.malformed_dropped.get()),
            ("arp_conflicts", self.conflicts.get()),
            ("arp_spoof_suspicions", self.spoof_suspicions.get()),
            ("arp_overflow_evictions", self.overflow_evictions.get()),
            ("arp_lookup_timeouts", self.lookup_timeouts.get()),
            ("route_failovers", self.failovers.get()),
            ("route_unreachable", self.unreachable.get()),
            ("route_starved", self.starved.get()),
            ("route_redirects", self.redirects.get()),
            ("gateway_probes_sent", self.probes_sent.get()),
        ]
    }
}
