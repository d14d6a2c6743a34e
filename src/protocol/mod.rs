//! Wire formats used by the resolver
//!
//! Ethernet II framing, ARP for Ethernet/IPv4, and the bits of IPv4/ICMP
//! needed for gateway probes and redirects.

pub mod arp;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;
pub mod types;

pub use types::*;
