//! Data plane components
//!
//! The caches, the gateway table and the engine that drives them from
//! received frames and periodic ticks.

mod arp_cache;
mod arp_processor;
mod gateway;
mod link;
mod redirect;
mod resolver;
mod route_cache;
mod zone;

#[cfg(test)]
mod testutil;

pub use arp_cache::{ArpCache, ArpEntry, ArpState, ArpSweep, ArpTimers, Confirmation, ARP_CACHE_SIZE};
pub use arp_processor::{process_arp, ArpAction, Learned};
pub use gateway::{GatewayEntry, GatewayTable, DEAD_GATEWAY_INTERVAL, GATEWAY_TABLE_SIZE};
pub use link::{InterfaceInfo, Link, RxMode};
pub use redirect::{handle_icmp_redirect, register};
pub use resolver::{
    classify, CancelToken, Path, Resolution, ResolveState, Resolver, ResolverOptions, PROBE_IDENT,
};
pub use route_cache::{RouteCache, RouteEntry, RouteState, RouteSweep, ROUTE_CACHE_SIZE};
pub use zone::{Zone, ZonedStore};
