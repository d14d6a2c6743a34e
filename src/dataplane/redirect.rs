//! ICMP redirect handling
//!
//! A router on the path tells us a better first hop for one destination.
//! The existing route is replaced by a Pending route through the new
//! gateway, which the route sweep then promotes like any other.

use super::arp_cache::ArpCache;
use super::link::{InterfaceInfo, Link};
use super::route_cache::{RouteCache, RouteState};
use crate::protocol::icmp::Redirect;
use crate::{Error, Result};
use std::net::Ipv4Addr;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Send traffic for `target` through `new_gateway` from now on.
///
/// Returns `Ok(false)` when the route already uses that gateway. Any error
/// leaves both caches as they were.
pub fn register(
    new_gateway: Ipv4Addr,
    target: Ipv4Addr,
    arp: &mut ArpCache,
    routes: &mut RouteCache,
    iface: &InterfaceInfo,
    link: &mut dyn Link,
    now: Instant,
) -> Result<bool> {
    if !iface.is_on_link(new_gateway) {
        warn!("redirect to off-link gateway {} ignored", new_gateway);
        return Err(Error::InvalidAddress(format!("gateway {new_gateway} is not on-link")));
    }
    if iface.is_on_link(target) {
        warn!("redirect for on-link host {} ignored", target);
        return Err(Error::InvalidAddress(format!("target {target} is on-link")));
    }

    let current = match routes.route(target) {
        Some((RouteState::Dynamic, entry)) => entry.gateway,
        _ => {
            debug!("redirect for {} without a resolved route", target);
            return Err(Error::NoRoute(target));
        }
    };
    if current == new_gateway {
        return Ok(false);
    }

    arp.start_lookup(new_gateway, iface, link, now)?;
    routes.delete(target);
    routes.push_pending(target, new_gateway)?;
    info!("redirect: {} now via {} (was {})", target, new_gateway, current);
    Ok(true)
}

/// Decode an ICMP Redirect message received from `source` and apply it.
///
/// A redirect is only believed when `source` is the gateway the target is
/// currently routed through.
pub fn handle_icmp_redirect(
    source: Ipv4Addr,
    message: &[u8],
    arp: &mut ArpCache,
    routes: &mut RouteCache,
    iface: &InterfaceInfo,
    link: &mut dyn Link,
    now: Instant,
) -> Result<bool> {
    let redirect = Redirect::parse(message)?;
    debug!(
        "ICMP redirect code {}: {} via {}",
        redirect.code, redirect.target, redirect.gateway
    );
    match routes.route(redirect.target) {
        Some((_, entry)) if entry.gateway != source => {
            warn!(
                "redirect for {} from {} ignored, route is via {}",
                redirect.target, source, entry.gateway
            );
            return Err(Error::InvalidAddress(format!(
                "redirect source {source} is not the gateway for {}",
                redirect.target
            )));
        }
        _ => {}
    }
    register(redirect.gateway, redirect.target, arp, routes, iface, link, now)
}
