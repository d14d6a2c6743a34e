//! Resolver tests against a simulated Ethernet segment
//!
//! Topology used throughout:
//! ```text
//!        192.168.1.0/24                       10.0.0.0/8, 0.0.0.0/0
//! ┌──────────────┐
//! │   resolver   │──┬── host  .20 ... .99
//! │192.168.1.10  │  ├── gw1   .1  ──────────▶ (remote networks)
//! └──────────────┘  └── gw2   .2  ──────────▶
//! ```

mod resolution;
mod routing;
mod sim;

use ruster_resolver::dataplane::{InterfaceInfo, Link, Resolver, ResolverOptions};
use ruster_resolver::protocol::MacAddr;
use std::net::Ipv4Addr;
use std::time::Instant;

pub const REMOTE: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 1);

pub fn us() -> InterfaceInfo {
    InterfaceInfo::new(
        Ipv4Addr::new(192, 168, 1, 10),
        Ipv4Addr::new(255, 255, 255, 0),
        MacAddr([0x02, 0, 0, 0, 0, 0x10]),
    )
}

pub fn lan_ip(n: u8) -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 1, n)
}

pub fn lan_mac(n: u8) -> MacAddr {
    MacAddr([0x02, 0, 0, 0, 1, n])
}

pub fn resolver(options: ResolverOptions) -> Resolver {
    Resolver::new(us(), options)
}

/// Deliver everything waiting on the segment, then run one tick
pub fn pump(resolver: &mut Resolver, link: &mut dyn Link, now: Instant) {
    while let Some(frame) = link.receive() {
        resolver.handle_frame(&frame, link, now);
    }
    resolver.tick(now, link);
}
