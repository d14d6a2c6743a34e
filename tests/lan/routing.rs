//! Off-link resolution
//!
//! Remote destinations resolve to a gateway's MAC. Covers gateway selection,
//! fail-over between gateways, dead-gateway detection and ICMP redirects.

use super::sim::Lan;
use super::{lan_ip, lan_mac, pump, resolver, us, REMOTE};
use ruster_resolver::config;
use ruster_resolver::dataplane::{
    ArpTimers, CancelToken, ResolverOptions, Resolver, RouteEntry, RouteState,
    DEAD_GATEWAY_INTERVAL,
};
use ruster_resolver::protocol::icmp::{build_redirect, redirect};
use ruster_resolver::Error;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

fn fast() -> ResolverOptions {
    ResolverOptions {
        timers: ArpTimers {
            timeout: Duration::from_millis(30),
            retransmit: Duration::from_millis(10),
            ..ArpTimers::default()
        },
        ..ResolverOptions::default()
    }
}

/// Resolver with REMOTE already resolved through gw1
fn routed_via_gw1(lan: &mut Lan, now: Instant) -> Resolver {
    let mut r = resolver(ResolverOptions::default());
    r.add_gateway(lan_ip(1), None, None).unwrap();
    r.start(REMOTE, lan, now).unwrap();
    pump(&mut r, lan, now);
    assert_eq!(r.lookup(REMOTE), Some(lan_mac(1)));
    r
}

#[test]
fn test_remote_resolves_to_gateway() {
    let mut r = resolver(ResolverOptions::default());
    let mut lan = Lan::new(&us()).router(lan_ip(1), lan_mac(1));
    r.add_gateway(lan_ip(1), None, None).unwrap();

    let mac = r.resolve(REMOTE, &mut lan, &CancelToken::new()).unwrap();
    assert_eq!(mac, lan_mac(1));
    assert_eq!(
        r.route(REMOTE),
        Some((RouteState::Dynamic, RouteEntry { host: REMOTE, gateway: lan_ip(1) }))
    );
    assert_eq!(lan.requests_for(REMOTE), 0);
}

#[test]
fn test_subnet_gateway_wins_for_its_subnet() {
    let mut r = resolver(ResolverOptions::default());
    let mut lan = Lan::new(&us())
        .router(lan_ip(1), lan_mac(1))
        .router(lan_ip(2), lan_mac(2));
    r.add_gateway(lan_ip(2), Some(Ipv4Addr::new(10, 0, 0, 0)), None).unwrap();
    r.add_gateway(lan_ip(1), None, None).unwrap();

    let cancel = CancelToken::new();
    assert_eq!(r.resolve(REMOTE, &mut lan, &cancel).unwrap(), lan_mac(2));
    assert_eq!(
        r.resolve(Ipv4Addr::new(8, 8, 8, 8), &mut lan, &cancel).unwrap(),
        lan_mac(1)
    );
}

#[test]
fn test_fail_over_to_live_gateway() {
    let mut r = resolver(fast());
    // gw1 is configured but not on the segment.
    let mut lan = Lan::new(&us()).router(lan_ip(2), lan_mac(2));
    r.add_gateway(lan_ip(1), None, None).unwrap();
    r.add_gateway(lan_ip(2), None, None).unwrap();

    let mac = r.resolve(REMOTE, &mut lan, &CancelToken::new()).unwrap();

    assert_eq!(mac, lan_mac(2));
    assert_eq!(r.route(REMOTE).unwrap().1.gateway, lan_ip(2));
    assert_eq!(r.lookup(lan_ip(1)), None);
    assert_eq!(r.stats().failovers.get(), 1);
}

#[test]
fn test_no_gateway_answers() {
    let mut r = resolver(fast());
    let mut lan = Lan::new(&us());
    r.add_gateway(lan_ip(1), None, None).unwrap();
    r.add_gateway(lan_ip(2), None, None).unwrap();

    let err = r.resolve(REMOTE, &mut lan, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert!(r.route(REMOTE).is_none());
    assert_eq!(r.stats().unreachable.get(), 1);
    assert!(lan.requests_for(lan_ip(1)) >= 1);
    assert!(lan.requests_for(lan_ip(2)) >= 1);
}

#[test]
fn test_no_gateway_configured() {
    let mut r = resolver(ResolverOptions::default());
    let mut lan = Lan::new(&us());
    let err = r.resolve(REMOTE, &mut lan, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, Error::NoGateway(ip) if ip == REMOTE));
    assert!(!r.has_default_gateway());
}

#[test]
fn test_dead_gateway_is_skipped() {
    let mut r = resolver(ResolverOptions {
        dead_gateway_detect: true,
        ..ResolverOptions::default()
    });
    let mut lan = Lan::new(&us())
        .mute_router(lan_ip(1), lan_mac(1))
        .router(lan_ip(2), lan_mac(2));
    r.add_gateway(lan_ip(1), None, None).unwrap();
    r.add_gateway(lan_ip(2), None, None).unwrap();

    // Three probe rounds: gw1, gw2, gw1 again (still silent).
    let now = Instant::now();
    for round in 0..3 {
        pump(&mut r, &mut lan, now + DEAD_GATEWAY_INTERVAL * round);
    }
    assert_eq!(lan.probes, vec![lan_ip(1), lan_ip(2), lan_ip(1)]);
    assert!(r.gateways()[0].dead);
    assert!(!r.gateways()[1].dead);

    let later = now + DEAD_GATEWAY_INTERVAL * 3;
    r.start(REMOTE, &mut lan, later).unwrap();
    pump(&mut r, &mut lan, later);
    assert_eq!(r.route(REMOTE).unwrap().1.gateway, lan_ip(2));
    assert_eq!(r.lookup(REMOTE), Some(lan_mac(2)));
}

#[test]
fn test_redirect_moves_route() {
    let mut lan = Lan::new(&us())
        .router(lan_ip(1), lan_mac(1))
        .router(lan_ip(3), lan_mac(3));
    let now = Instant::now();
    let mut r = routed_via_gw1(&mut lan, now);

    assert!(r.register_redirect(lan_ip(3), REMOTE, &mut lan, now).unwrap());
    assert_eq!(r.route(REMOTE).unwrap().0, RouteState::Pending);

    pump(&mut r, &mut lan, now);
    assert_eq!(r.lookup(REMOTE), Some(lan_mac(3)));

    // Same gateway again: nothing to do.
    assert!(!r.register_redirect(lan_ip(3), REMOTE, &mut lan, now).unwrap());
}

#[test]
fn test_redirect_rejected_without_change() {
    let mut lan = Lan::new(&us()).router(lan_ip(1), lan_mac(1));
    let now = Instant::now();
    let mut r = routed_via_gw1(&mut lan, now);
    let before = r.route_entries();
    let sent = lan.sent.len();

    // Target on-link
    assert!(r.register_redirect(lan_ip(3), lan_ip(40), &mut lan, now).is_err());
    // Gateway off-link
    assert!(r
        .register_redirect(Ipv4Addr::new(172, 16, 0, 1), REMOTE, &mut lan, now)
        .is_err());
    // Target without a resolved route
    assert!(matches!(
        r.register_redirect(lan_ip(3), Ipv4Addr::new(10, 9, 9, 9), &mut lan, now),
        Err(Error::NoRoute(_))
    ));

    assert_eq!(r.route_entries(), before);
    assert_eq!(lan.sent.len(), sent);
    assert_eq!(r.stats().redirects.get(), 0);
}

#[test]
fn test_icmp_redirect_from_the_wire() {
    let mut lan = Lan::new(&us())
        .router(lan_ip(1), lan_mac(1))
        .router(lan_ip(3), lan_mac(3));
    let now = Instant::now();
    let mut r = routed_via_gw1(&mut lan, now);

    let mut quoted = vec![0u8; 28];
    quoted[0] = 0x45;
    quoted[12..16].copy_from_slice(&us().ip.octets());
    quoted[16..20].copy_from_slice(&REMOTE.octets());
    let message = build_redirect(redirect::HOST, lan_ip(3), &quoted);

    assert!(r.handle_icmp_redirect(lan_ip(1), &message, &mut lan, now).unwrap());
    pump(&mut r, &mut lan, now);
    assert_eq!(r.lookup(REMOTE), Some(lan_mac(3)));
}

#[test]
fn test_redirect_from_non_gateway_is_ignored() {
    let mut lan = Lan::new(&us())
        .router(lan_ip(1), lan_mac(1))
        .host(lan_ip(66), lan_mac(66));
    let now = Instant::now();
    let mut r = routed_via_gw1(&mut lan, now);

    let mut quoted = vec![0u8; 28];
    quoted[0] = 0x45;
    quoted[12..16].copy_from_slice(&us().ip.octets());
    quoted[16..20].copy_from_slice(&REMOTE.octets());
    let message = build_redirect(redirect::HOST, lan_ip(66), &quoted);
    lan.inject(lan.icmp_frame(lan_ip(66), &message));
    pump(&mut r, &mut lan, now);

    assert_eq!(r.route(REMOTE).unwrap().1.gateway, lan_ip(1));
    assert_eq!(r.lookup(REMOTE), Some(lan_mac(1)));
    assert_eq!(r.stats().redirects.get(), 0);

    // The same redirect from the current gateway is applied.
    lan.inject(lan.icmp_frame(lan_ip(1), &message));
    pump(&mut r, &mut lan, now);
    pump(&mut r, &mut lan, now);
    assert_eq!(r.lookup(REMOTE), Some(lan_mac(66)));
    assert_eq!(r.stats().redirects.get(), 1);
}

#[test]
fn test_fail_over_past_gateway_listed_twice() {
    let mut r = resolver(fast());
    // gw1 serves 10/8 and is also a default; it is not on the segment.
    let mut lan = Lan::new(&us()).router(lan_ip(2), lan_mac(2));
    r.add_gateway(lan_ip(1), Some(Ipv4Addr::new(10, 0, 0, 0)), None).unwrap();
    r.add_gateway(lan_ip(1), None, None).unwrap();
    r.add_gateway(lan_ip(2), None, None).unwrap();

    let mac = r.resolve(REMOTE, &mut lan, &CancelToken::new()).unwrap();
    assert_eq!(mac, lan_mac(2));
    assert_eq!(r.stats().failovers.get(), 1);
    assert!(lan.requests_for(lan_ip(2)) >= 1);
}

#[test]
fn test_built_from_config() {
    let cfg = config::parse(
        r#"
[interface]
address = "192.168.1.10"
netmask = "255.255.255.0"
mac = "02:00:00:00:00:10"

[arp]
gratuitous = true

[[gateways]]
address = "192.168.1.1"

[[static_arp]]
address = "192.168.1.5"
mac = "02:00:00:00:01:05"
"#,
    )
    .unwrap();
    assert!(!config::validate(&cfg).has_errors());

    let now = Instant::now();
    let mut r = Resolver::from_config(&cfg, now).unwrap();
    let mut lan = Lan::new(&us()).router(lan_ip(1), lan_mac(1));

    assert!(r.has_default_gateway());
    assert_eq!(r.lookup(lan_ip(5)), Some(lan_mac(5)));

    r.link_up(&mut lan).unwrap();
    assert!(lan.arp_sent()[0].is_gratuitous());

    assert_eq!(
        r.resolve(REMOTE, &mut lan, &CancelToken::new()).unwrap(),
        lan_mac(1)
    );
}
