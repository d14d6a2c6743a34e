//! On-link resolution
//!
//! The resolver asks for hosts on its own subnet directly, answers requests
//! for its own address and keeps the cache honest against changed bindings.

use super::sim::Lan;
use super::{lan_ip, lan_mac, pump, resolver, us};
use ruster_resolver::dataplane::{
    ArpState, ArpTimers, CancelToken, ResolveState, Resolution, ResolverOptions, ARP_CACHE_SIZE,
};
use ruster_resolver::protocol::arp::ArpPacket;
use ruster_resolver::protocol::MacAddr;
use ruster_resolver::Error;
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

#[test]
fn test_resolve_on_link_host() {
    let mut r = resolver(ResolverOptions::default());
    let mut lan = Lan::new(&us()).host(lan_ip(20), lan_mac(20));

    let mac = r.resolve(lan_ip(20), &mut lan, &CancelToken::new()).unwrap();
    assert_eq!(mac, lan_mac(20));
    assert_eq!(r.arp_state(lan_ip(20)), Some(ArpState::Dynamic));

    // Cached: no second request.
    let again = r.resolve(lan_ip(20), &mut lan, &CancelToken::new()).unwrap();
    assert_eq!(again, lan_mac(20));
    assert_eq!(lan.requests_for(lan_ip(20)), 1);
}

#[test]
fn test_silent_host_times_out() {
    let mut r = resolver(fast());
    let mut lan = Lan::new(&us());

    let err = r.resolve(lan_ip(21), &mut lan, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, Error::Timeout(ip) if ip == lan_ip(21)));
    assert!(lan.requests_for(lan_ip(21)) >= 2);
    assert_eq!(r.arp_state(lan_ip(21)), None);
    assert_eq!(r.stats().lookup_timeouts.get(), 1);
}

#[test]
fn test_poll_handle_lifecycle() {
    let mut r = resolver(ResolverOptions::default());
    let mut lan = Lan::new(&us()).host(lan_ip(22), lan_mac(22));
    let now = Instant::now();

    let mut res = Resolution::new(lan_ip(22));
    assert_eq!(r.poll(&res), ResolveState::NotStarted);

    r.begin(&mut res, &mut lan, now).unwrap();
    assert_eq!(r.poll(&res), ResolveState::Pending);

    pump(&mut r, &mut lan, now + Duration::from_millis(5));
    assert_eq!(r.poll(&res), ResolveState::Resolved(lan_mac(22)));
}

#[test]
fn test_start_twice_keeps_one_lookup() {
    let mut r = resolver(ResolverOptions::default());
    let mut lan = Lan::new(&us());
    let now = Instant::now();

    r.start(lan_ip(23), &mut lan, now).unwrap();
    r.start(lan_ip(23), &mut lan, now).unwrap();

    let pending = r
        .arp_entries()
        .into_iter()
        .filter(|(state, _)| *state == ArpState::Pending)
        .count();
    assert_eq!(pending, 1);
    assert_eq!(lan.requests_for(lan_ip(23)), 1);
}

#[test]
fn test_full_cache_rejects_new_lookup() {
    let mut r = resolver(ResolverOptions::default());
    let mut lan = Lan::new(&us());
    let now = Instant::now();

    for n in 0..ARP_CACHE_SIZE as u8 {
        r.start(lan_ip(100 + n), &mut lan, now).unwrap();
    }
    let err = r.start(lan_ip(200), &mut lan, now).unwrap_err();
    assert!(matches!(err, Error::TableFull { .. }));
    assert_eq!(r.arp_entries().len(), ARP_CACHE_SIZE);
    assert_eq!(r.stats().requests_sent.get(), ARP_CACHE_SIZE as u64);
}

#[test]
fn test_overflow_sacrifices_newest_dynamic() {
    let mut r = resolver(ResolverOptions::default());
    let mut lan = Lan::new(&us());
    let now = Instant::now();

    for n in 0..ARP_CACHE_SIZE as u8 {
        r.add_cache(lan_ip(100 + n), lan_mac(n), true, now).unwrap();
    }
    let newest = lan_ip(100 + ARP_CACHE_SIZE as u8 - 1);

    r.start(lan_ip(200), &mut lan, now).unwrap();

    assert_eq!(r.arp_state(newest), None);
    assert_eq!(r.arp_state(lan_ip(100)), Some(ArpState::Dynamic));
    assert_eq!(r.arp_state(lan_ip(200)), Some(ArpState::Pending));
    assert_eq!(r.stats().overflow_evictions.get(), 1);
}

#[test]
fn test_changed_binding_is_distrusted() {
    let mut r = resolver(ResolverOptions::default());
    let mut lan = Lan::new(&us());
    let now = Instant::now();
    r.add_cache(lan_ip(30), lan_mac(30), true, now).unwrap();

    // Someone else claims .30.
    let impostor = MacAddr([0x02, 0xde, 0xad, 0xbe, 0xef, 0x01]);
    lan.inject(ArpPacket::gratuitous(impostor, lan_ip(30)).to_frame(MacAddr::BROADCAST));
    pump(&mut r, &mut lan, now);

    assert_eq!(r.lookup(lan_ip(30)), Some(lan_mac(30)));
    assert_eq!(r.stats().spoof_suspicions.get(), 1);

    // The entry lives out its grace window and has to be resolved again.
    pump(&mut r, &mut lan, now + Duration::from_secs(1));
    assert_eq!(r.lookup(lan_ip(30)), None);
}

#[test]
fn test_static_entry_never_ages() {
    let mut r = resolver(ResolverOptions::default());
    let mut lan = Lan::new(&us());
    let now = Instant::now();
    r.add_cache(lan_ip(40), lan_mac(40), false, now).unwrap();

    pump(&mut r, &mut lan, now + Duration::from_secs(3600));
    assert_eq!(r.lookup(lan_ip(40)), Some(lan_mac(40)));
    assert_eq!(r.arp_state(lan_ip(40)), Some(ArpState::Fixed));

    assert!(r.delete_cache(lan_ip(40)));
    assert_eq!(r.lookup(lan_ip(40)), None);
}

#[test]
fn test_answers_requests_for_us() {
    let mut r = resolver(ResolverOptions::default());
    let mut lan = Lan::new(&us());
    let now = Instant::now();

    lan.inject(ArpPacket::request(lan_mac(50), lan_ip(50), us().ip).to_frame(MacAddr::BROADCAST));
    pump(&mut r, &mut lan, now);

    let reply = lan.arp_sent()[0];
    assert_eq!(reply.sender_ip, us().ip);
    assert_eq!(reply.sender_mac, us().mac);
    assert_eq!(reply.target_mac, lan_mac(50));
    // The requester is remembered.
    assert_eq!(r.lookup(lan_ip(50)), Some(lan_mac(50)));
}

#[test]
fn test_point_to_point_needs_no_arp() {
    let mut iface = us();
    iface.broadcast = false;
    let mut r = ruster_resolver::dataplane::Resolver::new(iface, ResolverOptions::default());
    let mut lan = Lan::new(&us());

    let mac = r.resolve(super::REMOTE, &mut lan, &CancelToken::new()).unwrap();
    assert_eq!(mac, MacAddr::ZERO);
    assert!(lan.sent.is_empty());
}
