//! ARP packet processor
//!
//! Decides what an inbound ARP packet means for the cache and whether we
//! answer it. Transmission is left to the caller.

use super::arp_cache::{ArpCache, Confirmation};
use super::link::InterfaceInfo;
use crate::protocol::arp::{ArpOp, ArpPacket};
use crate::protocol::MacAddr;
use std::time::Instant;
use tracing::{debug, warn};

/// What the sender information did to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Learned {
    Nothing,
    /// Completed one of our Pending lookups
    Resolved,
    /// Same binding seen again
    Refreshed,
    /// Binding contradicted; entry left to age out quickly
    Suspect { cached: MacAddr },
    /// Requester cached because we answered it
    Cached,
}

/// Result of processing an ARP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpAction {
    pub reply: Option<ArpPacket>,
    pub learned: Learned,
    /// Another station claims our address
    pub conflict: bool,
    /// A reply was due but withheld because of the receive mode
    pub suppressed: bool,
}

/// Process an inbound ARP packet.
///
/// `broadcast` is whether the carrying frame was sent to the broadcast MAC.
pub fn process_arp(
    packet: &ArpPacket,
    broadcast: bool,
    cache: &mut ArpCache,
    iface: &InterfaceInfo,
    now: Instant,
) -> ArpAction {
    let mut action = ArpAction {
        reply: None,
        learned: Learned::Nothing,
        conflict: false,
        suppressed: false,
    };

    if packet.sender_ip == iface.ip && packet.sender_mac != iface.mac {
        warn!(
            "address conflict: {} claims {} (ours is {})",
            packet.sender_mac, packet.sender_ip, iface.mac
        );
        action.conflict = true;
    }

    let mut reply_due = packet.operation == ArpOp::Request && iface.owns(packet.target_ip);
    if reply_due && !broadcast && iface.rx_mode.is_restricted() {
        debug!(
            "not answering unicast ARP from {} in {:?} mode",
            packet.sender_ip, iface.rx_mode
        );
        reply_due = false;
        action.suppressed = true;
    }
    if reply_due {
        action.reply = Some(ArpPacket::reply(
            iface.mac,
            iface.ip,
            packet.sender_mac,
            packet.sender_ip,
        ));
    }

    // Never learn ourselves, probes (0.0.0.0), or group MACs.
    if iface.is_local(packet.sender_ip)
        || packet.sender_ip.is_unspecified()
        || !packet.sender_mac.is_unicast()
        || packet.sender_mac.is_zero()
    {
        return action;
    }

    if packet.operation == ArpOp::Reply
        && cache.resolve_pending(packet.sender_ip, packet.sender_mac, now)
    {
        debug!("ARP resolved {} -> {}", packet.sender_ip, packet.sender_mac);
        action.learned = Learned::Resolved;
        return action;
    }

    match cache.confirm_dynamic(packet.sender_ip, packet.sender_mac, now) {
        Confirmation::Refreshed => action.learned = Learned::Refreshed,
        Confirmation::Contradicted { cached } => {
            warn!(
                "{} now claimed by {} (cached {}), not trusting it",
                packet.sender_ip, packet.sender_mac, cached
            );
            action.learned = Learned::Suspect { cached };
        }
        Confirmation::Unknown if action.reply.is_some() => {
            // Whoever asks for us is about to talk to us.
            if cache.lookup(packet.sender_ip).is_none()
                && cache
                    .add_cache(packet.sender_ip, packet.sender_mac, true, now)
                    .is_ok()
            {
                action.learned = Learned::Cached;
            }
        }
        Confirmation::Unknown => {}
    }

    action
}
