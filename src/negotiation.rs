//! Per-session negotiation outcome (spec §4.6)
//!
//! Produced once, at the end of the OPEN exchange, from the intersection of
//! locally-sent and peer-received capabilities. Immutable for the lifetime
//! of the session. The codec and the RIB engine read only this object; they
//! never consult the raw OPEN bytes again.

use crate::afi::Family;
use crate::capability::{AddPathDirection, Capabilities, Value as CapValue};
use std::collections::{HashMap, HashSet};

/// Graceful-restart outcome for a negotiated session (RFC 4724)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GracefulRestart {
    /// Whether the peer set the "restart state" bit, meaning its previous
    /// session went down uncleanly and stale routes should be held pending
    /// its End-of-RIB marker.
    pub restarting: bool,
    /// Advertised restart time, in seconds.
    pub restart_time: u16,
    /// Families for which the peer preserved forwarding state across restart.
    pub preserved_families: HashSet<Family>,
}

/// The immutable result of capability negotiation for one session.
#[derive(Clone, Debug, Default)]
pub struct Negotiation {
    asn4: bool,
    families: HashSet<Family>,
    addpath_send: HashSet<Family>,
    addpath_receive: HashSet<Family>,
    msg_size: usize,
    enhanced_refresh: bool,
    route_refresh: bool,
    link_local_nh: HashSet<Family>,
    graceful_restart: Option<GracefulRestart>,
}

impl Negotiation {
    /// Compute the negotiated outcome from what we sent and what the peer sent.
    #[must_use]
    pub fn compute(local: &Capabilities, peer: &Capabilities) -> Self {
        let asn4 = local.has_asn4() && peer.has_asn4();

        let local_families: HashSet<Family> = local.multiprotocol_families().collect();
        let peer_families: HashSet<Family> = peer.multiprotocol_families().collect();
        // RFC 4271 base IPv4 unicast is implied when no multiprotocol capability
        // is exchanged at all; otherwise only the intersection is usable.
        let families: HashSet<Family> = if local_families.is_empty() && peer_families.is_empty() {
            [Family::IPV4_UNICAST].into_iter().collect()
        } else {
            local_families.intersection(&peer_families).copied().collect()
        };

        let mut addpath_send = HashSet::new();
        let mut addpath_receive = HashSet::new();
        for (family, local_dir) in local.addpath_directions() {
            if let Some(peer_dir) = peer.addpath_directions().find_map(|(f, d)| (f == family).then_some(d)) {
                // We send to the peer when we offered "send" and the peer can
                // "receive" (from the peer's perspective that's its own
                // send/receive bit meaning "what the peer will accept from us").
                if local_dir.can_send() && peer_dir.can_receive() {
                    addpath_send.insert(family);
                }
                if local_dir.can_receive() && peer_dir.can_send() {
                    addpath_receive.insert(family);
                }
            }
        }

        let enhanced_refresh = local.has_enhanced_route_refresh() && peer.has_enhanced_route_refresh();
        let route_refresh = enhanced_refresh || (local.has_route_refresh() && peer.has_route_refresh());

        let extended_message = local.has_extended_message() && peer.has_extended_message();
        let msg_size = if extended_message { 65535 } else { 4096 };

        let link_local_nh: HashSet<Family> = local
            .extended_next_hop_families()
            .filter(|f| peer.extended_next_hop_families().any(|pf| pf == *f))
            .collect();

        let graceful_restart = peer.graceful_restart().map(|gr| GracefulRestart {
            restarting: gr.restarting,
            restart_time: gr.restart_time,
            preserved_families: gr.preserved_families,
        });

        Self {
            asn4,
            families,
            addpath_send,
            addpath_receive,
            msg_size,
            enhanced_refresh,
            route_refresh,
            link_local_nh,
            graceful_restart,
        }
    }

    #[must_use]
    pub const fn asn4(&self) -> bool {
        self.asn4
    }

    #[must_use]
    pub fn families(&self) -> &HashSet<Family> {
        &self.families
    }

    #[must_use]
    pub fn addpath_send(&self, family: Family) -> bool {
        self.addpath_send.contains(&family)
    }

    #[must_use]
    pub fn addpath_receive(&self, family: Family) -> bool {
        self.addpath_receive.contains(&family)
    }

    #[must_use]
    pub const fn msg_size(&self) -> usize {
        self.msg_size
    }

    #[must_use]
    pub const fn enhanced_refresh(&self) -> bool {
        self.enhanced_refresh
    }

    #[must_use]
    pub const fn route_refresh(&self) -> bool {
        self.route_refresh
    }

    #[must_use]
    pub fn link_local_nh(&self, family: Family) -> bool {
        self.link_local_nh.contains(&family)
    }

    #[must_use]
    pub fn graceful_restart(&self) -> Option<&GracefulRestart> {
        self.graceful_restart.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{AddPathDirection, CapabilitiesBuilder};
    use crate::afi::{Afi, Safi};

    #[test]
    fn intersects_families_and_resolves_addpath_direction() {
        let local = CapabilitiesBuilder::new()
            .multi_protocol(Afi::Ipv4, Safi::Unicast)
            .multi_protocol(Afi::Ipv6, Safi::Unicast)
            .add_path(Family::IPV4_UNICAST, AddPathDirection::SendOnly)
            .build();
        let peer = CapabilitiesBuilder::new()
            .multi_protocol(Afi::Ipv4, Safi::Unicast)
            .add_path(Family::IPV4_UNICAST, AddPathDirection::ReceiveOnly)
            .build();

        let neg = Negotiation::compute(&local, &peer);
        assert_eq!(neg.families(), &[Family::IPV4_UNICAST].into_iter().collect());
        assert!(neg.addpath_send(Family::IPV4_UNICAST));
        assert!(!neg.addpath_receive(Family::IPV4_UNICAST));
    }

    #[test]
    fn no_multiprotocol_at_all_implies_base_ipv4_unicast() {
        let local = CapabilitiesBuilder::new().route_refresh().build();
        let peer = CapabilitiesBuilder::new().route_refresh().build();

        let neg = Negotiation::compute(&local, &peer);
        assert_eq!(neg.families(), &[Family::IPV4_UNICAST].into_iter().collect());
    }

    #[test]
    fn extended_message_requires_both_sides() {
        let local = CapabilitiesBuilder::new().extended_message().build();
        let peer = CapabilitiesBuilder::new().build();

        let neg = Negotiation::compute(&local, &peer);
        assert_eq!(neg.msg_size(), 4096);

        let peer_both = CapabilitiesBuilder::new().extended_message().build();
        let neg_both = Negotiation::compute(&local, &peer_both);
        assert_eq!(neg_both.msg_size(), 65535);
    }

    #[test]
    fn enhanced_refresh_implies_plain_refresh() {
        let local = CapabilitiesBuilder::new().enhanced_route_refresh().build();
        let peer = CapabilitiesBuilder::new().enhanced_route_refresh().build();

        let neg = Negotiation::compute(&local, &peer);
        assert!(neg.enhanced_refresh());
        assert!(neg.route_refresh());
    }
}

/// Per-family outcome, handy for building `show neighbor` style reports.
#[must_use]
pub fn addpath_summary(neg: &Negotiation) -> HashMap<Family, AddPathDirection> {
    let mut out = HashMap::new();
    for family in neg.families() {
        let send = neg.addpath_send(*family);
        let recv = neg.addpath_receive(*family);
        let dir = match (send, recv) {
            (true, true) => AddPathDirection::Both,
            (true, false) => AddPathDirection::SendOnly,
            (false, true) => AddPathDirection::ReceiveOnly,
            (false, false) => continue,
        };
        out.insert(*family, dir);
    }
    out
}
