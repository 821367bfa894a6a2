//! Address-family identifiers (RFC 4760, RFC 7752, RFC 6514, draft-mup)
//!
//! The (AFI, SAFI) pair is the primary key under which all Adj-RIB
//! bookkeeping is sharded; see [`Family`].

use enum_primitive_derive::Primitive;
use num_traits::FromPrimitive;
use std::fmt;

/// BGP address family identifier
///
/// # References
/// [Address Family Numbers](https://www.iana.org/assignments/address-family-numbers/address-family-numbers.xhtml)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Primitive)]
#[cfg_attr(feature = "impl-serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum Afi {
    Ipv4 = 1,
    Ipv6 = 2,
    L2vpn = 25,
    /// Used as the AFI of BGP-LS NLRIs (RFC 7752)
    BgpLs = 16388,
}

impl fmt::Display for Afi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
            Self::L2vpn => "l2vpn",
            Self::BgpLs => "bgp-ls",
        };
        f.write_str(s)
    }
}

/// BGP subsequent address family identifier
///
/// # References
/// [SAFI Values](https://www.iana.org/assignments/safi-namespace/safi-namespace.xhtml)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Primitive)]
#[cfg_attr(feature = "impl-serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum Safi {
    Unicast = 1,
    Multicast = 2,
    /// NLRI with MPLS labels (labelled-unicast)
    MplsLabel = 4,
    /// Dissemination of Flow Specification rules (RFC 8955)
    Flowspec = 133,
    /// L3VPN Dissemination of Flow Specification rules (RFC 8955)
    FlowspecVpn = 134,
    /// MCAST-VPN (RFC 6514)
    Mvpn = 5,
    /// VPLS (RFC 4761/6074)
    Vpls = 65,
    /// EVPN (RFC 7432)
    Evpn = 70,
    /// BGP Mobile User Plane (draft-ietf-bess-bgp-mup-bgp-spec)
    Mup = 85,
    /// MPLS-labeled VPN (RFC 4364)
    MplsVpn = 128,
    VpnMulticast = 129,
    /// Route target constrain (RFC 4684)
    Rtc = 132,
    /// BGP-LS (RFC 7752)
    BgpLs = 71,
    BgpLsVpn = 72,
}

impl fmt::Display for Safi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unicast => "unicast",
            Self::Multicast => "multicast",
            Self::MplsLabel => "labelled-unicast",
            Self::Flowspec => "flow",
            Self::FlowspecVpn => "flow-vpn",
            Self::Mvpn => "mvpn",
            Self::Vpls => "vpls",
            Self::Evpn => "evpn",
            Self::Mup => "mup",
            Self::MplsVpn => "mpls-vpn",
            Self::VpnMulticast => "vpn-multicast",
            Self::Rtc => "rtc",
            Self::BgpLs => "bgp-ls",
            Self::BgpLsVpn => "bgp-ls-vpn",
        };
        f.write_str(s)
    }
}

/// A (AFI, SAFI) pair identifying a route's family.
///
/// This is the sharding key for every per-peer RIB table (spec §3): routes,
/// capability negotiation outcomes, and wire NLRI containers are all
/// indexed by `Family` rather than by a string name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "impl-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Family {
    pub afi: Afi,
    pub safi: Safi,
}

impl Family {
    #[must_use]
    pub const fn new(afi: Afi, safi: Safi) -> Self {
        Self { afi, safi }
    }

    pub const IPV4_UNICAST: Self = Self::new(Afi::Ipv4, Safi::Unicast);
    pub const IPV4_MULTICAST: Self = Self::new(Afi::Ipv4, Safi::Multicast);
    pub const IPV4_LABELED_UNICAST: Self = Self::new(Afi::Ipv4, Safi::MplsLabel);
    pub const IPV4_MPLS_VPN: Self = Self::new(Afi::Ipv4, Safi::MplsVpn);
    pub const IPV4_FLOW: Self = Self::new(Afi::Ipv4, Safi::Flowspec);
    pub const IPV4_FLOW_VPN: Self = Self::new(Afi::Ipv4, Safi::FlowspecVpn);
    pub const IPV6_UNICAST: Self = Self::new(Afi::Ipv6, Safi::Unicast);
    pub const IPV6_MULTICAST: Self = Self::new(Afi::Ipv6, Safi::Multicast);
    pub const IPV6_LABELED_UNICAST: Self = Self::new(Afi::Ipv6, Safi::MplsLabel);
    pub const IPV6_MPLS_VPN: Self = Self::new(Afi::Ipv6, Safi::MplsVpn);
    pub const IPV6_FLOW: Self = Self::new(Afi::Ipv6, Safi::Flowspec);
    pub const IPV6_FLOW_VPN: Self = Self::new(Afi::Ipv6, Safi::FlowspecVpn);
    pub const L2VPN_VPLS: Self = Self::new(Afi::L2vpn, Safi::Vpls);
    pub const L2VPN_EVPN: Self = Self::new(Afi::L2vpn, Safi::Evpn);
    pub const BGP_LS: Self = Self::new(Afi::BgpLs, Safi::BgpLs);
    pub const IPV4_MVPN: Self = Self::new(Afi::Ipv4, Safi::Mvpn);
    pub const IPV6_MVPN: Self = Self::new(Afi::Ipv6, Safi::Mvpn);
    pub const IPV4_MUP: Self = Self::new(Afi::Ipv4, Safi::Mup);
    pub const IPV6_MUP: Self = Self::new(Afi::Ipv6, Safi::Mup);
    pub const IPV4_RTC: Self = Self::new(Afi::Ipv4, Safi::Rtc);
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.afi, self.safi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_display_is_afi_slash_safi() {
        assert_eq!(Family::IPV4_UNICAST.to_string(), "ipv4/unicast");
        assert_eq!(Family::L2VPN_EVPN.to_string(), "l2vpn/evpn");
        assert_eq!(Family::BGP_LS.to_string(), "bgp-ls/bgp-ls");
    }

    #[test]
    fn wire_codes_round_trip_through_primitive_conversion() {
        for afi in [Afi::Ipv4, Afi::Ipv6, Afi::L2vpn, Afi::BgpLs] {
            assert_eq!(Afi::from_u16(afi as u16), Some(afi));
        }
        for safi in [Safi::Unicast, Safi::Flowspec, Safi::Evpn, Safi::Mup, Safi::Rtc] {
            assert_eq!(Safi::from_u16(safi as u16), Some(safi));
        }
    }
}
