//! EVPN NLRI (RFC 7432 §7), all five route types
//!
//! No EVPN code exists in the teacher repo; the route-type catalogue below
//! follows RFC 7432 §7.1-7.5 directly, in the teacher's `Component` idiom
//! (fixed-shape struct, explicit `from_bytes`/`to_bytes`/`encoded_len`).

use crate::endec::Component;
use crate::nlri::RouteDistinguisher;
use crate::Error;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// A 10-byte EVPN Ethernet Segment Identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EthernetSegmentId(pub [u8; 10]);

/// EVPN route type 1: Ethernet Auto-Discovery (RFC 7432 §7.1).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EthernetAutoDiscovery {
    pub rd: RouteDistinguisher,
    pub esi: EthernetSegmentId,
    pub ethernet_tag_id: u32,
    pub label: crate::nlri::Label,
}

/// EVPN route type 2: MAC/IP Advertisement (RFC 7432 §7.2).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacIpAdvertisement {
    pub rd: RouteDistinguisher,
    pub esi: EthernetSegmentId,
    pub ethernet_tag_id: u32,
    pub mac: [u8; 6],
    pub ip: Option<IpAddr>,
    pub label1: crate::nlri::Label,
    pub label2: Option<crate::nlri::Label>,
}

/// EVPN route type 3: Inclusive Multicast Ethernet Tag (RFC 7432 §7.3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InclusiveMulticastEthernetTag {
    pub rd: RouteDistinguisher,
    pub ethernet_tag_id: u32,
    pub originator: IpAddr,
}

/// EVPN route type 4: Ethernet Segment (RFC 7432 §7.4).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EthernetSegmentRoute {
    pub rd: RouteDistinguisher,
    pub esi: EthernetSegmentId,
    pub originator: IpAddr,
}

/// EVPN route type 5: IP Prefix (RFC 9136).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IpPrefixRoute {
    pub rd: RouteDistinguisher,
    pub esi: EthernetSegmentId,
    pub ethernet_tag_id: u32,
    pub prefix_len: u8,
    pub prefix: IpAddr,
    pub gateway: IpAddr,
    pub label: crate::nlri::Label,
}

/// One EVPN NLRI: a route-type tag plus its typed value, or an opaque blob
/// for route types this core doesn't interpret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EvpnNlri {
    EthernetAutoDiscovery(EthernetAutoDiscovery),
    MacIpAdvertisement(MacIpAdvertisement),
    InclusiveMulticastEthernetTag(InclusiveMulticastEthernetTag),
    EthernetSegmentRoute(EthernetSegmentRoute),
    IpPrefixRoute(IpPrefixRoute),
    Unsupported { route_type: u8, data: Bytes },
}

fn get_ip(src: &mut Bytes, v6: bool) -> Result<IpAddr, Error> {
    if v6 {
        let mut octets = [0u8; 16];
        src.copy_to_slice(&mut octets);
        Ok(IpAddr::V6(Ipv6Addr::from(octets)))
    } else {
        Ok(IpAddr::V4(Ipv4Addr::from(src.get_u32())))
    }
}

fn put_ip(dst: &mut BytesMut, ip: IpAddr) {
    match ip {
        IpAddr::V4(v4) => dst.put_u32(v4.into()),
        IpAddr::V6(v6) => dst.put_slice(&v6.octets()),
    }
}

fn ip_len(ip: IpAddr) -> usize {
    match ip {
        IpAddr::V4(_) => 4,
        IpAddr::V6(_) => 16,
    }
}

impl Component for EvpnNlri {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        if src.remaining() < 2 {
            return Err(Error::InternalLength("EVPN NLRI header", std::cmp::Ordering::Less));
        }
        let route_type = src.get_u8();
        let len = usize::from(src.get_u8());
        if src.remaining() < len {
            return Err(Error::InternalLength("EVPN NLRI body", std::cmp::Ordering::Less));
        }
        let mut body = src.copy_to_bytes(len);
        Ok(match route_type {
            1 if body.remaining() == 8 + 10 + 4 + 3 => {
                let rd = RouteDistinguisher::from_bytes(&mut body)?;
                let mut esi = [0u8; 10];
                body.copy_to_slice(&mut esi);
                let ethernet_tag_id = body.get_u32();
                let label = crate::nlri::Label::from_bytes(&mut body)?;
                Self::EthernetAutoDiscovery(EthernetAutoDiscovery { rd, esi: EthernetSegmentId(esi), ethernet_tag_id, label })
            }
            2 => {
                let rd = RouteDistinguisher::from_bytes(&mut body)?;
                let mut esi = [0u8; 10];
                body.copy_to_slice(&mut esi);
                let ethernet_tag_id = body.get_u32();
                let ip_len_bits = body.get_u8();
                let mut mac = [0u8; 6];
                body.copy_to_slice(&mut mac);
                let ip = match ip_len_bits {
                    0 => None,
                    32 => Some(get_ip(&mut body, false)?),
                    128 => Some(get_ip(&mut body, true)?),
                    other => return Err(Error::InternalType("EVPN MAC/IP ip length", u16::from(other))),
                };
                let label1 = crate::nlri::Label::from_bytes(&mut body)?;
                let label2 = if body.remaining() >= 3 { Some(crate::nlri::Label::from_bytes(&mut body)?) } else { None };
                Self::MacIpAdvertisement(MacIpAdvertisement { rd, esi: EthernetSegmentId(esi), ethernet_tag_id, mac, ip, label1, label2 })
            }
            3 => {
                let rd = RouteDistinguisher::from_bytes(&mut body)?;
                let ethernet_tag_id = body.get_u32();
                let originator = get_ip(&mut body, body.remaining() == 16)?;
                Self::InclusiveMulticastEthernetTag(InclusiveMulticastEthernetTag { rd, ethernet_tag_id, originator })
            }
            4 => {
                let rd = RouteDistinguisher::from_bytes(&mut body)?;
                let mut esi = [0u8; 10];
                body.copy_to_slice(&mut esi);
                let originator = get_ip(&mut body, body.remaining() == 16)?;
                Self::EthernetSegmentRoute(EthernetSegmentRoute { rd, esi: EthernetSegmentId(esi), originator })
            }
            5 => {
                let rd = RouteDistinguisher::from_bytes(&mut body)?;
                let mut esi = [0u8; 10];
                body.copy_to_slice(&mut esi);
                let ethernet_tag_id = body.get_u32();
                let prefix_len = body.get_u8();
                // RFC 9136: remaining body minus gateway (same width as prefix) minus 3-byte label
                let remaining_after_fixed = body.remaining();
                let v6 = remaining_after_fixed == 16 + 16 + 3;
                let prefix = get_ip(&mut body, v6)?;
                let gateway = get_ip(&mut body, v6)?;
                let label = crate::nlri::Label::from_bytes(&mut body)?;
                Self::IpPrefixRoute(IpPrefixRoute { rd, esi: EthernetSegmentId(esi), ethernet_tag_id, prefix_len, prefix, gateway, label })
            }
            other => Self::Unsupported { route_type: other, data: body },
        })
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        let mut body = BytesMut::new();
        let route_type = match &self {
            Self::EthernetAutoDiscovery(r) => {
                r.rd.clone().to_bytes(&mut body);
                body.put_slice(&r.esi.0);
                body.put_u32(r.ethernet_tag_id);
                r.label.to_bytes(&mut body);
                1
            }
            Self::MacIpAdvertisement(r) => {
                r.rd.clone().to_bytes(&mut body);
                body.put_slice(&r.esi.0);
                body.put_u32(r.ethernet_tag_id);
                body.put_u8(u8::try_from(r.ip.map_or(0, |ip| ip_len(ip) * 8)).unwrap_or(0));
                body.put_slice(&r.mac);
                if let Some(ip) = r.ip {
                    put_ip(&mut body, ip);
                }
                r.label1.to_bytes(&mut body);
                if let Some(label2) = r.label2 {
                    label2.to_bytes(&mut body);
                }
                2
            }
            Self::InclusiveMulticastEthernetTag(r) => {
                r.rd.clone().to_bytes(&mut body);
                body.put_u32(r.ethernet_tag_id);
                put_ip(&mut body, r.originator);
                3
            }
            Self::EthernetSegmentRoute(r) => {
                r.rd.clone().to_bytes(&mut body);
                body.put_slice(&r.esi.0);
                put_ip(&mut body, r.originator);
                4
            }
            Self::IpPrefixRoute(r) => {
                r.rd.clone().to_bytes(&mut body);
                body.put_slice(&r.esi.0);
                body.put_u32(r.ethernet_tag_id);
                body.put_u8(r.prefix_len);
                put_ip(&mut body, r.prefix);
                put_ip(&mut body, r.gateway);
                r.label.to_bytes(&mut body);
                5
            }
            Self::Unsupported { route_type, data } => {
                body.put_slice(data);
                *route_type
            }
        };
        dst.put_u8(route_type);
        dst.put_u8(u8::try_from(body.len()).expect("EVPN NLRI body length overflow"));
        let len = body.len();
        dst.put_slice(&body);
        2 + len
    }

    fn encoded_len(&self) -> usize {
        2 + match self {
            Self::EthernetAutoDiscovery(_) => 8 + 10 + 4 + 3,
            Self::MacIpAdvertisement(r) => 8 + 10 + 4 + 1 + 6 + r.ip.map_or(0, ip_len) + 3 + r.label2.map_or(0, |_| 3),
            Self::InclusiveMulticastEthernetTag(r) => 8 + 4 + ip_len(r.originator),
            Self::EthernetSegmentRoute(r) => 8 + 10 + ip_len(r.originator),
            Self::IpPrefixRoute(r) => 8 + 10 + 4 + 1 + ip_len(r.prefix) + ip_len(r.gateway) + 3,
            Self::Unsupported { data, .. } => data.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlri::Label;

    fn round_trip(nlri: EvpnNlri) {
        let mut buf = BytesMut::new();
        let expected_len = nlri.encoded_len();
        let written = nlri.clone().to_bytes(&mut buf);
        assert_eq!(written, expected_len);
        assert_eq!(buf.len(), expected_len);
        let mut frozen = buf.freeze();
        let decoded = EvpnNlri::from_bytes(&mut frozen).unwrap();
        assert_eq!(decoded, nlri);
        assert!(!frozen.has_remaining());
    }

    #[test]
    fn mac_ip_advertisement_round_trips_without_optional_ip() {
        round_trip(EvpnNlri::MacIpAdvertisement(MacIpAdvertisement {
            rd: RouteDistinguisher([0,0,0xFD,0xE8,0,0,0,100]),
            esi: EthernetSegmentId([0; 10]),
            ethernet_tag_id: 0,
            mac: [0x02, 0x00, 0x00, 0x00, 0x00, 0x01],
            ip: None,
            label1: Label::new(42, true),
            label2: None,
        }));
    }

    #[test]
    fn mac_ip_advertisement_round_trips_with_ipv4_and_two_labels() {
        round_trip(EvpnNlri::MacIpAdvertisement(MacIpAdvertisement {
            rd: RouteDistinguisher([0,0,0xFD,0xE8,0,0,0,100]),
            esi: EthernetSegmentId([1; 10]),
            ethernet_tag_id: 7,
            mac: [0x02, 0x00, 0x00, 0x00, 0x00, 0x02],
            ip: Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))),
            label1: Label::new(42, false),
            label2: Some(Label::new(99, true)),
        }));
    }

    #[test]
    fn ip_prefix_route_round_trips_ipv6() {
        round_trip(EvpnNlri::IpPrefixRoute(IpPrefixRoute {
            rd: RouteDistinguisher([0,0,0xFD,0xE8,0,0,0,1]),
            esi: EthernetSegmentId([0; 10]),
            ethernet_tag_id: 0,
            prefix_len: 64,
            prefix: IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0)),
            gateway: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            label: Label::new(10, true),
        }));
    }

    #[test]
    fn unsupported_route_type_round_trips_opaque() {
        round_trip(EvpnNlri::Unsupported { route_type: 6, data: Bytes::from_static(&[0xAA, 0xBB, 0xCC]) });
    }
}
