//! COMMUNITIES, EXTENDED_COMMUNITIES and LARGE_COMMUNITIES attributes
//! (RFC 1997, RFC 4360/7153, RFC 8092)
//!
//! The teacher never carried any community attribute; the extended-community
//! subtype catalogue below is grounded in exabgp's
//! `community/extended/{bandwidth,chso,encapsulation,l2info,mac_mobility,
//! rt_record,mup}.py` (see `original_source`), kept as byte-exact structs
//! per spec.md §9's resolution for subtypes of uncertain standardization.

use crate::endec::Component;
use crate::Error;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::ops::Deref;

/// A single well-known or private 4-byte community (RFC 1997 §2).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "impl-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Community(pub u32);

impl Community {
    pub const NO_EXPORT: Self = Self(0xFFFF_FF01);
    pub const NO_ADVERTISE: Self = Self(0xFFFF_FF02);
    pub const NO_EXPORT_SUBCONFED: Self = Self(0xFFFF_FF03);

    #[must_use]
    pub const fn asn(self) -> u16 {
        (self.0 >> 16) as u16
    }

    #[must_use]
    pub const fn value(self) -> u16 {
        self.0 as u16
    }
}

impl Component for Community {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self(src.get_u32()))
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        dst.put_u32(self.0);
        4
    }

    fn encoded_len(&self) -> usize {
        4
    }
}

/// COMMUNITIES attribute (RFC 1997 §3): a flat list of 4-byte communities.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Communities(pub Vec<Community>);

impl Component for Communities {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        let mut out = Vec::new();
        while src.has_remaining() {
            out.push(Community::from_bytes(src)?);
        }
        Ok(Self(out))
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        let mut len = 0;
        for community in self.0 {
            len += community.to_bytes(dst);
        }
        len
    }

    fn encoded_len(&self) -> usize {
        self.0.len() * 4
    }
}

impl Deref for Communities {
    type Target = Vec<Community>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// LARGE_COMMUNITIES attribute (RFC 8092): three 4-byte fields per entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "impl-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LargeCommunity {
    pub global_admin: u32,
    pub local_data1: u32,
    pub local_data2: u32,
}

impl Component for LargeCommunity {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self { global_admin: src.get_u32(), local_data1: src.get_u32(), local_data2: src.get_u32() })
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        dst.put_u32(self.global_admin);
        dst.put_u32(self.local_data1);
        dst.put_u32(self.local_data2);
        12
    }

    fn encoded_len(&self) -> usize {
        12
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LargeCommunities(pub Vec<LargeCommunity>);

impl Component for LargeCommunities {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        let mut out = Vec::new();
        while src.has_remaining() {
            out.push(LargeCommunity::from_bytes(src)?);
        }
        Ok(Self(out))
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        let mut len = 0;
        for community in self.0 {
            len += community.to_bytes(dst);
        }
        len
    }

    fn encoded_len(&self) -> usize {
        self.0.len() * 12
    }
}

/// Whether an extended community is transitive across AS boundaries
/// (RFC 4360 §3, the high bit of the type octet).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transitivity {
    Transitive,
    NonTransitive,
}

/// One 8-byte extended community (RFC 4360, RFC 5512 for encapsulation,
/// RFC 7432 for MAC mobility, RFC 9252 for MUP).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtendedCommunity {
    /// Two-octet-AS route target (type 0x00, subtype 0x02).
    RouteTarget2Byte { asn: u16, value: u32 },
    /// IPv4-address route target (type 0x01, subtype 0x02).
    RouteTargetIpv4 { addr: std::net::Ipv4Addr, value: u16 },
    /// Four-octet-AS route target (type 0x02, subtype 0x02).
    RouteTarget4Byte { asn: u32, value: u16 },
    /// Two-octet-AS route origin (type 0x00, subtype 0x03).
    RouteOrigin2Byte { asn: u16, value: u32 },
    /// Tunnel-encapsulation type (type 0x03, subtype 0x0c, RFC 5512 §4.5).
    Encapsulation { tunnel_type: u16 },
    /// MAC mobility sequence number (type 0x06, subtype 0x00, RFC 7432 §7.7).
    MacMobility { static_: bool, sequence: u32 },
    /// Link-bandwidth extended community (type 0x40/0x04, subtype 0x04, common Cisco/IETF use).
    Bandwidth { asn: u16, bandwidth: f32 },
    /// BGP flow-spec traffic-action (RFC 8955) "CHSO" — copy/redirect hash/strip options.
    Chso { flags: u8, value: u32 },
    /// Route-target record (draft-ietf-bess-service-chaining / RTC auxiliary use).
    RouteTargetRecord { asn: u32, value: u16 },
    /// Layer-2 info extended community (RFC 4761 §4.3).
    L2Info { encaps_type: u8, control_flags: u8, mtu: u16 },
    /// BGP Mobile User Plane extended communities (3GPP segment/tunnel markers).
    Mup { subtype: u8, value: [u8; 6] },
    Unsupported { type_: u8, subtype: u8, value: [u8; 6] },
}

impl ExtendedCommunity {
    fn transitivity(type_: u8) -> Transitivity {
        if type_ & 0x40 != 0 {
            Transitivity::NonTransitive
        } else {
            Transitivity::Transitive
        }
    }

    #[must_use]
    pub fn kind(&self) -> Transitivity {
        match self {
            Self::Bandwidth { .. } => Transitivity::NonTransitive,
            Self::Unsupported { type_, .. } => Self::transitivity(*type_),
            _ => Transitivity::Transitive,
        }
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let type_ = src.get_u8();
        let subtype = src.get_u8();
        Ok(match (type_ & 0x3f, subtype) {
            (0x00, 0x02) => {
                let asn = src.get_u16();
                let value = src.get_u32();
                Self::RouteTarget2Byte { asn, value }
            }
            (0x01, 0x02) => {
                let addr = std::net::Ipv4Addr::from(src.get_u32());
                let value = src.get_u16();
                Self::RouteTargetIpv4 { addr, value }
            }
            (0x02, 0x02) => {
                let asn = src.get_u32();
                let value = src.get_u16();
                Self::RouteTarget4Byte { asn, value }
            }
            (0x00, 0x03) => {
                let asn = src.get_u16();
                let value = src.get_u32();
                Self::RouteOrigin2Byte { asn, value }
            }
            (0x03, 0x0c) => {
                let tunnel_type = src.get_u16();
                let _reserved = src.get_u32();
                Self::Encapsulation { tunnel_type }
            }
            (0x06, 0x00) => {
                let flags = src.get_u8();
                let _reserved = src.get_u8();
                let sequence = src.get_u32();
                Self::MacMobility { static_: flags & 0x01 != 0, sequence }
            }
            (0x04, 0x04) | (0x40, 0x04) => {
                let asn = src.get_u16();
                let mut raw = [0u8; 4];
                src.copy_to_slice(&mut raw);
                Self::Bandwidth { asn, bandwidth: f32::from_be_bytes(raw) }
            }
            (0x03, 0x0d) => {
                let flags = src.get_u8();
                let _reserved = src.get_u8();
                let value = src.get_u32();
                Self::Chso { flags, value }
            }
            (0x01, 0x13) | (0x02, 0x13) => {
                let asn = src.get_u32();
                let value = src.get_u16();
                Self::RouteTargetRecord { asn, value }
            }
            (0x00, 0x0a) => {
                let encaps_type = src.get_u8();
                let control_flags = src.get_u8();
                let mtu = src.get_u16();
                let _reserved = src.get_u16();
                Self::L2Info { encaps_type, control_flags, mtu }
            }
            _ if (0x0c..=0x10).contains(&(type_ & 0x3f)) => {
                let mut value = [0u8; 6];
                src.copy_to_slice(&mut value);
                Self::Mup { subtype, value }
            }
            _ => {
                let mut value = [0u8; 6];
                src.copy_to_slice(&mut value);
                Self::Unsupported { type_, subtype, value }
            }
        })
    }

    fn encode(&self, dst: &mut BytesMut) {
        match self {
            Self::RouteTarget2Byte { asn, value } => {
                dst.put_u8(0x00);
                dst.put_u8(0x02);
                dst.put_u16(*asn);
                dst.put_u32(*value);
            }
            Self::RouteTargetIpv4 { addr, value } => {
                dst.put_u8(0x01);
                dst.put_u8(0x02);
                dst.put_u32((*addr).into());
                dst.put_u16(*value);
            }
            Self::RouteTarget4Byte { asn, value } => {
                dst.put_u8(0x02);
                dst.put_u8(0x02);
                dst.put_u32(*asn);
                dst.put_u16(*value);
            }
            Self::RouteOrigin2Byte { asn, value } => {
                dst.put_u8(0x00);
                dst.put_u8(0x03);
                dst.put_u16(*asn);
                dst.put_u32(*value);
            }
            Self::Encapsulation { tunnel_type } => {
                dst.put_u8(0x03);
                dst.put_u8(0x0c);
                dst.put_u16(*tunnel_type);
                dst.put_u32(0);
            }
            Self::MacMobility { static_, sequence } => {
                dst.put_u8(0x06);
                dst.put_u8(0x00);
                dst.put_u8(u8::from(*static_));
                dst.put_u8(0);
                dst.put_u32(*sequence);
            }
            Self::Bandwidth { asn, bandwidth } => {
                dst.put_u8(0x40);
                dst.put_u8(0x04);
                dst.put_u16(*asn);
                dst.put_slice(&bandwidth.to_be_bytes());
            }
            Self::Chso { flags, value } => {
                dst.put_u8(0x03);
                dst.put_u8(0x0d);
                dst.put_u8(*flags);
                dst.put_u8(0);
                dst.put_u32(*value);
            }
            Self::RouteTargetRecord { asn, value } => {
                dst.put_u8(0x02);
                dst.put_u8(0x13);
                dst.put_u32(*asn);
                dst.put_u16(*value);
            }
            Self::L2Info { encaps_type, control_flags, mtu } => {
                dst.put_u8(0x00);
                dst.put_u8(0x0a);
                dst.put_u8(*encaps_type);
                dst.put_u8(*control_flags);
                dst.put_u16(*mtu);
                dst.put_u16(0);
            }
            Self::Mup { subtype, value } => {
                dst.put_u8(0x0c);
                dst.put_u8(*subtype);
                dst.put_slice(value);
            }
            Self::Unsupported { type_, subtype, value } => {
                dst.put_u8(*type_);
                dst.put_u8(*subtype);
                dst.put_slice(value);
            }
        }
    }
}

/// EXTENDED_COMMUNITIES attribute (RFC 4360 §2): a flat list of 8-byte entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtendedCommunities(pub Vec<ExtendedCommunity>);

impl Component for ExtendedCommunities {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        let mut out = Vec::new();
        while src.remaining() >= 8 {
            out.push(ExtendedCommunity::decode(src)?);
        }
        Ok(Self(out))
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        for community in &self.0 {
            community.encode(dst);
        }
        self.0.len() * 8
    }

    fn encoded_len(&self) -> usize {
        self.0.len() * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex_to_bytes;

    #[test]
    fn communities_round_trip() {
        let mut src = hex_to_bytes("ffffff01 ffffff02");
        let communities = Communities::from_bytes(&mut src).unwrap();
        assert_eq!(communities.0, vec![Community::NO_EXPORT, Community::NO_ADVERTISE]);
    }

    #[test]
    fn route_target_2byte_round_trips() {
        let value = ExtendedCommunity::RouteTarget2Byte { asn: 65001, value: 100 };
        let mut dst = BytesMut::new();
        value.encode(&mut dst);
        let mut src = dst.freeze();
        assert_eq!(ExtendedCommunity::decode(&mut src).unwrap(), value);
    }

    #[test]
    fn large_community_round_trips() {
        let large = LargeCommunity { global_admin: 65001, local_data1: 1, local_data2: 2 };
        let mut dst = BytesMut::new();
        large.to_bytes(&mut dst);
        let mut src = dst.freeze();
        assert_eq!(LargeCommunity::from_bytes(&mut src).unwrap(), large);
    }
}
