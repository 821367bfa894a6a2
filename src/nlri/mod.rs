//! NLRI catalogue for every address family this core understands
//! (spec.md §3's family list).
//!
//! The teacher only ever carried IPv4/IPv6 unicast NLRI (via
//! [`crate::route::Routes`]); everything else here is new, built in the
//! teacher's `Component` idiom and grounded where possible in the
//! corresponding RFC, with `original_source`'s attribute/NLRI modules
//! (aggregator, community, sr, bgpls, open/capability/mp, ...) as the
//! reference for field layout where the distilled spec is silent.

pub mod evpn;
pub mod flowspec;

use crate::afi::Family;
use crate::cidr::n_prefix_octets;
use crate::endec::Component;
use crate::route;
use crate::Error;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// ADD-PATH path identifier (RFC 7911 §3): a 4-byte value prefixed to the
/// NLRI when ADD-PATH has been negotiated in the receive direction for the
/// family.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "impl-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PathId(pub u32);

/// An MPLS label stack entry (RFC 8277 §2.1): 20-bit label value, 3
/// experimental bits, 1 bottom-of-stack bit, packed into 3 wire octets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "impl-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Label(u32);

impl Label {
    #[must_use]
    pub const fn new(value: u32, bottom_of_stack: bool) -> Self {
        Self((value << 4) | u32::from(bottom_of_stack))
    }

    #[must_use]
    pub const fn value(self) -> u32 {
        self.0 >> 4
    }

    #[must_use]
    pub const fn bottom_of_stack(self) -> bool {
        self.0 & 1 != 0
    }

    /// RFC 8277 §4: a withdrawal carries the reserved "compatibility" label
    /// value so the 3-octet field stays self-describing without a real label.
    #[must_use]
    pub const fn is_withdraw_compat(self) -> bool {
        self.value() == 0x80_0000 >> 4
    }
}

impl Component for Label {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        if src.remaining() < 3 {
            return Err(Error::InternalLength("MPLS label", std::cmp::Ordering::Less));
        }
        let b0 = src.get_u8();
        let b1 = src.get_u8();
        let b2 = src.get_u8();
        Ok(Self((u32::from(b0) << 16) | (u32::from(b1) << 8) | u32::from(b2)))
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        dst.put_u8(((self.0 >> 16) & 0xff) as u8);
        dst.put_u8(((self.0 >> 8) & 0xff) as u8);
        dst.put_u8((self.0 & 0xff) as u8);
        3
    }

    fn encoded_len(&self) -> usize {
        3
    }
}

/// An 8-byte Route Distinguisher (RFC 4364 §4.2). The type field is decoded
/// for display purposes only; the value is otherwise carried opaque.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "impl-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RouteDistinguisher(pub [u8; 8]);

impl Component for RouteDistinguisher {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        if src.remaining() < 8 {
            return Err(Error::InternalLength("route distinguisher", std::cmp::Ordering::Less));
        }
        let mut raw = [0u8; 8];
        src.copy_to_slice(&mut raw);
        Ok(Self(raw))
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        dst.put_slice(&self.0);
        8
    }

    fn encoded_len(&self) -> usize {
        8
    }
}

impl std::fmt::Display for RouteDistinguisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let type_ = u16::from_be_bytes([self.0[0], self.0[1]]);
        match type_ {
            0 => {
                let asn = u16::from_be_bytes([self.0[2], self.0[3]]);
                let an = u32::from_be_bytes([self.0[4], self.0[5], self.0[6], self.0[7]]);
                write!(f, "{asn}:{an}")
            }
            1 => {
                let ip = std::net::Ipv4Addr::new(self.0[2], self.0[3], self.0[4], self.0[5]);
                let an = u16::from_be_bytes([self.0[6], self.0[7]]);
                write!(f, "{ip}:{an}")
            }
            2 => {
                let asn = u32::from_be_bytes([self.0[2], self.0[3], self.0[4], self.0[5]]);
                let an = u16::from_be_bytes([self.0[6], self.0[7]]);
                write!(f, "{asn}:{an}")
            }
            _ => write!(f, "{:?}", self.0),
        }
    }
}

/// A labeled prefix: a label stack followed by a plain IP prefix
/// (RFC 8277 §2.1). Used directly by labelled-unicast, and as the tail of
/// an MPLS-VPN NLRI after the route distinguisher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabeledPrefix {
    pub labels: Vec<Label>,
    pub prefix_len: u8,
    pub prefix: Bytes,
}

fn decode_label_stack(src: &mut Bytes) -> Result<(Vec<Label>, usize), Error> {
    let mut labels = Vec::new();
    let mut consumed_bits = 0usize;
    loop {
        if src.remaining() < 3 {
            break;
        }
        let label = Label::from_bytes(src)?;
        consumed_bits += 24;
        labels.push(label);
        if label.bottom_of_stack() || label.is_withdraw_compat() {
            break;
        }
    }
    Ok((labels, consumed_bits))
}

/// Decode one labelled-unicast NLRI entry (RFC 8277 §2.1): a single leading
/// length-in-bits octet, then the label stack, then the remaining prefix bits.
fn decode_labeled_prefix(src: &mut Bytes) -> Result<LabeledPrefix, Error> {
    if src.remaining() < 1 {
        return Err(Error::InternalLength("labelled-unicast NLRI", std::cmp::Ordering::Less));
    }
    let length_bits = usize::from(src.get_u8());
    let total_bytes = length_bits.div_ceil(8);
    if src.remaining() < total_bytes {
        return Err(Error::InternalLength("labelled-unicast NLRI body", std::cmp::Ordering::Less));
    }
    let mut body = src.split_to(total_bytes);
    let (labels, consumed_bits) = decode_label_stack(&mut body)?;
    let prefix_bits = length_bits.saturating_sub(consumed_bits);
    let prefix_len = u8::try_from(prefix_bits).map_err(|_| Error::InternalLength("labelled prefix bits", std::cmp::Ordering::Greater))?;
    let n = n_prefix_octets(prefix_len);
    if body.remaining() < n {
        return Err(Error::InternalLength("labelled prefix octets", std::cmp::Ordering::Less));
    }
    let prefix = body.copy_to_bytes(n);
    Ok(LabeledPrefix { labels, prefix_len, prefix })
}

fn encode_labeled_prefix(value: &LabeledPrefix, dst: &mut BytesMut) -> usize {
    let length_bits = value.labels.len() * 24 + usize::from(value.prefix_len);
    dst.put_u8(u8::try_from(length_bits).expect("labelled-unicast NLRI length overflow"));
    let mut written = 1;
    for label in &value.labels {
        written += label.to_bytes(dst);
    }
    dst.put_slice(&value.prefix);
    written + value.prefix.len()
}

/// A VPN-IP prefix: label stack, route distinguisher, then IP prefix
/// (RFC 4364 §4.3.4).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VpnPrefix {
    pub labels: Vec<Label>,
    pub rd: RouteDistinguisher,
    pub prefix_len: u8,
    pub prefix: Bytes,
}

fn decode_vpn_prefix(src: &mut Bytes) -> Result<VpnPrefix, Error> {
    if src.remaining() < 1 {
        return Err(Error::InternalLength("MPLS-VPN NLRI", std::cmp::Ordering::Less));
    }
    let length_bits = usize::from(src.get_u8());
    let total_bytes = length_bits.div_ceil(8);
    if src.remaining() < total_bytes {
        return Err(Error::InternalLength("MPLS-VPN NLRI body", std::cmp::Ordering::Less));
    }
    let mut body = src.split_to(total_bytes);
    let (labels, label_bits) = decode_label_stack(&mut body)?;
    let rd = RouteDistinguisher::from_bytes(&mut body)?;
    let prefix_bits = length_bits.saturating_sub(label_bits + 64);
    let prefix_len = u8::try_from(prefix_bits).map_err(|_| Error::InternalLength("VPN prefix bits", std::cmp::Ordering::Greater))?;
    let n = n_prefix_octets(prefix_len);
    if body.remaining() < n {
        return Err(Error::InternalLength("VPN prefix octets", std::cmp::Ordering::Less));
    }
    let prefix = body.copy_to_bytes(n);
    Ok(VpnPrefix { labels, rd, prefix_len, prefix })
}

/// Decode a BGP-LS NLRI (RFC 7752 §3.2): 2-byte NLRI-type, 2-byte length,
/// then 1-byte protocol-id + 8-byte identifier + the remaining descriptor
/// TLVs, which this core leaves opaque.
fn decode_bgp_ls(src: &mut Bytes) -> Result<BgpLsNlri, Error> {
    if src.remaining() < 4 {
        return Err(Error::InternalLength("BGP-LS NLRI header", std::cmp::Ordering::Less));
    }
    let nlri_type = src.get_u16();
    let len = usize::from(src.get_u16());
    if src.remaining() < len {
        return Err(Error::InternalLength("BGP-LS NLRI body", std::cmp::Ordering::Less));
    }
    let mut body = src.split_to(len);
    if body.remaining() < 9 {
        return Err(Error::InternalLength("BGP-LS protocol-id/identifier", std::cmp::Ordering::Less));
    }
    let protocol_id = body.get_u8();
    let identifier = body.get_u64();
    let descriptors = body.copy_to_bytes(body.remaining());
    Ok(BgpLsNlri { nlri_type, protocol_id, identifier, descriptors })
}

fn encode_bgp_ls(value: &BgpLsNlri, dst: &mut BytesMut) -> usize {
    let body_len = 9 + value.descriptors.len();
    dst.put_u16(value.nlri_type);
    dst.put_u16(u16::try_from(body_len).expect("BGP-LS NLRI length overflow"));
    dst.put_u8(value.protocol_id);
    dst.put_u64(value.identifier);
    dst.put_slice(&value.descriptors);
    4 + body_len
}

fn encode_vpn_prefix(value: &VpnPrefix, dst: &mut BytesMut) -> usize {
    let length_bits = value.labels.len() * 24 + 64 + usize::from(value.prefix_len);
    dst.put_u8(u8::try_from(length_bits).expect("MPLS-VPN NLRI length overflow"));
    let mut written = 1;
    for label in &value.labels {
        written += label.to_bytes(dst);
    }
    written += value.rd.to_bytes(dst);
    dst.put_slice(&value.prefix);
    written + value.prefix.len()
}

/// A BGP-LS NLRI (RFC 7752 §3.2): a 2-byte NLRI-type, 2-byte length, then
/// the mandatory protocol-id and identifier fields spec.md §3 names
/// explicitly, followed by a TLV descriptor block this core doesn't parse
/// further (LINK_STATE's own sub-TLVs are likewise kept opaque).
#[derive(Clone, Debug, PartialEq)]
pub struct BgpLsNlri {
    pub nlri_type: u16,
    pub protocol_id: u8,
    pub identifier: u64,
    pub descriptors: Bytes,
}

/// One NLRI entry, tagged by the family it was parsed under.
///
/// Families this core doesn't interpret structurally at all (MVPN, MUP)
/// still round-trip via their own self-delimiting header as opaque payloads
/// (spec.md §9 Open Question: byte-exact round-trip where semantics aren't
/// load-bearing for this core) — see [`opaque_header_shape`] for exactly
/// which header/length width each family uses; they are not uniform. BGP-LS
/// gets its own variant instead, since spec.md §3 calls out protocol-id and
/// identifier as structural fields rather than opaque payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Nlri {
    Ipv4Unicast(route::Value),
    Ipv4Multicast(route::Value),
    Ipv6Unicast(route::Value),
    Ipv6Multicast(route::Value),
    Ipv4LabeledUnicast(LabeledPrefix),
    Ipv6LabeledUnicast(LabeledPrefix),
    Ipv4MplsVpn(VpnPrefix),
    Ipv6MplsVpn(VpnPrefix),
    Ipv4Flow(flowspec::FlowSpec),
    Ipv6Flow(flowspec::FlowSpec),
    Ipv4FlowVpn { rd: RouteDistinguisher, flow: flowspec::FlowSpec },
    Evpn(evpn::EvpnNlri),
    Rtc(route::Value),
    BgpLs(BgpLsNlri),
    /// Opaque payload for MVPN and MUP, neither of which this core
    /// interprets semantically. `header` holds the family's raw type
    /// field(s) that precede the length (see [`opaque_header_shape`]); the
    /// length field itself is never stored since it's redundant with
    /// `data.len()` and is regenerated at the width the family mandates.
    Opaque { family: Family, header: Bytes, data: Bytes },
}

/// `(header_len, length_width)` in bytes for one family's opaque NLRI
/// framing. Two distinct shapes exist in the families this core still
/// carries fully opaque (BGP-LS gets its own structured [`BgpLsNlri`]
/// instead), and conflating them corrupts the wire bytes:
///
/// - MUP (draft-ietf-bess-bgp-mup-bgp-spec §3.1): 1-byte architecture-type,
///   2-byte route-type, 1-byte length.
/// - Everything else carried opaque (MVPN, matching EVPN's RFC 7432 §7
///   shape): 1-byte route-type, 1-byte length.
#[must_use]
const fn opaque_header_shape(family: Family) -> (usize, usize) {
    match family {
        Family::IPV4_MUP | Family::IPV6_MUP => (3, 1),
        _ => (1, 1),
    }
}

impl Nlri {
    #[must_use]
    pub const fn family(&self, hint: Family) -> Family {
        // The variant alone cannot always distinguish e.g. Ipv4Unicast from
        // a caller-known family, so callers that track family per-NLRI list
        // (MP_REACH_NLRI, MP_UNREACH_NLRI, the base UPDATE) should prefer
        // the family they decoded under; this is a convenience fallback.
        match self {
            Self::Opaque { family, .. } => *family,
            Self::BgpLs(_) => Family::BGP_LS,
            _ => hint,
        }
    }

    fn decode_one(family: Family, src: &mut Bytes) -> Result<Self, Error> {
        Ok(match family {
            Family::IPV4_UNICAST => {
                let prefix_len = src.get_u8();
                let n = n_prefix_octets(prefix_len);
                let prefix = src.copy_to_bytes(n);
                Self::Ipv4Unicast(route::Value { prefix_len, prefix })
            }
            Family::IPV4_MULTICAST => {
                let prefix_len = src.get_u8();
                let n = n_prefix_octets(prefix_len);
                let prefix = src.copy_to_bytes(n);
                Self::Ipv4Multicast(route::Value { prefix_len, prefix })
            }
            Family::IPV6_UNICAST => {
                let prefix_len = src.get_u8();
                let n = n_prefix_octets(prefix_len);
                let prefix = src.copy_to_bytes(n);
                Self::Ipv6Unicast(route::Value { prefix_len, prefix })
            }
            Family::IPV6_MULTICAST => {
                let prefix_len = src.get_u8();
                let n = n_prefix_octets(prefix_len);
                let prefix = src.copy_to_bytes(n);
                Self::Ipv6Multicast(route::Value { prefix_len, prefix })
            }
            Family::IPV4_LABELED_UNICAST => Self::Ipv4LabeledUnicast(decode_labeled_prefix(src)?),
            Family::IPV6_LABELED_UNICAST => Self::Ipv6LabeledUnicast(decode_labeled_prefix(src)?),
            Family::IPV4_MPLS_VPN => Self::Ipv4MplsVpn(decode_vpn_prefix(src)?),
            Family::IPV6_MPLS_VPN => Self::Ipv6MplsVpn(decode_vpn_prefix(src)?),
            Family::IPV4_FLOW => {
                let len = decode_flow_len(src)?;
                let mut body = src.split_to(len);
                Self::Ipv4Flow(flowspec::FlowSpec::from_bytes(&mut body)?)
            }
            Family::IPV6_FLOW => {
                let len = decode_flow_len(src)?;
                let mut body = src.split_to(len);
                Self::Ipv6Flow(flowspec::FlowSpec::from_bytes(&mut body)?)
            }
            Family::IPV4_FLOW_VPN => {
                let len = decode_flow_len(src)?;
                let mut body = src.split_to(len);
                let rd = RouteDistinguisher::from_bytes(&mut body)?;
                let flow = flowspec::FlowSpec::from_bytes(&mut body)?;
                Self::Ipv4FlowVpn { rd, flow }
            }
            Family::L2VPN_EVPN => Self::Evpn(evpn::EvpnNlri::from_bytes(src)?),
            Family::BGP_LS => Self::BgpLs(decode_bgp_ls(src)?),
            Family::IPV4_RTC => {
                let prefix_len = src.get_u8();
                let n = n_prefix_octets(prefix_len);
                let prefix = src.copy_to_bytes(n);
                Self::Rtc(route::Value { prefix_len, prefix })
            }
            other => {
                let (header_len, length_width) = opaque_header_shape(other);
                if src.remaining() < header_len + length_width {
                    return Err(Error::InternalLength("opaque NLRI header", std::cmp::Ordering::Less));
                }
                let header = src.copy_to_bytes(header_len);
                let len = if length_width == 2 { usize::from(src.get_u16()) } else { usize::from(src.get_u8()) };
                if src.remaining() < len {
                    return Err(Error::InternalLength("opaque NLRI body", std::cmp::Ordering::Less));
                }
                let data = src.copy_to_bytes(len);
                Self::Opaque { family: other, header, data }
            }
        })
    }

    fn encode_one(self, dst: &mut BytesMut) -> usize {
        match self {
            Self::Ipv4Unicast(v) | Self::Ipv4Multicast(v) | Self::Ipv6Unicast(v) | Self::Ipv6Multicast(v) | Self::Rtc(v) => {
                let len = 1 + v.prefix.len();
                dst.put_u8(v.prefix_len);
                dst.put_slice(&v.prefix);
                len
            }
            Self::Ipv4LabeledUnicast(v) | Self::Ipv6LabeledUnicast(v) => encode_labeled_prefix(&v, dst),
            Self::Ipv4MplsVpn(v) | Self::Ipv6MplsVpn(v) => encode_vpn_prefix(&v, dst),
            Self::Ipv4Flow(flow) | Self::Ipv6Flow(flow) => {
                let mut body = BytesMut::new();
                flow.to_bytes(&mut body);
                encode_flow_len(dst, body.len());
                dst.put_slice(&body);
                encoded_flow_header_len(body.len()) + body.len()
            }
            Self::Ipv4FlowVpn { rd, flow } => {
                let mut body = BytesMut::new();
                rd.to_bytes(&mut body);
                flow.to_bytes(&mut body);
                encode_flow_len(dst, body.len());
                dst.put_slice(&body);
                encoded_flow_header_len(body.len()) + body.len()
            }
            Self::Evpn(nlri) => nlri.to_bytes(dst),
            Self::BgpLs(nlri) => encode_bgp_ls(&nlri, dst),
            Self::Opaque { family, header, data } => {
                let (header_len, length_width) = opaque_header_shape(family);
                debug_assert_eq!(header.len(), header_len);
                dst.put_slice(&header);
                if length_width == 2 {
                    dst.put_u16(u16::try_from(data.len()).expect("opaque NLRI length overflow"));
                } else {
                    dst.put_u8(u8::try_from(data.len()).expect("opaque NLRI length overflow"));
                }
                dst.put_slice(&data);
                header_len + length_width + data.len()
            }
        }
    }

    /// Encode just this entry (no ADD-PATH prefix), for callers that need to
    /// key or size NLRI entries individually, e.g. the RIB engine's
    /// byte-budget packer.
    #[must_use]
    pub fn to_wire_bytes(&self) -> Bytes {
        let mut dst = BytesMut::new();
        self.clone().encode_one(&mut dst);
        dst.freeze()
    }

    /// Wire length of just this entry, with no ADD-PATH prefix.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        self.encoded_one_len()
    }

    fn encoded_one_len(&self) -> usize {
        match self {
            Self::Ipv4Unicast(v) | Self::Ipv4Multicast(v) | Self::Ipv6Unicast(v) | Self::Ipv6Multicast(v) | Self::Rtc(v) => 1 + v.prefix.len(),
            Self::Ipv4LabeledUnicast(v) | Self::Ipv6LabeledUnicast(v) => 1 + v.labels.len() * 3 + v.prefix.len(),
            Self::Ipv4MplsVpn(v) | Self::Ipv6MplsVpn(v) => 1 + v.labels.len() * 3 + 8 + v.prefix.len(),
            Self::Ipv4Flow(flow) | Self::Ipv6Flow(flow) => encoded_flow_header_len(flow.encoded_len()) + flow.encoded_len(),
            Self::Ipv4FlowVpn { flow, .. } => {
                let body_len = 8 + flow.encoded_len();
                encoded_flow_header_len(body_len) + body_len
            }
            Self::Evpn(nlri) => nlri.encoded_len(),
            Self::BgpLs(nlri) => 4 + 9 + nlri.descriptors.len(),
            Self::Opaque { family, data, .. } => {
                let (header_len, length_width) = opaque_header_shape(*family);
                header_len + length_width + data.len()
            }
        }
    }
}

/// Flow-spec NLRI length is encoded as one byte if it fits under 240,
/// otherwise two bytes with the high nibble of the first set (RFC 8955 §4.1).
fn decode_flow_len(src: &mut Bytes) -> Result<usize, Error> {
    if src.remaining() < 1 {
        return Err(Error::InternalLength("flow-spec NLRI length", std::cmp::Ordering::Less));
    }
    let first = src.get_u8();
    if first & 0xf0 == 0xf0 {
        if src.remaining() < 1 {
            return Err(Error::InternalLength("flow-spec NLRI length", std::cmp::Ordering::Less));
        }
        let second = src.get_u8();
        Ok((usize::from(first & 0x0f) << 8) | usize::from(second))
    } else {
        Ok(usize::from(first))
    }
}

fn encode_flow_len(dst: &mut BytesMut, len: usize) {
    if len < 240 {
        dst.put_u8(u8::try_from(len).expect("flow-spec NLRI length overflow"));
    } else {
        dst.put_u16(u16::try_from(len).expect("flow-spec NLRI length overflow") | 0xf000);
    }
}

const fn encoded_flow_header_len(len: usize) -> usize {
    if len < 240 {
        1
    } else {
        2
    }
}

/// Decode every NLRI entry in `src` for `family`, honoring the 4-byte
/// ADD-PATH prefix when `add_path` is set (negotiated receive direction).
pub fn decode_list(family: Family, src: &mut Bytes, add_path: bool) -> Result<Vec<(Option<PathId>, Nlri)>, Error> {
    let mut out = Vec::new();
    while src.has_remaining() {
        let path_id = if add_path {
            if src.remaining() < 4 {
                return Err(Error::InternalLength("ADD-PATH id", std::cmp::Ordering::Less));
            }
            Some(PathId(src.get_u32()))
        } else {
            None
        };
        out.push((path_id, Nlri::decode_one(family, src)?));
    }
    Ok(out)
}

/// Encode a sequence of NLRI entries, prefixing each with its ADD-PATH id
/// when one is present.
pub fn encode_list(entries: Vec<(Option<PathId>, Nlri)>, dst: &mut BytesMut) -> usize {
    let mut len = 0;
    for (path_id, nlri) in entries {
        if let Some(PathId(id)) = path_id {
            dst.put_u32(id);
            len += 4;
        }
        len += nlri.encode_one(dst);
    }
    len
}

#[must_use]
pub fn encoded_list_len(entries: &[(Option<PathId>, Nlri)]) -> usize {
    entries.iter().map(encoded_entry_len).sum()
}

/// Wire length of one `(path-id?, NLRI)` entry as it would appear inside an
/// encoded list, including its ADD-PATH prefix if present.
#[must_use]
pub fn encoded_entry_len((path_id, nlri): &(Option<PathId>, Nlri)) -> usize {
    usize::from(path_id.is_some()) * 4 + nlri.wire_len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex_to_bytes;

    #[test]
    fn label_round_trips() {
        let label = Label::new(1000, true);
        let mut dst = BytesMut::new();
        label.to_bytes(&mut dst);
        let mut src = dst.freeze();
        assert_eq!(Label::from_bytes(&mut src).unwrap(), label);
        assert_eq!(label.value(), 1000);
        assert!(label.bottom_of_stack());
    }

    #[test]
    fn ipv4_unicast_list_round_trips() {
        let mut src = hex_to_bytes("18 cb1441 0f 31d0");
        let entries = decode_list(Family::IPV4_UNICAST, &mut src, false).unwrap();
        assert_eq!(entries.len(), 2);
        let mut dst = BytesMut::new();
        encode_list(entries, &mut dst);
        assert_eq!(dst.freeze(), hex_to_bytes("18 cb1441 0f 31d0"));
    }

    #[test]
    fn add_path_prefixes_each_entry() {
        let mut src = hex_to_bytes("00000007 18 cb1441");
        let entries = decode_list(Family::IPV4_UNICAST, &mut src, true).unwrap();
        assert_eq!(entries[0].0, Some(PathId(7)));
    }

    #[test]
    fn bgp_ls_nlri_round_trips_with_protocol_id_and_identifier() {
        // 2-byte NLRI-type (0x0002) + 2-byte length (0x0c, covering
        // protocol-id + identifier + 2-byte descriptor body) + 1-byte
        // protocol-id (0x02 = ISIS level 2) + 8-byte identifier + descriptors.
        let mut src = hex_to_bytes("0002 000c 02 0000000000000001 aabb");
        let entries = decode_list(Family::BGP_LS, &mut src, false).unwrap();
        assert_eq!(entries.len(), 1);
        let Nlri::BgpLs(nlri) = &entries[0].1 else { panic!("expected BgpLs") };
        assert_eq!(nlri.nlri_type, 2);
        assert_eq!(nlri.protocol_id, 2);
        assert_eq!(nlri.identifier, 1);
        assert_eq!(nlri.descriptors.as_ref(), &[0xaa, 0xbb]);
        let mut dst = BytesMut::new();
        encode_list(entries, &mut dst);
        assert_eq!(dst.freeze(), hex_to_bytes("0002 000c 02 0000000000000001 aabb"));
    }

    #[test]
    fn bgp_ls_nlri_over_255_bytes_does_not_truncate() {
        // A 1-byte length field (the EVPN/MVPN shape) would truncate this at
        // 255 bytes; BGP-LS's 2-byte length must carry the full body.
        let mut body = BytesMut::new();
        body.put_u16(0x0002);
        body.put_u16(9 + 300);
        body.put_u8(2);
        body.put_u64(1);
        body.put_slice(&[0x7a; 300]);
        let mut src = body.freeze();
        let entries = decode_list(Family::BGP_LS, &mut src, false).unwrap();
        let Nlri::BgpLs(nlri) = &entries[0].1 else { panic!("expected BgpLs") };
        assert_eq!(nlri.descriptors.len(), 300);
    }

    #[test]
    fn mup_nlri_round_trips_with_architecture_and_route_type_header() {
        // 1-byte architecture-type (0x01) + 2-byte route-type (0x0003) +
        // 1-byte length (0x02) + 2-byte body.
        let mut src = hex_to_bytes("01 0003 02 1234");
        let entries = decode_list(Family::IPV4_MUP, &mut src, false).unwrap();
        assert_eq!(entries.len(), 1);
        let Nlri::Opaque { family, header, data } = &entries[0].1 else { panic!("expected Opaque") };
        assert_eq!(*family, Family::IPV4_MUP);
        assert_eq!(header.as_ref(), &[0x01, 0x00, 0x03]);
        assert_eq!(data.as_ref(), &[0x12, 0x34]);
        let mut dst = BytesMut::new();
        encode_list(entries, &mut dst);
        assert_eq!(dst.freeze(), hex_to_bytes("01 0003 02 1234"));
    }
}
