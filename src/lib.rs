//! A BGP-4 speaker core: wire encoding, capability negotiation, and the
//! Adj-RIB-In/Adj-RIB-Out bookkeeping a session needs, independent of any
//! particular transport or event loop.
//!
//! Grounded on the teacher's `pabgp/lib.rs`: the same `Error`/`Message`/
//! `Open`/`Update`/`Notification` shapes and the same `BGP_VERSION`/
//! `AS_TRANS`/`MARKER` constants, generalized with a fifth message
//! (`RouteRefresh`, RFC 2918), a richer `Error` catalogue for the larger
//! attribute/NLRI surface, and `Update`/`Open` decoding threaded through the
//! session's negotiated [`negotiation::Negotiation`] instead of always
//! assuming IPv4-unicast-only, 2-byte-ASN peers.

pub mod afi;
pub mod capability;
pub mod cidr;
mod endec;
pub mod negotiation;
pub mod nlri;
pub mod path;
pub mod rib;
pub mod route;

#[cfg(feature = "tokio-endec")]
pub use endec::BgpCodec as Codec;
pub use endec::{Component, DEFAULT_MAX_MESSAGE_SIZE, EXTENDED_MAX_MESSAGE_SIZE};

use bytes::{Buf, BufMut};
use capability::{Capabilities, OptionalParameters};
use enum_primitive_derive::Primitive;
use negotiation::Negotiation;
use num_traits::FromPrimitive;
use path::PathAttributes;
use route::Routes;
use std::net::Ipv4Addr;

/// Supported BGP version (RFC 4271 §4.2).
pub const BGP_VERSION: u8 = 4;

/// Reserved ASN signaling "my real ASN doesn't fit in two octets, see the
/// `FourOctetAsNumber` capability" (RFC 6793 §4.1).
pub const AS_TRANS: u16 = 23456;

/// BGP marker: 16 octets, all ones for a session without authentication
/// (RFC 4271 §4.1).
pub const MARKER: [u8; 16] = [0xff; 16];

/// Errors that can occur while decoding or encoding a BGP message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid or missing marker")]
    Marker,
    #[error("invalid message type")]
    MessageType(u8),
    #[error("invalid internal length at {0} ({1:?})")]
    InternalLength(&'static str, std::cmp::Ordering),
    #[error("invalid {0} type of {1}")]
    InternalType(&'static str, u16),
    #[error("requires MP-BGP capability")]
    NoMpBgp,
    #[error("attempting to update NLRI without next hop")]
    NoNextHop,
    #[error("unsupported address family {0}")]
    UnsupportedFamily(afi::Family),
    #[error("attribute flags error for type {0}")]
    AttributeFlags(u8),
    #[error("unrecognized well-known attribute type {0}")]
    UnrecognizedWellKnownAttribute(u8),
}

impl Error {
    /// The NOTIFICATION this error should be reported to the peer as
    /// (RFC 4271 §6), for callers that only learn of a decode failure after
    /// the codec has already returned it (the session layer, reading one
    /// message at a time off the wire).
    #[must_use]
    pub fn notification(&self) -> (NotificationErrorCode, u8) {
        match self {
            Self::Marker => (NotificationErrorCode::MessageHeaderError, MessageHeaderErrorSubcode::ConnectionNotSynchronized as u8),
            Self::MessageType(_) => (NotificationErrorCode::MessageHeaderError, MessageHeaderErrorSubcode::BadMessageType as u8),
            Self::AttributeFlags(_) => (NotificationErrorCode::UpdateMessageError, UpdateMessageErrorSubcode::AttributeFlagsError as u8),
            Self::UnrecognizedWellKnownAttribute(_) => (NotificationErrorCode::UpdateMessageError, UpdateMessageErrorSubcode::UnrecognizedWellKnownAttribute as u8),
            Self::InternalType(_, _) | Self::InternalLength(_, _) => (NotificationErrorCode::UpdateMessageError, UpdateMessageErrorSubcode::MalformedAttributeList as u8),
            Self::NoMpBgp | Self::NoNextHop | Self::UnsupportedFamily(_) => (NotificationErrorCode::UpdateMessageError, UpdateMessageErrorSubcode::OptionalAttributeError as u8),
            Self::Io(_) => (NotificationErrorCode::Cease, 0),
        }
    }
}

/// A decoded BGP message.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Open(Open),
    Update(Update),
    Notification(Notification),
    Keepalive,
    RouteRefresh(RouteRefresh),
}

/// BGP OPEN message (RFC 4271 §4.2).
#[derive(Clone, Debug, PartialEq)]
pub struct Open {
    pub version: u8,
    pub asn: u16,
    pub hold_time: u16,
    pub bgp_id: Ipv4Addr,
    pub opt_params: OptionalParameters,
}

impl Component for Open {
    fn from_bytes(src: &mut bytes::Bytes) -> Result<Self, Error> {
        if src.remaining() < 9 {
            return Err(Error::InternalLength("OPEN header", std::cmp::Ordering::Less));
        }
        let version = src.get_u8();
        let asn = src.get_u16();
        let hold_time = src.get_u16();
        let bgp_id = Ipv4Addr::from(src.get_u32());
        let opt_params_len = usize::from(src.get_u8());
        if src.remaining() < opt_params_len {
            return Err(Error::InternalLength("OPEN optional parameters", std::cmp::Ordering::Less));
        }
        let mut params_buf = src.split_to(opt_params_len);
        let opt_params = OptionalParameters::from_bytes(&mut params_buf)?;
        Ok(Self { version, asn, hold_time, bgp_id, opt_params })
    }

    fn to_bytes(self, dst: &mut bytes::BytesMut) -> usize {
        let mut len = 0;
        len += self.version.to_bytes(dst);
        len += self.asn.to_bytes(dst);
        len += self.hold_time.to_bytes(dst);
        len += self.bgp_id.to_bytes(dst);
        let len_pos = dst.len();
        dst.put_u8(0);
        len += 1;
        let params_len = self.opt_params.to_bytes(dst);
        dst[len_pos] = u8::try_from(params_len).expect("OPEN optional parameters length overflow");
        len + params_len
    }

    fn encoded_len(&self) -> usize {
        1 + 2 + 2 + 4 + 1 + self.opt_params.encoded_len()
    }
}

impl Open {
    /// Build an OPEN advertising `capabilities`, using [`AS_TRANS`] in the
    /// legacy 2-byte ASN field when `asn` doesn't fit (RFC 6793 §4.1); the
    /// real ASN still travels in the `FourOctetAsNumber` capability.
    #[must_use]
    pub fn new(asn: u32, hold_time: u16, bgp_id: Ipv4Addr, capabilities: Capabilities) -> Self {
        let legacy_asn = u16::try_from(asn).unwrap_or(AS_TRANS);
        Self {
            version: BGP_VERSION,
            asn: legacy_asn,
            hold_time,
            bgp_id,
            opt_params: vec![capability::OptionalParameterValue::Capabilities(capabilities)].into(),
        }
    }

    /// This peer's ASN, resolved from the `FourOctetAsNumber` capability when
    /// present and from the legacy 2-byte field otherwise.
    #[must_use]
    pub fn resolved_asn(&self) -> u32 {
        self.opt_params.capabilities().asn4().unwrap_or(u32::from(self.asn))
    }
}

/// BGP UPDATE message (RFC 4271 §4.3).
///
/// `withdrawn_routes` and `nlri` carry only the base (IPv4 unicast)
/// reachability fields; every other family travels inside
/// `MP_REACH_NLRI`/`MP_UNREACH_NLRI` path attributes (RFC 4760).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Update {
    pub withdrawn_routes: Routes,
    pub path_attributes: PathAttributes,
    pub nlri: Routes,
    /// Set when a path attribute's malformed instance carries a
    /// `TreatAsWithdraw` error disposition (RFC 7606 §2). The session layer
    /// should then withdraw every NLRI named in this UPDATE instead of
    /// treating them as reachable, since the attributes that would qualify
    /// their reachability couldn't be trusted.
    pub treat_as_withdraw: bool,
}

impl Update {
    /// Decode using the session's negotiated ADD-PATH state for IPv4
    /// unicast and the ASN4/ADD-PATH state carried through to
    /// [`PathAttributes::from_bytes_with`].
    pub fn from_bytes_with(src: &mut bytes::Bytes, neg: &Negotiation) -> Result<Self, Error> {
        if src.remaining() < 2 {
            return Err(Error::InternalLength("UPDATE header", std::cmp::Ordering::Less));
        }
        let withdrawn_len = usize::from(src.get_u16());
        if src.remaining() < withdrawn_len {
            return Err(Error::InternalLength("withdrawn routes", std::cmp::Ordering::Less));
        }
        let mut wdr_buf = src.split_to(withdrawn_len);
        let withdrawn_routes = Routes::from_bytes(&mut wdr_buf)?;
        if src.remaining() < 2 {
            return Err(Error::InternalLength("UPDATE header", std::cmp::Ordering::Less));
        }
        let tpa_len = usize::from(src.get_u16());
        if src.remaining() < tpa_len {
            return Err(Error::InternalLength("path attributes", std::cmp::Ordering::Less));
        }
        let mut tpa_buf = src.split_to(tpa_len);
        let outcome = PathAttributes::from_bytes_with(&mut tpa_buf, neg)?;
        let nlri = Routes::from_bytes(src)?;
        Ok(Self { withdrawn_routes, path_attributes: outcome.attributes, nlri, treat_as_withdraw: outcome.treat_as_withdraw })
    }
}

impl Component for Update {
    fn from_bytes(src: &mut bytes::Bytes) -> Result<Self, Error> {
        Self::from_bytes_with(src, &Negotiation::default())
    }

    fn to_bytes(self, dst: &mut bytes::BytesMut) -> usize {
        let mut len = 0;
        let wdr_len_pos = dst.len();
        dst.put_u16(0);
        len += 2;
        let wdr_len = self.withdrawn_routes.to_bytes(dst);
        len += wdr_len;
        dst[wdr_len_pos..wdr_len_pos + 2]
            .copy_from_slice(&(u16::try_from(wdr_len).expect("withdrawn routes length overflow").to_be_bytes()));
        let tpa_len_pos = dst.len();
        dst.put_u16(0);
        len += 2;
        let tpa_len = self.path_attributes.to_bytes(dst);
        len += tpa_len;
        dst[tpa_len_pos..tpa_len_pos + 2]
            .copy_from_slice(&(u16::try_from(tpa_len).expect("path attributes length overflow").to_be_bytes()));
        len += self.nlri.to_bytes(dst);
        len
    }

    fn encoded_len(&self) -> usize {
        2 + self.withdrawn_routes.encoded_len() + 2 + self.path_attributes.encoded_len() + self.nlri.encoded_len()
    }
}

/// BGP NOTIFICATION message (RFC 4271 §4.5).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub error_code: NotificationErrorCode,
    pub error_subcode: u8,
    pub data: bytes::Bytes,
}

impl Component for Notification {
    fn from_bytes(src: &mut bytes::Bytes) -> Result<Self, Error> {
        if src.remaining() < 2 {
            return Err(Error::InternalLength("NOTIFICATION header", std::cmp::Ordering::Less));
        }
        let error_code = src.get_u8();
        let error_subcode = src.get_u8();
        let data = src.copy_to_bytes(src.remaining());
        Ok(Self {
            error_code: NotificationErrorCode::from_u8(error_code).ok_or(Error::InternalType("notification error code", u16::from(error_code)))?,
            error_subcode,
            data,
        })
    }

    fn to_bytes(self, dst: &mut bytes::BytesMut) -> usize {
        (self.error_code as u8).to_bytes(dst);
        self.error_subcode.to_bytes(dst);
        dst.put_slice(&self.data);
        self.encoded_len()
    }

    fn encoded_len(&self) -> usize {
        2 + self.data.len()
    }
}

impl Notification {
    #[must_use]
    pub const fn new(error_code: NotificationErrorCode, error_subcode: u8, data: bytes::Bytes) -> Self {
        Self { error_code, error_subcode, data }
    }
}

/// BGP ROUTE-REFRESH message (RFC 2918 §3).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RouteRefresh {
    pub afi: afi::Afi,
    pub safi: afi::Safi,
    /// Enhanced route refresh's Begin/End-of-RR markers (RFC 7313 §4); plain
    /// RFC 2918 refresh always carries `Normal`.
    pub subtype: RouteRefreshSubtype,
}

/// Enhanced route refresh subtype (RFC 7313 §4); the reserved octet in a
/// plain RFC 2918 message is always zero, decoded as `Normal` here too.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum RouteRefreshSubtype {
    Normal = 0,
    BeginOfRouteRefresh = 1,
    EndOfRouteRefresh = 2,
}

impl Component for RouteRefresh {
    fn from_bytes(src: &mut bytes::Bytes) -> Result<Self, Error> {
        if src.remaining() != 4 {
            return Err(Error::InternalLength("ROUTE-REFRESH", std::cmp::Ordering::Equal));
        }
        let afi_num = src.get_u16();
        let subtype = src.get_u8();
        let safi_num = src.get_u8();
        let afi = afi::Afi::from_u16(afi_num).ok_or(Error::InternalType("route-refresh afi", afi_num))?;
        let safi = afi::Safi::from_u8(safi_num).ok_or(Error::InternalType("route-refresh safi", u16::from(safi_num)))?;
        let subtype = RouteRefreshSubtype::from_u8(subtype).ok_or(Error::InternalType("route-refresh subtype", u16::from(subtype)))?;
        Ok(Self { afi, safi, subtype })
    }

    fn to_bytes(self, dst: &mut bytes::BytesMut) -> usize {
        dst.put_u16(self.afi as u16);
        dst.put_u8(self.subtype as u8);
        dst.put_u8(u8::try_from(self.safi as u16).expect("route-refresh safi out of range"));
        4
    }

    fn encoded_len(&self) -> usize {
        4
    }
}

/// NOTIFICATION error codes (RFC 4271 §4.5, RFC 4486 for Cease).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum NotificationErrorCode {
    MessageHeaderError = 1,
    OpenMessageError = 2,
    UpdateMessageError = 3,
    HoldTimerExpired = 4,
    FiniteStateMachineError = 5,
    Cease = 6,
    RouteRefreshMessageError = 7,
}

/// Error subcodes for `MessageHeaderError` (RFC 4271 §6.1).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum MessageHeaderErrorSubcode {
    ConnectionNotSynchronized = 1,
    BadMessageLength = 2,
    BadMessageType = 3,
}

/// Error subcodes for `OpenMessageError` (RFC 4271 §6.2).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum OpenMessageErrorSubcode {
    UnsupportedVersionNumber = 1,
    BadPeerAs = 2,
    BadBgpIdentifier = 3,
    UnsupportedOptionalParameter = 4,
    UnacceptableHoldTime = 6,
    UnsupportedCapability = 7,
}

/// Error subcodes for `UpdateMessageError` (RFC 4271 §6.3, RFC 7606 revises
/// the handling but keeps these subcodes).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum UpdateMessageErrorSubcode {
    MalformedAttributeList = 1,
    UnrecognizedWellKnownAttribute = 2,
    MissingWellKnownAttribute = 3,
    AttributeFlagsError = 4,
    AttributeLengthError = 5,
    InvalidOriginAttribute = 6,
    AsRoutingLoop = 7,
    InvalidNextHopAttribute = 8,
    OptionalAttributeError = 9,
    InvalidNetworkField = 10,
    MalformedAsPath = 11,
}

/// Error subcodes for Cease (RFC 4486).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum CeaseSubcode {
    MaximumNumberOfPrefixesReached = 1,
    AdministrativeShutdown = 2,
    PeerDeconfigured = 3,
    AdministrativeReset = 4,
    ConnectionRejected = 5,
    OtherConfigurationChange = 6,
    ConnectionCollisionResolution = 7,
    OutOfResources = 8,
}

#[cfg(test)]
const fn convert_one_hex_digit(c: u8) -> u8 {
    if c.is_ascii_digit() {
        c - b'0'
    } else if c.is_ascii_lowercase() {
        c - b'a' + 10
    } else if c.is_ascii_uppercase() {
        c - b'A' + 10
    } else {
        panic!("invalid hex character");
    }
}

/// Parse a hex dump (whitespace and `:`/`.` separators ignored) into `Bytes`,
/// for writing wire-format test fixtures without a binary blob in the source.
#[cfg(test)]
#[must_use]
pub fn hex_to_bytes(hex: &str) -> bytes::Bytes {
    const SKIP: &[u8] = b" \t\n\r:.";
    let hex = hex.as_bytes();
    let mut octets = bytes::BytesMut::with_capacity(hex.len() / 2);
    let mut i = 0;
    while i < hex.len() {
        let c = hex[i];
        if SKIP.contains(&c) {
            i += 1;
            continue;
        }
        let hi = convert_one_hex_digit(c) << 4;
        assert!(i + 1 < hex.len(), "odd number of hex digits");
        let lo = convert_one_hex_digit(hex[i + 1]);
        octets.put_u8(hi | lo);
        i += 2;
    }
    octets.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_round_trips_with_capabilities() {
        let caps = capability::CapabilitiesBuilder::new()
            .multi_protocol(afi::Afi::Ipv4, afi::Safi::Unicast)
            .four_octet_as_number(4_200_000_000)
            .build();
        let open = Open::new(4_200_000_000, 180, Ipv4Addr::new(192, 0, 2, 1), caps);
        let mut dst = bytes::BytesMut::new();
        let written = open.clone().to_bytes(&mut dst);
        assert_eq!(written, dst.len());
        let mut src = dst.freeze();
        let decoded = Open::from_bytes(&mut src).unwrap();
        assert_eq!(decoded, open);
        assert_eq!(decoded.resolved_asn(), 4_200_000_000);
        assert_eq!(decoded.asn, AS_TRANS);
    }

    #[test]
    fn keepalive_and_notification_round_trip() {
        let note = Notification::new(NotificationErrorCode::Cease, CeaseSubcode::AdministrativeShutdown as u8, bytes::Bytes::new());
        let mut dst = bytes::BytesMut::new();
        note.clone().to_bytes(&mut dst);
        let mut src = dst.freeze();
        assert_eq!(Notification::from_bytes(&mut src).unwrap(), note);
    }

    #[test]
    fn route_refresh_round_trips() {
        let rr = RouteRefresh { afi: afi::Afi::Ipv4, safi: afi::Safi::Unicast, subtype: RouteRefreshSubtype::Normal };
        let mut dst = bytes::BytesMut::new();
        rr.to_bytes(&mut dst);
        let mut src = dst.freeze();
        assert_eq!(RouteRefresh::from_bytes(&mut src).unwrap(), rr);
    }

    #[test]
    fn update_threads_negotiation_into_as_path() {
        let mut src = hex_to_bytes("0000 0007 40 0204 0201 fd7d 00");
        let neg = Negotiation::default();
        let update = Update::from_bytes_with(&mut src, &neg).unwrap();
        assert_eq!(update.path_attributes.len(), 1);
    }
}
