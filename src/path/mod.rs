//! BGP path attributes (RFC 4271 §4.3 and extensions)
//!
//! Grounded on the teacher's `pabgp/path.rs`: the same `PathAttributes` /
//! `Value` / `Flags` / `Type` / `Data` shape and the same
//! `Origin`/`AsPath`/`AsSegment`/`Aggregator`/`MpReachNlri`/`MpUnreachNlri`
//! structures, generalized in three ways the teacher never needed:
//!
//! - `MpReachNlri`/`MpUnreachNlri` carry a generalized [`crate::nlri::Nlri`]
//!   list instead of the teacher's IPv4/IPv6-only [`crate::route::Routes`].
//! - AS_PATH and AGGREGATOR decoding needs the session's negotiated ASN4
//!   state, not just a length heuristic (the teacher's per-segment
//!   `remaining_len / len` guess only works when a single segment fills the
//!   rest of the buffer); [`PathAttributes::from_bytes_with`] threads a
//!   [`crate::negotiation::Negotiation`] through explicitly instead.
//! - The attribute catalogue is rounded out with COMMUNITIES,
//!   EXTENDED_COMMUNITIES, LARGE_COMMUNITIES, ORIGINATOR_ID, CLUSTER_LIST,
//!   AS4_AGGREGATOR, AIGP, PMSI_TUNNEL, BGP_PREFIX_SID and the BGP-LS
//!   attribute, each implementing `Component` in the teacher's idiom.

pub mod communities;

use crate::endec::Component;
use crate::negotiation::Negotiation;
use crate::nlri::{self, Nlri, PathId};
use crate::afi::{Afi, Family, Safi};
use crate::Error;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use communities::{Communities, ExtendedCommunities, LargeCommunities};
use enum_primitive_derive::Primitive;
use num_traits::FromPrimitive;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::Deref;

/// BGP path attributes, in wire order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathAttributes(pub Vec<Value>);

impl PathAttributes {
    /// Decode using the session's negotiated ASN4/ADD-PATH state, applying
    /// each attribute type's RFC 7606 error disposition ([`error_policy`])
    /// to a malformed instance instead of failing the whole UPDATE:
    /// `AttributeDiscard` drops just that attribute, `TreatAsWithdraw` is
    /// reported back via [`DecodeOutcome::treat_as_withdraw`], and
    /// `SessionReset` — along with any attribute-flags mismatch, which is
    /// always session-reset regardless of the type's usual policy —
    /// propagates the error. [`Component::from_bytes`] below falls back to a
    /// conservative default (`asn4 = false`, no policy) for context-free
    /// callers such as unit tests.
    pub fn from_bytes_with(src: &mut Bytes, neg: &Negotiation) -> Result<DecodeOutcome, Error> {
        let mut attributes = Vec::new();
        let mut treat_as_withdraw = false;
        while src.has_remaining() {
            let (flags, type_, mut body) = Value::decode_header(src)?;
            validate_flags(type_, flags)?;
            match Value::decode_body(type_, &mut body, neg) {
                Ok(data) => attributes.push(Value { flags, data }),
                Err(err) => match error_policy(type_, flags) {
                    ErrorPolicy::SessionReset => return Err(err),
                    ErrorPolicy::AttributeDiscard => {}
                    ErrorPolicy::TreatAsWithdraw => treat_as_withdraw = true,
                },
            }
        }
        Ok(DecodeOutcome { attributes: Self(attributes), treat_as_withdraw })
    }
}

/// Result of [`PathAttributes::from_bytes_with`]: the attributes that parsed
/// cleanly or survived an `AttributeDiscard` disposition, plus whether any
/// attribute's malformed instance carries a `TreatAsWithdraw` disposition
/// (RFC 7606 §2).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodeOutcome {
    pub attributes: PathAttributes,
    pub treat_as_withdraw: bool,
}

impl Component for PathAttributes {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self::from_bytes_with(src, &Negotiation::default())?.attributes)
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        let mut len = 0;
        for attribute in self.0 {
            len += attribute.to_bytes(dst);
        }
        len
    }

    fn encoded_len(&self) -> usize {
        self.0.iter().map(Value::encoded_len).sum()
    }
}

impl Deref for PathAttributes {
    type Target = Vec<Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// One path attribute: flags, type, and data.
#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    pub flags: Flags,
    pub data: Data,
}

impl Value {
    /// Parse the flags/type/length header and split out the attribute's
    /// body, without validating flags or decoding the body — the two steps
    /// [`PathAttributes::from_bytes_with`] needs to apply `error_policy`
    /// between.
    fn decode_header(src: &mut Bytes) -> Result<(Flags, u8, Bytes), Error> {
        if src.remaining() < 2 {
            return Err(Error::InternalLength("path attribute header", std::cmp::Ordering::Less));
        }
        let flags = Flags(src.get_u8());
        let type_ = src.get_u8();
        let len = if flags.is_extended_length() { src.get_u16() as usize } else { src.get_u8() as usize };
        if src.remaining() < len {
            return Err(Error::InternalLength("path attribute body", std::cmp::Ordering::Less));
        }
        let body = src.split_to(len);
        Ok((flags, type_, body))
    }

    fn decode_body(type_: u8, body: &mut Bytes, neg: &Negotiation) -> Result<Data, Error> {
        Ok(match Type::from_u8(type_) {
            Some(Type::Origin) => Data::Origin(Origin::from_bytes(body)?),
            Some(Type::AsPath) => Data::AsPath(AsPath::decode_with(body, neg.asn4())?),
            Some(Type::NextHop) => Data::NextHop(Ipv4Addr::from_bytes(body)?),
            Some(Type::MultiExitDisc) => Data::MultiExitDisc(body.get_u32()),
            Some(Type::LocalPref) => Data::LocalPref(body.get_u32()),
            Some(Type::AtomicAggregate) => Data::AtomicAggregate,
            Some(Type::Aggregator) => Data::Aggregator(Aggregator::decode_with(body, neg.asn4())?),
            Some(Type::Communities) => Data::Communities(Communities::from_bytes(body)?),
            Some(Type::OriginatorId) => Data::OriginatorId(Ipv4Addr::from_bytes(body)?),
            Some(Type::ClusterList) => Data::ClusterList(decode_cluster_list(body)?),
            Some(Type::MpReachNlri) => Data::MpReachNlri(MpReachNlri::decode_with(body, neg)?),
            Some(Type::MpUnreachNlri) => Data::MpUnreachNlri(MpUnreachNlri::decode_with(body, neg)?),
            Some(Type::ExtendedCommunities) => Data::ExtendedCommunities(ExtendedCommunities::from_bytes(body)?),
            Some(Type::As4Path) => Data::As4Path(AsPath::decode_with(body, true)?),
            Some(Type::As4Aggregator) => Data::As4Aggregator(Aggregator::decode_with(body, true)?),
            Some(Type::PmsiTunnel) => Data::PmsiTunnel(body.copy_to_bytes(body.remaining())),
            Some(Type::LargeCommunities) => Data::LargeCommunities(LargeCommunities::from_bytes(body)?),
            Some(Type::BgpPrefixSid) => Data::BgpPrefixSid(body.copy_to_bytes(body.remaining())),
            Some(Type::Aigp) => Data::Aigp(decode_aigp(body)?),
            Some(Type::LinkState) => Data::LinkState(body.copy_to_bytes(body.remaining())),
            None => Data::Unsupported(type_, body.copy_to_bytes(body.remaining())),
        })
    }

    /// Decode one attribute with no error disposition applied: a malformed
    /// body always fails the call. Used by [`Component::from_bytes`] and by
    /// callers that want a single attribute in isolation.
    fn from_bytes_with(src: &mut Bytes, neg: &Negotiation) -> Result<Self, Error> {
        let (flags, type_, mut body) = Self::decode_header(src)?;
        validate_flags(type_, flags)?;
        let data = Self::decode_body(type_, &mut body, neg)?;
        Ok(Self { flags, data })
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        let mut len = 0;
        dst.put_u8(self.flags.0);
        len += 1;
        dst.put_u8(u8::from(&self.data));
        len += 1;
        let len_pos = dst.len();
        let two_byte_len = if self.flags.is_extended_length() {
            dst.put_u16(0);
            len += 2;
            true
        } else {
            dst.put_u8(0);
            len += 1;
            false
        };
        let data_len = match self.data {
            Data::Origin(v) => v.to_bytes(dst),
            Data::AsPath(v) | Data::As4Path(v) => v.to_bytes(dst),
            Data::NextHop(v) => v.to_bytes(dst),
            Data::MultiExitDisc(v) | Data::LocalPref(v) => v.to_bytes(dst),
            Data::AtomicAggregate => 0,
            Data::Aggregator(v) | Data::As4Aggregator(v) => v.to_bytes(dst),
            Data::Communities(v) => v.to_bytes(dst),
            Data::OriginatorId(v) => v.to_bytes(dst),
            Data::ClusterList(v) => encode_cluster_list(&v, dst),
            Data::MpReachNlri(v) => v.to_bytes(dst),
            Data::MpUnreachNlri(v) => v.to_bytes(dst),
            Data::ExtendedCommunities(v) => v.to_bytes(dst),
            Data::PmsiTunnel(data) => {
                let len = data.len();
                dst.put_slice(&data);
                len
            }
            Data::LargeCommunities(v) => v.to_bytes(dst),
            Data::BgpPrefixSid(data) => {
                let len = data.len();
                dst.put_slice(&data);
                len
            }
            Data::Aigp(value) => encode_aigp(value, dst),
            Data::LinkState(data) => {
                let len = data.len();
                dst.put_slice(&data);
                len
            }
            Data::Unsupported(_, data) => {
                let len = data.len();
                dst.put_slice(&data);
                len
            }
        };
        if two_byte_len {
            dst[len_pos..len_pos + 2].copy_from_slice(&(u16::try_from(data_len).expect("path attribute length overflow").to_be_bytes()));
        } else {
            dst[len_pos] = u8::try_from(data_len).expect("path attribute length overflow");
        }
        len + data_len
    }

    fn encoded_len(&self) -> usize {
        1 + 1
            + if self.flags.is_extended_length() { 2 } else { 1 }
            + match &self.data {
                Data::Origin(v) => v.encoded_len(),
                Data::AsPath(v) | Data::As4Path(v) => v.encoded_len(),
                Data::NextHop(v) => v.encoded_len(),
                Data::MultiExitDisc(_) | Data::LocalPref(_) => 4,
                Data::AtomicAggregate => 0,
                Data::Aggregator(v) | Data::As4Aggregator(v) => v.encoded_len(),
                Data::Communities(v) => v.encoded_len(),
                Data::OriginatorId(v) => v.encoded_len(),
                Data::ClusterList(v) => v.len() * 4,
                Data::MpReachNlri(v) => v.encoded_len(),
                Data::MpUnreachNlri(v) => v.encoded_len(),
                Data::ExtendedCommunities(v) => v.encoded_len(),
                Data::PmsiTunnel(data) | Data::BgpPrefixSid(data) | Data::LinkState(data) => data.len(),
                Data::LargeCommunities(v) => v.encoded_len(),
                Data::Aigp(_) => 11,
                Data::Unsupported(_, data) => data.len(),
            }
    }
}

impl Component for Value {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        Self::from_bytes_with(src, &Negotiation::default())
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        Self::to_bytes(self, dst)
    }

    fn encoded_len(&self) -> usize {
        Self::encoded_len(self)
    }
}

fn decode_cluster_list(src: &mut Bytes) -> Result<Vec<Ipv4Addr>, Error> {
    let mut out = Vec::new();
    while src.has_remaining() {
        out.push(Ipv4Addr::from_bytes(src)?);
    }
    Ok(out)
}

fn encode_cluster_list(list: &[Ipv4Addr], dst: &mut BytesMut) -> usize {
    for addr in list {
        dst.put_u32((*addr).into());
    }
    list.len() * 4
}

/// AIGP TLV (RFC 7311 §3): one sub-TLV, type 1, an 8-byte accumulated metric.
fn decode_aigp(src: &mut Bytes) -> Result<u64, Error> {
    if src.remaining() < 11 {
        return Err(Error::InternalLength("AIGP", std::cmp::Ordering::Less));
    }
    let _type = src.get_u8();
    let _len = src.get_u16();
    Ok(src.get_u64())
}

fn encode_aigp(value: u64, dst: &mut BytesMut) -> usize {
    dst.put_u8(1);
    dst.put_u16(11);
    dst.put_u64(value);
    11
}

/// BGP path attribute flags (RFC 4271 §4.3).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Flags(pub u8);

impl Flags {
    pub const WELL_KNOWN_COMPLETE: Self = Self(0b0100_0000);
    pub const OPTIONAL_TRANSITIVE_EXTENDED: Self = Self(0b1001_0000);
    pub const OPTIONAL_NON_TRANSITIVE: Self = Self(0b1000_0000);

    #[must_use]
    pub const fn is_optional(self) -> bool {
        self.0 & 0x80 != 0
    }

    #[must_use]
    pub const fn is_transitive(self) -> bool {
        self.0 & 0x40 != 0
    }

    #[must_use]
    pub const fn is_partial(self) -> bool {
        self.0 & 0x20 != 0
    }

    #[must_use]
    pub const fn is_extended_length(self) -> bool {
        self.0 & 0x10 != 0
    }
}

/// BGP path attribute data.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Data {
    Origin(Origin),
    AsPath(AsPath),
    NextHop(Ipv4Addr),
    MultiExitDisc(u32),
    LocalPref(u32),
    AtomicAggregate,
    Aggregator(Aggregator),
    Communities(Communities),
    OriginatorId(Ipv4Addr),
    ClusterList(Vec<Ipv4Addr>),
    MpReachNlri(MpReachNlri),
    MpUnreachNlri(MpUnreachNlri),
    ExtendedCommunities(ExtendedCommunities),
    As4Path(AsPath),
    As4Aggregator(Aggregator),
    PmsiTunnel(Bytes),
    LargeCommunities(LargeCommunities),
    BgpPrefixSid(Bytes),
    Aigp(u64),
    LinkState(Bytes),
    Unsupported(u8, Bytes),
}

/// IANA path attribute type codes (RFC 4271 §4.3 and extensions).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum Type {
    Origin = 1,
    AsPath = 2,
    NextHop = 3,
    MultiExitDisc = 4,
    LocalPref = 5,
    AtomicAggregate = 6,
    Aggregator = 7,
    Communities = 8,
    OriginatorId = 9,
    ClusterList = 10,
    MpReachNlri = 14,
    MpUnreachNlri = 15,
    ExtendedCommunities = 16,
    As4Path = 17,
    As4Aggregator = 18,
    PmsiTunnel = 22,
    LinkState = 29,
    LargeCommunities = 32,
    BgpPrefixSid = 40,
    Aigp = 26,
}

impl From<&Data> for u8 {
    fn from(data: &Data) -> Self {
        match data {
            Data::Origin(_) => Type::Origin as Self,
            Data::AsPath(_) => Type::AsPath as Self,
            Data::NextHop(_) => Type::NextHop as Self,
            Data::MultiExitDisc(_) => Type::MultiExitDisc as Self,
            Data::LocalPref(_) => Type::LocalPref as Self,
            Data::AtomicAggregate => Type::AtomicAggregate as Self,
            Data::Aggregator(_) => Type::Aggregator as Self,
            Data::Communities(_) => Type::Communities as Self,
            Data::OriginatorId(_) => Type::OriginatorId as Self,
            Data::ClusterList(_) => Type::ClusterList as Self,
            Data::MpReachNlri(_) => Type::MpReachNlri as Self,
            Data::MpUnreachNlri(_) => Type::MpUnreachNlri as Self,
            Data::ExtendedCommunities(_) => Type::ExtendedCommunities as Self,
            Data::As4Path(_) => Type::As4Path as Self,
            Data::As4Aggregator(_) => Type::As4Aggregator as Self,
            Data::PmsiTunnel(_) => Type::PmsiTunnel as Self,
            Data::LargeCommunities(_) => Type::LargeCommunities as Self,
            Data::BgpPrefixSid(_) => Type::BgpPrefixSid as Self,
            Data::Aigp(_) => Type::Aigp as Self,
            Data::LinkState(_) => Type::LinkState as Self,
            Data::Unsupported(type_, _) => *type_,
        }
    }
}

/// How a malformed instance of an attribute should be handled (RFC 7606).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Send NOTIFICATION and tear down the session.
    SessionReset,
    /// Remove the offending attribute, otherwise process the UPDATE.
    AttributeDiscard,
    /// Treat the whole NLRI set in this UPDATE as withdrawn.
    TreatAsWithdraw,
}

/// Look up the error-handling disposition for a path attribute type, given
/// the flags it was sent with. An unrecognized type (spec.md §3: "unknown
/// attributes") is either optional (pass through opaque, [`AttributeDiscard`]
/// covers the "discard on failure" case here since there is no body grammar
/// to fail) or — with the Optional bit clear — a well-known attribute this
/// core doesn't implement, which RFC 4271 §6.3 always treats as fatal
/// regardless of transitivity.
///
/// [`AttributeDiscard`]: ErrorPolicy::AttributeDiscard
#[must_use]
pub fn error_policy(type_: u8, flags: Flags) -> ErrorPolicy {
    match Type::from_u8(type_) {
        Some(Type::Origin | Type::AsPath | Type::NextHop) => ErrorPolicy::SessionReset,
        Some(Type::MpReachNlri | Type::MpUnreachNlri) => ErrorPolicy::TreatAsWithdraw,
        Some(
            Type::MultiExitDisc
            | Type::LocalPref
            | Type::AtomicAggregate
            | Type::Aggregator
            | Type::Communities
            | Type::OriginatorId
            | Type::ClusterList
            | Type::ExtendedCommunities
            | Type::As4Path
            | Type::As4Aggregator
            | Type::PmsiTunnel
            | Type::LargeCommunities
            | Type::BgpPrefixSid
            | Type::Aigp
            | Type::LinkState,
        ) => ErrorPolicy::AttributeDiscard,
        None if flags.is_optional() => ErrorPolicy::AttributeDiscard,
        None => ErrorPolicy::SessionReset,
    }
}

/// Check a decoded attribute's flags against the exact mask RFC 4271 §4.3
/// and its extensions mandate for its type (spec.md §4.1). A mismatch is
/// always session-reset (RFC 4271 §6.3's Attribute Flags Error), independent
/// of the type's usual [`error_policy`] disposition for a malformed body.
///
/// An unrecognized type carries no flag mandate, but spec.md §3's "well-known
/// unknown triggers NOTIFY" still applies: the Optional bit clear on a type
/// this core doesn't know means the sender is claiming it's well-known
/// mandatory, which RFC 4271 §6.3's Unrecognized Well-known Attribute error
/// covers directly — checked here, before [`Value::decode_body`] ever runs,
/// since that function never fails on an unrecognized type (it round-trips
/// it as [`Data::Unsupported`] instead).
fn validate_flags(type_: u8, flags: Flags) -> Result<(), Error> {
    let Some(known) = Type::from_u8(type_) else {
        if !flags.is_optional() {
            return Err(Error::UnrecognizedWellKnownAttribute(type_));
        }
        return Ok(());
    };
    let (optional, transitive) = mandated_flags(known);
    if flags.is_optional() != optional || flags.is_transitive() != transitive {
        return Err(Error::AttributeFlags(type_));
    }
    Ok(())
}

/// `(optional, transitive)` as RFC 4271/4360/4456/4760/6793/7311/7606/8092
/// assign each attribute type; the partial bit is never mandated (it is the
/// advertiser's business, set whenever a transitive optional attribute
/// passed through a router that didn't recognize it).
const fn mandated_flags(type_: Type) -> (bool, bool) {
    match type_ {
        Type::Origin | Type::AsPath | Type::NextHop | Type::LocalPref | Type::AtomicAggregate => (false, true),
        Type::MultiExitDisc | Type::OriginatorId | Type::ClusterList | Type::MpReachNlri | Type::MpUnreachNlri | Type::Aigp | Type::LinkState => (true, false),
        Type::Aggregator
        | Type::Communities
        | Type::ExtendedCommunities
        | Type::As4Path
        | Type::As4Aggregator
        | Type::PmsiTunnel
        | Type::LargeCommunities
        | Type::BgpPrefixSid => (true, true),
    }
}

/// BGP origin (RFC 4271 §5.1.1).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum Origin {
    Igp = 0,
    Egp = 1,
    Incomplete = 2,
}

impl Component for Origin {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        let value = src.get_u8();
        Self::from_u8(value).ok_or(Error::InternalType("origin", u16::from(value)))
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        dst.put_u8(self as u8);
        1
    }

    fn encoded_len(&self) -> usize {
        1
    }
}

/// AS_PATH (RFC 4271 §5.1.2, RFC 6793 for 4-byte ASNs).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AsPath(pub Vec<AsSegment>);

impl AsPath {
    fn decode_with(src: &mut Bytes, as4: bool) -> Result<Self, Error> {
        let mut segments = Vec::new();
        while src.has_remaining() {
            segments.push(AsSegment::decode_with(src, as4)?);
        }
        Ok(Self(segments))
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        let mut len = 0;
        for segment in self.0 {
            len += segment.to_bytes(dst);
        }
        len
    }

    fn encoded_len(&self) -> usize {
        self.0.iter().map(AsSegment::encoded_len).sum()
    }

    /// All ASNs across every segment, in wire order, ignoring segment
    /// boundaries — the common case callers want when checking AS loops.
    pub fn asns(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().flat_map(|s| s.asns.iter().copied())
    }

    /// Merge a 2-byte AS_PATH carrying `AS_TRANS` placeholders against the
    /// AS4_PATH sent alongside it on a non-ASN4 session (RFC 6793 §4.2.3):
    /// right-align AS4_PATH's segments against AS_PATH's and substitute
    /// AS4_PATH's ASNs for the tail of each AS_PATH segment they cover.
    ///
    /// Per-segment mismatches (different segment types, or AS4_PATH longer
    /// than the AS_PATH segment it aligns with) make the merge ill-defined;
    /// per §9's resolution of that open question, such a segment is left as
    /// plain AS_PATH rather than guessed at.
    #[must_use]
    pub fn reconcile_as4(&self, as4_path: &Self) -> Self {
        let as4_total: usize = as4_path.0.iter().map(|s| s.asns.len()).sum();
        let as_total: usize = self.0.iter().map(|s| s.asns.len()).sum();
        if as4_total > as_total {
            return self.clone();
        }
        let mut skip = as_total - as4_total;
        let mut as4_segments = as4_path.0.iter();
        let mut current_as4: Option<&AsSegment> = None;
        let mut as4_cursor = 0usize;

        let mut merged = Vec::with_capacity(self.0.len());
        for segment in &self.0 {
            if skip >= segment.asns.len() {
                skip -= segment.asns.len();
                merged.push(segment.clone());
                continue;
            }
            let covered = segment.asns.len() - skip;
            let mut asns = segment.asns[..skip].to_vec();
            let mut replaced = Vec::with_capacity(covered);
            while replaced.len() < covered {
                if current_as4.is_none() {
                    current_as4 = as4_segments.next();
                    as4_cursor = 0;
                }
                let Some(seg4) = current_as4 else {
                    return self.clone();
                };
                if seg4.type_ != segment.type_ {
                    return self.clone();
                }
                replaced.push(seg4.asns[as4_cursor]);
                as4_cursor += 1;
                if as4_cursor == seg4.asns.len() {
                    current_as4 = None;
                }
            }
            asns.extend(replaced);
            merged.push(AsSegment { type_: segment.type_, asns, as4: true });
            skip = 0;
        }
        Self(merged)
    }
}

/// Reconciles AS_PATH/AS4_PATH and AGGREGATOR/AS4_AGGREGATOR on an ingress
/// UPDATE from a non-ASN4 session (RFC 6793 §4.2.3): the merged AS_PATH
/// replaces the plain one and the AS4_PATH/AS4_AGGREGATOR attributes are
/// dropped, so downstream code (the RIB, the API channel) only ever sees
/// one AS_PATH per route. A no-op on ASN4 sessions, which never carry
/// AS4_PATH/AS4_AGGREGATOR at all.
pub fn reconcile_asn4(attrs: &mut PathAttributes) {
    let as4_path = attrs.0.iter().find_map(|v| match &v.data {
        Data::As4Path(p) => Some(p.clone()),
        _ => None,
    });
    let as4_aggregator = attrs.0.iter().find_map(|v| match &v.data {
        Data::As4Aggregator(a) => Some(*a),
        _ => None,
    });
    if let Some(as4_path) = as4_path {
        for value in &mut attrs.0 {
            if let Data::AsPath(as_path) = &value.data {
                value.data = Data::AsPath(as_path.reconcile_as4(&as4_path));
                break;
            }
        }
    }
    if let Some(as4_aggregator) = as4_aggregator {
        for value in &mut attrs.0 {
            if let Data::Aggregator(_) = &value.data {
                value.data = Data::Aggregator(as4_aggregator);
                break;
            }
        }
    }
    attrs.0.retain(|v| !matches!(v.data, Data::As4Path(_) | Data::As4Aggregator(_)));
}

impl Deref for AsPath {
    type Target = Vec<AsSegment>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// One AS_PATH segment (RFC 4271 §5.1.2).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AsSegment {
    pub type_: AsSegmentType,
    pub asns: Vec<u32>,
    pub as4: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum AsSegmentType {
    AsSet = 1,
    AsSequence = 2,
    ConfedSequence = 3,
    ConfedSet = 4,
}

impl AsSegment {
    fn decode_with(src: &mut Bytes, as4: bool) -> Result<Self, Error> {
        if src.remaining() < 2 {
            return Err(Error::InternalLength("AS segment header", std::cmp::Ordering::Less));
        }
        let type_ = src.get_u8();
        let len = usize::from(src.get_u8());
        let per_asn_len = if as4 { 4 } else { 2 };
        if src.remaining() < len * per_asn_len {
            return Err(Error::InternalLength("AS segment", std::cmp::Ordering::Less));
        }
        let mut asns = Vec::with_capacity(len);
        for _ in 0..len {
            asns.push(if as4 { src.get_u32() } else { u32::from(src.get_u16()) });
        }
        Ok(Self {
            type_: AsSegmentType::from_u8(type_).ok_or(Error::InternalType("AS segment type", u16::from(type_)))?,
            asns,
            as4,
        })
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        let encoded_len = self.encoded_len();
        dst.put_u8(self.type_ as u8);
        dst.put_u8(u8::try_from(self.asns.len()).expect("AS segment length overflow"));
        for asn in self.asns {
            if self.as4 {
                dst.put_u32(asn);
            } else {
                dst.put_u16(u16::try_from(asn).expect("4-byte ASN in 2-byte AS path"));
            }
        }
        encoded_len
    }

    fn encoded_len(&self) -> usize {
        2 + self.asns.len() * if self.as4 { 4 } else { 2 }
    }
}

/// AGGREGATOR (RFC 4271 §5.1.7, RFC 6793 for the 4-byte-ASN form).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Aggregator {
    pub asn: u32,
    pub ip: Ipv4Addr,
    pub as4: bool,
}

impl Aggregator {
    fn decode_with(src: &mut Bytes, as4: bool) -> Result<Self, Error> {
        let asn = if as4 { src.get_u32() } else { u32::from(src.get_u16()) };
        let ip = Ipv4Addr::from_bytes(src)?;
        Ok(Self { asn, ip, as4 })
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        if self.as4 {
            dst.put_u32(self.asn);
        } else {
            dst.put_u16(u16::try_from(self.asn).expect("4-byte ASN in 2-byte AGGREGATOR"));
        }
        self.ip.to_bytes(dst) + if self.as4 { 4 } else { 2 }
    }

    fn encoded_len(&self) -> usize {
        4 + if self.as4 { 4 } else { 2 }
    }
}

/// MP_REACH_NLRI (RFC 4760 §3).
#[derive(Clone, Debug, PartialEq)]
pub struct MpReachNlri {
    pub afi: Afi,
    pub safi: Safi,
    pub next_hop: MpNextHop,
    pub nlri: Vec<(Option<PathId>, Nlri)>,
}

impl MpReachNlri {
    fn decode_with(src: &mut Bytes, neg: &Negotiation) -> Result<Self, Error> {
        if src.remaining() < 4 {
            return Err(Error::InternalLength("MP_REACH_NLRI header", std::cmp::Ordering::Less));
        }
        let afi_num = src.get_u16();
        let afi = Afi::from_u16(afi_num).ok_or(Error::InternalType("MP_REACH_NLRI AFI", afi_num))?;
        let safi_num = src.get_u8();
        let safi = Safi::from_u8(safi_num).ok_or(Error::InternalType("MP_REACH_NLRI SAFI", u16::from(safi_num)))?;
        let nh_len = usize::from(src.get_u8());
        if src.remaining() < nh_len + 1 {
            return Err(Error::InternalLength("MP_REACH_NLRI next hop", std::cmp::Ordering::Less));
        }
        let mut nh_src = src.split_to(nh_len);
        let next_hop = MpNextHop::from_bytes(&mut nh_src)?;
        let _reserved = src.get_u8();
        let family = Family::new(afi, safi);
        let nlri = nlri::decode_list(family, src, neg.addpath_receive(family))?;
        Ok(Self { afi, safi, next_hop, nlri })
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        let mut len = 0;
        dst.put_u16(self.afi as u16);
        len += 2;
        dst.put_u8(u8::try_from(self.safi as u16).expect("MP_REACH_NLRI SAFI out of range"));
        len += 1;
        dst.put_u8(u8::try_from(self.next_hop.encoded_len()).expect("MP_REACH_NLRI next hop length overflow"));
        len += 1;
        len += self.next_hop.to_bytes(dst);
        dst.put_u8(0);
        len += 1;
        len += nlri::encode_list(self.nlri, dst);
        len
    }

    fn encoded_len(&self) -> usize {
        2 + 1 + 1 + self.next_hop.encoded_len() + 1 + nlri::encoded_list_len(&self.nlri)
    }
}

/// Next hop carried in MP_REACH_NLRI (RFC 4760 §3, RFC 2545/RFC 8950 for the
/// IPv6-global-plus-link-local form).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MpNextHop {
    Single(IpAddr),
    V6AndLL(Ipv6Addr, Ipv6Addr),
}

impl Component for MpNextHop {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        match src.remaining() {
            4 | 16 => Ok(Self::Single(IpAddr::from_bytes(src)?)),
            32 => {
                let v6local = Ipv6Addr::from_bytes(src)?;
                let v6ll = Ipv6Addr::from_bytes(src)?;
                Ok(Self::V6AndLL(v6local, v6ll))
            }
            _ => Err(Error::InternalLength("MP_NEXT_HOP", std::cmp::Ordering::Equal)),
        }
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        match self {
            Self::Single(ip) => {
                ip.to_bytes(dst);
            }
            Self::V6AndLL(v6local, v6ll) => {
                v6local.to_bytes(dst);
                v6ll.to_bytes(dst);
            }
        }
        self.encoded_len()
    }

    fn encoded_len(&self) -> usize {
        match self {
            Self::Single(IpAddr::V4(_)) => 4,
            Self::Single(IpAddr::V6(_)) => 16,
            Self::V6AndLL(..) => 32,
        }
    }
}

impl From<IpAddr> for MpNextHop {
    fn from(ip: IpAddr) -> Self {
        Self::Single(ip)
    }
}

/// MP_UNREACH_NLRI (RFC 4760 §4).
#[derive(Clone, Debug, PartialEq)]
pub struct MpUnreachNlri {
    pub afi: Afi,
    pub safi: Safi,
    pub withdrawn: Vec<(Option<PathId>, Nlri)>,
}

impl MpUnreachNlri {
    fn decode_with(src: &mut Bytes, neg: &Negotiation) -> Result<Self, Error> {
        if src.remaining() < 3 {
            return Err(Error::InternalLength("MP_UNREACH_NLRI header", std::cmp::Ordering::Less));
        }
        let afi_num = src.get_u16();
        let afi = Afi::from_u16(afi_num).ok_or(Error::InternalType("MP_UNREACH_NLRI AFI", afi_num))?;
        let safi_num = src.get_u8();
        let safi = Safi::from_u8(safi_num).ok_or(Error::InternalType("MP_UNREACH_NLRI SAFI", u16::from(safi_num)))?;
        let family = Family::new(afi, safi);
        let withdrawn = nlri::decode_list(family, src, neg.addpath_receive(family))?;
        Ok(Self { afi, safi, withdrawn })
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        let mut len = 0;
        dst.put_u16(self.afi as u16);
        len += 2;
        dst.put_u8(u8::try_from(self.safi as u16).expect("MP_UNREACH_NLRI SAFI out of range"));
        len += 1;
        len += nlri::encode_list(self.withdrawn, dst);
        len
    }

    fn encoded_len(&self) -> usize {
        3 + nlri::encoded_list_len(&self.withdrawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex_to_bytes;

    #[test]
    fn origin_round_trips() {
        let mut src = hex_to_bytes("40 01 01 00");
        let pa = Value::from_bytes(&mut src).unwrap();
        assert_eq!(pa, Value { flags: Flags(0x40), data: Data::Origin(Origin::Igp) });
        let mut dst = BytesMut::new();
        pa.to_bytes(&mut dst);
        assert_eq!(dst.freeze(), hex_to_bytes("40 01 01 00"));
    }

    #[test]
    fn as_path_decodes_with_negotiated_width() {
        let mut src = hex_to_bytes("40 0204 0201 fd7d");
        let neg = Negotiation::default();
        let pa = Value::from_bytes_with(&mut src, &neg).unwrap();
        assert_eq!(
            pa,
            Value { flags: Flags(0x40), data: Data::AsPath(AsPath(vec![AsSegment { type_: AsSegmentType::AsSequence, asns: vec![0xfd7d], as4: false }])) }
        );
    }

    #[test]
    fn as4_path_always_decodes_as_four_byte() {
        let mut src = hex_to_bytes("c0 11 06 0201 0000fd7d");
        let pa = Value::from_bytes(&mut src).unwrap();
        assert_eq!(
            pa,
            Value { flags: Flags(0xc0), data: Data::As4Path(AsPath(vec![AsSegment { type_: AsSegmentType::AsSequence, asns: vec![0xfd7d], as4: true }])) }
        );
    }

    #[test]
    fn next_hop_round_trips() {
        let mut src = hex_to_bytes("40 03 04 7f000001");
        let pa = Value::from_bytes(&mut src).unwrap();
        assert_eq!(pa, Value { flags: Flags(0x40), data: Data::NextHop(Ipv4Addr::new(127, 0, 0, 1)) });
    }

    #[test]
    fn error_policy_flags_nexthop_as_session_reset() {
        assert_eq!(error_policy(Type::NextHop as u8, Flags::WELL_KNOWN_COMPLETE), ErrorPolicy::SessionReset);
        assert_eq!(error_policy(Type::Communities as u8, Flags(0xc0)), ErrorPolicy::AttributeDiscard);
        assert_eq!(error_policy(Type::MpReachNlri as u8, Flags::OPTIONAL_TRANSITIVE_EXTENDED), ErrorPolicy::TreatAsWithdraw);
    }

    #[test]
    fn error_policy_rejects_unrecognized_well_known_attribute() {
        assert_eq!(error_policy(200, Flags::WELL_KNOWN_COMPLETE), ErrorPolicy::SessionReset);
        assert_eq!(error_policy(200, Flags::OPTIONAL_NON_TRANSITIVE), ErrorPolicy::AttributeDiscard);
    }

    #[test]
    fn unrecognized_well_known_attribute_is_rejected_at_decode() {
        // Type 200 is unassigned; the Optional bit (0x80) is clear, so this
        // claims to be well-known and must trigger NOTIFY, not pass through.
        let mut src = hex_to_bytes("40 c8 00");
        assert!(matches!(Value::from_bytes(&mut src), Err(Error::UnrecognizedWellKnownAttribute(200))));
    }

    #[test]
    fn unrecognized_optional_attribute_still_round_trips_opaque() {
        let mut src = hex_to_bytes("c0 c8 02 aabb");
        let pa = Value::from_bytes(&mut src).unwrap();
        assert_eq!(pa, Value { flags: Flags(0xc0), data: Data::Unsupported(200, Bytes::copy_from_slice(&[0xaa, 0xbb])) });
    }

    #[test]
    fn reconciles_as4_path_against_as_trans_placeholders() {
        let as_path = AsPath(vec![AsSegment { type_: AsSegmentType::AsSequence, asns: vec![65001, 23456, 23456, 65002], as4: false }]);
        let as4_path = AsPath(vec![AsSegment { type_: AsSegmentType::AsSequence, asns: vec![65001, 70000, 80000, 65002], as4: true }]);
        let merged = as_path.reconcile_as4(&as4_path);
        assert_eq!(merged.asns().collect::<Vec<_>>(), vec![65001, 70000, 80000, 65002]);
    }

    #[test]
    fn next_hop_sent_optional_is_rejected_as_attribute_flags_error() {
        // NEXT_HOP is well-known mandatory (flags 0x40); flipping the
        // optional bit to 0x80 must be a hard session-reset, not a silent accept.
        let mut src = hex_to_bytes("80 03 04 7f000001");
        assert!(matches!(Value::from_bytes(&mut src), Err(Error::AttributeFlags(3))));
    }

    #[test]
    fn communities_sent_non_transitive_is_rejected() {
        // COMMUNITIES is optional transitive (0xc0); 0x80 clears transitive.
        let mut src = hex_to_bytes("80 08 04 00000000");
        assert!(matches!(Value::from_bytes(&mut src), Err(Error::AttributeFlags(8))));
    }

    #[test]
    fn malformed_mp_unreach_nlri_sets_treat_as_withdraw_instead_of_failing() {
        // MP_UNREACH_NLRI's error_policy is TreatAsWithdraw (RFC 7606 §4):
        // an unrecognised AFI inside it must not abort the whole UPDATE.
        let mut src = hex_to_bytes("80 0f 03 ffff01");
        let neg = Negotiation::default();
        let outcome = PathAttributes::from_bytes_with(&mut src, &neg).unwrap();
        assert!(outcome.attributes.0.is_empty());
        assert!(outcome.treat_as_withdraw);
    }

    #[test]
    fn malformed_as4_path_attribute_is_discarded_not_fatal() {
        // AS4_PATH's error_policy is AttributeDiscard: a segment claiming
        // more ASNs than the body actually carries must not abort the
        // UPDATE, just drop the attribute.
        let mut src = hex_to_bytes("c0 11 04 0201 0000");
        let neg = Negotiation::default();
        let outcome = PathAttributes::from_bytes_with(&mut src, &neg).unwrap();
        assert!(outcome.attributes.0.is_empty());
        assert!(!outcome.treat_as_withdraw);
    }

    #[test]
    fn reconcile_asn4_drops_as4_path_after_merging() {
        let mut attrs = PathAttributes(vec![
            Value {
                flags: Flags::WELL_KNOWN_COMPLETE,
                data: Data::AsPath(AsPath(vec![AsSegment { type_: AsSegmentType::AsSequence, asns: vec![23456], as4: false }])),
            },
            Value {
                flags: Flags::OPTIONAL_TRANSITIVE_EXTENDED,
                data: Data::As4Path(AsPath(vec![AsSegment { type_: AsSegmentType::AsSequence, asns: vec![70000], as4: true }])),
            },
        ]);
        reconcile_asn4(&mut attrs);
        assert_eq!(attrs.0.len(), 1);
        assert!(matches!(&attrs.0[0].data, Data::AsPath(p) if p.asns().collect::<Vec<_>>() == vec![70000]));
    }
}
