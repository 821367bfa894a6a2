//! BGP OPEN optional parameters and capabilities (RFC 5492 and friends)
//!
//! Grounded on the teacher's `src/bgp/capability.rs`: the same
//! `OptionalParameters` / `Capabilities` / `CapabilitiesBuilder` shape,
//! generalized from the teacher's five-variant `Value` (MultiProtocol,
//! RouteRefresh, ExtendedNextHop, ExtendedMessage, FourOctetAsNumber) to the
//! full catalogue a policy-neutral speaker needs: enhanced route-refresh,
//! ADD-PATH, graceful-restart, software-version, hostname, multisession and
//! operational, each round-tripped even where this core has no behavior to
//! attach to them yet.

use crate::afi::{Afi, Family, Safi};
use crate::endec::Component;
use crate::Error;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use enum_primitive_derive::Primitive;
use num_traits::FromPrimitive;
use std::collections::HashSet;
use std::convert::TryFrom;

/// BGP OPEN optional parameter type (RFC 5492 §3, RFC 9072)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum OptionalParameterType {
    Authentication = 1,
    Capabilities = 2,
    /// Extended-length encoding marker (RFC 9072): the parameter type
    /// octet is itself `255` and a two-octet type/length pair follows.
    ExtendedLength = 255,
}

/// BGP capability code (RFC 5492 §4 and the IANA capability registry)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum CapabilityCode {
    MultiProtocol = 1,
    RouteRefresh = 2,
    ExtendedNextHop = 5,
    ExtendedMessage = 6,
    GracefulRestart = 64,
    FourOctetAsNumber = 65,
    AddPath = 69,
    EnhancedRouteRefresh = 70,
    Multisession = 131,
    SoftwareVersion = 141,
    Hostname = 73,
    Operational = 76,
}

/// Direction(s) in which a family has ADD-PATH (RFC 7911) negotiated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "impl-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AddPathDirection {
    SendOnly,
    ReceiveOnly,
    Both,
}

impl AddPathDirection {
    #[must_use]
    pub const fn can_send(self) -> bool {
        matches!(self, Self::SendOnly | Self::Both)
    }

    #[must_use]
    pub const fn can_receive(self) -> bool {
        matches!(self, Self::ReceiveOnly | Self::Both)
    }

    const fn from_wire(send_receive: u8) -> Option<Self> {
        match send_receive {
            1 => Some(Self::ReceiveOnly),
            2 => Some(Self::SendOnly),
            3 => Some(Self::Both),
            _ => None,
        }
    }

    const fn to_wire(self) -> u8 {
        match self {
            Self::ReceiveOnly => 1,
            Self::SendOnly => 2,
            Self::Both => 3,
        }
    }
}

/// One `(AFI, SAFI)` entry inside an ADD-PATH capability.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AddPathEntry {
    pub family: Family,
    pub direction: AddPathDirection,
}

/// One `(AFI, SAFI)` forwarding-state entry inside a graceful-restart capability.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GracefulRestartEntry {
    pub family: Family,
    pub forwarding_state_preserved: bool,
}

/// Decoded graceful-restart capability (RFC 4724 §3).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GracefulRestartCap {
    pub restarting: bool,
    pub restart_time: u16,
    pub preserved_families: HashSet<Family>,
}

/// One extended-next-hop `(NLRI AFI, NLRI SAFI, next-hop AFI)` triple (RFC 8950).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExtendedNextHopEntry {
    pub nlri_afi: Afi,
    pub nlri_safi: Safi,
    pub next_hop_afi: Afi,
}

/// A single capability value (RFC 5492 §4 and extensions).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    MultiProtocol { afi: Afi, safi: Safi },
    RouteRefresh,
    /// Cisco's pre-standard route-refresh code point, carried unchanged.
    EnhancedRouteRefresh,
    ExtendedNextHop(Vec<ExtendedNextHopEntry>),
    ExtendedMessage,
    FourOctetAsNumber(u32),
    AddPath(Vec<AddPathEntry>),
    GracefulRestart(GracefulRestartCap),
    SoftwareVersion(String),
    Hostname { hostname: String, domain: String },
    Multisession(Vec<u8>),
    Operational,
    Unsupported { code: u8, data: Bytes },
}

impl Value {
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::MultiProtocol { .. } => CapabilityCode::MultiProtocol as u8,
            Self::RouteRefresh => CapabilityCode::RouteRefresh as u8,
            Self::EnhancedRouteRefresh => CapabilityCode::EnhancedRouteRefresh as u8,
            Self::ExtendedNextHop(_) => CapabilityCode::ExtendedNextHop as u8,
            Self::ExtendedMessage => CapabilityCode::ExtendedMessage as u8,
            Self::FourOctetAsNumber(_) => CapabilityCode::FourOctetAsNumber as u8,
            Self::AddPath(_) => CapabilityCode::AddPath as u8,
            Self::GracefulRestart(_) => CapabilityCode::GracefulRestart as u8,
            Self::SoftwareVersion(_) => CapabilityCode::SoftwareVersion as u8,
            Self::Hostname { .. } => CapabilityCode::Hostname as u8,
            Self::Multisession(_) => CapabilityCode::Multisession as u8,
            Self::Operational => CapabilityCode::Operational as u8,
            Self::Unsupported { code, .. } => *code,
        }
    }

    fn decode_body(code: u8, mut body: Bytes) -> Result<Self, Error> {
        match CapabilityCode::from_u8(code) {
            Some(CapabilityCode::MultiProtocol) => {
                if body.remaining() != 4 {
                    return Err(Error::InternalLength("multiprotocol capability", std::cmp::Ordering::Equal));
                }
                let afi_num = body.get_u16();
                let _reserved = body.get_u8();
                let safi_num = body.get_u8();
                let afi = Afi::from_u16(afi_num).ok_or(Error::InternalType("afi", afi_num))?;
                let safi = Safi::from_u8(safi_num).ok_or(Error::InternalType("safi", u16::from(safi_num)))?;
                Ok(Self::MultiProtocol { afi, safi })
            }
            Some(CapabilityCode::RouteRefresh) => Ok(Self::RouteRefresh),
            Some(CapabilityCode::EnhancedRouteRefresh) => Ok(Self::EnhancedRouteRefresh),
            Some(CapabilityCode::ExtendedNextHop) => {
                let mut entries = Vec::new();
                while body.remaining() >= 6 {
                    let nlri_afi_num = body.get_u16();
                    let nlri_safi_num = body.get_u16();
                    let next_hop_afi_num = body.get_u16();
                    entries.push(ExtendedNextHopEntry {
                        nlri_afi: Afi::from_u16(nlri_afi_num).ok_or(Error::InternalType("afi", nlri_afi_num))?,
                        nlri_safi: Safi::from_u16(nlri_safi_num)
                            .ok_or(Error::InternalType("safi", nlri_safi_num))?,
                        next_hop_afi: Afi::from_u16(next_hop_afi_num)
                            .ok_or(Error::InternalType("afi", next_hop_afi_num))?,
                    });
                }
                Ok(Self::ExtendedNextHop(entries))
            }
            Some(CapabilityCode::ExtendedMessage) => Ok(Self::ExtendedMessage),
            Some(CapabilityCode::FourOctetAsNumber) => {
                if body.remaining() != 4 {
                    return Err(Error::InternalLength("four-octet ASN capability", std::cmp::Ordering::Equal));
                }
                Ok(Self::FourOctetAsNumber(body.get_u32()))
            }
            Some(CapabilityCode::AddPath) => {
                let mut entries = Vec::new();
                while body.remaining() >= 4 {
                    let afi_num = body.get_u16();
                    let safi_num = body.get_u8();
                    let send_receive = body.get_u8();
                    let afi = Afi::from_u16(afi_num).ok_or(Error::InternalType("afi", afi_num))?;
                    let safi = Safi::from_u8(safi_num).ok_or(Error::InternalType("safi", u16::from(safi_num)))?;
                    let direction = AddPathDirection::from_wire(send_receive)
                        .ok_or(Error::InternalType("add-path direction", u16::from(send_receive)))?;
                    entries.push(AddPathEntry { family: Family::new(afi, safi), direction });
                }
                Ok(Self::AddPath(entries))
            }
            Some(CapabilityCode::GracefulRestart) => {
                if body.remaining() < 2 {
                    return Err(Error::InternalLength("graceful-restart capability", std::cmp::Ordering::Less));
                }
                let flags_and_time = body.get_u16();
                let restarting = flags_and_time & 0x8000 != 0;
                let restart_time = flags_and_time & 0x0FFF;
                let mut preserved_families = HashSet::new();
                while body.remaining() >= 4 {
                    let afi_num = body.get_u16();
                    let safi_num = body.get_u8();
                    let flags = body.get_u8();
                    let afi = Afi::from_u16(afi_num).ok_or(Error::InternalType("afi", afi_num))?;
                    let safi = Safi::from_u8(safi_num).ok_or(Error::InternalType("safi", u16::from(safi_num)))?;
                    if flags & 0x80 != 0 {
                        preserved_families.insert(Family::new(afi, safi));
                    }
                }
                Ok(Self::GracefulRestart(GracefulRestartCap { restarting, restart_time, preserved_families }))
            }
            Some(CapabilityCode::SoftwareVersion) => {
                let bytes = body.copy_to_bytes(body.remaining());
                Ok(Self::SoftwareVersion(String::from_utf8_lossy(&bytes).into_owned()))
            }
            Some(CapabilityCode::Hostname) => {
                if body.remaining() < 1 {
                    return Err(Error::InternalLength("hostname capability", std::cmp::Ordering::Less));
                }
                let host_len = usize::from(body.get_u8());
                if body.remaining() < host_len {
                    return Err(Error::InternalLength("hostname", std::cmp::Ordering::Less));
                }
                let hostname = String::from_utf8_lossy(&body.copy_to_bytes(host_len)).into_owned();
                let domain = if body.remaining() >= 1 {
                    let domain_len = usize::from(body.get_u8());
                    if body.remaining() < domain_len {
                        return Err(Error::InternalLength("hostname domain", std::cmp::Ordering::Less));
                    }
                    String::from_utf8_lossy(&body.copy_to_bytes(domain_len)).into_owned()
                } else {
                    String::new()
                };
                Ok(Self::Hostname { hostname, domain })
            }
            Some(CapabilityCode::Multisession) => Ok(Self::Multisession(body.copy_to_bytes(body.remaining()).to_vec())),
            Some(CapabilityCode::Operational) => Ok(Self::Operational),
            None => Ok(Self::Unsupported { code, data: body.copy_to_bytes(body.remaining()) }),
        }
    }

    fn encode_body(&self, dst: &mut BytesMut) {
        match self {
            Self::MultiProtocol { afi, safi } => {
                dst.put_u16(*afi as u16);
                dst.put_u8(0);
                dst.put_u8(*safi as u8);
            }
            Self::RouteRefresh | Self::EnhancedRouteRefresh | Self::ExtendedMessage | Self::Operational => {}
            Self::ExtendedNextHop(entries) => {
                for entry in entries {
                    dst.put_u16(entry.nlri_afi as u16);
                    dst.put_u16(entry.nlri_safi as u16);
                    dst.put_u16(entry.next_hop_afi as u16);
                }
            }
            Self::FourOctetAsNumber(asn) => dst.put_u32(*asn),
            Self::AddPath(entries) => {
                for entry in entries {
                    dst.put_u16(entry.family.afi as u16);
                    dst.put_u8(entry.family.safi as u8);
                    dst.put_u8(entry.direction.to_wire());
                }
            }
            Self::GracefulRestart(cap) => {
                let flags_and_time = (u16::from(cap.restarting) << 15) | (cap.restart_time & 0x0FFF);
                dst.put_u16(flags_and_time);
                for family in &cap.preserved_families {
                    dst.put_u16(family.afi as u16);
                    dst.put_u8(family.safi as u8);
                    dst.put_u8(0x80);
                }
            }
            Self::SoftwareVersion(version) => dst.put_slice(version.as_bytes()),
            Self::Hostname { hostname, domain } => {
                dst.put_u8(u8::try_from(hostname.len()).unwrap_or(u8::MAX));
                dst.put_slice(hostname.as_bytes());
                dst.put_u8(u8::try_from(domain.len()).unwrap_or(u8::MAX));
                dst.put_slice(domain.as_bytes());
            }
            Self::Multisession(data) => dst.put_slice(data),
            Self::Unsupported { data, .. } => dst.put_slice(data),
        }
    }

    fn encoded_body_len(&self) -> usize {
        match self {
            Self::MultiProtocol { .. } => 4,
            Self::RouteRefresh | Self::EnhancedRouteRefresh | Self::ExtendedMessage | Self::Operational => 0,
            Self::ExtendedNextHop(entries) => entries.len() * 6,
            Self::FourOctetAsNumber(_) => 4,
            Self::AddPath(entries) => entries.len() * 4,
            Self::GracefulRestart(cap) => 2 + cap.preserved_families.len() * 4,
            Self::SoftwareVersion(version) => version.len(),
            Self::Hostname { hostname, domain } => 1 + hostname.len() + 1 + domain.len(),
            Self::Multisession(data) => data.len(),
            Self::Unsupported { data, .. } => data.len(),
        }
    }
}

/// One capability TLV: `code, length, value` nested inside an optional parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capability(pub Value);

impl Component for Capability {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        if src.remaining() < 2 {
            return Err(Error::InternalLength("capability header", std::cmp::Ordering::Less));
        }
        let code = src.get_u8();
        let len = usize::from(src.get_u8());
        if src.remaining() < len {
            return Err(Error::InternalLength("capability body", std::cmp::Ordering::Less));
        }
        let body = src.copy_to_bytes(len);
        Ok(Self(Value::decode_body(code, body)?))
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        let start = dst.len();
        dst.put_u8(self.0.code());
        let len = self.0.encoded_body_len();
        dst.put_u8(u8::try_from(len).unwrap_or(u8::MAX));
        self.0.encode_body(dst);
        dst.len() - start
    }

    fn encoded_len(&self) -> usize {
        2 + self.0.encoded_body_len()
    }
}

/// The full set of optional parameters carried in one OPEN message.
///
/// Only `Capabilities` (RFC 5492 parameter type 2) are modeled; any other
/// optional parameter type round-trips as an opaque blob so an OPEN from an
/// exotic peer never fails to parse outright.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    values: Vec<Value>,
}

impl Capabilities {
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn has_asn4(&self) -> bool {
        self.values.iter().any(|v| matches!(v, Value::FourOctetAsNumber(_)))
    }

    #[must_use]
    pub fn asn4(&self) -> Option<u32> {
        self.values.iter().find_map(|v| match v {
            Value::FourOctetAsNumber(asn) => Some(*asn),
            _ => None,
        })
    }

    pub fn multiprotocol_families(&self) -> impl Iterator<Item = Family> + '_ {
        self.values.iter().filter_map(|v| match v {
            Value::MultiProtocol { afi, safi } => Some(Family::new(*afi, *safi)),
            _ => None,
        })
    }

    pub fn addpath_directions(&self) -> impl Iterator<Item = (Family, AddPathDirection)> + '_ {
        self.values.iter().flat_map(|v| match v {
            Value::AddPath(entries) => entries.iter().map(|e| (e.family, e.direction)).collect::<Vec<_>>(),
            _ => Vec::new(),
        })
    }

    #[must_use]
    pub fn has_route_refresh(&self) -> bool {
        self.values.iter().any(|v| matches!(v, Value::RouteRefresh))
    }

    #[must_use]
    pub fn has_enhanced_route_refresh(&self) -> bool {
        self.values.iter().any(|v| matches!(v, Value::EnhancedRouteRefresh))
    }

    #[must_use]
    pub fn has_extended_message(&self) -> bool {
        self.values.iter().any(|v| matches!(v, Value::ExtendedMessage))
    }

    pub fn extended_next_hop_families(&self) -> impl Iterator<Item = Family> + '_ {
        self.values.iter().flat_map(|v| match v {
            Value::ExtendedNextHop(entries) => {
                entries.iter().map(|e| Family::new(e.nlri_afi, e.nlri_safi)).collect::<Vec<_>>()
            }
            _ => Vec::new(),
        })
    }

    #[must_use]
    pub fn graceful_restart(&self) -> Option<GracefulRestartCap> {
        self.values.iter().find_map(|v| match v {
            Value::GracefulRestart(cap) => Some(cap.clone()),
            _ => None,
        })
    }
}

impl Component for Capabilities {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        let mut values = Vec::new();
        while src.has_remaining() {
            let Capability(value) = Capability::from_bytes(src)?;
            values.push(value);
        }
        Ok(Self { values })
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        let start = dst.len();
        for value in self.values {
            Capability(value).to_bytes(dst);
        }
        dst.len() - start
    }

    fn encoded_len(&self) -> usize {
        self.values.iter().map(|v| 2 + v.encoded_body_len()).sum()
    }
}

/// Fluent builder for the capability set we advertise in our own OPEN.
///
/// Mirrors the teacher's `CapabilitiesBuilder`, extended with the families
/// this core supports beyond the teacher's IPv4/IPv6 unicast-only scope.
#[derive(Debug, Default)]
pub struct CapabilitiesBuilder {
    values: Vec<Value>,
}

impl CapabilitiesBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn multi_protocol(mut self, afi: Afi, safi: Safi) -> Self {
        self.values.push(Value::MultiProtocol { afi, safi });
        self
    }

    #[must_use]
    pub fn family(self, family: Family) -> Self {
        self.multi_protocol(family.afi, family.safi)
    }

    #[must_use]
    pub fn route_refresh(mut self) -> Self {
        self.values.push(Value::RouteRefresh);
        self
    }

    #[must_use]
    pub fn enhanced_route_refresh(mut self) -> Self {
        self.values.push(Value::EnhancedRouteRefresh);
        self
    }

    #[must_use]
    pub fn extended_message(mut self) -> Self {
        self.values.push(Value::ExtendedMessage);
        self
    }

    #[must_use]
    pub fn four_octet_as_number(mut self, asn: u32) -> Self {
        self.values.push(Value::FourOctetAsNumber(asn));
        self
    }

    #[must_use]
    pub fn add_path(mut self, family: Family, direction: AddPathDirection) -> Self {
        self.values.push(Value::AddPath(vec![AddPathEntry { family, direction }]));
        self
    }

    #[must_use]
    pub fn graceful_restart(mut self, restarting: bool, restart_time: u16, preserved_families: HashSet<Family>) -> Self {
        self.values.push(Value::GracefulRestart(GracefulRestartCap { restarting, restart_time, preserved_families }));
        self
    }

    #[must_use]
    pub fn extended_next_hop(mut self, entries: Vec<ExtendedNextHopEntry>) -> Self {
        self.values.push(Value::ExtendedNextHop(entries));
        self
    }

    #[must_use]
    pub fn software_version(mut self, version: impl Into<String>) -> Self {
        self.values.push(Value::SoftwareVersion(version.into()));
        self
    }

    #[must_use]
    pub fn hostname(mut self, hostname: impl Into<String>, domain: impl Into<String>) -> Self {
        self.values.push(Value::Hostname { hostname: hostname.into(), domain: domain.into() });
        self
    }

    #[must_use]
    pub fn other(mut self, code: u8, data: Bytes) -> Self {
        self.values.push(Value::Unsupported { code, data });
        self
    }

    #[must_use]
    pub fn build(self) -> Capabilities {
        Capabilities { values: self.values }
    }
}

/// One optional parameter carried in the BGP OPEN message (RFC 5492 §3,
/// RFC 9072 for the extended-length encoding).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OptionalParameterValue {
    Capabilities(Capabilities),
    Other { type_: u8, data: Bytes },
}

/// The full "Optional Parameters" field of an OPEN message: a sequence of
/// `(type, length, value)` parameters. Only type 2 (Capabilities) is
/// interpreted; everything else round-trips opaque.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptionalParameters(pub Vec<OptionalParameterValue>);

impl OptionalParameters {
    /// Flatten every `Capabilities` parameter into one set, the common case
    /// for a peer that packs all its capabilities into a single parameter.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        let mut values = Vec::new();
        for parameter in &self.0 {
            if let OptionalParameterValue::Capabilities(caps) = parameter {
                values.extend(caps.values.iter().cloned());
            }
        }
        Capabilities { values }
    }
}

impl From<Vec<OptionalParameterValue>> for OptionalParameters {
    fn from(values: Vec<OptionalParameterValue>) -> Self {
        Self(values)
    }
}

impl Component for OptionalParameters {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        let mut values = Vec::new();
        while src.has_remaining() {
            if src.remaining() < 2 {
                return Err(Error::InternalLength("optional parameter header", std::cmp::Ordering::Less));
            }
            let mut type_ = src.get_u8();
            let len = if type_ == OptionalParameterType::ExtendedLength as u8 {
                if src.remaining() < 3 {
                    return Err(Error::InternalLength("extended optional parameter header", std::cmp::Ordering::Less));
                }
                type_ = src.get_u8();
                usize::from(src.get_u16())
            } else {
                usize::from(src.get_u8())
            };
            if src.remaining() < len {
                return Err(Error::InternalLength("optional parameter body", std::cmp::Ordering::Less));
            }
            let mut body = src.split_to(len);
            let value = match OptionalParameterType::from_u8(type_) {
                Some(OptionalParameterType::Capabilities) => OptionalParameterValue::Capabilities(Capabilities::from_bytes(&mut body)?),
                _ => OptionalParameterValue::Other { type_, data: body.copy_to_bytes(body.remaining()) },
            };
            values.push(value);
        }
        Ok(Self(values))
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        let start = dst.len();
        for value in self.0 {
            match value {
                OptionalParameterValue::Capabilities(caps) => {
                    let len = caps.encoded_len();
                    if len > 255 {
                        dst.put_u8(OptionalParameterType::ExtendedLength as u8);
                        dst.put_u8(OptionalParameterType::Capabilities as u8);
                        dst.put_u16(u16::try_from(len).expect("capabilities parameter length overflow"));
                    } else {
                        dst.put_u8(OptionalParameterType::Capabilities as u8);
                        dst.put_u8(u8::try_from(len).expect("capabilities parameter length overflow"));
                    }
                    caps.to_bytes(dst);
                }
                OptionalParameterValue::Other { type_, data } => {
                    let len = data.len();
                    if len > 255 {
                        dst.put_u8(OptionalParameterType::ExtendedLength as u8);
                        dst.put_u8(type_);
                        dst.put_u16(u16::try_from(len).expect("optional parameter length overflow"));
                    } else {
                        dst.put_u8(type_);
                        dst.put_u8(u8::try_from(len).expect("optional parameter length overflow"));
                    }
                    dst.put_slice(&data);
                }
            }
        }
        dst.len() - start
    }

    fn encoded_len(&self) -> usize {
        self.0
            .iter()
            .map(|value| {
                let (body_len, type_is_capabilities) = match value {
                    OptionalParameterValue::Capabilities(caps) => (caps.encoded_len(), true),
                    OptionalParameterValue::Other { data, .. } => (data.len(), false),
                };
                let _ = type_is_capabilities;
                if body_len > 255 {
                    4 + body_len
                } else {
                    2 + body_len
                }
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex_to_bytes;

    #[test]
    fn multiprotocol_round_trip() {
        let caps = CapabilitiesBuilder::new()
            .multi_protocol(Afi::Ipv4, Safi::Unicast)
            .multi_protocol(Afi::Ipv6, Safi::Unicast)
            .route_refresh()
            .four_octet_as_number(65001)
            .build();
        let mut buf = BytesMut::new();
        let written = caps.clone().to_bytes(&mut buf);
        assert_eq!(written, buf.len());
        let mut src = buf.freeze();
        let decoded = Capabilities::from_bytes(&mut src).unwrap();
        assert_eq!(decoded, caps);
        assert!(decoded.has_asn4());
        assert_eq!(decoded.asn4(), Some(65001));
        assert!(decoded.multiprotocol_families().any(|f| f == Family::IPV4_UNICAST));
    }

    #[test]
    fn add_path_direction_round_trip() {
        let caps = CapabilitiesBuilder::new()
            .add_path(Family::IPV4_UNICAST, AddPathDirection::Both)
            .build();
        let mut buf = BytesMut::new();
        caps.clone().to_bytes(&mut buf);
        let mut src = buf.freeze();
        let decoded = Capabilities::from_bytes(&mut src).unwrap();
        let (family, direction) = decoded.addpath_directions().next().unwrap();
        assert_eq!(family, Family::IPV4_UNICAST);
        assert_eq!(direction, AddPathDirection::Both);
    }

    #[test]
    fn unsupported_capability_round_trips_opaque() {
        let data = hex_to_bytes("0102 0304");
        let caps = CapabilitiesBuilder::new().other(200, data.clone()).build();
        let mut buf = BytesMut::new();
        caps.to_bytes(&mut buf);
        let mut src = buf.freeze();
        let decoded = Capabilities::from_bytes(&mut src).unwrap();
        assert!(matches!(&decoded.values()[0], Value::Unsupported { code: 200, data: d } if *d == data));
    }
}
