//! Flow Specification NLRI (RFC 8955 §4, RFC 8956 for IPv6)
//!
//! Grounded on the teacher's general `Component` idiom; there is no flowspec
//! code in the teacher repo to generalize from, so the component catalogue
//! here follows RFC 8955 §4.2's numeric-operator and `<op, value>+`
//! encoding directly.

use crate::endec::Component;
use crate::Error;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Flow component type codes (RFC 8955 §4.2, RFC 8956 §3 adds 8/9 for v6).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ComponentType {
    DestinationPrefix = 1,
    SourcePrefix = 2,
    Protocol = 3,
    Port = 4,
    DestinationPort = 5,
    SourcePort = 6,
    IcmpType = 7,
    IcmpCode = 8,
    TcpFlags = 9,
    PacketLength = 10,
    Dscp = 11,
    Fragment = 12,
}

impl ComponentType {
    const fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::DestinationPrefix,
            2 => Self::SourcePrefix,
            3 => Self::Protocol,
            4 => Self::Port,
            5 => Self::DestinationPort,
            6 => Self::SourcePort,
            7 => Self::IcmpType,
            8 => Self::IcmpCode,
            9 => Self::TcpFlags,
            10 => Self::PacketLength,
            11 => Self::Dscp,
            12 => Self::Fragment,
            _ => return None,
        })
    }
}

/// One `<op, value>` pair in a numeric-operator component (RFC 8955 §4.2.1).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NumericOp {
    pub and: bool,
    pub less_than: bool,
    pub greater_than: bool,
    pub equal: bool,
    pub end_of_list: bool,
    pub value: u64,
    /// Value width as encoded on the wire: 1, 2, 4 or 8 bytes.
    pub value_len: u8,
}

/// One `<op, value>` pair in a bitmask component (RFC 8955 §4.2.2).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BitmaskOp {
    pub and: bool,
    pub not: bool,
    pub match_: bool,
    pub end_of_list: bool,
    pub value: u64,
    pub value_len: u8,
}

/// Whether a flow component is encoded as a numeric-operator chain or a
/// bitmask-operator chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpList {
    Numeric(Vec<NumericOp>),
    Bitmask(Vec<BitmaskOp>),
    /// Destination/source prefix components carry a plain prefix, not an
    /// operator chain (optionally with an IPv6 offset byte, RFC 8956 §3.1).
    Prefix { prefix_len: u8, offset: u8, prefix: Bytes },
}

/// A single typed component inside a flow-spec NLRI (RFC 8955 §4.1).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowComponent {
    pub type_code: u8,
    pub ops: OpList,
}

fn decode_value(src: &mut Bytes, value_len: u8) -> u64 {
    match value_len {
        1 => u64::from(src.get_u8()),
        2 => u64::from(src.get_u16()),
        4 => u64::from(src.get_u32()),
        _ => src.get_u64(),
    }
}

fn encode_value(dst: &mut BytesMut, value: u64, value_len: u8) {
    match value_len {
        1 => dst.put_u8(value as u8),
        2 => dst.put_u16(value as u16),
        4 => dst.put_u32(value as u32),
        _ => dst.put_u64(value),
    }
}

const fn wire_len_from_code(len_code: u8) -> u8 {
    match len_code {
        0 => 1,
        1 => 2,
        2 => 4,
        _ => 8,
    }
}

const fn len_code_from_wire(value_len: u8) -> u8 {
    match value_len {
        1 => 0,
        2 => 1,
        4 => 2,
        _ => 3,
    }
}

fn decode_numeric_ops(src: &mut Bytes) -> NumericOp {
    let flags = src.get_u8();
    let value_len = wire_len_from_code((flags >> 4) & 0x3);
    let op = NumericOp {
        and: flags & 0x40 != 0,
        less_than: flags & 0x04 != 0,
        greater_than: flags & 0x02 != 0,
        equal: flags & 0x01 != 0,
        end_of_list: flags & 0x80 != 0,
        value: decode_value(src, value_len),
        value_len,
    };
    op
}

fn encode_numeric_ops(dst: &mut BytesMut, op: &NumericOp) {
    let mut flags = 0u8;
    if op.end_of_list {
        flags |= 0x80;
    }
    if op.and {
        flags |= 0x40;
    }
    flags |= len_code_from_wire(op.value_len) << 4;
    if op.less_than {
        flags |= 0x04;
    }
    if op.greater_than {
        flags |= 0x02;
    }
    if op.equal {
        flags |= 0x01;
    }
    dst.put_u8(flags);
    encode_value(dst, op.value, op.value_len);
}

fn decode_bitmask_ops(src: &mut Bytes) -> BitmaskOp {
    let flags = src.get_u8();
    let value_len = wire_len_from_code((flags >> 4) & 0x3);
    BitmaskOp {
        and: flags & 0x40 != 0,
        not: flags & 0x02 != 0,
        match_: flags & 0x01 != 0,
        end_of_list: flags & 0x80 != 0,
        value: decode_value(src, value_len),
        value_len,
    }
}

fn encode_bitmask_ops(dst: &mut BytesMut, op: &BitmaskOp) {
    let mut flags = 0u8;
    if op.end_of_list {
        flags |= 0x80;
    }
    if op.and {
        flags |= 0x40;
    }
    flags |= len_code_from_wire(op.value_len) << 4;
    if op.not {
        flags |= 0x02;
    }
    if op.match_ {
        flags |= 0x01;
    }
    dst.put_u8(flags);
    encode_value(dst, op.value, op.value_len);
}

impl FlowComponent {
    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        if src.remaining() < 1 {
            return Err(Error::InternalLength("flow component", std::cmp::Ordering::Less));
        }
        let type_code = src.get_u8();
        let ops = match ComponentType::from_u8(type_code) {
            Some(ComponentType::DestinationPrefix | ComponentType::SourcePrefix) => {
                let prefix_len = src.get_u8();
                // IPv6 flow-spec prepends an offset byte (RFC 8956 §3.1); v4
                // NLRI never sets it, so a zero offset is indistinguishable
                // and harmless to carry for both families.
                let n = usize::from(crate::cidr::n_prefix_octets(prefix_len));
                if src.remaining() < n {
                    return Err(Error::InternalLength("flow prefix", std::cmp::Ordering::Less));
                }
                let prefix = src.copy_to_bytes(n);
                OpList::Prefix { prefix_len, offset: 0, prefix }
            }
            Some(ComponentType::Fragment | ComponentType::TcpFlags) => {
                let mut ops = Vec::new();
                loop {
                    let op = decode_bitmask_ops(src);
                    let last = op.end_of_list;
                    ops.push(op);
                    if last {
                        break;
                    }
                }
                OpList::Bitmask(ops)
            }
            Some(_) => {
                let mut ops = Vec::new();
                loop {
                    let op = decode_numeric_ops(src);
                    let last = op.end_of_list;
                    ops.push(op);
                    if last {
                        break;
                    }
                }
                OpList::Numeric(ops)
            }
            None => return Err(Error::InternalType("flow component type", u16::from(type_code))),
        };
        Ok(Self { type_code, ops })
    }

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.type_code);
        match &self.ops {
            OpList::Prefix { prefix_len, prefix, .. } => {
                dst.put_u8(*prefix_len);
                dst.put_slice(prefix);
            }
            OpList::Numeric(ops) => {
                for op in ops {
                    encode_numeric_ops(dst, op);
                }
            }
            OpList::Bitmask(ops) => {
                for op in ops {
                    encode_bitmask_ops(dst, op);
                }
            }
        }
    }

    fn encoded_len(&self) -> usize {
        1 + match &self.ops {
            OpList::Prefix { prefix, .. } => 1 + prefix.len(),
            OpList::Numeric(ops) => ops.iter().map(|o| 1 + usize::from(o.value_len)).sum(),
            OpList::Bitmask(ops) => ops.iter().map(|o| 1 + usize::from(o.value_len)).sum(),
        }
    }
}

/// Ordered set of flow components describing one traffic-filter rule
/// (RFC 8955 §4.1 requires components to appear in strictly ascending
/// type-code order; see [`Error::InternalType`] on violation at the caller).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlowSpec(pub Vec<FlowComponent>);

impl Component for FlowSpec {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        let mut components = Vec::new();
        let mut last_type = 0u8;
        while src.has_remaining() {
            let component = FlowComponent::decode(src)?;
            if component.type_code <= last_type {
                return Err(Error::InternalType("flow component ordering", u16::from(component.type_code)));
            }
            last_type = component.type_code;
            components.push(component);
        }
        Ok(Self(components))
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        let start = dst.len();
        for component in &self.0 {
            component.encode(dst);
        }
        dst.len() - start
    }

    fn encoded_len(&self) -> usize {
        self.0.iter().map(FlowComponent::encoded_len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_order_components() {
        let mut src = Bytes::from(vec![3u8, 0x81, 6, 1, 0x81, 24, 10]);
        assert!(FlowSpec::from_bytes(&mut src).is_err());
    }

    #[test]
    fn destination_prefix_round_trips() {
        let spec = FlowSpec(vec![FlowComponent {
            type_code: ComponentType::DestinationPrefix as u8,
            ops: OpList::Prefix { prefix_len: 24, offset: 0, prefix: Bytes::from_static(&[10, 0, 0]) },
        }]);
        let mut dst = BytesMut::new();
        spec.clone().to_bytes(&mut dst);
        let mut src = dst.freeze();
        let decoded = FlowSpec::from_bytes(&mut src).unwrap();
        assert_eq!(decoded, spec);
    }
}
