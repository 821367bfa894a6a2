//! BGP message framing: marker/length/type header and the `Component` trait
//!
//! Grounded on the teacher's `src/bgp/endec.rs`: same `Component` trait,
//! same primitive-type impls, same `BgpCodec` shape. Generalized in two
//! ways the teacher never needed: a configurable `max_message_size` (the
//! teacher hardcoded 4096; this core raises it to 65535 once the
//! extended-message capability is negotiated) and a fifth `MessageType`
//! variant, `RouteRefresh`, which the teacher's accept-only RIR feeder had
//! no use for.

use crate::Error;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use enum_primitive_derive::Primitive;
#[cfg(feature = "tokio-endec")]
use num_traits::FromPrimitive;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
#[cfg(feature = "tokio-endec")]
use tokio_util::codec::{Decoder, Encoder};

#[cfg(feature = "tokio-endec")]
use crate::negotiation::Negotiation;
#[cfg(feature = "tokio-endec")]
use crate::{Message, Notification, Open, RouteRefresh, Update};

/// The default maximum BGP message size (RFC 4271 §4).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4096;

/// The maximum BGP message size once the extended-message capability
/// (draft-ietf-idr-bgp-extended-messages) has been negotiated.
pub const EXTENDED_MAX_MESSAGE_SIZE: usize = 65535;

/// BGP message header type octet (RFC 4271 §4.1, RFC 2918 for route-refresh).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Primitive)]
#[repr(u8)]
pub enum MessageType {
    Open = 1,
    Update = 2,
    Notification = 3,
    Keepalive = 4,
    RouteRefresh = 5,
}

/// BGP packet component with a fixed length or containing a length field.
pub trait Component {
    /// Decode the component from a buffer.
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error>
    where
        Self: Sized;

    /// Encode the component into a buffer. Returns the number of bytes written.
    fn to_bytes(self, dst: &mut BytesMut) -> usize;

    /// Find out the length of the component, preferably without encoding it.
    fn encoded_len(&self) -> usize;
}

impl Component for Ipv4Addr {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        let octets = src.get_u32();
        Ok(Self::from(octets))
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        dst.put_u32(self.into());
        4
    }

    fn encoded_len(&self) -> usize {
        4
    }
}

impl Component for Ipv6Addr {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        let mut octets = [0; 16];
        src.copy_to_slice(&mut octets);
        Ok(Self::from(octets))
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        dst.put_slice(&self.octets());
        16
    }

    fn encoded_len(&self) -> usize {
        16
    }
}

impl Component for IpAddr {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        if src.remaining() == 4 {
            Ok(Self::V4(Ipv4Addr::from_bytes(src)?))
        } else if src.remaining() == 16 {
            Ok(Self::V6(Ipv6Addr::from_bytes(src)?))
        } else {
            Err(Error::InternalLength("IP address", std::cmp::Ordering::Equal))
        }
    }

    fn to_bytes(self, dst: &mut BytesMut) -> usize {
        match self {
            Self::V4(addr) => addr.to_bytes(dst),
            Self::V6(addr) => addr.to_bytes(dst),
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            Self::V4(addr) => addr.encoded_len(),
            Self::V6(addr) => addr.encoded_len(),
        }
    }
}

macro_rules! impl_component_for_intn {
    ($typ:ty, $getter:ident, $putter:ident, $n:expr) => {
        impl Component for $typ {
            fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
                Ok(src.$getter())
            }

            fn to_bytes(self, dst: &mut BytesMut) -> usize {
                dst.$putter(self);
                $n
            }

            fn encoded_len(&self) -> usize {
                $n
            }
        }
    };
}

impl_component_for_intn!(u8, get_u8, put_u8, 1);
impl_component_for_intn!(u16, get_u16, put_u16, 2);
impl_component_for_intn!(u32, get_u32, put_u32, 4);
impl_component_for_intn!(u64, get_u64, put_u64, 8);

/// Frames BGP messages: 16-byte marker, 2-byte length, 1-byte type (RFC 4271 §4.1).
///
/// `max_message_size` starts at [`DEFAULT_MAX_MESSAGE_SIZE`] and is raised to
/// [`EXTENDED_MAX_MESSAGE_SIZE`] by the session layer once both peers
/// advertise the extended-message capability. The codec itself never
/// negotiates anything; it only enforces whatever limit it's told to.
///
/// It also carries the session's [`Negotiation`] outcome once the OPEN
/// exchange completes, so UPDATE decoding can interpret AS_PATH/AGGREGATOR
/// widths and per-family ADD-PATH prefixes correctly instead of guessing
/// from byte lengths. Before that point it decodes under the conservative
/// default (`Negotiation::default()`: 2-byte ASNs, no ADD-PATH).
#[derive(Clone, Debug)]
#[cfg(feature = "tokio-endec")]
pub struct BgpCodec {
    max_message_size: usize,
    negotiation: Negotiation,
}

#[cfg(feature = "tokio-endec")]
impl Default for BgpCodec {
    fn default() -> Self {
        Self { max_message_size: DEFAULT_MAX_MESSAGE_SIZE, negotiation: Negotiation::default() }
    }
}

#[cfg(feature = "tokio-endec")]
impl BgpCodec {
    #[must_use]
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size, negotiation: Negotiation::default() }
    }

    pub fn set_max_message_size(&mut self, max_message_size: usize) {
        self.max_message_size = max_message_size;
    }

    #[must_use]
    pub const fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Install the negotiated session outcome once the OPEN exchange completes.
    pub fn set_negotiation(&mut self, negotiation: Negotiation) {
        self.negotiation = negotiation;
    }
}

#[cfg(feature = "tokio-endec")]
impl Decoder for BgpCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < crate::MARKER.len() + 2 {
            return Ok(None);
        }
        // Header validation order (spec.md §4.1): marker, then length, then
        // type — a frame with both a bad marker and an out-of-range length
        // must be reported as the marker error, not the length one.
        if src[..crate::MARKER.len()] != crate::MARKER {
            return Err(Error::Marker);
        }
        let length = usize::from(u16::from_be_bytes([src[16], src[17]]));
        if length < 19 || length > self.max_message_size {
            return Err(Error::InternalLength("message header length", std::cmp::Ordering::Greater));
        }
        if src.len() < length {
            return Ok(None);
        }
        src.advance(16);
        log::trace!("valid BGP marker, length: {length}");
        let length = (src.get_u16() - 19) as usize;
        let msg_type = src.get_u8();
        let msg_type = MessageType::from_u8(msg_type).ok_or(Error::MessageType(msg_type))?;
        let mut buf = src.split_to(length).into();
        let packet = match msg_type {
            MessageType::Open => Message::Open(Open::from_bytes(&mut buf)?),
            MessageType::Update => Message::Update(Update::from_bytes_with(&mut buf, &self.negotiation)?),
            MessageType::Notification => Message::Notification(Notification::from_bytes(&mut buf)?),
            MessageType::Keepalive => Message::Keepalive,
            MessageType::RouteRefresh => Message::RouteRefresh(RouteRefresh::from_bytes(&mut buf)?),
        };
        if buf.has_remaining() {
            log::debug!("remaining bytes after decoding: {buf:?}");
            Err(Error::InternalLength("message", std::cmp::Ordering::Greater))
        } else {
            Ok(Some(packet))
        }
    }
}

#[cfg(feature = "tokio-endec")]
impl Encoder<Message> for BgpCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_slice(&crate::MARKER);
        let len_pos = dst.len();
        dst.put_u16(0);
        let len = match item {
            Message::Open(msg) => {
                dst.put_u8(MessageType::Open as u8);
                msg.to_bytes(dst)
            }
            Message::Update(msg) => {
                dst.put_u8(MessageType::Update as u8);
                msg.to_bytes(dst)
            }
            Message::Notification(msg) => {
                dst.put_u8(MessageType::Notification as u8);
                msg.to_bytes(dst)
            }
            Message::Keepalive => {
                dst.put_u8(MessageType::Keepalive as u8);
                0
            }
            Message::RouteRefresh(msg) => {
                dst.put_u8(MessageType::RouteRefresh as u8);
                msg.to_bytes(dst)
            }
        };
        let len = u16::try_from(len + 19).expect("message length overflow");
        let len_bytes = len.to_be_bytes();
        dst[len_pos] = len_bytes[0];
        dst[len_pos + 1] = len_bytes[1];
        Ok(())
    }
}

#[cfg(test)]
#[cfg(feature = "tokio-endec")]
mod tests {
    use super::*;

    #[test]
    fn keepalive_round_trips_through_codec() {
        let mut codec = BgpCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(Message::Keepalive, &mut buf).unwrap();
        assert_eq!(buf.len(), 19);
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(decoded, Message::Keepalive));
        assert!(buf.is_empty());
    }

    #[test]
    fn bad_marker_is_rejected() {
        let mut codec = BgpCodec::default();
        let mut buf = BytesMut::new();
        buf.put_slice(&[0u8; 16]);
        buf.put_u16(19);
        buf.put_u8(MessageType::Keepalive as u8);
        assert!(matches!(codec.decode(&mut buf), Err(Error::Marker)));
    }

    #[test]
    fn bad_marker_takes_precedence_over_bad_length() {
        // spec.md §4.1: marker is validated before length. A frame with
        // both a bad marker and an out-of-range length must report
        // `Error::Marker`, not the length error.
        let mut codec = BgpCodec::default();
        let mut buf = BytesMut::new();
        buf.put_slice(&[0u8; 16]);
        buf.put_u16(18);
        assert!(matches!(codec.decode(&mut buf), Err(Error::Marker)));
    }

    #[test]
    fn length_below_minimum_is_rejected() {
        let mut codec = BgpCodec::default();
        let mut buf = BytesMut::new();
        buf.put_slice(&crate::MARKER);
        buf.put_u16(18);
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn length_above_negotiated_max_is_rejected() {
        let mut codec = BgpCodec::new(DEFAULT_MAX_MESSAGE_SIZE);
        let mut buf = BytesMut::new();
        buf.put_slice(&crate::MARKER);
        buf.put_u16(u16::try_from(DEFAULT_MAX_MESSAGE_SIZE + 1).unwrap());
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn unrecognised_type_is_rejected() {
        let mut codec = BgpCodec::default();
        let mut buf = BytesMut::new();
        buf.put_slice(&crate::MARKER);
        buf.put_u16(19);
        buf.put_u8(9);
        assert!(matches!(codec.decode(&mut buf), Err(Error::MessageType(9))));
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let mut codec = BgpCodec::default();
        let mut buf = BytesMut::new();
        buf.put_slice(&crate::MARKER);
        buf.put_u16(19);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }
}
