//! Compact NLRI prefix encoding shared by RFC 4271's base UPDATE NLRI field
//! and the unicast/multicast families carried inside MP_REACH_NLRI /
//! MP_UNREACH_NLRI.
//!
//! Grounded on the teacher's `src/bgp/route.rs`, kept essentially unchanged:
//! same `Value`/`Routes` shape. Message-size packing itself now lives in
//! [`crate::rib::build_updates`], generalized to every family's
//! [`crate::nlri::Nlri`] rather than just this module's prefix `Value`.

use crate::cidr::{n_prefix_octets, Cidr, Cidr4, Cidr6};
use crate::endec::Component;
use crate::Error;
use bytes::{Buf, BufMut, Bytes};
use std::ops::Deref;

/// One minimal-byte-length prefix: a prefix length plus just enough octets
/// to hold it (RFC 4271 §4.3 "Network Layer Reachability Information").
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "impl-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Value {
    pub prefix_len: u8,
    pub prefix: Bytes,
}

/// A list of [`Value`] prefixes, encoded back-to-back with no overall
/// length field (the container supplies that, e.g. the withdrawn-routes
/// length or the attribute length of an MP_REACH_NLRI).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Routes(pub Vec<Value>);

impl Component for Routes {
    fn from_bytes(src: &mut Bytes) -> Result<Self, Error> {
        let mut routes = Vec::new();
        while src.has_remaining() {
            let prefix_len = src.get_u8();
            let n = n_prefix_octets(prefix_len);
            if src.remaining() < n {
                return Err(Error::InternalLength("NLRI prefix", std::cmp::Ordering::Less));
            }
            let prefix = src.split_to(n);
            routes.push(Value { prefix_len, prefix });
        }
        Ok(Self(routes))
    }

    fn to_bytes(self, dst: &mut bytes::BytesMut) -> usize {
        let mut len = 0;
        for route in self.0 {
            dst.put_u8(route.prefix_len);
            dst.put_slice(&route.prefix);
            len += 1 + route.prefix.len();
        }
        len
    }

    fn encoded_len(&self) -> usize {
        Self::slice_encoded_len(&self.0)
    }
}

impl Deref for Routes {
    type Target = Vec<Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Routes {
    fn slice_encoded_len(routes: &[Value]) -> usize {
        routes.iter().map(|r| 1 + r.prefix.len()).sum()
    }
}

impl<I, T> From<I> for Routes
where
    I: IntoIterator<Item = T>,
    T: Into<Value>,
{
    fn from(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Cidr4> for Value {
    fn from(cidr: Cidr4) -> Self {
        let prefix_len = cidr.prefix_len;
        let n = n_prefix_octets(prefix_len);
        let prefix = Bytes::copy_from_slice(&cidr.addr.octets()[..n]);
        Self { prefix_len, prefix }
    }
}

impl From<Cidr6> for Value {
    fn from(cidr: Cidr6) -> Self {
        let prefix_len = cidr.prefix_len;
        let n = n_prefix_octets(prefix_len);
        let prefix = Bytes::copy_from_slice(&cidr.addr.octets()[..n]);
        Self { prefix_len, prefix }
    }
}

impl From<&Cidr4> for Value {
    fn from(cidr: &Cidr4) -> Self {
        Self::from(*cidr)
    }
}

impl From<&Cidr6> for Value {
    fn from(cidr: &Cidr6) -> Self {
        Self::from(*cidr)
    }
}

impl From<Cidr> for Value {
    fn from(cidr: Cidr) -> Self {
        match cidr {
            Cidr::V4(cidr) => cidr.into(),
            Cidr::V6(cidr) => cidr.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex_to_bytes;
    use bytes::BytesMut;

    #[test]
    fn convert_cidr_to_route_on_boundary() {
        let cidr4 = Cidr4::new("127.0.0.0".parse().unwrap(), 8);
        let route4 = Value::from(cidr4);
        assert_eq!(route4.prefix, hex_to_bytes("7f"));
        assert_eq!(route4.prefix_len, 8);
    }

    #[test]
    fn convert_cidr_to_route_off_boundary() {
        let cidr4 = Cidr4::new("172.24.0.0".parse().unwrap(), 12);
        let route4 = Value::from(cidr4);
        assert_eq!(route4.prefix, hex_to_bytes("ac18"));
        assert_eq!(route4.prefix_len, 12);
    }

    #[test]
    fn routes_v4_round_trip() {
        let routes_bytes = hex_to_bytes(
            "
        18 cb1441
        0f 31d0
        16 2d7a5c",
        );
        let routes = Routes::from_bytes(&mut routes_bytes.clone()).unwrap();
        assert_eq!(routes.0.len(), 3);
        assert_eq!(routes.0[0], Value::from(Cidr4::new("203.20.65.0".parse().unwrap(), 24)));
        let mut out = BytesMut::new();
        routes.to_bytes(&mut out);
        assert_eq!(out.freeze(), routes_bytes);
    }
}
