//! Simple CIDR block representation

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// A IPv4 CIDR block
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "impl-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cidr4 {
    pub addr: Ipv4Addr,
    pub prefix_len: u8,
}

impl fmt::Display for Cidr4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl Cidr4 {
    #[must_use]
    pub const fn new(addr: Ipv4Addr, prefix_len: u8) -> Self {
        Self { addr, prefix_len }
    }
}

/// A IPv6 CIDR block
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "impl-serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cidr6 {
    pub addr: Ipv6Addr,
    pub prefix_len: u8,
}

impl fmt::Display for Cidr6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

impl Cidr6 {
    #[must_use]
    pub const fn new(addr: Ipv6Addr, prefix_len: u8) -> Self {
        Self { addr, prefix_len }
    }
}

/// A CIDR block, either family
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "impl-serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Cidr {
    V4(Cidr4),
    V6(Cidr6),
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4(cidr) => write!(f, "{cidr}"),
            Self::V6(cidr) => write!(f, "{cidr}"),
        }
    }
}

impl Cidr {
    #[must_use]
    pub const fn into_parts(self) -> (IpAddr, u8) {
        match self {
            Self::V4(cidr) => (IpAddr::V4(cidr.addr), cidr.prefix_len),
            Self::V6(cidr) => (IpAddr::V6(cidr.addr), cidr.prefix_len),
        }
    }

    #[must_use]
    pub const fn prefix_len(&self) -> u8 {
        match self {
            Self::V4(cidr) => cidr.prefix_len,
            Self::V6(cidr) => cidr.prefix_len,
        }
    }
}

impl From<Cidr4> for Cidr {
    fn from(cidr: Cidr4) -> Self {
        Self::V4(cidr)
    }
}

impl From<Cidr6> for Cidr {
    fn from(cidr: Cidr6) -> Self {
        Self::V6(cidr)
    }
}

/// Compute the number of octets needed to hold `prefix_len` bits
#[must_use]
pub fn n_prefix_octets(prefix_len: u8) -> usize {
    #[allow(clippy::verbose_bit_mask)]
    let result = if prefix_len & 0x07 == 0 {
        prefix_len >> 3
    } else {
        (prefix_len >> 3) + 1
    };
    usize::from(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn n_prefix_octets_rounds_up_to_whole_bytes() {
        assert_eq!(n_prefix_octets(0), 0);
        assert_eq!(n_prefix_octets(1), 1);
        assert_eq!(n_prefix_octets(8), 1);
        assert_eq!(n_prefix_octets(9), 2);
        assert_eq!(n_prefix_octets(24), 3);
        assert_eq!(n_prefix_octets(32), 4);
        assert_eq!(n_prefix_octets(128), 16);
    }

    #[test]
    fn display_matches_prefix_notation() {
        let v4 = Cidr::V4(Cidr4::new(Ipv4Addr::new(192, 0, 2, 0), 24));
        assert_eq!(v4.to_string(), "192.0.2.0/24");
        assert_eq!(v4.prefix_len(), 24);
    }
}
