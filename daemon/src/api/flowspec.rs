//! Flow-spec `match { ... } then { ... }` clause parser (spec.md §4.5/§6):
//! translates the API channel's flow-spec text grammar into a
//! [`bgpcore::nlri::flowspec::FlowSpec`] plus the traffic-action extended
//! communities its `then` clause implies.
//!
//! Grounded on `bgpcore::nlri::flowspec`'s component catalogue for the
//! `match` side; the `then` action set (`discard`/`rate-limit`/`redirect`)
//! is exabgp's flow-route vocabulary, mapped onto the wire-exact RFC 8955
//! §5 traffic-action extended communities already modeled in
//! `bgpcore::path::communities::ExtendedCommunity`.

use bgpcore::nlri::flowspec::{ComponentType, FlowComponent, FlowSpec, NumericOp, OpList};
use bgpcore::path::communities::ExtendedCommunity;
use bytes::Bytes;
use std::net::Ipv4Addr;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown match key '{0}'")]
    UnknownMatchKey(String),
    #[error("unknown then action '{0}'")]
    UnknownAction(String),
    #[error("malformed value for '{key}': {value}")]
    BadValue { key: String, value: String },
    #[error("missing 'match {{ ... }}' block")]
    MissingMatch,
    #[error("missing 'then {{ ... }}' block")]
    MissingThen,
    #[error("unterminated block")]
    Unterminated,
}

/// The parsed form of one `announce flow route { match {...} then {...} }`
/// command: a flow-spec NLRI plus the extended communities its actions add.
#[derive(Clone, Debug)]
pub struct FlowRoute {
    pub flow: FlowSpec,
    pub actions: Vec<ExtendedCommunity>,
}

/// Parses the body between `announce flow route {` and its matching `}`.
pub fn parse(body: &str) -> Result<FlowRoute, Error> {
    let body = body.trim();
    let match_body = extract_block(body, "match").ok_or(Error::MissingMatch)?;
    let then_body = extract_block(body, "then").ok_or(Error::MissingThen)?;

    let mut components = Vec::new();
    for stmt in match_body.split(';') {
        let stmt = stmt.trim();
        if stmt.is_empty() {
            continue;
        }
        components.push(parse_match_stmt(stmt)?);
    }
    components.sort_by_key(|c| c.type_code);

    let mut actions = Vec::new();
    for stmt in then_body.split(';') {
        let stmt = stmt.trim();
        if stmt.is_empty() {
            continue;
        }
        actions.push(parse_then_stmt(stmt)?);
    }

    Ok(FlowRoute { flow: FlowSpec(components), actions })
}

/// Finds `keyword { ... }` inside `body` and returns the inner text.
fn extract_block<'a>(body: &'a str, keyword: &str) -> Option<&'a str> {
    let start = body.find(keyword)?;
    let rest = &body[start + keyword.len()..];
    let open = rest.find('{')?;
    let mut depth = 0usize;
    for (i, ch) in rest[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&rest[open + 1..open + i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_match_stmt(stmt: &str) -> Result<FlowComponent, Error> {
    let mut parts = stmt.splitn(2, char::is_whitespace);
    let key = parts.next().unwrap_or_default();
    let value = parts.next().unwrap_or_default().trim();
    match key {
        "destination" => Ok(prefix_component(ComponentType::DestinationPrefix, value)?),
        "source" => Ok(prefix_component(ComponentType::SourcePrefix, value)?),
        "protocol" => numeric_component(ComponentType::Protocol, value, protocol_number),
        "port" => numeric_component(ComponentType::Port, value, |s| s.parse().ok()),
        "destination-port" => numeric_component(ComponentType::DestinationPort, value, |s| s.parse().ok()),
        "source-port" => numeric_component(ComponentType::SourcePort, value, |s| s.parse().ok()),
        "icmp-type" => numeric_component(ComponentType::IcmpType, value, |s| s.parse().ok()),
        "icmp-code" => numeric_component(ComponentType::IcmpCode, value, |s| s.parse().ok()),
        "packet-length" => numeric_component(ComponentType::PacketLength, value, |s| s.parse().ok()),
        "dscp" => numeric_component(ComponentType::Dscp, value, |s| s.parse().ok()),
        other => Err(Error::UnknownMatchKey(other.to_string())),
    }
}

/// `=80`, `>1024`, `<1024`, or a bare number meaning `=`.
fn parse_numeric_op(token: &str) -> Option<(bool, bool, bool, u64)> {
    let (op, rest) = if let Some(rest) = token.strip_prefix(">=") {
        (3u8, rest)
    } else if let Some(rest) = token.strip_prefix("<=") {
        (4u8, rest)
    } else if let Some(rest) = token.strip_prefix('>') {
        (1u8, rest)
    } else if let Some(rest) = token.strip_prefix('<') {
        (2u8, rest)
    } else if let Some(rest) = token.strip_prefix('=') {
        (0u8, rest)
    } else {
        (0u8, token)
    };
    let value: u64 = rest.parse().ok()?;
    let (less_than, greater_than, equal) = match op {
        0 => (false, false, true),
        1 => (false, true, false),
        2 => (true, false, false),
        3 => (false, true, true),
        4 => (true, false, true),
        _ => unreachable!(),
    };
    Some((less_than, greater_than, equal, value))
}

fn value_len_for(value: u64) -> u8 {
    if value <= u64::from(u8::MAX) {
        1
    } else if value <= u64::from(u16::MAX) {
        2
    } else if value <= u64::from(u32::MAX) {
        4
    } else {
        8
    }
}

fn numeric_component(type_: ComponentType, value: &str, resolve: impl Fn(&str) -> Option<u64>) -> Result<FlowComponent, Error> {
    let tokens: Vec<&str> = value.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    if tokens.is_empty() {
        return Err(Error::BadValue { key: format!("{type_:?}"), value: value.to_string() });
    }
    let mut ops = Vec::with_capacity(tokens.len());
    let last = tokens.len() - 1;
    for (i, token) in tokens.iter().enumerate() {
        let resolved = resolve(token).or_else(|| parse_numeric_op(token).map(|(_, _, _, v)| v));
        let Some(raw) = resolved else {
            return Err(Error::BadValue { key: format!("{type_:?}"), value: (*token).to_string() });
        };
        let (less_than, greater_than, equal, value) = parse_numeric_op(token).unwrap_or((false, false, true, raw));
        ops.push(NumericOp {
            and: i > 0,
            less_than,
            greater_than,
            equal,
            end_of_list: i == last,
            value,
            value_len: value_len_for(value),
        });
    }
    Ok(FlowComponent { type_code: type_ as u8, ops: OpList::Numeric(ops) })
}

fn protocol_number(name: &str) -> Option<u64> {
    Some(match name.to_ascii_lowercase().as_str() {
        "icmp" => 1,
        "tcp" => 6,
        "udp" => 17,
        other => return other.parse().ok(),
    })
}

fn prefix_component(type_: ComponentType, value: &str) -> Result<FlowComponent, Error> {
    let (addr, len) = value.split_once('/').ok_or_else(|| Error::BadValue { key: format!("{type_:?}"), value: value.to_string() })?;
    let addr = Ipv4Addr::from_str(addr).map_err(|_| Error::BadValue { key: format!("{type_:?}"), value: value.to_string() })?;
    let prefix_len: u8 = len.parse().map_err(|_| Error::BadValue { key: format!("{type_:?}"), value: value.to_string() })?;
    let n_octets = usize::from(prefix_len.div_ceil(8));
    let prefix = Bytes::copy_from_slice(&addr.octets()[..n_octets]);
    Ok(FlowComponent { type_code: type_ as u8, ops: OpList::Prefix { prefix_len, offset: 0, prefix } })
}

fn parse_then_stmt(stmt: &str) -> Result<ExtendedCommunity, Error> {
    let mut parts = stmt.splitn(2, char::is_whitespace);
    let action = parts.next().unwrap_or_default();
    let arg = parts.next().unwrap_or_default().trim();
    match action {
        "discard" => Ok(ExtendedCommunity::Chso { flags: 0, value: 0 }),
        "rate-limit" => {
            let rate: f32 = arg.parse().map_err(|_| Error::BadValue { key: "rate-limit".to_string(), value: arg.to_string() })?;
            Ok(ExtendedCommunity::Bandwidth { asn: 0, bandwidth: rate })
        }
        "redirect" => {
            let (asn, value) = arg.split_once(':').ok_or_else(|| Error::BadValue { key: "redirect".to_string(), value: arg.to_string() })?;
            let asn: u16 = asn.parse().map_err(|_| Error::BadValue { key: "redirect".to_string(), value: arg.to_string() })?;
            let value: u32 = value.parse().map_err(|_| Error::BadValue { key: "redirect".to_string(), value: arg.to_string() })?;
            Ok(ExtendedCommunity::RouteTarget2Byte { asn, value })
        }
        other => Err(Error::UnknownAction(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_match_and_then() {
        let route = parse("match { destination 10.0.0.0/24; protocol tcp; destination-port =80; } then { discard; }").unwrap();
        assert_eq!(route.flow.0.len(), 3);
        assert_eq!(route.flow.0[0].type_code, ComponentType::DestinationPrefix as u8);
        assert_eq!(route.flow.0[1].type_code, ComponentType::Protocol as u8);
        assert_eq!(route.flow.0[2].type_code, ComponentType::DestinationPort as u8);
        assert!(matches!(route.actions[0], ExtendedCommunity::Chso { .. }));
    }

    #[test]
    fn rejects_unknown_match_key() {
        assert!(parse("match { nonsense 1; } then { discard; }").is_err());
    }
}
