//! API channel command grammar (spec.md §4.5/§6): parses one line of the
//! compact text form into a [`Command`]. The JSON encoding carries the same
//! commands as `{"type": "command", ...}` envelopes; `parse` dispatches on
//! the caller's chosen [`super::Encoding`].

use super::flowspec::{self, FlowRoute};
use super::Encoding;
use bgpcore::afi::{Afi, Family, Safi};
use bgpcore::nlri::Nlri;
use bgpcore::path::communities::{Communities, Community, LargeCommunities, LargeCommunity};
use bgpcore::path::{AsPath, AsSegment, AsSegmentType, Data, Flags, Origin, PathAttributes, Value};
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("missing argument for '{0}'")]
    MissingArgument(&'static str),
    #[error("malformed value for '{key}': {value}")]
    BadValue { key: &'static str, value: String },
    #[error("unknown address family '{0}'")]
    UnknownFamily(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Flowspec(#[from] flowspec::Error),
}

/// One decoded API channel command, already resolved to the peers it
/// targets (empty = "all", per spec.md §4.5).
#[derive(Clone, Debug)]
pub struct Command {
    pub neighbors: Vec<IpAddr>,
    pub action: Action,
}

#[derive(Clone, Debug)]
pub enum Action {
    AnnounceRoute { nlri: Nlri, family: Family, next_hop: Option<IpAddr>, attributes: PathAttributes },
    WithdrawRoute { nlri: Nlri, family: Family },
    AnnounceFlow(FlowRoute),
    AnnounceEor { family: Family },
    AnnounceRouteRefresh { family: Family },
    Teardown { subcode: u8 },
    ShowNeighbors,
    ShowAdjRibIn,
    ShowAdjRibOut,
    Reload,
    Shutdown,
    AnnounceWatchdog { name: String },
    WithdrawWatchdog { name: String },
}

/// Parses one line, peeling off an optional leading `neighbor <ip>[, neighbor <ip>]*`
/// selector before dispatching on the verb.
pub fn parse(line: &str, encoding: Encoding) -> Result<Command, Error> {
    if encoding == Encoding::Json {
        return parse_json(line);
    }
    let line = line.trim();
    if line.is_empty() {
        return Err(Error::Empty);
    }
    let (neighbors, rest) = strip_neighbor_selector(line)?;
    let action = parse_action(rest)?;
    Ok(Command { neighbors, action })
}

fn strip_neighbor_selector(line: &str) -> Result<(Vec<IpAddr>, &str), Error> {
    let mut neighbors = Vec::new();
    let mut rest = line;
    while let Some(after) = rest.strip_prefix("neighbor ") {
        let (addr_tok, tail) = after.split_once(char::is_whitespace).unwrap_or((after, ""));
        let addr_tok = addr_tok.trim_end_matches(',');
        let addr = IpAddr::from_str(addr_tok).map_err(|_| Error::BadValue { key: "neighbor", value: addr_tok.to_string() })?;
        neighbors.push(addr);
        rest = tail.trim_start();
        if let Some(stripped) = rest.strip_prefix(',') {
            rest = stripped.trim_start();
        } else {
            break;
        }
    }
    Ok((neighbors, rest))
}

fn parse_action(rest: &str) -> Result<Action, Error> {
    let (verb, tail) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let tail = tail.trim();
    match verb {
        "announce" => parse_announce(tail),
        "withdraw" => parse_withdraw(tail),
        "teardown" => {
            let value = tail.split_whitespace().next().ok_or(Error::MissingArgument("teardown"))?;
            let subcode: u8 = value.parse().map_err(|_| Error::BadValue { key: "teardown", value: value.to_string() })?;
            Ok(Action::Teardown { subcode })
        }
        "show" => parse_show(tail),
        "reload" => Ok(Action::Reload),
        "shutdown" => Ok(Action::Shutdown),
        other => Err(Error::Unknown(other.to_string())),
    }
}

fn parse_show(tail: &str) -> Result<Action, Error> {
    match tail {
        "neighbor" | "neighbors" => Ok(Action::ShowNeighbors),
        "adj-rib-in" => Ok(Action::ShowAdjRibIn),
        "adj-rib-out" => Ok(Action::ShowAdjRibOut),
        other => Err(Error::Unknown(format!("show {other}"))),
    }
}

fn parse_announce(tail: &str) -> Result<Action, Error> {
    let (kind, tail) = tail.split_once(char::is_whitespace).unwrap_or((tail, ""));
    let tail = tail.trim();
    match kind {
        "route" => parse_announce_route(tail),
        "flow" => {
            let body = tail.strip_prefix("route").map_or(tail, str::trim_start);
            Ok(Action::AnnounceFlow(flowspec::parse(body)?))
        }
        "eor" => Ok(Action::AnnounceEor { family: parse_family(tail)? }),
        "route-refresh" => Ok(Action::AnnounceRouteRefresh { family: parse_family(tail)? }),
        "watchdog" => Ok(Action::AnnounceWatchdog { name: tail.to_string() }),
        other => Err(Error::Unknown(format!("announce {other}"))),
    }
}

fn parse_withdraw(tail: &str) -> Result<Action, Error> {
    let (kind, tail) = tail.split_once(char::is_whitespace).unwrap_or((tail, ""));
    let tail = tail.trim();
    match kind {
        "route" => parse_withdraw_route(tail),
        "watchdog" => Ok(Action::WithdrawWatchdog { name: tail.to_string() }),
        other => Err(Error::Unknown(format!("withdraw {other}"))),
    }
}

fn parse_family(tail: &str) -> Result<Family, Error> {
    let mut parts = tail.split_whitespace();
    let afi = parts.next().ok_or(Error::MissingArgument("afi"))?;
    let safi = parts.next().ok_or(Error::MissingArgument("safi"))?;
    let afi = match afi {
        "ipv4" => Afi::Ipv4,
        "ipv6" => Afi::Ipv6,
        "l2vpn" => Afi::L2vpn,
        "bgp-ls" => Afi::BgpLs,
        other => return Err(Error::UnknownFamily(other.to_string())),
    };
    let safi = match safi {
        "unicast" => Safi::Unicast,
        "multicast" => Safi::Multicast,
        "labelled-unicast" | "labeled-unicast" => Safi::MplsLabel,
        "mpls-vpn" => Safi::MplsVpn,
        "flow" => Safi::Flowspec,
        "flow-vpn" => Safi::FlowspecVpn,
        "evpn" => Safi::Evpn,
        "vpls" => Safi::Vpls,
        "mvpn" => Safi::Mvpn,
        "mup" => Safi::Mup,
        "rtc" => Safi::Rtc,
        "bgp-ls" => Safi::BgpLs,
        other => return Err(Error::UnknownFamily(other.to_string())),
    };
    Ok(Family::new(afi, safi))
}

fn parse_prefix(token: &str) -> Result<(Nlri, Family), Error> {
    let (addr, len) = token.split_once('/').ok_or_else(|| Error::BadValue { key: "prefix", value: token.to_string() })?;
    let prefix_len: u8 = len.parse().map_err(|_| Error::BadValue { key: "prefix", value: token.to_string() })?;
    if let Ok(v4) = Ipv4Addr::from_str(addr) {
        let n = usize::from(prefix_len.div_ceil(8));
        let prefix = bytes::Bytes::copy_from_slice(&v4.octets()[..n]);
        Ok((Nlri::Ipv4Unicast(bgpcore::route::Value { prefix_len, prefix }), Family::IPV4_UNICAST))
    } else {
        let v6 = std::net::Ipv6Addr::from_str(addr).map_err(|_| Error::BadValue { key: "prefix", value: token.to_string() })?;
        let n = usize::from(prefix_len.div_ceil(8));
        let prefix = bytes::Bytes::copy_from_slice(&v6.octets()[..n]);
        Ok((Nlri::Ipv6Unicast(bgpcore::route::Value { prefix_len, prefix }), Family::IPV6_UNICAST))
    }
}

fn parse_announce_route(tail: &str) -> Result<Action, Error> {
    let mut tokens = tail.split_whitespace().peekable();
    let prefix_tok = tokens.next().ok_or(Error::MissingArgument("prefix"))?;
    let (nlri, family) = parse_prefix(prefix_tok)?;
    let mut next_hop = None;
    let mut attrs: Vec<Value> = vec![Value { flags: Flags::WELL_KNOWN_COMPLETE, data: Data::Origin(Origin::Igp) }, Value { flags: Flags::WELL_KNOWN_COMPLETE, data: Data::AsPath(AsPath(Vec::new())) }];
    while let Some(key) = tokens.next() {
        match key {
            "next-hop" => {
                let value = tokens.next().ok_or(Error::MissingArgument("next-hop"))?;
                next_hop = Some(IpAddr::from_str(value).map_err(|_| Error::BadValue { key: "next-hop", value: value.to_string() })?);
            }
            "origin" => {
                let value = tokens.next().ok_or(Error::MissingArgument("origin"))?;
                let origin = match value {
                    "igp" => Origin::Igp,
                    "egp" => Origin::Egp,
                    "incomplete" => Origin::Incomplete,
                    other => return Err(Error::BadValue { key: "origin", value: other.to_string() }),
                };
                replace_attr(&mut attrs, Flags::WELL_KNOWN_COMPLETE, Data::Origin(origin));
            }
            "as-path" => {
                let list = collect_bracketed(&mut tokens)?;
                let asns = list.iter().map(|s| s.parse::<u32>().map_err(|_| Error::BadValue { key: "as-path", value: s.clone() })).collect::<Result<Vec<_>, _>>()?;
                let as4 = asns.iter().any(|&a| a > u32::from(u16::MAX));
                let segment = AsSegment { type_: AsSegmentType::AsSequence, asns, as4 };
                replace_attr(&mut attrs, Flags::WELL_KNOWN_COMPLETE, Data::AsPath(AsPath(vec![segment])));
            }
            "local-preference" => {
                let value = tokens.next().ok_or(Error::MissingArgument("local-preference"))?;
                let value: u32 = value.parse().map_err(|_| Error::BadValue { key: "local-preference", value: value.to_string() })?;
                replace_attr(&mut attrs, Flags::WELL_KNOWN_COMPLETE, Data::LocalPref(value));
            }
            "med" => {
                let value = tokens.next().ok_or(Error::MissingArgument("med"))?;
                let value: u32 = value.parse().map_err(|_| Error::BadValue { key: "med", value: value.to_string() })?;
                replace_attr(&mut attrs, Flags::OPTIONAL_NON_TRANSITIVE, Data::MultiExitDisc(value));
            }
            "community" => {
                let value = tokens.next().ok_or(Error::MissingArgument("community"))?;
                let community = parse_community(value)?;
                merge_community(&mut attrs, community);
            }
            "large-community" => {
                let value = tokens.next().ok_or(Error::MissingArgument("large-community"))?;
                let community = parse_large_community(value)?;
                merge_large_community(&mut attrs, community);
            }
            other => return Err(Error::Unknown(format!("announce route attribute '{other}'"))),
        }
    }
    Ok(Action::AnnounceRoute { nlri, family, next_hop, attributes: PathAttributes(attrs) })
}

fn parse_withdraw_route(tail: &str) -> Result<Action, Error> {
    let prefix_tok = tail.split_whitespace().next().ok_or(Error::MissingArgument("prefix"))?;
    let (nlri, family) = parse_prefix(prefix_tok)?;
    Ok(Action::WithdrawRoute { nlri, family })
}

fn collect_bracketed<'a>(tokens: &mut std::iter::Peekable<impl Iterator<Item = &'a str>>) -> Result<Vec<String>, Error> {
    let mut out = Vec::new();
    let first = tokens.next().ok_or(Error::MissingArgument("as-path"))?;
    let first = first.trim_start_matches('[');
    if let Some(last) = first.strip_suffix(']') {
        if !last.is_empty() {
            out.push(last.to_string());
        }
        return Ok(out);
    }
    if !first.is_empty() {
        out.push(first.to_string());
    }
    for token in tokens.by_ref() {
        if let Some(last) = token.strip_suffix(']') {
            if !last.is_empty() {
                out.push(last.to_string());
            }
            return Ok(out);
        }
        out.push(token.to_string());
    }
    Err(Error::BadValue { key: "as-path", value: "unterminated list".to_string() })
}

fn parse_community(value: &str) -> Result<Community, Error> {
    match value {
        "no-export" => Ok(Community::NO_EXPORT),
        "no-advertise" => Ok(Community::NO_ADVERTISE),
        "no-export-subconfed" => Ok(Community::NO_EXPORT_SUBCONFED),
        other => {
            let (asn, val) = other.split_once(':').ok_or_else(|| Error::BadValue { key: "community", value: other.to_string() })?;
            let asn: u16 = asn.parse().map_err(|_| Error::BadValue { key: "community", value: other.to_string() })?;
            let val: u16 = val.parse().map_err(|_| Error::BadValue { key: "community", value: other.to_string() })?;
            Ok(Community((u32::from(asn) << 16) | u32::from(val)))
        }
    }
}

fn parse_large_community(value: &str) -> Result<LargeCommunity, Error> {
    let mut parts = value.splitn(3, ':');
    let global_admin = parts.next().ok_or(Error::MissingArgument("large-community"))?;
    let local_data1 = parts.next().ok_or(Error::MissingArgument("large-community"))?;
    let local_data2 = parts.next().ok_or(Error::MissingArgument("large-community"))?;
    let bad = |s: &str| Error::BadValue { key: "large-community", value: s.to_string() };
    Ok(LargeCommunity {
        global_admin: global_admin.parse().map_err(|_| bad(value))?,
        local_data1: local_data1.parse().map_err(|_| bad(value))?,
        local_data2: local_data2.parse().map_err(|_| bad(value))?,
    })
}

fn replace_attr(attrs: &mut Vec<Value>, flags: Flags, data: Data) {
    let code = u8::from(&data);
    attrs.retain(|v| u8::from(&v.data) != code);
    attrs.push(Value { flags, data });
}

fn merge_community(attrs: &mut Vec<Value>, community: Community) {
    for attr in attrs.iter_mut() {
        if let Data::Communities(Communities(list)) = &mut attr.data {
            list.push(community);
            return;
        }
    }
    attrs.push(Value { flags: Flags(0xc0), data: Data::Communities(Communities(vec![community])) });
}

fn merge_large_community(attrs: &mut Vec<Value>, community: LargeCommunity) {
    for attr in attrs.iter_mut() {
        if let Data::LargeCommunities(LargeCommunities(list)) = &mut attr.data {
            list.push(community);
            return;
        }
    }
    attrs.push(Value { flags: Flags(0xc0), data: Data::LargeCommunities(LargeCommunities(vec![community])) });
}

fn parse_json(line: &str) -> Result<Command, Error> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    let text = value.get("command").and_then(serde_json::Value::as_str).ok_or_else(|| Error::BadValue { key: "command", value: line.to_string() })?;
    parse(text, Encoding::Text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_announce_route_with_attributes() {
        let cmd = parse("announce route 192.0.2.0/24 next-hop 10.0.0.1 origin igp local-preference 100", Encoding::Text).unwrap();
        assert!(cmd.neighbors.is_empty());
        match cmd.action {
            Action::AnnounceRoute { family, next_hop, attributes, .. } => {
                assert_eq!(family, Family::IPV4_UNICAST);
                assert_eq!(next_hop, Some(IpAddr::from_str("10.0.0.1").unwrap()));
                assert!(attributes.iter().any(|v| matches!(v.data, Data::LocalPref(100))));
            }
            other => panic!("wrong action: {other:?}"),
        }
    }

    #[test]
    fn announce_route_with_community_seeds_a_new_communities_attribute() {
        let cmd = parse("announce route 192.0.2.0/24 next-hop 10.0.0.1 origin igp community 65000:1", Encoding::Text).unwrap();
        match cmd.action {
            Action::AnnounceRoute { attributes, .. } => {
                let community = attributes.iter().find_map(|v| match &v.data {
                    Data::Communities(Communities(list)) => Some(list.clone()),
                    _ => None,
                });
                assert_eq!(community, Some(vec![Community((65000u32 << 16) | 1)]));
            }
            other => panic!("wrong action: {other:?}"),
        }
    }

    #[test]
    fn parses_neighbor_selector() {
        let cmd = parse("neighbor 192.0.2.5 teardown 6", Encoding::Text).unwrap();
        assert_eq!(cmd.neighbors, vec![IpAddr::from_str("192.0.2.5").unwrap()]);
        assert!(matches!(cmd.action, Action::Teardown { subcode: 6 }));
    }

    #[test]
    fn parses_withdraw_route() {
        let cmd = parse("withdraw route 192.0.2.0/24 next-hop 10.0.0.1", Encoding::Text).unwrap();
        assert!(matches!(cmd.action, Action::WithdrawRoute { .. }));
    }

    #[test]
    fn parses_shutdown() {
        let cmd = parse("shutdown", Encoding::Text).unwrap();
        assert!(matches!(cmd.action, Action::Shutdown));
    }
}
