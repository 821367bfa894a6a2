//! In-process configuration shape (spec.md §6's "configuration source"
//! collaborator).
//!
//! This is not a file-format parser — spec.md §1 puts the config grammar
//! out of scope — just the plain struct the reactor and session layer need
//! to compile against, carrying the fields spec.md §6 lists. A real
//! deployment's config-file loader would construct this from TOML/YAML/
//! whatever and call [`Reactor::run`](crate::reactor::Reactor::run).

use bgpcore::afi::Family;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// One static route to announce from startup, before any API command.
#[derive(Clone, Debug)]
pub struct StaticRoute {
    pub family: Family,
    pub nlri: bgpcore::nlri::Nlri,
    pub next_hop: Option<IpAddr>,
    pub attributes: bgpcore::path::PathAttributes,
}

/// Capability toggles a peer config can turn on; multiprotocol families are
/// carried separately in [`PeerConfig::families`].
#[derive(Clone, Debug, Default)]
pub struct CapabilityToggles {
    pub route_refresh: bool,
    pub enhanced_route_refresh: bool,
    pub extended_message: bool,
    pub graceful_restart: bool,
    pub restart_time: u16,
    pub add_path: Vec<(Family, bgpcore::capability::AddPathDirection)>,
}

/// One configured peer (spec.md §6): everything the reactor needs to drive
/// one session, independent of how it was loaded.
#[derive(Clone, Debug)]
pub struct PeerConfig {
    pub local_ip: IpAddr,
    pub local_as: u32,
    pub peer_ip: IpAddr,
    pub peer_as: u32,
    pub router_id: Ipv4Addr,
    pub hold_time: u16,
    /// Passive peers only accept; active peers also dial out. Both dial and
    /// accept when `passive` is false, racing per RFC 4271 §6.8 collision
    /// rules — matching most real deployments, where either side may
    /// initiate depending on which boots first.
    pub passive: bool,
    /// TCP MD5 signature key. Carried here per spec.md §6's collaborator
    /// contract; actually installing it via `setsockopt(TCP_MD5SIG)` is
    /// platform-specific and a Non-goal for this core (SPEC_FULL.md §2.2).
    pub md5_key: Option<String>,
    pub families: Vec<Family>,
    pub capabilities: CapabilityToggles,
    pub static_routes: Vec<StaticRoute>,
}

impl PeerConfig {
    #[must_use]
    pub fn connect_retry_initial(&self) -> Duration {
        Duration::from_millis(250)
    }

    #[must_use]
    pub fn connect_retry_max(&self) -> Duration {
        Duration::from_secs(60)
    }
}

/// The full configuration the reactor drives: every configured peer plus
/// where the API channel listens.
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub peers: Vec<PeerConfig>,
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_peer(&self, addr: IpAddr) -> Option<&PeerConfig> {
        self.peers.iter().find(|p| p.peer_ip == addr)
    }
}
