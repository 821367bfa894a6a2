//! Shared per-peer status snapshot (spec.md §4.5's `show neighbor`/
//! `show adj-rib-in`/`show adj-rib-out`): the session task publishes it
//! after every RIB-affecting step so the API channel can answer read
//! queries without waiting on that peer's event loop to go idle.

use bgpcore::afi::Family;
use bgpcore::nlri::Nlri;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PeerState {
    #[default]
    Idle,
    Connecting,
    Established,
}

#[derive(Clone, Debug, Default)]
pub struct PeerStatus {
    pub state: PeerState,
    pub peer_asn: Option<u32>,
    pub peer_router_id: Option<Ipv4Addr>,
    pub rib_in: Vec<(Family, Nlri)>,
    pub rib_out: Vec<(Family, Nlri)>,
}

pub type SharedStatus = Arc<Mutex<PeerStatus>>;

#[must_use]
pub fn new_shared() -> SharedStatus {
    Arc::new(Mutex::new(PeerStatus::default()))
}
