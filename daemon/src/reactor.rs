//! The cooperative scheduler (spec.md §4.4): one supervisor task per
//! configured peer, a shared listener dispatching inbound connections to
//! whichever supervisor owns that peer IP, the API channel, and
//! SIGTERM/SIGHUP handling.
//!
//! Grounded on the teacher's `main.rs` `tokio::select!` loop racing socket
//! accepts against a `broadcast` update feed, generalized from one
//! hardcoded listener/session pair to N configured peers each running its
//! own connect/accept race (RFC 4271 §6.8 collision resolution) and
//! reconnect backoff, plus the signal handling and API channel the teacher
//! never needed for a single fire-and-forget feeder.

use crate::api::{self, Command, Encoding, Event, Incoming};
use crate::config::{Config, PeerConfig};
use crate::session::{self, PeerCommand, RibState};
use crate::status::{self, PeerState, SharedStatus};
use bgpcore::afi::Family;
use bgpcore::CeaseSubcode;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// A running peer supervisor's externally-visible handles: where to send it
/// commands, and where to read its last-published status from.
struct PeerHandle {
    cmd_tx: mpsc::UnboundedSender<PeerCommand>,
    status: SharedStatus,
}

/// Runs every configured peer plus the API channel until shutdown. Returns
/// once every peer supervisor and the API channel have exited, which in
/// practice means a clean SIGTERM-driven shutdown or a fatal I/O error on
/// the API transport.
pub async fn run(config: Config) -> std::io::Result<()> {
    let mut handles = HashMap::new();
    let mut incoming_txs = HashMap::new();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<Event>();

    for peer in &config.peers {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<PeerCommand>();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel::<TcpStream>();
        let status = status::new_shared();
        handles.insert(peer.peer_ip, PeerHandle { cmd_tx, status: Arc::clone(&status) });
        incoming_txs.insert(peer.peer_ip, incoming_tx);
        tokio::spawn(run_peer(peer.clone(), cmd_rx, incoming_rx, event_tx.clone(), status));
    }

    let listeners = bind_listeners(&config).await?;
    for listener in listeners {
        let incoming_txs = incoming_txs.clone();
        tokio::spawn(accept_loop(listener, incoming_txs));
    }

    let (api_cmd_tx, mut api_cmd_rx) = mpsc::unbounded_channel::<Incoming>();
    tokio::spawn(async move {
        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();
        if let Err(e) = api::run(stdin, stdout, Encoding::Text, api_cmd_tx, event_rx).await {
            log::error!("API channel exited: {e}");
        }
    });

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sighup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())?;

    loop {
        tokio::select! {
            incoming = api_cmd_rx.recv() => {
                match incoming {
                    Some(Incoming::Command(command)) => dispatch_command(command, &handles, &event_tx),
                    Some(Incoming::Malformed { line, reason }) => {
                        let _ = event_tx.send(Event::CommandResult { ok: false, message: format!("{line}: {reason}") });
                    }
                    None => {
                        log::info!("API command channel closed, shutting down");
                        break;
                    }
                }
            }
            _ = sigterm.recv() => {
                log::info!("SIGTERM received, shutting down every session");
                for handle in handles.values() {
                    let _ = handle.cmd_tx.send(PeerCommand::Teardown { subcode: CeaseSubcode::AdministrativeShutdown as u8 });
                }
                break;
            }
            _ = sighup.recv() => {
                log::info!("SIGHUP received; configuration reload is not implemented by this core (spec.md §4.4's reload hook is a collaborator contract for the config-file loader)");
            }
        }
    }

    Ok(())
}

async fn bind_listeners(config: &Config) -> std::io::Result<Vec<TcpListener>> {
    let mut listeners = Vec::new();
    let mut bound = std::collections::HashSet::new();
    for peer in &config.peers {
        let addr = (peer.local_ip, 179u16);
        if !bound.insert(addr) {
            continue;
        }
        listeners.push(TcpListener::bind(addr).await?);
    }
    Ok(listeners)
}

async fn accept_loop(listener: TcpListener, incoming_txs: HashMap<IpAddr, mpsc::UnboundedSender<TcpStream>>) {
    loop {
        match listener.accept().await {
            Ok((socket, peer_addr)) => {
                if let Some(tx) = incoming_txs.get(&peer_addr.ip()) {
                    let _ = tx.send(socket);
                } else {
                    log::warn!("rejecting connection from unconfigured peer {}", peer_addr.ip());
                }
            }
            Err(e) => log::error!("accept failed: {e}"),
        }
    }
}

fn dispatch_command(command: Command, handles: &HashMap<IpAddr, PeerHandle>, event_tx: &mpsc::UnboundedSender<Event>) {
    let targets: Vec<&PeerHandle> = if command.neighbors.is_empty() {
        handles.values().collect()
    } else {
        command.neighbors.iter().filter_map(|addr| handles.get(addr)).collect()
    };
    if targets.is_empty() && !command.neighbors.is_empty() {
        let _ = event_tx.send(Event::CommandResult { ok: false, message: "no configured peer matches the neighbor selector".to_string() });
        return;
    }

    use crate::api::command::Action;
    let (ok, message) = match command.action {
        Action::AnnounceRoute { nlri, family, next_hop, attributes } => {
            send_to(targets, PeerCommand::AnnounceRoute { family, nlri, next_hop, attributes, watchdog: None });
            (true, "ok".to_string())
        }
        Action::WithdrawRoute { nlri, family } => {
            send_to(targets, PeerCommand::WithdrawRoute { family, nlri });
            (true, "ok".to_string())
        }
        Action::AnnounceFlow(route) => {
            send_to(targets, PeerCommand::AnnounceFlow { flow: route.flow, actions: route.actions, watchdog: None });
            (true, "ok".to_string())
        }
        Action::AnnounceEor { family } => {
            send_to(targets, PeerCommand::AnnounceEor { family });
            (true, "ok".to_string())
        }
        Action::AnnounceRouteRefresh { family } => {
            send_to(targets, PeerCommand::RouteRefreshRequest { family });
            (true, "ok".to_string())
        }
        Action::Teardown { subcode } => {
            send_to(targets, PeerCommand::Teardown { subcode });
            (true, "ok".to_string())
        }
        Action::AnnounceWatchdog { name } => {
            send_to(targets, PeerCommand::AnnounceWatchdog(name));
            (true, "ok".to_string())
        }
        Action::WithdrawWatchdog { name } => {
            send_to(targets, PeerCommand::WithdrawWatchdog(name));
            (true, "ok".to_string())
        }
        Action::ShowNeighbors => {
            let message = targets.iter().map(|h| render_neighbor(h)).collect::<Vec<_>>().join("; ");
            (true, message)
        }
        Action::ShowAdjRibIn => (true, render_rib(&targets, |status| &status.rib_in)),
        Action::ShowAdjRibOut => (true, render_rib(&targets, |status| &status.rib_out)),
        Action::Reload => (false, "reload is a config-file loader responsibility, out of scope for this core".to_string()),
        Action::Shutdown => {
            for handle in &targets {
                let _ = handle.cmd_tx.send(PeerCommand::Teardown { subcode: CeaseSubcode::AdministrativeShutdown as u8 });
            }
            (true, "ok".to_string())
        }
    };
    let _ = event_tx.send(Event::CommandResult { ok, message });
}

fn send_to(targets: Vec<&PeerHandle>, command: PeerCommand) {
    for handle in targets {
        let _ = handle.cmd_tx.send(command.clone());
    }
}

fn render_neighbor(handle: &PeerHandle) -> String {
    let status = handle.status.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    match status.state {
        PeerState::Established => format!("established asn={} router-id={}", status.peer_asn.map_or_else(|| "?".to_string(), |a| a.to_string()), status.peer_router_id.map_or_else(|| "?".to_string(), |r| r.to_string())),
        PeerState::Connecting => "connecting".to_string(),
        PeerState::Idle => "idle".to_string(),
    }
}

fn render_rib(targets: &[&PeerHandle], select: impl Fn(&status::PeerStatus) -> &Vec<(Family, bgpcore::nlri::Nlri)>) -> String {
    targets
        .iter()
        .map(|handle| {
            let status = handle.status.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let routes = select(&status);
            format!("{} routes", routes.len())
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// One peer's supervisor: owns its `RibState` across reconnects, races an
/// active connect attempt against whatever the shared listener hands it,
/// and resolves a collision per RFC 4271 §6.8 before committing to
/// Established.
async fn run_peer(config: PeerConfig, mut cmd_rx: mpsc::UnboundedReceiver<PeerCommand>, mut incoming_rx: mpsc::UnboundedReceiver<TcpStream>, event_tx: mpsc::UnboundedSender<Event>, status: SharedStatus) {
    let mut rib = RibState::new();
    for route in &config.static_routes {
        let interned = rib.interner.intern(route.attributes.clone());
        rib.desired.push(bgpcore::rib::StagedRoute { family: route.family, path_id: None, nlri: route.nlri.clone(), attributes: interned, watchdog: None });
    }

    let mut backoff = config.connect_retry_initial();
    loop {
        status.lock().unwrap_or_else(std::sync::PoisonError::into_inner).state = PeerState::Connecting;

        let handshake = race_connection(&config, &mut incoming_rx).await;
        let handshake = match handshake {
            Some(h) => h,
            None => {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 6 / 5).min(config.connect_retry_max());
                continue;
            }
        };

        backoff = config.connect_retry_initial();
        let result = session::run_established(handshake, &config, &mut rib, &mut cmd_rx, &event_tx, &status).await;
        if let Err(e) = result {
            log::warn!("session with {} ended: {e}", config.peer_ip);
        }
        status.lock().unwrap_or_else(std::sync::PoisonError::into_inner).state = PeerState::Idle;
        tokio::time::sleep(config.connect_retry_initial()).await;
    }
}

/// Races an outbound connect attempt (unless the peer is passive-only)
/// against whatever the shared listener hands this peer, performing OPEN
/// negotiation on each candidate as it lands. If a second candidate has
/// also landed in `incoming_rx` by the time the first negotiation
/// completes, that's a genuine connection collision (both sides dialed
/// each other at once); resolve it per RFC 4271 §6.8 by keeping the
/// handshake whose peer advertised the higher BGP Identifier and sending
/// the loser `NOTIFY (6,7)`.
async fn race_connection(config: &PeerConfig, incoming_rx: &mut mpsc::UnboundedReceiver<TcpStream>) -> Option<session::Handshake> {
    let connect = TcpStream::connect((config.peer_ip, 179));
    tokio::pin!(connect);

    let first = tokio::select! {
        accepted = incoming_rx.recv() => {
            let stream = accepted?;
            session::negotiate(stream, config).await
        }
        connected = &mut connect, if !config.passive => {
            let stream = match connected {
                Ok(stream) => stream,
                Err(e) => {
                    log::debug!("connect to {} failed: {e}", config.peer_ip);
                    return None;
                }
            };
            session::negotiate(stream, config).await
        }
    };

    let first = match first {
        Ok(h) => h,
        Err(e) => {
            log::warn!("negotiation with {} failed: {e}", config.peer_ip);
            return None;
        }
    };

    // Drain any connection that raced in concurrently: a real collision.
    match incoming_rx.try_recv() {
        Ok(stream) => match session::negotiate(stream, config).await {
            Ok(second) => Some(resolve_collision(config, first, second).await),
            Err(e) => {
                log::warn!("collision candidate with {} failed to negotiate: {e}", config.peer_ip);
                Some(first)
            }
        },
        Err(_) => Some(first),
    }
}

/// RFC 4271 §6.8: between two simultaneously-established connections to the
/// same peer, keep the one whose peer BGP Identifier is higher, and notify
/// the other off with `ConnectionCollisionResolution`.
async fn resolve_collision(config: &PeerConfig, a: session::Handshake, b: session::Handshake) -> session::Handshake {
    log::info!("connection collision with {}, resolving by router-id", config.peer_ip);
    if a.peer_router_id >= b.peer_router_id {
        session::reject_collision(b).await;
        a
    } else {
        session::reject_collision(a).await;
        b
    }
}

