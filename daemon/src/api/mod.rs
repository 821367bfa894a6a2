//! Line-oriented API channel (spec.md §4.5): the control surface by which an
//! external controller process injects/withdraws routes and receives
//! decoded peer events, in either the compact text grammar or JSON.
//!
//! Grounded on the teacher's `delegation-feed` pattern of a `broadcast`
//! channel feeding route changes into sessions (`session.rs`'s
//! `recv_updates`), generalized from one hardcoded producer to an arbitrary
//! line-framed transport (stdio or a Unix socket) carrying a real command
//! grammar, and from fire-and-forget broadcast to a request/response
//! channel so failed commands can report back on the same channel
//! (spec.md §7 "API commands that fail validation return a failure
//! response").

pub mod command;
pub mod encoding;
pub mod flowspec;

pub use command::Command;
pub use encoding::Encoding;

use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// One parsed line from the controller, or a parse failure to report back.
#[derive(Debug)]
pub enum Incoming {
    Command(Command),
    Malformed { line: String, reason: String },
}

/// An asynchronous event destined for the controller: a peer state change
/// or a decoded UPDATE, rendered in the channel's chosen [`Encoding`].
#[derive(Clone, Debug)]
pub enum Event {
    PeerUp { neighbor: std::net::IpAddr, asn: u32, router_id: std::net::Ipv4Addr },
    PeerDown { neighbor: std::net::IpAddr, reason: String },
    UpdateReceived { neighbor: std::net::IpAddr, withdrawn: usize, announced: usize, summary: String },
    CommandResult { ok: bool, message: String },
}

/// Runs the API channel over any `AsyncRead + AsyncWrite` transport (stdio
/// or a `UnixStream`), forwarding parsed commands to `cmd_tx` and rendering
/// `event_rx` messages back out in the negotiated `encoding`.
///
/// Concurrency contract (spec.md §4.5/§5): commands are read and forwarded
/// strictly in arrival order; the channel never blocks on a slow command
/// completing, since `cmd_tx` is an unbounded queue the reactor drains
/// cooperatively.
pub async fn run<R, W>(mut reader: R, mut writer: W, encoding: Encoding, cmd_tx: mpsc::UnboundedSender<Incoming>, mut event_rx: mpsc::UnboundedReceiver<Event>) -> io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(&mut reader).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    None => {
                        log::info!("API channel input closed");
                        return Ok(());
                    }
                    Some(line) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let incoming = match command::parse(&line, encoding) {
                            Ok(cmd) => Incoming::Command(cmd),
                            Err(e) => Incoming::Malformed { line: line.clone(), reason: e.to_string() },
                        };
                        if cmd_tx.send(incoming).is_err() {
                            log::warn!("API channel command queue dropped, reactor gone");
                            return Ok(());
                        }
                    }
                }
            }
            event = event_rx.recv() => {
                match event {
                    Some(event) => {
                        let rendered = encoding.render(&event);
                        writer.write_all(rendered.as_bytes()).await?;
                        writer.write_all(b"\n").await?;
                        writer.flush().await?;
                    }
                    None => {
                        log::info!("API channel event source closed");
                        return Ok(());
                    }
                }
            }
        }
    }
}
