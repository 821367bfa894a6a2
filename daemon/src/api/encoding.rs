//! The two API channel wire encodings (spec.md §4.5/§6): a compact text
//! form and a JSON form, chosen once by the controller at startup.

use super::Event;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Encoding {
    Text,
    Json,
}

impl Encoding {
    #[must_use]
    pub fn render(self, event: &Event) -> String {
        match self {
            Self::Text => render_text(event),
            Self::Json => render_json(event),
        }
    }
}

fn render_text(event: &Event) -> String {
    match event {
        Event::PeerUp { neighbor, asn, router_id } => {
            format!("neighbor {neighbor} up (asn {asn}, router-id {router_id})")
        }
        Event::PeerDown { neighbor, reason } => format!("neighbor {neighbor} down ({reason})"),
        Event::UpdateReceived { neighbor, withdrawn, announced, summary } => {
            format!("neighbor {neighbor} update announced={announced} withdrawn={withdrawn} {summary}")
        }
        Event::CommandResult { ok, message } => {
            if *ok {
                format!("done {message}")
            } else {
                format!("error {message}")
            }
        }
    }
}

fn render_json(event: &Event) -> String {
    let value = match event {
        Event::PeerUp { neighbor, asn, router_id } => serde_json::json!({
            "type": "state",
            "state": "established",
            "neighbor": { "address": neighbor.to_string(), "asn": asn, "router_id": router_id.to_string() },
        }),
        Event::PeerDown { neighbor, reason } => serde_json::json!({
            "type": "state",
            "state": "down",
            "neighbor": { "address": neighbor.to_string() },
            "reason": reason,
        }),
        Event::UpdateReceived { neighbor, withdrawn, announced, summary } => serde_json::json!({
            "type": "update",
            "neighbor": { "address": neighbor.to_string() },
            "message": { "announced": announced, "withdrawn": withdrawn, "detail": summary },
        }),
        Event::CommandResult { ok, message } => serde_json::json!({
            "type": "result",
            "ok": ok,
            "message": message,
        }),
    };
    value.to_string()
}
