//! The parsed-event representation handed to the dispatcher: a wire
//! [`Message`] plus the network it arrived on.

use std::sync::Arc;

use crate::capability::NetworkInfo;
use crate::message::Message;

/// Synthesized when a network's transport finishes connecting.
pub const CONNECT: &str = "CONNECT";

/// Synthesized when a network's transport is torn down, whether cleanly or
/// due to an error.
pub const DISCONNECT: &str = "DISCONNECT";

/// A parsed IRC message attributed to a specific network.
#[derive(Debug, Clone)]
pub struct Event {
    pub network_id: String,
    pub network_info: Arc<NetworkInfo>,
    /// The command verb or numeric, upper-cased. `CONNECT`/`DISCONNECT` for
    /// synthetic lifecycle events.
    pub name: String,
    /// The raw sender prefix, or empty string if the line had none (always
    /// empty for synthetic events).
    pub sender: String,
    pub args: Vec<String>,
}

impl Event {
    /// Builds an `Event` from a wire-level [`Message`] received on
    /// `network_id`.
    pub fn from_message(network_id: impl Into<String>, network_info: Arc<NetworkInfo>, msg: Message) -> Event {
        Event {
            network_id: network_id.into(),
            network_info,
            name: msg.command,
            sender: msg.sender.unwrap_or_default(),
            args: msg.args,
        }
    }

    /// Synthesizes the `CONNECT` lifecycle event for a network.
    pub fn connect(network_id: impl Into<String>, network_info: Arc<NetworkInfo>) -> Event {
        Event {
            network_id: network_id.into(),
            network_info,
            name: CONNECT.to_owned(),
            sender: String::new(),
            args: Vec::new(),
        }
    }

    /// Synthesizes the `DISCONNECT` lifecycle event for a network.
    pub fn disconnect(network_id: impl Into<String>, network_info: Arc<NetworkInfo>) -> Event {
        Event {
            network_id: network_id.into(),
            network_info,
            name: DISCONNECT.to_owned(),
            sender: String::new(),
            args: Vec::new(),
        }
    }

    /// The nick portion of `sender`, if any.
    pub fn sender_nick(&self) -> &str {
        crate::mask::nick(&self.sender)
    }

    /// The host portion of `sender` (`user@host` is not enough — this is
    /// the full `nick!user@host` minus the nick), if present.
    pub fn sender_host(&self) -> Option<&str> {
        crate::mask::host(&self.sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_events_have_sentinel_names() {
        let info = Arc::new(NetworkInfo::new());
        let c = Event::connect("net1", info.clone());
        let d = Event::disconnect("net1", info);
        assert_eq!(c.name, "CONNECT");
        assert_eq!(d.name, "DISCONNECT");
        assert_eq!(c.sender, "");
    }

    #[test]
    fn extracts_sender_parts() {
        let info = Arc::new(NetworkInfo::new());
        let msg = Message::parse(":nick!user@host PRIVMSG #chan :hi").unwrap();
        let ev = Event::from_message("net1", info, msg);
        assert_eq!(ev.sender_nick(), "nick");
        assert_eq!(ev.sender_host(), Some("host"));
    }
}
