//! The core protocol handler: the one handler every network always runs,
//! regardless of what extensions register. Answers `PING`, performs initial
//! registration on `CONNECT`, and escalates through the configured altnick
//! and underscore-suffixed nicks on `433`.

use std::sync::atomic::{AtomicU32, Ordering};

use corvus_proto::Event;
use corvus_interface::Writer;

use crate::network::Identity;

/// How many nick candidates `433` escalation will try before giving up and
/// leaving the connection unregistered (the server will eventually time it
/// out).
const MAX_NICK_ATTEMPTS: u32 = 5;

pub struct CoreHandler {
    identity: Identity,
    nick_attempt: AtomicU32,
}

impl CoreHandler {
    pub fn new(identity: Identity) -> CoreHandler {
        CoreHandler {
            identity,
            nick_attempt: AtomicU32::new(0),
        }
    }

    /// Handles one event, writing any reply through `writer`. Never returns
    /// an error: protocol-essential writes that fail because the connection
    /// already closed are not actionable here.
    pub fn handle(&self, event: &Event, writer: &dyn Writer) {
        match event.name.as_str() {
            "PING" => {
                let token = event.args.first().cloned().unwrap_or_default();
                let _ = writer.raw(&event.network_id, format!("PONG :{token}"));
            }
            corvus_proto::CONNECT => {
                self.nick_attempt.store(0, Ordering::SeqCst);
                let _ = writer.raw(&event.network_id, format!("NICK :{}", self.identity.nick));
                let _ = writer.raw(
                    &event.network_id,
                    format!("USER {} 0 * :{}", self.identity.username, self.identity.realname),
                );
            }
            "433" => {
                let attempt = self.nick_attempt.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt > MAX_NICK_ATTEMPTS {
                    log::error!("network {}: exhausted nick candidates after {} 433s", event.network_id, attempt);
                    return;
                }
                let candidate = self.next_candidate(attempt);
                let _ = writer.raw(&event.network_id, format!("NICK :{candidate}"));
            }
            _ => {}
        }
    }

    /// The nick to try for a given 1-indexed `433` attempt count: the
    /// configured altnick first (or a single trailing underscore if none is
    /// configured), then the primary nick with an additional trailing
    /// underscore per further attempt.
    fn next_candidate(&self, attempt: u32) -> String {
        if attempt == 1 {
            return self
                .identity
                .altnick
                .clone()
                .unwrap_or_else(|| format!("{}_", self.identity.nick));
        }
        let underscores = attempt - if self.identity.altnick.is_some() { 1 } else { 0 };
        format!("{}{}", self.identity.nick, "_".repeat(underscores as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvus_proto::NetworkInfo;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct RecordingWriter {
        lines: Mutex<Vec<String>>,
    }

    impl Writer for RecordingWriter {
        fn raw(&self, _network_id: &str, line: String) -> Result<(), corvus_interface::WriteError> {
            self.lines.lock().push(line);
            Ok(())
        }
    }

    fn identity() -> Identity {
        Identity {
            nick: "bot".to_owned(),
            altnick: Some("bot1".to_owned()),
            username: "bot".to_owned(),
            realname: "a bot".to_owned(),
        }
    }

    fn ev(name: &str, args: &[&str]) -> Event {
        Event {
            network_id: "net1".to_owned(),
            network_info: Arc::new(NetworkInfo::new()),
            name: name.to_owned(),
            sender: String::new(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn connect_registers_with_nick_and_user() {
        let handler = CoreHandler::new(identity());
        let writer = RecordingWriter { lines: Mutex::new(Vec::new()) };
        handler.handle(&ev(corvus_proto::CONNECT, &[]), &writer);
        let lines = writer.lines.lock();
        assert_eq!(lines[0], "NICK :bot");
        assert_eq!(lines[1], "USER bot 0 * :a bot");
    }

    #[test]
    fn ping_replies_with_pong() {
        let handler = CoreHandler::new(identity());
        let writer = RecordingWriter { lines: Mutex::new(Vec::new()) };
        handler.handle(&ev("PING", &["token123"]), &writer);
        assert_eq!(writer.lines.lock()[0], "PONG :token123");
    }

    #[test]
    fn nick_collision_escalates_through_altnick_then_underscores() {
        let handler = CoreHandler::new(identity());
        let writer = RecordingWriter { lines: Mutex::new(Vec::new()) };
        handler.handle(&ev("433", &[]), &writer);
        handler.handle(&ev("433", &[]), &writer);
        handler.handle(&ev("433", &[]), &writer);
        let lines = writer.lines.lock();
        assert_eq!(*lines, vec!["NICK :bot1", "NICK :bot_", "NICK :bot__"]);
    }

    #[test]
    fn nick_collision_without_altnick_uses_underscores_from_the_start() {
        let mut id = identity();
        id.altnick = None;
        let handler = CoreHandler::new(id);
        let writer = RecordingWriter { lines: Mutex::new(Vec::new()) };
        handler.handle(&ev("433", &[]), &writer);
        handler.handle(&ev("433", &[]), &writer);
        let lines = writer.lines.lock();
        assert_eq!(*lines, vec!["NICK :bot_", "NICK :bot__"]);
    }

    #[test]
    fn connect_resets_escalation_state() {
        let handler = CoreHandler::new(identity());
        let writer = RecordingWriter { lines: Mutex::new(Vec::new()) };
        handler.handle(&ev("433", &[]), &writer);
        handler.handle(&ev(corvus_proto::CONNECT, &[]), &writer);
        writer.lines.lock().clear();
        handler.handle(&ev("433", &[]), &writer);
        assert_eq!(writer.lines.lock()[0], "NICK :bot1");
    }
}
