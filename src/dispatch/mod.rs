//! The dispatcher: fans out parsed events to registered handlers and runs
//! the command-recognition pipeline over `PRIVMSG`/`NOTICE` events.
//!
//! Two tiers sit on top of the same event stream. The event tier is a flat
//! list of `(network?, channel?, event name, callback)` registrations; every match
//! runs on its own task, and a panic inside one is caught at this boundary
//! and logged rather than propagated. The command tier is itself just an
//! event-tier handler registered internally for `PRIVMSG`/`NOTICE`, layering
//! recognition, argument binding, and access control on top.

pub mod argspec;
pub mod command;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use corvus_proto::Event;
use corvus_store::SessionTable;
use parking_lot::RwLock;

use corvus_interface::Writer;

use crate::dispatch::command::{CommandEvent, CommandSpec, RegisterCommandError};
use crate::error::CommandError;

/// Opaque handle returned by registration, used to unregister later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for HandlerId {
    fn from(id: u64) -> HandlerId {
        HandlerId(id)
    }
}

type HandlerFn = Arc<dyn Fn(Event) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct HandlerEntry {
    id: HandlerId,
    network: Option<String>,
    channel: Option<String>,
    event_name: Option<String>,
    callback: HandlerFn,
    /// The owning remote extension, if this handler was registered over
    /// the RPC server rather than in-process. Used to purge it on
    /// disconnect.
    ext: Option<String>,
}

/// The channel an event concerns, if any — the first argument when it
/// looks like a channel name. Used only for the event tier's `channel`
/// filter; commands derive their own notion of "current channel" in
/// `command::prepare`.
fn event_channel(event: &Event) -> Option<&str> {
    event.args.first().map(String::as_str).filter(|a| a.starts_with(['#', '&']))
}

struct CommandEntry {
    id: HandlerId,
    spec: CommandSpec,
}

/// Central event/command fan-out, shared by every `Network` session in a
/// bot process.
pub struct Dispatcher {
    next_id: AtomicU64,
    handlers: RwLock<Vec<HandlerEntry>>,
    commands: RwLock<Vec<CommandEntry>>,
    writers: RwLock<HashMap<String, Arc<dyn Writer>>>,
    sessions: Arc<SessionTable>,
    prefixes: RwLock<HashMap<String, char>>,
    self_nicks: RwLock<HashMap<String, String>>,
}

impl Dispatcher {
    pub fn new(sessions: Arc<SessionTable>) -> Dispatcher {
        Dispatcher {
            next_id: AtomicU64::new(1),
            handlers: RwLock::new(Vec::new()),
            commands: RwLock::new(Vec::new()),
            writers: RwLock::new(HashMap::new()),
            sessions,
            prefixes: RwLock::new(HashMap::new()),
            self_nicks: RwLock::new(HashMap::new()),
        }
    }

    fn next_id(&self) -> HandlerId {
        HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers a writer a command/event handler can use to talk back to
    /// `network_id`. Replaces any prior writer for the same network.
    pub fn register_writer(&self, network_id: impl Into<String>, writer: Arc<dyn Writer>) {
        self.writers.write().insert(network_id.into(), writer);
    }

    pub fn unregister_writer(&self, network_id: &str) {
        self.writers.write().remove(network_id);
    }

    pub fn writer_for(&self, network_id: &str) -> Option<Arc<dyn Writer>> {
        self.writers.read().get(network_id).cloned()
    }

    /// Evicts a temporary session on a NICK/QUIT observed by a network's
    /// state tracker; a no-op if no session is authenticated at that key or
    /// if it is a permanent one.
    pub fn evict_temp_session(&self, network_id: &str, host: &str) {
        let key = corvus_store::SessionKey::new(network_id, host);
        self.sessions.evict_temporary(&key);
    }

    /// Records the effective command prefix and nick for a network, read by
    /// the command tier when recognizing invocations.
    pub fn set_network_context(&self, network_id: impl Into<String>, prefix: char, self_nick: impl Into<String>) {
        let network_id = network_id.into();
        self.prefixes.write().insert(network_id.clone(), prefix);
        self.self_nicks.write().insert(network_id, self_nick.into());
    }

    /// Registers an event-tier handler. `network`, `channel`, and
    /// `event_name` filter which events invoke it; `None` matches any.
    pub fn register_handler<F, Fut>(
        &self,
        network: Option<String>,
        channel: Option<String>,
        event_name: Option<String>,
        callback: F,
    ) -> HandlerId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register_handler_inner(network, channel, event_name, None, callback)
    }

    /// Same as [`Dispatcher::register_handler`], but tags the registration
    /// with the owning remote extension so it is purged by
    /// [`Dispatcher::unregister_ext`] on disconnect.
    pub fn register_ext_handler<F, Fut>(
        &self,
        ext: impl Into<String>,
        network: Option<String>,
        channel: Option<String>,
        event_name: Option<String>,
        callback: F,
    ) -> HandlerId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register_handler_inner(network, channel, event_name, Some(ext.into()), callback)
    }

    fn register_handler_inner<F, Fut>(
        &self,
        network: Option<String>,
        channel: Option<String>,
        event_name: Option<String>,
        ext: Option<String>,
        callback: F,
    ) -> HandlerId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id();
        let callback: HandlerFn = Arc::new(move |event| Box::pin(callback(event)));
        self.handlers.write().push(HandlerEntry { id, network, channel, event_name, callback, ext });
        id
    }

    pub fn unregister_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|h| h.id != id);
        handlers.len() != before
    }

    /// Registers a command. The handler runs once access control and
    /// argument binding succeed. Rejects a name already registered in the
    /// same scope (both global, or both tied to the same network) — the
    /// lookup in [`Dispatcher::dispatch_commands`] only ever considers the
    /// first match per tier, so a silent duplicate would shadow the earlier
    /// registration.
    pub fn register_command(&self, spec: CommandSpec) -> Result<HandlerId, RegisterCommandError> {
        argspec::validate(&spec.args)?;
        let mut commands = self.commands.write();
        let clashes = commands
            .iter()
            .any(|c| c.spec.network == spec.network && c.spec.name.eq_ignore_ascii_case(&spec.name));
        if clashes {
            return Err(RegisterCommandError::DuplicateName(spec.name));
        }
        let id = self.next_id();
        commands.push(CommandEntry { id, spec });
        Ok(id)
    }

    pub fn unregister_command(&self, id: HandlerId) -> bool {
        let mut commands = self.commands.write();
        let before = commands.len();
        commands.retain(|c| c.id != id);
        commands.len() != before
    }

    /// Unregisters every handler and command owned by `ext`. Used when an
    /// extension disconnects from the RPC server.
    pub fn unregister_ext(&self, ext: &str) {
        self.commands.write().retain(|c| c.spec.ext != ext);
        self.handlers.write().retain(|h| h.ext.as_deref() != Some(ext));
    }

    /// Fans `event` out to every matching event-tier handler on its own
    /// task, then runs the command-tier pipeline if applicable. Does not
    /// wait for handlers to finish.
    pub fn dispatch(&self, event: Event) {
        let channel = event_channel(&event);
        let matching: Vec<HandlerFn> = self
            .handlers
            .read()
            .iter()
            .filter(|h| h.network.as_deref().map_or(true, |n| n == event.network_id))
            .filter(|h| h.channel.as_deref().map_or(true, |c| Some(c) == channel))
            .filter(|h| h.event_name.as_deref().map_or(true, |n| n == event.name))
            .map(|h| h.callback.clone())
            .collect();

        for callback in matching {
            let event = event.clone();
            tokio::spawn(async move {
                let fut = std::panic::AssertUnwindSafe(callback(event));
                if futures_util::future::FutureExt::catch_unwind(fut).await.is_err() {
                    log::error!("event handler panicked");
                }
            });
        }

        if event.name == "PRIVMSG" || event.name == "NOTICE" {
            self.dispatch_commands(event);
        }
    }

    fn dispatch_commands(&self, event: Event) {
        let prefix = self.prefixes.read().get(&event.network_id).copied().unwrap_or('.');
        let self_nick = self
            .self_nicks
            .read()
            .get(&event.network_id)
            .cloned()
            .unwrap_or_default();

        let Some(writer) = self.writer_for(&event.network_id) else {
            return;
        };

        let commands = self.commands.read();
        let per_network = commands.iter().filter(|c| c.spec.network.as_deref() == Some(event.network_id.as_str()));
        let global = commands.iter().filter(|c| c.spec.network.is_none());
        for entry in per_network.chain(global) {
            match command::prepare(&entry.spec, &event, prefix, &self_nick, &self.sessions) {
                None => continue,
                Some(Err(e)) => {
                    notify_error(&writer, &event, e);
                    return;
                }
                Some(Ok(cmd_event)) => {
                    self.invoke_command(&entry.spec, cmd_event, writer.clone());
                    return;
                }
            }
        }
    }

    fn invoke_command(&self, spec: &CommandSpec, cmd_event: CommandEvent, writer: Arc<dyn Writer>) {
        match &spec.action {
            command::CommandAction::InProcess(handler) => {
                let handler = handler.clone();
                let network_id = cmd_event.event.network_id.clone();
                let dest = cmd_event
                    .target_channel
                    .clone()
                    .unwrap_or_else(|| cmd_event.event.sender_nick().to_owned());
                tokio::spawn(async move {
                    let fut = std::panic::AssertUnwindSafe(handler(cmd_event));
                    match futures_util::future::FutureExt::catch_unwind(fut).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            let _ = writer.raw(&network_id, format!("NOTICE {dest} :{e}"));
                        }
                        Err(_) => log::error!("command handler panicked"),
                    }
                });
            }
            command::CommandAction::Pipe(target) => {
                target.forward(&cmd_event);
            }
        }
    }
}

fn notify_error(writer: &Arc<dyn Writer>, event: &Event, err: CommandError) {
    let target = event.args.first().cloned().unwrap_or_default();
    let dest = if target.starts_with(['#', '&']) {
        target
    } else {
        event.sender_nick().to_owned()
    };
    let _ = writer.raw(&event.network_id, format!("NOTICE {dest} :{err}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvus_interface::WriteError;
    use corvus_proto::NetworkInfo;
    use std::sync::atomic::AtomicUsize;

    struct RecordingWriter {
        lines: parking_lot::Mutex<Vec<String>>,
    }

    impl Writer for RecordingWriter {
        fn raw(&self, _network_id: &str, line: String) -> Result<(), WriteError> {
            self.lines.lock().push(line);
            Ok(())
        }
    }

    fn event(network_id: &str, name: &str, sender: &str, args: &[&str]) -> Event {
        Event {
            network_id: network_id.to_owned(),
            network_info: Arc::new(NetworkInfo::new()),
            name: name.to_owned(),
            sender: sender.to_owned(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn event_handler_runs_on_matching_network() {
        let dispatcher = Dispatcher::new(Arc::new(SessionTable::new()));
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        dispatcher.register_handler(Some("net1".to_owned()), None, Some("JOIN".to_owned()), move |_event| {
            let count = count2.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        dispatcher.dispatch(event("net1", "JOIN", "fish!f@h", &["#chan"]));
        dispatcher.dispatch(event("net2", "JOIN", "fish!f@h", &["#chan"]));
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unregistered_handler_does_not_run() {
        let dispatcher = Dispatcher::new(Arc::new(SessionTable::new()));
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let id = dispatcher.register_handler(None, None, None, move |_event| {
            let count = count2.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert!(dispatcher.unregister_handler(id));
        dispatcher.dispatch(event("net1", "JOIN", "fish!f@h", &["#chan"]));
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unauthenticated_command_sends_notice_and_short_circuits() {
        use crate::dispatch::argspec::ArgFormal;
        use crate::dispatch::command::{CommandAction, CommandKind, CommandScope};

        let dispatcher = Dispatcher::new(Arc::new(SessionTable::new()));
        dispatcher.set_network_context("net1", '.', "bot");
        let writer = Arc::new(RecordingWriter { lines: parking_lot::Mutex::new(Vec::new()) });
        dispatcher.register_writer("net1", writer.clone() as Arc<dyn Writer>);

        let spec = CommandSpec {
            name: "secure".to_owned(),
            network: None,
            channel: None,
            ext: String::new(),
            desc: String::new(),
            kind: CommandKind::Privmsg,
            scope: CommandScope::All,
            args: Vec::<ArgFormal>::new(),
            require_auth: true,
            req_level: None,
            req_flags: String::new(),
            action: CommandAction::InProcess(Arc::new(|_| Box::pin(async { Ok(()) }))),
        };
        dispatcher.register_command(spec).unwrap();

        dispatcher.dispatch(event("net1", "PRIVMSG", "fish!f@h", &["#chan", ".secure"]));
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let lines = writer.lines.lock();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("not authenticated"));
    }
}
