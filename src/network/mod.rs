//! The per-network session controller: owns one network's connection
//! lifecycle, capability snapshot, state tracker, and writer.

pub mod status;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use corvus_proto::mode::ModeKindModel;
use corvus_proto::{Event, Message, NetworkInfo};
use parking_lot::RwLock;
use tokio::sync::Notify;

use crate::config::NetworkConfig;
use crate::conn::flood::FloodParams;
use crate::conn::transport::HostSpec;
use crate::conn::{Connection, ConnectionWriter};
use crate::dispatch::Dispatcher;
use crate::error::NetworkError;
use crate::handlers::core::CoreHandler;
use crate::state::State;

use self::status::{Status, StatusTracker};

/// A "kill" signal: closing it preempts a connect attempt, a reconnect
/// wait, or the main read loop, whichever suspension point is active.
#[derive(Clone, Default)]
pub struct Killable {
    notify: Arc<Notify>,
    killed: Arc<AtomicBool>,
}

impl Killable {
    pub fn new() -> Killable {
        Killable::default()
    }

    pub fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        if self.is_killed() {
            return;
        }
        self.notify.notified().await;
    }
}

/// One configured network's live session.
pub struct Network {
    pub network_id: String,
    pub info: Arc<NetworkInfo>,
    pub state: Option<Arc<State>>,
    pub status: StatusTracker,
    mode_model: RwLock<ModeKindModel>,
    killable: Killable,
    config: NetworkConfig,
    prefix: char,
    identity: Identity,
    dispatcher: Arc<Dispatcher>,
    core: CoreHandler,
    writer: RwLock<Option<ConnectionWriter>>,
}

/// The bot-wide identity fields a network's core handler needs (nick,
/// altnick, username, realname). Per-network nick overrides are resolved
/// by the caller before constructing `Network`.
#[derive(Debug, Clone)]
pub struct Identity {
    pub nick: String,
    pub altnick: Option<String>,
    pub username: String,
    pub realname: String,
}

impl Network {
    pub fn new(
        network_id: String,
        config: NetworkConfig,
        prefix: char,
        identity: Identity,
        dispatcher: Arc<Dispatcher>,
    ) -> Network {
        let info = Arc::new(NetworkInfo::new());
        let mode_model = RwLock::new(ModeKindModel::derive(&info));
        Network {
            network_id: network_id.clone(),
            info,
            state: if config.no_state { None } else { Some(Arc::new(State::new())) },
            status: StatusTracker::new(),
            mode_model,
            killable: Killable::new(),
            config,
            prefix,
            core: CoreHandler::new(identity.clone()),
            identity,
            dispatcher,
            writer: RwLock::new(None),
        }
    }

    pub fn killable(&self) -> Killable {
        self.killable.clone()
    }

    fn writer(&self) -> Option<ConnectionWriter> {
        self.writer.read().clone()
    }

    fn host_specs(&self) -> Vec<HostSpec> {
        self.config
            .servers
            .iter()
            .map(|addr| HostSpec {
                addr: addr.clone(),
                tls: self.config.tls,
                skip_verify: false,
                ca_path: None,
            })
            .collect()
    }

    /// Runs the connect -> run -> disconnect -> reconnect? lifecycle until
    /// a non-recoverable outcome (kill signal, no-reconnect policy, or a
    /// permanent connect failure).
    pub async fn run(&self) -> Result<(), NetworkError> {
        loop {
            self.status.transition(&self.network_id, Status::Connecting);

            let specs = self.host_specs();
            let Some(spec) = specs.first() else {
                self.status.transition(&self.network_id, Status::Stopped);
                return Err(NetworkError::Connect(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "no servers configured",
                )));
            };

            let connect_fut = Connection::open(spec, self.network_id.clone(), FloodParams::default());
            let connection = tokio::select! {
                result = connect_fut => result,
                _ = self.killable.wait() => {
                    self.status.transition(&self.network_id, Status::Stopped);
                    return Err(NetworkError::ServerKilled);
                }
            };

            let mut connection = match connection {
                Ok(c) => c,
                Err(e) => {
                    log::info!("network {}: connect failed: {e}", self.network_id);
                    self.status.transition(&self.network_id, Status::Stopped);
                    return Err(e);
                }
            };

            let writer_handle = connection.writer_handle();
            *self.writer.write() = Some(writer_handle.clone());
            self.dispatcher.register_writer(self.network_id.clone(), Arc::new(writer_handle));
            self.dispatcher
                .set_network_context(self.network_id.clone(), self.prefix, self.identity.nick.clone());
            self.status.transition(&self.network_id, Status::Started);

            let connect_event = Event::connect(self.network_id.clone(), self.info.clone());
            self.handle_event(&connect_event).await;

            loop {
                tokio::select! {
                    line = connection.line_rx.recv() => {
                        match line {
                            Some(line) => self.on_line(&line).await,
                            None => break,
                        }
                    }
                    _ = self.killable.wait() => {
                        connection.close();
                        self.status.transition(&self.network_id, Status::Stopped);
                        return Err(NetworkError::ServerKilled);
                    }
                }
            }

            connection.close();
            *self.writer.write() = None;
            self.dispatcher.unregister_writer(&self.network_id);
            let disconnect_event = Event::disconnect(self.network_id.clone(), self.info.clone());
            self.handle_event(&disconnect_event).await;

            if self.config.no_reconnect {
                self.status.transition(&self.network_id, Status::Stopped);
                return Err(NetworkError::NoReconnect);
            }

            self.status.transition(&self.network_id, Status::Reconnecting);
            let wait = Duration::from_secs(self.config.reconnect_timeout);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.killable.wait() => {
                    self.status.transition(&self.network_id, Status::Stopped);
                    return Err(NetworkError::ReconnectAborted);
                }
            }
        }
    }

    /// Extracts the bot's own full host from the `001` welcome text, which
    /// conventionally ends with `nick!user@host`. Falls back to a
    /// synthesized mask if the server omits it.
    fn welcome_host(&self, event: &Event) -> String {
        if let Some(text) = event.args.last() {
            if let Some(token) = text.split_whitespace().last() {
                if token.contains('!') && token.contains('@') {
                    return token.to_owned();
                }
            }
        }
        format!("{}!{}@{}", self.identity.nick, self.identity.username, self.network_id)
    }

    async fn on_line(&self, line: &str) {
        let msg = match Message::parse(line) {
            Ok(m) => m,
            Err(e) => {
                log::warn!("network {}: malformed line {line:?}: {e}", self.network_id);
                return;
            }
        };
        let event = Event::from_message(self.network_id.clone(), self.info.clone(), msg);
        self.handle_event(&event).await;
    }

    async fn handle_event(&self, event: &Event) {
        if let Some(state) = &self.state {
            let model = self.mode_model.read().clone();
            state.apply_event(event, &model);
        }
        match event.name.as_str() {
            "004" => self.info.parse_myinfo(&event.args),
            "005" => {
                self.info.parse_isupport(&event.args);
                *self.mode_model.write() = ModeKindModel::derive(&self.info);
            }
            "001" => {
                if let Some(state) = &self.state {
                    state.set_self(&self.welcome_host(event));
                }
            }
            "NICK" | "QUIT" if !event.sender.is_empty() => {
                self.dispatcher.evict_temp_session(&self.network_id, &event.sender);
            }
            _ => {}
        }

        if let Some(writer) = self.writer() {
            self.core.handle(event, &writer);
        }

        self.dispatcher.dispatch(event.clone());
    }
}
