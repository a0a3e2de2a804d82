//! The top-level orchestrator: owns every configured network, the
//! credential store, the session table, the dispatcher, and the extension
//! RPC server, and applies hot-reload deltas computed by `config::diff`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;

use corvus_store::{SessionTable, Store};

use crate::config::{self, Config, ReloadAction};
use crate::dispatch::Dispatcher;
use crate::handlers::claim::claim_command;
use crate::handlers::register::register_command;
use crate::network::{Identity, Killable, Network};
use crate::rpc::subscription::SubscriptionTable;
use crate::rpc::RpcContext;

/// Errors starting up the bot process.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("failed to open credential store at {path:?}: {source}")]
    Store { path: String, source: corvus_store::StoreError },
    #[error("failed to register the built-in register command: {0}")]
    BuiltinCommand(crate::dispatch::command::RegisterCommandError),
}

struct RunningNetwork {
    network: Arc<Network>,
    task: JoinHandle<()>,
}

/// The live, running bot process.
pub struct Bot {
    config: RwLock<Config>,
    store: Arc<Store>,
    sessions: Arc<SessionTable>,
    dispatcher: Arc<Dispatcher>,
    subs: Arc<SubscriptionTable>,
    networks: RwLock<HashMap<String, RunningNetwork>>,
    rpc_killable: Killable,
    rpc_task: RwLock<Option<JoinHandle<()>>>,
    stopped: Arc<AtomicBool>,
}

impl Bot {
    /// Opens the credential store and builds the shared dispatcher, but
    /// does not yet connect to any network or start the RPC server — call
    /// [`Bot::start`] for that.
    pub fn new(config: Config) -> Result<Bot, BotError> {
        let store = Arc::new(Store::open(&config.store_file).map_err(|source| BotError::Store {
            path: config.store_file.clone(),
            source,
        })?);
        let sessions = Arc::new(SessionTable::new());
        let dispatcher = Arc::new(Dispatcher::new(sessions.clone()));

        dispatcher
            .register_command(claim_command(store.clone(), sessions.clone()))
            .map_err(BotError::BuiltinCommand)?;
        dispatcher
            .register_command(register_command(store.clone(), sessions.clone(), config.bcrypt_cost))
            .map_err(BotError::BuiltinCommand)?;

        Ok(Bot {
            config: RwLock::new(config),
            store,
            sessions,
            dispatcher,
            subs: Arc::new(SubscriptionTable::new()),
            networks: RwLock::new(HashMap::new()),
            rpc_killable: Killable::new(),
            rpc_task: RwLock::new(None),
            stopped: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Connects to every configured network and starts the extension RPC
    /// server (a no-op if `extension_listen` is unset).
    pub fn start(self: &Arc<Bot>) {
        let network_ids: Vec<String> = self.config.read().networks.keys().cloned().collect();
        for id in network_ids {
            self.start_network(&id);
        }

        let ctx = RpcContext {
            dispatcher: self.dispatcher.clone(),
            store: self.store.clone(),
            sessions: self.sessions.clone(),
            subs: self.subs.clone(),
        };
        let killable = self.rpc_killable.clone();
        let config_snapshot = self.config.read().clone();
        let task = tokio::spawn(async move {
            if let Err(e) = crate::rpc::serve(&config_snapshot, ctx, killable).await {
                log::warn!("extension RPC server stopped: {e}");
            }
        });
        *self.rpc_task.write() = Some(task);
    }

    fn start_network(self: &Arc<Bot>, network_id: &str) {
        let config = self.config.read();
        let Some(net_config) = config.networks.get(network_id).cloned() else {
            return;
        };
        let prefix = config.effective_prefix(network_id);
        let identity = Identity {
            nick: config.effective_nick(network_id).to_owned(),
            altnick: config.altnick.clone(),
            username: config.username.clone(),
            realname: config.realname.clone(),
        };
        drop(config);

        let network = Arc::new(Network::new(
            network_id.to_owned(),
            net_config,
            prefix,
            identity,
            self.dispatcher.clone(),
        ));

        let run_handle = network.clone();
        let network_id_owned = network_id.to_owned();
        let task = tokio::spawn(async move {
            match run_handle.run().await {
                Ok(()) => {}
                Err(e) => log::info!("network {network_id_owned}: session ended: {e}"),
            }
        });

        self.networks.write().insert(network_id.to_owned(), RunningNetwork { network, task });
    }

    fn stop_network(&self, network_id: &str) {
        if let Some(running) = self.networks.write().remove(network_id) {
            running.network.killable().kill();
            running.task.abort();
        }
    }

    /// Applies a new configuration snapshot: starts added networks, stops
    /// removed ones, and issues a `NICK` change on any network whose
    /// effective nick changed. Other per-network setting changes are
    /// picked up the next time that network reconnects.
    pub fn reload(self: &Arc<Bot>, new_config: Config) {
        let old_config = self.config.read().clone();
        let actions = config::diff(&old_config, &new_config);
        *self.config.write() = new_config;

        for action in actions {
            match action {
                ReloadAction::Start(id) => self.start_network(&id),
                ReloadAction::Stop(id) => self.stop_network(&id),
                ReloadAction::Renick(id, nick) => {
                    if let Some(writer) = self.dispatcher.writer_for(&id) {
                        use corvus_interface::Writer;
                        let _ = writer.raw(&id, format!("NICK :{nick}"));
                    }
                }
            }
        }
    }

    /// Signals every network session and the RPC server to shut down.
    /// Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.rpc_killable.kill();
        for (_, running) in self.networks.write().drain() {
            running.network.killable().kill();
        }
    }

    /// Waits for every network session task and the RPC server task to
    /// finish, e.g. after [`Bot::stop`] has been called.
    pub async fn join(&self) {
        let tasks: Vec<JoinHandle<()>> = self
            .networks
            .write()
            .drain()
            .map(|(_, running)| running.task)
            .collect();
        for task in tasks {
            let _ = task.await;
        }
        if let Some(task) = self.rpc_task.write().take() {
            task.abort();
            let _ = task.await;
        }
    }

    /// True once every network session has stopped (used by the
    /// stdin-closed exit condition).
    pub fn all_networks_stopped(&self) -> bool {
        self.networks.read().values().all(|r| r.task.is_finished())
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}
