//! Configuration contract: shapes the bot accepts, plus the hot-reload
//! diffing algorithm that turns an (old, new) pair of snapshots into the
//! set of start/stop/renick actions `Bot::reload` applies.
//!
//! Reading the file and watching it for changes is process-entry glue and
//! lives in `bin/corvusd.rs`; this module only deals with the parsed shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

fn default_prefix() -> char {
    '.'
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_reconnect_timeout() -> u64 {
    15
}

fn default_bcrypt_cost() -> u32 {
    corvus_store::password::DEFAULT_COST
}

/// Top-level configuration object, as read from `toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub nick: String,
    pub altnick: Option<String>,
    pub username: String,
    pub realname: String,
    #[serde(default = "default_prefix")]
    pub prefix: char,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub store_file: String,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    #[serde(default)]
    pub extension_listen: Option<String>,
    #[serde(default)]
    pub tls_cert: Option<String>,
    #[serde(default)]
    pub tls_key: Option<String>,
    #[serde(default)]
    pub tls_ca: Option<String>,
    #[serde(default)]
    pub tls_skip_verify: bool,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
}

/// Per-network overrides layered on top of the global identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub servers: Vec<String>,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub no_state: bool,
    #[serde(default)]
    pub no_store: bool,
    #[serde(default)]
    pub no_reconnect: bool,
    #[serde(default = "default_reconnect_timeout")]
    pub reconnect_timeout: u64,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub prefix: Option<char>,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(s)
    }

    /// Effective nick the bot should use on `network_id`: the per-network
    /// override if set, otherwise the global nick.
    pub fn effective_nick<'a>(&'a self, network_id: &str) -> &'a str {
        self.networks
            .get(network_id)
            .and_then(|n| n.nick.as_deref())
            .unwrap_or(&self.nick)
    }

    /// Effective command prefix for `network_id`: per-channel overrides are
    /// resolved later by the dispatcher, which has channel context; this
    /// only resolves the per-network-vs-global tier.
    pub fn effective_prefix(&self, network_id: &str) -> char {
        self.networks
            .get(network_id)
            .and_then(|n| n.prefix)
            .unwrap_or(self.prefix)
    }
}

/// One action the bot's hot-reload must perform to bring a running process
/// from an old config to a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadAction {
    Start(String),
    Stop(String),
    Renick(String, String),
}

/// Computes the delta between `old` and `new`: which networks to start,
/// which to stop, and which need a `NICK :new` issued because their
/// effective nick changed. Networks present in both with an unchanged nick
/// produce no action — their other settings (channel list, TLS, etc.) are
/// picked up by the running session the next time it reconnects, since the
/// contract only promises atomic start/stop/renick, not a live mid-session
/// reconfiguration of every field.
pub fn diff(old: &Config, new: &Config) -> Vec<ReloadAction> {
    let mut actions = Vec::new();

    for id in new.networks.keys() {
        if !old.networks.contains_key(id) {
            actions.push(ReloadAction::Start(id.clone()));
        }
    }
    for id in old.networks.keys() {
        if !new.networks.contains_key(id) {
            actions.push(ReloadAction::Stop(id.clone()));
        }
    }
    for id in new.networks.keys() {
        if old.networks.contains_key(id) {
            let old_nick = old.effective_nick(id);
            let new_nick = new.effective_nick(id);
            if old_nick != new_nick {
                actions.push(ReloadAction::Renick(id.clone(), new_nick.to_owned()));
            }
        }
    }

    actions
}
