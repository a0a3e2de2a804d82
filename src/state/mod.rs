//! The per-network state tracker: an in-memory projection of network
//! topology driven by parsed events.
//!
//! Concurrency model follows the capability snapshot's: a coarse
//! `parking_lot::RwLock` around the whole tracker, write-locked briefly by
//! the single parse-loop writer, read-locked by handlers. Handlers that
//! need to hold data past the lock's lifetime must clone it out.

use std::collections::{HashMap, HashSet};

use corvus_proto::mode::{ChannelModes, ModeKindModel, UserModes};
use corvus_proto::Event;
use parking_lot::RwLock;

/// A tracked IRC user: known by full host, carrying whatever realname we
/// last observed (often none, until a WHO reply or similar supplies it).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub host: String,
    pub realname: Option<String>,
}

impl User {
    pub fn nick(&self) -> &str {
        corvus_proto::mask::nick(&self.host)
    }
}

/// A tracked channel: name, topic, and its accumulated mode state.
#[derive(Debug, Clone, Default)]
pub struct Channel {
    pub name: String,
    pub topic: Option<String>,
    pub modes: ChannelModes,
}

/// The full per-network projection.
#[derive(Debug, Default)]
struct Inner {
    self_host: String,
    users: HashMap<String, User>,
    channels: HashMap<String, Channel>,
    /// user host -> { channel name -> prefix-mode bitset }
    user_chans: HashMap<String, HashMap<String, UserModes>>,
    /// channel name -> { user host -> prefix-mode bitset }
    chan_users: HashMap<String, HashMap<String, UserModes>>,
}

impl Inner {
    fn prune_if_orphaned(&mut self, host: &str) {
        if host == self.self_host {
            return;
        }
        let still_joined = self
            .user_chans
            .get(host)
            .map(|m| !m.is_empty())
            .unwrap_or(false);
        if !still_joined {
            self.users.remove(host);
            self.user_chans.remove(host);
        }
    }

    fn remove_membership(&mut self, host: &str, chan: &str) {
        if let Some(chans) = self.user_chans.get_mut(host) {
            chans.remove(chan);
        }
        if let Some(users) = self.chan_users.get_mut(chan) {
            users.remove(host);
        }
    }

    fn add_membership(&mut self, host: &str, chan: &str, modes: UserModes) {
        self.user_chans
            .entry(host.to_owned())
            .or_default()
            .insert(chan.to_owned(), modes);
        self.chan_users
            .entry(chan.to_owned())
            .or_default()
            .insert(host.to_owned(), modes);
    }
}

/// Per-network state tracker. Cloning an `Arc<State>` is how handlers get a
/// shared handle; internal mutability is via the lock.
#[derive(Default)]
pub struct State {
    inner: RwLock<Inner>,
}

impl State {
    pub fn new() -> State {
        State::default()
    }

    /// `RPL_WELCOME (001)`: establishes `self` from the server-provided host.
    pub fn set_self(&self, full_host: &str) {
        let mut inner = self.inner.write();
        inner.self_host = full_host.to_owned();
        inner.users.entry(full_host.to_owned()).or_insert_with(|| User {
            host: full_host.to_owned(),
            realname: None,
        });
    }

    pub fn self_host(&self) -> String {
        self.inner.read().self_host.clone()
    }

    fn is_self(inner: &Inner, host: &str) -> bool {
        inner.self_host == host
    }

    /// `JOIN` from any sender: creates the channel if `self` is joining,
    /// ensures the joining user is tracked, and records membership.
    pub fn on_join(&self, chan: &str, sender_host: &str) {
        let mut inner = self.inner.write();
        let is_self = Self::is_self(&inner, sender_host);
        if is_self {
            inner.channels.entry(chan.to_owned()).or_insert_with(|| Channel {
                name: chan.to_owned(),
                topic: None,
                modes: ChannelModes::default(),
            });
        }
        inner
            .users
            .entry(sender_host.to_owned())
            .or_insert_with(|| User { host: sender_host.to_owned(), realname: None });
        inner.add_membership(sender_host, chan, UserModes::default());
    }

    /// `PART`: drops the parting user's membership. If `self` parted, the
    /// channel and every other member's membership in it are dropped too,
    /// and any user left with no channels is pruned.
    pub fn on_part(&self, chan: &str, sender_host: &str) {
        let mut inner = self.inner.write();
        if Self::is_self(&inner, sender_host) {
            let members: Vec<String> = inner
                .chan_users
                .get(chan)
                .map(|m| m.keys().cloned().collect())
                .unwrap_or_default();
            for member in &members {
                inner.remove_membership(member, chan);
                let member = member.clone();
                inner.prune_if_orphaned(&member);
            }
            inner.channels.remove(chan);
        } else {
            inner.remove_membership(sender_host, chan);
            inner.prune_if_orphaned(sender_host);
        }
    }

    /// `KICK`: identical effect to `PART` for the kicked target.
    pub fn on_kick(&self, chan: &str, target_host: &str) {
        self.on_part(chan, target_host);
    }

    /// `QUIT`: removes the user from every channel and drops them entirely.
    pub fn on_quit(&self, sender_host: &str) {
        let mut inner = self.inner.write();
        let chans: Vec<String> = inner
            .user_chans
            .get(sender_host)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        for chan in chans {
            if let Some(users) = inner.chan_users.get_mut(&chan) {
                users.remove(sender_host);
            }
        }
        inner.user_chans.remove(sender_host);
        inner.users.remove(sender_host);
    }

    /// `NICK`: renames a user across the users map and every membership
    /// map atomically, preserving per-channel mode bitsets.
    pub fn on_nick(&self, old_host: &str, new_nick: &str) -> String {
        let mut inner = self.inner.write();
        let new_host = format!(
            "{}!{}@{}",
            new_nick,
            corvus_proto::mask::user(old_host).unwrap_or(""),
            corvus_proto::mask::host(old_host).unwrap_or("")
        );

        if let Some(user) = inner.users.remove(old_host) {
            inner.users.insert(new_host.clone(), User { host: new_host.clone(), ..user });
        }
        if let Some(chans) = inner.user_chans.remove(old_host) {
            for (chan, modes) in &chans {
                if let Some(users) = inner.chan_users.get_mut(chan) {
                    if let Some(m) = users.remove(old_host) {
                        users.insert(new_host.clone(), m);
                    }
                }
            }
            inner.user_chans.insert(new_host.clone(), chans);
        }
        if inner.self_host == old_host {
            inner.self_host = new_host.clone();
        }
        new_host
    }

    /// `MODE ch modes args`: applies the parsed mode string to the
    /// channel's `ChannelModes`, and for prefix modes updates the target
    /// user's per-channel `UserModes` bitset.
    pub fn on_mode(&self, chan: &str, modestr: &str, args: &[String], model: &ModeKindModel) {
        let mut inner = self.inner.write();
        let Some(channel) = inner.channels.get_mut(chan) else { return };
        let Ok(effects) = channel.modes.apply(model, modestr, args) else { return };

        for effect in effects {
            let Some(prefix_char) = model.prefix_char(effect.mode) else { continue };
            let Some(target_nick) = effect.arg.as_deref() else { continue };
            let host = inner
                .chan_users
                .get(chan)
                .and_then(|members| {
                    members.keys().find(|h| corvus_proto::mask::nick(h) == target_nick).cloned()
                });
            let Some(host) = host else { continue };
            if let Some(members) = inner.chan_users.get_mut(chan) {
                if let Some(modes) = members.get_mut(&host) {
                    if effect.adding {
                        modes.set(model, prefix_char);
                    } else {
                        modes.unset(model, prefix_char);
                    }
                }
            }
            if let Some(um) = inner.user_chans.get_mut(&host).and_then(|m| m.get_mut(chan)) {
                if effect.adding {
                    um.set(model, prefix_char);
                } else {
                    um.unset(model, prefix_char);
                }
            }
        }
    }

    /// `TOPIC ch :text` or `332`.
    pub fn set_topic(&self, chan: &str, topic: &str) {
        let mut inner = self.inner.write();
        if let Some(channel) = inner.channels.get_mut(chan) {
            channel.topic = Some(topic.to_owned());
        }
    }

    /// `353` (NAMES): bulk-adds users, decoding their leading prefix chars.
    pub fn on_names(&self, chan: &str, entries: &[&str], model: &ModeKindModel) {
        let mut inner = self.inner.write();
        for entry in entries {
            let (modes, nick) = UserModes::decode_prefixed_nick(model, entry);
            let host = inner
                .users
                .keys()
                .find(|h| corvus_proto::mask::nick(h) == nick)
                .cloned()
                .unwrap_or_else(|| nick.to_owned());
            inner
                .users
                .entry(host.clone())
                .or_insert_with(|| User { host: host.clone(), realname: None });
            inner.add_membership(&host, chan, modes);
        }
    }

    pub fn user(&self, host: &str) -> Option<User> {
        self.inner.read().users.get(host).cloned()
    }

    pub fn user_by_nick(&self, nick: &str) -> Option<User> {
        self.inner
            .read()
            .users
            .values()
            .find(|u| u.nick() == nick)
            .cloned()
    }

    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.inner.read().channels.get(name).cloned()
    }

    pub fn channel_names(&self) -> HashSet<String> {
        self.inner.read().channels.keys().cloned().collect()
    }

    pub fn channel_members(&self, chan: &str) -> HashMap<String, UserModes> {
        self.inner.read().chan_users.get(chan).cloned().unwrap_or_default()
    }

    pub fn user_channels(&self, host: &str) -> HashMap<String, UserModes> {
        self.inner.read().user_chans.get(host).cloned().unwrap_or_default()
    }

    /// Dispatches a parsed event into the appropriate update rule. Events
    /// this tracker has no rule for are ignored.
    pub fn apply_event(&self, event: &Event, model: &ModeKindModel) {
        let sender = event.sender.as_str();
        match event.name.as_str() {
            "JOIN" => {
                if let Some(chan) = event.args.first() {
                    if !sender.is_empty() {
                        self.on_join(chan, sender);
                    }
                }
            }
            "PART" => {
                if let Some(chan) = event.args.first() {
                    if !sender.is_empty() {
                        self.on_part(chan, sender);
                    }
                }
            }
            "KICK" => {
                if let (Some(chan), Some(target_nick)) = (event.args.first(), event.args.get(1)) {
                    if let Some(user) = self.user_by_nick(target_nick) {
                        self.on_kick(chan, &user.host);
                    }
                }
            }
            "QUIT" => {
                if !sender.is_empty() {
                    self.on_quit(sender);
                }
            }
            "NICK" => {
                if let Some(new_nick) = event.args.first() {
                    if !sender.is_empty() {
                        self.on_nick(sender, new_nick);
                    }
                }
            }
            "MODE" => {
                if let Some(chan) = event.args.first() {
                    if event.network_info.is_channel_name(chan) {
                        if let Some(modes_str) = event.args.get(1) {
                            let arg_tokens: Vec<String> = event.args[2..].to_vec();
                            self.on_mode(chan, modes_str, &arg_tokens, model);
                        }
                    }
                }
            }
            "TOPIC" => {
                if let (Some(chan), Some(topic)) = (event.args.first(), event.args.get(1)) {
                    self.set_topic(chan, topic);
                }
            }
            "332" => {
                if let (Some(chan), Some(topic)) = (event.args.get(1), event.args.get(2)) {
                    self.set_topic(chan, topic);
                }
            }
            "353" => {
                if let (Some(chan), Some(names)) = (event.args.get(2), event.args.get(3)) {
                    let entries: Vec<&str> = names.split_whitespace().collect();
                    self.on_names(chan, &entries, model);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvus_proto::mode::ModeKindModel;

    fn model() -> ModeKindModel {
        ModeKindModel::derive(&corvus_proto::NetworkInfo::new())
    }

    #[test]
    fn join_then_part_self_destroys_channel() {
        let state = State::new();
        state.set_self("bot!b@host");
        state.on_join("#chan", "bot!b@host");
        assert!(state.channel("#chan").is_some());
        state.on_join("#chan", "other!o@host2");
        assert_eq!(state.channel_members("#chan").len(), 2);

        state.on_part("#chan", "bot!b@host");
        assert!(state.channel("#chan").is_none());
        assert!(state.user("other!o@host2").is_none());
    }

    #[test]
    fn quit_removes_user_from_all_channels() {
        let state = State::new();
        state.set_self("bot!b@host");
        state.on_join("#a", "bot!b@host");
        state.on_join("#b", "bot!b@host");
        state.on_join("#a", "user!u@h");
        state.on_join("#b", "user!u@h");
        state.on_quit("user!u@h");
        assert!(state.user("user!u@h").is_none());
        assert!(!state.channel_members("#a").contains_key("user!u@h"));
        assert!(!state.channel_members("#b").contains_key("user!u@h"));
    }

    #[test]
    fn nick_reindexes_user_and_memberships() {
        let state = State::new();
        state.set_self("bot!b@host");
        state.on_join("#chan", "bot!b@host");
        state.on_join("#chan", "old!u@h");
        let new_host = state.on_nick("old!u@h", "new");
        assert_eq!(new_host, "new!u@h");
        assert!(state.user("old!u@h").is_none());
        assert!(state.user("new!u@h").is_some());
        assert!(state.channel_members("#chan").contains_key("new!u@h"));
        assert!(!state.channel_members("#chan").contains_key("old!u@h"));
    }

    #[test]
    fn pruning_never_removes_self() {
        let state = State::new();
        state.set_self("bot!b@host");
        state.on_join("#chan", "bot!b@host");
        state.on_part("#chan", "bot!b@host");
        assert!(state.user("bot!b@host").is_some());
    }

    #[test]
    fn kick_behaves_like_part_for_target() {
        let state = State::new();
        state.set_self("bot!b@host");
        state.on_join("#chan", "bot!b@host");
        state.on_join("#chan", "target!t@h");
        state.on_kick("#chan", "target!t@h");
        assert!(state.user("target!t@h").is_none());
        assert!(state.channel("#chan").is_some());
    }

    #[test]
    fn apply_event_dispatches_topic() {
        let state = State::new();
        state.set_self("bot!b@host");
        state.on_join("#chan", "bot!b@host");
        let m = model();
        let event = corvus_proto::Event::from_message(
            "net",
            std::sync::Arc::new(corvus_proto::NetworkInfo::new()),
            corvus_proto::Message::new(None, "TOPIC", vec!["#chan".to_owned(), "new topic".to_owned()]),
        );
        state.apply_event(&event, &m);
        assert_eq!(state.channel("#chan").unwrap().topic.as_deref(), Some("new topic"));
    }
}
