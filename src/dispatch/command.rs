//! The command tier: recognizes prefix-introduced commands in `PRIVMSG`/
//! `NOTICE` events, looks them up, binds arguments, enforces access, and
//! invokes the matching handler.

use std::sync::Arc;

use corvus_proto::Event;
use corvus_store::{AuthedUser, SessionKey, SessionTable};
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::dispatch::argspec::{self, ArgFormal, ArgSpecError, Bindings};
use crate::error::CommandError;

/// Errors registering a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegisterCommandError {
    #[error(transparent)]
    ArgSpec(#[from] ArgSpecError),
    #[error("a command named {0:?} is already registered in that scope")]
    DuplicateName(String),
}

/// Which message type(s) a command listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Privmsg,
    Notice,
    All,
}

impl CommandKind {
    fn matches(self, event_name: &str) -> bool {
        match self {
            CommandKind::Privmsg => event_name == "PRIVMSG",
            CommandKind::Notice => event_name == "NOTICE",
            CommandKind::All => event_name == "PRIVMSG" || event_name == "NOTICE",
        }
    }
}

/// Whether a command listens in private messages, channel messages, or
/// both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    Private,
    Public,
    All,
}

/// The fully-bound event a command handler is invoked with.
#[derive(Debug, Clone)]
pub struct CommandEvent {
    pub event: Event,
    pub bindings: Bindings,
    pub caller_host: String,
    pub target_channel: Option<String>,
}

/// A registered command's declaration.
pub struct CommandSpec {
    pub name: String,
    /// Restricts the command to one network; `None` registers it in the
    /// global table, consulted after the per-network table at lookup.
    pub network: Option<String>,
    /// Restricts the command to firing only when invoked in this channel;
    /// `None` matches any (including private messages, subject to `scope`).
    pub channel: Option<String>,
    pub ext: String,
    pub desc: String,
    pub kind: CommandKind,
    pub scope: CommandScope,
    pub args: Vec<ArgFormal>,
    pub require_auth: bool,
    pub req_level: Option<u8>,
    pub req_flags: String,
    pub action: CommandAction,
}

/// A handler is either invoked in-process or forwarded to a remote
/// extension over the RPC server's pipe-handler mechanism.
#[derive(Clone)]
pub enum CommandAction {
    InProcess(Arc<dyn Fn(CommandEvent) -> BoxFuture<'static, Result<(), CommandError>> + Send + Sync>),
    Pipe(Arc<dyn PipeTarget>),
}

/// Implemented by the RPC server's pipe-handler adapters: forwards a
/// command invocation to a remote extension's subscription channel.
pub trait PipeTarget: Send + Sync {
    fn forward(&self, cmd_event: &CommandEvent);
}

/// A recognized, not-yet-dispatched invocation: the stripped command name
/// and the remaining whitespace-separated tokens.
struct Recognized<'a> {
    name: &'a str,
    tokens: Vec<&'a str>,
    scope: CommandScope,
}

/// Attempts to recognize `event` (a `PRIVMSG`/`NOTICE`) as a command
/// invocation under `prefix`. `self_nick` identifies whether the message
/// target was a private message to the bot.
fn recognize<'a>(event: &'a Event, prefix: char, self_nick: &str) -> Option<Recognized<'a>> {
    let target = event.args.first()?;
    let body = event.args.get(1)?;

    if target.eq_ignore_ascii_case(self_nick) {
        let mut tokens = body.split_whitespace();
        let name = tokens.next()?;
        return Some(Recognized {
            name,
            tokens: tokens.collect(),
            scope: CommandScope::Private,
        });
    }

    let stripped = body.strip_prefix(prefix)?;
    let mut tokens = stripped.split_whitespace();
    let name = tokens.next()?;
    Some(Recognized {
        name,
        tokens: tokens.collect(),
        scope: CommandScope::Public,
    })
}

/// Runs the full command-tier pipeline for one `PRIVMSG`/`NOTICE` event
/// against a single resolved [`CommandSpec`]. Returns `Ok(None)` when the
/// event does not recognize as an invocation of this command at all (wrong
/// name, wrong kind/scope); `Ok(Some(Err(e)))` when it recognized but
/// failed binding/access; `Ok(Some(Ok(())))` is never produced here — the
/// caller awaits the handler separately once access is confirmed.
pub fn prepare(
    spec: &CommandSpec,
    event: &Event,
    prefix: char,
    self_nick: &str,
    sessions: &SessionTable,
) -> Option<Result<CommandEvent, CommandError>> {
    if !spec.kind.matches(&event.name) {
        return None;
    }
    let recognized = recognize(event, prefix, self_nick)?;
    if !recognized.name.eq_ignore_ascii_case(&spec.name) {
        return None;
    }
    let scope_ok = match (spec.scope, recognized.scope) {
        (CommandScope::All, _) => true,
        (CommandScope::Private, CommandScope::Private) => true,
        (CommandScope::Public, CommandScope::Public) => true,
        _ => false,
    };
    if !scope_ok {
        return None;
    }

    let current_channel = match recognized.scope {
        CommandScope::Public => event.args.first().map(String::as_str),
        _ => None,
    };

    if let Some(want) = spec.channel.as_deref() {
        if current_channel != Some(want) {
            return None;
        }
    }

    let bindings = match argspec::bind(&spec.args, &recognized.tokens, current_channel) {
        Ok(b) => b,
        Err(e) => return Some(Err(e)),
    };

    let caller_host = event.sender.clone();

    if spec.require_auth || spec.req_level.is_some() || !spec.req_flags.is_empty() {
        let key = SessionKey::new(event.network_id.clone(), caller_host.clone());
        let authed = sessions.lookup(&key);
        if let Err(e) = check_access(spec, authed.as_ref(), &event.network_id, current_channel.as_deref()) {
            return Some(Err(e));
        }
    }

    Some(Ok(CommandEvent {
        event: event.clone(),
        bindings,
        caller_host,
        target_channel: current_channel.map(str::to_owned),
    }))
}

fn check_access(
    spec: &CommandSpec,
    authed: Option<&AuthedUser>,
    network: &str,
    channel: Option<&str>,
) -> Result<(), CommandError> {
    let Some(authed) = authed else {
        return Err(CommandError::NotAuthenticated);
    };
    if let Some(level) = spec.req_level {
        if !authed.has_level(Some(network), channel, level) {
            return Err(CommandError::AccessLevel(level));
        }
    }
    if !spec.req_flags.is_empty() && !authed.has_flags(Some(network), channel, &spec.req_flags) {
        let scope = if channel.is_some() { "channel" } else { "network" };
        return Err(CommandError::AccessFlags { flags: spec.req_flags.clone(), scope });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvus_proto::NetworkInfo;
    use std::sync::Arc as StdArc;

    fn spec(name: &str, scope: CommandScope, req_level: Option<u8>, req_flags: &str) -> CommandSpec {
        CommandSpec {
            name: name.to_owned(),
            network: None,
            channel: None,
            ext: String::new(),
            desc: String::new(),
            kind: CommandKind::Privmsg,
            scope,
            args: vec![],
            require_auth: req_level.is_some() || !req_flags.is_empty(),
            req_level,
            req_flags: req_flags.to_owned(),
            action: CommandAction::InProcess(StdArc::new(|_| Box::pin(async { Ok(()) }))),
        }
    }

    fn privmsg_event(target: &str, body: &str, sender: &str) -> Event {
        Event {
            network_id: "net1".to_owned(),
            network_info: StdArc::new(NetworkInfo::new()),
            name: "PRIVMSG".to_owned(),
            sender: sender.to_owned(),
            args: vec![target.to_owned(), body.to_owned()],
        }
    }

    #[test]
    fn recognizes_private_message_without_prefix() {
        let event = privmsg_event("bot", ".ignored register hi", "fish!f@h");
        let r = recognize(&event, '.', "bot").unwrap();
        assert_eq!(r.name, ".ignored");
        assert_eq!(r.scope, CommandScope::Private);
    }

    #[test]
    fn recognizes_channel_message_with_prefix() {
        let event = privmsg_event("#chan", ".cmd value", "fish!f@h");
        let r = recognize(&event, '.', "bot").unwrap();
        assert_eq!(r.name, "cmd");
        assert_eq!(r.tokens, vec!["value"]);
        assert_eq!(r.scope, CommandScope::Public);
    }

    #[test]
    fn ignores_channel_message_without_prefix() {
        let event = privmsg_event("#chan", "just chatting", "fish!f@h");
        assert!(recognize(&event, '.', "bot").is_none());
    }

    #[test]
    fn unauthenticated_caller_rejected_before_binding() {
        let spec = spec("cmd", CommandScope::All, Some(100), "");
        let event = privmsg_event("bot", "cmd", "fish!f@h");
        let sessions = SessionTable::new();
        let result = prepare(&spec, &event, '.', "bot", &sessions);
        assert_eq!(result, Some(Err(CommandError::NotAuthenticated)));
    }

    #[test]
    fn insufficient_level_rejected() {
        use corvus_store::model::{Flags, Grant};
        use corvus_store::{AuthIdentity, StoredUser};

        let spec = spec("cmd", CommandScope::All, Some(250), "");
        let event = privmsg_event("bot", "cmd", "fish!f@h");
        let sessions = SessionTable::new();
        let mut user = StoredUser::new("fish", "hash");
        user.access.insert(String::new(), Grant { level: 100, flags: Flags::parse("a") });
        sessions.login(SessionKey::new("net1", "fish!f@h"), AuthIdentity::Perma(user));

        let result = prepare(&spec, &event, '.', "bot", &sessions);
        assert_eq!(result, Some(Err(CommandError::AccessLevel(250))));
    }
}

impl PartialEq for CommandScope {
    fn eq(&self, other: &CommandScope) -> bool {
        matches!(
            (self, other),
            (CommandScope::Private, CommandScope::Private)
                | (CommandScope::Public, CommandScope::Public)
                | (CommandScope::All, CommandScope::All)
        )
    }
}
impl Eq for CommandScope {}
