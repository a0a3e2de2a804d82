//! The built-in `claim` command: the IRC-facing path that produces a
//! temporary (`Tmp`) session for a caller who is not yet authenticated,
//! letting them follow up with `register` to persist it. Refuses to claim
//! a username that already has a `StoredUser`, so it cannot be used to
//! impersonate an existing account — it only ever stands in for an
//! identity that does not exist yet.

use std::sync::Arc;

use corvus_store::{AuthIdentity, SessionKey, SessionTable, Store};

use crate::dispatch::argspec::{ArgFormal, ArgKind};
use crate::dispatch::command::{CommandAction, CommandEvent, CommandKind, CommandScope, CommandSpec};
use crate::error::CommandError;

/// Builds the `claim` command spec, ready to hand to
/// `Dispatcher::register_command`.
pub fn claim_command(store: Arc<Store>, sessions: Arc<SessionTable>) -> CommandSpec {
    CommandSpec {
        name: "claim".to_owned(),
        network: None,
        channel: None,
        ext: String::new(),
        desc: "Claims a username for your host, pending `register`.".to_owned(),
        kind: CommandKind::Privmsg,
        scope: CommandScope::All,
        args: vec![ArgFormal { name: "username".to_owned(), kind: ArgKind::Required }],
        require_auth: false,
        req_level: None,
        req_flags: String::new(),
        action: CommandAction::InProcess(Arc::new(move |event| {
            let store = store.clone();
            let sessions = sessions.clone();
            Box::pin(handle(store, sessions, event))
        })),
    }
}

async fn handle(store: Arc<Store>, sessions: Arc<SessionTable>, event: CommandEvent) -> Result<(), CommandError> {
    let username = event.bindings.get("username").unwrap_or_default().to_owned();

    if store
        .get_user(&username)
        .map_err(|e| CommandError::Custom(e.to_string()))?
        .is_some()
    {
        return Err(CommandError::UsernameTaken(username));
    }

    let key = SessionKey::new(event.event.network_id.clone(), event.caller_host.clone());
    sessions.login(key, AuthIdentity::Tmp { username });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvus_proto::{Event, NetworkInfo};
    use std::collections::BTreeMap;

    fn temp_store() -> (Arc<Store>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.redb");
        (Arc::new(Store::open(&path).unwrap()), dir)
    }

    fn cmd_event(network_id: &str, host: &str, username: &str) -> CommandEvent {
        let mut values = BTreeMap::new();
        values.insert("username".to_owned(), username.to_owned());
        CommandEvent {
            event: Event {
                network_id: network_id.to_owned(),
                network_info: Arc::new(NetworkInfo::new()),
                name: "PRIVMSG".to_owned(),
                sender: host.to_owned(),
                args: vec!["bot".to_owned(), format!("claim {username}")],
            },
            bindings: crate::dispatch::argspec::Bindings { values },
            caller_host: host.to_owned(),
            target_channel: None,
        }
    }

    #[tokio::test]
    async fn claiming_an_unused_username_authenticates_as_tmp() {
        let (store, _dir) = temp_store();
        let sessions = Arc::new(SessionTable::new());
        let key = SessionKey::new("net", "fish!f@h");

        handle(store, sessions.clone(), cmd_event("net", "fish!f@h", "fish")).await.unwrap();

        let authed = sessions.lookup(&key).expect("session created");
        assert!(matches!(authed.identity, AuthIdentity::Tmp { username } if username == "fish"));
    }

    #[tokio::test]
    async fn claiming_a_registered_username_is_rejected() {
        use corvus_store::StoredUser;

        let (store, _dir) = temp_store();
        store.create_user(&StoredUser::new("fish", "hash")).unwrap();
        let sessions = Arc::new(SessionTable::new());

        let err = handle(store, sessions, cmd_event("net", "other!o@h", "fish")).await.unwrap_err();
        assert_eq!(err, CommandError::UsernameTaken("fish".to_owned()));
    }
}
