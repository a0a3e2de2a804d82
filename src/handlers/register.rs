//! The built-in `register` command: claims a username for the caller's
//! currently authenticated session, persisting it as a `StoredUser`. The
//! very first registration against an empty store is granted full global
//! access, bootstrapping an operator without any prior credentials.

use std::sync::Arc;

use corvus_store::model::{Flags, Grant};
use corvus_store::{AuthIdentity, SessionKey, SessionTable, Store, StoredUser};

use crate::dispatch::argspec::{ArgFormal, ArgKind};
use crate::dispatch::command::{CommandAction, CommandEvent, CommandKind, CommandScope, CommandSpec};
use crate::error::CommandError;

/// Full access granted to the first user registered against an empty
/// store, per the bootstrap scenario.
const BOOTSTRAP_LEVEL: u8 = 255;

fn bootstrap_flags() -> Flags {
    let mut flags = Flags::empty();
    for c in ('a'..='z').chain('A'..='Z') {
        flags.set(c);
    }
    flags
}

/// Builds the `register` command spec, ready to hand to
/// `Dispatcher::register_command`.
pub fn register_command(store: Arc<Store>, sessions: Arc<SessionTable>, bcrypt_cost: u32) -> CommandSpec {
    CommandSpec {
        name: "register".to_owned(),
        network: None,
        channel: None,
        ext: String::new(),
        desc: "Claims a username for your authenticated session.".to_owned(),
        kind: CommandKind::Privmsg,
        scope: CommandScope::All,
        args: vec![
            ArgFormal { name: "password".to_owned(), kind: ArgKind::Required },
            ArgFormal { name: "username".to_owned(), kind: ArgKind::Required },
        ],
        require_auth: true,
        req_level: None,
        req_flags: String::new(),
        action: CommandAction::InProcess(Arc::new(move |event| {
            let store = store.clone();
            let sessions = sessions.clone();
            Box::pin(handle(store, sessions, bcrypt_cost, event))
        })),
    }
}

async fn handle(
    store: Arc<Store>,
    sessions: Arc<SessionTable>,
    bcrypt_cost: u32,
    event: CommandEvent,
) -> Result<(), CommandError> {
    let password = event.bindings.get("password").unwrap_or_default().to_owned();
    let username = event.bindings.get("username").unwrap_or_default().to_owned();

    if store
        .get_user(&username)
        .map_err(|e| CommandError::Custom(e.to_string()))?
        .is_some()
    {
        return Err(CommandError::UsernameTaken(username));
    }

    let is_first = store.is_empty().map_err(|e| CommandError::Custom(e.to_string()))?;
    let hash = corvus_store::password::hash_password(&password, bcrypt_cost)
        .map_err(|e| CommandError::Custom(e.to_string()))?;

    let mut user = StoredUser::new(username, hash);
    user.masks.push(event.caller_host.clone());
    if is_first {
        user.access.insert(String::new(), Grant { level: BOOTSTRAP_LEVEL, flags: bootstrap_flags() });
    }

    store
        .create_user(&user)
        .map_err(|e| match e {
            corvus_store::StoreError::UserExists(name) => CommandError::UsernameTaken(name),
            other => CommandError::Custom(other.to_string()),
        })?;

    let key = SessionKey::new(event.event.network_id.clone(), event.caller_host.clone());
    sessions.login(key, AuthIdentity::Perma(user));
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

    fn cmd_event(network_id: &str, host: &str, values: BTreeMap<String, String>) -> CommandEvent {
        CommandEvent {
            event: Event {
                network_id: network_id.to_owned(),
                network_info: Arc::new(NetworkInfo::new()),
                name: "PRIVMSG".to_owned(),
                sender: host.to_owned(),
                args: vec!["bot".to_owned(), "register pw fish".to_owned()],
            },
            bindings: crate::dispatch::argspec::Bindings { values },
            caller_host: host.to_owned(),
            target_channel: None,
        }
    }

    #[tokio::test]
    async fn first_registrant_gets_full_global_access() {
        let (store, _dir) = temp_store();
        let sessions = Arc::new(SessionTable::new());
        let key = SessionKey::new("net", "fish!f@h");
        sessions.login(key.clone(), AuthIdentity::Tmp { username: "fish".to_owned() });

        let mut values = BTreeMap::new();
        values.insert("password".to_owned(), "pw".to_owned());
        values.insert("username".to_owned(), "fish".to_owned());

        handle(store.clone(), sessions.clone(), 4, cmd_event("net", "fish!f@h", values))
            .await
            .unwrap();

        let saved = store.get_user("fish").unwrap().unwrap();
        assert_eq!(saved.access.get("").unwrap().level, BOOTSTRAP_LEVEL);
        assert!(sessions.is_authed(&key));
    }

    #[tokio::test]
    async fn second_registration_of_same_username_fails() {
        let (store, _dir) = temp_store();
        let sessions = Arc::new(SessionTable::new());

        let mut first = BTreeMap::new();
        first.insert("password".to_owned(), "pw".to_owned());
        first.insert("username".to_owned(), "fish".to_owned());
        handle(store.clone(), sessions.clone(), 4, cmd_event("net", "fish!f@h1", first))
            .await
            .unwrap();

        let mut second = BTreeMap::new();
        second.insert("password".to_owned(), "pw2".to_owned());
        second.insert("username".to_owned(), "fish".to_owned());
        let err = handle(store, sessions, 4, cmd_event("net", "other!o@h2", second))
            .await
            .unwrap_err();
        assert_eq!(err, CommandError::UsernameTaken("fish".to_owned()));
    }
}
