//! The in-memory authenticated-session table.
//!
//! A user identifies once (e.g. via `IDENTIFY` in a query or an extension
//! RPC call) and stays authenticated against a particular `(network_id,
//! host)` pair — `host` here is the full `nick!user@host` sender mask, not
//! just the hostname — until they log out or the state tracker observes
//! their host change. This table is intentionally not persisted: a restart
//! requires re-identifying, the same way the store's bootstrap flow
//! requires a fresh first-user grant after the database itself is created.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::model::StoredUser;

/// Identifies one authenticated session: a full sender mask on a specific
/// network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub network_id: String,
    pub host: String,
}

impl SessionKey {
    pub fn new(network_id: impl Into<String>, host: impl Into<String>) -> SessionKey {
        SessionKey {
            network_id: network_id.into(),
            host: host.into(),
        }
    }
}

/// Either a session tied to a persisted [`StoredUser`] record, or a bare
/// temporary identity with no backing store entry (used for the
/// bootstrap-first-user grant, which authenticates before any user record
/// exists).
#[derive(Debug, Clone)]
pub enum AuthIdentity {
    Perma(StoredUser),
    Tmp { username: String },
}

impl AuthIdentity {
    pub fn username(&self) -> &str {
        match self {
            AuthIdentity::Perma(u) => &u.username,
            AuthIdentity::Tmp { username } => username,
        }
    }
}

/// A live authenticated session.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub identity: AuthIdentity,
}

impl AuthedUser {
    pub fn has_level(&self, network: Option<&str>, channel: Option<&str>, n: u8) -> bool {
        match &self.identity {
            AuthIdentity::Perma(u) => u.has_level(network, channel, n),
            AuthIdentity::Tmp { .. } => false,
        }
    }

    pub fn has_flags(&self, network: Option<&str>, channel: Option<&str>, needed: &str) -> bool {
        match &self.identity {
            AuthIdentity::Perma(u) => u.has_flags(network, channel, needed),
            AuthIdentity::Tmp { .. } => false,
        }
    }
}

/// The process-wide table of authenticated sessions.
#[derive(Default)]
pub struct SessionTable {
    sessions: RwLock<HashMap<SessionKey, AuthedUser>>,
}

impl SessionTable {
    pub fn new() -> SessionTable {
        SessionTable::default()
    }

    pub fn login(&self, key: SessionKey, identity: AuthIdentity) {
        self.sessions.write().insert(key, AuthedUser { identity });
    }

    pub fn lookup(&self, key: &SessionKey) -> Option<AuthedUser> {
        self.sessions.read().get(key).cloned()
    }

    pub fn is_authed(&self, key: &SessionKey) -> bool {
        self.sessions.read().contains_key(key)
    }

    /// Ends one session, e.g. on QUIT or explicit LOGOUT.
    pub fn logout(&self, key: &SessionKey) -> bool {
        self.sessions.write().remove(key).is_some()
    }

    /// Ends every session authenticated as `username`, across every network
    /// and host. Used when a user's account is deleted or their password is
    /// reset out from under them.
    pub fn logout_by_username(&self, username: &str) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, authed| authed.identity.username() != username);
        before - sessions.len()
    }

    /// Re-keys a session when the underlying sender mask changes, preserving
    /// authentication across the rename. Not used for NICK: a `(network,
    /// host)` session survives a nick change unchanged, since the state
    /// tracker reindexes the host key itself and the session table keys on
    /// the pre-change mask until a fresh `AuthUser` call rebinds it.
    pub fn rehost(&self, network_id: &str, old_host: &str, new_host: &str) {
        let mut sessions = self.sessions.write();
        let old_key = SessionKey::new(network_id, old_host);
        if let Some(authed) = sessions.remove(&old_key) {
            sessions.insert(SessionKey::new(network_id, new_host), authed);
        }
    }

    /// Evicts the session at `key` only if it is a temporary identity.
    /// Used on NICK/QUIT observed by the state tracker: permanent sessions
    /// persist through a host change, temporary ones do not.
    pub fn evict_temporary(&self, key: &SessionKey) -> bool {
        let mut sessions = self.sessions.write();
        if matches!(sessions.get(key), Some(a) if matches!(a.identity, AuthIdentity::Tmp { .. })) {
            sessions.remove(key);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StoredUser;

    #[test]
    fn login_then_lookup_succeeds() {
        let table = SessionTable::new();
        let key = SessionKey::new("freenode", "fish!f@h");
        table.login(key.clone(), AuthIdentity::Perma(StoredUser::new("fish", "hash")));
        assert!(table.is_authed(&key));
        assert_eq!(table.lookup(&key).unwrap().identity.username(), "fish");
    }

    #[test]
    fn logout_by_username_clears_all_networks() {
        let table = SessionTable::new();
        table.login(
            SessionKey::new("freenode", "fish!f@h1"),
            AuthIdentity::Perma(StoredUser::new("fish", "hash")),
        );
        table.login(
            SessionKey::new("efnet", "fish!f@h2"),
            AuthIdentity::Perma(StoredUser::new("fish", "hash")),
        );
        let n = table.logout_by_username("fish");
        assert_eq!(n, 2);
        assert!(!table.is_authed(&SessionKey::new("freenode", "fish!f@h1")));
    }

    #[test]
    fn evict_temporary_ignores_permanent_sessions() {
        let table = SessionTable::new();
        let key = SessionKey::new("freenode", "fish!f@h");
        table.login(key.clone(), AuthIdentity::Perma(StoredUser::new("fish", "hash")));
        assert!(!table.evict_temporary(&key));
        assert!(table.is_authed(&key));
    }

    #[test]
    fn evict_temporary_removes_tmp_sessions() {
        let table = SessionTable::new();
        let key = SessionKey::new("freenode", "fish!f@h");
        table.login(key.clone(), AuthIdentity::Tmp { username: "fish".to_owned() });
        assert!(table.evict_temporary(&key));
        assert!(!table.is_authed(&key));
    }

    #[test]
    fn rehost_preserves_authentication() {
        let table = SessionTable::new();
        let old_key = SessionKey::new("freenode", "fish!f@old.host");
        table.login(old_key.clone(), AuthIdentity::Perma(StoredUser::new("fish", "hash")));
        table.rehost("freenode", "fish!f@old.host", "fish!f@new.host");
        assert!(!table.is_authed(&old_key));
        assert!(table.is_authed(&SessionKey::new("freenode", "fish!f@new.host")));
    }
}
