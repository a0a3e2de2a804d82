//! The on-disk store: an embedded `redb` database holding registered users
//! and per-channel data, plus two derived index tables that make "which
//! users have any access on this network/channel" a direct lookup instead of
//! a full users-table scan.
//!
//! The index tables are *derived*: they are never the source of truth and
//! are rebuilt from the users table by [`Store::reindex`] every time the
//! database is opened, so a crash between a user write and an index write
//! can never leave them permanently stale.

use std::collections::BTreeSet;
use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::StoreError;
use crate::model::{scope_key, StoredChannel, StoredUser};

const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
const CHANNELS: TableDefinition<&str, &[u8]> = TableDefinition::new("channels");
const USERS_BY_NET: TableDefinition<&str, &[u8]> = TableDefinition::new("users_by_net");
const USERS_BY_CHAN: TableDefinition<&str, &[u8]> = TableDefinition::new("users_by_chan");

fn user_key(username: &str) -> String {
    format!("user:{username}")
}

fn chan_key(network_id: &str, name: &str) -> String {
    format!("chan:{network_id}:{name}")
}

fn encode_set(set: &BTreeSet<String>) -> Result<Vec<u8>, StoreError> {
    Ok(rmp_serde::to_vec(set)?)
}

fn decode_set(bytes: &[u8]) -> Result<BTreeSet<String>, StoreError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// A handle to the on-disk credential and access-control database.
pub struct Store {
    db: Database,
}

impl Store {
    /// Opens (creating if absent) the database at `path`, then rebuilds the
    /// derived index tables from the users table.
    pub fn open(path: impl AsRef<Path>) -> Result<Store, StoreError> {
        let db = Database::create(path)?;
        let store = Store { db };
        store.reindex()?;
        Ok(store)
    }

    /// In-memory variant for tests: a `redb` database backed by a temp file
    /// the caller is responsible for keeping alive via `tempfile`.
    pub fn open_at(path: &Path) -> Result<Store, StoreError> {
        Store::open(path)
    }

    /// Rebuilds `users_by_net` and `users_by_chan` from every user's access
    /// grants. Called once on open; also safe to call at any later point if
    /// the indices are ever suspected to have drifted.
    pub fn reindex(&self) -> Result<(), StoreError> {
        let mut by_net: std::collections::BTreeMap<String, BTreeSet<String>> =
            std::collections::BTreeMap::new();
        let mut by_chan: std::collections::BTreeMap<String, BTreeSet<String>> =
            std::collections::BTreeMap::new();

        {
            let read = self.db.begin_read()?;
            if let Ok(table) = read.open_table(USERS) {
                for entry in table.iter()? {
                    let (_, value) = entry?;
                    let user: StoredUser = rmp_serde::from_slice(value.value())?;
                    for scope in user.access.keys() {
                        if scope.is_empty() {
                            continue;
                        }
                        match scope.split_once(':') {
                            Some((net, _chan)) => {
                                by_net.entry(net.to_owned()).or_default().insert(user.username.clone());
                                by_chan.entry(scope.clone()).or_default().insert(user.username.clone());
                            }
                            None => {
                                by_net.entry(scope.clone()).or_default().insert(user.username.clone());
                            }
                        }
                    }
                }
            }
        }

        let write = self.db.begin_write()?;
        {
            let mut net_table = write.open_table(USERS_BY_NET)?;
            let mut chan_table = write.open_table(USERS_BY_CHAN)?;

            net_table.retain(|_, _| false)?;
            chan_table.retain(|_, _| false)?;

            for (net, users) in &by_net {
                net_table.insert(net.as_str(), encode_set(users)?.as_slice())?;
            }
            for (scope, users) in &by_chan {
                chan_table.insert(scope.as_str(), encode_set(users)?.as_slice())?;
            }
        }
        write.commit()?;
        Ok(())
    }

    fn index_insert(&self, user: &StoredUser) -> Result<(), StoreError> {
        let write = self.db.begin_write()?;
        {
            let mut net_table = write.open_table(USERS_BY_NET)?;
            let mut chan_table = write.open_table(USERS_BY_CHAN)?;
            for scope in user.access.keys() {
                if scope.is_empty() {
                    continue;
                }
                let (table, key) = match scope.split_once(':') {
                    Some((net, _)) => {
                        let mut set = match net_table.get(net)? {
                            Some(v) => decode_set(v.value())?,
                            None => BTreeSet::new(),
                        };
                        set.insert(user.username.clone());
                        net_table.insert(net, encode_set(&set)?.as_slice())?;

                        let mut cset = match chan_table.get(scope.as_str())? {
                            Some(v) => decode_set(v.value())?,
                            None => BTreeSet::new(),
                        };
                        cset.insert(user.username.clone());
                        chan_table.insert(scope.as_str(), encode_set(&cset)?.as_slice())?;
                        continue;
                    }
                    None => (&mut net_table, scope.as_str()),
                };
                let mut set = match table.get(key)? {
                    Some(v) => decode_set(v.value())?,
                    None => BTreeSet::new(),
                };
                set.insert(user.username.clone());
                table.insert(key, encode_set(&set)?.as_slice())?;
            }
        }
        write.commit()?;
        Ok(())
    }

    /// Creates a new user record, failing if the username is already taken.
    pub fn create_user(&self, user: &StoredUser) -> Result<(), StoreError> {
        let write = self.db.begin_write()?;
        {
            let mut table = write.open_table(USERS)?;
            let key = user_key(&user.username);
            if table.get(key.as_str())?.is_some() {
                return Err(StoreError::UserExists(user.username.clone()));
            }
            let bytes = rmp_serde::to_vec(user)?;
            table.insert(key.as_str(), bytes.as_slice())?;
        }
        write.commit()?;
        self.index_insert(user)?;
        Ok(())
    }

    /// Overwrites an existing (or not-yet-existing) user record and brings
    /// the derived indices in line with the new access-grant set.
    pub fn put_user(&self, user: &StoredUser) -> Result<(), StoreError> {
        let write = self.db.begin_write()?;
        {
            let mut table = write.open_table(USERS)?;
            let bytes = rmp_serde::to_vec(user)?;
            table.insert(user_key(&user.username).as_str(), bytes.as_slice())?;
        }
        write.commit()?;
        self.reindex()
    }

    pub fn get_user(&self, username: &str) -> Result<Option<StoredUser>, StoreError> {
        let read = self.db.begin_read()?;
        let table = match read.open_table(USERS) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match table.get(user_key(username).as_str())? {
            Some(v) => Ok(Some(rmp_serde::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    pub fn delete_user(&self, username: &str) -> Result<bool, StoreError> {
        let write = self.db.begin_write()?;
        let existed = {
            let mut table = write.open_table(USERS)?;
            table.remove(user_key(username).as_str())?.is_some()
        };
        write.commit()?;
        if existed {
            self.reindex()?;
        }
        Ok(existed)
    }

    /// Usernames with any access grant scoped to `network_id` (global or
    /// per-network; per-channel grants on that network also count).
    pub fn users_for_network(&self, network_id: &str) -> Result<BTreeSet<String>, StoreError> {
        let read = self.db.begin_read()?;
        let table = match read.open_table(USERS_BY_NET) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(BTreeSet::new()),
            Err(e) => return Err(e.into()),
        };
        match table.get(network_id)? {
            Some(v) => decode_set(v.value()),
            None => Ok(BTreeSet::new()),
        }
    }

    /// Usernames with a grant scoped exactly to `network_id:channel`.
    pub fn users_for_channel(&self, network_id: &str, channel: &str) -> Result<BTreeSet<String>, StoreError> {
        let read = self.db.begin_read()?;
        let table = match read.open_table(USERS_BY_CHAN) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(BTreeSet::new()),
            Err(e) => return Err(e.into()),
        };
        let key = scope_key(Some(network_id), Some(channel));
        match table.get(key.as_str())? {
            Some(v) => decode_set(v.value()),
            None => Ok(BTreeSet::new()),
        }
    }

    /// Usernames holding a global-scope access grant.
    pub fn users_for_global(&self) -> Result<BTreeSet<String>, StoreError> {
        let read = self.db.begin_read()?;
        let table = match read.open_table(USERS) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(BTreeSet::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = BTreeSet::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let user: StoredUser = rmp_serde::from_slice(value.value())?;
            if user.access.contains_key("") {
                out.insert(user.username);
            }
        }
        Ok(out)
    }

    pub fn create_channel(&self, chan: &StoredChannel) -> Result<(), StoreError> {
        let write = self.db.begin_write()?;
        {
            let mut table = write.open_table(CHANNELS)?;
            let key = chan_key(&chan.network_id, &chan.name);
            if table.get(key.as_str())?.is_some() {
                return Err(StoreError::ChannelExists(chan.name.clone(), chan.network_id.clone()));
            }
            let bytes = rmp_serde::to_vec(chan)?;
            table.insert(key.as_str(), bytes.as_slice())?;
        }
        write.commit()?;
        Ok(())
    }

    pub fn put_channel(&self, chan: &StoredChannel) -> Result<(), StoreError> {
        let write = self.db.begin_write()?;
        {
            let mut table = write.open_table(CHANNELS)?;
            let bytes = rmp_serde::to_vec(chan)?;
            table.insert(chan_key(&chan.network_id, &chan.name).as_str(), bytes.as_slice())?;
        }
        write.commit()?;
        Ok(())
    }

    pub fn get_channel(&self, network_id: &str, name: &str) -> Result<Option<StoredChannel>, StoreError> {
        let read = self.db.begin_read()?;
        let table = match read.open_table(CHANNELS) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match table.get(chan_key(network_id, name).as_str())? {
            Some(v) => Ok(Some(rmp_serde::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    pub fn delete_channel(&self, network_id: &str, name: &str) -> Result<bool, StoreError> {
        let write = self.db.begin_write()?;
        let existed = {
            let mut table = write.open_table(CHANNELS)?;
            table.remove(chan_key(network_id, name).as_str())?.is_some()
        };
        write.commit()?;
        Ok(existed)
    }

    /// True if no user records exist yet; the bootstrap-first-user flow uses
    /// this to decide whether to grant the connecting operator full access.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        let read = self.db.begin_read()?;
        let table = match read.open_table(USERS) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(true),
            Err(e) => return Err(e.into()),
        };
        Ok(table.is_empty()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Grant, Flags};

    fn temp_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.redb");
        (Store::open(&path).unwrap(), dir)
    }

    #[test]
    fn create_then_get_user_round_trips() {
        let (store, _dir) = temp_store();
        let user = StoredUser::new("fish", "hashed");
        store.create_user(&user).unwrap();
        let back = store.get_user("fish").unwrap().unwrap();
        assert_eq!(back.username, "fish");
    }

    #[test]
    fn create_user_twice_fails() {
        let (store, _dir) = temp_store();
        let user = StoredUser::new("fish", "hashed");
        store.create_user(&user).unwrap();
        assert!(matches!(store.create_user(&user), Err(StoreError::UserExists(_))));
    }

    #[test]
    fn reindex_on_reopen_recovers_network_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.redb");
        {
            let store = Store::open(&path).unwrap();
            let mut user = StoredUser::new("fish", "hashed");
            user.access.insert("freenode".to_owned(), Grant { level: 100, flags: Flags::empty() });
            store.create_user(&user).unwrap();
        }
        let reopened = Store::open(&path).unwrap();
        let users = reopened.users_for_network("freenode").unwrap();
        assert!(users.contains("fish"));
    }

    #[test]
    fn users_for_global_finds_only_global_grant_holders() {
        let (store, _dir) = temp_store();
        let mut global_user = StoredUser::new("fish", "hashed");
        global_user.access.insert(String::new(), Grant { level: 100, flags: Flags::empty() });
        store.create_user(&global_user).unwrap();

        let mut net_user = StoredUser::new("other", "hashed");
        net_user.access.insert("freenode".to_owned(), Grant { level: 100, flags: Flags::empty() });
        store.create_user(&net_user).unwrap();

        let globals = store.users_for_global().unwrap();
        assert!(globals.contains("fish"));
        assert!(!globals.contains("other"));
    }

    #[test]
    fn empty_store_reports_empty() {
        let (store, _dir) = temp_store();
        assert!(store.is_empty().unwrap());
        store.create_user(&StoredUser::new("fish", "hashed")).unwrap();
        assert!(!store.is_empty().unwrap());
    }
}
