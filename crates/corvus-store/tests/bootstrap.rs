use corvus_store::model::{Flags, Grant};
use corvus_store::password::hash_password;
use corvus_store::{AuthIdentity, SessionKey, SessionTable, Store, StoredUser};

/// The first user to IDENTIFY against an empty store is bootstrapped with
/// full global access, since there is no other way to grant the first
/// operator any access at all.
#[test]
fn bootstrap_first_user_gets_full_global_access() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path().join("store.redb")).unwrap();
    let sessions = SessionTable::new();

    assert!(store.is_empty().unwrap());

    let hashed = hash_password("hunter2", 4).unwrap();
    let mut user = StoredUser::new("root", hashed);
    user.access.insert(
        String::new(),
        Grant {
            level: 255,
            flags: Flags::parse("*").union(Flags::parse("a")),
        },
    );
    store.create_user(&user).unwrap();

    let key = SessionKey::new("freenode", "root");
    sessions.login(key.clone(), AuthIdentity::Perma(user.clone()));

    let authed = sessions.lookup(&key).unwrap();
    assert!(authed.has_level(Some("freenode"), None, 255));
    assert!(!store.is_empty().unwrap());
}

#[test]
fn second_user_does_not_inherit_bootstrap_access() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path().join("store.redb")).unwrap();

    let root_hash = hash_password("hunter2", 4).unwrap();
    let mut root = StoredUser::new("root", root_hash);
    root.access.insert(String::new(), Grant { level: 255, flags: Flags::empty() });
    store.create_user(&root).unwrap();

    let plain_hash = hash_password("swordfish", 4).unwrap();
    let plain = StoredUser::new("newbie", plain_hash);
    store.create_user(&plain).unwrap();

    let fetched = store.get_user("newbie").unwrap().unwrap();
    assert_eq!(fetched.highest_level(None, None), 0);
}
