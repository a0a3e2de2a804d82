use thiserror::Error;

/// What went wrong servicing a store read/write.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] redb::Error),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("user {0:?} already exists")]
    UserExists(String),

    #[error("channel {0:?} on network {1:?} already exists")]
    ChannelExists(String, String),
}

/// The three authentication-failure shapes callers need to distinguish, per
/// the access-control model's IDENTIFY flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    BadUser,
    BadPassword,
    BadMask,
}

#[derive(Debug, Error)]
#[error("authentication failed: {kind:?}")]
pub struct AuthError {
    pub kind: AuthErrorKind,
}

impl AuthError {
    pub fn new(kind: AuthErrorKind) -> AuthError {
        AuthError { kind }
    }
}
