//! Top-level error taxonomy for the connection engine, dispatcher, and bot
//! orchestrator. Store errors live in `corvus_store::error`; wire parse
//! errors live in `corvus_proto::error`. This module is where those get
//! folded together for anything that crosses subsystem boundaries.

use thiserror::Error;

/// Errors a `Network` session's run loop can terminate with.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("tls handshake failed: {0}")]
    Tls(String),

    #[error("session was killed")]
    ServerKilled,

    #[error("reconnect aborted by kill signal")]
    ReconnectAborted,

    #[error("no-reconnect configured, giving up after disconnect")]
    NoReconnect,
}

/// Errors the write queue / pump can hand back to a caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("connection closed")]
    Closed,
    #[error("unknown network {0:?}")]
    UnknownNetwork(String),
}

/// A user-facing command error, delivered to the caller as a `NOTICE` with
/// a stable prefix. Never logged above DEBUG.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Access Denied: ({0}) level required.")]
    AccessLevel(u8),

    #[error("Access Denied: ({flags}) {scope} flag(s) required.")]
    AccessFlags { flags: String, scope: &'static str },

    #[error("Access Denied: You are not authenticated.")]
    NotAuthenticated,

    #[error("Error: Expected at least {0} arguments.")]
    TooFewArgs(usize),

    #[error("Error: Unexpected argument(s).")]
    TooManyArgs,

    #[error("Error: User [{0}] is not registered.")]
    UserNotRegistered(String),

    #[error("Error: No such nick [{0}].")]
    NickNotFound(String),

    #[error("Error: [{0}] is not a channel.")]
    NotAChannel(String),

    #[error("The username [{0}] is already registered.")]
    UsernameTaken(String),

    #[error("{0}")]
    Custom(String),
}

/// Errors surfaced by the RPC server, mapped to the three-tier status
/// taxonomy in `rpc::wire::Status`.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("not found")]
    NotFound,

    #[error("store unavailable")]
    StoreUnavailable,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unimplemented")]
    Unimplemented,

    #[error("permission denied")]
    PermissionDenied,

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<corvus_store::StoreError> for RpcError {
    fn from(e: corvus_store::StoreError) -> RpcError {
        RpcError::Internal(e.to_string())
    }
}
