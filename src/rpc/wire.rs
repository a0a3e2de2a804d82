//! The over-the-wire envelope types for the extension RPC surface: one
//! `serde_json` object per frame, length-delimited at the transport layer.

use serde::{Deserialize, Serialize};

/// A request from an extension to the bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "args")]
pub enum Request {
    Write { network: String, line: String },
    Register { ext: String, network: Option<String>, channel: Option<String>, event: String },
    RegisterCmd { ext: String, network: Option<String>, channel: Option<String>, spec: CmdSpecWire },
    Unregister { ext: String, id: u64 },
    UnregisterCmd { ext: String, id: u64 },
    UnregisterAll { ext: String },
    Events { ext: String, filter: Vec<String> },
    Commands { ext: String, filter: Vec<String> },

    FindUser { username: String },
    GlobalUsers,
    NetworkUsers { network: String },
    ChanUsers { network: String, channel: String },
    SaveUser { user: UserWire },
    RemoveUser { username: String },
    SaveChannel { channel: ChannelWire },
    RemoveChannel { network: String, name: String },
    AuthUserPerma { network: String, host: String, username: String, password: String },
    AuthUserTmp { network: String, host: String, username: String },
    Logout { network: String, host: String },
    LogoutByUsername { username: String },
    IsFirst,
}

/// The subset of a `CommandSpec` an extension can declare over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmdSpecWire {
    pub name: String,
    pub desc: String,
    pub kind: String,
    pub scope: String,
    pub args: Vec<ArgFormalWire>,
    pub require_auth: bool,
    pub req_level: Option<u8>,
    pub req_flags: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgFormalWire {
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserWire {
    pub username: String,
    pub password: String,
    pub masks: Vec<String>,
    pub access: std::collections::BTreeMap<String, (u8, String)>,
    pub data: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelWire {
    pub network: String,
    pub name: String,
    pub data: std::collections::BTreeMap<String, String>,
}

/// A reply, paired 1:1 with a `Request` by sequence number at the
/// transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", content = "body")]
pub enum Response {
    Ok(ResponseBody),
    Err { status: Status, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum ResponseBody {
    Unit,
    Id(u64),
    Bool(bool),
    User(Option<UserWire>),
    Users(Vec<UserWire>),
    Channel(Option<ChannelWire>),
}

/// The three-tier status taxonomy RPC errors map onto.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Status {
    NotFound,
    StoreUnavailable,
    InvalidArgument,
    Unimplemented,
    PermissionDenied,
    Unauthenticated,
    Internal,
}

impl From<&crate::error::RpcError> for Status {
    fn from(e: &crate::error::RpcError) -> Status {
        match e {
            crate::error::RpcError::NotFound => Status::NotFound,
            crate::error::RpcError::StoreUnavailable => Status::StoreUnavailable,
            crate::error::RpcError::InvalidArgument(_) => Status::InvalidArgument,
            crate::error::RpcError::Unimplemented => Status::Unimplemented,
            crate::error::RpcError::PermissionDenied => Status::PermissionDenied,
            crate::error::RpcError::Unauthenticated => Status::Unauthenticated,
            crate::error::RpcError::Internal(_) => Status::Internal,
        }
    }
}

/// Everything the server writes back to an extension connection: either a
/// unary reply or a pushed stream item, multiplexed over the same framed
/// socket so a connection can serve request/reply traffic and an active
/// subscription concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "frame", content = "body")]
pub enum OutFrame {
    Response(Response),
    Stream(StreamItem),
}

/// One item pushed down an `Events`/`Commands` stream: the subscription id
/// it was delivered to and the JSON-encoded payload (an `IRCEvent` or
/// `CmdEvent`, encoded generically here since the stream multiplexes both
/// kinds by subscription).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamItem {
    pub subscription_id: u64,
    pub event_name: String,
    pub network: String,
    pub sender: String,
    pub args: Vec<String>,
    pub unix_ts: i64,
}
