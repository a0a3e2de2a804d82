//! A distributed IRC bot framework: a multi-network client, a state
//! tracker, a credential/access store, a dispatcher with a command layer
//! on top, and a remote extension RPC server.

pub mod bot;
pub mod config;
pub mod conn;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod network;
pub mod rpc;
pub mod state;

pub use bot::{Bot, BotError};
pub use config::Config;
