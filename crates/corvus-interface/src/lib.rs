//! Traits that decouple the dispatcher and the remote extension RPC server
//! from a concrete connection implementation.
//!
//! At the moment this is just a `Writer` trait: anything that can enqueue a
//! raw line for a named network. In-process handlers, command handlers, and
//! RPC clients all write through this trait rather than holding a reference
//! to the connection engine directly.

pub mod line;

pub use line::sanitize;

/// An error returned when a write could not be enqueued.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The named network is not known to this bot.
    #[error("unknown network {0:?}")]
    UnknownNetwork(String),

    /// The network's connection has been closed.
    #[error("connection closed")]
    Closed,
}

/// Something that can enqueue a raw line to be sent on a network's write
/// queue. Implemented by the connection engine's pump handle; consumed by
/// in-process handlers, the command layer, and the RPC server's `Write`
/// call.
pub trait Writer: Send + Sync {
    /// Enqueues `line` for the network identified by `network_id`.
    ///
    /// `line` is sanitized with [`sanitize`] before being queued, so a
    /// caller cannot smuggle a second command by embedding a line
    /// terminator.
    fn raw(&self, network_id: &str, line: String) -> Result<(), WriteError>;
}
