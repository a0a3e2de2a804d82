//! The IRC wire protocol, distilled: parsing, serialization, mask matching,
//! capability negotiation, and the channel mode-kind model.
//!
//! This crate knows nothing about sockets, networks-as-plural, or the
//! dispatcher — it is the pure, network-id-agnostic core that `corvus`
//! builds its connection engine and state tracker on top of, the same way
//! `irc-proto` underlies `irc`.

pub mod capability;
pub mod error;
pub mod event;
pub mod mask;
pub mod message;
pub mod mode;

pub use capability::{ChanModesSpec, NetworkInfo, PrefixSpec};
pub use error::{CapabilityError, MalformedMessage, MAX_LINE_LEN};
pub use event::{Event, CONNECT, DISCONNECT};
pub use message::Message;
pub use mode::{ChannelModes, ModeError, ModeEffect, ModeKind, ModeKindModel, UserModes};
