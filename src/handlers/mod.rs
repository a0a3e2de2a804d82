//! Built-in handlers. `core` runs in-process and is wired directly into
//! `Network::handle_event` rather than going through the dispatcher's
//! registration table; `claim` and `register` are ordinary commands
//! registered with the dispatcher at bot startup.

pub mod claim;
pub mod core;
pub mod register;
