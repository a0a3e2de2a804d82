//! Persistent credential storage plus the in-memory authenticated-session
//! table, backed by `redb` and `bcrypt`.
//!
//! There is no equivalent of this crate in a client-side bot framework: the
//! access-control and credential model here is grounded instead on a
//! server-side project in the same retrieval pack that already solves the
//! "store registered users durably, authenticate them, track sessions"
//! problem.

pub mod auth;
pub mod db;
pub mod error;
pub mod model;
pub mod password;

pub use auth::{AuthIdentity, AuthedUser, SessionKey, SessionTable};
pub use db::Store;
pub use error::{AuthError, AuthErrorKind, StoreError};
pub use model::{scope_key, Flags, Grant, StoredChannel, StoredUser};
