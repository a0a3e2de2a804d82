//! Errors produced while parsing or serializing the IRC wire protocol.

use thiserror::Error;

/// The maximum number of bytes permitted in a single wire line, excluding
/// the trailing `\r\n`. Matches the RFC 1459/2812 512-byte line limit.
pub const MAX_LINE_LEN: usize = 510;

/// A malformed wire line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedMessage {
    /// The line had no command token at all.
    #[error("missing command")]
    MissingCommand,

    /// The prefix (text between the leading `:` and the next space)
    /// contained whitespace, which is not a valid host/nick/mask.
    #[error("whitespace in prefix")]
    WhitespaceInPrefix,

    /// The line exceeded [`MAX_LINE_LEN`] bytes.
    #[error("line too long ({0} bytes)")]
    TooLong(usize),

    /// The line was empty.
    #[error("empty line")]
    Empty,

    /// The line contained a NUL byte, which terminates IRC lines early on
    /// most servers and is never valid mid-line.
    #[error("embedded NUL byte")]
    EmbeddedNul,
}

/// Errors raised while interpreting `004`/`005` capability numerics.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    /// A `PREFIX` token did not have the `(modes)chars` shape.
    #[error("malformed PREFIX token: {0:?}")]
    MalformedPrefix(String),

    /// A `CHANMODES` token did not have four comma-separated groups.
    #[error("malformed CHANMODES token: {0:?}")]
    MalformedChanModes(String),
}
