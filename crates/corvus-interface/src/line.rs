//! Line sanitization shared by every writer of raw IRC text.
//!
//! Both the connection engine's write queue and the RPC `Write` call accept
//! a bare line from a caller that does not necessarily speak the wire
//! protocol (a handler, a remote extension). Neither may allow a caller to
//! smuggle a second command by embedding a line terminator in the middle of
//! what looks like a single argument.

/// Truncates `line` at the first line-terminating sequence it contains,
/// preferring `"\r\n"` over a lone `"\r"` or `"\n"` when multiple occur at
/// the same position.
///
/// The terminator itself is dropped; callers append their own `"\r\n"`
/// before writing to the wire.
pub fn sanitize(mut line: String) -> String {
    if let Some((pos, _)) = ["\r\n", "\r", "\n"]
        .iter()
        .flat_map(|needle| line.find(needle).map(|pos| (pos, needle.len())))
        .min_by_key(|&(pos, _)| pos)
    {
        line.truncate(pos);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::sanitize;

    #[test]
    fn passes_through_clean_lines() {
        assert_eq!(sanitize("PRIVMSG #chan :hi".to_owned()), "PRIVMSG #chan :hi");
    }

    #[test]
    fn truncates_at_crlf() {
        assert_eq!(
            sanitize("PRIVMSG #chan :hi\r\nQUIT :pwned".to_owned()),
            "PRIVMSG #chan :hi"
        );
    }

    #[test]
    fn truncates_at_lone_lf() {
        assert_eq!(sanitize("NOTICE x :a\nb".to_owned()), "NOTICE x :a");
    }

    #[test]
    fn truncates_at_lone_cr() {
        assert_eq!(sanitize("NOTICE x :a\rb".to_owned()), "NOTICE x :a");
    }
}
