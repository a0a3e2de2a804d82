//! The core IRC line grammar: `[:prefix SP] command (SP param)* [SP :trailing]`.

use std::fmt;

use crate::error::{MalformedMessage, MAX_LINE_LEN};

/// Commands for which RFC 1459/2812 requires the final multi-word argument
/// to always carry a leading `:`, even on the rare occasion it contains no
/// spaces (e.g. a one-word `PRIVMSG` body).
const ALWAYS_TRAILING: &[&str] = &["PRIVMSG", "NOTICE", "TOPIC", "KICK", "PART", "QUIT"];

/// A single parsed IRC wire line, independent of any particular network.
///
/// `command` is always upper-cased on parse: verbs like `privmsg` and
/// numerics like `001` are normalized the same way the rest of the system
/// expects to match against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The raw prefix with the leading `:` stripped, or `None` if the line
    /// had no prefix.
    pub sender: Option<String>,
    /// The command verb or three-digit numeric, upper-cased.
    pub command: String,
    /// Every parameter as its own entry; the trailing `:`-prefixed
    /// parameter (if present) is the last entry with its colon stripped.
    pub args: Vec<String>,
}

impl Message {
    /// Constructs a message directly from parts, without going through the
    /// wire grammar. Useful for synthesizing outbound messages.
    pub fn new(sender: Option<&str>, command: &str, args: Vec<String>) -> Message {
        Message {
            sender: sender.map(|s| s.to_owned()),
            command: command.to_ascii_uppercase(),
            args,
        }
    }

    /// Parses a single wire line (with or without a trailing `\r\n`).
    pub fn parse(line: &str) -> Result<Message, MalformedMessage> {
        let line = line.trim_end_matches(['\r', '\n']);

        if line.is_empty() {
            return Err(MalformedMessage::Empty);
        }
        if line.len() > MAX_LINE_LEN {
            return Err(MalformedMessage::TooLong(line.len()));
        }
        if line.contains('\0') {
            return Err(MalformedMessage::EmbeddedNul);
        }

        let mut rest = line;

        let sender = if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, after) = match stripped.split_once(' ') {
                Some((p, a)) => (p, a),
                None => return Err(MalformedMessage::MissingCommand),
            };
            if prefix.is_empty() {
                return Err(MalformedMessage::WhitespaceInPrefix);
            }
            if prefix.chars().any(char::is_whitespace) {
                return Err(MalformedMessage::WhitespaceInPrefix);
            }
            rest = after.trim_start_matches(' ');
            Some(prefix.to_owned())
        } else {
            None
        };

        let (command, params) = match rest.split_once(' ') {
            Some((c, p)) => (c, p),
            None => (rest, ""),
        };

        if command.is_empty() {
            return Err(MalformedMessage::MissingCommand);
        }

        let args = parse_params(params);

        Ok(Message {
            sender,
            command: command.to_ascii_uppercase(),
            args,
        })
    }

    /// Serializes this message back into a wire line, including the
    /// trailing `\r\n`. Re-emits `sender` as a leading `:prefix ` when
    /// present, so a message parsed from an incoming server line serializes
    /// back to the same line; messages built with [`Message::new`] for
    /// outbound use generally have `sender: None` and so carry no prefix.
    pub fn to_wire(&self) -> String {
        let body = write_line(&self.command, &self.args);
        match &self.sender {
            Some(prefix) => format!(":{prefix} {body}"),
            None => body,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire().trim_end_matches(['\r', '\n']))
    }
}

/// Splits the parameter tail of a line into individual arguments, honoring
/// the `:trailing` convention for the final parameter.
fn parse_params(params: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut rest = params;

    loop {
        let rest_trimmed = rest.trim_start_matches(' ');
        if rest_trimmed.is_empty() {
            break;
        }
        if let Some(trailing) = rest_trimmed.strip_prefix(':') {
            args.push(trailing.to_owned());
            break;
        }
        match rest_trimmed.split_once(' ') {
            Some((first, remainder)) => {
                args.push(first.to_owned());
                rest = remainder;
            }
            None => {
                args.push(rest_trimmed.to_owned());
                break;
            }
        }
    }

    args
}

/// Builds `command SP arg1 SP ... SP :last\r\n`, placing the trailing colon
/// in front of whichever argument needs it.
pub fn write_line(command: &str, args: &[impl AsRef<str>]) -> String {
    let mut out = String::with_capacity(command.len() + 16);
    out.push_str(command);

    let always_trailing = ALWAYS_TRAILING.contains(&command.to_ascii_uppercase().as_str());

    for (i, arg) in args.iter().enumerate() {
        let arg = arg.as_ref();
        let is_last = i == args.len() - 1;
        let needs_colon = arg.is_empty()
            || arg.starts_with(':')
            || arg.contains(' ')
            || (is_last && always_trailing && args.len() > 1);

        out.push(' ');
        if is_last && needs_colon {
            out.push(':');
        }
        out.push_str(arg);
    }

    out.push_str("\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_command() {
        let m = Message::parse("PING :tolsun.oulu.fi").unwrap();
        assert_eq!(m.sender, None);
        assert_eq!(m.command, "PING");
        assert_eq!(m.args, vec!["tolsun.oulu.fi".to_owned()]);
    }

    #[test]
    fn parses_prefix_and_multiple_params() {
        let m = Message::parse(":Angel!wings@irc.org PRIVMSG Wiz :Are you receiving this?").unwrap();
        assert_eq!(m.sender.as_deref(), Some("Angel!wings@irc.org"));
        assert_eq!(m.command, "PRIVMSG");
        assert_eq!(
            m.args,
            vec!["Wiz".to_owned(), "Are you receiving this?".to_owned()]
        );
    }

    #[test]
    fn upper_cases_command() {
        let m = Message::parse("privmsg #chan :hi").unwrap();
        assert_eq!(m.command, "PRIVMSG");
    }

    #[test]
    fn numeric_with_multiple_middle_params() {
        let m = Message::parse(":irc.example.com 005 nick CHANTYPES=# :are supported").unwrap();
        assert_eq!(m.command, "005");
        assert_eq!(
            m.args,
            vec![
                "nick".to_owned(),
                "CHANTYPES=#".to_owned(),
                "are supported".to_owned()
            ]
        );
    }

    #[test]
    fn rejects_empty_line() {
        assert_eq!(Message::parse(""), Err(MalformedMessage::Empty));
        assert_eq!(Message::parse("\r\n"), Err(MalformedMessage::Empty));
    }

    #[test]
    fn rejects_missing_command() {
        assert_eq!(Message::parse(":onlyaprefix"), Err(MalformedMessage::MissingCommand));
    }

    #[test]
    fn rejects_whitespace_in_prefix() {
        // A space inside what looks like a prefix token is impossible to
        // construct directly since split_once(' ') would end the prefix at
        // the first space; this instead covers an empty prefix.
        assert_eq!(Message::parse(":  PING x"), Err(MalformedMessage::WhitespaceInPrefix));
    }

    #[test]
    fn rejects_overlong_line() {
        let long = "PRIVMSG #chan :".to_owned() + &"x".repeat(600);
        assert!(matches!(
            Message::parse(&long),
            Err(MalformedMessage::TooLong(_))
        ));
    }

    #[test]
    fn round_trips_parse_then_serialize() {
        for line in [
            "PING :tolsun.oulu.fi\r\n",
            "PRIVMSG Wiz :Are you receiving this?\r\n",
            "JOIN #chan\r\n",
            "MODE #chan +o nick\r\n",
        ] {
            let m = Message::parse(line).unwrap();
            assert_eq!(m.to_wire(), line);
        }
    }

    #[test]
    fn serializer_quotes_args_with_spaces() {
        let line = write_line("TOPIC", &["#chan", "new topic here"]);
        assert_eq!(line, "TOPIC #chan :new topic here\r\n");
    }

    #[test]
    fn serializer_always_quotes_trailing_for_privmsg() {
        let line = write_line("PRIVMSG", &["#chan", "hi"]);
        assert_eq!(line, "PRIVMSG #chan :hi\r\n");
    }

    #[test]
    fn serializer_leaves_single_arg_commands_alone() {
        let line = write_line("JOIN", &["#chan"]);
        assert_eq!(line, "JOIN #chan\r\n");
    }
}
