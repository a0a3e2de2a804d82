//! Command argument specs: the formal argument list a command declares,
//! its registration-time validation rules, and runtime token binding.

use std::collections::BTreeMap;

use crate::error::CommandError;

/// The kind of a single formal argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgKind {
    /// `#chan` — positional first, at most one, optional in a channel
    /// context (the invoking channel is substituted).
    Channel,
    /// `name` — a required token.
    Required,
    /// `[name]` — an optional token.
    Optional,
    /// `name...` — variadic, consumes the rest joined with single spaces.
    Variadic,
    /// `*name` — stored-user lookup (nickname resolved via state -> host
    /// -> session, or `*username` for a direct store lookup).
    StoredUser,
    /// `~name` — live-user lookup (nickname resolved via state).
    LiveUser,
}

/// One formal argument in a command's spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgFormal {
    pub name: String,
    pub kind: ArgKind,
}

/// Registration-time errors in an argument spec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgSpecError {
    #[error("at most one variadic argument is allowed, and it must be last")]
    VariadicNotLast,
    #[error("a required argument cannot follow an optional one")]
    RequiredAfterOptional,
    #[error("at most one #chan argument is allowed, and it must be first")]
    ChannelNotFirst,
    #[error("duplicate argument name {0:?}")]
    DuplicateName(String),
}

/// Validates a formal argument list against the registration-time rules.
pub fn validate(args: &[ArgFormal]) -> Result<(), ArgSpecError> {
    let mut seen = std::collections::HashSet::new();
    let mut seen_optional = false;
    let mut seen_variadic = false;
    let mut channel_count = 0;

    for (i, arg) in args.iter().enumerate() {
        if !seen.insert(arg.name.clone()) {
            return Err(ArgSpecError::DuplicateName(arg.name.clone()));
        }
        match arg.kind {
            ArgKind::Channel => {
                channel_count += 1;
                if i != 0 {
                    return Err(ArgSpecError::ChannelNotFirst);
                }
            }
            ArgKind::Variadic => {
                seen_variadic = true;
                if i != args.len() - 1 {
                    return Err(ArgSpecError::VariadicNotLast);
                }
            }
            ArgKind::Optional => seen_optional = true,
            ArgKind::Required | ArgKind::StoredUser | ArgKind::LiveUser => {
                if seen_optional {
                    return Err(ArgSpecError::RequiredAfterOptional);
                }
            }
        }
    }
    if channel_count > 1 {
        return Err(ArgSpecError::ChannelNotFirst);
    }
    let _ = seen_variadic;
    Ok(())
}

/// A resolved argument binding: the raw token(s) bound to each formal's
/// name. Live/stored-user and channel resolution happen one layer up
/// (`command.rs`), where state/store access is available; this module only
/// tokenizes and arities-checks.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    pub values: BTreeMap<String, String>,
}

impl Bindings {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Splits the remaining tokens after the command name into formal bindings,
/// substituting `current_channel` for an omitted leading `#chan` formal
/// when one is declared and the invocation is in a channel.
pub fn bind(
    args: &[ArgFormal],
    tokens: &[&str],
    current_channel: Option<&str>,
) -> Result<Bindings, CommandError> {
    let mut bindings = Bindings::default();
    let mut ti = 0usize;

    for (i, formal) in args.iter().enumerate() {
        match formal.kind {
            ArgKind::Channel => {
                let token = tokens.get(ti).copied();
                let value = match token {
                    Some(t) if t.starts_with(['#', '&', '~']) => {
                        ti += 1;
                        t.to_owned()
                    }
                    _ => current_channel
                        .ok_or_else(|| min_args_error(args, i))?
                        .to_owned(),
                };
                bindings.values.insert(formal.name.clone(), value);
            }
            ArgKind::Variadic => {
                let rest = tokens[ti..].join(" ");
                if rest.is_empty() && required_count(args) > i {
                    return Err(min_args_error(args, i));
                }
                bindings.values.insert(formal.name.clone(), rest);
                ti = tokens.len();
            }
            ArgKind::Optional => {
                if let Some(t) = tokens.get(ti) {
                    bindings.values.insert(formal.name.clone(), t.to_string());
                    ti += 1;
                }
            }
            ArgKind::Required | ArgKind::StoredUser | ArgKind::LiveUser => {
                let token = tokens.get(ti).ok_or_else(|| min_args_error(args, i))?;
                bindings.values.insert(formal.name.clone(), token.to_string());
                ti += 1;
            }
        }
    }

    if ti < tokens.len() && !args.iter().any(|a| a.kind == ArgKind::Variadic) {
        return Err(CommandError::TooManyArgs);
    }

    Ok(bindings)
}

/// The minimum number of tokens a caller must supply: every formal except
/// `Optional` and `Variadic` (a variadic may consume zero tokens), since a
/// `#chan` formal becomes a mandatory token once there is no channel
/// context to substitute it from.
fn required_count(args: &[ArgFormal]) -> usize {
    args.iter()
        .filter(|a| matches!(a.kind, ArgKind::Required | ArgKind::StoredUser | ArgKind::LiveUser | ArgKind::Channel))
        .count()
}

fn min_args_error(args: &[ArgFormal], _at: usize) -> CommandError {
    CommandError::TooFewArgs(required_count(args))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(name: &str, kind: ArgKind) -> ArgFormal {
        ArgFormal { name: name.to_owned(), kind }
    }

    #[test]
    fn validate_rejects_required_after_optional() {
        let args = vec![f("a", ArgKind::Optional), f("b", ArgKind::Required)];
        assert_eq!(validate(&args), Err(ArgSpecError::RequiredAfterOptional));
    }

    #[test]
    fn validate_rejects_variadic_not_last() {
        let args = vec![f("a", ArgKind::Variadic), f("b", ArgKind::Required)];
        assert_eq!(validate(&args), Err(ArgSpecError::VariadicNotLast));
    }

    #[test]
    fn validate_rejects_duplicate_names() {
        let args = vec![f("a", ArgKind::Required), f("a", ArgKind::Required)];
        assert_eq!(validate(&args), Err(ArgSpecError::DuplicateName("a".to_owned())));
    }

    #[test]
    fn validate_accepts_well_formed_spec() {
        let args = vec![f("chan", ArgKind::Channel), f("arg", ArgKind::Required)];
        assert!(validate(&args).is_ok());
    }

    #[test]
    fn bind_substitutes_current_channel_when_omitted() {
        let args = vec![f("chan", ArgKind::Channel), f("arg", ArgKind::Required)];
        let bindings = bind(&args, &["value"], Some("#room")).unwrap();
        assert_eq!(bindings.get("chan"), Some("#room"));
        assert_eq!(bindings.get("arg"), Some("value"));
    }

    #[test]
    fn bind_fails_without_channel_context() {
        let args = vec![f("chan", ArgKind::Channel), f("arg", ArgKind::Required)];
        let err = bind(&args, &["value"], None).unwrap_err();
        assert_eq!(err, CommandError::TooFewArgs(2));
    }

    #[test]
    fn bind_joins_variadic_with_single_spaces() {
        let args = vec![f("rest", ArgKind::Variadic)];
        let bindings = bind(&args, &["a", "b", "c"], None).unwrap();
        assert_eq!(bindings.get("rest"), Some("a b c"));
    }

    #[test]
    fn bind_rejects_too_many_args_without_variadic() {
        let args = vec![f("a", ArgKind::Required)];
        assert_eq!(bind(&args, &["one", "two"], None), Err(CommandError::TooManyArgs));
    }
}
