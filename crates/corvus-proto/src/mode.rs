//! The channel mode-kind model: classifying mode letters into address-list,
//! always-arg, arg-on-set, and flag-only, plus the prefix (user-channel)
//! modes, derived from a [`NetworkInfo`]'s `PREFIX`/`CHANMODES` tokens.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::capability::NetworkInfo;

/// The classification of a single channel mode letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    /// Group A: takes an argument, stored as a set of masks (`b`, `e`, `I`).
    AddressList,
    /// Group B: always takes an argument.
    AlwaysArg,
    /// Group C: takes an argument only when being set (`+l 50`, `-l`).
    ArgOnSet,
    /// Group D: never takes an argument.
    FlagOnly,
    /// A user-channel status mode (`o`, `v`, ...), rendered as a prefix
    /// character in `NAMES`/`WHO` output.
    Prefix,
}

/// A snapshot of how to classify every mode letter this network recognizes,
/// derived from the current `PREFIX` and `CHANMODES` ISUPPORT tokens.
#[derive(Debug, Clone)]
pub struct ModeKindModel {
    prefix_pairs: Vec<(char, char)>,
    address_list: BTreeSet<char>,
    always_arg: BTreeSet<char>,
    arg_on_set: BTreeSet<char>,
    flag_only: BTreeSet<char>,
}

impl ModeKindModel {
    /// Derives a mode-kind model from a network's current capability
    /// snapshot. Should be rebuilt any time `005 ISUPPORT` is reprocessed.
    pub fn derive(info: &NetworkInfo) -> ModeKindModel {
        let prefix = info.prefix();
        let chanmodes = info.chanmodes();
        ModeKindModel {
            prefix_pairs: prefix.pairs().to_vec(),
            address_list: chanmodes.address_list.chars().collect(),
            always_arg: chanmodes.always_arg.chars().collect(),
            arg_on_set: chanmodes.arg_on_set.chars().collect(),
            flag_only: chanmodes.flag_only.chars().collect(),
        }
    }

    /// Classifies a single mode letter.
    pub fn classify(&self, mode: char) -> ModeKind {
        if self.prefix_pairs.iter().any(|(m, _)| *m == mode) {
            ModeKind::Prefix
        } else if self.address_list.contains(&mode) {
            ModeKind::AddressList
        } else if self.always_arg.contains(&mode) {
            ModeKind::AlwaysArg
        } else if self.arg_on_set.contains(&mode) {
            ModeKind::ArgOnSet
        } else {
            // Unknown modes are treated as flag-only: safest default since
            // assuming an argument that isn't there would desynchronize the
            // rest of the parse.
            ModeKind::FlagOnly
        }
    }

    /// Status characters ordered from highest power to lowest, e.g.
    /// `['@', '+']`.
    pub fn prefix_chars(&self) -> Vec<char> {
        self.prefix_pairs.iter().map(|(_, c)| *c).collect()
    }

    pub fn prefix_pairs(&self) -> &[(char, char)] {
        &self.prefix_pairs
    }

    /// The status character (`@`, `+`, ...) a prefix mode letter renders
    /// as, if `mode` is a prefix mode at all.
    pub fn prefix_char(&self, mode: char) -> Option<char> {
        self.prefix_pairs.iter().find(|(m, _)| *m == mode).map(|(_, c)| *c)
    }

    fn prefix_index(&self, mode: char) -> Option<usize> {
        self.prefix_pairs.iter().position(|(m, _)| *m == mode)
    }
}

/// A single applied mode change, as produced by [`ChannelModes::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeEffect {
    pub adding: bool,
    pub mode: char,
    pub kind: ModeKind,
    pub arg: Option<String>,
}

/// Error applying a `MODE` token string: ran out of arguments for a mode
/// that required one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModeError {
    #[error("mode {0:?} requires an argument but none was given")]
    MissingArgument(char),
}

/// The modes currently set on a channel: a flag-only set, address-list
/// (ban/except/invex-style) masks, and arg-bearing mode values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelModes {
    flags: BTreeSet<char>,
    address_lists: BTreeMap<char, BTreeSet<String>>,
    arg_modes: BTreeMap<char, String>,
}

impl ChannelModes {
    pub fn new() -> ChannelModes {
        ChannelModes::default()
    }

    pub fn has_flag(&self, mode: char) -> bool {
        self.flags.contains(&mode)
    }

    pub fn flags(&self) -> &BTreeSet<char> {
        &self.flags
    }

    pub fn address_list(&self, mode: char) -> Option<&BTreeSet<String>> {
        self.address_lists.get(&mode)
    }

    pub fn arg(&self, mode: char) -> Option<&str> {
        self.arg_modes.get(&mode).map(String::as_str)
    }

    /// Applies a `MODE` token string (`"+xyz"`/`"-xyz"`, possibly several
    /// concatenated groups like `"+o-v"`) against `args`, the parameters
    /// that followed in the same `MODE` line, consuming one per mode letter
    /// that needs it per `model`.
    ///
    /// Returns every applied effect, including prefix-mode changes (which
    /// the caller — the state tracker — must apply to the relevant user's
    /// [`UserModes`] since `ChannelModes` has no notion of "which user").
    pub fn apply(
        &mut self,
        model: &ModeKindModel,
        modestr: &str,
        args: &[String],
    ) -> Result<Vec<ModeEffect>, ModeError> {
        let mut adding = true;
        let mut arg_idx = 0;
        let mut effects = Vec::new();

        for c in modestr.chars() {
            match c {
                '+' => adding = true,
                '-' => adding = false,
                _ => {
                    let kind = model.classify(c);
                    let arg = match kind {
                        ModeKind::AddressList | ModeKind::AlwaysArg | ModeKind::Prefix => {
                            let a = args
                                .get(arg_idx)
                                .ok_or(ModeError::MissingArgument(c))?
                                .clone();
                            arg_idx += 1;
                            Some(a)
                        }
                        ModeKind::ArgOnSet => {
                            if adding {
                                let a = args
                                    .get(arg_idx)
                                    .ok_or(ModeError::MissingArgument(c))?
                                    .clone();
                                arg_idx += 1;
                                Some(a)
                            } else {
                                None
                            }
                        }
                        ModeKind::FlagOnly => None,
                    };

                    match kind {
                        ModeKind::AddressList => {
                            let set = self.address_lists.entry(c).or_default();
                            if adding {
                                set.insert(arg.clone().unwrap());
                            } else if let Some(a) = &arg {
                                set.remove(a);
                            }
                        }
                        ModeKind::AlwaysArg => {
                            if adding {
                                self.arg_modes.insert(c, arg.clone().unwrap());
                            } else {
                                self.arg_modes.remove(&c);
                            }
                        }
                        ModeKind::ArgOnSet => {
                            if adding {
                                self.arg_modes.insert(c, arg.clone().unwrap());
                            } else {
                                self.arg_modes.remove(&c);
                            }
                        }
                        ModeKind::FlagOnly => {
                            if adding {
                                self.flags.insert(c);
                            } else {
                                self.flags.remove(&c);
                            }
                        }
                        ModeKind::Prefix => {
                            // No channel-level storage; the state tracker
                            // applies this to the target user's UserModes.
                        }
                    }

                    effects.push(ModeEffect { adding, mode: c, kind, arg });
                }
            }
        }

        Ok(effects)
    }

    /// Serializes the current modes as `("+xyz", [args...])`, address-list
    /// entries and the flag set in letter order, arg-bearing modes after.
    pub fn serialize(&self) -> (String, Vec<String>) {
        let mut letters = String::new();
        let mut args = Vec::new();

        for (mode, masks) in &self.address_lists {
            for mask in masks {
                letters.push(*mode);
                args.push(mask.clone());
            }
        }
        for c in &self.flags {
            letters.push(*c);
        }
        for (mode, arg) in &self.arg_modes {
            letters.push(*mode);
            args.push(arg.clone());
        }

        (format!("+{letters}"), args)
    }
}

/// A bitset of the prefix (status) modes a user currently holds within a
/// single channel, e.g. operator and voice at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserModes(u32);

impl UserModes {
    pub fn empty() -> UserModes {
        UserModes(0)
    }

    pub fn set(&mut self, model: &ModeKindModel, mode: char) {
        if let Some(i) = model.prefix_index(mode) {
            self.0 |= 1 << i;
        }
    }

    pub fn unset(&mut self, model: &ModeKindModel, mode: char) {
        if let Some(i) = model.prefix_index(mode) {
            self.0 &= !(1 << i);
        }
    }

    pub fn has(&self, model: &ModeKindModel, mode: char) -> bool {
        model.prefix_index(mode).is_some_and(|i| self.0 & (1 << i) != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// The highest-power status character this user currently holds, if
    /// any — what `NAMES`/`WHO` would render before their nick.
    pub fn highest_prefix_char(&self, model: &ModeKindModel) -> Option<char> {
        for (i, (_, status)) in model.prefix_pairs().iter().enumerate() {
            if self.0 & (1 << i) != 0 {
                return Some(*status);
            }
        }
        None
    }

    /// Decodes every leading status character of a `NAMES`-style nick
    /// (`@+nick`), returning the resulting `UserModes` and the bare nick.
    pub fn decode_prefixed_nick<'a>(model: &ModeKindModel, raw: &'a str) -> (UserModes, &'a str) {
        let mut modes = UserModes::empty();
        let mut rest = raw;
        while let Some(c) = rest.chars().next() {
            if let Some(mode) = model.prefix_pairs().iter().find(|(_, s)| *s == c).map(|(m, _)| *m) {
                modes.set(model, mode);
                rest = &rest[c.len_utf8()..];
            } else {
                break;
            }
        }
        (modes, rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::NetworkInfo;

    fn model() -> ModeKindModel {
        let info = NetworkInfo::new();
        info.parse_isupport(&[
            "nick".to_owned(),
            "PREFIX=(ov)@+".to_owned(),
            "CHANMODES=beI,k,l,imnpst".to_owned(),
        ]);
        ModeKindModel::derive(&info)
    }

    #[test]
    fn classifies_each_group() {
        let m = model();
        assert_eq!(m.classify('b'), ModeKind::AddressList);
        assert_eq!(m.classify('k'), ModeKind::AlwaysArg);
        assert_eq!(m.classify('l'), ModeKind::ArgOnSet);
        assert_eq!(m.classify('n'), ModeKind::FlagOnly);
        assert_eq!(m.classify('o'), ModeKind::Prefix);
    }

    #[test]
    fn applies_flag_only_modes() {
        let m = model();
        let mut cm = ChannelModes::new();
        cm.apply(&m, "+nt", &[]).unwrap();
        assert!(cm.has_flag('n'));
        assert!(cm.has_flag('t'));
        cm.apply(&m, "-n", &[]).unwrap();
        assert!(!cm.has_flag('n'));
        assert!(cm.has_flag('t'));
    }

    #[test]
    fn applies_address_list_modes() {
        let m = model();
        let mut cm = ChannelModes::new();
        cm.apply(&m, "+b", &["*!*@spammer.example".to_owned()]).unwrap();
        assert!(cm.address_list('b').unwrap().contains("*!*@spammer.example"));
        cm.apply(&m, "-b", &["*!*@spammer.example".to_owned()]).unwrap();
        assert!(cm.address_list('b').map(|s| s.is_empty()).unwrap_or(true));
    }

    #[test]
    fn applies_arg_on_set_modes() {
        let m = model();
        let mut cm = ChannelModes::new();
        cm.apply(&m, "+l", &["50".to_owned()]).unwrap();
        assert_eq!(cm.arg('l'), Some("50"));
        cm.apply(&m, "-l", &[]).unwrap();
        assert_eq!(cm.arg('l'), None);
    }

    #[test]
    fn applies_mixed_add_remove_group() {
        let m = model();
        let mut cm = ChannelModes::new();
        let effects = cm.apply(&m, "+n-t+k", &["secret".to_owned()]).unwrap();
        assert!(cm.has_flag('n'));
        assert!(!cm.has_flag('t'));
        assert_eq!(cm.arg('k'), Some("secret"));
        assert_eq!(effects.len(), 3);
    }

    #[test]
    fn missing_argument_is_an_error() {
        let m = model();
        let mut cm = ChannelModes::new();
        assert_eq!(cm.apply(&m, "+k", &[]), Err(ModeError::MissingArgument('k')));
    }

    #[test]
    fn serialize_round_trips_through_apply() {
        let m = model();
        let mut cm = ChannelModes::new();
        cm.apply(&m, "+ntl", &["20".to_owned()]).unwrap();
        let (letters, args) = cm.serialize();
        let mut cm2 = ChannelModes::new();
        cm2.apply(&m, &letters, &args).unwrap();
        assert_eq!(cm, cm2);
    }

    #[test]
    fn serialize_round_trips_address_list_modes() {
        let m = model();
        let mut cm = ChannelModes::new();
        cm.apply(
            &m,
            "+beI",
            &["*!*@banned.example".to_owned(), "*!*@except.example".to_owned(), "*!*@invited.example".to_owned()],
        )
        .unwrap();
        let (letters, args) = cm.serialize();
        let mut cm2 = ChannelModes::new();
        cm2.apply(&m, &letters, &args).unwrap();
        assert_eq!(cm, cm2);
        assert!(cm2.address_list('b').unwrap().contains("*!*@banned.example"));
        assert!(cm2.address_list('e').unwrap().contains("*!*@except.example"));
        assert!(cm2.address_list('I').unwrap().contains("*!*@invited.example"));
    }

    #[test]
    fn user_modes_track_prefix_changes() {
        let m = model();
        let mut um = UserModes::empty();
        um.set(&m, 'o');
        assert!(um.has(&m, 'o'));
        assert!(!um.has(&m, 'v'));
        assert_eq!(um.highest_prefix_char(&m), Some('@'));
        um.set(&m, 'v');
        assert_eq!(um.highest_prefix_char(&m), Some('@'));
        um.unset(&m, 'o');
        assert_eq!(um.highest_prefix_char(&m), Some('+'));
    }

    #[test]
    fn decodes_prefixed_names_reply_nick() {
        let m = model();
        let (modes, nick) = UserModes::decode_prefixed_nick(&m, "@+nick");
        assert_eq!(nick, "nick");
        assert!(modes.has(&m, 'o'));
        assert!(modes.has(&m, 'v'));
    }
}
