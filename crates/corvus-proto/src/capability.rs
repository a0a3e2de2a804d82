//! Per-network capability snapshot: defaults plus whatever the server
//! actually announces via the `004` (`RPL_MYINFO`) and `005`
//! (`RPL_ISUPPORT`) numerics.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::CapabilityError;

/// The bracketed `PREFIX` ISUPPORT token, e.g. `(ov)@+`: channel mode
/// letters paired with the status character they render as, ordered from
/// highest to lowest power.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixSpec {
    pairs: Vec<(char, char)>,
}

impl PrefixSpec {
    fn parse(token: &str) -> Result<PrefixSpec, CapabilityError> {
        let rest = token
            .strip_prefix('(')
            .ok_or_else(|| CapabilityError::MalformedPrefix(token.to_owned()))?;
        let (modes, chars) = rest
            .split_once(')')
            .ok_or_else(|| CapabilityError::MalformedPrefix(token.to_owned()))?;
        if modes.len() != chars.len() {
            return Err(CapabilityError::MalformedPrefix(token.to_owned()));
        }
        Ok(PrefixSpec {
            pairs: modes.chars().zip(chars.chars()).collect(),
        })
    }

    /// Mode letters paired with their status characters, ordered from
    /// highest power (e.g. `o`) to lowest (e.g. `v`).
    pub fn pairs(&self) -> &[(char, char)] {
        &self.pairs
    }

    /// The status character for a given mode letter, if it is a prefix mode.
    pub fn char_for_mode(&self, mode: char) -> Option<char> {
        self.pairs.iter().find(|(m, _)| *m == mode).map(|(_, c)| *c)
    }

    /// The mode letter for a given status character, if recognized.
    pub fn mode_for_char(&self, status: char) -> Option<char> {
        self.pairs.iter().find(|(_, c)| *c == status).map(|(m, _)| *m)
    }

    fn default_spec() -> PrefixSpec {
        PrefixSpec {
            pairs: vec![('o', '@'), ('v', '+')],
        }
    }
}

/// The `CHANMODES` ISUPPORT token's four comma-separated letter groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChanModesSpec {
    /// Group A: address-list modes (always take an argument; the argument
    /// is a mask, and the mode is a set rather than a single value).
    pub address_list: String,
    /// Group B: modes that always take an argument.
    pub always_arg: String,
    /// Group C: modes that take an argument only when being set.
    pub arg_on_set: String,
    /// Group D: modes that never take an argument.
    pub flag_only: String,
}

impl ChanModesSpec {
    fn parse(token: &str) -> Result<ChanModesSpec, CapabilityError> {
        let mut groups = token.split(',');
        let a = groups.next();
        let b = groups.next();
        let c = groups.next();
        let d = groups.next();
        match (a, b, c, d) {
            (Some(a), Some(b), Some(c), Some(d)) => Ok(ChanModesSpec {
                address_list: a.to_owned(),
                always_arg: b.to_owned(),
                arg_on_set: c.to_owned(),
                flag_only: d.to_owned(),
            }),
            _ => Err(CapabilityError::MalformedChanModes(token.to_owned())),
        }
    }

    fn default_spec() -> ChanModesSpec {
        ChanModesSpec {
            address_list: "b".to_owned(),
            always_arg: "k".to_owned(),
            arg_on_set: "l".to_owned(),
            flag_only: "imnpst".to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
struct Inner {
    servername: String,
    ircd_version: String,
    usermodes: String,
    legacy_chanmodes: String,
    casemapping: String,
    chantypes: String,
    prefix: PrefixSpec,
    chanmodes: ChanModesSpec,
    chanlimit: BTreeMap<char, u32>,
    channellen: u32,
    nicklen: u32,
    topiclen: u32,
    awaylen: u32,
    kicklen: u32,
    modes: u32,
    rfc: Option<String>,
    extra: BTreeMap<String, Option<String>>,
}

impl Default for Inner {
    fn default() -> Inner {
        Inner {
            servername: String::new(),
            ircd_version: String::new(),
            usermodes: String::new(),
            legacy_chanmodes: String::new(),
            casemapping: "ascii".to_owned(),
            chantypes: "#&~".to_owned(),
            prefix: PrefixSpec::default_spec(),
            chanmodes: ChanModesSpec::default_spec(),
            chanlimit: BTreeMap::new(),
            channellen: 200,
            nicklen: 9,
            topiclen: 390,
            awaylen: 160,
            kicklen: 180,
            modes: 3,
            rfc: Some("RFC2812".to_owned()),
            extra: BTreeMap::new(),
        }
    }
}

/// A per-network capability snapshot, safe for concurrent readers while a
/// single writer (the parse loop) applies `004`/`005` updates.
#[derive(Debug, Default)]
pub struct NetworkInfo {
    inner: RwLock<Inner>,
}

impl Clone for NetworkInfo {
    fn clone(&self) -> NetworkInfo {
        NetworkInfo {
            inner: RwLock::new(self.inner.read().clone()),
        }
    }
}

impl NetworkInfo {
    /// Builds a fresh snapshot with RFC2812 defaults.
    pub fn new() -> NetworkInfo {
        NetworkInfo::default()
    }

    pub fn servername(&self) -> String {
        self.inner.read().servername.clone()
    }

    pub fn ircd_version(&self) -> String {
        self.inner.read().ircd_version.clone()
    }

    pub fn usermodes(&self) -> String {
        self.inner.read().usermodes.clone()
    }

    pub fn casemapping(&self) -> String {
        self.inner.read().casemapping.clone()
    }

    pub fn chantypes(&self) -> String {
        self.inner.read().chantypes.clone()
    }

    pub fn is_channel_name(&self, name: &str) -> bool {
        name.chars()
            .next()
            .map(|c| self.inner.read().chantypes.contains(c))
            .unwrap_or(false)
    }

    pub fn prefix(&self) -> PrefixSpec {
        self.inner.read().prefix.clone()
    }

    pub fn chanmodes(&self) -> ChanModesSpec {
        self.inner.read().chanmodes.clone()
    }

    pub fn channellen(&self) -> u32 {
        self.inner.read().channellen
    }

    pub fn nicklen(&self) -> u32 {
        self.inner.read().nicklen
    }

    pub fn topiclen(&self) -> u32 {
        self.inner.read().topiclen
    }

    pub fn awaylen(&self) -> u32 {
        self.inner.read().awaylen
    }

    pub fn kicklen(&self) -> u32 {
        self.inner.read().kicklen
    }

    pub fn max_modes(&self) -> u32 {
        self.inner.read().modes
    }

    pub fn rfc(&self) -> Option<String> {
        self.inner.read().rfc.clone()
    }

    /// Looks up an unrecognized `005` key retained verbatim.
    pub fn extra(&self, key: &str) -> Option<Option<String>> {
        self.inner.read().extra.get(key).cloned()
    }

    /// Applies a `004 RPL_MYINFO` numeric's arguments:
    /// `<client> <servername> <version> <usermodes> [<chanmodes>]`.
    pub fn parse_myinfo(&self, args: &[String]) {
        let mut inner = self.inner.write();
        if let Some(server) = args.get(1) {
            inner.servername = server.clone();
        }
        if let Some(version) = args.get(2) {
            inner.ircd_version = version.clone();
        }
        if let Some(usermodes) = args.get(3) {
            inner.usermodes = usermodes.clone();
        }
        if let Some(chanmodes) = args.get(4) {
            inner.legacy_chanmodes = chanmodes.clone();
        }
    }

    /// Applies a `005 RPL_ISUPPORT` numeric's `key=value` tokens (skipping
    /// the leading target-nick argument and a trailing free-text message
    /// with no `=`).
    pub fn parse_isupport(&self, args: &[String]) {
        let mut inner = self.inner.write();

        for token in args.iter().skip(1) {
            let (key, value) = match token.split_once('=') {
                Some((k, v)) => (k, Some(v)),
                None => {
                    // A bare token with no '=' and no spaces is still a
                    // valid ISUPPORT flag (e.g. "EXCEPTS"); a token
                    // containing spaces is the trailing human-readable
                    // message and is not a capability at all.
                    if token.contains(' ') {
                        continue;
                    }
                    (token.as_str(), None)
                }
            };

            match key {
                "PREFIX" => {
                    if let Some(v) = value {
                        if let Ok(spec) = PrefixSpec::parse(v) {
                            inner.prefix = spec;
                        }
                    }
                }
                "CHANTYPES" => {
                    if let Some(v) = value {
                        inner.chantypes = v.to_owned();
                    }
                }
                "CHANMODES" => {
                    if let Some(v) = value {
                        if let Ok(spec) = ChanModesSpec::parse(v) {
                            inner.chanmodes = spec;
                        }
                    }
                }
                "CHANLIMIT" => {
                    if let Some(v) = value {
                        for entry in v.split(',') {
                            if let Some((chars, n)) = entry.split_once(':') {
                                if let Ok(n) = n.parse() {
                                    for c in chars.chars() {
                                        inner.chanlimit.insert(c, n);
                                    }
                                }
                            }
                        }
                    }
                }
                "CHANNELLEN" => {
                    if let Some(n) = value.and_then(|v| v.parse().ok()) {
                        inner.channellen = n;
                    }
                }
                "NICKLEN" => {
                    if let Some(n) = value.and_then(|v| v.parse().ok()) {
                        inner.nicklen = n;
                    }
                }
                "TOPICLEN" => {
                    if let Some(n) = value.and_then(|v| v.parse().ok()) {
                        inner.topiclen = n;
                    }
                }
                "AWAYLEN" => {
                    if let Some(n) = value.and_then(|v| v.parse().ok()) {
                        inner.awaylen = n;
                    }
                }
                "KICKLEN" => {
                    if let Some(n) = value.and_then(|v| v.parse().ok()) {
                        inner.kicklen = n;
                    }
                }
                "MODES" => {
                    if let Some(n) = value.and_then(|v| v.parse().ok()) {
                        inner.modes = n;
                    }
                }
                "CASEMAPPING" => {
                    if let Some(v) = value {
                        inner.casemapping = v.to_owned();
                    }
                }
                key if key.starts_with("RFC") => {
                    inner.rfc = Some(key.to_owned());
                }
                key => {
                    inner.extra.insert(key.to_owned(), value.map(str::to_owned));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_rfc2812() {
        let info = NetworkInfo::new();
        assert_eq!(info.casemapping(), "ascii");
        assert_eq!(info.chantypes(), "#&~");
        assert_eq!(info.prefix().pairs(), &[('o', '@'), ('v', '+')]);
        assert_eq!(info.rfc().as_deref(), Some("RFC2812"));
    }

    #[test]
    fn parses_myinfo() {
        let info = NetworkInfo::new();
        info.parse_myinfo(&args(&["nick", "irc.example.com", "unreal-6", "iowszcrkfydnxbauglZCD", "biklmnopstvrDcCNuMT"]));
        assert_eq!(info.servername(), "irc.example.com");
        assert_eq!(info.ircd_version(), "unreal-6");
        assert_eq!(info.usermodes(), "iowszcrkfydnxbauglZCD");
    }

    #[test]
    fn parses_isupport_prefix_and_chanmodes() {
        let info = NetworkInfo::new();
        info.parse_isupport(&args(&[
            "nick",
            "PREFIX=(qaohv)~&@%+",
            "CHANTYPES=#&",
            "CHANMODES=beI,k,l,imnpstaq",
            "NICKLEN=30",
            "are supported by this server",
        ]));
        assert_eq!(info.prefix().char_for_mode('q'), Some('~'));
        assert_eq!(info.prefix().char_for_mode('v'), Some('+'));
        assert_eq!(info.chantypes(), "#&");
        assert_eq!(info.chanmodes().address_list, "beI");
        assert_eq!(info.nicklen(), 30);
    }

    #[test]
    fn retains_unrecognized_keys() {
        let info = NetworkInfo::new();
        info.parse_isupport(&args(&["nick", "EXTBAN=~,cqnr", "WHOX"]));
        assert_eq!(info.extra("EXTBAN"), Some(Some("~,cqnr".to_owned())));
        assert_eq!(info.extra("WHOX"), Some(None));
    }

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }
}
