//! Persisted shapes: stored users, stored channels, and the hierarchical
//! access-grant model (numeric levels plus a 64-bit flag set).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A 64-bit set of access flags, addressed by letters `A`-`Z`/`a`-`z`.
/// Lowercase letters occupy bits 0-25, uppercase 26-51; bits 52-63 are
/// unused reserve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags(pub u64);

impl Flags {
    pub fn empty() -> Flags {
        Flags(0)
    }

    fn bit_for(c: char) -> Option<u32> {
        match c {
            'a'..='z' => Some(c as u32 - 'a' as u32),
            'A'..='Z' => Some(26 + (c as u32 - 'A' as u32)),
            _ => None,
        }
    }

    /// Parses a string of flag letters (e.g. `"abK"`) into a `Flags` set,
    /// silently ignoring characters outside `A-Za-z`.
    pub fn parse(s: &str) -> Flags {
        let mut bits = 0u64;
        for c in s.chars() {
            if let Some(b) = Flags::bit_for(c) {
                bits |= 1 << b;
            }
        }
        Flags(bits)
    }

    pub fn has(&self, c: char) -> bool {
        Flags::bit_for(c).is_some_and(|b| self.0 & (1 << b) != 0)
    }

    pub fn set(&mut self, c: char) {
        if let Some(b) = Flags::bit_for(c) {
            self.0 |= 1 << b;
        }
    }

    pub fn unset(&mut self, c: char) {
        if let Some(b) = Flags::bit_for(c) {
            self.0 &= !(1 << b);
        }
    }

    pub fn union(&self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }

    /// True iff every character in `needed` is present in this set.
    pub fn has_all(&self, needed: &str) -> bool {
        needed.chars().all(|c| self.has(c))
    }

    pub fn to_string(&self) -> String {
        let mut out = String::new();
        for c in ('a'..='z').chain('A'..='Z') {
            if self.has(c) {
                out.push(c);
            }
        }
        out
    }
}

/// A single access grant within one scope: a numeric level (`0` means "no
/// level assigned") and a flag set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub level: u8,
    pub flags: Flags,
}

/// Builds the scope key for a grant: `""` for global, `network` for a
/// per-network grant, `network:channel` for a per-channel grant.
pub fn scope_key(network: Option<&str>, channel: Option<&str>) -> String {
    match (network, channel) {
        (None, _) => String::new(),
        (Some(net), None) => net.to_owned(),
        (Some(net), Some(chan)) => format!("{net}:{chan}"),
    }
}

/// A registered user: credentials, recognized masks, and hierarchical
/// access grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUser {
    pub username: String,
    /// A bcrypt hash, never a plaintext password.
    pub password: String,
    pub masks: Vec<String>,
    pub access: BTreeMap<String, Grant>,
    pub data: BTreeMap<String, String>,
}

impl StoredUser {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> StoredUser {
        StoredUser {
            username: username.into(),
            password: password_hash.into(),
            masks: Vec::new(),
            access: BTreeMap::new(),
            data: BTreeMap::new(),
        }
    }

    /// Returns every grant whose scope "covers" `(network, channel)`:
    /// global always covers; a per-network grant covers any channel on
    /// that network; a per-channel grant covers only that exact channel.
    fn covering_grants(&self, network: Option<&str>, channel: Option<&str>) -> Vec<&Grant> {
        let mut out = Vec::new();
        if let Some(g) = self.access.get("") {
            out.push(g);
        }
        if let Some(net) = network {
            if let Some(g) = self.access.get(net) {
                out.push(g);
            }
            if let Some(chan) = channel {
                if let Some(g) = self.access.get(&scope_key(Some(net), Some(chan))) {
                    out.push(g);
                }
            }
        }
        out
    }

    /// True if any covering scope's level is `>= n`.
    pub fn has_level(&self, network: Option<&str>, channel: Option<&str>, n: u8) -> bool {
        self.covering_grants(network, channel)
            .iter()
            .any(|g| g.level >= n)
    }

    /// True iff every letter in `needed` is present in the union of every
    /// covering scope's flags.
    pub fn has_flags(&self, network: Option<&str>, channel: Option<&str>, needed: &str) -> bool {
        let union = self
            .covering_grants(network, channel)
            .into_iter()
            .fold(Flags::empty(), |acc, g| acc.union(g.flags));
        union.has_all(needed)
    }

    /// The highest level granted at any covering scope.
    pub fn highest_level(&self, network: Option<&str>, channel: Option<&str>) -> u8 {
        self.covering_grants(network, channel)
            .iter()
            .map(|g| g.level)
            .max()
            .unwrap_or(0)
    }
}

/// An opaque per-channel key/value payload, scoped to one network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChannel {
    pub network_id: String,
    pub name: String,
    pub data: BTreeMap<String, String>,
}

impl StoredChannel {
    pub fn new(network_id: impl Into<String>, name: impl Into<String>) -> StoredChannel {
        StoredChannel {
            network_id: network_id.into(),
            name: name.into(),
            data: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_roundtrip_through_string() {
        let f = Flags::parse("abK");
        assert!(f.has('a'));
        assert!(f.has('b'));
        assert!(f.has('K'));
        assert!(!f.has('k'));
        assert_eq!(f.to_string(), "abK");
    }

    #[test]
    fn has_level_checks_all_covering_scopes() {
        let mut u = StoredUser::new("fish", "hash");
        u.access.insert("".to_owned(), Grant { level: 100, flags: Flags::empty() });
        u.access.insert("net1".to_owned(), Grant { level: 250, flags: Flags::empty() });
        assert!(u.has_level(Some("net1"), None, 250));
        assert!(!u.has_level(Some("net2"), None, 250));
        assert!(u.has_level(Some("net2"), None, 100));
    }

    #[test]
    fn has_flags_unions_across_scopes() {
        let mut u = StoredUser::new("fish", "hash");
        u.access.insert("".to_owned(), Grant { level: 0, flags: Flags::parse("a") });
        u.access.insert(
            scope_key(Some("net1"), Some("#chan")),
            Grant { level: 0, flags: Flags::parse("b") },
        );
        assert!(u.has_flags(Some("net1"), Some("#chan"), "ab"));
        assert!(!u.has_flags(Some("net1"), Some("#other"), "ab"));
        assert!(u.has_flags(Some("net1"), Some("#other"), "a"));
    }
}
