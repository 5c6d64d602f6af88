// Copyright 2026 foyer Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Distinguished names and the normalized cache keys derived from them.

use std::{
    fmt::Display,
    hash::{Hash, Hasher},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};

/// Characters that must be escaped inside a normalized attribute value.
const SPECIALS: &[char] = &[',', '+', '"', '\\', '<', '>', ';', '='];

/// A single `type=value` pair of a relative distinguished name, already normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ava {
    attr: String,
    value: String,
}

impl Ava {
    /// Normalized attribute type.
    pub fn attr(&self) -> &str {
        &self.attr
    }

    /// Normalized attribute value.
    pub fn value(&self) -> &str {
        &self.value
    }

    fn write_normalized(&self, out: &mut String) {
        out.push_str(&self.attr);
        out.push('=');
        for (i, c) in self.value.chars().enumerate() {
            if SPECIALS.contains(&c) || (i == 0 && c == '#') {
                out.push('\\');
            }
            out.push(c);
        }
    }
}

/// A relative distinguished name. Multi-valued components are kept sorted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rdn {
    avas: Vec<Ava>,
}

impl Rdn {
    /// Components of this RDN.
    pub fn avas(&self) -> &[Ava] {
        &self.avas
    }

    fn write_normalized(&self, out: &mut String) {
        for (i, ava) in self.avas.iter().enumerate() {
            if i > 0 {
                out.push('+');
            }
            ava.write_normalized(out);
        }
    }
}

/// A parsed distinguished name.
///
/// The RDNs are stored leaf first, the same order as the string form. Equality and hashing only consider the
/// normalized RDNs, so `CN=Alice, DC=Example` and `cn=alice,dc=example` are the same name.
#[derive(Debug, Clone)]
pub struct Dn {
    raw: String,
    rdns: Vec<Rdn>,
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.rdns == other.rdns
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rdns.hash(state);
    }
}

impl Dn {
    /// The empty (root) DN.
    pub fn root() -> Self {
        Self {
            raw: String::new(),
            rdns: vec![],
        }
    }

    /// Parse a DN from its string form.
    pub fn parse(s: &str) -> Result<Self> {
        let raw = s.trim().to_string();
        if raw.is_empty() {
            return Ok(Self::root());
        }

        let mut rdns = Vec::new();
        for component in split_unescaped(&raw, ',') {
            let mut avas = Vec::new();
            for ava in split_unescaped(&component, '+') {
                avas.push(parse_ava(&ava).map_err(|e| e.with_context("dn", &raw))?);
            }
            avas.sort();
            rdns.push(Rdn { avas });
        }

        Ok(Self { raw, rdns })
    }

    /// The DN as it was given.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// RDNs, leaf first.
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// Whether this is the root DN.
    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    /// The immediate superior, or `None` for the root DN.
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            return None;
        }
        let rdns = self.rdns[1..].to_vec();
        let raw = render(&rdns);
        Some(Self { raw, rdns })
    }

    /// Whether `self` is `base` or lies anywhere below it.
    pub fn is_descendant_of(&self, base: &Dn) -> bool {
        self.rdns.len() >= base.rdns.len() && self.rdns[self.rdns.len() - base.rdns.len()..] == base.rdns[..]
    }

    /// Normalized string form.
    pub fn normalized(&self) -> String {
        render(&self.rdns)
    }

    /// The cache key of this DN.
    pub fn key(&self) -> CacheKey {
        CacheKey(self.normalized())
    }
}

impl FromStr for Dn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Display for Dn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Normalized, byte-comparable identity of a directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Parse and normalize a DN string into a cache key.
    pub fn parse(dn: &str) -> Result<Self> {
        Dn::parse(dn).map(|dn| dn.key())
    }

    /// Wrap a string that is already in normalized form, e.g. read back from a persisted snapshot.
    pub fn from_normalized(normalized: impl Into<String>) -> Self {
        Self(normalized.into())
    }

    /// Normalized string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Byte form used as the durable store key.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Parse the key back into a [`Dn`].
    pub fn to_dn(&self) -> Result<Dn> {
        Dn::parse(&self.0)
    }

    /// Whether the entry named by `self` is `base` or lies below it.
    ///
    /// Works on the normalized form directly: `self` must end with `base` and the remaining prefix must end with an
    /// unescaped RDN separator.
    pub fn is_descendant_of(&self, base: &CacheKey) -> bool {
        if base.0.is_empty() || self.0 == base.0 {
            return true;
        }
        if self.0.len() <= base.0.len() || !self.0.ends_with(base.0.as_str()) {
            return false;
        }
        let prefix = &self.0.as_bytes()[..self.0.len() - base.0.len()];
        match prefix.split_last() {
            Some((b',', rest)) => rest.iter().rev().take_while(|&&b| b == b'\\').count() % 2 == 0,
            _ => false,
        }
    }
}

impl From<&Dn> for CacheKey {
    fn from(dn: &Dn) -> Self {
        dn.key()
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn render(rdns: &[Rdn]) -> String {
    let mut out = String::new();
    for (i, rdn) in rdns.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        rdn.write_normalized(&mut out);
    }
    out
}

/// Split on `sep`, ignoring separators preceded by a backslash. Escapes are kept for the next stage.
fn split_unescaped(s: &str, sep: char) -> Vec<String> {
    let mut parts = vec![];
    let mut current = String::new();
    let mut escaped = false;
    for c in s.chars() {
        if escaped {
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            current.push(c);
            escaped = true;
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

fn parse_ava(s: &str) -> Result<Ava> {
    let mut escaped = false;
    let mut split = None;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '=' {
            split = Some(i);
            break;
        }
    }
    let Some(split) = split else {
        return Err(Error::new(ErrorKind::Parse, "missing '=' in RDN component").with_context("component", s));
    };

    let attr = s[..split].trim().to_ascii_lowercase();
    let attr = attr.strip_prefix("oid.").map(str::to_string).unwrap_or(attr);
    if attr.is_empty() {
        return Err(Error::new(ErrorKind::Parse, "empty attribute type").with_context("component", s));
    }

    let value = unescape(&s[split + 1..]).map_err(|e| e.with_context("component", s))?;
    Ok(Ava {
        attr,
        value: normalize_value(&value),
    })
}

fn unescape(s: &str) -> Result<String> {
    let mut bytes = Vec::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let Some(first) = chars.next() else {
            return Err(Error::new(ErrorKind::Parse, "dangling escape"));
        };
        match (first.to_digit(16), chars.peek().and_then(|c| c.to_digit(16))) {
            (Some(hi), Some(lo)) => {
                chars.next();
                bytes.push((hi * 16 + lo) as u8);
            }
            _ => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(first.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    String::from_utf8(bytes).map_err(|e| Error::new(ErrorKind::Parse, "escaped value is not UTF-8").with_source(e))
}

/// Case-ignore normalization: trim, collapse inner whitespace, lower-case.
pub fn normalize_value(value: &str) -> String {
    value
        .split_whitespace()
        .flat_map(|word| [" "].into_iter().chain(std::iter::once(word)))
        .skip(1)
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        let a = Dn::parse("CN=Alice  Smith, OU=People ,DC=Example,DC=com").unwrap();
        let b = Dn::parse("cn=alice smith,ou=people,dc=example,dc=com").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().as_str(), "cn=alice smith,ou=people,dc=example,dc=com");
        assert_eq!(a.to_string(), "CN=Alice  Smith, OU=People ,DC=Example,DC=com");
    }

    #[test]
    fn test_multi_valued_rdn_is_sorted() {
        let a = Dn::parse("uid=bob+cn=Bob,dc=example").unwrap();
        let b = Dn::parse("cn=bob+uid=bob,dc=example").unwrap();
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().as_str(), "cn=bob+uid=bob,dc=example");
    }

    #[test]
    fn test_escapes() {
        let dn = Dn::parse(r"cn=Smith\, John,dc=example").unwrap();
        assert_eq!(dn.rdns().len(), 2);
        assert_eq!(dn.rdns()[0].avas()[0].value(), "smith, john");
        assert_eq!(dn.key().as_str(), r"cn=smith\, john,dc=example");

        let hex = Dn::parse(r"cn=Smith\2C John,dc=example").unwrap();
        assert_eq!(hex, dn);

        let round = dn.key().to_dn().unwrap();
        assert_eq!(round, dn);
    }

    #[test]
    fn test_invalid() {
        assert_eq!(Dn::parse("cn").unwrap_err().kind(), ErrorKind::Parse);
        assert_eq!(Dn::parse("=x,dc=example").unwrap_err().kind(), ErrorKind::Parse);
        assert_eq!(Dn::parse(r"cn=x\").unwrap_err().kind(), ErrorKind::Parse);
        assert!(Dn::parse("").unwrap().is_root());
    }

    #[test]
    fn test_parent() {
        let dn = Dn::parse("cn=a,ou=b,dc=c").unwrap();
        let parent = dn.parent().unwrap();
        assert_eq!(parent.key().as_str(), "ou=b,dc=c");
        assert!(Dn::root().parent().is_none());
    }

    #[test]
    fn test_descendants() {
        let base = CacheKey::parse("ou=people,dc=example").unwrap();
        let child = CacheKey::parse("cn=a,ou=people,dc=example").unwrap();
        let sibling = CacheKey::parse("cn=a,ou=groups,dc=example").unwrap();
        let lookalike = CacheKey::parse("ou=xpeople,dc=example").unwrap();
        let escaped = CacheKey::parse(r"cn=x\,ou=people,dc=example").unwrap();

        assert!(child.is_descendant_of(&base));
        assert!(base.is_descendant_of(&base));
        assert!(!sibling.is_descendant_of(&base));
        assert!(!lookalike.is_descendant_of(&base));
        // `cn=x\,ou=people` is a single RDN directly under `dc=example`.
        assert!(!escaped.is_descendant_of(&base));
        assert!(child.is_descendant_of(&CacheKey::from(&Dn::root())));

        let base_dn = base.to_dn().unwrap();
        assert!(child.to_dn().unwrap().is_descendant_of(&base_dn));
        assert!(!sibling.to_dn().unwrap().is_descendant_of(&base_dn));
    }
}
