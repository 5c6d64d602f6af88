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

use bytes::{Buf, BufMut};
use entrycache_common::{
    dn::Dn,
    error::{Error, ErrorKind, Result},
};

use crate::entry::Entry;

const CODEC_VERSION: u8 = 1;

const FLAG_DN_EXCLUDED: u8 = 0b001;
const FLAG_COMPACT_OBJECT_CLASSES: u8 = 0b010;
const FLAG_COMPACT_ATTRIBUTE_TYPES: u8 = 0b100;

/// Names with a fixed token in the compact encoding.
///
/// Tokens are positions in this table plus one; token `0` means a literal name follows. The table is append-only:
/// reordering it would make previously cached bytes decode to different names.
const REGISTRY: &[&str] = &[
    // object classes
    "top",
    "person",
    "organizationalPerson",
    "inetOrgPerson",
    "groupOfNames",
    "groupOfUniqueNames",
    "organizationalUnit",
    "organization",
    "domain",
    "dcObject",
    "country",
    "locality",
    "device",
    "applicationProcess",
    "referral",
    "extensibleObject",
    "alias",
    "posixAccount",
    "posixGroup",
    "shadowAccount",
    // attribute types
    "objectClass",
    "cn",
    "sn",
    "givenName",
    "uid",
    "mail",
    "telephoneNumber",
    "userPassword",
    "description",
    "member",
    "uniqueMember",
    "ou",
    "o",
    "dc",
    "c",
    "l",
    "st",
    "street",
    "postalCode",
    "title",
    "displayName",
    "employeeNumber",
    "manager",
    "seeAlso",
    "initials",
    "mobile",
    "homeDirectory",
    "uidNumber",
    "gidNumber",
    "loginShell",
    "memberUid",
    "ref",
    "aliasedObjectName",
    "creatorsName",
    "createTimestamp",
    "modifiersName",
    "modifyTimestamp",
];

fn token_of(name: &str) -> Option<u16> {
    REGISTRY.iter().position(|n| *n == name).map(|i| i as u16 + 1)
}

/// Options of [`EntryCodec::encode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Leave the DN out. The decoder then yields the root DN and the caller restores it from the cache key.
    ///
    /// Default: `true`.
    pub exclude_dn: bool,
    /// Write well-known object classes as tokens.
    ///
    /// Default: `false`.
    pub compact_object_classes: bool,
    /// Write well-known attribute types as tokens.
    ///
    /// Default: `false`.
    pub compact_attribute_types: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            exclude_dn: true,
            compact_object_classes: false,
            compact_attribute_types: false,
        }
    }
}

impl EncodeOptions {
    /// Options with both compact encodings toggled together.
    pub fn compact(enabled: bool) -> Self {
        Self {
            exclude_dn: true,
            compact_object_classes: enabled,
            compact_attribute_types: enabled,
        }
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.exclude_dn {
            flags |= FLAG_DN_EXCLUDED;
        }
        if self.compact_object_classes {
            flags |= FLAG_COMPACT_OBJECT_CLASSES;
        }
        if self.compact_attribute_types {
            flags |= FLAG_COMPACT_ATTRIBUTE_TYPES;
        }
        flags
    }
}

/// Storage representation of entries.
///
/// ```plain
/// | version (1B) | flags (1B) | [dn] | oc count (2B) | oc names ... | attr count (2B) | attrs ... |
///
/// attr:  | name | value count (4B) | values ... |
/// name:  compact: | token (2B) | [str if token == 0] |, otherwise | str |
/// str:   | len (4B) | utf-8 bytes |
/// ```
///
/// Integers are big-endian. The flags make every buffer self-describing, so buffers written with different
/// options can be decoded side by side.
#[derive(Debug)]
pub struct EntryCodec;

impl EntryCodec {
    /// Encode an entry.
    pub fn encode(entry: &Entry, options: &EncodeOptions) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128);
        buf.put_u8(CODEC_VERSION);
        buf.put_u8(options.flags());
        if !options.exclude_dn {
            put_str(&mut buf, entry.dn().as_str());
        }

        buf.put_u16(entry.object_classes().len() as u16);
        for oc in entry.object_classes() {
            put_name(&mut buf, oc, options.compact_object_classes);
        }

        buf.put_u16(entry.attributes().len() as u16);
        for attribute in entry.attributes() {
            put_name(&mut buf, attribute.name(), options.compact_attribute_types);
            buf.put_u32(attribute.values().len() as u32);
            for value in attribute.values() {
                put_str(&mut buf, value);
            }
        }

        buf
    }

    /// Decode an entry.
    ///
    /// Malformed buffers, including trailing garbage, yield [`ErrorKind::Decode`].
    pub fn decode(buf: &[u8]) -> Result<Entry> {
        let mut reader = Reader { buf };

        let version = reader.u8("version")?;
        if version != CODEC_VERSION {
            return Err(Error::new(ErrorKind::Decode, "unsupported entry encoding version").with_context("version", version));
        }
        let flags = reader.u8("flags")?;
        if flags & !(FLAG_DN_EXCLUDED | FLAG_COMPACT_OBJECT_CLASSES | FLAG_COMPACT_ATTRIBUTE_TYPES) != 0 {
            return Err(Error::new(ErrorKind::Decode, "unknown entry encoding flags").with_context("flags", flags));
        }

        let dn = match flags & FLAG_DN_EXCLUDED {
            0 => {
                let dn = reader.str("dn")?;
                Dn::parse(&dn).map_err(|e| Error::new(ErrorKind::Decode, "invalid dn").with_source(e))?
            }
            _ => Dn::root(),
        };
        let mut entry = Entry::new(dn);

        let ocs = reader.u16("object class count")?;
        for _ in 0..ocs {
            entry.add_object_class(reader.name(flags & FLAG_COMPACT_OBJECT_CLASSES != 0, "object class")?);
        }

        let attributes = reader.u16("attribute count")?;
        for _ in 0..attributes {
            let name = reader.name(flags & FLAG_COMPACT_ATTRIBUTE_TYPES != 0, "attribute type")?;
            let count = reader.u32("value count")?;
            let mut values = Vec::with_capacity((count as usize).min(reader.buf.len() / 4));
            for _ in 0..count {
                values.push(reader.str("attribute value")?);
            }
            entry.add_attribute(name, values);
        }

        if !reader.buf.is_empty() {
            return Err(
                Error::new(ErrorKind::Decode, "trailing bytes after entry").with_context("remaining", reader.buf.len())
            );
        }
        Ok(entry)
    }
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

fn put_name(buf: &mut Vec<u8>, name: &str, compact: bool) {
    if !compact {
        put_str(buf, name);
        return;
    }
    match token_of(name) {
        Some(token) => buf.put_u16(token),
        None => {
            buf.put_u16(0);
            put_str(buf, name);
        }
    }
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl Reader<'_> {
    fn ensure(&self, what: &'static str, len: usize) -> Result<()> {
        if self.buf.remaining() < len {
            return Err(Error::truncated(what, len, self.buf.remaining()));
        }
        Ok(())
    }

    fn u8(&mut self, what: &'static str) -> Result<u8> {
        self.ensure(what, 1)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self, what: &'static str) -> Result<u16> {
        self.ensure(what, 2)?;
        Ok(self.buf.get_u16())
    }

    fn u32(&mut self, what: &'static str) -> Result<u32> {
        self.ensure(what, 4)?;
        Ok(self.buf.get_u32())
    }

    fn str(&mut self, what: &'static str) -> Result<String> {
        let len = self.u32(what)? as usize;
        self.ensure(what, len)?;
        let (s, rest) = self.buf.split_at(len);
        self.buf = rest;
        String::from_utf8(s.to_vec())
            .map_err(|e| Error::new(ErrorKind::Decode, format!("{what} is not UTF-8")).with_source(e))
    }

    fn name(&mut self, compact: bool, what: &'static str) -> Result<String> {
        if !compact {
            return self.str(what);
        }
        match self.u16(what)? {
            0 => self.str(what),
            token => REGISTRY
                .get(token as usize - 1)
                .map(|n| n.to_string())
                .ok_or_else(|| Error::new(ErrorKind::Decode, format!("unknown {what} token")).with_context("token", token)),
        }
    }
}
