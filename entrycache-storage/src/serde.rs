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

use std::hash::Hasher;

use bytes::{Buf, BufMut};
use entrycache_common::error::{Error, ErrorKind, Result};
use twox_hash::XxHash64;

#[derive(Debug)]
pub struct Checksummer;

impl Checksummer {
    pub fn checksum64(parts: &[&[u8]]) -> u64 {
        let mut hasher = XxHash64::with_seed(0);
        for part in parts {
            hasher.write(part);
        }
        hasher.finish()
    }
}

const RECORD_MAGIC: u32 = 0x5e_ca_c4_00;
const RECORD_MAGIC_MASK: u32 = 0xff_ff_ff_00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    Put = 1,
    Delete = 2,
}

impl TryFrom<u8> for RecordKind {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            1 => Ok(Self::Put),
            2 => Ok(Self::Delete),
            _ => Err(Error::new(ErrorKind::Parse, "unknown record kind").with_context("kind", v)),
        }
    }
}

/// Header in front of every record of a store log.
///
/// ```plain
/// | key len (4B) | value len (4B) | checksum (8B) | magic (3B) | kind (1B) |
/// ```
///
/// The checksum covers the key followed by the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub kind: RecordKind,
    pub key_len: u32,
    pub value_len: u32,
    pub checksum: u64,
}

impl RecordHeader {
    pub const fn serialized_len() -> usize {
        4 + 4 + 8 + 4 /* magic & kind */
    }

    pub fn record_len(&self) -> usize {
        Self::serialized_len() + self.key_len as usize + self.value_len as usize
    }

    pub fn write(&self, mut buf: impl BufMut) {
        buf.put_u32(self.key_len);
        buf.put_u32(self.value_len);
        buf.put_u64(self.checksum);
        buf.put_u32(RECORD_MAGIC | self.kind as u32);
    }

    pub fn read(mut buf: impl Buf) -> Result<Self> {
        if buf.remaining() < Self::serialized_len() {
            return Err(Error::truncated("record header", Self::serialized_len(), buf.remaining()));
        }

        let key_len = buf.get_u32();
        let value_len = buf.get_u32();
        let checksum = buf.get_u64();
        let v = buf.get_u32();

        tracing::trace!("read record header, key len: {key_len}, value len: {value_len}, checksum: {checksum}, extra: {v}");

        let magic = v & RECORD_MAGIC_MASK;
        if magic != RECORD_MAGIC {
            return Err(Error::new(ErrorKind::MagicMismatch, "record header magic mismatch")
                .with_context("expected", RECORD_MAGIC)
                .with_context("get", magic));
        }
        let kind = RecordKind::try_from(v as u8)?;

        Ok(Self {
            kind,
            key_len,
            value_len,
            checksum,
        })
    }
}
