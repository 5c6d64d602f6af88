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

use std::{
    fs::{File, OpenOptions},
    io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use bytes::{BufMut, Bytes};
use entrycache_common::error::{Error, ErrorKind, Result};
use hashbrown::HashMap;
use itertools::Itertools;
use parking_lot::{Mutex, RwLock};

use crate::{
    memory::ReadCache,
    params::StoreProperties,
    serde::{Checksummer, RecordHeader, RecordKind},
};

/// State shared by all stores of an environment.
#[derive(Debug)]
pub(crate) struct Shared {
    pub read_cache: Mutex<ReadCache>,
    pub properties: RwLock<StoreProperties>,
}

#[derive(Debug, Clone, Copy)]
struct Location {
    offset: u64,
    key_len: u32,
    value_len: u32,
    checksum: u64,
}

impl Location {
    fn record_len(&self) -> u64 {
        (RecordHeader::serialized_len() + self.key_len as usize + self.value_len as usize) as u64
    }
}

#[derive(Debug)]
struct Inner {
    file: File,
    /// End of the last valid record. Appends go here.
    len: u64,
    /// Bytes of records that are still reachable from the index.
    live: u64,
    index: HashMap<Vec<u8>, Location>,
}

/// Statistics of a single store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Store name.
    pub name: String,
    /// Number of live keys.
    pub records: usize,
    /// Log size in bytes.
    pub footprint: u64,
    /// Bytes of the log still holding live records.
    pub live_bytes: u64,
}

/// A named, log-structured key to bytes store.
///
/// Every mutation appends a checksummed record to `<name>.log`; an in-memory index maps keys to their latest
/// record. Opening a store replays the log and truncates a torn or corrupt tail. Each operation is atomic on its
/// own: a record is either fully appended and indexed or not visible at all.
#[derive(Debug)]
pub struct Store {
    id: u32,
    name: String,
    path: PathBuf,
    inner: Mutex<Inner>,
    shared: Arc<Shared>,
}

impl Store {
    pub(crate) fn open(id: u32, name: &str, dir: &Path, shared: Arc<Shared>) -> Result<Self> {
        let path = dir.join(format!("{name}.log"));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::io_error(e).with_context("path", path.display()))?;

        let inner = Self::recover(name, file)?;
        tracing::debug!(
            "[store]: opened {name}, records: {}, log size: {}",
            inner.index.len(),
            inner.len
        );

        Ok(Self {
            id,
            name: name.to_string(),
            path,
            inner: Mutex::new(inner),
            shared,
        })
    }

    fn recover(name: &str, file: File) -> Result<Inner> {
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(&file);
        reader.seek(SeekFrom::Start(0))?;

        let mut index: HashMap<Vec<u8>, Location> = HashMap::new();
        let mut live = 0;
        let mut offset = 0;
        let mut header_buf = [0u8; RecordHeader::serialized_len()];

        let corruption = loop {
            if offset == file_len {
                break None;
            }
            if file_len - offset < header_buf.len() as u64 {
                break Some(Error::truncated("record header", header_buf.len(), (file_len - offset) as usize));
            }
            reader.read_exact(&mut header_buf)?;
            let header = match RecordHeader::read(&header_buf[..]) {
                Ok(header) => header,
                Err(e) => break Some(e),
            };
            let body_len = header.key_len as usize + header.value_len as usize;
            let remaining = file_len - offset - header_buf.len() as u64;
            if remaining < body_len as u64 {
                break Some(Error::truncated("record body", body_len, remaining as usize));
            }
            let mut body = vec![0u8; body_len];
            reader.read_exact(&mut body)?;
            if Checksummer::checksum64(&[&body]) != header.checksum {
                break Some(Error::new(ErrorKind::ChecksumMismatch, "record checksum mismatch"));
            }

            let key = body[..header.key_len as usize].to_vec();
            match header.kind {
                RecordKind::Put => {
                    let location = Location {
                        offset,
                        key_len: header.key_len,
                        value_len: header.value_len,
                        checksum: header.checksum,
                    };
                    live += location.record_len();
                    if let Some(old) = index.insert(key, location) {
                        live -= old.record_len();
                    }
                }
                RecordKind::Delete => {
                    if let Some(old) = index.remove(&key) {
                        live -= old.record_len();
                    }
                }
            }
            offset += header.record_len() as u64;
        };

        drop(reader);
        if let Some(e) = corruption {
            tracing::warn!("[store]: truncating log of {name} at offset {offset} of {file_len}: {e}");
            file.set_len(offset)?;
            file.sync_all()?;
        }

        Ok(Inner {
            file,
            len: offset,
            live,
            index,
        })
    }

    /// Name of the store.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the store log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the value of a key.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        if let Some(value) = self.shared.read_cache.lock().get(self.id, key) {
            return Ok(Some(value));
        }

        let mut inner = self.inner.lock();
        let Some(location) = inner.index.get(key).copied() else {
            return Ok(None);
        };

        let mut body = vec![0u8; location.key_len as usize + location.value_len as usize];
        inner
            .file
            .seek(SeekFrom::Start(location.offset + RecordHeader::serialized_len() as u64))?;
        inner.file.read_exact(&mut body)?;

        if self.shared.properties.read().verify_checksums && Checksummer::checksum64(&[&body]) != location.checksum {
            return Err(Error::new(ErrorKind::ChecksumMismatch, "record checksum mismatch")
                .with_context("store", &self.name)
                .with_context("offset", location.offset));
        }

        let value = Bytes::from(body.split_off(location.key_len as usize));
        self.shared.read_cache.lock().insert(self.id, key, value.clone());
        Ok(Some(value))
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.inner.lock().index.contains_key(key)
    }

    /// Put a value, replacing any previous one.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let location = self.append(&mut inner, RecordKind::Put, key, value)?;
        inner.live += location.record_len();
        if let Some(old) = inner.index.insert(key.to_vec(), location) {
            inner.live -= old.record_len();
        }
        self.shared.read_cache.lock().invalidate(self.id, key);
        self.maybe_compact(&mut inner);
        Ok(())
    }

    /// Delete a key. Returns whether it was present.
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        let mut inner = self.inner.lock();
        if !inner.index.contains_key(key) {
            return Ok(false);
        }
        self.append(&mut inner, RecordKind::Delete, key, &[])?;
        if let Some(old) = inner.index.remove(key) {
            inner.live -= old.record_len();
        }
        self.shared.read_cache.lock().invalidate(self.id, key);
        self.maybe_compact(&mut inner);
        Ok(true)
    }

    /// Drop every record. The store stays open and usable.
    pub fn truncate(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.file.set_len(0)?;
        inner.file.sync_all()?;
        inner.len = 0;
        inner.live = 0;
        inner.index.clear();
        self.shared.read_cache.lock().invalidate_store(self.id);
        tracing::debug!("[store]: truncated {}", self.name);
        Ok(())
    }

    /// Rewrite the log with live records only, if its utilization is below `cleaner.min-utilization`.
    ///
    /// Returns whether the log was rewritten.
    pub fn clean(&self) -> Result<bool> {
        let mut inner = self.inner.lock();
        let threshold = self.shared.properties.read().cleaner_min_utilization;
        if inner.len == 0 || utilization(&inner) >= threshold {
            return Ok(false);
        }
        self.compact(&mut inner)?;
        Ok(true)
    }

    /// Flush the log to disk.
    pub fn sync(&self) -> Result<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.inner.lock().index.len()
    }

    /// Whether the store has no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the log in bytes.
    pub fn footprint(&self) -> u64 {
        self.inner.lock().len
    }

    /// Statistics of the store.
    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.lock();
        StoreStats {
            name: self.name.clone(),
            records: inner.index.len(),
            footprint: inner.len,
            live_bytes: inner.live,
        }
    }

    fn append(&self, inner: &mut Inner, kind: RecordKind, key: &[u8], value: &[u8]) -> Result<Location> {
        let header = RecordHeader {
            kind,
            key_len: key.len() as u32,
            value_len: value.len() as u32,
            checksum: Checksummer::checksum64(&[key, value]),
        };
        let mut buf = Vec::with_capacity(header.record_len());
        header.write(&mut buf);
        buf.put_slice(key);
        buf.put_slice(value);

        let offset = inner.len;
        let res = inner
            .file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| inner.file.write_all(&buf))
            .and_then(|_| {
                if self.shared.properties.read().fsync {
                    inner.file.sync_data()
                } else {
                    Ok(())
                }
            });
        if let Err(e) = res {
            // Cut whatever part of the record made it to the file.
            if let Err(e) = inner.file.set_len(offset) {
                tracing::warn!("[store]: failed to cut a partial record from {} at {offset}: {e}", self.name);
            }
            return Err(Error::io_error(e)
                .with_context("store", &self.name)
                .with_context("offset", offset));
        }
        inner.len += buf.len() as u64;

        Ok(Location {
            offset,
            key_len: header.key_len,
            value_len: header.value_len,
            checksum: header.checksum,
        })
    }

    fn maybe_compact(&self, inner: &mut Inner) {
        let (threshold, min_log_size) = {
            let properties = self.shared.properties.read();
            (properties.cleaner_min_utilization, properties.cleaner_min_log_size)
        };
        if inner.len < min_log_size || utilization(inner) >= threshold {
            return;
        }
        if let Err(e) = self.compact(inner) {
            tracing::warn!("[store]: failed to compact {}: {e}", self.name);
        }
    }

    fn compact(&self, inner: &mut Inner) -> Result<()> {
        let tmp = self.path.with_extension("log.compact");
        let before = inner.len;

        let locations = inner
            .index
            .iter()
            .map(|(key, location)| (key.clone(), *location))
            .sorted_by_key(|(_, location)| location.offset)
            .collect_vec();

        let res = Self::rewrite(&mut inner.file, &tmp, locations).and_then(|(file, index, offset)| {
            std::fs::rename(&tmp, &self.path)?;
            Ok((file, index, offset))
        });
        let (file, index, offset) = match res {
            Ok(rewritten) => rewritten,
            Err(e) => {
                if let Err(e) = std::fs::remove_file(&tmp) {
                    tracing::warn!("[store]: failed to remove {}: {e}", tmp.display());
                }
                return Err(e.with_context("store", &self.name));
            }
        };

        // The handle of the rewritten log stays valid across the rename.
        inner.file = file;
        inner.index = index;
        inner.len = offset;
        inner.live = offset;

        tracing::debug!("[store]: compacted {} from {before} to {offset} bytes", self.name);
        Ok(())
    }

    /// Copy the live records into a fresh log at `tmp`. Returns its read-write handle, the new index and its length.
    fn rewrite(
        src: &mut File,
        tmp: &Path,
        locations: Vec<(Vec<u8>, Location)>,
    ) -> Result<(File, HashMap<Vec<u8>, Location>, u64)> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(tmp)?;
        let mut index = HashMap::with_capacity(locations.len());
        let mut writer = BufWriter::new(file);
        let mut offset = 0;
        let mut record = vec![];
        for (key, location) in locations {
            record.resize(location.record_len() as usize, 0);
            src.seek(SeekFrom::Start(location.offset))?;
            src.read_exact(&mut record)?;
            writer.write_all(&record)?;
            index.insert(key, Location { offset, ..location });
            offset += location.record_len();
        }
        let file = writer.into_inner().map_err(|e| Error::io_error(e.into_error()))?;
        file.sync_all()?;
        Ok((file, index, offset))
    }
}

fn utilization(inner: &Inner) -> u8 {
    match inner.len {
        0 => 100,
        len => (inner.live * 100 / len) as u8,
    }
}
