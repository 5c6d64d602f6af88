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

use std::collections::BTreeMap;

use entrycache_common::{
    dn::CacheKey,
    error::{Error, ErrorKind, Result},
    progress::ProgressReporter,
};
use entrycache_memory::CacheIndex;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Key of the index snapshot in the entry store.
pub const INDEX_KEY: &[u8] = b"EntryCacheIndex";

/// Key of the snapshot format descriptor in the catalog store.
pub const FORMAT_KEY: &[u8] = b"EntryCacheIndex";

const FORMAT_VERSION: u32 = 1;

/// Describes the layout of [`IndexSnapshot`] so a persisted snapshot can be checked before it is decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFormat {
    /// Layout version.
    pub version: u32,
    /// Field names, in serialization order.
    pub fields: Vec<String>,
}

impl SnapshotFormat {
    /// The format written by this version.
    pub fn current() -> Self {
        Self {
            version: FORMAT_VERSION,
            fields: ["identity", "owners", "generations"].map(String::from).to_vec(),
        }
    }

    /// Encode the descriptor.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a descriptor.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(buf)?)
    }
}

/// Serializable image of the cache index, written at shutdown and consumed once at the next startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// `(key, handle)` pairs, from the next victim to the most recent entry.
    pub identity: Vec<(String, u64)>,
    /// `owner -> [(handle, key)]`.
    pub owners: BTreeMap<String, Vec<(u64, String)>>,
    /// Generation stamps of all known owners at shutdown.
    pub generations: BTreeMap<String, u64>,
}

impl IndexSnapshot {
    /// Capture the index together with the owners' generation stamps.
    pub fn capture(index: &CacheIndex, generations: &HashMap<String, u64>, progress: &ProgressReporter) -> Self {
        let identity = index
            .iter()
            .map(|(key, record)| {
                progress.inc(1);
                (key.as_str().to_string(), record.handle)
            })
            .collect();
        let owners = index
            .owners()
            .map(|(owner, members)| {
                let mut members = members
                    .iter()
                    .map(|(handle, key)| (*handle, key.as_str().to_string()))
                    .collect::<Vec<_>>();
                members.sort();
                (owner.clone(), members)
            })
            .collect();
        let generations = generations.iter().map(|(k, v)| (k.clone(), *v)).collect();

        Self {
            identity,
            owners,
            generations,
        }
    }

    /// Encode the snapshot.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a snapshot.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(buf)?)
    }

    /// Number of records in the snapshot.
    pub fn len(&self) -> usize {
        self.identity.len()
    }

    /// Whether the snapshot holds no records.
    pub fn is_empty(&self) -> bool {
        self.identity.is_empty()
    }

    /// Check that the snapshot is non-empty and that both maps describe the same records.
    pub fn validate(&self) -> Result<()> {
        if self.identity.is_empty() || self.owners.is_empty() || self.generations.is_empty() {
            return Err(Error::new(ErrorKind::IndexImpaired, "snapshot is empty")
                .with_context("identity", self.identity.len())
                .with_context("owners", self.owners.len())
                .with_context("generations", self.generations.len()));
        }

        let owned: usize = self.owners.values().map(|m| m.len()).sum();
        if owned != self.identity.len() {
            return Err(Error::new(ErrorKind::IndexImpaired, "snapshot maps disagree on the record count")
                .with_context("identity", self.identity.len())
                .with_context("owned", owned));
        }

        let owners = self.owner_of_keys();
        for (key, handle) in &self.identity {
            match owners.get(key.as_str()) {
                Some((_, h)) if h == handle => {}
                _ => {
                    return Err(Error::new(ErrorKind::IndexImpaired, "snapshot record has no matching owner")
                        .with_context("key", key)
                        .with_context("handle", handle));
                }
            }
        }
        Ok(())
    }

    /// Insert every record into `index`, oldest first, so the eviction order is preserved.
    ///
    /// The caller lifts the index capacity beforehand. Returns the number of restored records.
    pub fn restore_into(&self, index: &mut CacheIndex, progress: &ProgressReporter) -> Result<usize> {
        let owners = self.owner_of_keys();
        for (key, handle) in &self.identity {
            let Some((owner, _)) = owners.get(key.as_str()) else {
                return Err(Error::new(ErrorKind::IndexImpaired, "snapshot record has no owner").with_context("key", key));
            };
            let victims = index.insert(CacheKey::from_normalized(key.as_str()), *handle, owner.to_string());
            debug_assert!(victims.is_empty(), "restoring must not evict");
            progress.inc(1);
        }
        Ok(self.identity.len())
    }

    /// Owners whose recorded generation differs from the live one, or that are unknown on either side.
    pub fn stale_owners(&self, live: &HashMap<String, u64>) -> Vec<String> {
        self.owners
            .keys()
            .filter(|owner| match (self.generations.get(*owner), live.get(*owner)) {
                (Some(recorded), Some(current)) => recorded != current,
                _ => true,
            })
            .cloned()
            .collect()
    }

    fn owner_of_keys(&self) -> HashMap<&str, (&str, u64)> {
        self.owners
            .iter()
            .flat_map(|(owner, members)| {
                members
                    .iter()
                    .map(move |(handle, key)| (key.as_str(), (owner.as_str(), *handle)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use entrycache_memory::EvictionMode;

    use super::*;

    fn key(s: &str) -> CacheKey {
        CacheKey::parse(s).unwrap()
    }

    fn progress() -> ProgressReporter {
        ProgressReporter::start("snapshot-test", 0, Duration::from_secs(3600))
    }

    fn index() -> CacheIndex {
        let mut index = CacheIndex::new(EvictionMode::Lru, usize::MAX);
        index.insert(key("cn=a,dc=x"), 1, "x".into());
        index.insert(key("cn=b,dc=x"), 2, "x".into());
        index.insert(key("cn=c,dc=y"), 1, "y".into());
        index.get(&key("cn=a,dc=x"));
        index
    }

    #[test]
    fn test_capture_restore_keeps_order() {
        let generations = HashMap::from([("x".to_string(), 1), ("y".to_string(), 2)]);
        let snapshot = IndexSnapshot::capture(&index(), &generations, &progress());
        snapshot.validate().unwrap();

        let decoded = IndexSnapshot::decode(&snapshot.encode().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);

        let mut restored = CacheIndex::new(EvictionMode::Lru, usize::MAX);
        assert_eq!(decoded.restore_into(&mut restored, &progress()).unwrap(), 3);
        let order = restored.iter().map(|(k, _)| k.to_string()).collect::<Vec<_>>();
        assert_eq!(order, vec!["cn=b,dc=x", "cn=c,dc=y", "cn=a,dc=x"]);
        assert_eq!(restored.owner_key("y", 1), Some(&key("cn=c,dc=y")));
        assert!(restored.is_consistent());
    }

    #[test]
    fn test_validate() {
        assert_eq!(
            IndexSnapshot::default().validate().unwrap_err().kind(),
            ErrorKind::IndexImpaired
        );

        let generations = HashMap::from([("x".to_string(), 1)]);
        let mut snapshot = IndexSnapshot::capture(&index(), &generations, &progress());
        snapshot.identity.push(("cn=ghost".to_string(), 9));
        assert_eq!(snapshot.validate().unwrap_err().kind(), ErrorKind::IndexImpaired);

        let mut snapshot = IndexSnapshot::capture(&index(), &generations, &progress());
        snapshot.identity[0].1 = 42;
        assert_eq!(snapshot.validate().unwrap_err().kind(), ErrorKind::IndexImpaired);
    }

    #[test]
    fn test_stale_owners() {
        let generations = HashMap::from([("x".to_string(), 1), ("y".to_string(), 2)]);
        let snapshot = IndexSnapshot::capture(&index(), &generations, &progress());

        assert!(snapshot.stale_owners(&generations).is_empty());
        let live = HashMap::from([("x".to_string(), 1), ("y".to_string(), 3)]);
        assert_eq!(snapshot.stale_owners(&live), vec!["y"]);
        let live = HashMap::from([("y".to_string(), 2)]);
        assert_eq!(snapshot.stale_owners(&live), vec!["x"]);
    }

    #[test]
    fn test_format() {
        let format = SnapshotFormat::current();
        assert_eq!(SnapshotFormat::decode(&format.encode().unwrap()).unwrap(), format);
        assert!(SnapshotFormat::decode(b"\x01").is_err());
    }
}
