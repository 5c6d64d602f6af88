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

use entrycache_common::dn::CacheKey;
use hashbrown::HashMap;
use itertools::Itertools;

use crate::eviction::{EvictionMode, OrderedMap};

/// Backend-assigned entry identifier, unique only within its owner.
pub type StorageHandle = u64;

/// Identifier of the backend that produced a cached entry.
pub type OwnerId = String;

/// What the identity map remembers for a cached key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Handle of the entry inside its owner.
    pub handle: StorageHandle,
    /// Owner of the entry.
    pub owner: OwnerId,
}

/// A record that has left the index and whose bytes must be dropped from the durable store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Victim {
    /// Key of the removed entry.
    pub key: CacheKey,
    /// Handle of the removed entry.
    pub handle: StorageHandle,
    /// Owner of the removed entry.
    pub owner: OwnerId,
}

/// In-memory bookkeeping of the entry cache.
///
/// Two levels are kept in sync:
///
/// - the identity map `key -> (handle, owner)`, ordered for eviction;
/// - the owner map `owner -> { handle -> key }`, used for bulk removal.
///
/// Every key in the identity map is present in exactly one owner's sub-map, and owners with an empty sub-map are
/// dropped. The index never touches the durable store: every operation that drops a key reports it as a
/// [`Victim`] so the caller can delete the bytes.
#[derive(Debug)]
pub struct CacheIndex {
    identity: OrderedMap<CacheKey, Record>,
    owners: HashMap<OwnerId, HashMap<StorageHandle, CacheKey>>,
    capacity: usize,
}

impl CacheIndex {
    /// Create an empty index. A `capacity` of `usize::MAX` means unbounded.
    pub fn new(mode: EvictionMode, capacity: usize) -> Self {
        Self {
            identity: OrderedMap::new(mode),
            owners: HashMap::new(),
            capacity,
        }
    }

    /// Eviction order of the index.
    pub fn mode(&self) -> EvictionMode {
        self.identity.mode()
    }

    /// Maximum number of keys.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the maximum number of keys. Takes effect on the next insert or [`CacheIndex::enforce_capacity`].
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.identity.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.identity.is_empty()
    }

    /// Insert or replace a record, then evict until the index fits its capacity.
    ///
    /// Returns the evicted records. If a key moves to another owner or handle, the stale owner-map record is
    /// dropped silently since its key is still cached. If the handle was already bound to a different key (a renamed
    /// entry), that key is removed and reported as a victim as well.
    pub fn insert(&mut self, key: CacheKey, handle: StorageHandle, owner: OwnerId) -> Vec<Victim> {
        let mut victims = vec![];
        let renamed = self
            .owners
            .get(&owner)
            .and_then(|m| m.get(&handle))
            .filter(|k| **k != key)
            .cloned();
        if let Some(renamed) = renamed {
            victims.extend(self.remove(&renamed));
        }

        let record = Record {
            handle,
            owner: owner.clone(),
        };
        if let Some(old) = self.identity.insert(key.clone(), record) {
            if old.handle != handle || old.owner != owner {
                self.unlink_owner(&old.owner, old.handle, &key);
            }
        }
        self.owners.entry(owner).or_default().insert(handle, key);
        victims.extend(self.enforce_capacity());
        victims
    }

    /// Evict oldest records until the index holds at most `capacity` keys.
    pub fn enforce_capacity(&mut self) -> Vec<Victim> {
        let mut victims = vec![];
        while self.identity.len() > self.capacity {
            let Some((key, record)) = self.identity.pop_oldest() else {
                break;
            };
            self.unlink_owner(&record.owner, record.handle, &key);
            tracing::trace!("[cache index]: evict {key} (handle {}, owner {})", record.handle, record.owner);
            victims.push(Victim {
                key,
                handle: record.handle,
                owner: record.owner,
            });
        }
        victims
    }

    /// Evict exactly the current victim, if any, by lowering the capacity to one below the current size for the
    /// duration of the call.
    pub fn shrink_by_one(&mut self) -> Option<Victim> {
        let capacity = self.capacity;
        self.capacity = self.identity.len().saturating_sub(1);
        let victim = self.enforce_capacity().pop();
        self.capacity = capacity;
        victim
    }

    /// Look up the handle of a key, counting as a touch in LRU mode.
    pub fn get(&mut self, key: &CacheKey) -> Option<StorageHandle> {
        self.identity.get(key).map(|r| r.handle)
    }

    /// Look up the record of a key without touching it.
    pub fn peek(&self, key: &CacheKey) -> Option<&Record> {
        self.identity.peek(key)
    }

    /// Whether the key is cached. Never touches.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.identity.contains_key(key)
    }

    /// Key of the entry `handle` of `owner`.
    pub fn owner_key(&self, owner: &str, handle: StorageHandle) -> Option<&CacheKey> {
        self.owners.get(owner).and_then(|m| m.get(&handle))
    }

    /// Remove a key from both levels.
    pub fn remove(&mut self, key: &CacheKey) -> Option<Victim> {
        let record = self.identity.remove(key)?;
        self.unlink_owner(&record.owner, record.handle, key);
        Some(Victim {
            key: key.clone(),
            handle: record.handle,
            owner: record.owner,
        })
    }

    /// Records of `owner`, optionally restricted to keys under `base`, sorted by handle.
    ///
    /// Bulk removal takes this list first and then removes the members one by one with
    /// [`CacheIndex::remove_member`], so the caller can release its lock between chunks.
    pub fn owner_members(&self, owner: &str, base: Option<&CacheKey>) -> Vec<(StorageHandle, CacheKey)> {
        let Some(members) = self.owners.get(owner) else {
            return vec![];
        };
        members
            .iter()
            .filter(|(_, key)| base.is_none_or(|base| key.is_descendant_of(base)))
            .map(|(handle, key)| (*handle, key.clone()))
            .sorted_by_key(|(handle, _)| *handle)
            .collect()
    }

    /// Remove a member previously listed by [`CacheIndex::owner_members`].
    ///
    /// Returns `None` if the member has changed or gone in the meantime.
    pub fn remove_member(&mut self, owner: &str, handle: StorageHandle, key: &CacheKey) -> Option<Victim> {
        match self.identity.peek(key) {
            Some(record) if record.handle == handle && record.owner == owner => self.remove(key),
            _ => None,
        }
    }

    /// Remove every record of `owner`.
    pub fn remove_owner(&mut self, owner: &str) -> Vec<Victim> {
        self.owner_members(owner, None)
            .into_iter()
            .filter_map(|(handle, key)| self.remove_member(owner, handle, &key))
            .collect()
    }

    /// Remove the records of `owner` whose keys are `base` or below it.
    pub fn remove_subtree(&mut self, owner: &str, base: &CacheKey) -> Vec<Victim> {
        self.owner_members(owner, Some(base))
            .into_iter()
            .filter_map(|(handle, key)| self.remove_member(owner, handle, &key))
            .collect()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.identity.clear();
        self.owners.clear();
    }

    /// Iterate the identity map from the next victim to the most recent entry.
    pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, &Record)> {
        self.identity.iter()
    }

    /// Iterate owners and their `handle -> key` sub-maps.
    pub fn owners(&self) -> impl Iterator<Item = (&OwnerId, &HashMap<StorageHandle, CacheKey>)> {
        self.owners.iter()
    }

    /// Whether both levels agree with each other.
    pub fn is_consistent(&self) -> bool {
        let owned: usize = self.owners.values().map(|m| m.len()).sum();
        owned == self.identity.len()
            && self.owners.values().all(|m| !m.is_empty())
            && self.identity.iter().all(|(key, record)| {
                self.owners
                    .get(&record.owner)
                    .and_then(|m| m.get(&record.handle))
                    .is_some_and(|k| k == key)
            })
    }

    fn unlink_owner(&mut self, owner: &str, handle: StorageHandle, key: &CacheKey) {
        let Some(members) = self.owners.get_mut(owner) else {
            return;
        };
        if members.get(&handle) == Some(key) {
            members.remove(&handle);
        }
        if members.is_empty() {
            self.owners.remove(owner);
        }
    }
}
