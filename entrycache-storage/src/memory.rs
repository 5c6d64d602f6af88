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

use bytes::Bytes;
use linked_hash_map::LinkedHashMap;

/// Bound of the in-memory read cache of a store environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBound {
    /// Percentage of the environment memory base.
    Percent(u8),
    /// Absolute size in bytes.
    Bytes(u64),
}

impl Default for CacheBound {
    fn default() -> Self {
        Self::Percent(60)
    }
}

impl CacheBound {
    /// Resolve to a byte size against `base`.
    pub fn resolve(&self, base: u64) -> u64 {
        match self {
            CacheBound::Percent(percent) => base / 100 * (*percent).min(100) as u64,
            CacheBound::Bytes(bytes) => *bytes,
        }
    }
}

/// LRU cache of record values shared by all stores of an environment.
#[derive(Debug)]
pub struct ReadCache {
    map: LinkedHashMap<(u32, Vec<u8>), Bytes>,
    usage: usize,
    capacity: usize,
}

impl ReadCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            map: LinkedHashMap::new(),
            usage: 0,
            capacity,
        }
    }

    pub fn get(&mut self, store: u32, key: &[u8]) -> Option<Bytes> {
        self.map.get_refresh(&(store, key.to_vec())).map(|v| v.clone())
    }

    pub fn insert(&mut self, store: u32, key: &[u8], value: Bytes) {
        let charge = key.len() + value.len();
        self.invalidate(store, key);
        if charge > self.capacity {
            return;
        }
        self.usage += charge;
        self.map.insert((store, key.to_vec()), value);
        self.shrink();
    }

    pub fn invalidate(&mut self, store: u32, key: &[u8]) {
        if let Some(old) = self.map.remove(&(store, key.to_vec())) {
            self.usage -= key.len() + old.len();
        }
    }

    pub fn invalidate_store(&mut self, store: u32) {
        let keys: Vec<_> = self.map.keys().filter(|(s, _)| *s == store).cloned().collect();
        for (s, key) in keys {
            self.invalidate(s, &key);
        }
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.shrink();
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.usage = 0;
    }

    pub fn usage(&self) -> usize {
        self.usage
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn shrink(&mut self) {
        while self.usage > self.capacity {
            let Some(((_, key), value)) = self.map.pop_front() else {
                break;
            };
            self.usage -= key.len() + value.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_resolve() {
        assert_eq!(CacheBound::Percent(50).resolve(1000), 500);
        assert_eq!(CacheBound::Bytes(42).resolve(1000), 42);
        assert_eq!(CacheBound::default().resolve(100), 60);
    }

    #[test]
    fn test_read_cache_lru() {
        let mut cache = ReadCache::new(10);
        cache.insert(0, b"a", Bytes::from_static(b"1234"));
        cache.insert(0, b"b", Bytes::from_static(b"1234"));
        assert_eq!(cache.usage(), 10);

        // Touch `a` so `b` is evicted first.
        assert!(cache.get(0, b"a").is_some());
        cache.insert(1, b"c", Bytes::from_static(b"1"));
        assert!(cache.get(0, b"b").is_none());
        assert!(cache.get(0, b"a").is_some());
        assert!(cache.get(1, b"c").is_some());
        assert_eq!(cache.usage(), 7);

        cache.insert(0, b"big", Bytes::from(vec![0u8; 64]));
        assert!(cache.get(0, b"big").is_none());

        cache.invalidate_store(0);
        assert!(cache.get(0, b"a").is_none());
        assert_eq!(cache.usage(), 2);

        cache.set_capacity(0);
        assert_eq!(cache.usage(), 0);
    }
}
