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

use std::{fmt::Display, hash::Hash, str::FromStr};

use entrycache_common::error::{Error, ErrorKind, Result};
use linked_hash_map::LinkedHashMap;
use serde::{Deserialize, Serialize};

/// Eviction order of the cache index.
///
/// The mode is chosen once when the index is built and never changes for the life of a running cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EvictionMode {
    /// Evict the earliest inserted entry still present.
    #[default]
    Fifo,
    /// Evict the least recently touched entry. Lookups and re-insertions count as touches.
    Lru,
}

impl EvictionMode {
    /// Whether a successful lookup reorders the index.
    ///
    /// Callers use this to decide whether a lookup needs the write side of the cache lock.
    pub fn touches_on_read(&self) -> bool {
        matches!(self, EvictionMode::Lru)
    }
}

impl Display for EvictionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionMode::Fifo => write!(f, "FIFO"),
            EvictionMode::Lru => write!(f, "LRU"),
        }
    }
}

impl FromStr for EvictionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FIFO" => Ok(EvictionMode::Fifo),
            "LRU" => Ok(EvictionMode::Lru),
            _ => Err(Error::new(ErrorKind::Parse, "unknown eviction mode").with_context("mode", s)),
        }
    }
}

/// Hash map that remembers its eviction order.
///
/// The front of the order is always the next victim. In [`EvictionMode::Fifo`] the order is insertion order and
/// re-inserting an existing key keeps its position. In [`EvictionMode::Lru`] both lookups through
/// [`OrderedMap::get`] and re-insertions move the key to the back.
///
/// All operations are O(1).
#[derive(Debug)]
pub struct OrderedMap<K, V>
where
    K: Hash + Eq,
{
    mode: EvictionMode,
    map: LinkedHashMap<K, V>,
}

impl<K, V> OrderedMap<K, V>
where
    K: Hash + Eq,
{
    /// Create an empty map with the given order.
    pub fn new(mode: EvictionMode) -> Self {
        Self {
            mode,
            map: LinkedHashMap::new(),
        }
    }

    /// Eviction order of this map.
    pub fn mode(&self) -> EvictionMode {
        self.mode
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.mode {
            EvictionMode::Fifo => match self.map.get_mut(&key) {
                Some(slot) => Some(std::mem::replace(slot, value)),
                None => self.map.insert(key, value),
            },
            EvictionMode::Lru => self.map.insert(key, value),
        }
    }

    /// Look up a value, counting as a touch in LRU mode.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        match self.mode {
            EvictionMode::Fifo => self.map.get(key),
            EvictionMode::Lru => self.map.get_refresh(key).map(|v| &*v),
        }
    }

    /// Look up a value without touching it.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    /// Whether the key is present. Never touches.
    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Remove a key.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.map.remove(key)
    }

    /// The next victim, without removing it.
    pub fn oldest(&self) -> Option<(&K, &V)> {
        self.map.front()
    }

    /// Remove and return the next victim.
    pub fn pop_oldest(&mut self) -> Option<(K, V)> {
        self.map.pop_front()
    }

    /// Iterate from the next victim to the most recent entry.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.map.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;

    fn keys(map: &OrderedMap<u64, u64>) -> Vec<u64> {
        map.iter().map(|(k, _)| *k).collect_vec()
    }

    #[test]
    fn test_fifo_order() {
        let mut map = OrderedMap::new(EvictionMode::Fifo);
        for i in 0..4 {
            map.insert(i, i);
        }
        assert_eq!(map.get(&0), Some(&0));
        assert_eq!(map.insert(1, 10), Some(1));
        assert_eq!(keys(&map), vec![0, 1, 2, 3]);
        assert_eq!(map.peek(&1), Some(&10));
        assert_eq!(map.pop_oldest(), Some((0, 0)));
        assert_eq!(map.oldest(), Some((&1, &10)));
    }

    #[test]
    fn test_lru_order() {
        let mut map = OrderedMap::new(EvictionMode::Lru);
        for i in 0..4 {
            map.insert(i, i);
        }
        assert_eq!(map.get(&0), Some(&0));
        assert_eq!(keys(&map), vec![1, 2, 3, 0]);
        map.insert(1, 11);
        assert_eq!(keys(&map), vec![2, 3, 0, 1]);
        // Peeking never reorders.
        assert_eq!(map.peek(&2), Some(&2));
        assert!(map.contains_key(&2));
        assert_eq!(keys(&map), vec![2, 3, 0, 1]);
        assert_eq!(map.pop_oldest(), Some((2, 2)));
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("lru".parse::<EvictionMode>().unwrap(), EvictionMode::Lru);
        assert_eq!(" FIFO ".parse::<EvictionMode>().unwrap(), EvictionMode::Fifo);
        assert_eq!("arc".parse::<EvictionMode>().unwrap_err().kind(), ErrorKind::Parse);
        assert!(EvictionMode::Lru.touches_on_read());
        assert!(!EvictionMode::Fifo.touches_on_read());
    }
}
