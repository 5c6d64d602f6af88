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
    fmt::Debug,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use entrycache_common::dn::CacheKey;
use hashbrown::HashMap;
use parking_lot::RwLock;

/// A backend that produces cached entries.
pub trait Owner: Send + Sync + Debug {
    /// Stable identifier, used in persisted snapshots.
    fn id(&self) -> &str;

    /// Base DNs served by this owner.
    fn base_keys(&self) -> Vec<CacheKey>;

    /// Owners serving parts of this owner's namespace.
    fn subordinates(&self) -> Vec<Arc<dyn Owner>> {
        vec![]
    }

    /// Current generation stamp. Changes whenever the owner's data changes.
    fn generation_stamp(&self) -> u64;
}

/// The directory the cache sits in front of.
pub trait Directory: Send + Sync + Debug {
    /// Generation stamps of all known owners, keyed by owner id.
    ///
    /// Used to validate persisted snapshots: an owner whose stamp differs from the recorded one has changed while
    /// the cache was offline.
    fn generation_stamps(&self) -> HashMap<String, u64>;
}

/// A plain [`Owner`] with a settable generation stamp.
#[derive(Debug)]
pub struct SimpleOwner {
    id: String,
    base_keys: Vec<CacheKey>,
    subordinates: RwLock<Vec<Arc<dyn Owner>>>,
    generation: AtomicU64,
}

impl SimpleOwner {
    /// Create an owner serving `base_keys`.
    pub fn new(id: impl Into<String>, base_keys: Vec<CacheKey>) -> Self {
        Self {
            id: id.into(),
            base_keys,
            subordinates: RwLock::new(vec![]),
            generation: AtomicU64::new(0),
        }
    }

    /// Attach a subordinate owner.
    pub fn add_subordinate(&self, owner: Arc<dyn Owner>) {
        self.subordinates.write().push(owner);
    }

    /// Set the generation stamp.
    pub fn set_generation_stamp(&self, stamp: u64) {
        self.generation.store(stamp, Ordering::Release);
    }
}

impl Owner for SimpleOwner {
    fn id(&self) -> &str {
        &self.id
    }

    fn base_keys(&self) -> Vec<CacheKey> {
        self.base_keys.clone()
    }

    fn subordinates(&self) -> Vec<Arc<dyn Owner>> {
        self.subordinates.read().clone()
    }

    fn generation_stamp(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

/// A [`Directory`] over a set of registered owners.
#[derive(Debug, Default)]
pub struct OwnerRegistry {
    owners: RwLock<Vec<Arc<dyn Owner>>>,
}

impl OwnerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an owner, replacing any owner with the same id.
    pub fn register(&self, owner: Arc<dyn Owner>) {
        let mut owners = self.owners.write();
        owners.retain(|o| o.id() != owner.id());
        owners.push(owner);
    }

    /// Deregister an owner.
    pub fn deregister(&self, id: &str) -> Option<Arc<dyn Owner>> {
        let mut owners = self.owners.write();
        let index = owners.iter().position(|o| o.id() == id)?;
        Some(owners.remove(index))
    }

    /// Look up an owner.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Owner>> {
        self.owners.read().iter().find(|o| o.id() == id).cloned()
    }
}

impl Directory for OwnerRegistry {
    fn generation_stamps(&self) -> HashMap<String, u64> {
        self.owners
            .read()
            .iter()
            .map(|o| (o.id().to_string(), o.generation_stamp()))
            .collect()
    }
}
