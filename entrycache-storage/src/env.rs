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
    fs::create_dir_all,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use entrycache_common::error::{Error, ErrorKind, Result};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

use crate::{
    memory::{CacheBound, ReadCache},
    params::StoreProperties,
    store::{Shared, Store, StoreStats},
};

/// Memory base the read cache percentage resolves against when no explicit base is given.
pub const DEFAULT_MEMORY_BASE: u64 = 256 * 1024 * 1024;

/// Builder for a store [`Environment`].
#[derive(Debug, Clone)]
pub struct EnvironmentBuilder {
    dir: PathBuf,
    cache_bound: CacheBound,
    memory_base: u64,
    properties: StoreProperties,
}

impl EnvironmentBuilder {
    /// Use the given directory as the environment home.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().into(),
            cache_bound: CacheBound::default(),
            memory_base: DEFAULT_MEMORY_BASE,
            properties: StoreProperties::default(),
        }
    }

    /// Set the bound of the in-memory read cache.
    ///
    /// Default: 60% of the memory base.
    pub fn with_cache_bound(mut self, cache_bound: CacheBound) -> Self {
        self.cache_bound = cache_bound;
        self
    }

    /// Set the memory base that [`CacheBound::Percent`] resolves against.
    ///
    /// Default: [`DEFAULT_MEMORY_BASE`].
    pub fn with_memory_base(mut self, memory_base: u64) -> Self {
        self.memory_base = memory_base;
        self
    }

    /// Set the store properties.
    pub fn with_properties(mut self, properties: StoreProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Prepare the home directory and build the environment.
    ///
    /// The directory is created if missing and restricted to its owner where the platform supports it. Failing to
    /// restrict permissions only logs a warning; a missing or unusable directory is an error.
    pub fn build(self) -> Result<Environment> {
        setup_home(&self.dir)?;

        let capacity = self.cache_bound.resolve(self.memory_base) as usize;
        let shared = Arc::new(Shared {
            read_cache: Mutex::new(ReadCache::new(capacity)),
            properties: RwLock::new(self.properties),
        });

        tracing::info!(
            "[environment]: opened {}, read cache: {}",
            self.dir.display(),
            bytesize::ByteSize::b(capacity as u64)
        );

        Ok(Environment {
            dir: self.dir,
            cache_bound: Mutex::new((self.cache_bound, self.memory_base)),
            shared,
            stores: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(0),
        })
    }
}

fn setup_home(dir: &Path) -> Result<()> {
    if !dir.exists() {
        create_dir_all(dir).map_err(|e| {
            Error::new(ErrorKind::Config, "cannot create cache home")
                .with_context("dir", dir.display())
                .with_source(e)
        })?;
    }
    if !dir.is_dir() {
        return Err(Error::new(ErrorKind::Config, "cache home is not a directory").with_context("dir", dir.display()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!("[environment]: cannot restrict permissions of {}: {e}", dir.display());
        }
    }

    let readonly = std::fs::metadata(dir)
        .map_err(|e| Error::io_error(e).with_context("dir", dir.display()))?
        .permissions()
        .readonly();
    if readonly {
        return Err(Error::new(ErrorKind::Config, "cache home is not writable").with_context("dir", dir.display()));
    }
    Ok(())
}

/// Statistics of an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentStats {
    /// Per-store statistics, sorted by name.
    pub stores: Vec<StoreStats>,
    /// Total log size of all open stores.
    pub footprint: u64,
    /// Bytes held by the read cache.
    pub cache_usage: u64,
    /// Capacity of the read cache.
    pub cache_capacity: u64,
}

/// A directory holding named [`Store`]s that share a read cache and store properties.
#[derive(Debug)]
pub struct Environment {
    dir: PathBuf,
    /// Read cache bound and the memory base it resolves against.
    cache_bound: Mutex<(CacheBound, u64)>,
    shared: Arc<Shared>,
    stores: Mutex<HashMap<String, Arc<Store>>>,
    next_id: AtomicU32,
}

impl Environment {
    /// Home directory of the environment.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Open a store, creating it if it does not exist. Opening an open store returns the same instance.
    pub fn open_store(&self, name: &str) -> Result<Arc<Store>> {
        let mut stores = self.stores.lock();
        if let Some(store) = stores.get(name) {
            return Ok(store.clone());
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let store = Arc::new(Store::open(id, name, &self.dir, self.shared.clone())?);
        stores.insert(name.to_string(), store.clone());
        Ok(store)
    }

    /// Close a store and delete its log. Returns whether a log existed.
    pub fn remove_store(&self, name: &str) -> Result<bool> {
        if let Some(store) = self.stores.lock().remove(name) {
            self.shared.read_cache.lock().clear();
            drop(store);
        }
        let path = self.dir.join(format!("{name}.log"));
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("[environment]: removed store {name}");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io_error(e).with_context("path", path.display())),
        }
    }

    /// Approximate on-disk footprint: the total log size of all open stores.
    pub fn footprint(&self) -> u64 {
        self.stores.lock().values().map(|s| s.footprint()).sum()
    }

    /// Current read cache bound.
    pub fn cache_bound(&self) -> CacheBound {
        self.cache_bound.lock().0
    }

    /// Change the read cache bound and its memory base. Takes effect immediately.
    pub fn set_cache_bound(&self, bound: CacheBound, memory_base: u64) {
        *self.cache_bound.lock() = (bound, memory_base);
        let capacity = bound.resolve(memory_base) as usize;
        self.shared.read_cache.lock().set_capacity(capacity);
    }

    /// Drop everything held by the read cache.
    pub fn evict_memory(&self) {
        let mut cache = self.shared.read_cache.lock();
        tracing::debug!("[environment]: evicting {} bytes from the read cache", cache.usage());
        cache.clear();
    }

    /// Compact the logs of all open stores whose utilization is below `cleaner.min-utilization`.
    ///
    /// Returns the number of rewritten logs.
    pub fn clean_log(&self) -> Result<usize> {
        let stores = self.stores.lock().values().cloned().collect::<Vec<_>>();
        let mut cleaned = 0;
        for store in stores {
            if store.clean()? {
                cleaned += 1;
            }
        }
        Ok(cleaned)
    }

    /// Current store properties.
    pub fn properties(&self) -> StoreProperties {
        self.shared.properties.read().clone()
    }

    /// Apply the mutable part of `properties`.
    ///
    /// Returns the names of immutable properties that differ and were left unchanged. They take effect the next
    /// time the environment is opened.
    pub fn set_properties(&self, properties: &StoreProperties) -> Vec<&'static str> {
        let mut current = self.shared.properties.write();
        let pending = current.changed_immutable(properties);
        current.merge_mutable(properties);
        pending
    }

    /// Flush all open stores.
    pub fn sync(&self) -> Result<()> {
        let stores = self.stores.lock().values().cloned().collect::<Vec<_>>();
        for store in stores {
            store.sync()?;
        }
        Ok(())
    }

    /// Flush and close all stores.
    pub fn close(&self) -> Result<()> {
        self.sync()?;
        self.stores.lock().clear();
        self.shared.read_cache.lock().clear();
        tracing::info!("[environment]: closed {}", self.dir.display());
        Ok(())
    }

    /// Statistics of the environment.
    pub fn stats(&self) -> EnvironmentStats {
        let mut stores = self.stores.lock().values().map(|s| s.stats()).collect::<Vec<_>>();
        stores.sort_by(|a, b| a.name.cmp(&b.name));
        let footprint = stores.iter().map(|s| s.footprint).sum();
        let cache = self.shared.read_cache.lock();
        EnvironmentStats {
            stores,
            footprint,
            cache_usage: cache.usage() as u64,
            cache_capacity: cache.capacity() as u64,
        }
    }
}
