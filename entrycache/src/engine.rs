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
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    time::Duration,
};

use arc_swap::ArcSwapOption;
use bytesize::ByteSize;
use entrycache_common::{
    dn::CacheKey,
    error::{Error, ErrorKind, Result},
    progress::ProgressReporter,
};
use entrycache_memory::{CacheIndex, StorageHandle, Victim};
use entrycache_storage::{Environment, EnvironmentBuilder, Store};
use itertools::Itertools;
use parking_lot::RwLockWriteGuard;

use crate::{
    codec::EntryCodec,
    config::{ConfigChangeResult, ConfigPhase, EntryCacheConfig, ResolvedConfig, ResultCode},
    entry::Entry,
    lock::{yield_write, CacheLock},
    owner::{Directory, Owner},
    snapshot::{IndexSnapshot, SnapshotFormat, FORMAT_KEY, INDEX_KEY},
};

/// Name of the store holding encoded entries and the index snapshot.
pub const ENTRY_STORE: &str = "EntryCacheDB";
/// Name of the store holding the snapshot format descriptor.
pub const CATALOG_STORE: &str = "IndexClassDB";

/// Bulk removals release the write lock after this many records.
const YIELD_INTERVAL: usize = 1000;
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Lifecycle of an [`EntryCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Lifecycle {
    /// Created, not initialized yet.
    Uninitialized = 0,
    /// Opening stores and restoring the index.
    Initializing = 1,
    /// Serving requests.
    Running = 2,
    /// Writing the index snapshot before closing.
    FinalizingPersist = 3,
    /// Closed. May be initialized again.
    Closed = 4,
}

impl Lifecycle {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Uninitialized,
            1 => Self::Initializing,
            2 => Self::Running,
            3 => Self::FinalizingPersist,
            _ => Self::Closed,
        }
    }
}

/// Outcome of an insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The entry is cached.
    Stored,
    /// The include or exclude filters rejected the entry.
    Filtered,
    /// The store footprint is over `max_memory_size`. One entry was evicted instead.
    Rejected,
    /// The key is already cached and the caller asked not to overwrite it.
    AlreadyPresent,
    /// The cache lock was not acquired within the lock timeout.
    TimedOut,
}

struct Stores {
    env: Environment,
    entries: Arc<Store>,
    catalog: Arc<Store>,
}

impl Stores {
    /// Drop the bytes of a record that left the index. The index is authoritative, so failures only leave
    /// unreachable bytes behind.
    fn discard(&self, victim: &Victim) {
        if let Err(e) = self.entries.delete(victim.key.as_bytes()) {
            tracing::warn!(
                "[entry cache]: failed to delete bytes of {} (owner {}, handle {}): {e}",
                victim.key,
                victim.owner,
                victim.handle
            );
        }
    }

    fn discard_all(&self, victims: impl IntoIterator<Item = Victim>) {
        victims.into_iter().for_each(|victim| self.discard(&victim));
    }
}

struct State {
    index: CacheIndex,
    stores: Option<Stores>,
}

impl State {
    fn stores(&self) -> Result<&Stores> {
        self.stores.as_ref().ok_or_else(Error::not_running)
    }
}

/// A persistent, size-bounded cache of directory entries.
///
/// All index reads and writes go through one reader-writer lock. Lookups that cannot reorder the index take it
/// shared, everything else exclusive. Puts give up after the configured lock timeout, bulk removals release the
/// lock every 1000 records.
///
/// Entries are encoded into the `EntryCacheDB` store of an [`Environment`] rooted at the cache directory. With
/// `persistent_cache` enabled, [`EntryCache::finalize`] writes an index snapshot that the next
/// [`EntryCache::initialize`] consumes.
pub struct EntryCache {
    lock: CacheLock<State>,
    config: ArcSwapOption<ResolvedConfig>,
    lifecycle: AtomicU8,
    directory: Arc<dyn Directory>,
}

impl Debug for EntryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryCache")
            .field("lifecycle", &self.lifecycle())
            .field("directory", &self.directory)
            .finish()
    }
}

impl EntryCache {
    /// Create an uninitialized cache in front of `directory`.
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self {
            lock: CacheLock::new(State {
                index: CacheIndex::new(Default::default(), usize::MAX),
                stores: None,
            }),
            config: ArcSwapOption::empty(),
            lifecycle: AtomicU8::new(Lifecycle::Uninitialized as u8),
            directory,
        }
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    fn set_lifecycle(&self, lifecycle: Lifecycle) {
        self.lifecycle.store(lifecycle as u8, Ordering::Release);
    }

    fn running_config(&self) -> Result<Arc<ResolvedConfig>> {
        if self.lifecycle() != Lifecycle::Running {
            return Err(Error::not_running());
        }
        self.config.load_full().ok_or_else(Error::not_running)
    }

    /// Open the store environment and, for a persistent cache, restore the index written by the last
    /// [`EntryCache::finalize`].
    ///
    /// Undecodable filters are skipped with a warning. A missing or damaged snapshot empties the cache instead of
    /// failing.
    pub fn initialize(&self, config: EntryCacheConfig) -> Result<()> {
        let (resolved, _) = ResolvedConfig::resolve(&config, ConfigPhase::Init)
            .map_err(|errors| Error::new(ErrorKind::Config, errors.join("; ")))?;

        let mut guard = self.lock.write();
        let previous = self.lifecycle();
        if !matches!(previous, Lifecycle::Uninitialized | Lifecycle::Closed) {
            return Err(Error::new(ErrorKind::Unsupported, "entry cache is already initialized")
                .with_context("lifecycle", format!("{previous:?}")));
        }
        self.set_lifecycle(Lifecycle::Initializing);

        let stores = match Self::open(&resolved) {
            Ok(stores) => stores,
            Err(e) => {
                self.set_lifecycle(previous);
                return Err(e);
            }
        };

        let state = &mut *guard;
        state.index = CacheIndex::new(resolved.mode, resolved.max_entries);
        state.stores = Some(stores);
        if resolved.persistent {
            self.restore(state, &resolved);
        }

        tracing::info!(
            "[entry cache]: initialized at {}, type {}, {} entries restored",
            resolved.cache_dir.display(),
            resolved.mode,
            state.index.len()
        );
        self.config.store(Some(Arc::new(resolved)));
        self.set_lifecycle(Lifecycle::Running);
        Ok(())
    }

    fn open(config: &ResolvedConfig) -> Result<Stores> {
        let env = EnvironmentBuilder::new(&config.cache_dir)
            .with_cache_bound(config.cache_bound)
            .with_memory_base(config.memory_base)
            .with_properties(config.store_properties.clone())
            .build()?;
        if !config.persistent {
            env.remove_store(ENTRY_STORE)?;
            env.remove_store(CATALOG_STORE)?;
        }
        let entries = env.open_store(ENTRY_STORE)?;
        let catalog = env.open_store(CATALOG_STORE)?;
        Ok(Stores { env, entries, catalog })
    }

    fn restore(&self, state: &mut State, config: &ResolvedConfig) {
        match self.try_restore(state, config) {
            Ok(restored) => {
                tracing::info!("[entry cache]: restored {restored} entries from the persisted index");
                return;
            }
            Err(e) if e.kind() == ErrorKind::IndexNotFound => {
                tracing::info!("[entry cache]: no persisted index found, starting empty");
            }
            Err(e) if e.kind() == ErrorKind::IndexImpaired => {
                tracing::warn!("[entry cache]: persisted index is impaired, starting empty: {e}");
            }
            Err(e) => {
                tracing::error!("[entry cache]: failed to restore the persisted index, starting empty: {e}");
            }
        }
        if let Err(e) = Self::clear_locked(state) {
            tracing::error!("[entry cache]: failed to clear the cache after restore: {e}");
        }
    }

    fn try_restore(&self, state: &mut State, config: &ResolvedConfig) -> Result<usize> {
        let stores = state.stores.as_ref().ok_or_else(Error::not_running)?;

        let Some(buf) = stores.entries.get(INDEX_KEY)? else {
            return Err(Error::new(ErrorKind::IndexNotFound, "no persisted index"));
        };
        let Some(format) = stores.catalog.get(FORMAT_KEY)? else {
            return Err(Error::new(ErrorKind::IndexImpaired, "snapshot format descriptor is missing"));
        };
        let format = SnapshotFormat::decode(&format)
            .map_err(|e| Error::new(ErrorKind::IndexImpaired, "cannot decode snapshot format").with_source(e))?;
        if format != SnapshotFormat::current() {
            return Err(Error::new(ErrorKind::IndexImpaired, "unsupported snapshot format")
                .with_context("version", format.version));
        }
        let snapshot = IndexSnapshot::decode(&buf)
            .map_err(|e| Error::new(ErrorKind::IndexImpaired, "cannot decode snapshot").with_source(e))?;
        snapshot.validate()?;

        // A snapshot is consumed exactly once.
        stores.entries.delete(INDEX_KEY)?;
        stores.catalog.delete(FORMAT_KEY)?;

        let progress = ProgressReporter::start("restore", snapshot.len() as u64, PROGRESS_INTERVAL);
        state.index.set_capacity(usize::MAX);
        let restored = snapshot.restore_into(&mut state.index, &progress);
        state.index.set_capacity(config.max_entries);
        restored?;
        progress.finish();

        let live = self.directory.generation_stamps();
        for owner in snapshot.stale_owners(&live) {
            tracing::warn!("[entry cache]: owner {owner} changed while offline, dropping its entries");
            stores.discard_all(state.index.remove_owner(&owner));
        }

        // The entry limit may have been lowered since the snapshot was written.
        stores.discard_all(state.index.enforce_capacity());

        Ok(state.index.len())
    }

    /// Close the cache. A persistent cache writes its index snapshot first, a non-persistent one deletes its
    /// stores.
    ///
    /// Never fails: persistence errors are logged and the next startup begins empty.
    pub fn finalize(&self) {
        let mut guard = self.lock.write();
        if self.lifecycle() != Lifecycle::Running {
            return;
        }
        self.set_lifecycle(Lifecycle::FinalizingPersist);

        let config = self.config.swap(None);
        let persistent = config.as_ref().is_some_and(|c| c.persistent);
        let state = &mut *guard;

        if let Some(stores) = state.stores.take() {
            if persistent && !state.index.is_empty() {
                if let Err(e) = self.persist(&state.index, &stores) {
                    tracing::error!("[entry cache]: failed to persist the index: {e}");
                }
            }
            state.index.clear();

            let Stores { env, entries, catalog } = stores;
            drop(entries);
            drop(catalog);
            if let Err(e) = env.close() {
                tracing::error!("[entry cache]: failed to close the store environment: {e}");
            }
            if !persistent {
                for name in [ENTRY_STORE, CATALOG_STORE] {
                    if let Err(e) = env.remove_store(name) {
                        tracing::warn!("[entry cache]: failed to remove store {name}: {e}");
                    }
                }
            }
        }

        self.set_lifecycle(Lifecycle::Closed);
        tracing::info!("[entry cache]: finalized");
    }

    fn persist(&self, index: &CacheIndex, stores: &Stores) -> Result<()> {
        let generations = self.directory.generation_stamps();
        let progress = ProgressReporter::start("persist", index.len() as u64, PROGRESS_INTERVAL);
        let snapshot = IndexSnapshot::capture(index, &generations, &progress);
        let buf = snapshot.encode()?;

        stores.catalog.put(FORMAT_KEY, &SnapshotFormat::current().encode()?)?;
        stores.entries.put(INDEX_KEY, &buf)?;
        stores.env.sync()?;

        let persisted = progress.finish();
        tracing::info!(
            "[entry cache]: persisted index of {persisted} entries ({})",
            ByteSize::b(buf.len() as u64)
        );
        Ok(())
    }

    /// Whether `key` is cached. Never reorders the index.
    pub fn contains_entry(&self, key: &CacheKey) -> bool {
        self.lifecycle() == Lifecycle::Running && self.lock.with_read(|state| state.index.contains(key))
    }

    /// Handle of a cached entry. Never reorders the index.
    pub fn get_entry_id(&self, key: &CacheKey) -> Option<StorageHandle> {
        if self.lifecycle() != Lifecycle::Running {
            return None;
        }
        self.lock.with_read(|state| state.index.peek(key).map(|r| r.handle))
    }

    /// Key of the entry `owner` stored under `handle`.
    pub fn get_entry_owner_key(&self, owner: &str, handle: StorageHandle) -> Option<CacheKey> {
        if self.lifecycle() != Lifecycle::Running {
            return None;
        }
        self.lock.with_read(|state| state.index.owner_key(owner, handle).cloned())
    }

    /// Fetch a cached entry. Counts as a touch in LRU mode.
    ///
    /// Any failure is logged and reported as a miss. A record whose bytes are gone or cannot be decoded is dropped.
    pub fn get_entry(&self, key: &CacheKey) -> Option<Entry> {
        report("get", self.try_get_entry(key)).flatten()
    }

    /// Like [`EntryCache::get_entry`], but reports failures.
    pub fn try_get_entry(&self, key: &CacheKey) -> Result<Option<Entry>> {
        let config = self.running_config()?;
        if config.mode.touches_on_read() {
            self.lock.with_write(|state| match state.index.get(key) {
                Some(_) => match Self::load(state, key) {
                    Err(e) if is_unreadable(&e) => {
                        Self::drop_unreadable(state, key, &e);
                        Ok(None)
                    }
                    res => res,
                },
                None => Ok(None),
            })
        } else {
            let res = self.lock.with_read(|state| {
                if state.index.contains(key) {
                    Self::load(state, key)
                } else {
                    Ok(None)
                }
            });
            match res {
                Err(e) if is_unreadable(&e) => {
                    self.lock.with_write(|state| Self::drop_unreadable(state, key, &e));
                    Ok(None)
                }
                res => res,
            }
        }
    }

    fn drop_unreadable(state: &mut State, key: &CacheKey, e: &Error) {
        let Some(victim) = state.index.remove(key) else {
            return;
        };
        tracing::warn!("[entry cache]: dropped unreadable entry {key}: {e}");
        if let Some(stores) = state.stores.as_ref() {
            stores.discard(&victim);
        }
    }

    fn load(state: &State, key: &CacheKey) -> Result<Option<Entry>> {
        let Some(buf) = state.stores()?.entries.get(key.as_bytes())? else {
            return Err(Error::new(ErrorKind::IndexImpaired, "indexed entry has no stored bytes").with_context("key", key));
        };
        let mut entry = EntryCodec::decode(&buf).map_err(|e| e.with_context("key", key))?;
        if entry.dn().is_root() && !key.as_str().is_empty() {
            entry.set_dn(key.to_dn()?);
        }
        Ok(Some(entry))
    }

    /// Cache `entry` as `handle` of `owner`, replacing any entry under the same key.
    ///
    /// Waits at most the configured lock timeout. Entries rejected by the filters, by the footprint limit or by a
    /// lock timeout are silently not cached.
    pub fn put_entry(&self, entry: &Entry, owner: &dyn Owner, handle: StorageHandle) {
        report("put", self.try_put_entry(entry, owner, handle, false));
    }

    /// Cache `entry` unless its key is already cached.
    ///
    /// Returns `false` if the key is present or the entry could not be stored. Entries rejected by the filters or
    /// the footprint limit count as handled and return `true`.
    pub fn put_entry_if_absent(&self, entry: &Entry, owner: &dyn Owner, handle: StorageHandle) -> bool {
        match report("put if absent", self.try_put_entry(entry, owner, handle, true)) {
            Some(PutOutcome::Stored | PutOutcome::Filtered | PutOutcome::Rejected) => true,
            Some(PutOutcome::AlreadyPresent | PutOutcome::TimedOut) | None => false,
        }
    }

    /// Insert an entry and report exactly what happened.
    pub fn try_put_entry(
        &self,
        entry: &Entry,
        owner: &dyn Owner,
        handle: StorageHandle,
        only_if_absent: bool,
    ) -> Result<PutOutcome> {
        let config = self.running_config()?;
        if !config.admits(entry) {
            tracing::trace!("[entry cache]: {} filtered out", entry.dn());
            return Ok(PutOutcome::Filtered);
        }

        let key = entry.key();
        let buf = EntryCodec::encode(entry, &config.encode);

        let outcome = self.lock.try_with_write(config.lock_timeout, |state| -> Result<PutOutcome> {
            let stores = state.stores.as_ref().ok_or_else(Error::not_running)?;
            if only_if_absent && state.index.contains(&key) {
                return Ok(PutOutcome::AlreadyPresent);
            }
            if config.max_memory_size != 0 && stores.env.footprint() > config.max_memory_size {
                if let Some(victim) = state.index.shrink_by_one() {
                    stores.discard(&victim);
                }
                // A rejected replacement must not leave the previous value visible.
                if let Some(stale) = state.index.remove(&key) {
                    stores.discard(&stale);
                }
                tracing::debug!(
                    "[entry cache]: footprint {} over {}, {key} not cached",
                    ByteSize::b(stores.env.footprint()),
                    ByteSize::b(config.max_memory_size)
                );
                return Ok(PutOutcome::Rejected);
            }

            stores.entries.put(key.as_bytes(), &buf)?;
            let victims = state.index.insert(key.clone(), handle, owner.id().to_string());
            stores.discard_all(victims);
            Ok(PutOutcome::Stored)
        });

        match outcome {
            Some(outcome) => outcome,
            None => {
                tracing::debug!(
                    "[entry cache]: lock not acquired within {:?}, {key} not cached",
                    config.lock_timeout
                );
                Ok(PutOutcome::TimedOut)
            }
        }
    }

    /// Drop a cached entry, if present.
    pub fn remove_entry(&self, key: &CacheKey) {
        report("remove", self.try_remove_entry(key));
    }

    /// Like [`EntryCache::remove_entry`], but reports failures. Returns whether the key was cached.
    pub fn try_remove_entry(&self, key: &CacheKey) -> Result<bool> {
        self.running_config()?;
        self.lock.with_write(|state| -> Result<bool> {
            let stores = state.stores.as_ref().ok_or_else(Error::not_running)?;
            let Some(victim) = state.index.remove(key) else {
                return Ok(false);
            };
            stores.entries.delete(victim.key.as_bytes())?;
            Ok(true)
        })
    }

    /// Drop every cached entry and truncate both stores.
    pub fn clear(&self) {
        report("clear", self.try_clear());
    }

    /// Like [`EntryCache::clear`], but reports failures.
    pub fn try_clear(&self) -> Result<()> {
        self.running_config()?;
        self.lock.with_write(Self::clear_locked)
    }

    fn clear_locked(state: &mut State) -> Result<()> {
        state.index.clear();
        let stores = state.stores()?;
        stores.entries.truncate()?;
        stores.catalog.truncate()?;
        if let Err(e) = stores.env.clean_log() {
            tracing::warn!("[entry cache]: failed to clean the logs after clear: {e}");
        }
        Ok(())
    }

    /// Drop every entry of `owner`.
    pub fn clear_owner(&self, owner: &str) {
        report("clear owner", self.try_clear_owner(owner));
    }

    /// Like [`EntryCache::clear_owner`], but reports failures. Returns the number of removed entries.
    pub fn try_clear_owner(&self, owner: &str) -> Result<usize> {
        self.running_config()?;
        let mut guard = self.lock.write();
        let removed = self.clear_members(&mut guard, owner, None)?;
        tracing::debug!("[entry cache]: removed {removed} entries of {owner}");
        Ok(removed)
    }

    /// Drop every entry of `owner` at or below `base`, then do the same for each subordinate owner serving a base
    /// at or below `base`.
    pub fn clear_subtree(&self, owner: &dyn Owner, base: &CacheKey) {
        report("clear subtree", self.try_clear_subtree(owner, base));
    }

    /// Like [`EntryCache::clear_subtree`], but reports failures. Returns the number of removed entries.
    pub fn try_clear_subtree(&self, owner: &dyn Owner, base: &CacheKey) -> Result<usize> {
        self.running_config()?;
        let mut guard = self.lock.write();
        let removed = self.clear_subtree_locked(&mut guard, owner, base)?;
        tracing::debug!("[entry cache]: removed {removed} entries below {base}");
        Ok(removed)
    }

    fn clear_subtree_locked(
        &self,
        guard: &mut RwLockWriteGuard<'_, State>,
        owner: &dyn Owner,
        base: &CacheKey,
    ) -> Result<usize> {
        let mut removed = self.clear_members(guard, owner.id(), Some(base))?;
        for subordinate in owner.subordinates() {
            if subordinate.base_keys().iter().any(|key| key.is_descendant_of(base)) {
                removed += self.clear_subtree_locked(guard, subordinate.as_ref(), base)?;
            }
        }
        Ok(removed)
    }

    /// Remove members of `owner` in chunks, yielding the write lock between chunks.
    fn clear_members(
        &self,
        guard: &mut RwLockWriteGuard<'_, State>,
        owner: &str,
        base: Option<&CacheKey>,
    ) -> Result<usize> {
        let members = guard.index.owner_members(owner, base);
        let mut removed = 0;
        for chunk in members.chunks(YIELD_INTERVAL) {
            let state = &mut **guard;
            let stores = state.stores.as_ref().ok_or_else(Error::not_running)?;
            for (handle, key) in chunk {
                // Members reinserted or evicted while the lock was yielded are skipped.
                if let Some(victim) = state.index.remove_member(owner, *handle, key) {
                    stores.discard(&victim);
                    removed += 1;
                }
            }
            yield_write(guard);
            if self.lifecycle() != Lifecycle::Running {
                return Err(Error::not_running());
            }
        }
        Ok(removed)
    }

    /// Release memory held by the store environment. Never touches the index.
    pub fn handle_low_memory(&self) {
        self.lock.with_read(|state| {
            let Some(stores) = state.stores.as_ref() else {
                return;
            };
            stores.env.evict_memory();
            match stores.env.clean_log() {
                Ok(cleaned) => tracing::info!("[entry cache]: low memory, read cache evicted, {cleaned} logs cleaned"),
                Err(e) => tracing::warn!("[entry cache]: low memory, failed to clean the logs: {e}"),
            }
        })
    }

    /// Check a configuration without applying it. Returns every problem found.
    pub fn is_configuration_acceptable(&self, config: &EntryCacheConfig) -> std::result::Result<(), Vec<String>> {
        ResolvedConfig::resolve(config, ConfigPhase::Acceptable).map(|_| ())
    }

    /// Apply a new configuration to the running cache.
    ///
    /// Changes to the cache directory, the cache type and immutable store properties are recorded but only take
    /// effect after a restart, which is signalled by `admin_action_required`. A disabled configuration is accepted
    /// and ignored.
    pub fn apply_configuration_change(&self, config: EntryCacheConfig) -> ConfigChangeResult {
        if !config.enabled {
            return ConfigChangeResult::success(
                false,
                vec!["the configuration is disabled and was not applied".to_string()],
            );
        }
        let next = match ResolvedConfig::resolve(&config, ConfigPhase::Apply) {
            Ok((next, _)) => next,
            Err(errors) => return ConfigChangeResult::failure(ResultCode::ConstraintViolation, errors),
        };

        let mut guard = self.lock.write();
        let current = match self.running_config() {
            Ok(current) => current,
            Err(e) => return ConfigChangeResult::failure(ResultCode::Other, vec![e.to_string()]),
        };
        let report = current.changes(&next);

        let mut next = next;
        next.cache_dir = current.cache_dir.clone();
        next.mode = current.mode;

        let state = &mut *guard;
        if let Some(stores) = state.stores.as_ref() {
            stores.env.set_cache_bound(next.cache_bound, next.memory_base);
            stores.env.set_properties(&next.store_properties);
            next.store_properties = stores.env.properties();

            state.index.set_capacity(next.max_entries);
            stores.discard_all(state.index.enforce_capacity());
        }
        self.config.store(Some(Arc::new(next)));

        for message in report.restart.iter().chain(report.applied.iter()) {
            tracing::info!("[entry cache]: {message}");
        }
        let admin_action_required = !report.restart.is_empty();
        ConfigChangeResult::success(
            admin_action_required,
            report.restart.into_iter().chain(report.applied).collect(),
        )
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.lock.with_read(|state| state.index.len())
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the identity map and the owner map describe the same records.
    pub fn is_consistent(&self) -> bool {
        self.lock.with_read(|state| state.index.is_consistent())
    }

    /// Bytes used by the stores on disk.
    pub fn footprint(&self) -> u64 {
        self.lock
            .with_read(|state| state.stores.as_ref().map(|s| s.env.footprint()).unwrap_or_default())
    }

    /// Human-readable `key:handle:owner` lines of every indexed record, in eviction order, or `None` if the index is
    /// empty.
    ///
    /// Records that only appear in the owner map are listed after the others.
    pub fn dump(&self) -> Option<String> {
        self.lock.with_read(|state| {
            if state.index.is_empty() {
                return None;
            }
            let ordered = state
                .index
                .iter()
                .map(|(key, record)| format!("{key}:{}:{}", record.handle, record.owner));
            let orphans = state
                .index
                .owners()
                .flat_map(|(owner, members)| members.iter().map(move |(handle, key)| (owner, handle, key)))
                .filter(|(_, _, key)| !state.index.contains(key))
                .map(|(owner, handle, key)| format!("{key}:{handle}:{owner}"))
                .sorted();
            Some(ordered.chain(orphans).map(|line| line + "\n").collect())
        })
    }
}

/// Cached bytes that are gone or cannot be decoded make the record useless.
fn is_unreadable(e: &Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::IndexImpaired | ErrorKind::Decode | ErrorKind::ChecksumMismatch
    )
}

fn report<T>(operation: &'static str, result: Result<T>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) if e.kind() == ErrorKind::NotRunning => {
            tracing::trace!("[entry cache]: {operation} skipped, cache is not running");
            None
        }
        Err(e) => {
            tracing::error!("[entry cache]: {operation} failed: {e}");
            None
        }
    }
}
