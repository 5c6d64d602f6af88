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

use std::{path::Path, sync::Arc, time::Duration};

use entrycache::{
    CacheKey, Dn, Entry, EntryCache, EntryCacheConfig, ErrorKind, EvictionMode, Lifecycle, OwnerRegistry, PutOutcome,
    ResultCode, SimpleOwner,
};
use tempfile::TempDir;

const ROOT: &str = "dc=example,dc=com";

fn key(dn: &str) -> CacheKey {
    CacheKey::parse(dn).unwrap()
}

fn person(rdn: &str) -> Entry {
    let cn = rdn.split_once('=').map(|(_, v)| v).unwrap_or(rdn);
    Entry::new(Dn::parse(&format!("{rdn},{ROOT}")).unwrap())
        .with_object_class("top")
        .with_object_class("person")
        .with_attribute("cn", [cn])
        .with_attribute("description", ["cached", "twice"])
}

struct Fixture {
    dir: TempDir,
    registry: Arc<OwnerRegistry>,
    owner: Arc<SimpleOwner>,
}

impl Fixture {
    fn new() -> Self {
        let registry = Arc::new(OwnerRegistry::new());
        let owner = Arc::new(SimpleOwner::new("userRoot", vec![key(ROOT)]));
        registry.register(owner.clone());
        Self {
            dir: tempfile::tempdir().unwrap(),
            registry,
            owner,
        }
    }

    fn config(&self) -> EntryCacheConfig {
        EntryCacheConfig::new(self.dir.path().join("cache"))
    }

    fn cache(&self, config: EntryCacheConfig) -> EntryCache {
        let cache = EntryCache::new(self.registry.clone());
        cache.initialize(config).unwrap();
        cache
    }

    fn owner(&self, id: &str, base: &str) -> Arc<SimpleOwner> {
        let owner = Arc::new(SimpleOwner::new(id, vec![key(base)]));
        self.registry.register(owner.clone());
        owner
    }
}

#[test_log::test]
fn test_fifo_capacity() {
    let fx = Fixture::new();
    let cache = fx.cache(fx.config().with_max_entries(2));
    let (a, b, c) = (person("cn=a"), person("cn=b"), person("cn=c"));

    cache.put_entry(&a, fx.owner.as_ref(), 1);
    cache.put_entry(&b, fx.owner.as_ref(), 2);
    cache.put_entry(&c, fx.owner.as_ref(), 3);

    assert!(!cache.contains_entry(&a.key()));
    assert!(cache.contains_entry(&b.key()));
    assert!(cache.contains_entry(&c.key()));
    assert!(cache.get_entry(&a.key()).is_none());
    assert_eq!(cache.len(), 2);

    // Reads do not reorder a FIFO cache.
    assert!(cache.get_entry(&b.key()).is_some());
    cache.put_entry(&person("cn=d"), fx.owner.as_ref(), 4);
    assert!(!cache.contains_entry(&b.key()));
    assert!(cache.contains_entry(&c.key()));

    cache.finalize();
}

#[test_log::test]
fn test_lru_capacity() {
    let fx = Fixture::new();
    let cache = fx.cache(fx.config().with_max_entries(2).with_cache_type(EvictionMode::Lru));
    let (a, b, c) = (person("cn=a"), person("cn=b"), person("cn=c"));

    cache.put_entry(&a, fx.owner.as_ref(), 1);
    cache.put_entry(&b, fx.owner.as_ref(), 2);
    assert!(cache.get_entry(&a.key()).is_some());
    cache.put_entry(&c, fx.owner.as_ref(), 3);

    assert!(cache.contains_entry(&a.key()));
    assert!(!cache.contains_entry(&b.key()));
    assert!(cache.contains_entry(&c.key()));

    // Membership checks never count as a touch.
    assert!(cache.contains_entry(&c.key()));
    assert_eq!(cache.get_entry_id(&c.key()), Some(3));
    cache.put_entry(&person("cn=d"), fx.owner.as_ref(), 4);
    assert!(!cache.contains_entry(&a.key()));

    cache.finalize();
}

#[test_log::test]
fn test_footprint_bound() {
    let fx = Fixture::new();
    let cache = fx.cache(fx.config().with_max_memory_size(1));
    let (a, b) = (person("cn=a"), person("cn=b"));

    cache.put_entry(&a, fx.owner.as_ref(), 1);
    assert!(cache.contains_entry(&a.key()));
    assert!(cache.footprint() > 1);

    let outcome = cache.try_put_entry(&b, fx.owner.as_ref(), 2, false).unwrap();
    assert_eq!(outcome, PutOutcome::Rejected);
    assert!(!cache.contains_entry(&a.key()));
    assert!(!cache.contains_entry(&b.key()));
    assert!(cache.is_empty());

    cache.finalize();
}

#[test_log::test]
fn test_rejected_replacement_drops_old_value() {
    let fx = Fixture::new();
    let config = fx.config();
    let cache = fx.cache(config.clone());
    let a = person("cn=a").with_attribute("sn", ["old"]);
    let b = person("cn=b").with_attribute("sn", ["old"]);
    cache.put_entry(&a, fx.owner.as_ref(), 1);
    cache.put_entry(&b, fx.owner.as_ref(), 2);
    assert!(cache.footprint() > 1);

    let result = cache.apply_configuration_change(config.with_max_memory_size(1));
    assert_eq!(result.result_code, ResultCode::Success);

    let fresh = person("cn=b").with_attribute("sn", ["new"]);
    let outcome = cache.try_put_entry(&fresh, fx.owner.as_ref(), 2, false).unwrap();
    assert_eq!(outcome, PutOutcome::Rejected);
    assert!(cache.get_entry(&b.key()).is_none());
    assert!(!cache.contains_entry(&b.key()));
    assert_eq!(cache.get_entry_owner_key("userRoot", 2), None);
    assert!(cache.is_empty());
    assert!(cache.is_consistent());

    cache.finalize();
}

#[test_log::test]
fn test_round_trip() {
    let fx = Fixture::new();
    for compact in [true, false] {
        let cache = fx.cache(fx.config().with_compact_encoding(compact));
        let entry = person("uid=jdoe,ou=people")
            .with_object_class("customAuxiliary")
            .with_attribute("x-custom", ["value with spaces", ""]);

        cache.put_entry(&entry, fx.owner.as_ref(), 7);
        assert_eq!(cache.get_entry(&entry.key()), Some(entry.clone()));
        assert_eq!(cache.get_entry_id(&entry.key()), Some(7));
        assert_eq!(cache.get_entry_owner_key("userRoot", 7), Some(entry.key()));
        assert_eq!(cache.get_entry_owner_key("userRoot", 8), None);

        cache.remove_entry(&entry.key());
        assert!(cache.get_entry(&entry.key()).is_none());
        assert!(!cache.try_remove_entry(&entry.key()).unwrap());

        cache.finalize();
    }
}

#[test_log::test]
fn test_put_if_absent() {
    let fx = Fixture::new();
    let cache = fx.cache(fx.config());
    let first = person("cn=a");
    let second = person("cn=a").with_attribute("sn", ["second"]);

    assert!(cache.put_entry_if_absent(&first, fx.owner.as_ref(), 1));
    assert!(!cache.put_entry_if_absent(&second, fx.owner.as_ref(), 2));
    assert_eq!(cache.get_entry(&first.key()), Some(first.clone()));
    assert_eq!(cache.get_entry_id(&first.key()), Some(1));

    // A plain put replaces the value.
    cache.put_entry(&second, fx.owner.as_ref(), 2);
    assert_eq!(cache.get_entry(&first.key()), Some(second));
    assert_eq!(cache.get_entry_owner_key("userRoot", 1), None);
    assert_eq!(cache.len(), 1);

    cache.finalize();
}

#[test_log::test]
fn test_clear_owner() {
    let fx = Fixture::new();
    let other = fx.owner("otherRoot", "dc=other,dc=com");
    let cache = fx.cache(fx.config());

    let mine = (0..2500).map(|i| person(&format!("cn=user{i}"))).collect::<Vec<_>>();
    for (handle, entry) in mine.iter().enumerate() {
        cache.put_entry(entry, fx.owner.as_ref(), handle as u64);
    }
    let theirs = Entry::new(Dn::parse("cn=x,dc=other,dc=com").unwrap()).with_object_class("person");
    cache.put_entry(&theirs, other.as_ref(), 0);
    assert_eq!(cache.len(), 2501);

    assert_eq!(cache.try_clear_owner("userRoot").unwrap(), 2500);
    assert!(mine.iter().all(|e| !cache.contains_entry(&e.key())));
    assert!(cache.contains_entry(&theirs.key()));
    assert_eq!(cache.get_entry_owner_key("userRoot", 0), None);
    assert_eq!(cache.get_entry_owner_key("otherRoot", 0), Some(theirs.key()));

    cache.clear_owner("unknown");
    assert_eq!(cache.len(), 1);

    cache.finalize();
}

#[test_log::test]
fn test_concurrent_access_during_clear_owner() {
    const CAPACITY: u64 = 2600;
    const WORKERS: usize = 4;

    let fx = Fixture::new();
    let bulk_owner = fx.owner("bulkRoot", "dc=bulk,dc=com");
    let cache = fx.cache(fx.config().with_max_entries(CAPACITY));

    let bulk = (0..2500)
        .map(|i| Entry::new(Dn::parse(&format!("cn=b{i},dc=bulk,dc=com")).unwrap()).with_object_class("person"))
        .collect::<Vec<_>>();
    for (handle, entry) in bulk.iter().enumerate() {
        cache.put_entry(entry, bulk_owner.as_ref(), handle as u64);
    }
    assert_eq!(cache.len(), 2500);

    let done = std::sync::atomic::AtomicBool::new(false);
    std::thread::scope(|s| {
        let workers = (0..WORKERS)
            .map(|t| {
                let (cache, owner) = (&cache, fx.owner.as_ref());
                s.spawn(move || {
                    for i in 0..600u64 {
                        let entry = person(&format!("cn=w{t}-{}", i % 64));
                        match i % 3 {
                            0 | 1 => cache.put_entry(&entry, owner, t as u64 * 64 + i % 64),
                            _ => cache.remove_entry(&entry.key()),
                        }
                        if let Some(found) = cache.get_entry(&entry.key()) {
                            assert_eq!(found.key(), entry.key());
                        }
                    }
                })
            })
            .collect::<Vec<_>>();
        let monitor = s.spawn(|| {
            while !done.load(std::sync::atomic::Ordering::Relaxed) {
                assert!(cache.len() as u64 <= CAPACITY);
                std::thread::yield_now();
            }
        });

        cache.try_clear_owner("bulkRoot").unwrap();
        for worker in workers {
            worker.join().unwrap();
        }
        done.store(true, std::sync::atomic::Ordering::Relaxed);
        monitor.join().unwrap();
    });

    assert!(cache.len() as u64 <= CAPACITY);
    assert!(cache.is_consistent());
    assert!(bulk.iter().all(|e| !cache.contains_entry(&e.key())));
    assert_eq!(cache.get_entry_owner_key("bulkRoot", 0), None);

    cache.finalize();
}

#[test_log::test]
fn test_clear_subtree() {
    let fx = Fixture::new();
    let sub = Arc::new(SimpleOwner::new("subRoot", vec![key("ou=sub,dc=example,dc=com")]));
    fx.owner.add_subordinate(sub.clone());
    let cache = fx.cache(fx.config());

    let alice = person("uid=alice,ou=people");
    let admins = person("cn=admins,ou=groups");
    let nested = person("uid=carol,ou=sub");
    cache.put_entry(&alice, fx.owner.as_ref(), 1);
    cache.put_entry(&admins, fx.owner.as_ref(), 2);
    cache.put_entry(&nested, sub.as_ref(), 1);

    // Siblings and subordinates outside the base are untouched.
    let removed = cache
        .try_clear_subtree(fx.owner.as_ref(), &key("ou=people,dc=example,dc=com"))
        .unwrap();
    assert_eq!(removed, 1);
    assert!(!cache.contains_entry(&alice.key()));
    assert!(cache.contains_entry(&admins.key()));
    assert!(cache.contains_entry(&nested.key()));

    // Subordinate owners below the base are cleared too.
    cache.clear_subtree(fx.owner.as_ref(), &key(ROOT));
    assert!(cache.is_empty());

    cache.finalize();
}

#[test_log::test]
fn test_persistence_round_trip() {
    let fx = Fixture::new();
    let config = fx.config().with_persistent_cache(true).with_max_entries(3);
    let entries = ["cn=a", "cn=b", "cn=c"].map(person);

    let cache = fx.cache(config.clone());
    for (handle, entry) in entries.iter().enumerate() {
        cache.put_entry(entry, fx.owner.as_ref(), handle as u64);
    }
    let dump = cache.dump().unwrap();
    cache.finalize();
    assert_eq!(cache.lifecycle(), Lifecycle::Closed);
    drop(cache);

    let cache = fx.cache(config);
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.dump().unwrap(), dump);
    for (handle, entry) in entries.iter().enumerate() {
        assert_eq!(cache.get_entry(&entry.key()), Some(entry.clone()));
        assert_eq!(cache.get_entry_owner_key("userRoot", handle as u64), Some(entry.key()));
    }

    // The eviction order survives the restart.
    cache.put_entry(&person("cn=d"), fx.owner.as_ref(), 3);
    assert!(!cache.contains_entry(&entries[0].key()));

    cache.finalize();
}

#[test_log::test]
fn test_persistence_lowered_limit() {
    let fx = Fixture::new();
    let config = fx.config().with_persistent_cache(true);
    let entries = ["cn=a", "cn=b", "cn=c"].map(person);

    let cache = fx.cache(config.clone());
    for (handle, entry) in entries.iter().enumerate() {
        cache.put_entry(entry, fx.owner.as_ref(), handle as u64);
    }
    cache.finalize();

    let cache = fx.cache(config.with_max_entries(2));
    assert_eq!(cache.len(), 2);
    assert!(!cache.contains_entry(&entries[0].key()));
    cache.finalize();
}

#[test_log::test]
fn test_generation_staleness() {
    let fx = Fixture::new();
    let other = fx.owner("otherRoot", "dc=other,dc=com");
    let config = fx.config().with_persistent_cache(true);

    let mine = person("cn=a");
    let theirs = Entry::new(Dn::parse("cn=x,dc=other,dc=com").unwrap()).with_object_class("person");

    let cache = fx.cache(config.clone());
    cache.put_entry(&mine, fx.owner.as_ref(), 1);
    cache.put_entry(&theirs, other.as_ref(), 1);
    cache.finalize();

    fx.owner.set_generation_stamp(7);

    let cache = fx.cache(config);
    assert!(!cache.contains_entry(&mine.key()));
    assert!(cache.contains_entry(&theirs.key()));
    assert_eq!(cache.get_entry(&theirs.key()), Some(theirs));
    cache.finalize();
}

#[test_log::test]
fn test_snapshot_consumed_once() {
    let fx = Fixture::new();
    let config = fx.config().with_persistent_cache(true);
    let entry = person("cn=a");

    let cache = fx.cache(config.clone());
    cache.put_entry(&entry, fx.owner.as_ref(), 1);
    cache.finalize();

    let cache = fx.cache(config.clone());
    assert!(cache.contains_entry(&entry.key()));
    // Shut down without persisting.
    drop(cache);

    let cache = fx.cache(config);
    assert!(cache.is_empty());
    assert!(cache.get_entry(&entry.key()).is_none());
    cache.finalize();
}

#[test_log::test]
fn test_non_persistent_wipe() {
    let fx = Fixture::new();
    let config = fx.config();
    let entry = person("cn=a");

    let cache = fx.cache(config.clone());
    cache.put_entry(&entry, fx.owner.as_ref(), 1);
    cache.finalize();
    assert!(!cache_file(fx.dir.path(), "EntryCacheDB").exists());
    assert!(!cache_file(fx.dir.path(), "IndexClassDB").exists());

    // Operations on a closed cache are misses.
    assert!(!cache.contains_entry(&entry.key()));
    assert!(cache.get_entry(&entry.key()).is_none());
    assert_eq!(
        cache.try_get_entry(&entry.key()).unwrap_err().kind(),
        ErrorKind::NotRunning
    );

    // A closed cache can be initialized again and starts empty.
    cache.initialize(config.clone()).unwrap();
    assert!(cache.is_empty());
    assert!(cache.initialize(config).is_err());
    cache.finalize();
}

fn cache_file(dir: &Path, store: &str) -> std::path::PathBuf {
    dir.join("cache").join(format!("{store}.log"))
}

#[test_log::test]
fn test_filter_gating() {
    let fx = Fixture::new();
    let cache = fx.cache(
        fx.config()
            .with_include_filters(["(objectClass=person)"])
            .with_exclude_filters(["(cn=secret*)"]),
    );
    let device = Entry::new(Dn::parse(&format!("cn=printer,{ROOT}")).unwrap()).with_object_class("device");
    let secret = person("cn=secret-agent");
    let plain = person("cn=plain");

    cache.put_entry(&device, fx.owner.as_ref(), 1);
    assert!(cache.put_entry_if_absent(&secret, fx.owner.as_ref(), 2));
    cache.put_entry(&plain, fx.owner.as_ref(), 3);

    assert!(cache.get_entry(&device.key()).is_none());
    assert!(cache.get_entry(&secret.key()).is_none());
    assert!(cache.get_entry(&plain.key()).is_some());
    assert_eq!(
        cache.try_put_entry(&device, fx.owner.as_ref(), 1, false).unwrap(),
        PutOutcome::Filtered
    );

    cache.finalize();
}

#[test_log::test]
fn test_undecodable_filters() {
    let fx = Fixture::new();
    let config = fx.config().with_include_filters(["(objectClass=person)", "(broken"]);

    assert!(cache_is_acceptable(&fx, &config).is_err());

    // Skipped with a warning at startup.
    let cache = fx.cache(config);
    cache.put_entry(&person("cn=a"), fx.owner.as_ref(), 1);
    assert_eq!(cache.len(), 1);
    cache.finalize();

    let cache = EntryCache::new(fx.registry.clone());
    assert!(cache.initialize(fx.config().with_include_filters(["(broken"])).is_err());
    assert_eq!(cache.lifecycle(), Lifecycle::Uninitialized);
}

fn cache_is_acceptable(fx: &Fixture, config: &EntryCacheConfig) -> Result<(), Vec<String>> {
    EntryCache::new(fx.registry.clone()).is_configuration_acceptable(config)
}

#[test_log::test]
fn test_apply_configuration_change() {
    let fx = Fixture::new();
    let config = fx.config();
    let cache = fx.cache(config.clone());
    for i in 0..5 {
        cache.put_entry(&person(&format!("cn=u{i}")), fx.owner.as_ref(), i);
    }

    let result = cache.apply_configuration_change(config.clone().with_max_entries(2));
    assert_eq!(result.result_code, ResultCode::Success);
    assert!(!result.admin_action_required);
    assert!(result.messages.iter().any(|m| m == "max entries set to 2"));
    assert_eq!(cache.len(), 2);
    assert!(cache.contains_entry(&key(&format!("cn=u4,{ROOT}"))));

    let result = cache.apply_configuration_change(
        config
            .clone()
            .with_max_entries(2)
            .with_cache_dir(fx.dir.path().join("elsewhere"))
            .with_cache_type(EvictionMode::Lru),
    );
    assert_eq!(result.result_code, ResultCode::Success);
    assert!(result.admin_action_required);
    assert_eq!(result.messages.len(), 2);

    // The running cache keeps its directory and order.
    cache.put_entry(&person("cn=u5"), fx.owner.as_ref(), 5);
    assert!(!cache.contains_entry(&key(&format!("cn=u3,{ROOT}"))));
    assert!(!fx.dir.path().join("elsewhere").exists());

    let result = cache.apply_configuration_change(config.clone().with_store_cache_percent(95));
    assert_eq!(result.result_code, ResultCode::ConstraintViolation);
    assert!(!result.admin_action_required);
    assert_eq!(result.messages.len(), 1);

    let result = cache.apply_configuration_change(config.clone().with_enabled(false).with_max_entries(1));
    assert_eq!(result.result_code, ResultCode::Success);
    assert_eq!(cache.len(), 2);

    let result = cache.apply_configuration_change(config.with_store_properties(["log.verify-checksums=false"]));
    assert!(result.admin_action_required);

    cache.finalize();
}

#[test_log::test]
fn test_lock_timeout_config() {
    let fx = Fixture::new();
    let cache = fx.cache(fx.config().with_lock_timeout(Duration::from_millis(10)));
    assert_eq!(
        cache.try_put_entry(&person("cn=a"), fx.owner.as_ref(), 1, false).unwrap(),
        PutOutcome::Stored
    );
    cache.finalize();
}

#[test_log::test]
fn test_clear_and_low_memory() {
    let fx = Fixture::new();
    let cache = fx.cache(fx.config());
    let entries = (0..10).map(|i| person(&format!("cn=u{i}"))).collect::<Vec<_>>();
    for (handle, entry) in entries.iter().enumerate() {
        cache.put_entry(entry, fx.owner.as_ref(), handle as u64);
    }

    cache.handle_low_memory();
    assert_eq!(cache.len(), 10);
    assert_eq!(cache.get_entry(&entries[3].key()), Some(entries[3].clone()));

    cache.clear();
    assert!(cache.is_empty());
    assert!(cache.dump().is_none());
    assert!(cache.get_entry(&entries[3].key()).is_none());
    assert_eq!(cache.footprint(), 0);

    cache.put_entry(&entries[0], fx.owner.as_ref(), 0);
    assert_eq!(cache.dump().unwrap(), format!("cn=u0,{ROOT}:0:userRoot\n"));

    cache.finalize();
}
