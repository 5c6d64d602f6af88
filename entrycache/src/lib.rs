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

//! A persistent, size-bounded cache of directory entries.
//!
//! The cache keeps decoded-on-demand entries in a local log-structured store and a two-level index in memory:
//! normalized DN to `(handle, owner)` for lookups and eviction, and owner to `{handle -> DN}` for bulk removal when
//! a backend or a subtree is invalidated.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use entrycache::{CacheKey, Dn, Entry, EntryCache, EntryCacheConfig, OwnerRegistry, SimpleOwner};
//!
//! let registry = Arc::new(OwnerRegistry::new());
//! let owner = Arc::new(SimpleOwner::new("userRoot", vec![CacheKey::parse("dc=example,dc=com").unwrap()]));
//! registry.register(owner.clone());
//!
//! let cache = EntryCache::new(registry);
//! cache
//!     .initialize(EntryCacheConfig::new("/tmp/entrycache").with_max_entries(10_000))
//!     .unwrap();
//!
//! let entry = Entry::new(Dn::parse("uid=alice,ou=people,dc=example,dc=com").unwrap())
//!     .with_object_class("person")
//!     .with_attribute("cn", ["Alice"]);
//! cache.put_entry(&entry, owner.as_ref(), 42);
//! assert!(cache.get_entry(&entry.key()).is_some());
//!
//! cache.finalize();
//! ```

mod codec;
mod config;
mod engine;
mod entry;
mod filter;
mod lock;
mod owner;
mod snapshot;

mod prelude;
pub use prelude::*;
