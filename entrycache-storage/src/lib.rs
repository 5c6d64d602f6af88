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

//! Durable store of the entry cache.
//!
//! An [`Environment`] is a directory of named, log-structured [`Store`]s. The stores share an in-memory read cache
//! bounded by a [`CacheBound`] and a set of [`StoreProperties`].

mod env;
mod memory;
mod params;
mod serde;
mod store;

pub use crate::{
    env::{Environment, EnvironmentBuilder, EnvironmentStats, DEFAULT_MEMORY_BASE},
    memory::CacheBound,
    params::StoreProperties,
    store::{Store, StoreStats},
};
