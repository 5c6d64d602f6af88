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

use std::{path::PathBuf, time::Duration};

use bytesize::ByteSize;
use entrycache_memory::EvictionMode;
use entrycache_storage::{CacheBound, StoreProperties, DEFAULT_MEMORY_BASE};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{codec::EncodeOptions, entry::Entry, filter::SearchFilter};

/// Configuration of an [`EntryCache`](crate::EntryCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryCacheConfig {
    /// Whether the configuration is in effect. A disabled configuration is accepted but not applied.
    pub enabled: bool,
    /// Home directory of the store environment.
    pub cache_dir: PathBuf,
    /// Eviction order. Fixed for the life of a running cache.
    pub cache_type: EvictionMode,
    /// Maximum number of cached entries, `0` for unlimited.
    pub max_entries: u64,
    /// Maximum storage footprint in bytes, `0` for unlimited.
    pub max_memory_size: u64,
    /// How long a put waits for the cache lock before giving up.
    pub lock_timeout: Duration,
    /// Only entries matching one of these filters are cached. Empty admits everything.
    pub include_filters: Vec<String>,
    /// Entries matching any of these filters are never cached.
    pub exclude_filters: Vec<String>,
    /// Keep the cache contents across restarts.
    pub persistent_cache: bool,
    /// Write well-known object classes and attribute types as tokens.
    pub compact_encoding: bool,
    /// Read cache bound as a percentage of the memory base. Ignored if `store_cache_size` is set.
    pub store_cache_percent: u8,
    /// Read cache bound in bytes, `0` to use `store_cache_percent`.
    pub store_cache_size: u64,
    /// Store tuning as `name=value` strings.
    pub store_properties: Vec<String>,
}

impl Default for EntryCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: PathBuf::from("entrycache"),
            cache_type: EvictionMode::Fifo,
            max_entries: 0,
            max_memory_size: 0,
            lock_timeout: Duration::from_millis(2000),
            include_filters: vec![],
            exclude_filters: vec![],
            persistent_cache: false,
            compact_encoding: true,
            store_cache_percent: 60,
            store_cache_size: 0,
            store_properties: vec![],
        }
    }
}

impl EntryCacheConfig {
    /// Create a configuration rooted at `cache_dir` with default settings.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Default::default()
        }
    }

    /// Set the home directory of the store environment.
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    /// Set whether the configuration is enabled.
    ///
    /// Default: `true`.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the eviction order.
    ///
    /// Default: [`EvictionMode::Fifo`].
    pub fn with_cache_type(mut self, cache_type: EvictionMode) -> Self {
        self.cache_type = cache_type;
        self
    }

    /// Set the maximum number of entries.
    ///
    /// Default: `0` (unlimited).
    pub fn with_max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set the maximum storage footprint in bytes.
    ///
    /// Default: `0` (unlimited).
    pub fn with_max_memory_size(mut self, max_memory_size: u64) -> Self {
        self.max_memory_size = max_memory_size;
        self
    }

    /// Set the put lock timeout.
    ///
    /// Default: 2 seconds.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Set the include filters.
    pub fn with_include_filters<S: Into<String>>(mut self, filters: impl IntoIterator<Item = S>) -> Self {
        self.include_filters = filters.into_iter().map(Into::into).collect();
        self
    }

    /// Set the exclude filters.
    pub fn with_exclude_filters<S: Into<String>>(mut self, filters: impl IntoIterator<Item = S>) -> Self {
        self.exclude_filters = filters.into_iter().map(Into::into).collect();
        self
    }

    /// Set whether the cache persists across restarts.
    ///
    /// Default: `false`.
    pub fn with_persistent_cache(mut self, persistent_cache: bool) -> Self {
        self.persistent_cache = persistent_cache;
        self
    }

    /// Set whether entries use the compact encoding.
    ///
    /// Default: `true`.
    pub fn with_compact_encoding(mut self, compact_encoding: bool) -> Self {
        self.compact_encoding = compact_encoding;
        self
    }

    /// Set the read cache bound as a percentage.
    ///
    /// Default: `60`.
    pub fn with_store_cache_percent(mut self, percent: u8) -> Self {
        self.store_cache_percent = percent;
        self
    }

    /// Set the read cache bound in bytes.
    ///
    /// Default: `0` (use the percentage).
    pub fn with_store_cache_size(mut self, size: u64) -> Self {
        self.store_cache_size = size;
        self
    }

    /// Set the store properties.
    pub fn with_store_properties<S: Into<String>>(mut self, properties: impl IntoIterator<Item = S>) -> Self {
        self.store_properties = properties.into_iter().map(Into::into).collect();
        self
    }
}

/// Outcome code of a configuration change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    /// The change was accepted.
    Success,
    /// The configuration holds invalid values.
    ConstraintViolation,
    /// The cache failed while applying the change.
    Other,
}

/// Result of [`EntryCache::apply_configuration_change`](crate::EntryCache::apply_configuration_change).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChangeResult {
    /// Outcome code.
    pub result_code: ResultCode,
    /// Some changes only take effect after a restart.
    pub admin_action_required: bool,
    /// Errors, or a description of what changed.
    pub messages: Vec<String>,
}

impl ConfigChangeResult {
    pub(crate) fn success(admin_action_required: bool, messages: Vec<String>) -> Self {
        Self {
            result_code: ResultCode::Success,
            admin_action_required,
            messages,
        }
    }

    pub(crate) fn failure(result_code: ResultCode, messages: Vec<String>) -> Self {
        Self {
            result_code,
            admin_action_required: false,
            messages,
        }
    }
}

/// Where a configuration is being processed.
///
/// Undecodable filters are skipped with a warning while initializing, but rejected when checking or applying a
/// change to a running cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfigPhase {
    Init,
    Acceptable,
    Apply,
}

/// A validated configuration in the form the engine uses.
///
/// Snapshots are immutable and replaced wholesale under the cache write lock.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedConfig {
    pub source: EntryCacheConfig,
    pub cache_dir: PathBuf,
    pub mode: EvictionMode,
    pub max_entries: usize,
    pub max_memory_size: u64,
    pub lock_timeout: Duration,
    pub include: Vec<SearchFilter>,
    pub exclude: Vec<SearchFilter>,
    pub persistent: bool,
    pub encode: EncodeOptions,
    pub cache_bound: CacheBound,
    pub memory_base: u64,
    pub store_properties: StoreProperties,
}

/// Differences between two resolved configurations.
#[derive(Debug, Default)]
pub(crate) struct ChangeReport {
    /// Changes that take effect immediately.
    pub applied: Vec<String>,
    /// Changes that need a restart.
    pub restart: Vec<String>,
}

impl ResolvedConfig {
    /// Validate and resolve a configuration.
    ///
    /// Returns the resolved configuration with warnings, or all errors found.
    pub fn resolve(config: &EntryCacheConfig, phase: ConfigPhase) -> Result<(Self, Vec<String>), Vec<String>> {
        let mut warnings = vec![];
        let mut errors = vec![];

        if config.cache_dir.as_os_str().is_empty() {
            errors.push("the cache directory must not be empty".to_string());
        } else if phase != ConfigPhase::Init && config.cache_dir.exists() && !config.cache_dir.is_dir() {
            errors.push(format!(
                "the cache directory {} exists but is not a directory",
                config.cache_dir.display()
            ));
        }

        if config.store_cache_size == 0 && !(1..=90).contains(&config.store_cache_percent) {
            errors.push(format!(
                "the store cache percentage {} must be between 1 and 90",
                config.store_cache_percent
            ));
        }

        let include = parse_filters("include", &config.include_filters, phase, &mut warnings, &mut errors);
        let exclude = parse_filters("exclude", &config.exclude_filters, phase, &mut warnings, &mut errors);

        let store_properties = match StoreProperties::parse(&config.store_properties) {
            Ok(properties) => properties,
            Err(e) => {
                errors.push(format!("invalid store properties: {e}"));
                StoreProperties::default()
            }
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        let cache_bound = match config.store_cache_size {
            0 => CacheBound::Percent(config.store_cache_percent),
            size => CacheBound::Bytes(size),
        };
        let resolved = Self {
            source: config.clone(),
            cache_dir: config.cache_dir.clone(),
            mode: config.cache_type,
            max_entries: match config.max_entries {
                0 => usize::MAX,
                n => usize::try_from(n).unwrap_or(usize::MAX),
            },
            max_memory_size: config.max_memory_size,
            lock_timeout: config.lock_timeout,
            include,
            exclude,
            persistent: config.persistent_cache,
            encode: EncodeOptions::compact(config.compact_encoding),
            cache_bound,
            memory_base: match config.max_memory_size {
                0 => DEFAULT_MEMORY_BASE,
                n => n,
            },
            store_properties,
        };
        Ok((resolved, warnings))
    }

    /// Whether an entry passes the include and exclude filters.
    pub fn admits(&self, entry: &Entry) -> bool {
        (self.include.is_empty() || self.include.iter().any(|f| f.matches(entry)))
            && !self.exclude.iter().any(|f| f.matches(entry))
    }

    /// Describe how `next` differs from `self`.
    pub fn changes(&self, next: &ResolvedConfig) -> ChangeReport {
        let mut report = ChangeReport::default();

        if next.cache_dir != self.cache_dir {
            report.restart.push(format!(
                "the cache directory change from {} to {} takes effect after a restart",
                self.cache_dir.display(),
                next.cache_dir.display()
            ));
        }
        if next.mode != self.mode {
            report.restart.push(format!(
                "the cache type change from {} to {} takes effect after a restart",
                self.mode, next.mode
            ));
        }
        for name in self.store_properties.changed_immutable(&next.store_properties) {
            report
                .restart
                .push(format!("the store property {name} takes effect after a restart"));
        }

        let (old, new) = (&self.source, &next.source);
        if old.max_entries != new.max_entries {
            report.applied.push(format!("max entries set to {}", new.max_entries));
        }
        if old.max_memory_size != new.max_memory_size {
            report
                .applied
                .push(format!("max memory size set to {}", ByteSize::b(new.max_memory_size)));
        }
        if old.lock_timeout != new.lock_timeout {
            report
                .applied
                .push(format!("lock timeout set to {} ms", new.lock_timeout.as_millis()));
        }
        if old.include_filters != new.include_filters {
            report
                .applied
                .push(format!("include filters set to [{}]", next.include.iter().join(", ")));
        }
        if old.exclude_filters != new.exclude_filters {
            report
                .applied
                .push(format!("exclude filters set to [{}]", next.exclude.iter().join(", ")));
        }
        if old.persistent_cache != new.persistent_cache {
            report
                .applied
                .push(format!("persistent cache set to {}", new.persistent_cache));
        }
        if old.compact_encoding != new.compact_encoding {
            report
                .applied
                .push(format!("compact encoding set to {}", new.compact_encoding));
        }
        if self.cache_bound != next.cache_bound {
            let bound = match next.cache_bound {
                CacheBound::Percent(percent) => format!("{percent}%"),
                CacheBound::Bytes(bytes) => ByteSize::b(bytes).to_string(),
            };
            report.applied.push(format!("store cache bound set to {bound}"));
        }
        for name in self.store_properties.changed_mutable(&next.store_properties) {
            report.applied.push(format!("store property {name} updated"));
        }

        report
    }
}

fn parse_filters(
    kind: &str,
    raw: &[String],
    phase: ConfigPhase,
    warnings: &mut Vec<String>,
    errors: &mut Vec<String>,
) -> Vec<SearchFilter> {
    let mut filters = Vec::with_capacity(raw.len());
    for s in raw {
        match SearchFilter::parse(s) {
            Ok(filter) => filters.push(filter),
            Err(e) if phase == ConfigPhase::Init => {
                tracing::warn!("[entry cache]: ignoring undecodable {kind} filter {s}: {e}");
                warnings.push(format!("the {kind} filter {s} cannot be decoded and is ignored: {e}"));
            }
            Err(e) => errors.push(format!("the {kind} filter {s} cannot be decoded: {e}")),
        }
    }
    if phase == ConfigPhase::Init && !raw.is_empty() && filters.is_empty() {
        errors.push(format!("none of the {kind} filters can be decoded"));
    }
    filters
}
