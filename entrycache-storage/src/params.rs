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

use entrycache_common::error::{Error, ErrorKind, Result};

/// Tunables of a store environment, set through `name=value` property strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreProperties {
    /// `log.fsync`: sync the log to disk after every write.
    ///
    /// Default: `false`.
    pub fsync: bool,
    /// `log.verify-checksums`: verify record checksums on every read.
    ///
    /// Default: `true`.
    pub verify_checksums: bool,
    /// `cleaner.min-utilization`: compact a log once less than this percentage of it holds live data.
    ///
    /// Default: `50`.
    pub cleaner_min_utilization: u8,
    /// `cleaner.min-log-size`: logs smaller than this are never compacted inline.
    ///
    /// Default: `1 MiB`.
    pub cleaner_min_log_size: u64,
}

impl Default for StoreProperties {
    fn default() -> Self {
        Self {
            fsync: false,
            verify_checksums: true,
            cleaner_min_utilization: 50,
            cleaner_min_log_size: 1024 * 1024,
        }
    }
}

struct Param {
    name: &'static str,
    mutable: bool,
    /// Attribute that must be used instead of this property.
    shadowed_by: Option<&'static str>,
    set: fn(&mut StoreProperties, &str) -> Result<()>,
    get: fn(&StoreProperties) -> String,
}

const PARAMS: &[Param] = &[
    Param {
        name: "log.fsync",
        mutable: true,
        shadowed_by: None,
        set: |p, v| {
            p.fsync = parse_bool(v)?;
            Ok(())
        },
        get: |p| p.fsync.to_string(),
    },
    Param {
        name: "log.verify-checksums",
        mutable: false,
        shadowed_by: None,
        set: |p, v| {
            p.verify_checksums = parse_bool(v)?;
            Ok(())
        },
        get: |p| p.verify_checksums.to_string(),
    },
    Param {
        name: "cleaner.min-utilization",
        mutable: true,
        shadowed_by: None,
        set: |p, v| {
            let percent = parse_u64(v)?;
            if !(1..=90).contains(&percent) {
                return Err(Error::new(ErrorKind::Config, "value must be between 1 and 90"));
            }
            p.cleaner_min_utilization = percent as u8;
            Ok(())
        },
        get: |p| p.cleaner_min_utilization.to_string(),
    },
    Param {
        name: "cleaner.min-log-size",
        mutable: true,
        shadowed_by: None,
        set: |p, v| {
            p.cleaner_min_log_size = parse_u64(v)?;
            Ok(())
        },
        get: |p| p.cleaner_min_log_size.to_string(),
    },
    Param {
        name: "env.cache-percent",
        mutable: true,
        shadowed_by: Some("store-cache-percent"),
        set: |_, _| Ok(()),
        get: |_| String::new(),
    },
    Param {
        name: "env.cache-size",
        mutable: true,
        shadowed_by: Some("store-cache-size"),
        set: |_, _| Ok(()),
        get: |_| String::new(),
    },
];

fn parse_bool(v: &str) -> Result<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(Error::new(ErrorKind::Parse, "expected a boolean").with_context("value", v)),
    }
}

fn parse_u64(v: &str) -> Result<u64> {
    v.trim()
        .parse()
        .map_err(|e| Error::new(ErrorKind::Parse, "expected an unsigned integer").with_source(e))
}

impl StoreProperties {
    /// Parse property strings on top of the defaults.
    ///
    /// Fails on the first malformed, unknown or shadowed property.
    pub fn parse<S: AsRef<str>>(properties: &[S]) -> Result<Self> {
        let mut res = Self::default();
        for property in properties {
            let property = property.as_ref();
            let Some((name, value)) = property.split_once('=') else {
                return Err(Error::new(ErrorKind::Config, "store property must be in name=value form")
                    .with_context("property", property));
            };
            let name = name.trim();
            let Some(param) = PARAMS.iter().find(|p| p.name == name) else {
                return Err(Error::new(ErrorKind::Config, "unknown store property").with_context("property", name));
            };
            if let Some(attribute) = param.shadowed_by {
                return Err(Error::new(
                    ErrorKind::Config,
                    format!("store property {name} cannot be set directly, use the {attribute} attribute"),
                ));
            }
            (param.set)(&mut res, value).map_err(|e| e.with_context("property", name))?;
        }
        Ok(res)
    }

    /// Names of immutable properties whose values differ between `self` and `other`.
    pub fn changed_immutable(&self, other: &Self) -> Vec<&'static str> {
        PARAMS
            .iter()
            .filter(|p| !p.mutable && p.shadowed_by.is_none())
            .filter(|p| (p.get)(self) != (p.get)(other))
            .map(|p| p.name)
            .collect()
    }

    /// Names of mutable properties whose values differ between `self` and `other`.
    pub fn changed_mutable(&self, other: &Self) -> Vec<&'static str> {
        PARAMS
            .iter()
            .filter(|p| p.mutable && p.shadowed_by.is_none())
            .filter(|p| (p.get)(self) != (p.get)(other))
            .map(|p| p.name)
            .collect()
    }

    /// Copy the mutable properties of `other` into `self`, keeping the immutable ones.
    pub fn merge_mutable(&mut self, other: &Self) {
        self.fsync = other.fsync;
        self.cleaner_min_utilization = other.cleaner_min_utilization;
        self.cleaner_min_log_size = other.cleaner_min_log_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let props = StoreProperties::parse(&["log.fsync=true", " cleaner.min-utilization = 40"]).unwrap();
        assert!(props.fsync);
        assert!(props.verify_checksums);
        assert_eq!(props.cleaner_min_utilization, 40);

        let empty: [&str; 0] = [];
        assert_eq!(StoreProperties::parse(&empty).unwrap(), StoreProperties::default());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(StoreProperties::parse(&["log.fsync"]).unwrap_err().kind(), ErrorKind::Config);
        assert_eq!(StoreProperties::parse(&["log.nope=1"]).unwrap_err().kind(), ErrorKind::Config);
        assert_eq!(StoreProperties::parse(&["log.fsync=maybe"]).unwrap_err().kind(), ErrorKind::Parse);
        assert_eq!(
            StoreProperties::parse(&["cleaner.min-utilization=95"]).unwrap_err().kind(),
            ErrorKind::Config
        );
        let err = StoreProperties::parse(&["env.cache-percent=20"]).unwrap_err();
        assert!(err.message().contains("store-cache-percent"));
    }

    #[test]
    fn test_changes() {
        let old = StoreProperties::default();
        let new = StoreProperties::parse(&["log.verify-checksums=false", "log.fsync=on"]).unwrap();
        assert_eq!(old.changed_immutable(&new), vec!["log.verify-checksums"]);
        assert_eq!(old.changed_mutable(&new), vec!["log.fsync"]);

        let mut merged = old.clone();
        merged.merge_mutable(&new);
        assert!(merged.fsync);
        assert!(merged.verify_checksums);
    }
}
