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

use std::path::PathBuf;

use bytesize::ByteSize;
use clap::Args;
use entrycache::{CATALOG_STORE, ENTRY_STORE};
use entrycache_storage::{EnvironmentBuilder, StoreProperties};

use crate::error::{check_dir, Result};

#[derive(Debug, Args)]
pub struct CompactArgs {
    /// Cache directory.
    dir: PathBuf,
}

pub fn run(args: CompactArgs) -> Result<()> {
    check_dir(&args.dir)?;

    // Any log that is not fully live gets rewritten.
    let properties = StoreProperties {
        cleaner_min_utilization: 100,
        ..Default::default()
    };
    let env = EnvironmentBuilder::new(&args.dir).with_properties(properties).build()?;
    for name in [ENTRY_STORE, CATALOG_STORE] {
        env.open_store(name)?;
    }

    let before = env.footprint();
    let cleaned = env.clean_log()?;
    let after = env.footprint();
    env.close()?;

    tracing::info!("[compact]: rewrote {cleaned} logs in {}", args.dir.display());
    println!("{cleaned} logs compacted, {} -> {}", ByteSize::b(before), ByteSize::b(after));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact() {
        let dir = tempfile::tempdir().unwrap();
        {
            let env = EnvironmentBuilder::new(dir.path()).build().unwrap();
            let store = env.open_store(ENTRY_STORE).unwrap();
            store.put(b"k", b"v1").unwrap();
            store.put(b"k", b"v2").unwrap();
            env.close().unwrap();
        }

        run(CompactArgs {
            dir: dir.path().to_path_buf(),
        })
        .unwrap();

        let env = EnvironmentBuilder::new(dir.path()).build().unwrap();
        let store = env.open_store(ENTRY_STORE).unwrap();
        assert_eq!(store.get(b"k").unwrap().as_deref(), Some(&b"v2"[..]));
        let stats = store.stats();
        assert_eq!(stats.footprint, stats.live_bytes);
    }
}
