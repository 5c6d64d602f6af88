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

use std::{fmt::Write, path::PathBuf};

use bytesize::ByteSize;
use clap::Args;
use entrycache::{IndexSnapshot, SnapshotFormat, CATALOG_STORE, ENTRY_STORE, FORMAT_KEY, INDEX_KEY};
use entrycache_storage::{EnvironmentBuilder, EnvironmentStats};

use crate::error::{check_dir, Result};

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Cache directory.
    dir: PathBuf,

    /// List every record of the persisted index.
    #[arg(short, long)]
    verbose: bool,
}

pub fn run(args: InspectArgs) -> Result<()> {
    check_dir(&args.dir)?;

    let env = EnvironmentBuilder::new(&args.dir).build()?;
    let entries = env.open_store(ENTRY_STORE)?;
    let catalog = env.open_store(CATALOG_STORE)?;

    let mut out = render_stats(&env.stats());

    let format = catalog.get(FORMAT_KEY)?.map(|buf| SnapshotFormat::decode(&buf)).transpose()?;
    let snapshot = entries.get(INDEX_KEY)?.map(|buf| IndexSnapshot::decode(&buf)).transpose()?;
    match (format, snapshot) {
        (Some(format), Some(snapshot)) => {
            out += &render_snapshot(&format, &snapshot, args.verbose);
        }
        (None, Some(_)) => out += "persisted index: present, format descriptor missing\n",
        _ => out += "persisted index: none\n",
    }
    print!("{out}");

    env.close()?;
    Ok(())
}

fn render_stats(stats: &EnvironmentStats) -> String {
    let mut out = String::new();
    for store in &stats.stores {
        let utilization = match store.footprint {
            0 => 100,
            footprint => store.live_bytes * 100 / footprint,
        };
        let _ = writeln!(
            out,
            "{}: {} records, {} on disk, {utilization}% live",
            store.name,
            store.records,
            ByteSize::b(store.footprint)
        );
    }
    let _ = writeln!(out, "total footprint: {}", ByteSize::b(stats.footprint));
    out
}

fn render_snapshot(format: &SnapshotFormat, snapshot: &IndexSnapshot, verbose: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "persisted index: format v{}, {} records, {} owners",
        format.version,
        snapshot.len(),
        snapshot.owners.len()
    );
    for (owner, members) in &snapshot.owners {
        let generation = snapshot
            .generations
            .get(owner)
            .map(|g| g.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let _ = writeln!(out, "  {owner}: {} records, generation {generation}", members.len());
    }
    if let Err(e) = snapshot.validate() {
        let _ = writeln!(out, "  impaired: {e}");
    }
    if verbose {
        for (key, handle) in &snapshot.identity {
            let _ = writeln!(out, "  {key}:{handle}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_render_snapshot() {
        let snapshot = IndexSnapshot {
            identity: vec![("cn=a".to_string(), 1), ("cn=b".to_string(), 2)],
            owners: BTreeMap::from([("userRoot".to_string(), vec![(1, "cn=a".to_string()), (2, "cn=b".to_string())])]),
            generations: BTreeMap::from([("userRoot".to_string(), 3)]),
        };

        let out = render_snapshot(&SnapshotFormat::current(), &snapshot, false);
        assert_eq!(
            out,
            "persisted index: format v1, 2 records, 1 owners\n  userRoot: 2 records, generation 3\n"
        );

        let out = render_snapshot(&SnapshotFormat::current(), &snapshot, true);
        assert!(out.ends_with("  cn=a:1\n  cn=b:2\n"));
    }

    #[test]
    fn test_inspect_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let args = InspectArgs {
            dir: dir.path().join("missing"),
            verbose: false,
        };
        assert!(run(args).is_err());
        assert!(!dir.path().join("missing").exists());
    }
}
