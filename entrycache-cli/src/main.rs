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

//! `entrycache` provides offline tools for the stores of a stopped entry cache.

mod compact;
mod error;
mod inspect;

use clap::{Parser, Subcommand};
use compact::CompactArgs;
use inspect::InspectArgs;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show store statistics and the persisted index.
    Inspect(InspectArgs),
    /// Rewrite the store logs with live records only.
    Compact(CompactArgs),
}

fn init_logger() {
    use tracing_subscriber::{prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_line_number(true))
        .with(EnvFilter::from_default_env())
        .init();
}

fn main() {
    init_logger();

    let cli = Cli::parse();
    let res = match cli.command {
        Command::Inspect(args) => inspect::run(args),
        Command::Compact(args) => compact::run(args),
    };
    if let Err(e) = res {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
