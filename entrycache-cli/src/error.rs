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

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The cache directory does not exist.
    #[error("cache directory not found: {0}")]
    DirNotFound(PathBuf),
    /// Error from the stores or the snapshot codec.
    #[error(transparent)]
    Cache(#[from] entrycache::Error),
    /// Other error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Refuse to operate on a missing directory instead of creating an empty environment.
pub fn check_dir(dir: &std::path::Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(Error::DirNotFound(dir.to_path_buf()));
    }
    Ok(())
}
