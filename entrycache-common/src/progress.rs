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
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct Shared {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

/// Logs the progress of a long pass over the cache at a fixed interval from a background thread.
///
/// The reporter only reads a counter; the worker bumps it with [`ProgressReporter::inc`]. Dropping the reporter
/// stops the thread.
#[derive(Debug)]
pub struct ProgressReporter {
    processed: Arc<AtomicU64>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Start reporting `label` progress against `total` every `interval`.
    pub fn start(label: &'static str, total: u64, interval: Duration) -> Self {
        let processed = Arc::new(AtomicU64::new(0));
        let shared = Arc::new(Shared::default());

        let handle = {
            let processed = processed.clone();
            let shared = shared.clone();
            std::thread::Builder::new()
                .name(format!("entrycache-progress-{label}"))
                .spawn(move || {
                    let mut stopped = shared.stopped.lock();
                    while !*stopped {
                        let timeout = shared.condvar.wait_for(&mut stopped, interval);
                        if *stopped {
                            break;
                        }
                        if timeout.timed_out() {
                            let done = processed.load(Ordering::Relaxed);
                            tracing::info!("[{label}]: {done} of {total} records processed");
                        }
                    }
                })
                .map_err(|e| tracing::warn!("[{label}]: cannot spawn progress reporter: {e}"))
                .ok()
        };

        Self {
            processed,
            shared,
            handle,
        }
    }

    /// Record `n` more processed records.
    pub fn inc(&self, n: u64) {
        self.processed.fetch_add(n, Ordering::Relaxed);
    }

    /// Records processed so far.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Stop the reporter and wait for its thread.
    pub fn finish(mut self) -> u64 {
        self.stop();
        self.processed()
    }

    fn stop(&mut self) {
        *self.shared.stopped.lock() = true;
        self.shared.condvar.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop();
    }
}
