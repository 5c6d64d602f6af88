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

use std::time::Duration;

use parking_lot::{RwLock, RwLockWriteGuard};

/// The single lock of the entry cache.
///
/// Callers pick [`CacheLock::with_read`] or [`CacheLock::with_write`] at the call site based on whether the
/// operation can reorder the index.
#[derive(Debug)]
pub(crate) struct CacheLock<T> {
    inner: RwLock<T>,
}

impl<T> CacheLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
        }
    }

    pub fn with_read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.read())
    }

    pub fn with_write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Like [`CacheLock::with_write`], but gives up after `timeout`.
    pub fn try_with_write<R>(&self, timeout: Duration, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.inner.try_write_for(timeout)?;
        Some(f(&mut guard))
    }

    /// Hold the write lock across chunks of a long operation, see [`yield_write`].
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write()
    }
}

/// Release the write lock and take it again, letting waiting threads in between.
pub(crate) fn yield_write<T>(guard: &mut RwLockWriteGuard<'_, T>) {
    RwLockWriteGuard::bump(guard);
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
    };

    use super::*;

    #[test]
    fn test_try_with_write_times_out() {
        let lock = Arc::new(CacheLock::new(0));
        let guard = lock.write();
        let other = lock.clone();
        let res = thread::spawn(move || other.try_with_write(Duration::from_millis(10), |v| *v += 1))
            .join()
            .unwrap();
        assert!(res.is_none());
        drop(guard);
        assert_eq!(lock.try_with_write(Duration::from_millis(10), |v| *v + 1), Some(1));
    }

    #[test]
    fn test_yield_lets_readers_in() {
        let lock = Arc::new(CacheLock::new(0u64));
        let read = Arc::new(AtomicBool::new(false));

        let mut guard = lock.write();
        let reader = {
            let lock = lock.clone();
            let read = read.clone();
            thread::spawn(move || {
                lock.with_read(|_| read.store(true, Ordering::SeqCst));
            })
        };

        let mut chunks = 0;
        while !read.load(Ordering::SeqCst) && chunks < 10_000 {
            *guard += 1;
            yield_write(&mut guard);
            thread::sleep(Duration::from_micros(100));
            chunks += 1;
        }
        drop(guard);
        reader.join().unwrap();
        assert!(read.load(Ordering::SeqCst));
    }
}
