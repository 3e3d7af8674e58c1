// Copyright (c) The runledger Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for runledger-core.

use crate::errors::FileLockError;
use camino::Utf8Path;
use debug_ignore::DebugIgnore;
use serde::Serialize;
use std::{
    fs::{File, TryLockError},
    io::{self, Write},
    thread,
    time::{Duration, Instant},
};

/// The kind of lock to acquire.
#[derive(Clone, Copy, Debug)]
pub(crate) enum LockKind {
    Shared,
    Exclusive,
}

/// An advisory lock on a store, released when dropped.
#[derive(Debug)]
pub(crate) struct StoreLock {
    // Held for RAII lock semantics.
    #[expect(dead_code, reason = "held for lock duration")]
    file: DebugIgnore<File>,
}

impl StoreLock {
    /// Opens `lock_file_path`, creating it if necessary, and locks it.
    pub(crate) fn acquire(lock_file_path: &Utf8Path, kind: LockKind) -> Result<Self, FileLockError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_file_path)
            .map_err(|error| FileLockError::Open {
                path: lock_file_path.to_owned(),
                error,
            })?;

        acquire_lock_with_retry(&file, lock_file_path, kind)?;
        Ok(Self {
            file: DebugIgnore(file),
        })
    }
}

/// Acquires a file lock with retries, timing out after 5 seconds.
///
/// This handles both brief contention (another process finishing its archive
/// step) and filesystems where locking may not work properly (e.g., NFS).
fn acquire_lock_with_retry(
    file: &File,
    lock_file_path: &Utf8Path,
    kind: LockKind,
) -> Result<(), FileLockError> {
    const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
    const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);

    let start = Instant::now();
    loop {
        let result = match kind {
            LockKind::Shared => file.try_lock_shared(),
            LockKind::Exclusive => file.try_lock(),
        };

        match result {
            Ok(()) => return Ok(()),
            Err(TryLockError::WouldBlock) => {
                if start.elapsed() >= LOCK_TIMEOUT {
                    return Err(FileLockError::Timeout {
                        path: lock_file_path.to_owned(),
                        timeout_secs: LOCK_TIMEOUT.as_secs(),
                    });
                }
                tracing::debug!("lock on {lock_file_path} is held, retrying");
                thread::sleep(LOCK_RETRY_INTERVAL);
            }
            Err(TryLockError::Error(error)) => {
                return Err(FileLockError::Lock {
                    path: lock_file_path.to_owned(),
                    error,
                });
            }
        }
    }
}

/// Serializes `value` as pretty-printed JSON and atomically replaces `path`
/// with it.
pub(crate) fn write_json_atomic<T: Serialize>(
    path: &Utf8Path,
    value: &T,
) -> Result<(), atomicwrites::Error<io::Error>> {
    atomicwrites::AtomicFile::new(path, atomicwrites::AllowOverwrite).write(|file| {
        let mut writer = io::BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()
    })
}

/// Atomically replaces `path` with `bytes`.
pub(crate) fn write_bytes_atomic(
    path: &Utf8Path,
    bytes: &[u8],
) -> Result<(), atomicwrites::Error<io::Error>> {
    atomicwrites::AtomicFile::new(path, atomicwrites::AllowOverwrite)
        .write(|file| file.write_all(bytes))
}

/// Returns "s" if `count` is not 1.
pub(crate) fn plural_s(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;

    #[test]
    fn exclusive_lock_blocks_second_exclusive() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let lock_path = dir.path().join("store.lock");

        let first = StoreLock::acquire(&lock_path, LockKind::Exclusive).expect("first lock");
        let file = File::options()
            .write(true)
            .open(&lock_path)
            .expect("lock file exists");
        assert!(matches!(file.try_lock(), Err(TryLockError::WouldBlock)));

        drop(first);
        StoreLock::acquire(&lock_path, LockKind::Exclusive).expect("lock released on drop");
    }

    #[test]
    fn shared_locks_coexist() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let lock_path = dir.path().join("store.lock");

        let _first = StoreLock::acquire(&lock_path, LockKind::Shared).expect("first lock");
        let _second = StoreLock::acquire(&lock_path, LockKind::Shared).expect("second lock");
    }

    #[test]
    fn json_write_replaces_file() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let path = dir.path().join("value.json");

        write_json_atomic(&path, &vec![1, 2]).expect("first write");
        write_json_atomic(&path, &vec![3]).expect("second write");

        let contents = std::fs::read_to_string(&path).expect("file exists");
        let value: Vec<u32> = serde_json::from_str(&contents).expect("valid JSON");
        assert_eq!(value, vec![3]);
    }
}
