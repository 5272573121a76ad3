//! Cross-process advisory lock serializing all transactions on a host.

use crate::error::{RangeError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// An exclusive lock on a file, released when dropped.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
    acquired_at: Instant,
}

impl FileLock {
    /// Acquire the lock, blocking until it is free or `timeout` elapses.
    ///
    /// With no timeout this waits indefinitely. The lock file is created
    /// if missing and never removed.
    pub fn acquire(path: impl AsRef<Path>, timeout: Option<Duration>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| RangeError::io(path, "Failed to open lock file", e))?;

        let started = Instant::now();
        match timeout {
            None => {
                // Use explicit fs2::FileExt call to avoid conflict with std File locking (1.89+)
                FileExt::lock_exclusive(&file)
                    .map_err(|e| RangeError::io(path, "Failed to acquire exclusive lock", e))?;
            }
            Some(timeout) => loop {
                match FileExt::try_lock_exclusive(&file) {
                    Ok(()) => break,
                    Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                        if started.elapsed() >= timeout {
                            tracing::warn!(path = %path.display(), ?timeout, "Lock wait timed out");
                            return Err(RangeError::LockTimeout {
                                path: path.to_path_buf(),
                                timeout_ms: timeout.as_millis() as u64,
                            });
                        }
                        std::thread::sleep(POLL_INTERVAL);
                    }
                    Err(e) => {
                        return Err(RangeError::io(path, "Failed to acquire exclusive lock", e));
                    }
                }
            },
        }

        tracing::debug!(
            path = %path.display(),
            waited_ms = started.elapsed().as_millis() as u64,
            "Acquired transaction lock"
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            acquired_at: Instant::now(),
        })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        tracing::debug!(
            path = %self.path.display(),
            held_ms = self.acquired_at.elapsed().as_millis() as u64,
            "Released transaction lock"
        );
    }
}
