//! Advisory lock on the pending directory.
//!
//! The in-process [`SharedLogBuffer`](super::SharedLogBuffer) mutex only
//! excludes tasks of one process. A `run` process and an `upload` process
//! share the pending directory too, so both also take an exclusive `flock`
//! on a lock file inside it. The lock is released when the guard drops.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

/// Lock file created in the pending directory. Hidden, so directory
/// listings for upload skip it.
pub const LOCK_FILE_NAME: &str = ".cell-logger.lock";

/// Held exclusive lock on a pending directory
#[derive(Debug)]
pub struct DirLock {
    _file: File,
    path: PathBuf,
}

impl DirLock {
    /// Block until the lock on `dir` is acquired.
    ///
    /// Fails if `dir` does not exist.
    pub fn acquire(dir: &Path) -> io::Result<Self> {
        let path = dir.join(LOCK_FILE_NAME);
        let file = open_lock_file(&path)?;
        file.lock_exclusive()?;
        debug!("Acquired pending directory lock {}", path.display());
        Ok(Self { _file: file, path })
    }

    /// Acquire the lock if nobody holds it
    pub fn try_acquire(dir: &Path) -> io::Result<Option<Self>> {
        let path = dir.join(LOCK_FILE_NAME);
        let file = open_lock_file(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { _file: file, path })),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        debug!("Released pending directory lock {}", self.path.display());
    }
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

/// True for entries of the pending directory that are not log files
pub fn is_lock_file(name: &str) -> bool {
    name == LOCK_FILE_NAME
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_holder_is_refused() {
        let dir = TempDir::new().unwrap();
        let held = DirLock::acquire(dir.path()).unwrap();
        assert!(held.path().ends_with(LOCK_FILE_NAME));

        assert!(DirLock::try_acquire(dir.path()).unwrap().is_none());
        drop(held);
        assert!(DirLock::try_acquire(dir.path()).unwrap().is_some());
    }

    #[test]
    fn test_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        assert!(DirLock::acquire(&dir.path().join("gone")).is_err());
    }

    #[test]
    fn test_acquire_waits_for_release() {
        let dir = TempDir::new().unwrap();
        let held = DirLock::acquire(dir.path()).unwrap();

        let path = dir.path().to_path_buf();
        let waiter = std::thread::spawn(move || DirLock::acquire(&path).map(|_| ()));
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!waiter.is_finished());

        drop(held);
        waiter.join().unwrap().unwrap();
    }
}
