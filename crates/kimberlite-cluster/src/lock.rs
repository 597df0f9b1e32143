//! Process-singleton lock: an advisory exclusive non-blocking flock on a
//! configured path, held for the lifetime of the process.

use std::fs::{File, OpenOptions};
use std::path::Path;

use rustix::fs::{flock, FlockOperation};

use crate::error::{Error, Result};

/// A held exclusive lock. Dropping it releases the lock (the OS also
/// releases it automatically when the file descriptor closes, including
/// on process exit, but an explicit `Drop` keeps the intent visible).
pub struct ProcessLock {
    _file: File,
}

/// Opens (creating if absent) and exclusively locks `path`. Fails
/// immediately, without blocking, if another process already holds it —
/// this guards against two controller instances fighting over the same
/// database and firewall.
pub fn acquire(path: &Path) -> Result<ProcessLock> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;

    flock(&file, FlockOperation::NonBlockingLockExclusive)
        .map_err(|_| Error::LockHeld(path.to_path_buf()))?;

    Ok(ProcessLock { _file: file })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquiring_twice_fails_the_second_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("controller.lock");

        let first = acquire(&path).unwrap();
        let second = acquire(&path);
        assert!(second.is_err());
        drop(first);
    }

    #[test]
    fn lock_file_is_created_if_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("controller.lock");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let lock = acquire(&path);
        assert!(lock.is_ok());
    }
}
