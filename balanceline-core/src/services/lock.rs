//! Per-account import locks
//!
//! One lock file per account under `<data dir>/locks/`. The lock is an OS
//! file lock, so it serializes imports across threads and across processes
//! sharing the same data directory.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use uuid::Uuid;

use crate::domain::result::{Error, Result};

#[derive(Debug, Clone)]
pub struct AccountLocks {
    dir: PathBuf,
}

impl AccountLocks {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("locks"),
        }
    }

    fn lock_path(&self, account_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.lock", account_id))
    }

    fn open(&self, account_id: Uuid) -> Result<(File, PathBuf)> {
        fs::create_dir_all(&self.dir)?;
        let path = self.lock_path(account_id);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        Ok((file, path))
    }

    /// Block until the account's lock is free
    pub fn acquire(&self, account_id: Uuid) -> Result<AccountLockGuard> {
        let (file, path) = self.open(account_id)?;
        file.lock_exclusive().map_err(|e| {
            Error::Other(format!("cannot lock {}: {}", path.display(), e))
        })?;
        Ok(AccountLockGuard { file, path })
    }

    /// Take the lock only if nobody holds it
    pub fn try_acquire(&self, account_id: Uuid) -> Result<Option<AccountLockGuard>> {
        let (file, path) = self.open(account_id)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(AccountLockGuard { file, path })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(Error::Other(format!(
                "cannot lock {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// Held lock; released on drop
#[derive(Debug)]
pub struct AccountLockGuard {
    file: File,
    path: PathBuf,
}

impl AccountLockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AccountLockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
