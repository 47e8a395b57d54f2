//! Advisory lock serializing apply-and-commit sequences on one repository.
//!
//! The lock file lives inside the git directory, so it is shared by every
//! thread and process that applies patches to the same working tree.

use std::fs::{File, OpenOptions};
use std::path::Path;

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use tracing::debug;

/// Lock file name inside the git directory.
pub const LOCK_FILE_NAME: &str = "patchdrop.lock";

/// RAII exclusive lock; released on drop.
#[derive(Debug)]
pub struct RepoLock {
    _file: File,
}

impl RepoLock {
    /// Block until the exclusive lock at `path` is held.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create lock dir {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("open lock file {}", path.display()))?;
        debug!(path = %path.display(), "waiting for repository lock");
        file.lock_exclusive()
            .with_context(|| format!("acquire exclusive lock {}", path.display()))?;
        debug!(path = %path.display(), "repository lock held");
        Ok(Self { _file: file })
    }
}

#[cfg(test)]
impl RepoLock {
    /// Try to take the lock without blocking; `None` if another holder has it.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("open lock file {}", path.display()))?;
        match file.try_lock_exclusive() {
            Ok(true) => Ok(Some(Self { _file: file })),
            Ok(false) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("try lock {}", path.display())),
        }
    }
}
