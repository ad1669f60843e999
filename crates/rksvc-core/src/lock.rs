//! Exclusive invocation lock held across a whole orchestrated command.

use std::fs::{File, OpenOptions};
use std::path::Path;

use anyhow::Context;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::debug;

use crate::error::LifecycleError;

/// Held for the lifetime of the value; released on drop.
#[derive(Debug)]
pub struct InvocationLock {
    _lock: Flock<File>,
}

impl InvocationLock {
    /// Take the lock without blocking.
    pub fn acquire(path: &Path) -> crate::Result<Self> {
        let file = open_lock_file(path).map_err(|source| {
            LifecycleError::FilesystemPermissionError {
                path: path.to_path_buf(),
                source,
            }
        })?;
        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => {
                debug!(path = %path.display(), "acquired invocation lock");
                Ok(Self { _lock: lock })
            }
            Err((_, Errno::EWOULDBLOCK)) => Err(LifecycleError::ConcurrentInvocation {
                path: path.to_path_buf(),
            }),
            Err((_, errno)) => Err(LifecycleError::FilesystemPermissionError {
                path: path.to_path_buf(),
                source: anyhow::Error::new(errno).context("flock failed"),
            }),
        }
    }
}

fn open_lock_file(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create lock directory: {}", parent.display()))?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open lock file: {}", path.display()))
}
