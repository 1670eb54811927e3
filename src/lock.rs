//! Cross-process locking for a shared segment.
//!
//! Cross-platform (fs2) advisory locks on `<dir>/<name>.lock`:
//! - Exclusive: any allocator or table mutation.
//! - Shared: lookups, so a reader never observes a half-done rehash.
//!
//! Locks belong to the open file description, so two handles in one process
//! contend exactly like two processes. Lock is released on Drop of the guard.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, ShmError};
use crate::metrics::record_lock_wait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Lock file handle kept open for the lifetime of a segment handle.
#[derive(Debug)]
pub struct SegmentLock {
    file: Arc<File>,
    path: PathBuf,
}

#[derive(Debug)]
pub struct LockGuard {
    file: Arc<File>,
    mode: LockMode,
}

impl LockGuard {
    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // ошибки unlock при drop некуда вернуть
        let _ = FileExt::unlock(&*self.file);
    }
}

impl SegmentLock {
    pub fn open(path: &Path) -> Result<Self> {
        let f = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| lock_err(path, e))?;
        Ok(Self {
            file: Arc::new(f),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire in the requested mode. Blocks until acquired.
    pub fn acquire(&self, mode: LockMode) -> Result<LockGuard> {
        if let Some(g) = self.try_acquire(mode)? {
            return Ok(g);
        }
        record_lock_wait();
        let res = match mode {
            LockMode::Shared => FileExt::lock_shared(&*self.file),
            LockMode::Exclusive => FileExt::lock_exclusive(&*self.file),
        };
        res.map_err(|e| lock_err(&self.path, e))?;
        Ok(self.guard(mode))
    }

    /// Non-blocking attempt. Ok(None) when another holder is in the way.
    pub fn try_acquire(&self, mode: LockMode) -> Result<Option<LockGuard>> {
        let res = match mode {
            LockMode::Shared => FileExt::try_lock_shared(&*self.file),
            LockMode::Exclusive => FileExt::try_lock_exclusive(&*self.file),
        };
        match res {
            Ok(()) => Ok(Some(self.guard(mode))),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(lock_err(&self.path, e)),
        }
    }

    #[inline]
    pub fn exclusive(&self) -> Result<LockGuard> {
        self.acquire(LockMode::Exclusive)
    }

    #[inline]
    pub fn shared(&self) -> Result<LockGuard> {
        self.acquire(LockMode::Shared)
    }

    fn guard(&self, mode: LockMode) -> LockGuard {
        LockGuard {
            file: Arc::clone(&self.file),
            mode,
        }
    }
}

fn lock_err(path: &Path, source: std::io::Error) -> ShmError {
    ShmError::Lock {
        path: path.to_path_buf(),
        source,
    }
}
