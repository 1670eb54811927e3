//! Named shared memory segments.
//!
//! A segment is a file in the shm directory (`/dev/shm` on Linux, the system
//! temp dir elsewhere, or an explicit directory from config) mapped
//! `MAP_SHARED` with memmap2. That is what `shm_open` does under the hood on
//! Linux, and it lets every attaching process see the same bytes at whatever
//! base address its own mapping lands on.
//!
//! Рядом лежит `<name>.lock` — файл межпроцессной блокировки (см. lock.rs).

use log::info;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::consts::{LOCK_EXT, SHM_DIR};
use crate::error::{Result, ShmError};
use crate::lock::{LockGuard, SegmentLock};
use crate::offset::MapBase;

pub struct Segment {
    name: String,
    path: PathBuf,
    // держим открытым на время жизни mmap
    _file: File,
    mmap: MmapMut,
    lock: SegmentLock,
}

/// Directory that holds segment objects when none is configured.
pub fn default_dir() -> PathBuf {
    let shm = Path::new(SHM_DIR);
    if shm.is_dir() {
        shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

/// Normalize a segment name. A leading '/' (POSIX shm style) is accepted and dropped.
pub fn normalize_name(name: &str) -> Result<&str> {
    let n = name.strip_prefix('/').unwrap_or(name);
    if n.is_empty() || n.contains('/') || n == "." || n == ".." || n.contains('\0') {
        return Err(ShmError::InvalidName(name.to_string()));
    }
    Ok(n)
}

pub fn segment_path(dir: &Path, name: &str) -> Result<PathBuf> {
    Ok(dir.join(normalize_name(name)?))
}

pub fn lock_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let n = normalize_name(name)?;
    Ok(dir.join(format!("{}.{}", n, LOCK_EXT)))
}

pub fn exists(dir: &Path, name: &str) -> bool {
    segment_path(dir, name).map(|p| p.is_file()).unwrap_or(false)
}

impl Segment {
    /// Create (or recreate from scratch) a segment of exactly `size` bytes.
    ///
    /// Returns the exclusive guard still held, so the caller can lay down its
    /// headers before any peer can attach and look at the bytes.
    pub fn create(dir: &Path, name: &str, size: usize) -> Result<(Self, LockGuard)> {
        let lock = SegmentLock::open(&lock_path(dir, name)?)?;
        let guard = lock.exclusive()?;
        Self::create_locked(dir, name, size, lock, guard)
    }

    /// Same as [`create`](Self::create) for a caller that already holds the
    /// exclusive lock on this name.
    pub(crate) fn create_locked(
        dir: &Path,
        name: &str,
        size: usize,
        lock: SegmentLock,
        guard: LockGuard,
    ) -> Result<(Self, LockGuard)> {
        let n = normalize_name(name)?.to_string();
        let path = segment_path(dir, &n)?;
        let create_err = |e: std::io::Error| ShmError::SegmentCreateFailed {
            name: n.clone(),
            source: e,
        };
        if size == 0 {
            return Err(create_err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "segment size must be > 0",
            )));
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(create_err)?;
        file.set_len(size as u64).map_err(create_err)?;

        let mmap = unsafe { MmapOptions::new().len(size).map_mut(&file) }.map_err(create_err)?;

        info!("created shared segment '{}' ({} B) at {}", n, size, path.display());
        Ok((
            Self {
                name: n,
                path,
                _file: file,
                mmap,
                lock,
            },
            guard,
        ))
    }

    /// Map an existing segment without touching its contents.
    pub fn attach(dir: &Path, name: &str) -> Result<Self> {
        // не плодим lock-файлы для несуществующих имён
        if !segment_path(dir, name)?.exists() {
            return Err(ShmError::SegmentNotFound(normalize_name(name)?.to_string()));
        }
        let lock = SegmentLock::open(&lock_path(dir, name)?)?;
        Self::attach_with_lock(dir, name, lock)
    }

    pub(crate) fn attach_with_lock(dir: &Path, name: &str, lock: SegmentLock) -> Result<Self> {
        let n = normalize_name(name)?.to_string();
        let path = segment_path(dir, &n)?;

        let file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ShmError::SegmentNotFound(n));
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Err(ShmError::BadSegment {
                name: n,
                reason: "zero-length object".into(),
            });
        }
        let mmap = unsafe { MmapOptions::new().len(len).map_mut(&file) }?;

        info!("attached shared segment '{}' ({} B)", n, len);
        Ok(Self {
            name: n,
            path,
            _file: file,
            mmap,
            lock,
        })
    }

    /// Drop the mapping but keep the lock handle (and whatever it holds).
    pub(crate) fn into_lock(self) -> SegmentLock {
        self.lock
    }

    /// Remove the name from the namespace. Existing mappings stay valid.
    /// Returns false if there was nothing to remove.
    pub fn unlink(dir: &Path, name: &str) -> Result<bool> {
        let path = segment_path(dir, name)?;
        let removed = match std::fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        // lock-файл — best-effort
        let _ = std::fs::remove_file(lock_path(dir, name)?);
        if removed {
            info!("unlinked shared segment '{}'", normalize_name(name)?);
        }
        Ok(removed)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    #[inline]
    pub fn lock(&self) -> &SegmentLock {
        &self.lock
    }

    #[inline]
    pub fn base(&self) -> MapBase {
        MapBase::new(self.mmap.as_ptr(), self.mmap.len())
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("len", &self.mmap.len())
            .finish()
    }
}
