//! Segment allocator — malloc/calloc/realloc/free над именованным сегментом.
//!
//! Разнесение:
//! - header.rs — program-break header и заголовки блоков (layout, validation)
//! - blocks.rs — линейный обход цепочки блоков
//! - ops.rs    — sbrk, поиск свободного блока, malloc/calloc/realloc/free
//! - diag.rs   — summary/dump/nblocks
//!
//! Модель: классический break-pointer аллокатор. Break только растёт;
//! освобождённые блоки переиспользуются (first fit, с расщеплением), соседние
//! свободные блоки склеиваются при free.
//!
//! Every public mutating call takes the segment's exclusive lock for its
//! duration; reads take the shared lock. The `*_nolock` variants are for
//! callers (the shared table) that already hold the exclusive lock across a
//! larger operation.

mod blocks;
mod diag;
mod header;
mod ops;

pub use blocks::{BlockRef, Blocks};
pub use diag::AllocSummary;
pub use header::{BlockHeader, BrkHeader};

use log::{info, warn};
use std::cell::Cell;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::Path;

use crate::consts::{BLOCK_ALIGN, BLOCK_HDR_SIZE, BRK_HDR_SIZE};
use crate::error::{Result, ShmError};
use crate::lock::{LockGuard, LockMode, SegmentLock};
use crate::offset::{MapBase, Offset};
use crate::segment::{self, default_dir, Segment};

use header::{brk_header_read, brk_header_write, read_brk};

/// Smallest segment that can hold the break header and one minimal block.
pub const MIN_SEGMENT_SIZE: usize = BRK_HDR_SIZE + BLOCK_HDR_SIZE + BLOCK_ALIGN;

/// Handle to one process-local mapping of a shared segment.
///
/// A handle is `Send` but not `Sync`: share it across threads behind a mutex,
/// or give each thread its own handle (they then contend on the segment lock
/// like separate processes).
pub struct Allocator {
    seg: Segment,
    is_new: bool,
    _not_sync: PhantomData<Cell<()>>,
}

impl Allocator {
    /// Create `name` in the default shm directory with an empty heap.
    pub fn create(name: &str, size: usize) -> Result<Self> {
        Self::create_in(&default_dir(), name, size)
    }

    pub fn create_in(dir: &Path, name: &str, size: usize) -> Result<Self> {
        check_size(name, size)?;
        let (seg, guard) = Segment::create(dir, name, size)?;
        Ok(Self::init_fresh(seg, guard))
    }

    /// Attach to an existing segment without resetting it.
    pub fn attach(name: &str) -> Result<Self> {
        Self::attach_in(&default_dir(), name)
    }

    pub fn attach_in(dir: &Path, name: &str) -> Result<Self> {
        let seg = Segment::attach(dir, name)?;
        {
            let _g = seg.lock().shared()?;
            validate(&seg)?;
        }
        Ok(Self {
            seg,
            is_new: false,
            _not_sync: PhantomData,
        })
    }

    /// Attach if a valid segment exists, otherwise create it. The decision and
    /// the initialization happen under one exclusive lock.
    pub fn open_or_create(name: &str, size: usize) -> Result<Self> {
        Self::open_or_create_in(&default_dir(), name, size)
    }

    pub fn open_or_create_in(dir: &Path, name: &str, size: usize) -> Result<Self> {
        check_size(name, size)?;
        let lock = SegmentLock::open(&segment::lock_path(dir, name)?)?;
        let guard = lock.exclusive()?;

        let lock = if segment::exists(dir, name) {
            let seg = Segment::attach_with_lock(dir, name, lock)?;
            match validate(&seg) {
                Ok(()) => {
                    drop(guard);
                    return Ok(Self {
                        seg,
                        is_new: false,
                        _not_sync: PhantomData,
                    });
                }
                Err(e) => {
                    warn!("recreating segment '{}': {}", seg.name(), e);
                    seg.into_lock()
                }
            }
        } else {
            lock
        };

        let (seg, guard) = Segment::create_locked(dir, name, size, lock, guard)?;
        Ok(Self::init_fresh(seg, guard))
    }

    /// Remove the segment name. Processes that have it mapped keep working.
    pub fn unlink(name: &str) -> Result<bool> {
        Self::unlink_in(&default_dir(), name)
    }

    pub fn unlink_in(dir: &Path, name: &str) -> Result<bool> {
        Segment::unlink(dir, name)
    }

    fn init_fresh(mut seg: Segment, guard: LockGuard) -> Self {
        let cap = seg.len() as u64;
        brk_header_write(seg.bytes_mut(), &BrkHeader::empty(cap));
        drop(guard);
        info!("initialized heap in '{}': capacity {} B", seg.name(), cap);
        Self {
            seg,
            is_new: true,
            _not_sync: PhantomData,
        }
    }

    // -------- Public allocation API (locks internally) --------

    /// At least `size` writable bytes. CapacityExhausted if the break cannot move.
    pub fn malloc(&mut self, size: usize) -> Result<Offset> {
        let _g = self.lock_exclusive()?;
        self.malloc_nolock(size)
    }

    /// Like malloc, zero-filled.
    pub fn calloc(&mut self, num: usize, size: usize) -> Result<Offset> {
        let _g = self.lock_exclusive()?;
        self.calloc_nolock(num, size)
    }

    /// Resize; contents up to min(old, new) are preserved. NULL behaves as malloc.
    pub fn realloc(&mut self, off: Offset, size: usize) -> Result<Offset> {
        let _g = self.lock_exclusive()?;
        self.realloc_nolock(off, size)
    }

    /// Return the block to the reuse pool. NULL is a no-op.
    pub fn free(&mut self, off: Offset) -> Result<()> {
        let _g = self.lock_exclusive()?;
        self.free_nolock(off)
    }

    /// Usable payload bytes behind `off` (>= what was requested).
    pub fn alloc_size(&self, off: Offset) -> Result<usize> {
        let _g = self.lock_shared()?;
        self.alloc_size_nolock(off)
    }

    /// Copy of a live block's payload (whole capacity, see alloc_size),
    /// taken under the shared lock.
    pub fn payload(&self, off: Offset) -> Result<Vec<u8>> {
        let _g = self.lock_shared()?;
        Ok(self.payload_nolock(off)?.to_vec())
    }

    /// Run `f` over a live block's payload while the exclusive lock is held.
    pub fn with_payload_mut<R>(&mut self, off: Offset, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let _g = self.lock_exclusive()?;
        Ok(f(self.payload_mut_nolock(off)?))
    }

    // -------- Geometry --------

    /// Segment capacity in bytes.
    #[inline]
    pub fn map_size(&self) -> usize {
        self.seg.len()
    }

    /// Local base address of this process' mapping.
    #[inline]
    pub fn origin(&self) -> *const u8 {
        self.seg.base().as_ptr()
    }

    #[inline]
    pub fn base(&self) -> MapBase {
        self.seg.base()
    }

    /// Current break (end of the last block).
    pub fn brk(&self) -> Result<u64> {
        let _g = self.lock_shared()?;
        Ok(self.brk_nolock())
    }

    /// Bytes still available to sbrk.
    pub fn remaining(&self) -> Result<u64> {
        let _g = self.lock_shared()?;
        Ok(self.remaining_nolock())
    }

    /// True if this handle created (or recreated) the segment.
    #[inline]
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.seg.name()
    }

    #[inline]
    pub fn path(&self) -> &Path {
        self.seg.path()
    }

    // -------- crate-internal plumbing (caller holds the lock) --------

    /// Walk every block from the header end to the break.
    pub(crate) fn blocks(&self) -> Blocks<'_> {
        Blocks::new(self.bytes(), self.brk_nolock())
    }

    /// Break as stored, clamped to the mapping: a damaged header must not
    /// send any slice past the end of the segment.
    #[inline]
    pub(crate) fn brk_nolock(&self) -> u64 {
        read_brk(self.bytes()).clamp(BRK_HDR_SIZE as u64, self.map_size() as u64)
    }

    /// Raw stored break, for diagnostics.
    #[inline]
    pub(crate) fn brk_raw(&self) -> u64 {
        read_brk(self.bytes())
    }

    #[inline]
    pub(crate) fn remaining_nolock(&self) -> u64 {
        (self.map_size() as u64).saturating_sub(self.brk_nolock())
    }

    #[inline]
    pub(crate) fn bytes(&self) -> &[u8] {
        self.seg.bytes()
    }

    #[inline]
    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        self.seg.bytes_mut()
    }

    pub(crate) fn lock_exclusive(&self) -> Result<LockGuard> {
        self.seg.lock().acquire(LockMode::Exclusive)
    }

    pub(crate) fn lock_shared(&self) -> Result<LockGuard> {
        self.seg.lock().acquire(LockMode::Shared)
    }
}

impl std::fmt::Debug for Allocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocator")
            .field("segment", &self.seg)
            .field("brk", &self.brk_raw())
            .field("is_new", &self.is_new)
            .finish()
    }
}

fn check_size(name: &str, size: usize) -> Result<()> {
    if size < MIN_SEGMENT_SIZE {
        return Err(ShmError::SegmentCreateFailed {
            name: name.to_string(),
            source: std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("segment size {} < minimum {}", size, MIN_SEGMENT_SIZE),
            ),
        });
    }
    Ok(())
}

fn validate(seg: &Segment) -> Result<()> {
    brk_header_read(seg.bytes())
        .map(|_| ())
        .map_err(|reason| ShmError::BadSegment {
            name: seg.name().to_string(),
            reason,
        })
}
