//! Shared hash table — open addressing over allocator blocks.
//!
//! Разнесение:
//! - header.rs — hash header, слоты каталога (Empty / Tombstone / Live)
//! - ops.rs    — insert/find/value/take/remove/clear/rehash, листинг и статистика
//!
//! The hash header is the first block carved from a fresh segment, so its
//! offset is fixed and every attaching process finds it without a pointer.
//! The directory and every record are ordinary allocator blocks; slots hold
//! segment-relative offsets.
//!
//! Locking: mutations take the exclusive segment lock for their whole run
//! (allocator calls inside use the `*_nolock` paths), lookups take the shared
//! lock, so a lookup never runs against a directory a rehash is replacing.

mod header;
mod ops;

pub use header::{HashHeader, Slot};
pub use ops::TableStats;

use log::info;

use crate::alloc::Allocator;
use crate::consts::{BLOCK_HDR_SIZE, BRK_HDR_SIZE, HASH_HDR_OFF, HASH_HDR_SIZE, SLOT_SIZE};
use crate::error::{Result, ShmError};
use crate::offset::Offset;

use header::{hash_header_read, hash_header_write};

/// View of the table living in a segment. Holds no shared state itself: every
/// operation goes through the allocator handle passed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedHash {
    hdr: Offset,
}

impl SharedHash {
    /// Lay down an empty table in a fresh segment (nothing allocated yet).
    pub fn init(alloc: &mut Allocator, table_size: usize) -> Result<Self> {
        let _g = alloc.lock_exclusive()?;
        Self::init_nolock(alloc, table_size)
    }

    /// Find the table in an attached segment.
    pub fn open(alloc: &Allocator) -> Result<Self> {
        let _g = alloc.lock_shared()?;
        let at = Offset::new(HASH_HDR_OFF);
        hash_header_read(alloc.bytes(), at)?;
        Ok(Self { hdr: at })
    }

    /// Open the table, initializing it first if this segment has none yet.
    pub fn open_or_init(alloc: &mut Allocator, table_size: usize) -> Result<Self> {
        let _g = alloc.lock_exclusive()?;
        let at = Offset::new(HASH_HDR_OFF);
        match hash_header_read(alloc.bytes(), at) {
            Ok(_) => Ok(Self { hdr: at }),
            Err(ShmError::TableNotInitialized) => Self::init_nolock(alloc, table_size),
            Err(e) => Err(e),
        }
    }

    fn init_nolock(alloc: &mut Allocator, table_size: usize) -> Result<Self> {
        let table_size = table_size.max(1);
        if alloc.brk_nolock() != BRK_HDR_SIZE as u64 {
            return Err(ShmError::BadSegment {
                name: alloc.name().to_string(),
                reason: "heap already in use, cannot place hash header".into(),
            });
        }

        // проверяем место заранее, чтобы не оставить полуготовую таблицу
        let need = (2 * BLOCK_HDR_SIZE + HASH_HDR_SIZE + table_size * SLOT_SIZE) as u64;
        if need > alloc.remaining_nolock() {
            return Err(ShmError::CapacityExhausted {
                requested: need,
                available: alloc.remaining_nolock(),
            });
        }

        let hdr = alloc.malloc_nolock(HASH_HDR_SIZE)?;
        if hdr.get() != HASH_HDR_OFF {
            return Err(ShmError::BadSegment {
                name: alloc.name().to_string(),
                reason: format!("hash header landed at {} instead of {}", hdr, HASH_HDR_OFF),
            });
        }
        let dir = alloc.calloc_nolock(table_size, SLOT_SIZE)?;
        hash_header_write(
            alloc.bytes_mut(),
            hdr,
            &HashHeader {
                table_size: table_size as u64,
                count: 0,
                dir,
            },
        );
        info!(
            "initialized shared table in '{}': {} slots, directory at {}",
            alloc.name(),
            table_size,
            dir
        );
        Ok(Self { hdr })
    }

    /// Offset of the hash header inside the segment.
    #[inline]
    pub fn header_offset(&self) -> Offset {
        self.hdr
    }
}
