//! sbrk, first-fit reuse, malloc/calloc/realloc/free.
//!
//! Caller holds the exclusive segment lock (see the locking wrappers in mod.rs).

use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace, warn};

use crate::consts::{
    BLOCK_HDR_SIZE, BLOCK_MAGIC, BLOCK_OFF_MAGIC, BRK_HDR_SIZE, MIN_SPLIT_PAYLOAD,
};
use crate::error::{Result, ShmError};
use crate::metrics::{record_alloc_failure, record_free, record_malloc, record_sbrk};
use crate::offset::Offset;

use super::header::{
    block_header_read, block_header_write, round_payload, write_brk, BlockHeader,
};
use super::Allocator;

impl Allocator {
    /// Move the break forward by `inc` bytes; returns the old break.
    fn sbrk(&mut self, inc: u64) -> Result<u64> {
        let cap = self.map_size() as u64;
        let old = self.brk_nolock();
        let new = old.checked_add(inc).filter(|&n| n <= cap);
        match new {
            Some(n) => {
                write_brk(self.bytes_mut(), n);
                record_sbrk(inc);
                trace!("sbrk +{} -> {}", inc, n);
                Ok(old)
            }
            None => {
                record_alloc_failure();
                warn!(
                    "segment '{}' exhausted: need {} B, {} B left",
                    self.name(),
                    inc,
                    cap.saturating_sub(old)
                );
                Err(ShmError::CapacityExhausted {
                    requested: inc,
                    available: cap.saturating_sub(old),
                })
            }
        }
    }

    /// First free block with capacity >= `need`, split if the rest is worth keeping.
    /// Returns the header offset, the block already marked used.
    fn free_block(&mut self, need: u64) -> Result<Option<u64>> {
        let mut hit: Option<(u64, BlockHeader)> = None;
        for b in self.blocks() {
            let b = b?;
            if b.header.free && b.header.size >= need {
                hit = Some((b.offset, b.header));
                break;
            }
        }
        let Some((off, h)) = hit else { return Ok(None) };

        let rest = h.size - need;
        let buf = self.bytes_mut();
        if rest >= (BLOCK_HDR_SIZE + MIN_SPLIT_PAYLOAD) as u64 {
            block_header_write(buf, off, &BlockHeader::used(need));
            let tail = off + BLOCK_HDR_SIZE as u64 + need;
            block_header_write(buf, tail, &BlockHeader::free(rest - BLOCK_HDR_SIZE as u64));
            trace!("reuse block @{} split {} -> {} + {}", off, h.size, need, rest);
        } else {
            block_header_write(buf, off, &BlockHeader::used(h.size));
            trace!("reuse block @{} ({} B)", off, h.size);
        }
        Ok(Some(off))
    }

    pub(crate) fn malloc_nolock(&mut self, size: usize) -> Result<Offset> {
        let need = round_payload(size);

        if let Some(off) = self.free_block(need)? {
            record_malloc(true);
            return Ok(Offset::new(off + BLOCK_HDR_SIZE as u64));
        }

        let off = self.sbrk(BLOCK_HDR_SIZE as u64 + need)?;
        block_header_write(self.bytes_mut(), off, &BlockHeader::used(need));
        record_malloc(false);
        Ok(Offset::new(off + BLOCK_HDR_SIZE as u64))
    }

    pub(crate) fn calloc_nolock(&mut self, num: usize, size: usize) -> Result<Offset> {
        let total = num.checked_mul(size).ok_or(ShmError::CapacityExhausted {
            requested: u64::MAX,
            available: self.remaining_nolock(),
        })?;
        let off = self.malloc_nolock(total)?;
        // переиспользованный блок может быть «грязным»
        self.payload_mut_nolock(off)?.fill(0);
        Ok(off)
    }

    pub(crate) fn realloc_nolock(&mut self, off: Offset, size: usize) -> Result<Offset> {
        if off.is_null() {
            return self.malloc_nolock(size);
        }
        let (hdr_off, h) = self.live_block(off)?;
        let need = round_payload(size);
        if h.size >= need {
            return Ok(off);
        }

        // последний блок перед break — растём на месте
        let brk = self.brk_nolock();
        if hdr_off + h.span() == brk && need - h.size <= self.remaining_nolock() {
            self.sbrk(need - h.size)?;
            block_header_write(self.bytes_mut(), hdr_off, &BlockHeader::used(need));
            debug!("realloc in place @{}: {} -> {}", hdr_off, h.size, need);
            return Ok(off);
        }

        let new_off = self.malloc_nolock(size)?;
        let n = h.size.min(need) as usize;
        let src = off.as_usize();
        self.bytes_mut().copy_within(src..src + n, new_off.as_usize());
        self.free_nolock(off)?;
        Ok(new_off)
    }

    pub(crate) fn free_nolock(&mut self, off: Offset) -> Result<()> {
        if off.is_null() {
            return Ok(());
        }
        let (hdr_off, h) = self.live_block(off)?;
        let brk = self.brk_nolock();

        // склеиваем с последующими свободными блоками
        let mut size = h.size;
        let mut next = hdr_off + h.span();
        while next < brk {
            // битый сосед не мешает освобождению: просто не склеиваем дальше
            let nh = match block_header_read(self.bytes(), next, brk) {
                Ok(nh) => nh,
                Err(e) => {
                    warn!("free @{}: stop merging at {}", hdr_off, e);
                    break;
                }
            };
            if !nh.free {
                break;
            }
            size += nh.span();
            next += nh.span();
        }

        block_header_write(self.bytes_mut(), hdr_off, &BlockHeader::free(size));
        record_free();
        trace!("free @{} ({} B, merged to {} B)", hdr_off, h.size, size);
        Ok(())
    }

    pub(crate) fn alloc_size_nolock(&self, off: Offset) -> Result<usize> {
        self.live_block(off).map(|(_, h)| h.size as usize)
    }

    pub(crate) fn payload_nolock(&self, off: Offset) -> Result<&[u8]> {
        let n = self.alloc_size_nolock(off)?;
        let o = off.as_usize();
        Ok(&self.bytes()[o..o + n])
    }

    pub(crate) fn payload_mut_nolock(&mut self, off: Offset) -> Result<&mut [u8]> {
        let n = self.alloc_size_nolock(off)?;
        let o = off.as_usize();
        Ok(&mut self.bytes_mut()[o..o + n])
    }

    /// Header of the in-use block whose payload starts at `off`.
    fn live_block(&self, off: Offset) -> Result<(u64, BlockHeader)> {
        let p = off.get();
        if p < (BRK_HDR_SIZE + BLOCK_HDR_SIZE) as u64 {
            return Err(ShmError::InvalidOffset(p));
        }
        let hdr_off = p - BLOCK_HDR_SIZE as u64;
        let brk = self.brk_nolock();
        if p > brk {
            return Err(ShmError::InvalidOffset(p));
        }
        // нет магии — это не начало блока; есть магия, но мусор в size — порча кучи
        let m = hdr_off as usize + BLOCK_OFF_MAGIC;
        if LittleEndian::read_u32(&self.bytes()[m..m + 4]) != BLOCK_MAGIC {
            return Err(ShmError::InvalidOffset(p));
        }
        let h = block_header_read(self.bytes(), hdr_off, brk)?;
        if h.free {
            return Err(ShmError::InvalidOffset(p));
        }
        Ok((hdr_off, h))
    }
}
