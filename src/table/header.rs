//! Hash header and bucket directory slots.

use byteorder::{ByteOrder, LittleEndian};

use crate::consts::{
    HASH_HDR_SIZE, HASH_MAGIC, HASH_OFF_COUNT, HASH_OFF_DIR, HASH_OFF_MAGIC, HASH_OFF_TABLE_SIZE,
    SLOT_EMPTY, SLOT_SIZE, SLOT_TOMBSTONE,
};
use crate::error::{Result, ShmError};
use crate::offset::Offset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashHeader {
    pub table_size: u64,
    pub count: u64,
    pub dir: Offset, // payload offset of the directory block
}

pub fn hash_header_read(buf: &[u8], at: Offset) -> Result<HashHeader> {
    let o = at.as_usize();
    if o + HASH_HDR_SIZE > buf.len() || &buf[o + HASH_OFF_MAGIC..o + HASH_OFF_MAGIC + 8] != HASH_MAGIC
    {
        return Err(ShmError::TableNotInitialized);
    }
    let table_size = LittleEndian::read_u64(&buf[o + HASH_OFF_TABLE_SIZE..o + HASH_OFF_TABLE_SIZE + 8]);
    let count = LittleEndian::read_u64(&buf[o + HASH_OFF_COUNT..o + HASH_OFF_COUNT + 8]);
    let dir = LittleEndian::read_u64(&buf[o + HASH_OFF_DIR..o + HASH_OFF_DIR + 8]);
    let end = dir.saturating_add(table_size.saturating_mul(SLOT_SIZE as u64));
    if table_size == 0 || dir == 0 || end > buf.len() as u64 {
        return Err(ShmError::CorruptBlock {
            offset: dir,
            size: table_size.saturating_mul(SLOT_SIZE as u64),
        });
    }
    Ok(HashHeader {
        table_size,
        count,
        dir: Offset::new(dir),
    })
}

pub fn hash_header_write(buf: &mut [u8], at: Offset, h: &HashHeader) {
    let o = at.as_usize();
    buf[o + HASH_OFF_MAGIC..o + HASH_OFF_MAGIC + 8].copy_from_slice(HASH_MAGIC);
    LittleEndian::write_u64(&mut buf[o + HASH_OFF_TABLE_SIZE..o + HASH_OFF_TABLE_SIZE + 8], h.table_size);
    LittleEndian::write_u64(&mut buf[o + HASH_OFF_COUNT..o + HASH_OFF_COUNT + 8], h.count);
    LittleEndian::write_u64(&mut buf[o + HASH_OFF_DIR..o + HASH_OFF_DIR + 8], h.dir.get());
}

/// Slot state in the bucket directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Never used: terminates a negative probe.
    Empty,
    /// Deleted: probing continues through it.
    Tombstone,
    Live(Offset),
}

impl Slot {
    #[inline]
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            SLOT_EMPTY => Slot::Empty,
            r if r < 0 => Slot::Tombstone,
            r => Slot::Live(Offset::new(r as u64)),
        }
    }

    #[inline]
    pub fn to_raw(self) -> i64 {
        match self {
            Slot::Empty => SLOT_EMPTY,
            Slot::Tombstone => SLOT_TOMBSTONE,
            Slot::Live(off) => off.to_slot(),
        }
    }
}

#[inline]
fn slot_pos(dir: Offset, idx: usize) -> usize {
    dir.as_usize() + idx * SLOT_SIZE
}

#[inline]
pub fn read_slot(buf: &[u8], dir: Offset, idx: usize) -> Slot {
    let p = slot_pos(dir, idx);
    Slot::from_raw(LittleEndian::read_i64(&buf[p..p + SLOT_SIZE]))
}

/// Single aligned 8-byte store: a slot flips between states in one write.
#[inline]
pub fn write_slot(buf: &mut [u8], dir: Offset, idx: usize, slot: Slot) {
    let p = slot_pos(dir, idx);
    LittleEndian::write_i64(&mut buf[p..p + SLOT_SIZE], slot.to_raw());
}
