//! Program-break header and block headers: layout, read/write, validation.

use byteorder::{ByteOrder, LittleEndian};

use crate::consts::{
    BLOCK_ALIGN, BLOCK_HDR_SIZE, BLOCK_MAGIC, BLOCK_OFF_MAGIC, BLOCK_OFF_SIZE, BLOCK_OFF_STATE,
    BLOCK_STATE_FREE, BLOCK_STATE_USED, BRK_HDR_SIZE, BRK_MAGIC, BRK_OFF_BREAK, BRK_OFF_CAPACITY,
    BRK_OFF_MAGIC, BRK_OFF_VERSION, BRK_VERSION,
};
use crate::error::{Result, ShmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrkHeader {
    pub version: u32,
    pub capacity: u64,
    pub brk: u64, // offset of the first byte past the last block
}

impl BrkHeader {
    pub fn empty(capacity: u64) -> Self {
        Self {
            version: BRK_VERSION,
            capacity,
            brk: BRK_HDR_SIZE as u64,
        }
    }
}

/// Parse and sanity-check the program-break header. Err carries a reason for BadSegment.
pub fn brk_header_read(buf: &[u8]) -> std::result::Result<BrkHeader, String> {
    if buf.len() < BRK_HDR_SIZE {
        return Err(format!("segment smaller than header ({} B)", buf.len()));
    }
    if &buf[BRK_OFF_MAGIC..BRK_OFF_MAGIC + 8] != BRK_MAGIC {
        return Err("bad program-break magic".into());
    }
    let version = LittleEndian::read_u32(&buf[BRK_OFF_VERSION..BRK_OFF_VERSION + 4]);
    if version != BRK_VERSION {
        return Err(format!("unsupported layout version {}", version));
    }
    let capacity = LittleEndian::read_u64(&buf[BRK_OFF_CAPACITY..BRK_OFF_CAPACITY + 8]);
    let brk = LittleEndian::read_u64(&buf[BRK_OFF_BREAK..BRK_OFF_BREAK + 8]);
    if capacity != buf.len() as u64 {
        return Err(format!(
            "capacity {} does not match mapped size {}",
            capacity,
            buf.len()
        ));
    }
    if brk < BRK_HDR_SIZE as u64 || brk > capacity {
        return Err(format!("break {} outside [{}, {}]", brk, BRK_HDR_SIZE, capacity));
    }
    Ok(BrkHeader {
        version,
        capacity,
        brk,
    })
}

pub fn brk_header_write(buf: &mut [u8], h: &BrkHeader) {
    for b in &mut buf[..BRK_HDR_SIZE] {
        *b = 0;
    }
    buf[BRK_OFF_MAGIC..BRK_OFF_MAGIC + 8].copy_from_slice(BRK_MAGIC);
    LittleEndian::write_u32(&mut buf[BRK_OFF_VERSION..BRK_OFF_VERSION + 4], h.version);
    LittleEndian::write_u64(&mut buf[BRK_OFF_CAPACITY..BRK_OFF_CAPACITY + 8], h.capacity);
    LittleEndian::write_u64(&mut buf[BRK_OFF_BREAK..BRK_OFF_BREAK + 8], h.brk);
}

#[inline]
pub fn read_brk(buf: &[u8]) -> u64 {
    LittleEndian::read_u64(&buf[BRK_OFF_BREAK..BRK_OFF_BREAK + 8])
}

#[inline]
pub fn write_brk(buf: &mut [u8], brk: u64) {
    LittleEndian::write_u64(&mut buf[BRK_OFF_BREAK..BRK_OFF_BREAK + 8], brk);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub size: u64, // payload capacity, multiple of BLOCK_ALIGN
    pub free: bool,
}

impl BlockHeader {
    #[inline]
    pub fn used(size: u64) -> Self {
        Self { size, free: false }
    }

    #[inline]
    pub fn free(size: u64) -> Self {
        Self { size, free: true }
    }

    /// Header + payload bytes.
    #[inline]
    pub fn span(&self) -> u64 {
        BLOCK_HDR_SIZE as u64 + self.size
    }
}

/// Read the block header at `off`, checking it against the current break.
pub fn block_header_read(buf: &[u8], off: u64, brk: u64) -> Result<BlockHeader> {
    // break из заголовка может быть испорчен — дальше конца отображения не читаем
    let brk = brk.min(buf.len() as u64);
    let o = off as usize;
    if off + BLOCK_HDR_SIZE as u64 > brk || o + BLOCK_HDR_SIZE > buf.len() {
        return Err(ShmError::CorruptBlock { offset: off, size: 0 });
    }
    let size = LittleEndian::read_u64(&buf[o + BLOCK_OFF_SIZE..o + BLOCK_OFF_SIZE + 8]);
    let state = LittleEndian::read_u32(&buf[o + BLOCK_OFF_STATE..o + BLOCK_OFF_STATE + 4]);
    let magic = LittleEndian::read_u32(&buf[o + BLOCK_OFF_MAGIC..o + BLOCK_OFF_MAGIC + 4]);

    let corrupt = size == 0
        || size % BLOCK_ALIGN as u64 != 0
        || magic != BLOCK_MAGIC
        || (state != BLOCK_STATE_USED && state != BLOCK_STATE_FREE)
        || off
            .checked_add(BLOCK_HDR_SIZE as u64 + size)
            .map_or(true, |end| end > brk);
    if corrupt {
        return Err(ShmError::CorruptBlock { offset: off, size });
    }
    Ok(BlockHeader {
        size,
        free: state == BLOCK_STATE_FREE,
    })
}

pub fn block_header_write(buf: &mut [u8], off: u64, h: &BlockHeader) {
    let o = off as usize;
    LittleEndian::write_u64(&mut buf[o + BLOCK_OFF_SIZE..o + BLOCK_OFF_SIZE + 8], h.size);
    let state = if h.free {
        BLOCK_STATE_FREE
    } else {
        BLOCK_STATE_USED
    };
    LittleEndian::write_u32(&mut buf[o + BLOCK_OFF_STATE..o + BLOCK_OFF_STATE + 4], state);
    LittleEndian::write_u32(&mut buf[o + BLOCK_OFF_MAGIC..o + BLOCK_OFF_MAGIC + 4], BLOCK_MAGIC);
}

/// Payload capacity actually reserved for a request of `size` bytes.
#[inline]
pub fn round_payload(size: usize) -> u64 {
    let s = size.max(1);
    (((s + BLOCK_ALIGN - 1) / BLOCK_ALIGN) * BLOCK_ALIGN) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brk_header_rejects_garbage() {
        let buf = vec![0u8; 1024];
        assert!(brk_header_read(&buf).is_err());

        let mut buf = vec![0u8; 1024];
        brk_header_write(&mut buf, &BrkHeader::empty(1024));
        let h = brk_header_read(&buf).expect("valid header");
        assert_eq!(h.brk, BRK_HDR_SIZE as u64);

        write_brk(&mut buf, 4096);
        assert!(brk_header_read(&buf).is_err(), "break past capacity");
    }

    #[test]
    fn zero_sized_block_is_corrupt() {
        let mut buf = vec![0u8; 256];
        block_header_write(&mut buf, 32, &BlockHeader::used(0));
        match block_header_read(&buf, 32, 256) {
            Err(ShmError::CorruptBlock { offset, size }) => {
                assert_eq!(offset, 32);
                assert_eq!(size, 0);
            }
            other => panic!("expected CorruptBlock, got {:?}", other),
        }
    }

    #[test]
    fn block_past_break_is_corrupt() {
        let mut buf = vec![0u8; 256];
        block_header_write(&mut buf, 32, &BlockHeader::used(64));
        assert!(block_header_read(&buf, 32, 32 + 16 + 64).is_ok());
        assert!(block_header_read(&buf, 32, 32 + 16 + 56).is_err());
    }

    #[test]
    fn payload_rounding() {
        assert_eq!(round_payload(0), 8);
        assert_eq!(round_payload(1), 8);
        assert_eq!(round_payload(8), 8);
        assert_eq!(round_payload(9), 16);
    }
}
