//! Linear walk over the block chain.
//!
//! Blocks are laid out back to back from the end of the program-break header
//! up to the break, with no gaps, so a walk visits every block exactly once in
//! address order. The walk is shared by free-block search, diagnostics and the
//! table's listing.

use crate::consts::{BLOCK_HDR_SIZE, BRK_HDR_SIZE};
use crate::error::Result;
use crate::offset::Offset;

use super::header::{block_header_read, BlockHeader};

#[derive(Debug, Clone, Copy)]
pub struct BlockRef<'a> {
    /// Offset of the block header.
    pub offset: u64,
    pub header: BlockHeader,
    pub payload: &'a [u8],
}

impl<'a> BlockRef<'a> {
    #[inline]
    pub fn payload_offset(&self) -> Offset {
        Offset::new(self.offset + BLOCK_HDR_SIZE as u64)
    }

    /// First byte after this block (the next header, or the break).
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.header.span()
    }
}

/// Yields `Ok(block)` per block; on a corrupt header yields one `Err` and stops.
pub struct Blocks<'a> {
    buf: &'a [u8],
    pos: u64,
    brk: u64,
    done: bool,
}

impl<'a> Blocks<'a> {
    pub(crate) fn new(buf: &'a [u8], brk: u64) -> Self {
        Self {
            buf,
            pos: BRK_HDR_SIZE as u64,
            brk: brk.min(buf.len() as u64),
            done: false,
        }
    }
}

impl<'a> Iterator for Blocks<'a> {
    type Item = Result<BlockRef<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.brk {
            return None;
        }
        match block_header_read(self.buf, self.pos, self.brk) {
            Ok(header) => {
                let start = (self.pos as usize) + BLOCK_HDR_SIZE;
                let payload = &self.buf[start..start + header.size as usize];
                let b = BlockRef {
                    offset: self.pos,
                    header,
                    payload,
                };
                self.pos = b.end();
                Some(Ok(b))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
