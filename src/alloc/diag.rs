//! Diagnostics over the block chain: summary, dump, block count.
//!
//! A corrupt header never aborts these: the walk stops there, the offset is
//! logged and reported, and whatever was counted so far is returned.

use log::error;
use serde::Serialize;
use std::fmt;
use std::fmt::Write as _;

use crate::consts::{BRK_HDR_SIZE, BRK_OFF_BREAK};
use crate::error::{Result, ShmError};
use crate::metrics::record_corrupt_block;

use super::Allocator;

#[derive(Debug, Clone, Default, Serialize)]
pub struct AllocSummary {
    pub name: String,
    pub capacity: u64,
    pub brk: u64,
    pub remaining: u64,

    pub blocks: usize,
    pub used_blocks: usize,
    pub free_blocks: usize,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub largest_free: u64,

    /// Header offset of the first corrupt block, if the walk hit one.
    pub corrupt_at: Option<u64>,
}

impl AllocSummary {
    /// Free bytes split across blocks that are smaller than the largest one.
    pub fn fragmentation(&self) -> f64 {
        if self.free_bytes == 0 {
            0.0
        } else {
            1.0 - self.largest_free as f64 / self.free_bytes as f64
        }
    }
}

impl fmt::Display for AllocSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "segment:    {}", self.name)?;
        writeln!(f, "capacity:   {} B", self.capacity)?;
        writeln!(f, "break:      {} ({} B left)", self.brk, self.remaining)?;
        writeln!(
            f,
            "blocks:     {} (used={}, free={})",
            self.blocks, self.used_blocks, self.free_blocks
        )?;
        writeln!(f, "used bytes: {}", self.used_bytes)?;
        writeln!(
            f,
            "free bytes: {} (largest {}, fragmentation {:.2})",
            self.free_bytes,
            self.largest_free,
            self.fragmentation()
        )?;
        match self.corrupt_at {
            Some(off) => write!(f, "CORRUPT:    block header at {}", off),
            None => write!(f, "integrity:  ok"),
        }
    }
}

fn report_corrupt(name: &str, e: &ShmError) -> Option<u64> {
    record_corrupt_block();
    error!("segment '{}': {}", name, e);
    match e {
        ShmError::CorruptBlock { offset, .. } => Some(*offset),
        _ => None,
    }
}

impl Allocator {
    pub fn summary(&self) -> Result<AllocSummary> {
        let _g = self.lock_shared()?;
        let mut s = AllocSummary {
            name: self.name().to_string(),
            capacity: self.map_size() as u64,
            brk: self.brk_raw(),
            remaining: self.remaining_nolock(),
            ..Default::default()
        };
        for b in self.blocks() {
            match b {
                Ok(b) => {
                    s.blocks += 1;
                    if b.header.free {
                        s.free_blocks += 1;
                        s.free_bytes += b.header.size;
                        s.largest_free = s.largest_free.max(b.header.size);
                    } else {
                        s.used_blocks += 1;
                        s.used_bytes += b.header.size;
                    }
                }
                Err(e) => {
                    s.corrupt_at = report_corrupt(self.name(), &e);
                    break;
                }
            }
        }
        if s.corrupt_at.is_none() {
            s.corrupt_at = self.check_brk();
        }
        Ok(s)
    }

    /// Stored break outside the mapping: the walk was clamped, report the header field.
    fn check_brk(&self) -> Option<u64> {
        let raw = self.brk_raw();
        if raw < BRK_HDR_SIZE as u64 || raw > self.map_size() as u64 {
            record_corrupt_block();
            error!(
                "segment '{}': break {} outside [{}, {}]",
                self.name(),
                raw,
                BRK_HDR_SIZE,
                self.map_size()
            );
            Some(BRK_OFF_BREAK as u64)
        } else {
            None
        }
    }

    /// One line per block: header offset, state, payload size.
    pub fn dump(&self) -> Result<String> {
        let _g = self.lock_shared()?;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "# segment '{}' capacity={} brk={}",
            self.name(),
            self.map_size(),
            self.brk_raw()
        );
        for b in self.blocks() {
            match b {
                Ok(b) => {
                    let _ = writeln!(
                        out,
                        "{:#010x}  {:<4}  payload={:#010x}  size={}",
                        b.offset,
                        if b.header.free { "free" } else { "used" },
                        b.payload_offset().get(),
                        b.header.size
                    );
                }
                Err(e) => {
                    report_corrupt(self.name(), &e);
                    let _ = writeln!(out, "!! {}", e);
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Number of blocks up to the break (or up to the first corrupt header).
    pub fn nblocks(&self) -> Result<usize> {
        let _g = self.lock_shared()?;
        let mut n = 0;
        for b in self.blocks() {
            match b {
                Ok(_) => n += 1,
                Err(e) => {
                    report_corrupt(self.name(), &e);
                    break;
                }
            }
        }
        Ok(n)
    }
}
