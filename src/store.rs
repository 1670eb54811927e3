//! ShmStore — byte-string key/value surface for collaborators.
//!
//! Session managers and cache layers see only get/set/remove over opaque
//! bytes; ShmStore pairs one allocator handle with the table in its segment.
//!
//! Lifecycle of a fleet:
//! - the first process calls `create` (or `open_or_create`) with the fixed size,
//! - every other process calls `attach` with the same name,
//! - teardown calls `unlink`; peers that still have it mapped keep working.

use std::path::Path;

use crate::alloc::{AllocSummary, Allocator};
use crate::config::ShmConfig;
use crate::error::{Result, ShmError};
use crate::record::Record;
use crate::table::{SharedHash, TableStats};

#[derive(Debug)]
pub struct ShmStore {
    alloc: Allocator,
    table: SharedHash,
}

impl ShmStore {
    /// Create (reset) the segment and an empty table.
    pub fn create(cfg: &ShmConfig) -> Result<Self> {
        cfg.validate()?;
        let mut alloc = Allocator::create_in(&cfg.resolved_dir(), &cfg.name, cfg.size)?;
        let table = SharedHash::init(&mut alloc, cfg.initial_table_size)?;
        Ok(Self { alloc, table })
    }

    /// Attach to a segment some other process created.
    pub fn attach(cfg: &ShmConfig) -> Result<Self> {
        let alloc = Allocator::attach_in(&cfg.resolved_dir(), &cfg.name)?;
        let table = SharedHash::open(&alloc)?;
        Ok(Self { alloc, table })
    }

    /// Attach if present and valid, otherwise create.
    pub fn open_or_create(cfg: &ShmConfig) -> Result<Self> {
        cfg.validate()?;
        let mut alloc = Allocator::open_or_create_in(&cfg.resolved_dir(), &cfg.name, cfg.size)?;
        let table = SharedHash::open_or_init(&mut alloc, cfg.initial_table_size)?;
        Ok(Self { alloc, table })
    }

    /// Convenience: create `name` of `size` bytes with defaults otherwise.
    pub fn create_named(name: &str, size: usize) -> Result<Self> {
        Self::create(&ShmConfig::default().with_name(name).with_size(size))
    }

    pub fn attach_named(name: &str) -> Result<Self> {
        Self::attach(&ShmConfig::default().with_name(name))
    }

    pub fn unlink(cfg: &ShmConfig) -> Result<bool> {
        Allocator::unlink_in(&cfg.resolved_dir(), &cfg.name)
    }

    pub fn unlink_in(dir: &Path, name: &str) -> Result<bool> {
        Allocator::unlink_in(dir, name)
    }

    // -------- key/value --------

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if key.is_empty() {
            return Err(ShmError::InvalidKey);
        }
        self.table.get(&self.alloc, key)
    }

    pub fn get_or(&self, key: &[u8], default: &[u8]) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(ShmError::InvalidKey);
        }
        self.table.value(&self.alloc, key, default)
    }

    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        if key.is_empty() {
            return Err(ShmError::InvalidKey);
        }
        self.table.contains(&self.alloc, key)
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if !self.table.insert(&mut self.alloc, key, value)? {
            return Err(ShmError::InvalidKey);
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &[u8]) -> Result<bool> {
        if key.is_empty() {
            return Err(ShmError::InvalidKey);
        }
        self.table.remove(&mut self.alloc, key)
    }

    pub fn take(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if key.is_empty() {
            return Err(ShmError::InvalidKey);
        }
        self.table.take_entry(&mut self.alloc, key)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.table.clear(&mut self.alloc)
    }

    pub fn len(&self) -> Result<usize> {
        self.table.count(&self.alloc)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn entries(&self) -> Result<Vec<Record>> {
        self.table.entries(&self.alloc)
    }

    // -------- introspection --------

    pub fn table(&self) -> &SharedHash {
        &self.table
    }

    pub fn allocator(&self) -> &Allocator {
        &self.alloc
    }

    /// Direct allocator access (for callers that manage their own blocks
    /// alongside the table).
    pub fn allocator_mut(&mut self) -> &mut Allocator {
        &mut self.alloc
    }

    pub fn table_stats(&self) -> Result<TableStats> {
        self.table.stats(&self.alloc)
    }

    pub fn summary(&self) -> Result<AllocSummary> {
        self.alloc.summary()
    }
}
